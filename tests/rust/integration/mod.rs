//! Integration tests - Connection, retry, transaction and batch behavior against scripted drivers
//!
//! No database is required: drivers record the statements they receive and replay scripted
//! responses.

mod support;

mod batch_tests;
mod execution_tests;
mod retry_tests;
mod transaction_tests;
