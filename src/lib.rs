//! Neoquent - Eloquent-style queries for Neo4j
//!
//! This crate turns fluent query descriptions into parameterized Cypher and runs them:
//! - Clause compilation (wheres, EXISTS, JSON paths, temporal parts)
//! - Query building with joins, traversals, projection and paging
//! - Path queries (shortest path, all paths)
//! - Execution with retries, managed transactions and batched writes

pub mod utils;

pub mod config;
pub mod connection;
pub mod cypher_generator;
pub mod query;
