//! Fluent query building, traversal and path patterns, and result hydration.

pub mod builder;
pub mod hydrate;
pub mod pattern;

pub use builder::{Aggregate, Join, JoinKind, Order, QueryBuilder, ReturnMode, SortDirection};
pub use hydrate::{hydrate, normalize, prepare_properties, row_properties, Model, ModelQuery};
pub use pattern::{Direction, NodeRef, PathQuery, PathTarget, Traversal};
