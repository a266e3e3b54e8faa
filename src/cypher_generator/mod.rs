//! Clause-list → parameterized Cypher compilation.
//!
//! Compilation is a pure, synchronous pass: every call builds its own [`ParameterBinder`] and
//! [`CompilationContext`], and nothing here performs I/O.

use std::fmt;

use serde::Serialize;

pub mod clause;
pub mod column;
pub mod context;
mod errors;
pub mod json_path;
pub mod operators;
pub mod parameters;
pub mod temporal;
pub mod where_clause;

pub use clause::{Boolean, Clause, ClauseKind, ClauseType, ClauseValue, SubQuery};
pub use context::{Capabilities, CompilationContext};
pub use errors::CompilationError;
pub use operators::{convert, Operator};
pub use parameters::{ParameterBinder, Parameters};
pub use where_clause::compile_where;

/// Cypher text plus the flat parameter map it references.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub cypher: String,
    pub parameters: Parameters,
}

impl CompiledQuery {
    pub fn new(cypher: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            cypher: cypher.into(),
            parameters,
        }
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cypher)
    }
}

/// Compile a standalone clause list into a WHERE body and its parameters.
pub fn compile(
    clauses: &[Clause],
    ctx: &CompilationContext,
) -> Result<CompiledQuery, CompilationError> {
    let mut binder = ParameterBinder::new();
    let cypher = compile_where(clauses, ctx, &mut binder)?;
    Ok(CompiledQuery::new(cypher, binder.into_parameters()))
}
