//! Parameter map and the binder that fills it during compilation.
//!
//! The binder is the explicit accumulator threaded through the recursive compile: sub-compilers
//! receive `&mut ParameterBinder`, ask it for a name, and get back the key they must reference
//! as `$name`. Names are unique within one binder.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::CompilationError;
use crate::utils::param_naming::{generate_param_name, generate_suffixed_param_name};

/// Flat `name -> value` map sent alongside Cypher text. Insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Merge `other` into `self`. A name already bound to a different value is a conflict.
    pub fn merge(&mut self, other: &Parameters) -> Result<(), CompilationError> {
        for (name, value) in other.iter() {
            match self.0.get(name) {
                Some(existing) if existing != value => {
                    return Err(CompilationError::ParameterConflict { name: name.clone() });
                }
                Some(_) => {}
                None => {
                    self.0.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(())
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Parameters(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Parameters(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Parameters {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Hands out collision-free parameter names and records their values.
#[derive(Debug, Clone, Default)]
pub struct ParameterBinder {
    parameters: Parameters,
}

impl ParameterBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from parameters already bound elsewhere (e.g. `with_parameter`).
    pub fn with_parameters(parameters: Parameters) -> Self {
        Self { parameters }
    }

    /// Bind `value` under `{column}_{index}`, bumping the index while the name is taken.
    /// Returns the name without the `$`.
    pub fn bind(&mut self, column: &str, index: usize, value: Value) -> String {
        let index = self.free_index(column, index, &[None]);
        let name = generate_param_name(column, index);
        self.parameters.insert(name.clone(), value);
        name
    }

    /// Bind `value` under `{column}_{index}_{suffix}`.
    pub fn bind_suffixed(&mut self, column: &str, index: usize, suffix: &str, value: Value) -> String {
        let index = self.free_index(column, index, &[Some(suffix)]);
        let name = generate_suffixed_param_name(column, index, suffix);
        self.parameters.insert(name.clone(), value);
        name
    }

    /// Bind a `_min`/`_max` pair sharing one index.
    pub fn bind_range(&mut self, column: &str, index: usize, min: Value, max: Value) -> (String, String) {
        let index = self.free_index(column, index, &[Some("min"), Some("max")]);
        let min_name = generate_suffixed_param_name(column, index, "min");
        let max_name = generate_suffixed_param_name(column, index, "max");
        self.parameters.insert(min_name.clone(), min);
        self.parameters.insert(max_name.clone(), max);
        (min_name, max_name)
    }

    /// Bind a plain value plus a suffixed companion (used by the JSON fallbacks), both under
    /// the same index.
    pub fn bind_with_companion(
        &mut self,
        column: &str,
        index: usize,
        value: Value,
        suffix: &str,
        companion: Value,
    ) -> (String, String) {
        let index = self.free_index(column, index, &[None, Some(suffix)]);
        let name = generate_param_name(column, index);
        let companion_name = generate_suffixed_param_name(column, index, suffix);
        self.parameters.insert(name.clone(), value);
        self.parameters.insert(companion_name.clone(), companion);
        (name, companion_name)
    }

    /// Merge caller-supplied bindings (raw fragments, `with_parameter`).
    pub fn merge(&mut self, bindings: &Parameters) -> Result<(), CompilationError> {
        self.parameters.merge(bindings)
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn into_parameters(self) -> Parameters {
        self.parameters
    }

    fn free_index(&self, column: &str, start: usize, suffixes: &[Option<&str>]) -> usize {
        let mut index = start;
        loop {
            let taken = suffixes.iter().any(|suffix| {
                let name = match suffix {
                    Some(suffix) => generate_suffixed_param_name(column, index, suffix),
                    None => generate_param_name(column, index),
                };
                self.parameters.contains_key(&name)
            });
            if !taken {
                return index;
            }
            index += 1;
        }
    }
}
