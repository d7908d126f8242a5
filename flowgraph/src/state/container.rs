//! The state record and delta application.
//!
//! `State` is immutable from a node's point of view: nodes receive a
//! reference and return a `StateDelta` containing only the fields they
//! intend to change. The scheduler folds deltas into a new `State` with
//! `with_delta` / `merge`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use super::schema::{MergePolicy, StateSchema};

/// Error applying a delta against the declared schema.
#[derive(Debug, Error)]
pub enum StateError {
    /// The delta wrote a field the graph's schema does not declare.
    #[error("undeclared state field '{0}'")]
    UndeclaredField(String),

    /// The stored value or the delta value does not fit the field's policy
    /// (e.g. a DictMerge field holding a non-object).
    #[error("field '{field}' expects {expected} for its merge policy")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },
}

/// Partial update produced by one node: only the fields it modifies.
///
/// Preserves insertion order so sequential writes within one delta apply
/// in program order.
#[derive(Clone, Debug, Default)]
pub struct StateDelta {
    entries: Vec<(String, Value)>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field write. Later writes to the same field win
    /// within this delta.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        self.entries.retain(|(name, _)| *name != field);
        self.entries.push((field, value.into()));
        self
    }

    /// Resets a field: the stored value is removed and later reads see the
    /// field as absent. Works under any merge policy; this is the only way
    /// to discard accumulated Append/DictMerge contents.
    pub fn reset(self, field: impl Into<String>) -> Self {
        self.set(field, Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The shared, typed state record passed between nodes.
///
/// Cheap to clone: values are a `HashMap<String, Value>` snapshot and the
/// schema is shared behind an `Arc`.
#[derive(Clone, Debug)]
pub struct State {
    schema: Arc<StateSchema>,
    values: HashMap<String, Value>,
}

impl State {
    pub fn new(schema: Arc<StateSchema>) -> Self {
        Self {
            schema,
            values: HashMap::new(),
        }
    }

    /// Builds an initial state from a delta (e.g. the run's inputs).
    pub fn with_initial(schema: Arc<StateSchema>, delta: StateDelta) -> Result<Self, StateError> {
        Self::new(schema).with_delta(&delta)
    }

    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_u64(&self, field: &str) -> Option<u64> {
        self.get(field).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    pub fn get_array(&self, field: &str) -> Option<&Vec<Value>> {
        self.get(field).and_then(Value::as_array)
    }

    pub fn get_object(&self, field: &str) -> Option<&Map<String, Value>> {
        self.get(field).and_then(Value::as_object)
    }

    /// Returns a new state with one delta applied per field policy.
    pub fn with_delta(&self, delta: &StateDelta) -> Result<State, StateError> {
        self.merge(std::slice::from_ref(delta))
    }

    /// Returns a new state with every delta applied in the supplied order.
    ///
    /// The supplied order must be node-completion order for fan-out deltas,
    /// or program order for sequential steps; Append and DictMerge fields
    /// take their ordering guarantees from it.
    pub fn merge(&self, deltas: &[StateDelta]) -> Result<State, StateError> {
        let mut values = self.values.clone();
        for delta in deltas {
            for (field, incoming) in delta.iter() {
                let policy = self
                    .schema
                    .policy(field)
                    .ok_or_else(|| StateError::UndeclaredField(field.to_string()))?;
                apply_field(&mut values, field, incoming, policy)?;
            }
        }
        Ok(State {
            schema: Arc::clone(&self.schema),
            values,
        })
    }
}

fn apply_field(
    values: &mut HashMap<String, Value>,
    field: &str,
    incoming: &Value,
    policy: MergePolicy,
) -> Result<(), StateError> {
    // Null is the reset marker under every policy.
    if incoming.is_null() {
        values.remove(field);
        return Ok(());
    }
    match policy {
        MergePolicy::Replace => {
            values.insert(field.to_string(), incoming.clone());
        }
        MergePolicy::Append => {
            let slot = values
                .entry(field.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            let items = slot.as_array_mut().ok_or(StateError::TypeMismatch {
                field: field.to_string(),
                expected: "an array",
            })?;
            match incoming {
                Value::Array(additions) => items.extend(additions.iter().cloned()),
                single => items.push(single.clone()),
            }
        }
        MergePolicy::DictMerge => {
            let additions = incoming.as_object().ok_or(StateError::TypeMismatch {
                field: field.to_string(),
                expected: "an object",
            })?;
            let slot = values
                .entry(field.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            let existing = slot.as_object_mut().ok_or(StateError::TypeMismatch {
                field: field.to_string(),
                expected: "an object",
            })?;
            for (k, v) in additions {
                existing.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(())
}
