//! Field declarations: every state field carries a merge policy tag.
//!
//! Declared at graph-construction time; a write to an undeclared field is a
//! detected error, not a silent default.

use std::collections::HashMap;

/// How concurrent or sequential partial updates to one field combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergePolicy {
    /// Last writer wins. At most one branch of any single fan-out may write
    /// a Replace field; the engine does not detect violations, the merged
    /// value is then whichever branch completed last.
    Replace,
    /// Values concatenate in delta-application order. For a fan-out that is
    /// branch-completion order, which is not deterministic across runs.
    Append,
    /// Shallow object merge, key by key; later keys overwrite earlier ones.
    DictMerge,
}

/// Declared field set for one graph's state.
///
/// **Interaction**: attached to the graph at build time; [`super::State`]
/// holds it behind an `Arc` and consults it on every delta application.
#[derive(Debug, Default)]
pub struct StateSchema {
    fields: HashMap<String, MergePolicy>,
}

impl StateSchema {
    pub fn builder() -> StateSchemaBuilder {
        StateSchemaBuilder::default()
    }

    /// Policy for a declared field; `None` means the field is undeclared.
    pub fn policy(&self, field: &str) -> Option<MergePolicy> {
        self.fields.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builder for [`StateSchema`]; one method per policy.
#[derive(Debug, Default)]
pub struct StateSchemaBuilder {
    fields: HashMap<String, MergePolicy>,
}

impl StateSchemaBuilder {
    /// Declares a last-writer-wins field.
    pub fn replace(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), MergePolicy::Replace);
        self
    }

    /// Declares a list field whose updates concatenate.
    pub fn append(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), MergePolicy::Append);
        self
    }

    /// Declares an object field whose updates shallow-merge.
    pub fn dict_merge(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), MergePolicy::DictMerge);
        self
    }

    pub fn build(self) -> StateSchema {
        StateSchema {
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Builder records one policy per field; redeclaring overwrites.
    #[test]
    fn builder_declares_policies() {
        let schema = StateSchema::builder()
            .replace("plan")
            .append("logs")
            .dict_merge("execution_results")
            .build();
        assert_eq!(schema.policy("plan"), Some(MergePolicy::Replace));
        assert_eq!(schema.policy("logs"), Some(MergePolicy::Append));
        assert_eq!(
            schema.policy("execution_results"),
            Some(MergePolicy::DictMerge)
        );
        assert_eq!(schema.policy("unknown"), None);
        assert_eq!(schema.len(), 3);
    }
}
