//! Declared output schemas: named, typed fields with validation rules.
//!
//! Mirrors what the hosting application would express with a derive-style
//! schema (required fields, enumerated signals, bounded confidence
//! scores). Validation reports every problem it finds; it never coerces
//! or clamps: an out-of-range value is a failure for the repair cycle.

use serde_json::Value;

/// Type and constraints for one schema field.
#[derive(Clone, Debug)]
pub enum FieldKind {
    /// Any JSON string.
    Text,
    /// A number, optionally bounded inclusively on either side.
    Number { min: Option<f64>, max: Option<f64> },
    /// A whole number.
    Integer,
    Boolean,
    /// A string drawn from a closed set (e.g. "BUY" | "SELL" | "HOLD").
    OneOf(Vec<String>),
    /// An array whose elements all validate against the inner kind.
    List(Box<FieldKind>),
    /// Any JSON object; nested shapes are the caller's concern.
    Object,
}

impl FieldKind {
    fn describe(&self) -> String {
        match self {
            Self::Text => "string".to_string(),
            Self::Number { min, max } => match (min, max) {
                (Some(lo), Some(hi)) => format!("number between {lo} and {hi}"),
                (Some(lo), None) => format!("number >= {lo}"),
                (None, Some(hi)) => format!("number <= {hi}"),
                (None, None) => "number".to_string(),
            },
            Self::Integer => "integer".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::OneOf(values) => format!("one of: {}", values.join(" | ")),
            Self::List(elem) => format!("array of {}", elem.describe()),
            Self::Object => "object".to_string(),
        }
    }
}

/// One named field in an output schema.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: Option<String>,
}

/// A declared output shape the pipeline coerces model responses into.
#[derive(Clone, Debug)]
pub struct OutputSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl OutputSchema {
    pub fn builder(name: impl Into<String>) -> OutputSchemaBuilder {
        OutputSchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validates field-by-field: required presence, types, enum
    /// membership, numeric bounds. Extra fields are ignored. Returns every
    /// issue found so the repair prompt can cite them all.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();
        let Some(object) = value.as_object() else {
            return Err(vec![format!("expected a JSON object for {}", self.name)]);
        };
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        issues.push(format!("missing required field '{}'", field.name));
                    }
                }
                Some(present) => check_kind(&field.name, present, &field.kind, &mut issues),
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Renders the emit-only-JSON instruction block appended to prompts.
    pub fn instructions(&self) -> String {
        let mut lines = vec![format!(
            "Respond with ONLY a JSON object matching the {} schema. \
             No markdown fences, no commentary.",
            self.name
        )];
        lines.push("Fields:".to_string());
        for field in &self.fields {
            let requirement = if field.required { "required" } else { "optional" };
            let mut line = format!(
                "- {} ({}, {})",
                field.name,
                field.kind.describe(),
                requirement
            );
            if let Some(desc) = &field.description {
                line.push_str(": ");
                line.push_str(desc);
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

fn check_kind(path: &str, value: &Value, kind: &FieldKind, issues: &mut Vec<String>) {
    match kind {
        FieldKind::Text => {
            if !value.is_string() {
                issues.push(format!("field '{path}' must be a string"));
            }
        }
        FieldKind::Number { min, max } => match value.as_f64() {
            None => issues.push(format!("field '{path}' must be a number")),
            Some(n) => {
                if let Some(lo) = min {
                    if n < *lo {
                        issues.push(format!("field '{path}' must be >= {lo}, got {n}"));
                    }
                }
                if let Some(hi) = max {
                    if n > *hi {
                        issues.push(format!("field '{path}' must be <= {hi}, got {n}"));
                    }
                }
            }
        },
        FieldKind::Integer => {
            if value.as_i64().is_none() && value.as_u64().is_none() {
                issues.push(format!("field '{path}' must be an integer"));
            }
        }
        FieldKind::Boolean => {
            if !value.is_boolean() {
                issues.push(format!("field '{path}' must be a boolean"));
            }
        }
        FieldKind::OneOf(allowed) => match value.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => {}
            Some(s) => issues.push(format!(
                "field '{path}' must be one of [{}], got '{s}'",
                allowed.join(", ")
            )),
            None => issues.push(format!("field '{path}' must be a string")),
        },
        FieldKind::List(elem) => match value.as_array() {
            None => issues.push(format!("field '{path}' must be an array")),
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_kind(&format!("{path}[{i}]"), item, elem, issues);
                }
            }
        },
        FieldKind::Object => {
            if !value.is_object() {
                issues.push(format!("field '{path}' must be an object"));
            }
        }
    }
}

/// Builder for [`OutputSchema`]; `describe` attaches to the last field.
pub struct OutputSchemaBuilder {
    name: String,
    fields: Vec<FieldSpec>,
}

impl OutputSchemaBuilder {
    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: true,
            description: None,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: false,
            description: None,
        });
        self
    }

    /// Adds a description to the most recently declared field.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        if let Some(last) = self.fields.last_mut() {
            last.description = Some(description.into());
        }
        self
    }

    pub fn build(self) -> OutputSchema {
        OutputSchema {
            name: self.name,
            fields: self.fields,
        }
    }
}
