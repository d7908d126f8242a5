//! Structured output: coerce free-text model responses into schema-shaped
//! values, with a bounded self-repair round and a caller-supplied fallback.
//!
//! The brittle part (fence stripping) is isolated in [`extract`]; the
//! strict part (field validation) lives in [`schema`]; [`pipeline`] drives
//! model calls through the retry wrapper.

mod extract;
mod pipeline;
mod schema;

pub use extract::{parse_payload, strip_code_fences};
pub use pipeline::{OutcomeSource, StructuredOutcome, StructuredOutputPipeline};
pub use schema::{FieldKind, FieldSpec, OutputSchema, OutputSchemaBuilder};
