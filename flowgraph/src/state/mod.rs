//! Shared workflow state: declared fields, merge policies, immutable updates.
//!
//! A graph declares its fields and their merge policies up front with
//! [`StateSchema`]; nodes return [`StateDelta`]s which the scheduler folds
//! into the base [`State`] per field policy.

mod container;
mod schema;

pub use container::{State, StateDelta, StateError};
pub use schema::{MergePolicy, StateSchema, StateSchemaBuilder};
