//! Runnable demonstrations for `flowgraph`.
//!
//! Concrete graphs, states, and mock collaborators live in `examples/`,
//! not in the engine crate:
//!
//! - `chat_session`: the validate-replan chat workflow end to end, with
//!   the event stream printed as it happens.
//! - `ticker_analysis`: a three-analyst fan-out joined by an aggregator.
