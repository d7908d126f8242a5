//! Shared stub nodes for graph engine tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use flowgraph::state::{State, StateDelta, StateSchema};
use flowgraph::{EngineError, Node, RunContext, SessionEvents};

/// Schema used across the fan-out tests.
pub fn fan_schema() -> StateSchema {
    StateSchema::builder()
        .append("items")
        .dict_merge("findings")
        .replace("summary")
        .build()
}

pub fn ctx() -> RunContext {
    RunContext::new(SessionEvents::detached("test"))
}

/// Pass-through node used for sources and joins.
pub struct Noop;

#[async_trait]
impl Node for Noop {
    async fn run(&self, _state: &State, _ctx: &RunContext) -> Result<StateDelta, EngineError> {
        Ok(StateDelta::new())
    }
}

/// Sleeps, then appends one item and merges one finding under its name.
pub struct Analyst {
    pub name: &'static str,
    pub delay: Duration,
    pub finding: Value,
}

impl Analyst {
    pub fn new(name: &'static str, delay_ms: u64, finding: Value) -> Self {
        Self {
            name,
            delay: Duration::from_millis(delay_ms),
            finding,
        }
    }
}

#[async_trait]
impl Node for Analyst {
    async fn run(&self, _state: &State, _ctx: &RunContext) -> Result<StateDelta, EngineError> {
        tokio::time::sleep(self.delay).await;
        Ok(StateDelta::new()
            .set("items", json!(self.name))
            .set("findings", json!({ self.name: self.finding.clone() })))
    }
}

/// Fails immediately with the given message.
pub struct Failing {
    pub message: &'static str,
}

#[async_trait]
impl Node for Failing {
    async fn run(&self, _state: &State, _ctx: &RunContext) -> Result<StateDelta, EngineError> {
        Err(EngineError::ExecutionFailed(self.message.to_string()))
    }
}

/// Sleeps a long time and only sets its flag if it was allowed to finish.
pub struct SlowWitness {
    pub finished: Arc<AtomicBool>,
}

#[async_trait]
impl Node for SlowWitness {
    async fn run(&self, _state: &State, _ctx: &RunContext) -> Result<StateDelta, EngineError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(StateDelta::new().set("items", json!("slow")))
    }
}

/// Records that it ran at all.
pub struct Witness {
    pub ran: Arc<AtomicBool>,
}

#[async_trait]
impl Node for Witness {
    async fn run(&self, _state: &State, _ctx: &RunContext) -> Result<StateDelta, EngineError> {
        self.ran.store(true, Ordering::SeqCst);
        Ok(StateDelta::new())
    }
}
