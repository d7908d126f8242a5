//! Fan-out analysis demo: three analyst nodes run concurrently against
//! the same snapshot and an aggregator folds their verdicts.
//!
//! Run: `cargo run -p flowgraph-examples --example ticker_analysis`

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use flowgraph::state::{State, StateDelta, StateSchema};
use flowgraph::{EngineError, GraphBuilder, Node, RunContext, SessionEvents, END, START};

/// Emits a fixed verdict for its dimension. A real deployment would call a
/// model through the structured output pipeline here.
struct Analyst {
    name: &'static str,
    signal: &'static str,
    confidence: f64,
}

#[async_trait]
impl Node for Analyst {
    async fn run(&self, state: &State, ctx: &RunContext) -> Result<StateDelta, EngineError> {
        let ticker = state.get_str("ticker").unwrap_or("?").to_string();
        ctx.events
            .log(format!("{}: analyzing {ticker}", self.name));
        Ok(StateDelta::new()
            .set(
                "analyses",
                json!({ self.name: {"signal": self.signal, "confidence": self.confidence} }),
            )
            .set("logs", json!([format!("{}: {}", self.name, self.signal)])))
    }
}

/// Joins the fan-out: averages confidence and majority-votes the signal.
struct Aggregator;

#[async_trait]
impl Node for Aggregator {
    async fn run(&self, state: &State, _ctx: &RunContext) -> Result<StateDelta, EngineError> {
        let analyses = state
            .get_object("analyses")
            .cloned()
            .unwrap_or_default();
        let mut score = 0i64;
        let mut confidence = 0.0;
        for verdict in analyses.values() {
            score += match verdict["signal"].as_str() {
                Some("BUY") => 1,
                Some("SELL") => -1,
                _ => 0,
            };
            confidence += verdict["confidence"].as_f64().unwrap_or(0.5);
        }
        let count = analyses.len().max(1) as f64;
        let signal = if score > 0 {
            "BUY"
        } else if score < 0 {
            "SELL"
        } else {
            "HOLD"
        };
        Ok(StateDelta::new().set(
            "report",
            json!({"signal": signal, "confidence": confidence / count}),
        ))
    }
}

struct Start;

#[async_trait]
impl Node for Start {
    async fn run(&self, _state: &State, _ctx: &RunContext) -> Result<StateDelta, EngineError> {
        Ok(StateDelta::new())
    }
}

#[tokio::main]
async fn main() {
    let schema = StateSchema::builder()
        .replace("ticker")
        .dict_merge("analyses")
        .append("logs")
        .replace("report")
        .build();

    let mut g = GraphBuilder::new(schema);
    g.add_node("orchestrator", Arc::new(Start))
        .add_node(
            "technical",
            Arc::new(Analyst {
                name: "technical",
                signal: "BUY",
                confidence: 0.8,
            }),
        )
        .add_node(
            "fundamental",
            Arc::new(Analyst {
                name: "fundamental",
                signal: "BUY",
                confidence: 0.7,
            }),
        )
        .add_node(
            "sector",
            Arc::new(Analyst {
                name: "sector",
                signal: "HOLD",
                confidence: 0.6,
            }),
        )
        .add_node("aggregator", Arc::new(Aggregator));
    g.add_edge(START, "orchestrator")
        .add_edge("orchestrator", "technical")
        .add_edge("orchestrator", "fundamental")
        .add_edge("orchestrator", "sector")
        .add_edge("technical", "aggregator")
        .add_edge("fundamental", "aggregator")
        .add_edge("sector", "aggregator")
        .add_edge("aggregator", END);
    let graph = g.compile().expect("graph compiles");

    let initial = graph
        .initial_state(StateDelta::new().set("ticker", json!("NVDA")))
        .expect("initial state");
    let ctx = RunContext::new(SessionEvents::detached("ticker-demo"));

    let out = graph.run(initial, &ctx).await.expect("run succeeds");
    println!("report: {}", out.get("report").unwrap());
    println!("logs: {}", out.get("logs").unwrap());
}
