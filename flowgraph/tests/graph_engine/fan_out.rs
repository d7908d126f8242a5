//! Fan-out/fan-in merge semantics across concurrent branches.

use std::sync::Arc;

use serde_json::json;

use flowgraph::state::StateDelta;
use flowgraph::{GraphBuilder, END, START};

use super::common::{ctx, fan_schema, Analyst, Noop};

fn fan_out_graph(branches: Vec<Analyst>) -> flowgraph::CompiledGraph {
    let mut g = GraphBuilder::new(fan_schema());
    g.add_node("source", Arc::new(Noop))
        .add_node("aggregate", Arc::new(Noop));
    g.add_edge(START, "source");
    for analyst in branches {
        let name = analyst.name;
        g.add_node(name, Arc::new(analyst));
        g.add_edge("source", name);
        g.add_edge(name, "aggregate");
    }
    g.add_edge("aggregate", END);
    g.compile().expect("graph compiles")
}

/// **Scenario**: N branches each appending one item yield an append field
/// of length N containing exactly the items produced.
#[tokio::test(start_paused = true)]
async fn append_field_collects_every_branch() {
    let graph = fan_out_graph(vec![
        Analyst::new("tech", 30, json!("chart")),
        Analyst::new("fundamental", 10, json!("balance sheet")),
        Analyst::new("sector", 20, json!("peers")),
    ]);
    let out = graph
        .run(graph.initial_state(StateDelta::new()).unwrap(), &ctx())
        .await
        .unwrap();

    let items = out.get_array("items").unwrap();
    assert_eq!(items.len(), 3);
    for name in ["tech", "fundamental", "sector"] {
        assert!(items.contains(&json!(name)), "missing {name} in {items:?}");
    }
}

/// **Scenario**: Branch deltas merge in completion order, so a faster
/// branch's append lands before a slower one's regardless of declaration
/// order.
#[tokio::test(start_paused = true)]
async fn append_order_is_completion_order() {
    let graph = fan_out_graph(vec![
        Analyst::new("slow", 200, json!(1)),
        Analyst::new("fast", 10, json!(2)),
    ]);
    let out = graph
        .run(graph.initial_state(StateDelta::new()).unwrap(), &ctx())
        .await
        .unwrap();
    assert_eq!(out.get("items"), Some(&json!(["fast", "slow"])));
}

/// **Scenario**: DictMerge branches writing disjoint keys yield the union
/// of both key sets.
#[tokio::test(start_paused = true)]
async fn dict_merge_disjoint_keys_union() {
    let graph = fan_out_graph(vec![
        Analyst::new("tech", 10, json!({"signal": "BUY"})),
        Analyst::new("fundamental", 50, json!({"signal": "HOLD"})),
    ]);
    let out = graph
        .run(graph.initial_state(StateDelta::new()).unwrap(), &ctx())
        .await
        .unwrap();

    let findings = out.get_object("findings").unwrap();
    assert_eq!(findings.len(), 2, "disjoint keys union: {findings:?}");
    assert_eq!(findings["tech"], json!({"signal": "BUY"}));
    assert_eq!(findings["fundamental"], json!({"signal": "HOLD"}));
}

/// **Scenario**: Two branches writing the same DictMerge key resolve to
/// the later-completing branch's value.
#[tokio::test(start_paused = true)]
async fn dict_merge_collision_takes_later_completion() {
    use async_trait::async_trait;
    use flowgraph::state::{State, StateDelta};
    use flowgraph::{EngineError, GraphBuilder, Node, RunContext};

    struct KeyWriter {
        value: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl Node for KeyWriter {
        async fn run(&self, _state: &State, _ctx: &RunContext) -> Result<StateDelta, EngineError> {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            Ok(StateDelta::new().set("findings", json!({"verdict": self.value})))
        }
    }

    let mut g = GraphBuilder::new(fan_schema());
    g.add_node("source", Arc::new(Noop))
        .add_node("aggregate", Arc::new(Noop))
        .add_node("fast", Arc::new(KeyWriter { value: "fast", delay_ms: 10 }))
        .add_node("slow", Arc::new(KeyWriter { value: "slow", delay_ms: 80 }));
    g.add_edge(START, "source")
        .add_edge("source", "fast")
        .add_edge("source", "slow")
        .add_edge("fast", "aggregate")
        .add_edge("slow", "aggregate")
        .add_edge("aggregate", END);
    let graph = g.compile().unwrap();

    let out = graph
        .run(graph.initial_state(StateDelta::new()).unwrap(), &ctx())
        .await
        .unwrap();
    assert_eq!(out.get_object("findings").unwrap()["verdict"], json!("slow"));
}

/// **Scenario**: Every fan-out branch observes the pre-fan-out snapshot,
/// not a sibling's delta.
#[tokio::test(start_paused = true)]
async fn branches_see_pre_fan_out_snapshot() {
    use async_trait::async_trait;
    use flowgraph::state::{State, StateDelta};
    use flowgraph::{EngineError, GraphBuilder, Node, RunContext};

    struct SnapshotProbe {
        name: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl Node for SnapshotProbe {
        async fn run(&self, state: &State, _ctx: &RunContext) -> Result<StateDelta, EngineError> {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            // A sibling's append must not be visible here.
            let seen = state.get_array("items").map(Vec::len).unwrap_or(0);
            Ok(StateDelta::new()
                .set("items", json!(self.name))
                .set("findings", json!({ self.name: seen })))
        }
    }

    let mut g = GraphBuilder::new(fan_schema());
    g.add_node("source", Arc::new(Noop))
        .add_node("aggregate", Arc::new(Noop))
        .add_node("first", Arc::new(SnapshotProbe { name: "first", delay_ms: 10 }))
        .add_node("second", Arc::new(SnapshotProbe { name: "second", delay_ms: 50 }));
    g.add_edge(START, "source")
        .add_edge("source", "first")
        .add_edge("source", "second")
        .add_edge("first", "aggregate")
        .add_edge("second", "aggregate")
        .add_edge("aggregate", END);
    let graph = g.compile().unwrap();

    let out = graph
        .run(graph.initial_state(StateDelta::new()).unwrap(), &ctx())
        .await
        .unwrap();
    let findings = out.get_object("findings").unwrap();
    assert_eq!(findings["first"], json!(0));
    assert_eq!(findings["second"], json!(0), "snapshot isolation violated");
    assert_eq!(out.get_array("items").unwrap().len(), 2);
}
