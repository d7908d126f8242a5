//! Fan-out failure policy and run cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use flowgraph::state::StateDelta;
use flowgraph::{EngineError, GraphBuilder, RunContext, SessionEvents, END, START};
use tokio_util::sync::CancellationToken;

use super::common::{ctx, fan_schema, Analyst, Failing, Noop, SlowWitness, Witness};

/// **Scenario**: A three-branch fan-out where `tech` fails permanently:
/// the run reports failure attributable to `tech`, in-flight siblings are
/// cancelled, and the aggregate node never runs.
#[tokio::test]
async fn branch_failure_cancels_siblings_and_skips_join() {
    let fundamental_finished = Arc::new(AtomicBool::new(false));
    let sector_finished = Arc::new(AtomicBool::new(false));
    let aggregate_ran = Arc::new(AtomicBool::new(false));

    let mut g = GraphBuilder::new(fan_schema());
    g.add_node("source", Arc::new(Noop))
        .add_node("tech", Arc::new(Failing { message: "price feed down" }))
        .add_node(
            "fundamental",
            Arc::new(SlowWitness {
                finished: Arc::clone(&fundamental_finished),
            }),
        )
        .add_node(
            "sector",
            Arc::new(SlowWitness {
                finished: Arc::clone(&sector_finished),
            }),
        )
        .add_node(
            "aggregate",
            Arc::new(Witness {
                ran: Arc::clone(&aggregate_ran),
            }),
        );
    g.add_edge(START, "source")
        .add_edge("source", "tech")
        .add_edge("source", "fundamental")
        .add_edge("source", "sector")
        .add_edge("tech", "aggregate")
        .add_edge("fundamental", "aggregate")
        .add_edge("sector", "aggregate")
        .add_edge("aggregate", END);
    let graph = g.compile().unwrap();

    let err = graph
        .run(graph.initial_state(StateDelta::new()).unwrap(), &ctx())
        .await
        .unwrap_err();

    match err {
        EngineError::NodeFailed { node, message } => {
            assert_eq!(node, "tech");
            assert!(message.contains("price feed down"), "{message}");
        }
        other => panic!("expected NodeFailed for tech, got {other:?}"),
    }
    assert!(!aggregate_ran.load(Ordering::SeqCst), "join must not run");
    assert!(
        !fundamental_finished.load(Ordering::SeqCst),
        "fundamental should have been cancelled mid-flight"
    );
    assert!(!sector_finished.load(Ordering::SeqCst));
}

/// **Scenario**: When every branch succeeds the join runs against the
/// fully merged state.
#[tokio::test(start_paused = true)]
async fn healthy_fan_out_reaches_join() {
    let aggregate_ran = Arc::new(AtomicBool::new(false));

    let mut g = GraphBuilder::new(fan_schema());
    g.add_node("source", Arc::new(Noop))
        .add_node("tech", Arc::new(Analyst::new("tech", 10, json!({"signal": "BUY"}))))
        .add_node(
            "fundamental",
            Arc::new(Analyst::new("fundamental", 20, json!({"signal": "HOLD"}))),
        )
        .add_node(
            "aggregate",
            Arc::new(Witness {
                ran: Arc::clone(&aggregate_ran),
            }),
        );
    g.add_edge(START, "source")
        .add_edge("source", "tech")
        .add_edge("source", "fundamental")
        .add_edge("tech", "aggregate")
        .add_edge("fundamental", "aggregate")
        .add_edge("aggregate", END);
    let graph = g.compile().unwrap();

    let out = graph
        .run(graph.initial_state(StateDelta::new()).unwrap(), &ctx())
        .await
        .unwrap();
    assert!(aggregate_ran.load(Ordering::SeqCst));
    assert_eq!(out.get_array("items").unwrap().len(), 2);
}

/// **Scenario**: Owner cancellation during a fan-out surfaces Cancelled
/// and stops the in-flight branches.
#[tokio::test]
async fn owner_cancellation_reaches_branches() {
    let finished = Arc::new(AtomicBool::new(false));

    let mut g = GraphBuilder::new(fan_schema());
    g.add_node("source", Arc::new(Noop))
        .add_node(
            "slow-a",
            Arc::new(SlowWitness {
                finished: Arc::clone(&finished),
            }),
        )
        .add_node(
            "slow-b",
            Arc::new(SlowWitness {
                finished: Arc::clone(&finished),
            }),
        )
        .add_node("aggregate", Arc::new(Noop));
    g.add_edge(START, "source")
        .add_edge("source", "slow-a")
        .add_edge("source", "slow-b")
        .add_edge("slow-a", "aggregate")
        .add_edge("slow-b", "aggregate")
        .add_edge("aggregate", END);
    let graph = g.compile().unwrap();

    let token = CancellationToken::new();
    let ctx = RunContext::with_cancel(SessionEvents::detached("cancel-test"), token.clone());
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let err = graph
        .run(graph.initial_state(StateDelta::new()).unwrap(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled), "got {err:?}");
    assert!(!finished.load(Ordering::SeqCst));
}
