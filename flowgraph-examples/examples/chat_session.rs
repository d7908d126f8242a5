//! Runs one validate-replan chat session against mock collaborators and
//! prints the event stream alongside the final answer.
//!
//! Run: `cargo run -p flowgraph-examples --example chat_session`

use std::sync::Arc;

use tokio_stream::StreamExt;

use flowgraph::{
    CapabilityRegistry, EventMux, MockCapability, MockModel, ModelResponse, SessionRunner,
};

#[tokio::main]
async fn main() {
    let mut capabilities = CapabilityRegistry::new();
    capabilities.register(
        "web_search",
        Arc::new(MockCapability::returning(
            "NVIDIA announced record data-center revenue this quarter.",
        )),
    );

    // Scripted model: one plan, then the synthesized answer.
    let model = MockModel::scripted(vec![
        Ok(ModelResponse::text(
            "{\"plan\": [{\"capability\": \"web_search\", \"args\": {\"query\": \"NVDA news\"}}]}",
        )),
        Ok(ModelResponse::text(
            "Recent coverage centers on record data-center revenue; sentiment is positive.",
        )),
    ]);

    let events = Arc::new(EventMux::new());
    let runner = SessionRunner::new(Arc::new(model), Arc::new(capabilities), Arc::clone(&events));

    let mut stream = events.subscribe("demo-session");
    let printer = tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            println!("event: {}", serde_json::to_string(&event).unwrap());
        }
    });

    let final_state = runner
        .run_chat("demo-session", "What is the latest news on NVDA?", None)
        .await
        .expect("run succeeds");

    println!(
        "\nanswer: {}",
        final_state
            .get_str(flowgraph::chat::fields::ANSWER)
            .unwrap_or("(none)")
    );

    runner.clear_session("demo-session");
    printer.abort();
}
