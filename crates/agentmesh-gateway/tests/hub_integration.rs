#![allow(clippy::unwrap_used, clippy::expect_used)]

//! A real worker runtime talking to a live hub over HTTP and WebSocket.

use agentmesh_agent::{AgentConfig, AgentRuntime, HttpOrchestratorClient, TextProcessor};
use agentmesh_core::{HealthStatus, MessageType};
use agentmesh_gateway::{HubConfig, HubServer, HubState};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Helper: serve the hub on a random port, returning its base URL.
async fn start_hub() -> (String, Arc<HubState>) {
    let state = HubState::new(&HubConfig::default());
    let app = HubServer::build(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{}", addr.port()), state)
}

fn worker(base_url: &str, agent_id: &str) -> AgentRuntime {
    let config = AgentConfig::new(agent_id, "Text Processor").with_orchestrator_url(base_url);
    let client = HttpOrchestratorClient::new(base_url).unwrap();
    AgentRuntime::new(config, Arc::new(client), Arc::new(TextProcessor::new()))
}

async fn wait_connected(state: &HubState, agent_id: &str) {
    for _ in 0..50 {
        if state.conversations.is_connected(agent_id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("agent {agent_id} never connected");
}

#[tokio::test]
async fn test_worker_answers_dispatched_instruction() {
    let (base_url, state) = start_hub().await;
    let mut runtime = worker(&base_url, "text-1");
    runtime.start().await.unwrap();
    wait_connected(&state, "text-1").await;

    let record = state.registry.get("text-1").await.unwrap();
    assert_eq!(Some(record.session_id.as_str()), runtime.session_id());
    assert!(record.has_capability("word_count"));

    let completion = state
        .conversations
        .dispatch(
            "text-1",
            "Count the number of words in \"Hello world\"",
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(completion.message_type, MessageType::Completion);
    assert_eq!(completion.from_id, "text-1");
    assert_eq!(completion.content, "The text \"Hello world\" contains 2 words.");

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_over_http_route() {
    let (base_url, state) = start_hub().await;
    let mut runtime = worker(&base_url, "text-2");
    runtime.start().await.unwrap();
    wait_connected(&state, "text-2").await;

    let resp = reqwest::Client::new()
        .post(format!("{base_url}/agents/text-2/instructions"))
        .json(&serde_json::json!({"content": "Analyze \"Hi there\""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body["content"],
        "Text analysis for \"Hi there\":\n- Words: 2\n- Characters: 8\n- Letters: 7"
    );

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_unregisters_from_hub() {
    let (base_url, state) = start_hub().await;
    let mut runtime = worker(&base_url, "text-3");
    runtime.start().await.unwrap();
    assert_eq!(state.registry.agent_count().await, 1);

    runtime.shutdown().await;
    assert!(!runtime.is_registered());
    assert!(state.registry.get("text-3").await.is_none());
}

#[tokio::test]
async fn test_heartbeats_reach_hub() {
    let (base_url, state) = start_hub().await;
    let config = AgentConfig::new("text-4", "Text Processor")
        .with_orchestrator_url(&base_url)
        .with_heartbeat_interval(Duration::from_millis(20));
    let client = HttpOrchestratorClient::new(&base_url).unwrap();
    let mut runtime = AgentRuntime::new(config, Arc::new(client), Arc::new(TextProcessor::new()));
    runtime.start().await.unwrap();

    let registered_at = state.registry.get("text-4").await.unwrap().last_heartbeat;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let record = state.registry.get("text-4").await.unwrap();
    assert!(record.last_heartbeat > registered_at);
    assert_eq!(record.status, HealthStatus::Healthy);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_agent_id_keeps_latest_session() {
    let (base_url, state) = start_hub().await;
    let mut first = worker(&base_url, "text-5");
    first.start().await.unwrap();
    let mut second = worker(&base_url, "text-5");
    second.start().await.unwrap();

    let record = state.registry.get("text-5").await.unwrap();
    assert_eq!(Some(record.session_id.as_str()), second.session_id());

    // the stale runtime's unregister is refused; the newer one stays
    first.shutdown().await;
    assert!(state.registry.get("text-5").await.is_some());
    second.shutdown().await;
    assert!(state.registry.get("text-5").await.is_none());
}

#[tokio::test]
async fn test_conversation_for_unknown_agent_is_refused() {
    let (base_url, _state) = start_hub().await;
    let url = format!("{}/agents/ghost/conversation", base_url.replace("http://", "ws://"));
    assert!(tokio_tungstenite::connect_async(&url).await.is_err());
}

#[tokio::test]
async fn test_agent_socket_without_runtime() {
    let (base_url, state) = start_hub().await;
    let client = reqwest::Client::new();
    let resp: serde_json::Value = client
        .post(format!("{base_url}/agents/register"))
        .json(&serde_json::json!({
            "agent_id": "raw",
            "name": "Raw",
            "agent_type": "test",
            "capabilities": [],
            "version": "0"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["success"], true);

    let url = format!("{}/agents/raw/conversation", base_url.replace("http://", "ws://"));
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    wait_connected(&state, "raw").await;

    let hub = state.conversations.clone();
    let waiter =
        tokio::spawn(async move { hub.dispatch("raw", "ping", Duration::from_millis(100)).await });

    let frame = ws.next().await.unwrap().unwrap();
    let instruction: agentmesh_core::AgentMessage =
        serde_json::from_str(&frame.into_text().unwrap()).unwrap();
    assert_eq!(instruction.message_type, MessageType::Instruction);
    assert_eq!(instruction.to_id, "raw");

    // no reply: the dispatch times out
    let err = waiter.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("did not answer"));
}
