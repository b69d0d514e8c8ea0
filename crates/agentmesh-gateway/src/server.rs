use crate::config::HubConfig;
use crate::conversation::ConversationHub;
use crate::monitor::spawn_heartbeat_monitor;
use crate::registry::{AgentRecord, AgentRegistry};
use agentmesh_core::{
    AgentMessage, HeartbeatRequest, MeshError, MeshResult, ProtocolAck, RegisterRequest,
    RegisterResponse, StatusReport, UnregisterRequest,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared hub state.
pub struct HubState {
    pub registry: Arc<AgentRegistry>,
    pub conversations: Arc<ConversationHub>,
    pub dispatch_timeout: Duration,
}

impl HubState {
    pub fn new(config: &HubConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: AgentRegistry::new(),
            conversations: ConversationHub::new(),
            dispatch_timeout: config.dispatch_timeout(),
        })
    }
}

/// Protocol errors rendered as `{ "error": ... }` with a 4xx/5xx status.
pub struct ApiError(MeshError);

impl From<MeshError> for ApiError {
    fn from(err: MeshError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MeshError::Validation(_) | MeshError::Json(_) => StatusCode::BAD_REQUEST,
            MeshError::NotFound(_) => StatusCode::NOT_FOUND,
            MeshError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            MeshError::Protocol(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub content: String,
    pub timeout_ms: Option<u64>,
}

/// The hub's HTTP and WebSocket surface.
pub struct HubServer;

impl HubServer {
    pub fn build(state: Arc<HubState>) -> Router {
        Router::new()
            .route("/agents", get(list_handler))
            .route("/agents/register", post(register_handler))
            .route("/agents/heartbeat", post(heartbeat_handler))
            .route("/agents/status", post(status_handler))
            .route("/agents/unregister", post(unregister_handler))
            .route("/agents/{agent_id}/conversation", get(conversation_handler))
            .route("/agents/{agent_id}/instructions", post(dispatch_handler))
            .route("/health", get(health_handler))
            .with_state(state)
    }

    /// Binds `config.bind_addr` and serves until `shutdown` fires. The
    /// heartbeat monitor runs alongside and stops with it.
    pub async fn serve(
        config: &HubConfig,
        state: Arc<HubState>,
        shutdown: CancellationToken,
    ) -> MeshResult<()> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "Hub listening");

        let monitor = spawn_heartbeat_monitor(
            state.registry.clone(),
            config.heartbeat_interval(),
            config.max_silence(),
            shutdown.clone(),
        );

        let token = shutdown.clone();
        axum::serve(listener, Self::build(state))
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        shutdown.cancel();
        if let Err(e) = monitor.await {
            warn!(error = %e, "Heartbeat monitor ended abnormally");
        }
        info!("Hub stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<Arc<HubState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "agentmesh",
        "agents": state.registry.agent_count().await,
        "connected": state.conversations.connection_count().await,
    }))
}

async fn list_handler(State(state): State<Arc<HubState>>) -> Json<Vec<AgentRecord>> {
    Json(state.registry.list().await)
}

/// Rejections are reported in-band so the agent can surface the reason.
async fn register_handler(
    State(state): State<Arc<HubState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    match state.registry.register(request).await {
        Ok(record) => Ok(Json(RegisterResponse::accepted(record.session_id))),
        Err(MeshError::Validation(reason)) => Ok(Json(RegisterResponse::rejected(reason))),
        Err(e) => Err(e.into()),
    }
}

async fn heartbeat_handler(
    State(state): State<Arc<HubState>>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<ProtocolAck>, ApiError> {
    state.registry.heartbeat(&request).await?;
    Ok(Json(ProtocolAck::ok()))
}

async fn status_handler(
    State(state): State<Arc<HubState>>,
    Json(report): Json<StatusReport>,
) -> Result<Json<ProtocolAck>, ApiError> {
    state.registry.report_status(&report).await?;
    Ok(Json(ProtocolAck::ok()))
}

async fn unregister_handler(
    State(state): State<Arc<HubState>>,
    Json(request): Json<UnregisterRequest>,
) -> Result<Json<ProtocolAck>, ApiError> {
    state.registry.unregister(&request).await?;
    Ok(Json(ProtocolAck::ok()))
}

async fn dispatch_handler(
    State(state): State<Arc<HubState>>,
    Path(agent_id): Path<String>,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<AgentMessage>, ApiError> {
    let timeout = request
        .timeout_ms
        .map_or(state.dispatch_timeout, Duration::from_millis);
    let completion = state
        .conversations
        .dispatch(&agent_id, &request.content, timeout)
        .await?;
    Ok(Json(completion))
}

async fn conversation_handler(
    ws: WebSocketUpgrade,
    Path(agent_id): Path<String>,
    State(state): State<Arc<HubState>>,
) -> Response {
    if !state.registry.contains(&agent_id).await {
        return ApiError(MeshError::NotFound(format!("unknown agent {agent_id}"))).into_response();
    }
    ws.on_upgrade(move |socket| handle_conversation(socket, agent_id, state))
}

async fn handle_conversation(socket: WebSocket, agent_id: String, state: Arc<HubState>) {
    let (connection_id, mut outbound) = state.conversations.attach(&agent_id).await;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task: forward dispatched instructions to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode instruction");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Task: read completions from the socket
    let conversations = state.conversations.clone();
    let reader_agent = agent_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = ws_receiver.next().await {
            match frame {
                Message::Text(text) => match serde_json::from_str::<AgentMessage>(text.as_str()) {
                    Ok(message) => conversations.deliver(&reader_agent, message).await,
                    Err(e) => debug!(agent_id = %reader_agent, error = %e, "Malformed conversation frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.conversations.detach(&agent_id, connection_id).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use agentmesh_core::{Capability, HealthStatus};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<HubState>) {
        let state = HubState::new(&HubConfig::default());
        (HubServer::build(state.clone()), state)
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn register_body(id: &str, name: &str) -> serde_json::Value {
        serde_json::to_value(RegisterRequest {
            agent_id: id.into(),
            name: name.into(),
            agent_type: "text_processor".into(),
            capabilities: vec![Capability::new("word_count", "Count words")],
            version: "0.3.0".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_route() {
        let (app, state) = app();
        let (status, body) = post_json(app, "/agents/register", register_body("a", "A")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let session = body["session_id"].as_str().unwrap();
        assert_eq!(state.registry.get("a").await.unwrap().session_id, session);
    }

    #[tokio::test]
    async fn test_register_rejection_is_in_band() {
        let (app, _) = app();
        let (status, body) = post_json(app, "/agents/register", register_body("a", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("empty name"));
    }

    #[tokio::test]
    async fn test_heartbeat_with_wrong_session_is_conflict() {
        let (app, state) = app();
        state
            .registry
            .register(serde_json::from_value(register_body("a", "A")).unwrap())
            .await
            .unwrap();

        let heartbeat = serde_json::to_value(HeartbeatRequest {
            agent_id: "a".into(),
            session_id: "wrong".into(),
            status: HealthStatus::Healthy,
        })
        .unwrap();
        let (status, body) = post_json(app, "/agents/heartbeat", heartbeat).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("session mismatch"));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let (app, _) = app();
        let report = serde_json::to_value(StatusReport {
            agent_id: "ghost".into(),
            session_id: "s".into(),
            status: HealthStatus::Healthy,
        })
        .unwrap();
        let (status, _) = post_json(app, "/agents/status", report).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dispatch_to_disconnected_agent() {
        let (app, _) = app();
        let (status, body) = post_json(
            app,
            "/agents/a/instructions",
            serde_json::json!({"content": "count words in 'x'"}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("not connected"));
    }

    #[tokio::test]
    async fn test_unanswered_dispatch_is_gateway_timeout() {
        let (app, state) = app();
        let (_connection, _outbound) = state.conversations.attach("slow").await;
        let (status, body) = post_json(
            app,
            "/agents/slow/instructions",
            serde_json::json!({"content": "count words in 'x'", "timeout_ms": 20}),
        )
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body["error"].as_str().unwrap().starts_with("Timeout:"));
    }

    #[tokio::test]
    async fn test_health_and_list() {
        let (app, state) = app();
        state
            .registry
            .register(serde_json::from_value(register_body("a", "A")).unwrap())
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["agents"], 1);

        let response = app
            .oneshot(Request::get("/agents").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let agents: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(agents[0]["agent_id"], "a");
        assert!(agents[0].get("session_id").is_none());
    }
}
