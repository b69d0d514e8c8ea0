use crate::transport::{Conversation, OrchestratorClient};
use agentmesh_core::{
    AgentMessage, HeartbeatRequest, MeshError, MeshResult, ProtocolAck, RegisterRequest,
    RegisterResponse, StatusReport, UnregisterRequest,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to the hub over JSON/HTTP and a WebSocket conversation stream.
pub struct HttpOrchestratorClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpOrchestratorClient {
    pub fn new(base_url: impl Into<String>) -> MeshResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MeshError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// `ws://` / `wss://` address of the conversation stream for `agent_id`.
    pub fn conversation_url(&self, agent_id: &str) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/agents/{agent_id}/conversation")
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> MeshResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MeshError::Http(format!("POST {path} failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| MeshError::Http(format!("POST {path}: failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(MeshError::Protocol(format!(
                "POST {path} returned {status}: {}",
                error_reason(&text)
            )));
        }
        serde_json::from_str(&text)
            .map_err(|e| MeshError::Http(format!("POST {path}: invalid response body: {e}")))
    }
}

/// The hub's `{"error": ...}` message, or the raw body for anything else.
fn error_reason(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl OrchestratorClient for HttpOrchestratorClient {
    async fn register(&self, request: &RegisterRequest) -> MeshResult<RegisterResponse> {
        self.post_json("/agents/register", request).await
    }

    async fn heartbeat(&self, request: &HeartbeatRequest) -> MeshResult<ProtocolAck> {
        self.post_json("/agents/heartbeat", request).await
    }

    async fn report_status(&self, report: &StatusReport) -> MeshResult<ProtocolAck> {
        self.post_json("/agents/status", report).await
    }

    async fn unregister(&self, request: &UnregisterRequest) -> MeshResult<ProtocolAck> {
        self.post_json("/agents/unregister", request).await
    }

    async fn open_conversation(&self, agent_id: &str) -> MeshResult<Box<dyn Conversation>> {
        let url = self.conversation_url(agent_id);
        let (stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| MeshError::Protocol(format!("conversation connect error: {e}")))?;
        info!(agent_id = %agent_id, url = %url, "Conversation stream connected");
        Ok(Box::new(WsConversation { stream }))
    }
}

/// Conversation over a WebSocket, one JSON [`AgentMessage`] per text frame.
pub struct WsConversation {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Conversation for WsConversation {
    async fn recv(&mut self) -> MeshResult<Option<AgentMessage>> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<AgentMessage>(&text) {
                    Ok(message) => return Ok(Some(message)),
                    Err(e) => warn!(error = %e, "Dropping malformed conversation frame"),
                },
                Ok(Message::Close(_)) => {
                    debug!("Conversation closed by peer");
                    return Ok(None);
                }
                Ok(_) => {} // ping/pong/binary
                Err(e) => return Err(MeshError::Protocol(format!("conversation read error: {e}"))),
            }
        }
        Ok(None)
    }

    async fn send(&mut self, message: &AgentMessage) -> MeshResult<()> {
        let text = serde_json::to_string(message)?;
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| MeshError::Protocol(format!("conversation write error: {e}")))
    }
}
