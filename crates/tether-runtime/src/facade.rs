//! Tool façade — the caller-facing side of the bridge.
//!
//! Turns an asynchronous peer round-trip into a single awaitable call:
//! allocate a token, deliver the request, wait (bounded) for the matching
//! response, and render a [`ToolOutcome`]. Every path out of
//! [`ToolFacade::request`] leaves no entry behind in the pending table.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tether_types::config::BridgeConfig;
use tether_types::tool::{ResponsePayload, ToolOutcome};
use tether_wire::message::now_millis;
use tether_wire::{
    BroadcastReport, CorrelationBridge, OutboundMessage, PeerRegistry, Resolution, SendOutcome,
    Token, WireError,
};
use tracing::{debug, info, warn};

/// Which round-trip a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Application state (`get-state` → `state-response`).
    State,
    /// Editor contents (`get-current-code` → `current-code-response`).
    Code,
}

impl RequestKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::State => "get-state",
            Self::Code => "get-current-code",
        }
    }

    fn outbound(self, token: &Token) -> OutboundMessage {
        let request_id = token.to_string();
        let timestamp = now_millis();
        match self {
            Self::State => OutboundMessage::GetState {
                request_id,
                timestamp,
            },
            Self::Code => OutboundMessage::GetCurrentCode {
                request_id,
                timestamp,
            },
        }
    }

    fn payload(self, value: Value) -> ResponsePayload {
        match self {
            Self::State => ResponsePayload::State { state: value },
            Self::Code => ResponsePayload::Code {
                code: match value {
                    Value::String(code) => code,
                    other => other.to_string(),
                },
            },
        }
    }
}

/// Bridges caller requests to connected peers.
pub struct ToolFacade {
    registry: PeerRegistry,
    bridge: Arc<CorrelationBridge>,
    timeouts: BridgeConfig,
}

impl ToolFacade {
    pub fn new(registry: PeerRegistry, bridge: Arc<CorrelationBridge>, timeouts: BridgeConfig) -> Self {
        Self {
            registry,
            bridge,
            timeouts,
        }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn bridge(&self) -> &CorrelationBridge {
        &self.bridge
    }

    /// The configured deadline for `kind`.
    pub fn timeout_for(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::State => self.timeouts.state_timeout(),
            RequestKind::Code => self.timeouts.code_timeout(),
        }
    }

    /// Round-trip `kind` to one session (if given and non-empty) or to all peers.
    pub async fn request(&self, kind: RequestKind, session_id: Option<&str>) -> ToolOutcome {
        self.request_with_timeout(kind, session_id, self.timeout_for(kind))
            .await
    }

    /// Like [`request`](Self::request) with an explicit deadline.
    pub async fn request_with_timeout(
        &self,
        kind: RequestKind,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> ToolOutcome {
        if self.registry.is_empty() {
            debug!(kind = kind.label(), "No peers connected, skipping round-trip");
            return ToolOutcome::NoClients {
                error: "No peers connected".to_string(),
            };
        }

        let token = Token::generate();
        let handle = self.bridge.register(token.clone(), kind.label());
        let msg = kind.outbound(&token);

        let session_id = session_id.filter(|s| !s.is_empty());
        if let Err(error) = self.deliver(&msg, session_id).await {
            self.bridge.cancel(&token);
            warn!(token = %token, kind = kind.label(), error = %error, "Request delivery failed");
            return ToolOutcome::Error { error };
        }
        info!(
            token = %token,
            kind = kind.label(),
            session = session_id.unwrap_or("*"),
            "Sent request to peers"
        );

        match self.bridge.await_response(handle, timeout).await {
            Resolution::Resolved(value) => ToolOutcome::Success {
                payload: kind.payload(value),
                request_id: token.to_string(),
                timestamp: now_millis(),
            },
            Resolution::Expired { token } => ToolOutcome::Timeout {
                request_id: token.to_string(),
                error: format!(
                    "Timeout waiting for {} response from peer after {} ms",
                    kind.label(),
                    timeout.as_millis()
                ),
            },
            Resolution::Abandoned { token } => ToolOutcome::Disconnected {
                error: format!("Bridge closed before request {token} was answered"),
            },
        }
    }

    /// Fire-and-forget broadcast of a directive that expects no answer.
    pub async fn push(&self, msg: &OutboundMessage) -> Result<BroadcastReport, WireError> {
        let report = self.registry.broadcast(msg).await?;
        info!(
            kind = msg.kind(),
            attempted = report.attempted,
            delivered = report.delivered,
            "Pushed directive to peers"
        );
        Ok(report)
    }

    async fn deliver(&self, msg: &OutboundMessage, session_id: Option<&str>) -> Result<(), String> {
        match session_id {
            Some(session) => match self.registry.send_to_session(session, msg).await {
                Ok(SendOutcome::Delivered) => Ok(()),
                Ok(SendOutcome::PeerNotFound) => {
                    Err(format!("No connected peer for session '{session}'"))
                }
                Ok(SendOutcome::Failed(e)) => {
                    Err(format!("Delivery to session '{session}' failed: {e}"))
                }
                Err(e) => Err(format!("Failed to encode request: {e}")),
            },
            None => match self.registry.broadcast(msg).await {
                Ok(report) if report.delivered > 0 => Ok(()),
                Ok(report) => Err(format!(
                    "Delivery failed for all {} peer(s)",
                    report.attempted
                )),
                Err(e) => Err(format!("Failed to encode request: {e}")),
            },
        }
    }
}
