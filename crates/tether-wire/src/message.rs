//! Wire protocol message types.
//!
//! Every frame exchanged with a peer is a JSON object carrying a `type`
//! discriminator. Requests that expect an answer embed a `request_id`
//! (the correlation token); pushes without one are fire-and-forget.

use serde::{Deserialize, Serialize};

/// Messages sent from the host to peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Ask the peer to report its current application state.
    #[serde(rename = "get-state")]
    GetState {
        request_id: String,
        /// Unix milliseconds.
        timestamp: i64,
    },
    /// Ask the peer for the code currently in its editor.
    #[serde(rename = "get-current-code")]
    GetCurrentCode { request_id: String, timestamp: i64 },
    /// Push a pattern to evaluate. No response expected.
    #[serde(rename = "push-code")]
    PushCode {
        code: String,
        autoplay: bool,
        #[serde(default)]
        metadata: serde_json::Map<String, serde_json::Value>,
        timestamp: i64,
    },
    /// Stop all playback. No response expected.
    #[serde(rename = "stop")]
    Stop { timestamp: i64 },
    /// Liveness reply to a peer `ping`.
    #[serde(rename = "pong")]
    Pong,
}

impl OutboundMessage {
    /// The correlation token carried by this message, if it expects a response.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::GetState { request_id, .. } | Self::GetCurrentCode { request_id, .. } => {
                Some(request_id)
            }
            _ => None,
        }
    }

    /// Whether a peer is expected to answer this message.
    pub fn expects_response(&self) -> bool {
        self.request_id().is_some()
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetState { .. } => "get-state",
            Self::GetCurrentCode { .. } => "get-current-code",
            Self::PushCode { .. } => "push-code",
            Self::Stop { .. } => "stop",
            Self::Pong => "pong",
        }
    }
}

/// Messages received from peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// Liveness check; answered with `pong`, never touches the bridge.
    #[serde(rename = "ping")]
    Ping,
    /// Answer to `get-state`.
    #[serde(rename = "state-response", alias = "button-state-response")]
    StateResponse {
        #[serde(default)]
        request_id: String,
        #[serde(default)]
        state: serde_json::Value,
    },
    /// Answer to `get-current-code`.
    #[serde(rename = "current-code-response")]
    CodeResponse {
        #[serde(default)]
        request_id: String,
        #[serde(default)]
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<serde_json::Value>,
    },
    /// Peer failed to evaluate a pushed pattern. Diagnostic only.
    #[serde(rename = "evaluation-error")]
    EvaluationError {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        code: Option<String>,
    },
    /// Any other `type`; ignored.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// The correlation token if this is a response carrying a non-empty one.
    pub fn response_token(&self) -> Option<&str> {
        match self {
            Self::StateResponse { request_id, .. } | Self::CodeResponse { request_id, .. }
                if !request_id.is_empty() =>
            {
                Some(request_id)
            }
            _ => None,
        }
    }
}

/// Current Unix time in milliseconds, as stamped on outbound messages.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Encode an outbound message as a JSON text frame.
pub fn encode_outbound(msg: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Parse a JSON text frame from a peer.
pub fn decode_inbound(text: &str) -> Result<InboundMessage, serde_json::Error> {
    serde_json::from_str(text)
}
