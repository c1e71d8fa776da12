//! Tool definitions and caller-visible outcomes.

use serde::{Deserialize, Serialize};

/// Definition of a tool exposed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool identifier.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: serde_json::Value,
}

/// The payload a peer answered with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Application state reported by the peer.
    State { state: serde_json::Value },
    /// Editor contents reported by the peer.
    Code { code: String },
}

/// Result of a bridged tool call, discriminated by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// A peer answered before the deadline.
    Success {
        #[serde(flatten)]
        payload: ResponsePayload,
        request_id: String,
        /// Unix milliseconds when the answer was rendered.
        timestamp: i64,
    },
    /// No peer answered in time.
    Timeout { request_id: String, error: String },
    /// No peer was connected when the request was made.
    NoClients { error: String },
    /// The bridge shut down while the request was outstanding.
    Disconnected { error: String },
    /// The request could not be delivered.
    Error { error: String },
}

impl ToolOutcome {
    /// The `status` discriminator as it appears on the wire.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Timeout { .. } => "timeout",
            Self::NoClients { .. } => "no_clients",
            Self::Disconnected { .. } => "disconnected",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Serialize to the JSON text returned to callers.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"error","error":"failed to render outcome: {e}"}}"#)
        })
    }
}
