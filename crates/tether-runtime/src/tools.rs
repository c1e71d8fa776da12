//! Tool catalog and execution.
//!
//! Bridged tools return the JSON form of a `ToolOutcome`; push tools
//! return a short status line. Argument errors and rejected patterns are
//! reported as [`TetherError`] so transports can flag them as tool errors.

use std::sync::Arc;

use serde_json::{json, Value};
use tether_types::error::{TetherError, TetherResult};
use tether_types::tool::ToolDefinition;
use tether_wire::message::now_millis;
use tether_wire::OutboundMessage;
use tracing::debug;

use crate::facade::{RequestKind, ToolFacade};
use crate::validate::validate_pattern;

/// Executes tools against the façade.
pub struct ToolHost {
    facade: Arc<ToolFacade>,
    default_pattern: String,
}

impl ToolHost {
    pub fn new(facade: Arc<ToolFacade>, default_pattern: impl Into<String>) -> Self {
        Self {
            facade,
            default_pattern: default_pattern.into(),
        }
    }

    pub fn facade(&self) -> &ToolFacade {
        &self.facade
    }

    /// Definitions of every tool this host can execute.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        builtin_tool_definitions(&self.default_pattern)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        TOOL_NAMES.contains(&name)
    }

    /// Run `name` with JSON `args`.
    pub async fn execute(&self, name: &str, args: &Value) -> TetherResult<String> {
        debug!(tool = name, "Executing tool");
        match name {
            "get_button_state" => {
                let session = optional_str(args, "session_id")?;
                Ok(self
                    .facade
                    .request(RequestKind::State, session)
                    .await
                    .to_json_string())
            }
            "get_currently_playing_code" => {
                let session = optional_str(args, "session_id")?;
                Ok(self
                    .facade
                    .request(RequestKind::Code, session)
                    .await
                    .to_json_string())
            }
            "get_connection_status" => Ok(self.connection_status().to_string()),
            "play_code" => {
                let code = optional_str(args, "code")?.unwrap_or(&self.default_pattern);
                let description = optional_str(args, "description")?.unwrap_or("");
                self.play_code(code, description).await
            }
            "stop_play" => self.stop_play().await,
            other => Err(TetherError::UnknownTool(other.to_string())),
        }
    }

    fn connection_status(&self) -> Value {
        let count = self.facade.registry().count();
        json!({
            "status": if count > 0 { "connected" } else { "no_clients" },
            "connection_count": count,
            "message": format!("{count} client(s) connected"),
        })
    }

    async fn play_code(&self, code: &str, description: &str) -> TetherResult<String> {
        validate_pattern(code).map_err(|e| TetherError::InvalidInput(format!("Invalid code: {e}")))?;

        let mut metadata = serde_json::Map::new();
        if !description.is_empty() {
            metadata.insert("description".to_string(), json!(description));
        }
        let msg = OutboundMessage::PushCode {
            code: code.to_string(),
            autoplay: true,
            metadata,
            timestamp: now_millis(),
        };
        let report = self
            .facade
            .push(&msg)
            .await
            .map_err(|e| TetherError::Delivery(format!("Error playing pattern: {e}")))?;

        if report.attempted == 0 {
            return Ok("Pattern ready, but no peers connected.".to_string());
        }
        Ok(format!(
            "Pattern sent to {} connected peer(s). Pattern: {}",
            report.delivered,
            preview(code, 50)
        ))
    }

    async fn stop_play(&self) -> TetherResult<String> {
        let report = self
            .facade
            .push(&OutboundMessage::Stop {
                timestamp: now_millis(),
            })
            .await
            .map_err(|e| TetherError::Delivery(format!("Error stopping playback: {e}")))?;
        Ok(format!(
            "Stop signal sent to {} connected peer(s)",
            report.delivered
        ))
    }
}

const TOOL_NAMES: &[&str] = &[
    "get_button_state",
    "get_currently_playing_code",
    "get_connection_status",
    "play_code",
    "stop_play",
];

/// Tool definitions with their JSON Schemas.
pub fn builtin_tool_definitions(default_pattern: &str) -> Vec<ToolDefinition> {
    let session_schema = json!({
        "type": "object",
        "properties": {
            "session_id": {
                "type": "string",
                "description": "Optional session ID to target one connected peer"
            }
        }
    });
    vec![
        ToolDefinition {
            name: "get_button_state".to_string(),
            description: "Get the current application state from a connected peer.".to_string(),
            input_schema: session_schema.clone(),
        },
        ToolDefinition {
            name: "get_currently_playing_code".to_string(),
            description: "Get the code currently in the editor of a connected peer.".to_string(),
            input_schema: session_schema,
        },
        ToolDefinition {
            name: "get_connection_status".to_string(),
            description: "Report how many peers are connected.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: "play_code".to_string(),
            description: "Play a live coding pattern in every connected peer.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Pattern to evaluate",
                        "default": default_pattern
                    },
                    "description": {
                        "type": "string",
                        "description": "Optional description of the pattern"
                    }
                }
            }),
        },
        ToolDefinition {
            name: "stop_play".to_string(),
            description: "Stop playback in every connected peer.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
    ]
}

/// Read an optional string argument; present-but-not-a-string is an error.
fn optional_str<'a>(args: &'a Value, key: &str) -> TetherResult<Option<&'a str>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(TetherError::InvalidInput(format!(
            "'{key}' must be a string"
        ))),
    }
}

fn preview(code: &str, max_chars: usize) -> String {
    match code.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &code[..idx]),
        None => code.to_string(),
    }
}
