//! Inbound dispatch: routes one raw peer frame.
//!
//! Responses carrying a token go to the [`CorrelationBridge`]; everything
//! else (liveness, diagnostics, unknown types) is handled here without
//! touching it. Nothing in this path fails the connection.

use crate::bridge::CorrelationBridge;
use crate::message::{decode_inbound, InboundMessage, OutboundMessage};
use serde_json::Value;
use tracing::{debug, error, warn};

/// What the dispatcher did with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Send this reply back to the originating peer only.
    Reply(OutboundMessage),
    /// A response was routed to the bridge. `accepted` is false for stale tokens.
    Routed { token: String, accepted: bool },
    /// Handled by a side-effect handler (logging).
    Logged,
    /// Dropped: malformed, unknown type, or a response without a token.
    Dropped,
}

/// Parse and route one text frame received from `peer_id`.
pub fn dispatch_inbound(text: &str, peer_id: u64, bridge: &CorrelationBridge) -> Dispatch {
    let msg = match decode_inbound(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(peer_id, error = %e, frame = %truncate(text, 200), "Malformed inbound frame dropped");
            return Dispatch::Dropped;
        }
    };

    match msg {
        InboundMessage::Ping => Dispatch::Reply(OutboundMessage::Pong),
        InboundMessage::StateResponse { request_id, state } => {
            route(bridge, peer_id, request_id, state)
        }
        InboundMessage::CodeResponse {
            request_id, code, ..
        } => {
            debug!(
                peer_id,
                chars = code.chars().count(),
                code = %truncate(&code, 100),
                "Received current editor code"
            );
            route(bridge, peer_id, request_id, Value::String(code))
        }
        InboundMessage::EvaluationError { error, code } => {
            error!(
                peer_id,
                error = error.as_deref().unwrap_or("Unknown error"),
                code = code.as_deref().unwrap_or("Unknown code"),
                "Peer reported evaluation error"
            );
            Dispatch::Logged
        }
        InboundMessage::Unknown => {
            debug!(peer_id, "Ignoring inbound frame of unknown type");
            Dispatch::Dropped
        }
    }
}

fn route(bridge: &CorrelationBridge, peer_id: u64, token: String, payload: Value) -> Dispatch {
    if token.is_empty() {
        warn!(peer_id, "Response without request_id dropped");
        return Dispatch::Dropped;
    }
    let accepted = bridge.resolve(&token, payload);
    if !accepted {
        debug!(peer_id, token = %token, "Stale response ignored");
    }
    Dispatch::Routed { token, accepted }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Resolution, Token};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_ping_replies_pong() {
        let bridge = CorrelationBridge::new();
        let result = dispatch_inbound(r#"{"type":"ping"}"#, 1, &bridge);
        assert_eq!(result, Dispatch::Reply(OutboundMessage::Pong));
        assert_eq!(bridge.stats().stale, 0);
    }

    #[tokio::test]
    async fn test_state_response_resolves() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-state");

        let frame = json!({
            "type": "state-response",
            "request_id": token.as_str(),
            "state": {"count": 2}
        })
        .to_string();
        let result = dispatch_inbound(&frame, 7, &bridge);
        assert_eq!(
            result,
            Dispatch::Routed {
                token: token.to_string(),
                accepted: true
            }
        );
        assert_eq!(
            bridge.await_response(handle, Duration::from_secs(1)).await,
            Resolution::Resolved(json!({"count": 2}))
        );
    }

    #[tokio::test]
    async fn test_code_response_resolves_with_string() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-current-code");

        let frame = json!({
            "type": "current-code-response",
            "request_id": token.as_str(),
            "code": "s(\"hh*8\")"
        })
        .to_string();
        dispatch_inbound(&frame, 1, &bridge);
        assert_eq!(
            bridge.await_response(handle, Duration::from_secs(1)).await,
            Resolution::Resolved(json!("s(\"hh*8\")"))
        );
    }

    #[test]
    fn test_stale_response_is_not_an_error() {
        let bridge = CorrelationBridge::new();
        let frame = r#"{"type":"state-response","request_id":"gone","state":{}}"#;
        assert_eq!(
            dispatch_inbound(frame, 1, &bridge),
            Dispatch::Routed {
                token: "gone".into(),
                accepted: false
            }
        );
    }

    #[test]
    fn test_malformed_does_not_touch_bridge() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let _handle = bridge.register(token.clone(), "get-state");

        assert_eq!(dispatch_inbound("{not json", 1, &bridge), Dispatch::Dropped);
        assert_eq!(dispatch_inbound(r#"{"no_type":1}"#, 1, &bridge), Dispatch::Dropped);
        assert!(bridge.is_pending(token.as_str()));
    }

    #[test]
    fn test_missing_token_dropped() {
        let bridge = CorrelationBridge::new();
        let frame = r#"{"type":"current-code-response","code":"x"}"#;
        assert_eq!(dispatch_inbound(frame, 1, &bridge), Dispatch::Dropped);
    }

    #[test]
    fn test_evaluation_error_logged() {
        let bridge = CorrelationBridge::new();
        let frame = r#"{"type":"evaluation-error","error":"unexpected token","code":"s(("}"#;
        assert_eq!(dispatch_inbound(frame, 1, &bridge), Dispatch::Logged);
    }

    #[test]
    fn test_unknown_type_dropped() {
        let bridge = CorrelationBridge::new();
        assert_eq!(
            dispatch_inbound(r#"{"type":"hello"}"#, 1, &bridge),
            Dispatch::Dropped
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééé", 2), "éé...");
    }
}
