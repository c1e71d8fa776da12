//! MCP Server — expose the bridge tools via the Model Context Protocol.
//!
//! A transport-independent JSON-RPC 2.0 handler. The HTTP server and the
//! CLI's stdio loop both feed requests through [`handle_mcp_request`].

use serde_json::{json, Value};
use tether_types::error::TetherError;
use tracing::{debug, warn};

use crate::tools::ToolHost;

/// MCP protocol version supported by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Handle an incoming MCP JSON-RPC message.
///
/// Returns `None` for notifications (messages without an `id`), which must
/// not be answered.
pub async fn handle_mcp_request(request: &Value, host: &ToolHost) -> Option<Value> {
    let method = request["method"].as_str().unwrap_or("");
    let id = request.get("id").cloned().filter(|id| !id.is_null());

    let Some(id) = id else {
        debug!(method, "MCP notification");
        return None;
    };

    let response = match method {
        "initialize" => make_response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "tether",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        ),
        "ping" => make_response(id, json!({})),
        "tools/list" => {
            let tool_list: Vec<Value> = host
                .definitions()
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "inputSchema": t.input_schema,
                    })
                })
                .collect();

            make_response(id, json!({ "tools": tool_list }))
        }
        "tools/call" => {
            let tool_name = request["params"]["name"].as_str().unwrap_or("");
            let arguments = request["params"]
                .get("arguments")
                .cloned()
                .unwrap_or(json!({}));

            if !host.has_tool(tool_name) {
                return Some(make_error(
                    id,
                    -32602,
                    &format!("Unknown tool: {tool_name}"),
                ));
            }

            match host.execute(tool_name, &arguments).await {
                Ok(text) => make_response(
                    id,
                    json!({
                        "content": [{
                            "type": "text",
                            "text": text
                        }]
                    }),
                ),
                Err(TetherError::UnknownTool(name)) => {
                    make_error(id, -32602, &format!("Unknown tool: {name}"))
                }
                Err(e) => {
                    warn!(tool = tool_name, error = %e, "Tool call failed");
                    make_response(
                        id,
                        json!({
                            "content": [{
                                "type": "text",
                                "text": e.to_string()
                            }],
                            "isError": true
                        }),
                    )
                }
            }
        }
        _ => make_error(id, -32601, &format!("Method not found: {method}")),
    };
    Some(response)
}

/// Build a JSON-RPC 2.0 success response.
fn make_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

/// Build a JSON-RPC 2.0 error response.
pub fn make_error(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message,
        },
    })
}
