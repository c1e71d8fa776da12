//! Tether runtime: the caller side of the bridge.
//!
//! - [`facade`]: synchronous-looking round-trips to connected peers
//! - [`tools`]: the tool catalog and its execution
//! - [`validate`]: pre-flight checks for pushed patterns
//! - [`mcp_server`]: MCP JSON-RPC handling over any transport

pub mod facade;
pub mod mcp_server;
pub mod tools;
pub mod validate;

pub use facade::{RequestKind, ToolFacade};
pub use tools::ToolHost;
