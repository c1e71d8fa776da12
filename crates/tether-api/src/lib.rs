//! HTTP/WebSocket server for the Tether peer bridge.
//!
//! Peers connect to `/ws`; callers reach the tools over `POST /mcp`
//! (JSON-RPC) or read bridge health from `/api/status`.

pub mod routes;
pub mod server;
pub mod ws;

pub use server::{build_router, run_server, serve};
