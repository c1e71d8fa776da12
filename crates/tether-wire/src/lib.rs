//! Tether wire protocol — the peer side of the bridge.
//!
//! Peers are long-lived duplex connections (WebSocket in the API server)
//! that exchange JSON objects discriminated by a `type` field. A caller's
//! request is fanned out to peers carrying a correlation token and answered
//! asynchronously by whichever peer replies first.
//!
//! ## Architecture
//!
//! - **PeerRegistry**: Tracks live peers; broadcast and targeted delivery
//! - **CorrelationBridge**: Maps pending tokens to one-shot result slots
//! - **OutboundMessage / InboundMessage**: JSON-framed protocol messages
//! - **dispatch_inbound**: Routes a raw peer frame to the bridge or a side-effect handler

pub mod bridge;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod registry;

pub use bridge::{BridgeStats, CorrelationBridge, PendingHandle, Resolution, Token};
pub use dispatch::{dispatch_inbound, Dispatch};
pub use error::WireError;
pub use message::{InboundMessage, OutboundMessage};
pub use registry::{BroadcastReport, PeerChannel, PeerId, PeerInfo, PeerRegistry, SendOutcome};
