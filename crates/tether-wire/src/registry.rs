//! Peer registry: tracks connected peers and delivers messages to them.
//!
//! The [`PeerRegistry`] is a cloneable handle to a thread-safe map of live
//! peers. Delivery never holds the lock across an `.await`: broadcast and
//! targeted sends work on a snapshot, so peers may connect or disconnect
//! while a send is in flight. A peer whose channel fails is removed.

use crate::error::WireError;
use crate::message::{encode_outbound, OutboundMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Process-local peer identifier. Not stable across reconnects.
pub type PeerId = u64;

/// The send half of a peer's duplex connection.
#[async_trait]
pub trait PeerChannel: Send + Sync + 'static {
    /// Queue one text frame for the peer.
    async fn send_text(&self, text: String) -> Result<(), WireError>;
}

/// Bounded queues never wait for capacity: a peer whose writer has fallen
/// a full queue behind is treated as failed.
#[async_trait]
impl PeerChannel for mpsc::Sender<String> {
    async fn send_text(&self, text: String) -> Result<(), WireError> {
        self.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => WireError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => WireError::ChannelClosed,
        })
    }
}

#[async_trait]
impl PeerChannel for mpsc::UnboundedSender<String> {
    async fn send_text(&self, text: String) -> Result<(), WireError> {
        self.send(text).map_err(|_| WireError::ChannelClosed)
    }
}

/// A registered peer.
#[derive(Clone)]
struct PeerEntry {
    info: PeerInfo,
    channel: Arc<dyn PeerChannel>,
}

/// Public, channel-free view of a peer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    /// Registry-assigned identifier.
    pub id: PeerId,
    /// Session identifier declared by the peer, if any.
    pub session_id: Option<String>,
    /// Remote socket address, when the transport knows it.
    pub remote_addr: Option<SocketAddr>,
    /// When the peer connected.
    pub connected_at: DateTime<Utc>,
}

/// Result of a targeted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The frame was handed to the peer's channel.
    Delivered,
    /// No live peer matches the target.
    PeerNotFound,
    /// The peer's channel failed; the peer has been deregistered.
    Failed(String),
}

/// Result of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the message was attempted against.
    pub attempted: usize,
    /// Peers whose channel accepted the message.
    pub delivered: usize,
}

impl BroadcastReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.delivered
    }
}

/// Thread-safe registry of live peers.
#[derive(Clone)]
pub struct PeerRegistry {
    peers: Arc<RwLock<HashMap<PeerId, PeerEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl PeerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Add a peer and return its identifier.
    pub fn register(
        &self,
        session_id: Option<String>,
        remote_addr: Option<SocketAddr>,
        channel: Arc<dyn PeerChannel>,
    ) -> PeerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let info = PeerInfo {
            id,
            session_id,
            remote_addr,
            connected_at: Utc::now(),
        };
        let total = {
            let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
            peers.insert(id, PeerEntry { info, channel });
            peers.len()
        };
        info!(peer_id = id, total, "Peer connected");
        id
    }

    /// Remove a peer. Removing an absent peer is a no-op.
    pub fn deregister(&self, id: PeerId) -> Option<PeerInfo> {
        let (removed, total) = {
            let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
            let removed = peers.remove(&id).map(|e| e.info);
            (removed, peers.len())
        };
        if removed.is_some() {
            info!(peer_id = id, total, "Peer disconnected");
        }
        removed
    }

    /// Deliver `msg` to every live peer independently.
    ///
    /// A failing peer does not stop delivery to the others; it is
    /// deregistered once the pass completes.
    pub async fn broadcast(&self, msg: &OutboundMessage) -> Result<BroadcastReport, WireError> {
        let text = encode_outbound(msg)?;
        let report = self.broadcast_text(&text).await;
        debug!(
            kind = msg.kind(),
            attempted = report.attempted,
            delivered = report.delivered,
            "Broadcast message"
        );
        Ok(report)
    }

    /// Deliver a pre-encoded frame to every live peer.
    pub async fn broadcast_text(&self, text: &str) -> BroadcastReport {
        let snapshot: Vec<(PeerId, Arc<dyn PeerChannel>)> = {
            let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
            peers
                .values()
                .map(|e| (e.info.id, Arc::clone(&e.channel)))
                .collect()
        };

        let mut report = BroadcastReport {
            attempted: snapshot.len(),
            delivered: 0,
        };
        let mut failed = Vec::new();
        for (id, channel) in snapshot {
            match channel.send_text(text.to_string()).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(peer_id = id, error = %e, "Broadcast to peer failed");
                    failed.push(id);
                }
            }
        }

        for id in failed {
            self.deregister(id);
        }
        report
    }

    /// Deliver `msg` to exactly one peer.
    pub async fn send_to(&self, id: PeerId, msg: &OutboundMessage) -> Result<SendOutcome, WireError> {
        let text = encode_outbound(msg)?;
        let channel = {
            let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
            peers.get(&id).map(|e| Arc::clone(&e.channel))
        };
        let Some(channel) = channel else {
            debug!(peer_id = id, kind = msg.kind(), "Send target not found");
            return Ok(SendOutcome::PeerNotFound);
        };

        match channel.send_text(text).await {
            Ok(()) => {
                debug!(peer_id = id, kind = msg.kind(), "Sent message to peer");
                Ok(SendOutcome::Delivered)
            }
            Err(e) => {
                warn!(peer_id = id, error = %e, "Send to peer failed");
                self.deregister(id);
                Ok(SendOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Deliver `msg` to the peer that declared `session_id`.
    ///
    /// Falls back to interpreting `session_id` as a decimal [`PeerId`].
    pub async fn send_to_session(
        &self,
        session_id: &str,
        msg: &OutboundMessage,
    ) -> Result<SendOutcome, WireError> {
        match self.find_session(session_id) {
            Some(id) => self.send_to(id, msg).await,
            None => Ok(SendOutcome::PeerNotFound),
        }
    }

    /// Resolve a session identifier to a live peer.
    pub fn find_session(&self, session_id: &str) -> Option<PeerId> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers
            .values()
            .filter(|e| e.info.session_id.as_deref() == Some(session_id))
            .map(|e| e.info.id)
            .min()
            .or_else(|| {
                session_id
                    .parse::<PeerId>()
                    .ok()
                    .filter(|id| peers.contains_key(id))
            })
    }

    /// Snapshot of a specific peer.
    pub fn get_peer(&self, id: PeerId) -> Option<PeerInfo> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.get(&id).map(|e| e.info.clone())
    }

    /// Snapshot of all live peers, oldest first.
    pub fn peers(&self) -> Vec<PeerInfo> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<PeerInfo> = peers.values().map(|e| e.info.clone()).collect();
        list.sort_by_key(|p| p.id);
        list
    }

    /// Number of live peers.
    pub fn count(&self) -> usize {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
