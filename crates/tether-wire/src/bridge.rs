//! Correlation bridge — matches outstanding requests to peer responses.
//!
//! Flow:
//! 1. The façade generates a [`Token`] and calls [`CorrelationBridge::register`]
//! 2. The token travels to peers inside an outbound message
//! 3. A peer answers; the dispatcher calls [`CorrelationBridge::resolve`]
//! 4. The façade awaits the handle with [`CorrelationBridge::await_response`]
//!
//! Every entry leaves the table exactly once. Removal from the `DashMap` is
//! the arbiter: whoever removes the entry (resolve, timeout, cancel,
//! shutdown drain, or the handle being dropped) decides the outcome, and
//! every later attempt is a no-op.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Opaque correlation token linking one request to its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Generate a fresh, process-unique token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An entry in the pending table.
struct PendingEntry {
    /// Write-once result slot.
    slot: oneshot::Sender<Value>,
    /// Wall-clock creation time, for diagnostics only.
    created_at: DateTime<Utc>,
    /// Monotonic creation time, for latency logging.
    started: Instant,
    /// Request kind (for logging).
    kind: String,
}

/// The awaitable side of a pending request.
///
/// Dropping the handle (for example when the awaiting task is aborted)
/// removes its token from the table if it is still pending.
pub struct PendingHandle {
    token: Token,
    rx: oneshot::Receiver<Value>,
    table: Weak<Table>,
}

impl PendingHandle {
    pub fn token(&self) -> &Token {
        &self.token
    }
}

impl fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle")
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        if table.pending.remove(self.token.as_str()).is_some() {
            table.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(token = %self.token, "Pending request dropped by its caller");
        }
    }
}

/// How a pending request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A peer answered; the payload is exactly what it sent.
    Resolved(Value),
    /// The deadline passed first. The token has been removed from the table.
    Expired { token: Token },
    /// The bridge was drained (shutdown) while the request was outstanding.
    Abandoned { token: Token },
}

/// Diagnostic view of one pending entry.
#[derive(Debug, Clone, Serialize)]
pub struct PendingInfo {
    pub token: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Lifetime counters.
#[derive(Debug, Default)]
struct Counters {
    registered: AtomicU64,
    resolved: AtomicU64,
    expired: AtomicU64,
    stale: AtomicU64,
    cancelled: AtomicU64,
}

/// Snapshot of bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Tokens ever registered.
    pub registered: u64,
    /// Tokens resolved by a peer response.
    pub resolved: u64,
    /// Tokens that hit their deadline.
    pub expired: u64,
    /// Responses that arrived for a token no longer pending.
    pub stale: u64,
    /// Tokens torn down by cancel or shutdown drain.
    pub cancelled: u64,
}

/// Shared between the bridge and every outstanding handle.
#[derive(Default)]
struct Table {
    pending: DashMap<String, PendingEntry>,
    counters: Counters,
}

/// The pending-request table.
pub struct CorrelationBridge {
    table: Arc<Table>,
}

impl CorrelationBridge {
    /// Create an empty bridge.
    pub fn new() -> Self {
        Self {
            table: Arc::new(Table::default()),
        }
    }

    /// Insert a `PENDING` entry for `token` and return its awaitable handle.
    ///
    /// Tokens must be unique among pending entries; [`Token::generate`]
    /// guarantees this in practice and collisions are not defended against.
    pub fn register(&self, token: Token, kind: &str) -> PendingHandle {
        let (tx, rx) = oneshot::channel();
        self.table.pending.insert(
            token.as_str().to_string(),
            PendingEntry {
                slot: tx,
                created_at: Utc::now(),
                started: Instant::now(),
                kind: kind.to_string(),
            },
        );
        self.table.counters.registered.fetch_add(1, Ordering::Relaxed);
        debug!(token = %token, kind, "Registered pending request");
        PendingHandle {
            token,
            rx,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Fill the result slot for `token` and remove it from the table.
    ///
    /// Returns `true` if this call resolved the request. Unknown, already
    /// resolved and expired tokens are a silent no-op returning `false`.
    pub fn resolve(&self, token: &str, payload: Value) -> bool {
        let Some((_, entry)) = self.table.pending.remove(token) else {
            self.table.counters.stale.fetch_add(1, Ordering::Relaxed);
            debug!(token, "Response for unknown or expired token dropped");
            return false;
        };

        let elapsed = entry.started.elapsed();
        if entry.slot.send(payload).is_err() {
            // The awaiting side is gone (its future was dropped).
            self.table.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(token, kind = %entry.kind, "Pending request receiver dropped");
            return false;
        }

        self.table.counters.resolved.fetch_add(1, Ordering::Relaxed);
        info!(
            token,
            kind = %entry.kind,
            elapsed_ms = elapsed.as_millis() as u64,
            "Resolved pending request"
        );
        true
    }

    /// Tear down a pending entry without resolving it.
    ///
    /// Used when delivery fails after registration. Returns `false` if the
    /// token was not pending.
    pub fn cancel(&self, token: &Token) -> bool {
        if self.table.pending.remove(token.as_str()).is_some() {
            self.table.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(token = %token, "Cancelled pending request");
            true
        } else {
            false
        }
    }

    /// Wait for `handle` to be resolved, bounded by `timeout`.
    ///
    /// On expiry the token is removed from the table before returning, so a
    /// late [`resolve`](Self::resolve) finds nothing. If a resolve removed the
    /// entry first, its payload wins even when it lands just after the
    /// deadline.
    pub async fn await_response(&self, mut handle: PendingHandle, timeout: Duration) -> Resolution {
        let token = handle.token.clone();

        match tokio::time::timeout(timeout, &mut handle.rx).await {
            Ok(Ok(payload)) => Resolution::Resolved(payload),
            Ok(Err(_)) => Resolution::Abandoned { token },
            Err(_) => {
                if self.table.pending.remove(token.as_str()).is_some() {
                    self.table.counters.expired.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        token = %token,
                        timeout_ms = timeout.as_millis() as u64,
                        "Pending request expired"
                    );
                    return Resolution::Expired { token };
                }
                // Lost the race: a resolve (or drain) already owns the entry
                // and is about to fill or drop the slot.
                match (&mut handle.rx).await {
                    Ok(payload) => Resolution::Resolved(payload),
                    Err(_) => Resolution::Abandoned { token },
                }
            }
        }
    }

    /// Drop every pending entry, waking all awaiting callers with
    /// [`Resolution::Abandoned`]. Returns the number of entries drained.
    pub fn close_all(&self) -> usize {
        let tokens: Vec<String> = self
            .table
            .pending
            .iter()
            .map(|e| e.key().clone())
            .collect();
        let mut drained = 0;
        for token in tokens {
            if self.table.pending.remove(&token).is_some() {
                drained += 1;
            }
        }
        if drained > 0 {
            self.table
                .counters
                .cancelled
                .fetch_add(drained as u64, Ordering::Relaxed);
            info!(drained, "Drained pending requests");
        }
        drained
    }

    /// Number of currently pending requests.
    pub fn pending_count(&self) -> usize {
        self.table.pending.len()
    }

    /// Whether `token` is still pending.
    pub fn is_pending(&self, token: &str) -> bool {
        self.table.pending.contains_key(token)
    }

    /// Diagnostic listing of pending entries.
    pub fn pending(&self) -> Vec<PendingInfo> {
        self.table
            .pending
            .iter()
            .map(|e| PendingInfo {
                token: e.key().clone(),
                kind: e.value().kind.clone(),
                created_at: e.value().created_at,
            })
            .collect()
    }

    /// Snapshot of lifetime counters.
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            registered: self.table.counters.registered.load(Ordering::Relaxed),
            resolved: self.table.counters.resolved.load(Ordering::Relaxed),
            expired: self.table.counters.expired.load(Ordering::Relaxed),
            stale: self.table.counters.stale.load(Ordering::Relaxed),
            cancelled: self.table.counters.cancelled.load(Ordering::Relaxed),
        }
    }
}

impl Default for CorrelationBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_round_trip_preserves_payload() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-state");
        assert!(bridge.is_pending(token.as_str()));

        let payload = json!({
            "buttons": [{"id": 1, "on": true}, {"id": 2, "on": false}],
            "meta": {"nested": {"deep": [1, 2.5, "x", null]}}
        });
        assert!(bridge.resolve(token.as_str(), payload.clone()));

        let result = bridge
            .await_response(handle, Duration::from_secs(1))
            .await;
        assert_eq!(result, Resolution::Resolved(payload));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_first_resolve_wins() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-state");

        assert!(bridge.resolve(token.as_str(), json!("first")));
        assert!(!bridge.resolve(token.as_str(), json!("second")));

        let result = bridge
            .await_response(handle, Duration::from_secs(1))
            .await;
        assert_eq!(result, Resolution::Resolved(json!("first")));
        assert_eq!(bridge.stats().resolved, 1);
        assert_eq!(bridge.stats().stale, 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_single_effect() {
        let bridge = Arc::new(CorrelationBridge::new());
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-current-code");

        let mut tasks = Vec::new();
        for i in 0..8 {
            let bridge = Arc::clone(&bridge);
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                bridge.resolve(token.as_str(), json!(i))
            }));
        }
        let mut wins = 0;
        for t in tasks {
            if t.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        match bridge.await_response(handle, Duration::from_secs(1)).await {
            Resolution::Resolved(v) => assert!(v.as_i64().is_some()),
            other => panic!("Expected Resolved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_tears_down_state() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-state");

        let result = bridge
            .await_response(handle, Duration::from_millis(50))
            .await;
        assert_eq!(
            result,
            Resolution::Expired {
                token: token.clone()
            }
        );
        assert!(!bridge.is_pending(token.as_str()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!bridge.resolve(token.as_str(), json!({"late": true})));
        assert_eq!(bridge.pending_count(), 0);
        assert_eq!(bridge.stats().expired, 1);
        assert_eq!(bridge.stats().stale, 1);
    }

    #[tokio::test]
    async fn test_resolve_unknown_token_is_noop() {
        let bridge = CorrelationBridge::new();
        assert!(!bridge.resolve("never-registered", json!(null)));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let _handle = bridge.register(token.clone(), "get-state");

        assert!(bridge.cancel(&token));
        assert!(!bridge.is_pending(token.as_str()));
        // Cancel again should return false
        assert!(!bridge.cancel(&token));
        assert!(!bridge.resolve(token.as_str(), json!(1)));
    }

    #[tokio::test]
    async fn test_resolution_order_is_independent() {
        let bridge = Arc::new(CorrelationBridge::new());
        let a = Token::generate();
        let b = Token::generate();
        let ha = bridge.register(a.clone(), "get-state");
        let hb = bridge.register(b.clone(), "get-state");

        let waiter_a = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.await_response(ha, Duration::from_secs(1)).await })
        };
        let waiter_b = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.await_response(hb, Duration::from_secs(1)).await })
        };

        // Resolve in reverse issue order.
        assert!(bridge.resolve(b.as_str(), json!("b")));
        assert!(bridge.resolve(a.as_str(), json!("a")));

        assert_eq!(waiter_b.await.unwrap(), Resolution::Resolved(json!("b")));
        assert_eq!(waiter_a.await.unwrap(), Resolution::Resolved(json!("a")));
    }

    #[tokio::test]
    async fn test_close_all_abandons_waiters() {
        let bridge = Arc::new(CorrelationBridge::new());
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-state");

        let waiter = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.await_response(handle, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(bridge.close_all(), 1);
        assert_eq!(waiter.await.unwrap(), Resolution::Abandoned { token });
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_pending_listing() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let _handle = bridge.register(token.clone(), "get-current-code");

        let listing = bridge.pending();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].token, token.as_str());
        assert_eq!(listing[0].kind, "get-current-code");
    }

    #[tokio::test]
    async fn test_dropped_handle_removes_entry() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-state");

        drop(handle);
        assert!(!bridge.is_pending(token.as_str()));
        assert_eq!(bridge.stats().cancelled, 1);
        assert!(!bridge.resolve(token.as_str(), json!(1)));
    }

    #[tokio::test]
    async fn test_aborted_waiter_removes_entry() {
        let bridge = Arc::new(CorrelationBridge::new());
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-state");

        let waiter = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.await_response(handle, Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(bridge.is_pending(token.as_str()));

        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert_eq!(bridge.pending_count(), 0);
    }

    #[test]
    fn test_handle_outliving_bridge() {
        let bridge = CorrelationBridge::new();
        let handle = bridge.register(Token::generate(), "get-state");
        drop(bridge);
        drop(handle);
    }

    #[tokio::test]
    async fn test_claimed_entry_filled_after_deadline_resolves() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-state");

        // A resolver has taken the entry but not yet filled the slot when
        // the deadline passes.
        let (_, entry) = bridge.table.pending.remove(token.as_str()).unwrap();
        let filler = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            entry.slot.send(json!("owned")).unwrap();
        });

        let result = bridge
            .await_response(handle, Duration::from_millis(20))
            .await;
        filler.await.unwrap();
        assert_eq!(result, Resolution::Resolved(json!("owned")));
        assert_eq!(bridge.stats().expired, 0);
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_claimed_entry_dropped_after_deadline_abandons() {
        let bridge = CorrelationBridge::new();
        let token = Token::generate();
        let handle = bridge.register(token.clone(), "get-state");

        let (_, entry) = bridge.table.pending.remove(token.as_str()).unwrap();
        let dropper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            drop(entry);
        });

        let result = bridge
            .await_response(handle, Duration::from_millis(20))
            .await;
        dropper.await.unwrap();
        assert_eq!(result, Resolution::Abandoned { token });
        assert_eq!(bridge.stats().expired, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resolve_racing_deadline_has_one_outcome() {
        const ROUNDS: u64 = 200;
        let bridge = Arc::new(CorrelationBridge::new());

        for _ in 0..ROUNDS {
            let token = Token::generate();
            let handle = bridge.register(token.clone(), "get-state");
            let resolver = {
                let bridge = Arc::clone(&bridge);
                let token = token.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    bridge.resolve(token.as_str(), json!("v"))
                })
            };

            let outcome = bridge
                .await_response(handle, Duration::from_millis(1))
                .await;
            let resolver_won = resolver.await.unwrap();
            match outcome {
                Resolution::Resolved(v) => {
                    assert!(resolver_won);
                    assert_eq!(v, json!("v"));
                }
                Resolution::Expired { .. } => assert!(!resolver_won),
                other => panic!("Unexpected outcome {other:?}"),
            }
            assert_eq!(bridge.pending_count(), 0);
        }

        let stats = bridge.stats();
        assert_eq!(stats.resolved + stats.expired, ROUNDS);
        assert_eq!(stats.stale, stats.expired);
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = Token::generate();
        let b = Token::generate();
        assert_ne!(a, b);
    }
}
