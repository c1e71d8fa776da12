//! TetherKernel: assembles and owns the bridge components.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tether_runtime::{ToolFacade, ToolHost};
use tether_types::config::TetherConfig;
use tether_types::error::TetherError;
use tether_wire::bridge::PendingInfo;
use tether_wire::{BridgeStats, CorrelationBridge, PeerInfo, PeerRegistry};
use tracing::info;

use crate::config::load_config;
use crate::error::KernelResult;

/// The process-wide bridge: one registry, one pending table, one façade.
pub struct TetherKernel {
    /// Effective configuration.
    pub config: TetherConfig,
    /// Live peers.
    pub registry: PeerRegistry,
    /// Pending-request table.
    pub bridge: Arc<CorrelationBridge>,
    /// Caller-facing round-trips.
    pub facade: Arc<ToolFacade>,
    /// Tool catalog bound to the façade.
    pub tools: Arc<ToolHost>,
    started_at: Instant,
}

/// Point-in-time status report.
#[derive(Debug, Clone, Serialize)]
pub struct KernelStatus {
    pub websocket_connections: usize,
    pub pending_requests: usize,
    pub uptime_secs: u64,
    pub bridge: BridgeStats,
    pub peers: Vec<PeerInfo>,
    pub pending: Vec<PendingInfo>,
}

impl TetherKernel {
    /// Load configuration (file + env) and boot.
    pub fn boot(config_path: Option<&Path>) -> KernelResult<Self> {
        Self::boot_with_config(load_config(config_path))
    }

    /// Boot from an explicit configuration.
    pub fn boot_with_config(config: TetherConfig) -> KernelResult<Self> {
        validate(&config)?;

        let registry = PeerRegistry::new();
        let bridge = Arc::new(CorrelationBridge::new());
        let facade = Arc::new(ToolFacade::new(
            registry.clone(),
            Arc::clone(&bridge),
            config.bridge.clone(),
        ));
        let tools = Arc::new(ToolHost::new(
            Arc::clone(&facade),
            config.peers.default_pattern.clone(),
        ));

        info!(
            listen = %config.listen_addr,
            state_timeout_ms = config.bridge.state_timeout_ms,
            code_timeout_ms = config.bridge.code_timeout_ms,
            "Tether kernel booted"
        );

        Ok(Self {
            config,
            registry,
            bridge,
            facade,
            tools,
            started_at: Instant::now(),
        })
    }

    /// The validated listen address.
    pub fn listen_addr(&self) -> KernelResult<SocketAddr> {
        parse_listen_addr(&self.config.listen_addr)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn status(&self) -> KernelStatus {
        KernelStatus {
            websocket_connections: self.registry.count(),
            pending_requests: self.bridge.pending_count(),
            uptime_secs: self.uptime_secs(),
            bridge: self.bridge.stats(),
            peers: self.registry.peers(),
            pending: self.bridge.pending(),
        }
    }

    /// Wake every suspended caller so none waits out its full timeout.
    pub fn shutdown(&self) {
        let drained = self.bridge.close_all();
        let stats = self.bridge.stats();
        info!(
            drained,
            registered = stats.registered,
            resolved = stats.resolved,
            expired = stats.expired,
            stale = stats.stale,
            cancelled = stats.cancelled,
            "Tether kernel shut down"
        );
    }
}

fn parse_listen_addr(addr: &str) -> KernelResult<SocketAddr> {
    addr.parse().map_err(|e| {
        TetherError::Config(format!("listen_addr '{addr}' is not a socket address: {e}")).into()
    })
}

fn validate(config: &TetherConfig) -> KernelResult<()> {
    parse_listen_addr(&config.listen_addr)?;
    if config.bridge.state_timeout_ms == 0 || config.bridge.code_timeout_ms == 0 {
        return Err(TetherError::Config("bridge timeouts must be non-zero".to_string()).into());
    }
    if config.peers.outbound_queue == 0 {
        return Err(TetherError::Config("peers.outbound_queue must be non-zero".to_string()).into());
    }
    if config.peers.max_message_size == 0 {
        return Err(
            TetherError::Config("peers.max_message_size must be non-zero".to_string()).into(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;
    use tether_runtime::RequestKind;

    #[test]
    fn test_boot_defaults() {
        let kernel = TetherKernel::boot_with_config(TetherConfig::default()).unwrap();
        assert_eq!(kernel.listen_addr().unwrap().port(), 8080);
        let status = kernel.status();
        assert_eq!(status.websocket_connections, 0);
        assert_eq!(status.pending_requests, 0);
    }

    #[test]
    fn test_rejects_bad_listen_addr() {
        let config = TetherConfig {
            listen_addr: "localhost".to_string(),
            ..Default::default()
        };
        let err = TetherKernel::boot_with_config(config).err().unwrap();
        assert!(matches!(err, KernelError::Tether(TetherError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = TetherConfig::default();
        config.bridge.code_timeout_ms = 0;
        assert!(TetherKernel::boot_with_config(config).is_err());
    }

    #[tokio::test]
    async fn test_components_share_state() {
        let kernel = TetherKernel::boot_with_config(TetherConfig::default()).unwrap();
        let (tx, _rx) = tokio::sync::mpsc::channel::<String>(4);
        kernel.registry.register(None, None, Arc::new(tx));
        assert_eq!(kernel.facade.registry().count(), 1);
        assert_eq!(kernel.tools.facade().registry().count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let kernel = Arc::new(TetherKernel::boot_with_config(TetherConfig::default()).unwrap());
        let (tx, _rx) = tokio::sync::mpsc::channel::<String>(4);
        kernel.registry.register(None, None, Arc::new(tx));

        let call = {
            let kernel = Arc::clone(&kernel);
            tokio::spawn(async move { kernel.facade.request(RequestKind::State, None).await })
        };
        while kernel.bridge.pending_count() == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        kernel.shutdown();
        assert_eq!(call.await.unwrap().status(), "disconnected");
    }
}
