//! Tether CLI — run the bridge, serve MCP over stdio, or query a running bridge.

mod cli;
mod mcp;

use crate::cli::{Cli, Commands};
use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tether_kernel::config::load_config;
use tether_kernel::TetherKernel;
use tether_types::config::TetherConfig;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const DEFAULT_LOG_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Trace to stderr; stdout is reserved for MCP frames.
///
/// Installed before configuration loads so config diagnostics are not lost.
/// The returned handle narrows the filter once `log_level` is known.
fn init_tracing_stderr(rust_log: Option<&str>) -> FilterHandle {
    let filter = rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_LEVEL));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
    handle
}

/// The filter to apply after config loads; `RUST_LOG` always wins.
fn configured_filter(rust_log: Option<&str>, log_level: &str) -> Option<String> {
    match rust_log {
        Some(directives) if !directives.trim().is_empty() => None,
        _ => Some(log_level.to_string()),
    }
}

fn apply_log_level(handle: &FilterHandle, rust_log: Option<&str>, log_level: &str) {
    let Some(directives) = configured_filter(rust_log, log_level) else {
        return;
    };
    match EnvFilter::try_new(&directives) {
        Ok(filter) => {
            if let Err(e) = handle.reload(filter) {
                warn!(error = %e, "Failed to apply configured log level");
            }
        }
        Err(e) => warn!(log_level = %directives, error = %e, "Invalid log_level; keeping default"),
    }
}

fn main() {
    let cli = Cli::parse();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = init_tracing_stderr(rust_log.as_deref());
    let config = load_config(cli.config.as_deref());
    apply_log_level(&filter, rust_log.as_deref(), &config.log_level);

    let result = match cli.command {
        Commands::Start => cmd_start(config),
        Commands::Mcp => mcp::run_mcp_server(config),
        Commands::Status { json } => cmd_status(&config, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_start(config: TetherConfig) -> anyhow::Result<()> {
    let kernel = Arc::new(TetherKernel::boot_with_config(config).context("Failed to boot bridge")?);
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    rt.block_on(tether_api::run_server(kernel, async {
        let _ = tokio::signal::ctrl_c().await;
    }))?;
    Ok(())
}

fn cmd_status(config: &TetherConfig, json: bool) -> anyhow::Result<()> {
    let url = format!("{}/api/status", base_url(config)?);
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;
    let body: Value = client
        .get(&url)
        .send()
        .with_context(|| format!("No bridge reachable at {url}"))?
        .json()
        .context("Bridge returned an unreadable status")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Server:    {}", body["server"].as_str().unwrap_or("unknown"));
    println!("Peers:     {}", body["websocket_connections"]);
    println!("Pending:   {}", body["pending_requests"]);
    println!("Uptime:    {}s", body["uptime_secs"]);
    if let Some(peers) = body["peers"].as_array() {
        for peer in peers {
            println!(
                "  #{} session={} addr={}",
                peer["id"],
                peer["session_id"].as_str().unwrap_or("-"),
                peer["remote_addr"].as_str().unwrap_or("-"),
            );
        }
    }
    Ok(())
}

/// Loopback URL for the configured listener; wildcard binds are reached via 127.0.0.1.
fn base_url(config: &TetherConfig) -> anyhow::Result<String> {
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen_addr '{}'", config.listen_addr))?;
    let ip = if addr.ip().is_unspecified() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        addr.ip()
    };
    Ok(format!("http://{}", SocketAddr::new(ip, addr.port())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_wildcard() {
        let config = TetherConfig::default();
        assert_eq!(base_url(&config).unwrap(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_base_url_explicit_host() {
        let config = TetherConfig {
            listen_addr: "10.0.0.5:9000".to_string(),
            ..Default::default()
        };
        assert_eq!(base_url(&config).unwrap(), "http://10.0.0.5:9000");
    }

    #[test]
    fn test_config_level_applies_without_rust_log() {
        assert_eq!(configured_filter(None, "debug").as_deref(), Some("debug"));
        assert_eq!(configured_filter(Some("  "), "warn").as_deref(), Some("warn"));
    }

    #[test]
    fn test_rust_log_overrides_config_level() {
        assert_eq!(configured_filter(Some("tether_wire=trace"), "warn"), None);
    }

    #[test]
    fn test_reload_swaps_filter() {
        let (layer, handle) = reload::Layer::<EnvFilter, Registry>::new(EnvFilter::new("info"));
        let _subscriber = tracing_subscriber::registry().with(layer);
        apply_log_level(&handle, None, "debug");
        let current = handle.with_current(|f| f.to_string()).unwrap();
        assert!(current.contains("debug"));
    }
}
