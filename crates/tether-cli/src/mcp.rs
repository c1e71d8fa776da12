//! MCP (Model Context Protocol) server over stdio.
//!
//! Boots an in-process bridge, runs the peer server on a background
//! runtime, and answers JSON-RPC 2.0 on stdin/stdout. Both Content-Length
//! framing and newline-delimited JSON are accepted; each response uses the
//! framing of the request it answers. Requests run concurrently; a single
//! writer thread owns stdout.

use anyhow::Context;
use serde_json::Value;
use std::io::{self, BufRead, Read, Write};
use std::sync::{mpsc, Arc};
use std::thread;
use tether_kernel::TetherKernel;
use tether_runtime::mcp_server::{handle_mcp_request, make_error};
use tether_runtime::ToolHost;
use tether_types::config::TetherConfig;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Reject bodies larger than this to avoid unbounded allocation.
const MAX_MCP_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    ContentLength,
    Line,
}

#[derive(Debug)]
struct Frame {
    body: Result<Value, serde_json::Error>,
    framing: Framing,
}

/// A response waiting for the stdout writer.
#[derive(Debug)]
struct Reply {
    msg: Value,
    framing: Framing,
}

/// Run the MCP server over stdio until stdin closes.
pub fn run_mcp_server(config: TetherConfig) -> anyhow::Result<()> {
    let kernel =
        Arc::new(TetherKernel::boot_with_config(config).context("Failed to boot bridge for MCP")?);
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = {
        let kernel = Arc::clone(&kernel);
        rt.spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = tether_api::run_server(kernel, shutdown).await {
                error!(error = %e, "Peer server stopped; tools will report no_clients");
            }
        })
    };

    let (out_tx, out_rx) = mpsc::channel::<Reply>();
    let writer = thread::spawn(move || write_replies(out_rx, io::stdout().lock()));

    info!("MCP stdio server ready");
    let dispatched = dispatch_requests(&mut io::stdin().lock(), &kernel.tools, rt.handle(), &out_tx);
    drop(out_tx);
    let written = writer
        .join()
        .map_err(|_| anyhow::anyhow!("stdout writer thread panicked"))?;

    info!("stdin closed, shutting down");
    let _ = shutdown_tx.send(());
    let _ = rt.block_on(server);

    dispatched.context("Failed to read from stdin")?;
    written.context("Failed to write to stdout")?;
    Ok(())
}

/// Read requests until EOF, answering each on its own task.
///
/// A slow tool call never holds up the requests behind it. Responses are
/// handed to `out` in completion order. Returns once every in-flight
/// request has answered.
fn dispatch_requests(
    reader: &mut impl BufRead,
    tools: &Arc<ToolHost>,
    rt: &Handle,
    out: &mpsc::Sender<Reply>,
) -> io::Result<()> {
    let mut inflight = JoinSet::new();
    let result = loop {
        let frame = match read_message(reader) {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %e, "Skipping unreadable MCP message");
                continue;
            }
            Err(e) => break Err(e),
        };
        while inflight.try_join_next().is_some() {}

        let framing = frame.framing;
        match frame.body {
            Ok(msg) => {
                let tools = Arc::clone(tools);
                let out = out.clone();
                inflight.spawn_on(
                    async move {
                        if let Some(resp) = handle_mcp_request(&msg, &tools).await {
                            let _ = out.send(Reply { msg: resp, framing });
                        }
                    },
                    rt,
                );
            }
            Err(e) => {
                let msg = make_error(Value::Null, -32700, &format!("Parse error: {e}"));
                let _ = out.send(Reply { msg, framing });
            }
        }
    };

    if !inflight.is_empty() {
        debug!(in_flight = inflight.len(), "Waiting for in-flight MCP requests");
    }
    rt.block_on(async { while inflight.join_next().await.is_some() {} });
    result
}

/// Sole owner of stdout: frames never interleave.
fn write_replies(replies: mpsc::Receiver<Reply>, mut writer: impl Write) -> io::Result<()> {
    for reply in replies {
        write_message(&mut writer, &reply.msg, reply.framing)?;
    }
    Ok(())
}

/// Read one JSON-RPC message, detecting its framing from the first line.
fn read_message(reader: &mut impl BufRead) -> io::Result<Option<Frame>> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            break;
        }
    }

    let Some(length) = content_length_header(line.trim()) else {
        return Ok(Some(Frame {
            body: serde_json::from_str(line.trim()),
            framing: Framing::Line,
        }));
    };
    let length: usize = length.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid Content-Length: {length}"),
        )
    })?;

    // Remaining headers end at the first blank line.
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            return Ok(None);
        }
        if header.trim().is_empty() {
            break;
        }
    }

    if length > MAX_MCP_MESSAGE_SIZE {
        io::copy(&mut (&mut *reader).take(length as u64), &mut io::sink())?;
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("MCP message too large: {length} bytes (max {MAX_MCP_MESSAGE_SIZE})"),
        ));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;
    Ok(Some(Frame {
        body: serde_json::from_slice(&body),
        framing: Framing::ContentLength,
    }))
}

fn content_length_header(line: &str) -> Option<&str> {
    let (name, value) = line.split_once(':')?;
    name.trim()
        .eq_ignore_ascii_case("content-length")
        .then(|| value.trim())
}

fn write_message(writer: &mut impl Write, msg: &Value, framing: Framing) -> io::Result<()> {
    let body = serde_json::to_string(msg)?;
    match framing {
        Framing::ContentLength => write!(writer, "Content-Length: {}\r\n\r\n{}", body.len(), body)?,
        Framing::Line => writeln!(writer, "{body}")?,
    }
    writer.flush()
}
