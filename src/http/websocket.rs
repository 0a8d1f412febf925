//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Re-issue the client's Upgrade request to the backend by hand
//! - Bidirectional byte forwarding once the backend is connected
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Proxy ←──── raw bytes ────→ Backend
//! ```
//!
//! # Design Decisions
//! - The backend's `101` response travels back to the client as ordinary
//!   spliced bytes; frames are never parsed
//! - A bridge lives exactly as long as both sockets: the first side to close
//!   or fail takes the other down with it
//! - A failed backend connect closes the client socket with no response

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::head::RequestHead;
use crate::http::request::BackendIdentity;
use crate::observability::metrics::{self, ActiveBridge};

const SPLICE_BUFFER: usize = 16 * 1024;

/// Error type for establishing a bridge.
#[derive(Debug, Error)]
pub enum SpliceError {
    #[error("failed to connect to backend {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to backend {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("failed to send upgrade request: {0}")]
    Handshake(#[source] io::Error),
}

/// Bytes moved across a finished bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpliceStats {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

/// Serialize the Upgrade request the backend will see.
///
/// `Host` comes first and names the backend; the client's own `Host` lines are
/// dropped. `Origin` is rewritten to the backend origin. Everything else is
/// copied in order, original casing. No folding, no validation.
pub fn compose_upgrade_request(
    method: &str,
    target: &str,
    headers: &[(String, String)],
    backend: &BackendIdentity,
) -> Vec<u8> {
    let mut out = String::with_capacity(256);
    out.push_str(&format!("{method} {target} HTTP/1.1\r\n"));
    out.push_str(&format!("Host: {}\r\n", backend.authority()));

    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        if name.eq_ignore_ascii_case("origin") {
            out.push_str(&format!("Origin: {}\r\n", backend.origin()));
        } else {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
    }

    out.push_str("\r\n");
    out.into_bytes()
}

/// Connect to the backend, replay the handshake and splice until either side
/// closes.
///
/// `early` holds bytes the client sent after its head; they follow the
/// handshake immediately. On error the client stream is dropped, which
/// closes it.
pub async fn splice_upgrade<C>(
    client: C,
    head: &RequestHead,
    early: &[u8],
    backend: &BackendIdentity,
    connect_timeout: Duration,
) -> Result<SpliceStats, SpliceError>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let addr = backend.authority().to_string();
    let mut upstream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(SpliceError::Connect { addr, source }),
        Err(_) => {
            return Err(SpliceError::ConnectTimeout {
                addr,
                timeout: connect_timeout,
            })
        }
    };
    let _ = upstream.set_nodelay(true);

    let request = compose_upgrade_request(&head.method, &head.target, &head.headers, backend);
    upstream
        .write_all(&request)
        .await
        .map_err(SpliceError::Handshake)?;
    if !early.is_empty() {
        upstream
            .write_all(early)
            .await
            .map_err(SpliceError::Handshake)?;
    }

    tracing::debug!(backend = %addr, early_bytes = early.len(), "Connected to backend, splicing");
    Ok(splice(client, upstream).await)
}

/// Copy bytes both ways between `client` and `backend`.
///
/// Returns once either direction reaches EOF or fails; both streams are shut
/// down and dropped at that point.
pub async fn splice<C, B>(client: C, backend: B) -> SpliceStats
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let _bridge = ActiveBridge::open();
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);
    let mut stats = SpliceStats::default();

    {
        let upstream = pump(&mut client_read, &mut backend_write, &mut stats.client_to_backend);
        let downstream = pump(&mut backend_read, &mut client_write, &mut stats.backend_to_client);

        tokio::select! {
            result = upstream => log_end("client", result),
            result = downstream => log_end("backend", result),
        }
    }

    let _ = client_write.shutdown().await;
    let _ = backend_write.shutdown().await;

    metrics::record_spliced_bytes(stats.client_to_backend, stats.backend_to_client);
    stats
}

fn log_end(side: &'static str, result: io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(side, "Peer closed, tearing down bridge"),
        Err(e) => tracing::debug!(side, error = %e, "Bridge read/write failed, tearing down"),
    }
}

async fn pump<R, W>(reader: &mut R, writer: &mut W, total: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; SPLICE_BUFFER];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *total += n as u64;
    }
}
