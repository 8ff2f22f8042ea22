//! One TCP connect + HTTP GET + signature classification per work item.

use crate::config::ScanConfig;
use crate::control::RunContext;
use crate::sink::ResultSink;
use crate::types::{Finding, WorkItem};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{info, trace};

/// Minimal request sent to every open port.
pub const HTTP_PROBE: &[u8] = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

/// A substring that identifies a camera web UI, and the label reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRule {
    pub needle: String,
    pub label: String,
}

impl SignatureRule {
    pub fn new(needle: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            label: label.into(),
        }
    }

    /// Rules every scan starts with, in match priority order.
    pub fn builtin() -> Vec<SignatureRule> {
        vec![
            SignatureRule::new(
                "<title>WEB SERVICE</title>",
                "Anjhua-Dahua Technology Camera",
            ),
            SignatureRule::new("login.asp", "HIK Vision Camera"),
        ]
    }

    /// Parse `needle|label`. The last `|` separates the two, so needles may contain `|`.
    pub fn parse(s: &str) -> Option<SignatureRule> {
        let (needle, label) = s.rsplit_once('|')?;
        let (needle, label) = (needle.trim(), label.trim());
        if needle.is_empty() || label.is_empty() {
            return None;
        }
        Some(SignatureRule::new(needle, label))
    }
}

/// Return the label of the first rule matching an HTTP response, if any.
pub fn classify<'a>(response: &str, rules: &'a [SignatureRule]) -> Option<&'a str> {
    if !response.contains("HTTP") {
        return None;
    }
    rules
        .iter()
        .find(|r| response.contains(r.needle.as_str()))
        .map(|r| r.label.as_str())
}

/// URL an operator would open for a finding; port 80 is left implicit.
pub fn camera_url(ip: Ipv4Addr, port: u16) -> String {
    if port == 80 {
        format!("http://{ip}")
    } else {
        format!("http://{ip}:{port}")
    }
}

/// Addresses that already produced a finding during the current run.
#[derive(Debug, Clone, Default)]
pub struct DetectedSet {
    inner: Arc<Mutex<HashSet<Ipv4Addr>>>,
}

impl DetectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-insert: true only for the first caller per address.
    pub async fn claim(&self, ip: Ipv4Addr) -> bool {
        self.inner.lock().await.insert(ip)
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}

/// Open a TCP connection within `connect_timeout`. Failures are expected and only traced.
pub async fn connect(addr: SocketAddr, connect_timeout: Duration) -> Option<TcpStream> {
    match time::timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(s)) => Some(s),
        Ok(Err(e)) => {
            trace!(%addr, error = %e, "connect failed");
            None
        }
        Err(_) => {
            trace!(%addr, "connect timed out");
            None
        }
    }
}

/// Send the probe request and read up to `budget` bytes of the response.
///
/// The write is bounded by `write_timeout`, the whole read by `read_timeout`.
pub async fn exchange(
    stream: &mut TcpStream,
    write_timeout: Duration,
    read_timeout: Duration,
    budget: usize,
) -> Option<String> {
    match time::timeout(write_timeout, stream.write_all(HTTP_PROBE)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            trace!(error = %e, "request write failed");
            return None;
        }
        Err(_) => {
            trace!("request write timed out");
            return None;
        }
    }

    let mut buf = Vec::with_capacity(budget);
    // Whatever arrived before the deadline is kept and classified.
    let _ = time::timeout(read_timeout, read_until_full(stream, &mut buf, budget)).await;
    if buf.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Connect, send the probe request, and read up to `budget` bytes of the response.
///
/// Returns `None` on any connection failure. The socket is dropped (closed)
/// before returning on every path.
pub async fn fetch_response(
    addr: SocketAddr,
    connect_timeout: Duration,
    read_timeout: Duration,
    budget: usize,
) -> Option<String> {
    let mut stream = connect(addr, connect_timeout).await?;
    exchange(&mut stream, connect_timeout, read_timeout, budget).await
}

async fn read_until_full(stream: &mut TcpStream, buf: &mut Vec<u8>, budget: usize) {
    let mut chunk = [0u8; 1024];
    while buf.len() < budget {
        let want = chunk.len().min(budget - buf.len());
        match stream.read(&mut chunk[..want]).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// What happened to one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A stop was observed before any connection attempt.
    Skipped,
    /// Probed; closed port, no response, no signature, or an address already reported.
    NoMatch,
    /// A new camera, already persisted to the sink.
    Found(Finding),
}

/// Probe one work item and record a finding if it is a new camera.
///
/// Honors stop and pause on `ctx`: stop is checked before connecting, after
/// the pause wait, and again once the connection is open.
pub async fn probe(
    item: WorkItem,
    config: &ScanConfig,
    ctx: &RunContext,
    detected: &DetectedSet,
    sink: &ResultSink,
) -> ProbeOutcome {
    if ctx.is_stopping() {
        return ProbeOutcome::Skipped;
    }
    while ctx.is_paused() && !ctx.is_stopping() {
        time::sleep(config.pause_poll).await;
    }
    if ctx.is_stopping() {
        return ProbeOutcome::Skipped;
    }

    let addr = SocketAddr::from((item.ip, item.port));
    let Some(mut stream) = connect(addr, config.connect_timeout).await else {
        return ProbeOutcome::NoMatch;
    };
    if ctx.is_stopping() {
        return ProbeOutcome::NoMatch;
    }
    let response = exchange(
        &mut stream,
        config.connect_timeout,
        config.read_timeout,
        config.max_response_bytes,
    )
    .await;
    drop(stream);

    let Some(response) = response else {
        return ProbeOutcome::NoMatch;
    };
    let Some(label) = classify(&response, &config.rules) else {
        return ProbeOutcome::NoMatch;
    };
    if !detected.claim(item.ip).await {
        trace!(ip = %item.ip, port = item.port, "address already reported");
        return ProbeOutcome::NoMatch;
    }

    let finding = Finding {
        camera_type: label.to_string(),
        ip: item.ip,
        port: item.port,
        url: camera_url(item.ip, item.port),
        detected_at: crate::sink::detection_timestamp(),
    };
    info!(camera_type = %finding.camera_type, url = %finding.url, "camera found");
    sink.append(&finding).await;
    ProbeOutcome::Found(finding)
}
