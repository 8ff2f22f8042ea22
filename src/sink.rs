use crate::types::Finding;
use ::time::{macros::format_description, OffsetDateTime};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error};

const RULE: &str = "============================================================";

/// Append-only findings file with live save.
///
/// Each record is written in one call and synced before `append` returns, so
/// a crash after N findings leaves N whole records on disk.
#[derive(Debug, Clone)]
pub struct ResultSink {
    path: PathBuf,
    // serializes appends from concurrent workers
    lock: Arc<Mutex<()>>,
}

impl ResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Persist one finding. Failures are logged and swallowed.
    pub async fn append(&self, finding: &Finding) {
        let record = render_record(finding);
        let _guard = self.lock.lock().await;
        if let Err(e) = self.write_record(record.as_bytes()).await {
            error!(
                path = %self.path.display(),
                ip = %finding.ip,
                error = %e,
                "failed to save finding"
            );
        } else {
            debug!(path = %self.path.display(), ip = %finding.ip, "finding saved");
        }
    }

    async fn write_record(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_data().await
    }
}

/// Fixed multi-line text record for one finding, terminated by a blank line.
pub fn render_record(f: &Finding) -> String {
    let mut out = String::with_capacity(256);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Camera Type: {}", f.camera_type);
    let _ = writeln!(out, "IP Address: {}", f.ip);
    let _ = writeln!(out, "Port: {}", f.port);
    let _ = writeln!(out, "URL: {}", f.url);
    let _ = writeln!(out, "Detection Time: {}", f.detected_at);
    let _ = writeln!(out, "{RULE}");
    out.push('\n');
    out
}

/// Local time as `YYYY-MM-DD HH:MM:SS`, falling back to UTC when the local offset is unknown.
pub fn detection_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| String::from("1970-01-01 00:00:00"))
}

/// Findings file name for a country code, e.g. `BD_CCTV_Found.txt`.
pub fn default_output_name(country: &str) -> String {
    format!("{}_CCTV_Found.txt", country.to_ascii_uppercase())
}
