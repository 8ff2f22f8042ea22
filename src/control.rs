use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared stop/pause state for one scan run.
///
/// Create a fresh context per run; both flags start cleared. Stop is one-way.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    stop: CancellationToken,
    paused: Arc<AtomicBool>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    /// Flip the pause flag and return the new value.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::AcqRel)
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        self.stop.cancelled().await
    }
}

/// Operator requests delivered to a running scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Stop,
    TogglePause,
    Pause,
    Resume,
}

/// Sender half handed to anything that can issue controls (signals, HTTP API).
pub type ControlSender = mpsc::UnboundedSender<Control>;

pub fn control_channel() -> (ControlSender, mpsc::UnboundedReceiver<Control>) {
    mpsc::unbounded_channel()
}

/// Translate control messages into writes on `ctx`.
///
/// This is the only writer of the run flags once a run has started. Returns
/// when a stop has been applied or every sender is gone.
pub async fn apply_controls(ctx: RunContext, mut rx: mpsc::UnboundedReceiver<Control>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            Control::Stop => {
                info!("stop requested, finishing in-flight probes");
                ctx.stop();
                return;
            }
            Control::TogglePause => {
                if ctx.toggle_pause() {
                    info!("scan paused");
                } else {
                    info!("scan resumed");
                }
            }
            Control::Pause => {
                ctx.set_paused(true);
                info!("scan paused");
            }
            Control::Resume => {
                ctx.set_paused(false);
                info!("scan resumed");
            }
        }
    }
}

/// Forward Ctrl+C as `Stop` and, on Unix, Ctrl+Z (SIGTSTP) as `TogglePause`.
pub async fn forward_os_signals(tx: ControlSender) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut tstp = match signal(SignalKind::from_raw(libc::SIGTSTP)) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "pause signal unavailable");
                None
            }
        };
        loop {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if res.is_ok() {
                        let _ = tx.send(Control::Stop);
                    }
                    return;
                }
                Some(()) = async {
                    match tstp.as_mut() {
                        Some(s) => s.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    if tx.send(Control::TogglePause).is_err() {
                        return;
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Control::Stop);
        } else {
            warn!("stop signal unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_reports_new_state() {
        let ctx = RunContext::new();
        assert!(!ctx.is_paused());
        assert!(ctx.toggle_pause());
        assert!(ctx.is_paused());
        assert!(!ctx.toggle_pause());
        assert!(!ctx.is_paused());
    }

    #[tokio::test]
    async fn controls_are_applied_in_order() {
        let ctx = RunContext::new();
        let (tx, rx) = control_channel();
        tx.send(Control::TogglePause).unwrap();
        tx.send(Control::Pause).unwrap();
        tx.send(Control::Stop).unwrap();
        apply_controls(ctx.clone(), rx).await;
        assert!(ctx.is_paused());
        assert!(ctx.is_stopping());
    }

    #[tokio::test]
    async fn stop_is_one_way() {
        let ctx = RunContext::new();
        ctx.stop();
        ctx.set_paused(true);
        ctx.set_paused(false);
        assert!(ctx.is_stopping());
        ctx.stopped().await;
    }
}
