use crate::config::ScanConfig;
use crate::control::RunContext;
use crate::expand::expand_descriptor;
use crate::probe::{probe, DetectedSet, ProbeOutcome};
use crate::sink::ResultSink;
use crate::types::{Finding, ProgressSnapshot, ScanPhase, ScanSummary, WorkItem};
use anyhow::{bail, Result};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Counters shared between the controller, its workers and any observer.
#[derive(Clone, Debug, Default)]
pub struct SharedProgress {
    phase: Arc<AtomicU8>,
    pub range_index: Arc<AtomicU64>,
    pub range_total: Arc<AtomicU64>,
    pub addresses_queued: Arc<AtomicU64>,
    pub probes_done: Arc<AtomicU64>,
    pub finding_count: Arc<AtomicU64>,
    pub findings: Arc<Mutex<Vec<Finding>>>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ScanPhase {
        ScanPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: ScanPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    async fn reset(&self, range_total: usize) {
        self.set_phase(ScanPhase::Idle);
        self.range_index.store(0, Ordering::Relaxed);
        self.range_total.store(range_total as u64, Ordering::Relaxed);
        self.addresses_queued.store(0, Ordering::Relaxed);
        self.probes_done.store(0, Ordering::Relaxed);
        self.finding_count.store(0, Ordering::Relaxed);
        self.findings.lock().await.clear();
    }

    async fn record(&self, finding: Finding) {
        self.finding_count.fetch_add(1, Ordering::Relaxed);
        self.findings.lock().await.push(finding);
    }

    pub fn snapshot(&self, ctx: &RunContext) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: self.phase(),
            paused: ctx.is_paused(),
            range_index: self.range_index.load(Ordering::Relaxed),
            range_total: self.range_total.load(Ordering::Relaxed),
            addresses_queued: self.addresses_queued.load(Ordering::Relaxed),
            probes_done: self.probes_done.load(Ordering::Relaxed),
            findings: self.finding_count.load(Ordering::Relaxed),
        }
    }
}

/// Bulk scan controller: expands ranges into a bounded queue drained by a fixed worker pool.
#[derive(Clone, Debug)]
pub struct Scanner {
    config: Arc<ScanConfig>,
    sink: ResultSink,
    detected: DetectedSet,
    progress: SharedProgress,
}

// Everything one worker needs, cloned per task.
#[derive(Clone)]
struct WorkerShared {
    config: Arc<ScanConfig>,
    sink: ResultSink,
    detected: DetectedSet,
    progress: SharedProgress,
    ctx: RunContext,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
}

impl Scanner {
    pub fn new(config: ScanConfig, sink: ResultSink) -> Self {
        Self {
            config: Arc::new(config),
            sink,
            detected: DetectedSet::new(),
            progress: SharedProgress::new(),
        }
    }

    pub fn progress(&self) -> SharedProgress {
        self.progress.clone()
    }

    /// Run one scan over `ranges` (descriptor lines, in order) until drained or stopped.
    ///
    /// `ctx` must be fresh for this run. Malformed descriptors are skipped;
    /// per-probe failures never abort the run.
    pub async fn run(&self, ranges: &[String], ctx: &RunContext) -> Result<ScanSummary> {
        if ranges.is_empty() {
            bail!("no IP ranges to scan");
        }
        if self.config.ports.is_empty() {
            bail!("no ports configured");
        }

        let started = Instant::now();
        self.detected.clear().await;
        self.progress.reset(ranges.len()).await;

        let (tx, rx) = mpsc::channel::<WorkItem>(self.config.queue_capacity.max(1));
        let shared = WorkerShared {
            config: self.config.clone(),
            sink: self.sink.clone(),
            detected: self.detected.clone(),
            progress: self.progress.clone(),
            ctx: ctx.clone(),
            queue: Arc::new(Mutex::new(rx)),
        };

        let worker_count = self.config.workers.clamp(1, 5_000);
        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            workers.spawn(worker_loop(id, shared.clone()));
        }
        drop(shared);
        info!(
            ranges = ranges.len(),
            workers = worker_count,
            ports = ?self.config.ports,
            "scan started"
        );

        self.progress.set_phase(ScanPhase::Expanding);
        self.enqueue_ranges(ranges, tx, ctx).await;

        if !ctx.is_stopping() {
            self.progress.set_phase(ScanPhase::Draining);
            info!(
                addresses = self.progress.addresses_queued.load(Ordering::Relaxed),
                "all ranges queued, draining"
            );
        }

        let drained = tokio::select! {
            _ = join_all(&mut workers) => true,
            _ = ctx.stopped() => false,
        };
        if !drained {
            // In-flight probes are bounded by their own timeouts; give them that long.
            if time::timeout(self.config.grace_period, join_all(&mut workers))
                .await
                .is_err()
            {
                warn!(remaining = workers.len(), "aborting workers after grace period");
                workers.abort_all();
                join_all(&mut workers).await;
            }
        }
        self.progress.set_phase(ScanPhase::Stopped);

        let findings = self.progress.findings.lock().await.clone();
        let summary = ScanSummary {
            ranges_total: ranges.len() as u64,
            addresses_queued: self.progress.addresses_queued.load(Ordering::Relaxed),
            probes_done: self.progress.probes_done.load(Ordering::Relaxed),
            findings,
            elapsed_ms: started.elapsed().as_millis() as u64,
            stopped_early: ctx.is_stopping(),
        };
        info!(
            elapsed_ms = summary.elapsed_ms,
            cameras = summary.findings.len(),
            stopped_early = summary.stopped_early,
            "scan finished"
        );
        Ok(summary)
    }

    // Producer: expand each descriptor in order and queue every port per host.
    // Dropping `tx` on return lets workers finish once the queue is empty.
    async fn enqueue_ranges(
        &self,
        ranges: &[String],
        tx: mpsc::Sender<WorkItem>,
        ctx: &RunContext,
    ) {
        let total = ranges.len();
        'ranges: for (idx, line) in ranges.iter().enumerate() {
            if ctx.is_stopping() {
                break;
            }
            self.progress
                .range_index
                .store(idx as u64 + 1, Ordering::Relaxed);
            debug!(range = %line, index = idx + 1, total, "expanding range");

            for ip in expand_descriptor(line) {
                for &port in &self.config.ports {
                    tokio::select! {
                        biased;
                        _ = ctx.stopped() => break 'ranges,
                        res = tx.send(WorkItem { ip, port }) => {
                            if res.is_err() {
                                break 'ranges;
                            }
                        }
                    }
                }
                self.progress
                    .addresses_queued
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

async fn worker_loop(id: usize, w: WorkerShared) {
    loop {
        if w.ctx.is_stopping() {
            break;
        }
        let next = time::timeout(w.config.dequeue_timeout, async {
            w.queue.lock().await.recv().await
        })
        .await;
        match next {
            Ok(Some(item)) => {
                let outcome = probe(item, &w.config, &w.ctx, &w.detected, &w.sink).await;
                match outcome {
                    // stop observed before connecting: nothing was probed
                    ProbeOutcome::Skipped => {}
                    ProbeOutcome::NoMatch => {
                        w.progress.probes_done.fetch_add(1, Ordering::Relaxed);
                    }
                    ProbeOutcome::Found(finding) => {
                        w.progress.probes_done.fetch_add(1, Ordering::Relaxed);
                        w.progress.record(finding).await;
                    }
                }
            }
            // Producer finished and the queue is empty.
            Ok(None) => break,
            Err(_) => continue,
        }
    }
    debug!(worker = id, "worker exiting");
}

async fn join_all(set: &mut JoinSet<()>) {
    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            if e.is_panic() {
                warn!(error = %e, "worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_range_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = Scanner::new(
            ScanConfig::default(),
            ResultSink::new(dir.path().join("out.txt")),
        );
        assert!(scanner.run(&[], &RunContext::new()).await.is_err());
    }

    #[tokio::test]
    async fn malformed_ranges_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig {
            workers: 4,
            ..ScanConfig::default()
        };
        let scanner = Scanner::new(config, ResultSink::new(dir.path().join("out.txt")));
        let ranges = vec!["bogus".to_string(), "127.0.0.0/3".to_string()];
        let summary = scanner.run(&ranges, &RunContext::new()).await.unwrap();
        assert_eq!(summary.addresses_queued, 0);
        assert_eq!(summary.probes_done, 0);
        assert!(!summary.stopped_early);
        assert_eq!(scanner.progress().phase(), ScanPhase::Stopped);
    }

    #[tokio::test]
    async fn progress_tracks_ranges_and_queued_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let closed = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let config = ScanConfig {
            ports: vec![closed],
            workers: 4,
            dequeue_timeout: std::time::Duration::from_millis(50),
            pause_poll: std::time::Duration::from_millis(10),
            ..ScanConfig::default()
        };
        let scanner = Scanner::new(config, ResultSink::new(dir.path().join("out.txt")));
        let progress = scanner.progress();
        let ranges = vec![
            "127.0.0.0/4".to_string(),
            "127.0.0.16/5".to_string(),
            "127.0.1.0/8".to_string(),
        ];
        let ctx = RunContext::new();
        ctx.set_paused(true);

        let run_ctx = ctx.clone();
        let run_ranges = ranges.clone();
        let handle = tokio::spawn(async move { scanner.run(&run_ranges, &run_ctx).await });

        // Workers hold while paused; the producer still queues every range.
        time::sleep(std::time::Duration::from_millis(300)).await;
        let mid = progress.snapshot(&ctx);
        assert!(mid.paused);
        assert_eq!(mid.phase, ScanPhase::Draining);
        assert_eq!(mid.range_total, ranges.len() as u64);
        assert_eq!(mid.range_index, ranges.len() as u64);
        assert_eq!(mid.addresses_queued, 8);
        assert_eq!(mid.probes_done, 0);

        ctx.set_paused(false);
        let summary = time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("run finishes after resume")
            .unwrap()
            .unwrap();
        let done = progress.snapshot(&ctx);
        assert_eq!(done.phase, ScanPhase::Stopped);
        assert_eq!(done.range_total, 3);
        assert_eq!(done.range_index, 3);
        assert_eq!(done.addresses_queued, 8);
        assert_eq!(done.probes_done, 8);
        assert_eq!(summary.addresses_queued, done.addresses_queued);
    }
}
