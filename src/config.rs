use crate::probe::SignatureRule;
use std::time::Duration;

/// Tunables for one scan run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Ports probed for every expanded address, in enqueue order.
    pub ports: Vec<u16>,

    /// Size of the fixed worker pool.
    pub workers: usize,

    /// Bound on queued work items; the producer waits when it is full.
    pub queue_capacity: usize,

    /// TCP connect timeout per probe.
    pub connect_timeout: Duration,

    /// Total time allowed for reading the HTTP response.
    pub read_timeout: Duration,

    /// How long an idle worker waits on the queue before re-checking the stop flag.
    pub dequeue_timeout: Duration,

    /// Sleep between pause checks.
    pub pause_poll: Duration,

    /// Time given to in-flight probes after a stop before workers are aborted.
    pub grace_period: Duration,

    /// Response byte budget used for classification.
    pub max_response_bytes: usize,

    /// Signature rules, checked in order.
    pub rules: Vec<SignatureRule>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ports: vec![80, 8080],
            workers: 100,
            queue_capacity: 1024,
            connect_timeout: Duration::from_millis(250),
            read_timeout: Duration::from_millis(250),
            dequeue_timeout: Duration::from_millis(500),
            pause_poll: Duration::from_millis(100),
            grace_period: Duration::from_secs(1),
            max_response_bytes: 4096,
            rules: SignatureRule::builtin(),
        }
    }
}
