use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use camscan_rs::config::ScanConfig;
use camscan_rs::control::{self, RunContext};
use camscan_rs::countries::{self, COUNTRIES};
use camscan_rs::probe::SignatureRule;
use camscan_rs::ranges;
use camscan_rs::registry::{self, APNIC_DELEGATED_URL};
use camscan_rs::scanner::Scanner;
use camscan_rs::server::{self, AppState};
use camscan_rs::sink::{self, ResultSink};
use camscan_rs::types::ScanSummary;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// camscan-rs: find camera web interfaces across a country's registry-allocated IPv4 space.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "camscan-rs",
    version,
    about = "Find camera web interfaces across a country's registry-allocated IPv4 ranges.",
    long_about = None
)]
struct Cli {
    /// Two-letter country code (e.g. BD). Selects the registry entries and output file names.
    #[arg(long, required_unless_present = "list_countries")]
    country: Option<String>,

    /// Range file with one `<ipv4>/<count>` per line. Defaults to `<CC>_IP.txt`.
    #[arg(long)]
    ranges: Option<PathBuf>,

    /// Use the existing range file instead of refreshing it from the registry.
    #[arg(long = "skip-fetch", default_value_t = false)]
    skip_fetch: bool,

    /// Registry delegated-stats feed URL.
    #[arg(long = "registry-url", default_value = APNIC_DELEGATED_URL)]
    registry_url: String,

    /// Number of probe workers.
    #[arg(long, default_value_t = 100)]
    workers: usize,

    /// TCP connect timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 250)]
    timeout_ms: u64,

    /// HTTP response read timeout in milliseconds.
    #[arg(long = "read-timeout-ms", default_value_t = 250)]
    read_timeout_ms: u64,

    /// Ports probed on every host, comma separated.
    #[arg(long, value_delimiter = ',', default_values_t = [80u16, 8080])]
    ports: Vec<u16>,

    /// Extra signature rule `needle|label`, checked after the built-in ones. Repeatable.
    #[arg(long = "signature")]
    signatures: Vec<String>,

    /// Findings file. Defaults to `<CC>_CCTV_Found.txt`.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Also write the run summary and findings as pretty JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Serve the status/control API while scanning.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Bind address for the status API.
    #[arg(long = "ui-bind", default_value = "127.0.0.1:8080")]
    ui_bind: String,

    /// Seconds between progress log lines (0 disables).
    #[arg(long = "progress-secs", default_value_t = 5)]
    progress_secs: u64,

    /// Print the supported countries and exit.
    #[arg(long = "list-countries", default_value_t = false)]
    list_countries: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "camscan_rs=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if cli.list_countries {
        print_countries();
        return Ok(());
    }

    let code = cli
        .country
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_ascii_uppercase();
    if !countries::is_country_code(&code) {
        bail!("invalid country code: {code:?} (expected two letters, e.g. BD)");
    }
    match countries::lookup(&code) {
        Some(c) => info!(country = c.name, code = c.code, "country selected"),
        None => warn!(code = %code, "country not in the known list, continuing anyway"),
    }

    let ranges_path = cli
        .ranges
        .clone()
        .unwrap_or_else(|| PathBuf::from(registry::default_ranges_name(&code)));
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(sink::default_output_name(&code)));

    let config = build_config(&cli)?;

    if !cli.skip_fetch {
        let fetched =
            registry::fetch_country_ranges(&cli.registry_url, &code, Duration::from_secs(60))
                .await
                .context("range update failed; use --skip-fetch to scan an existing range file")?;
        registry::save_ranges(&ranges_path, &fetched)?;
    }

    let ranges = ranges::load_ranges_from_path(&ranges_path)?;
    info!(count = ranges.len(), path = %ranges_path.display(), "loaded IP ranges");

    println!("camscan-rs configuration:");
    println!("  country      : {}", code);
    println!("  ranges       : {} ({} entries)", ranges_path.display(), ranges.len());
    println!("  ports        : {:?}", config.ports);
    println!("  workers      : {}", config.workers);
    println!("  timeout_ms   : {}", cli.timeout_ms);
    println!("  output       : {} (live save)", output_path.display());
    println!("  controls     : Ctrl+C stop, Ctrl+Z pause/resume");

    let scanner = Scanner::new(config, ResultSink::new(&output_path));
    let ctx = RunContext::new();
    let (tx, rx) = control::control_channel();
    tokio::spawn(control::apply_controls(ctx.clone(), rx));
    tokio::spawn(control::forward_os_signals(tx.clone()));

    if cli.serve_ui {
        let state = AppState {
            progress: scanner.progress(),
            ctx: ctx.clone(),
            controls: tx.clone(),
        };
        let bind = cli.ui_bind.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, state).await {
                warn!(error = %e, "status API stopped");
            }
        });
    }

    let reporter = (cli.progress_secs > 0).then(|| {
        let progress = scanner.progress();
        let ctx = ctx.clone();
        let every = Duration::from_secs(cli.progress_secs);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.tick().await;
            loop {
                tick.tick().await;
                let s = progress.snapshot(&ctx);
                info!(
                    phase = ?s.phase,
                    paused = s.paused,
                    range = s.range_index,
                    of = s.range_total,
                    queued = s.addresses_queued,
                    probed = s.probes_done,
                    cameras = s.findings,
                    "progress"
                );
            }
        })
    });

    let summary = scanner.run(&ranges, &ctx).await?;
    if let Some(handle) = reporter {
        handle.abort();
    }

    print_summary(&code, &summary);
    if let Some(path) = cli.json.as_deref() {
        if let Err(e) = write_summary_json(path, &summary) {
            warn!(path = %path.display(), error = %e, "failed to write JSON summary");
        } else {
            println!("Wrote JSON summary to {}", path.display());
        }
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<ScanConfig> {
    let mut rules = SignatureRule::builtin();
    for raw in &cli.signatures {
        match SignatureRule::parse(raw) {
            Some(rule) => rules.push(rule),
            None => bail!("invalid --signature {raw:?} (expected `needle|label`)"),
        }
    }
    if cli.ports.is_empty() || cli.ports.contains(&0) {
        bail!("ports must be in 1..=65535");
    }
    Ok(ScanConfig {
        ports: cli.ports.clone(),
        workers: cli.workers,
        connect_timeout: Duration::from_millis(cli.timeout_ms),
        read_timeout: Duration::from_millis(cli.read_timeout_ms),
        rules,
        ..ScanConfig::default()
    })
}

fn print_countries() {
    println!("{:<4}  {}", "code", "country");
    println!("{:-<4}  {:-<22}", "", "");
    for c in COUNTRIES {
        println!("{:<4}  {}", c.code, c.name);
    }
}

fn print_summary(country: &str, summary: &ScanSummary) {
    let mut type_w = "camera_type".len();
    let mut ip_w = "ip".len();
    for f in &summary.findings {
        type_w = type_w.max(f.camera_type.len());
        ip_w = ip_w.max(f.ip.to_string().len());
    }
    let port_w = "port".len().max(5);

    println!(
        "\n{} scan {}: {:.2}s elapsed, {} addresses queued, {} probes, {} cameras found",
        country,
        if summary.stopped_early { "stopped" } else { "complete" },
        summary.elapsed_ms as f64 / 1000.0,
        summary.addresses_queued,
        summary.probes_done,
        summary.findings.len()
    );
    if summary.findings.is_empty() {
        return;
    }
    println!(
        "{:<type_w$}  {:<ip_w$}  {:>port_w$}  url",
        "camera_type", "ip", "port"
    );
    println!("{:-<type_w$}  {:-<ip_w$}  {:-<port_w$}  {:-<3}", "", "", "", "");
    for f in &summary.findings {
        println!(
            "{:<type_w$}  {:<ip_w$}  {:>port_w$}  {}",
            f.camera_type,
            f.ip.to_string(),
            f.port,
            f.url
        );
    }
}

fn write_summary_json(path: &std::path::Path, summary: &ScanSummary) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, summary)?;
    Ok(())
}
