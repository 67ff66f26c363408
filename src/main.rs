//! TremorSense Session Agent CLI
//!
//! Records tremor sensor sessions and produces statistical summaries.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tremorsense_agent::{
    audit::{create_shared_log_with_persistence, AuditEvent, AuditLog},
    config::Config,
    core::{
        SessionAggregator, SessionHistoryStore, SessionSummaryBuilder, Summary, MAX_HISTORY_ENTRIES,
    },
    stream::{decode_recording, StreamEvent, StreamReader},
    DISCLAIMER, VERSION,
};

/// Print live statistics every this many windows.
const PROGRESS_EVERY: usize = 10;

#[derive(Parser)]
#[command(name = "tremorsense")]
#[command(version = VERSION)]
#[command(about = "Statistical summaries of tremor sensor recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session from a sensor event stream
    Record {
        /// Event stream to read (file path, or - for stdin)
        #[arg(long, short, default_value = "-")]
        input: String,

        /// Send the summary for analysis when the recording ends
        #[arg(long)]
        analyze: bool,

        /// Override the analysis service URL
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Summarize a recorded session file without touching history
    Summarize {
        /// JSON array, JSON lines or SSE capture of window samples
        #[arg(long, short)]
        input: PathBuf,

        /// Calibrated noise floor to apply
        #[arg(long)]
        noise_floor: Option<f64>,

        /// Write the summary here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Send a previously exported summary for analysis (retries a failed one)
    Analyze {
        /// Summary JSON file
        #[arg(long, short)]
        summary: PathBuf,

        /// Override the analysis service URL
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Show or clear the session history
    History {
        #[arg(long)]
        clear: bool,
    },

    /// Show agent status and audit counters
    Status,

    /// Show configuration
    Config,

    /// Display the disclaimer
    Disclaimer,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Record {
            input,
            analyze,
            base_url,
        } => cmd_record(&input, analyze, base_url),
        Commands::Summarize {
            input,
            noise_floor,
            output,
        } => cmd_summarize(&input, noise_floor, output),
        Commands::Analyze { summary, base_url } => cmd_analyze(&summary, base_url),
        Commands::History { clear } => cmd_history(clear),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
        Commands::Disclaimer => {
            println!("{DISCLAIMER}");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(base_url: Option<String>) -> Config {
    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not load config, using defaults");
        Config::default()
    });
    if let Some(url) = base_url {
        config.analysis.base_url = url;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    config
}

fn open_history(config: &Config) -> Result<SessionHistoryStore> {
    let path = config.history_path();
    SessionHistoryStore::open_file(&path)
        .with_context(|| format!("could not open session history at {}", path.display()))
}

fn cmd_record(input: &str, analyze: bool, base_url: Option<String>) -> Result<()> {
    println!("TremorSense Session Agent v{VERSION}");
    println!();

    let config = load_config(base_url);
    let audit = create_shared_log_with_persistence(config.audit_path());
    let mut store = open_history(&config)?;

    let reader = StreamReader::open(input)
        .with_context(|| format!("could not open event stream '{input}'"))?;

    println!("Recording from {}", if input == "-" { "stdin" } else { input });
    println!("  History: {} prior session(s)", store.len());
    println!(
        "  Analysis: {}",
        if analyze {
            config.analysis.base_url.as_str()
        } else {
            "disabled"
        }
    );
    println!();
    println!("Press Ctrl+C (or close the stream) to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let mut aggregator = SessionAggregator::new();
    aggregator.start()?;

    let receiver = reader.receiver().clone();
    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(StreamEvent::Bands(sample))) => match aggregator.push(sample) {
                Ok(()) => {
                    audit.record(AuditEvent::SampleIngested);
                    if aggregator.len() % PROGRESS_EVERY == 0 {
                        let live = aggregator.live_stats();
                        println!(
                            "[{:>6.1}s] windows: {:>4} | mean: {:.2} | std: {:.2} | peak: {:.2} | dominant: {}",
                            aggregator.elapsed_secs(),
                            live.count,
                            live.mean,
                            live.std,
                            live.peak,
                            live.dominant_band.map(|b| b.label()).unwrap_or("-"),
                        );
                    }
                }
                Err(e) => {
                    audit.record(AuditEvent::SampleRejected);
                    eprintln!("Skipped window: {e}");
                }
            },
            Ok(Ok(StreamEvent::Calibrated(calibration))) => {
                match aggregator.set_noise_floor(calibration.baseline) {
                    Ok(()) => println!("Calibrated: noise floor {:.4}", calibration.baseline),
                    Err(e) => eprintln!("Ignored calibration: {e}"),
                }
            }
            Ok(Err(e)) => {
                audit.record(AuditEvent::SampleRejected);
                eprintln!("Skipped frame: {e}");
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    reader.stop();
    aggregator.stop();
    println!();
    println!(
        "Recording stopped: {} window(s) in {:.1}s",
        aggregator.len(),
        aggregator.elapsed_secs()
    );
    if !aggregator.is_empty() {
        audit.record(AuditEvent::SessionRecorded);
    }

    let builder = SessionSummaryBuilder::new().with_sampling_rate(config.sampling_rate_hz);
    let summary = match builder.build(aggregator.samples(), store.entries(), aggregator.noise_floor())
    {
        Ok(summary) => summary,
        Err(e) => {
            save_audit(&audit);
            return Err(e.into());
        }
    };
    audit.record(AuditEvent::SummaryBuilt);

    let export_path = export_summary(&config, &summary)?;
    println!("Summary exported to {}", export_path.display());
    print_overview(&summary);

    let outcome = if analyze {
        run_analysis(&config, &summary, &mut store, &audit).with_context(|| {
            format!(
                "retry later with: tremorsense analyze --summary {}",
                export_path.display()
            )
        })
    } else {
        Ok(())
    };

    save_audit(&audit);
    outcome
}

fn cmd_summarize(input: &Path, noise_floor: Option<f64>, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(None);
    let store = open_history(&config)?;

    let text = std::fs::read_to_string(input)
        .with_context(|| format!("could not read {}", input.display()))?;
    let events = decode_recording(&text, Utc::now().timestamp_millis())?;

    let mut aggregator = SessionAggregator::new();
    if let Some(floor) = noise_floor {
        aggregator.set_noise_floor(floor)?;
    }
    aggregator.start()?;
    let mut rejected = 0;
    for event in events {
        match event {
            StreamEvent::Bands(sample) => {
                if aggregator.push(sample).is_err() {
                    rejected += 1;
                }
            }
            StreamEvent::Calibrated(c) if noise_floor.is_none() => {
                aggregator.set_noise_floor(c.baseline)?;
            }
            StreamEvent::Calibrated(_) => {}
        }
    }
    aggregator.stop();
    if rejected > 0 {
        eprintln!("Skipped {rejected} malformed window(s)");
    }

    let json = SessionSummaryBuilder::new()
        .with_sampling_rate(config.sampling_rate_hz)
        .build_json(aggregator.samples(), store.entries(), aggregator.noise_floor())?;

    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("could not write {}", path.display()))?;
            println!("Summary written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_analyze(summary_path: &Path, base_url: Option<String>) -> Result<()> {
    let config = load_config(base_url);
    let audit = create_shared_log_with_persistence(config.audit_path());
    let mut store = open_history(&config)?;

    let content = std::fs::read_to_string(summary_path)
        .with_context(|| format!("could not read {}", summary_path.display()))?;
    let summary: Summary = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a session summary", summary_path.display()))?;
    if store.contains_summary(&summary) {
        anyhow::bail!(
            "session {} ({}) is already in history; it was analyzed before",
            summary.metadata.session_id,
            summary.metadata.timestamp
        );
    }

    let outcome = run_analysis(&config, &summary, &mut store, &audit);
    save_audit(&audit);
    outcome
}

#[cfg(feature = "analysis")]
fn run_analysis(
    config: &Config,
    summary: &Summary,
    store: &mut SessionHistoryStore,
    audit: &AuditLog,
) -> Result<()> {
    use tremorsense_agent::{analyze_and_record, BlockingAnalysisClient, SessionError};

    println!();
    println!("Sending summary to {} ...", config.analysis.analyze_url());
    let client = BlockingAnalysisClient::new(config.analysis.clone())
        .map_err(SessionError::from)?;

    match analyze_and_record(&client, summary, store, Utc::now().timestamp_millis()) {
        Ok(report) => {
            audit.record(AuditEvent::ReportGenerated);
            println!();
            println!("Clinical Summary (confidence: {})", report.confidence_level);
            println!("================");
            println!("{}", report.clinical_summary);
            println!();
            println!("Note: {}", report.advisory_note);
            println!();
            println!("Session recorded in history ({} total)", store.len());
            Ok(())
        }
        Err(e) => {
            if matches!(e, SessionError::AnalysisUnavailable(_)) {
                audit.record(AuditEvent::AnalysisFailed);
            }
            Err(e.into())
        }
    }
}

#[cfg(not(feature = "analysis"))]
fn run_analysis(
    _config: &Config,
    _summary: &Summary,
    _store: &mut SessionHistoryStore,
    _audit: &AuditLog,
) -> Result<()> {
    anyhow::bail!("this build has no analysis support (enable the `analysis` feature)")
}

fn cmd_history(clear: bool) -> Result<()> {
    let config = load_config(None);
    let mut store = open_history(&config)?;

    if clear {
        store.clear()?;
        println!("Session history cleared.");
        return Ok(());
    }

    if store.is_empty() {
        println!("No sessions recorded yet.");
        println!("Run 'tremorsense record --analyze' to add one.");
        return Ok(());
    }

    println!(
        "Session History ({} of {})",
        store.len(),
        MAX_HISTORY_ENTRIES
    );
    println!("===============");
    for (i, entry) in store.entries().iter().enumerate() {
        let when = DateTime::<Utc>::from_timestamp_millis(entry.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| entry.timestamp.to_string());
        println!(
            "{:>2}. {}  {:<8} mean score {:.2}",
            i + 1,
            when,
            entry.dominant_band.label(),
            entry.mean_score
        );
    }
    Ok(())
}

fn cmd_status() -> Result<()> {
    let config = load_config(None);

    println!("TremorSense Session Agent Status");
    println!("================================");
    println!();
    println!("Configuration:");
    println!("  Data path: {}", config.data_path.display());
    println!("  Export path: {}", config.export_path.display());
    println!("  Analysis service: {}", config.analysis.base_url);
    println!(
        "  Analysis support: {}",
        if cfg!(feature = "analysis") {
            "compiled in"
        } else {
            "not compiled in"
        }
    );
    println!();

    match SessionHistoryStore::open_file(config.history_path()) {
        Ok(store) => println!("Sessions in history: {}", store.len()),
        Err(e) => println!("Sessions in history: unreadable ({e})"),
    }
    println!();

    if config.audit_path().exists() {
        let audit = AuditLog::with_persistence(config.audit_path());
        println!("{}", audit.summary());
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", Config::config_path().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn export_summary(config: &Config, summary: &Summary) -> Result<PathBuf> {
    let path = config.export_path.join(format!(
        "session_{}_{}.json",
        summary.metadata.session_id,
        Utc::now().format("%Y%m%d_%H%M%S")
    ));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(&path, json)
        .with_context(|| format!("could not write summary to {}", path.display()))?;
    Ok(path)
}

fn print_overview(summary: &Summary) {
    let freq = &summary.frequency_profile;
    let score = &summary.intensity_profile.tremor_score;
    let trend = &summary.multi_session_trend;

    println!();
    println!("Session {}", summary.metadata.session_id);
    println!("  Duration: {:.2} min", summary.metadata.duration_minutes);
    println!(
        "  Dominant band: {} ({:.1}% of power, ratio {:.2})",
        freq.dominant_band.label(),
        freq.dominant_band_percentage * 100.0,
        freq.dominance_ratio
    );
    println!(
        "  Tremor score: mean {:.2}, std {:.2}, range {:.2}-{:.2}",
        score.mean, score.std, score.min, score.max
    );
    println!(
        "  Fatigue pattern: {}",
        if summary.within_session_trend.fatigue_pattern_detected {
            "yes"
        } else {
            "no"
        }
    );
    println!(
        "  Consistency: {} | severity change: {}",
        trend.dominant_band_consistency_last_3, trend.severity_change_percent
    );
}

fn save_audit(audit: &AuditLog) {
    if let Err(e) = audit.save() {
        eprintln!("Warning: Could not save audit counters: {e}");
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
