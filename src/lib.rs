//! TremorSense Session Agent - statistical summaries of tremor recordings.
//!
//! This library turns a stream of per-window tremor band powers from a
//! wearable sensor into a structured, clinical-style summary of a recording
//! session, and tracks a short history of past sessions for comparison.
//!
//! # Guarantees
//!
//! - **Deterministic**: the same windows and history always give the same summary
//! - **Validated input**: malformed windows are rejected, never coerced
//! - **Bounded history**: only band, mean score and time of the last 10 sessions
//! - **Auditable**: ingestion and analysis activity is counted and inspectable
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TremorSense Session Agent                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Stream    │──▶│ Aggregator  │──▶│   Summary   │       │
//! │  │  (SSE/JSON) │   │ (recording) │   │   Builder   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         │                 ▲                  │              │
//! │         ▼                 │                  ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │    Audit    │   │   History   │◀──│  Analysis   │       │
//! │  │     Log     │   │    Store    │   │   Service   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tremorsense_agent::core::{SessionAggregator, SessionSummaryBuilder, WindowSample};
//!
//! let mut aggregator = SessionAggregator::new();
//! aggregator.start().unwrap();
//! for (i, score) in [2.0, 5.0, 8.0].into_iter().enumerate() {
//!     let sample = WindowSample::new(0.4, 0.2, 0.1, score, 1_000 * i as i64);
//!     aggregator.push(sample).unwrap();
//! }
//! aggregator.stop();
//!
//! let summary = SessionSummaryBuilder::new()
//!     .build(aggregator.samples(), &[], aggregator.noise_floor())
//!     .unwrap();
//! assert_eq!(summary.frequency_profile.dominant_band.id(), "hz_4_6");
//! ```

pub mod analysis;
pub mod audit;
pub mod config;
pub mod core;
pub mod error;
pub mod stream;

// Re-export key types at crate root for convenience
pub use analysis::{
    analyze_and_record, commit_analysis, AnalysisConfig, AnalysisError, AnalysisReport, Analyzer,
};
pub use audit::{AuditEvent, AuditLog, AuditStats, SharedAuditLog};
pub use config::{Config, ConfigError};
pub use core::{
    Band, SessionAggregator, SessionHistoryEntry, SessionHistoryStore, SessionSummaryBuilder,
    Summary, WindowSample,
};
pub use error::SessionError;
pub use stream::{StreamError, StreamEvent, StreamReader};

#[cfg(feature = "analysis")]
pub use analysis::{AnalysisClient, BlockingAnalysisClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Disclaimer shown with every report.
pub const DISCLAIMER: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              TREMORSENSE SESSION AGENT - DISCLAIMER              ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This tool summarizes tremor sensor recordings for research      ║
║  and self-tracking.                                              ║
║                                                                  ║
║  ✓ WHAT IT DOES:                                                 ║
║    • Summarizes band power and intensity per session             ║
║    • Compares a session with your recent sessions                ║
║    • Sends the summary (no raw windows) for a written report     ║
║                                                                  ║
║  ✗ WHAT IT IS NOT:                                               ║
║    • A medical device                                            ║
║    • A diagnosis of Parkinson's disease or essential tremor      ║
║    • A substitute for assessment by a clinician                  ║
║                                                                  ║
║  Only the last 10 sessions are kept, as band, mean score and     ║
║  time. View activity counters anytime with:                      ║
║    tremorsense status                                            ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
