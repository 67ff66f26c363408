//! Persistent audit counters.
//!
//! Only counts are kept. No sample values or report text are written here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const EVENT_COUNT: usize = 6;

/// Something the agent did that the audit trail counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuditEvent {
    /// Window sample accepted into a recording
    SampleIngested,
    /// Window sample or frame rejected at ingestion
    SampleRejected,
    /// Recording stopped with at least one sample
    SessionRecorded,
    SummaryBuilt,
    /// Successful analysis round trip
    ReportGenerated,
    AnalysisFailed,
}

impl AuditEvent {
    pub const ALL: [AuditEvent; EVENT_COUNT] = [
        AuditEvent::SampleIngested,
        AuditEvent::SampleRejected,
        AuditEvent::SessionRecorded,
        AuditEvent::SummaryBuilt,
        AuditEvent::ReportGenerated,
        AuditEvent::AnalysisFailed,
    ];

    /// Key used in the persisted counts file.
    pub fn key(self) -> &'static str {
        match self {
            AuditEvent::SampleIngested => "samples_ingested",
            AuditEvent::SampleRejected => "samples_rejected",
            AuditEvent::SessionRecorded => "sessions_recorded",
            AuditEvent::SummaryBuilt => "summaries_built",
            AuditEvent::ReportGenerated => "reports_generated",
            AuditEvent::AnalysisFailed => "analysis_failures",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AuditEvent::SampleIngested => "Windows ingested",
            AuditEvent::SampleRejected => "Windows rejected",
            AuditEvent::SessionRecorded => "Sessions recorded",
            AuditEvent::SummaryBuilt => "Summaries built",
            AuditEvent::ReportGenerated => "Reports generated",
            AuditEvent::AnalysisFailed => "Analysis failures",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.key() == key)
    }
}

/// Running audit counters, safe to share between the reader thread and the
/// main loop.
#[derive(Debug)]
pub struct AuditLog {
    counts: [AtomicU64; EVENT_COUNT],
    started_at: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            counts: Default::default(),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create an audit log backed by a JSON file, resuming its counts.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous audit counters");
        }

        log
    }

    pub fn record(&self, event: AuditEvent) {
        self.counts[event as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, event: AuditEvent) -> u64 {
        self.counts[event as usize].load(Ordering::Relaxed)
    }

    /// Get the current counts.
    pub fn stats(&self) -> AuditStats {
        AuditStats {
            counts: AuditEvent::ALL.map(|event| self.count(event)),
            started_at: self.started_at,
        }
    }

    /// Human-readable report for the `status` command.
    pub fn summary(&self) -> String {
        let mut report = String::from("Audit Counters:\n");
        for event in AuditEvent::ALL {
            report.push_str(&format!("- {}: {}\n", event.label(), self.count(event)));
        }
        report.push_str(
            "\nData Handling:\n\
             - Raw windows are discarded once a summary is built\n\
             - History keeps only band, mean score and time for the last 10 sessions",
        );
        report
    }

    /// Save counts to disk. A log without a path does nothing.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let persisted = PersistedCounts {
            counts: AuditEvent::ALL
                .into_iter()
                .map(|event| (event.key().to_string(), self.count(event)))
                .collect(),
            last_updated: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let persisted: PersistedCounts =
            serde_json::from_str(&content).map_err(std::io::Error::other)?;

        for (key, value) in persisted.counts {
            match AuditEvent::from_key(&key) {
                Some(event) => self.counts[event as usize].store(value, Ordering::Relaxed),
                None => tracing::debug!(key = %key, "ignoring unknown audit counter"),
            }
        }
        Ok(())
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the audit counters.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditStats {
    counts: [u64; EVENT_COUNT],
    pub started_at: DateTime<Utc>,
}

impl AuditStats {
    pub fn get(&self, event: AuditEvent) -> u64 {
        self.counts[event as usize]
    }

    /// Sum of every counter.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCounts {
    counts: BTreeMap<String, u64>,
    last_updated: DateTime<Utc>,
}

pub type SharedAuditLog = Arc<AuditLog>;

pub fn create_shared_log() -> SharedAuditLog {
    Arc::new(AuditLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedAuditLog {
    Arc::new(AuditLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("tremorsense-audit-{}", uuid::Uuid::new_v4()))
            .join("audit_log.json")
    }

    #[test]
    fn test_audit_log_counting() {
        let log = AuditLog::new();
        log.record(AuditEvent::SampleIngested);
        log.record(AuditEvent::SampleIngested);
        log.record(AuditEvent::SampleRejected);
        log.record(AuditEvent::AnalysisFailed);

        let stats = log.stats();
        assert_eq!(stats.get(AuditEvent::SampleIngested), 2);
        assert_eq!(stats.get(AuditEvent::SampleRejected), 1);
        assert_eq!(stats.get(AuditEvent::AnalysisFailed), 1);
        assert_eq!(stats.get(AuditEvent::ReportGenerated), 0);
        assert_eq!(stats.total(), 4);
    }

    #[test]
    fn test_shared_log_counts_across_threads() {
        let log = create_shared_log();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        log.record(AuditEvent::SampleIngested);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.count(AuditEvent::SampleIngested), 1000);
    }

    #[test]
    fn test_counts_survive_reload() {
        let path = temp_path();

        let log = AuditLog::with_persistence(path.clone());
        log.record(AuditEvent::SessionRecorded);
        log.record(AuditEvent::SummaryBuilt);
        log.record(AuditEvent::ReportGenerated);
        log.save().unwrap();

        let reloaded = AuditLog::with_persistence(path.clone());
        assert_eq!(reloaded.count(AuditEvent::SessionRecorded), 1);
        assert_eq!(reloaded.count(AuditEvent::SummaryBuilt), 1);
        assert_eq!(reloaded.count(AuditEvent::ReportGenerated), 1);
        assert_eq!(reloaded.count(AuditEvent::SampleIngested), 0);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_unknown_persisted_counter_is_ignored() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"counts":{"summaries_built":3,"retired_counter":9},"last_updated":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let log = AuditLog::with_persistence(path.clone());
        assert_eq!(log.count(AuditEvent::SummaryBuilt), 3);
        assert_eq!(log.stats().total(), 3);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summary_format() {
        let log = AuditLog::new();
        log.record(AuditEvent::SampleRejected);
        let summary = log.summary();
        assert!(summary.contains("- Windows ingested: 0"));
        assert!(summary.contains("- Windows rejected: 1"));
        assert!(summary.contains("Analysis failures"));
        assert!(summary.contains("last 10 sessions"));
    }
}
