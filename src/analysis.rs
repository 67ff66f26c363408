//! Client for the external analysis service.
//!
//! A finished [`Summary`] is POSTed as JSON to `<base_url>/analyze`; the
//! service answers with a prose report. Only a successful analysis appends
//! the session to the history store, so a failed call can be retried with
//! the same summary.

use crate::core::{SessionHistoryEntry, SessionHistoryStore, Summary};
use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Analysis service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Service root, e.g. `http://127.0.0.1:8000`
    pub base_url: String,
    /// Per-request timeout
    #[serde(rename = "timeout_secs", with = "crate::config::duration_secs")]
    pub timeout: Duration,
    /// Extra attempts after a network failure, timeout or 5xx
    pub retries: u32,
    /// Optional bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout: Duration::from_secs(30),
            retries: 1,
            token: None,
        }
    }
}

impl AnalysisConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Get the analyze endpoint URL.
    pub fn analyze_url(&self) -> String {
        format!("{}/analyze", self.base_url.trim_end_matches('/'))
    }
}

/// Analysis client error types.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },
    #[error("undecodable response: {0}")]
    Serialization(String),
}

impl AnalysisError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AnalysisError::Network(_) | AnalysisError::Timeout(_) => true,
            AnalysisError::Server { status, .. } => *status >= 500,
            AnalysisError::Config(_) | AnalysisError::Serialization(_) => false,
        }
    }
}

impl From<AnalysisError> for SessionError {
    fn from(e: AnalysisError) -> Self {
        SessionError::AnalysisUnavailable(e.to_string())
    }
}

/// Report returned by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Markdown-flavoured clinical prose
    pub clinical_summary: String,
    /// e.g. "low", "moderate", "high"
    pub confidence_level: String,
    pub advisory_note: String,
}

/// Anything that can turn a summary into a report.
pub trait Analyzer {
    fn analyze(&self, summary: &Summary) -> Result<AnalysisReport, AnalysisError>;
}

/// Apply the outcome of an analysis call to the history store.
///
/// On success the session is appended with `recorded_at` (ms) as its
/// timestamp. On failure the store is not touched and the error surfaces as
/// [`SessionError::AnalysisUnavailable`].
pub fn commit_analysis(
    outcome: Result<AnalysisReport, AnalysisError>,
    summary: &Summary,
    store: &mut SessionHistoryStore,
    recorded_at: i64,
) -> Result<AnalysisReport, SessionError> {
    match outcome {
        Ok(report) => {
            store.append(SessionHistoryEntry::from_summary(summary, recorded_at))?;
            tracing::info!(
                session_id = %summary.metadata.session_id,
                history = store.len(),
                "analysis report received"
            );
            Ok(report)
        }
        Err(e) => {
            tracing::warn!(
                session_id = %summary.metadata.session_id,
                error = %e,
                "analysis unavailable"
            );
            Err(e.into())
        }
    }
}

/// Analyze a summary and record the session in history on success.
pub fn analyze_and_record<A: Analyzer + ?Sized>(
    analyzer: &A,
    summary: &Summary,
    store: &mut SessionHistoryStore,
    recorded_at: i64,
) -> Result<AnalysisReport, SessionError> {
    commit_analysis(analyzer.analyze(summary), summary, store, recorded_at)
}

/// HTTP client for the analysis service.
#[cfg(feature = "analysis")]
pub struct AnalysisClient {
    config: AnalysisConfig,
    client: reqwest::Client,
    device_id: String,
}

#[cfg(feature = "analysis")]
impl AnalysisClient {
    /// Create a new analysis client.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalysisError::Config(format!("failed to create HTTP client: {e}")))?;

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let device_id = format!(
            "tremorsense-{}-{}",
            hostname,
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Ok(Self {
            config,
            client,
            device_id,
        })
    }

    /// Send the summary, retrying transient failures up to `retries` times.
    pub async fn analyze(&self, summary: &Summary) -> Result<AnalysisReport, AnalysisError> {
        let mut attempt = 0;
        loop {
            match self.send(summary).await {
                Err(e) if e.is_transient() && attempt < self.config.retries => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, "retrying analysis request");
                }
                outcome => return outcome,
            }
        }
    }

    async fn send(&self, summary: &Summary) -> Result<AnalysisReport, AnalysisError> {
        let mut request = self
            .client
            .post(self.config.analyze_url())
            .header("X-Device-Id", &self.device_id)
            .json(summary);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnalysisError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout(self.config.timeout)
            } else {
                AnalysisError::Serialization(e.to_string())
            }
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> AnalysisError {
        if e.is_timeout() {
            AnalysisError::Timeout(self.config.timeout)
        } else {
            AnalysisError::Network(e.to_string())
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Blocking analysis client for use in synchronous contexts.
#[cfg(feature = "analysis")]
pub struct BlockingAnalysisClient {
    inner: AnalysisClient,
    runtime: tokio::runtime::Runtime,
}

#[cfg(feature = "analysis")]
impl BlockingAnalysisClient {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AnalysisError::Config(format!("failed to create runtime: {e}")))?;

        Ok(Self {
            inner: AnalysisClient::new(config)?,
            runtime,
        })
    }

    pub fn device_id(&self) -> &str {
        self.inner.device_id()
    }
}

#[cfg(feature = "analysis")]
impl Analyzer for BlockingAnalysisClient {
    fn analyze(&self, summary: &Summary) -> Result<AnalysisReport, AnalysisError> {
        self.runtime.block_on(self.inner.analyze(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SessionSummaryBuilder, WindowSample};
    use std::cell::Cell;

    struct FakeAnalyzer {
        fail: Cell<bool>,
    }

    impl Analyzer for FakeAnalyzer {
        fn analyze(&self, _summary: &Summary) -> Result<AnalysisReport, AnalysisError> {
            if self.fail.get() {
                return Err(AnalysisError::Server {
                    status: 503,
                    message: "model loading".to_string(),
                });
            }
            Ok(AnalysisReport {
                clinical_summary: "## Findings\nRest tremor in the 4–6 Hz band.".to_string(),
                confidence_level: "moderate".to_string(),
                advisory_note: "Not a diagnosis.".to_string(),
            })
        }
    }

    fn summary() -> Summary {
        let samples = vec![
            WindowSample::new(0.4, 0.1, 0.05, 2.0, 1_000),
            WindowSample::new(0.5, 0.2, 0.05, 3.0, 2_000),
            WindowSample::new(0.6, 0.1, 0.05, 4.0, 3_000),
        ];
        SessionSummaryBuilder::new().build(&samples, &[], None).unwrap()
    }

    #[test]
    fn test_analyze_url() {
        let config = AnalysisConfig::new("http://localhost:8000/");
        assert_eq!(config.analyze_url(), "http://localhost:8000/analyze");
    }

    #[test]
    fn test_failure_leaves_history_untouched_and_retry_succeeds() {
        let analyzer = FakeAnalyzer {
            fail: Cell::new(true),
        };
        let summary = summary();
        let mut store = SessionHistoryStore::in_memory();

        let err = analyze_and_record(&analyzer, &summary, &mut store, 10).unwrap_err();
        match err {
            SessionError::AnalysisUnavailable(msg) => assert!(msg.contains("503")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.is_empty());

        analyzer.fail.set(false);
        let report = analyze_and_record(&analyzer, &summary, &mut store, 20).unwrap();
        assert_eq!(report.confidence_level, "moderate");
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].timestamp, 20);
        assert_eq!(
            store.entries()[0].mean_score,
            summary.intensity_profile.tremor_score.mean
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(AnalysisError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(AnalysisError::Server {
            status: 502,
            message: String::new()
        }
        .is_transient());
        assert!(!AnalysisError::Server {
            status: 422,
            message: String::new()
        }
        .is_transient());
        assert!(!AnalysisError::Serialization("eof".to_string()).is_transient());
    }

    #[test]
    fn test_report_parses_service_response() {
        let json = r#"{"clinical_summary":"ok","confidence_level":"High","advisory_note":"n"}"#;
        let report: AnalysisReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.confidence_level, "High");
    }
}
