//! Error taxonomy for the session analytics engine.

use thiserror::Error;

/// Errors surfaced by the aggregator, the summary builder and the analysis step.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Fewer windows than a summary needs. Not retried.
    #[error("insufficient data: {count} window(s) captured, at least {required} required")]
    InsufficientData { count: usize, required: usize },

    /// A malformed sample or argument, rejected at ingestion.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation is not valid in the current session state.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// The external analysis call failed or timed out.
    #[error("analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    /// The session history could not be loaded or saved.
    #[error("history store error: {0}")]
    History(#[from] crate::core::history::HistoryError),
}

impl SessionError {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        SessionError::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = SessionError::InsufficientData {
            count: 2,
            required: 3,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data: 2 window(s) captured, at least 3 required"
        );
    }

    #[test]
    fn test_analysis_unavailable_is_verbatim() {
        let err = SessionError::AnalysisUnavailable("HTTP 503".to_string());
        assert!(err.to_string().ends_with("HTTP 503"));
    }
}
