//! Core functionality for the TremorSense session agent.
//!
//! This module contains:
//! - Window samples and tremor frequency bands
//! - Pure statistics helpers
//! - The recording aggregator with live statistics
//! - The session summary builder
//! - The bounded session history store

pub mod aggregator;
pub mod history;
pub mod sample;
pub mod stats;
pub mod summary;

// Re-export commonly used types
pub use aggregator::{LiveStats, SessionAggregator, SessionState};
pub use history::{
    HistoryError, HistoryPersistence, InMemoryHistory, JsonFileHistory, SessionHistoryEntry,
    SessionHistoryStore, MAX_HISTORY_ENTRIES,
};
pub use sample::{Band, WindowSample};
pub use summary::{
    IntensityBucket, SessionMetrics, SessionSummaryBuilder, Summary, MIN_WINDOWS,
    SAMPLING_RATE_HZ,
};
