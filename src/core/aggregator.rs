//! Accumulation of window samples for the in-progress recording.
//!
//! The aggregator owns the ordered sample sequence between a start and a stop
//! event and keeps O(1) running statistics for live display. It is a
//! single-writer structure: every mutation takes `&mut self`.

use crate::core::sample::{Band, WindowSample};
use crate::core::summary::IntensityBucket;
use crate::error::SessionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recording lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    Stopped,
}

/// Running statistics over the samples pushed so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveStats {
    /// Number of windows in the session
    pub count: usize,
    /// Running mean score
    pub mean: f64,
    /// Running population standard deviation of the score
    pub std: f64,
    /// Highest score seen
    pub peak: f64,
    /// Dominant band of the summed band powers, if any window arrived
    pub dominant_band: Option<Band>,
    /// Fraction of windows per intensity bucket (low, moderate, high, very high)
    pub distribution: [f64; 4],
}

/// Welford accumulator plus band and bucket totals.
#[derive(Debug, Clone, Default)]
struct RunningTotals {
    count: usize,
    mean: f64,
    m2: f64,
    peak: Option<f64>,
    band_sums: [f64; 3],
    buckets: [usize; 4],
}

impl RunningTotals {
    fn add(&mut self, sample: &WindowSample) {
        self.count += 1;
        let delta = sample.score - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample.score - self.mean);

        self.peak = Some(match self.peak {
            Some(peak) => peak.max(sample.score),
            None => sample.score,
        });

        for (sum, power) in self.band_sums.iter_mut().zip(sample.bands()) {
            *sum += power;
        }
        self.buckets[IntensityBucket::of(sample.score) as usize] += 1;
    }

    fn stats(&self) -> LiveStats {
        if self.count == 0 {
            return LiveStats::default();
        }
        let n = self.count as f64;
        let [b1, b2, b3] = self.band_sums;
        LiveStats {
            count: self.count,
            mean: self.mean,
            std: (self.m2 / n).sqrt(),
            peak: self.peak.unwrap_or(0.0),
            dominant_band: Some(Band::dominant(b1, b2, b3)),
            distribution: self.buckets.map(|c| c as f64 / n),
        }
    }
}

/// Collects window samples for one recording at a time.
#[derive(Debug)]
pub struct SessionAggregator {
    state: SessionState,
    samples: Vec<WindowSample>,
    totals: RunningTotals,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    noise_floor: Option<f64>,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            samples: Vec::new(),
            totals: RunningTotals::default(),
            started_at: None,
            stopped_at: None,
            noise_floor: None,
        }
    }

    /// Begin a new recording.
    ///
    /// Fails while a recording is active; call [`stop`](Self::stop) first so
    /// that discarding the previous samples is an explicit decision.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Recording {
            return Err(SessionError::InvalidState(
                "a recording is already active; stop it before starting another".to_string(),
            ));
        }
        self.clear();
        self.state = SessionState::Recording;
        self.started_at = Some(Utc::now());
        tracing::info!("session recording started");
        Ok(())
    }

    /// Append a sample to the active recording.
    ///
    /// Timestamps must not decrease; equal timestamps are accepted.
    pub fn push(&mut self, sample: WindowSample) -> Result<(), SessionError> {
        if self.state != SessionState::Recording {
            return Err(SessionError::InvalidState(format!(
                "cannot add a window while {:?}",
                self.state
            )));
        }
        if let Err(e) = sample.validate() {
            tracing::warn!(error = %e, "rejected window sample");
            return Err(e);
        }
        if let Some(previous) = self.samples.last() {
            if sample.timestamp < previous.timestamp {
                tracing::warn!(
                    timestamp = sample.timestamp,
                    previous = previous.timestamp,
                    "rejected out-of-order window sample"
                );
                return Err(SessionError::invalid_input(format!(
                    "window at {} ms arrived after a window at {} ms",
                    sample.timestamp, previous.timestamp
                )));
            }
        }
        self.totals.add(&sample);
        self.samples.push(sample);
        Ok(())
    }

    /// Freeze the sample sequence. Stopping twice is a no-op.
    pub fn stop(&mut self) {
        if self.state == SessionState::Recording {
            self.state = SessionState::Stopped;
            self.stopped_at = Some(Utc::now());
            tracing::info!(windows = self.samples.len(), "session recording stopped");
        }
    }

    /// Return to idle, discarding the samples of a finished recording.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Recording {
            return Err(SessionError::InvalidState(
                "cannot reset while recording; stop first".to_string(),
            ));
        }
        self.clear();
        self.state = SessionState::Idle;
        Ok(())
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.totals = RunningTotals::default();
        self.started_at = None;
        self.stopped_at = None;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    /// Samples in arrival order.
    pub fn samples(&self) -> &[WindowSample] {
        &self.samples
    }

    /// Owned copy of the samples for summary building.
    pub fn snapshot(&self) -> Vec<WindowSample> {
        self.samples.clone()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Live running statistics.
    pub fn live_stats(&self) -> LiveStats {
        self.totals.stats()
    }

    /// Wall-clock time since start, frozen at stop.
    pub fn elapsed_secs(&self) -> f64 {
        match self.started_at {
            Some(start) => {
                let end = self.stopped_at.unwrap_or_else(Utc::now);
                (end - start).num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Record the baseline from a sensor calibration. Kept across recordings.
    pub fn set_noise_floor(&mut self, baseline: f64) -> Result<(), SessionError> {
        if !baseline.is_finite() || baseline < 0.0 {
            return Err(SessionError::invalid_input(format!(
                "calibration baseline must be non-negative, got {baseline}"
            )));
        }
        tracing::info!(baseline, "noise floor calibrated");
        self.noise_floor = Some(baseline);
        Ok(())
    }

    pub fn noise_floor(&self) -> Option<f64> {
        self.noise_floor
    }
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}
