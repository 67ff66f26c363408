//! Per-window sensor readings and the tremor frequency bands.
//!
//! A window carries three band powers computed upstream, a log-scaled
//! severity score, and optional classifier metadata. Samples are validated at
//! ingestion: malformed values are rejected, never coerced.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// One of the three tremor frequency bands.
///
/// Declaration order is the tie-break order: when band powers are equal the
/// earlier band wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    /// 4–6 Hz (parkinsonian range)
    #[serde(rename = "hz_4_6")]
    Hz4To6,
    /// 6–8 Hz (essential range)
    #[serde(rename = "hz_6_8")]
    Hz6To8,
    /// 8–12 Hz (physiological range)
    #[serde(rename = "hz_8_12")]
    Hz8To12,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Hz4To6, Band::Hz6To8, Band::Hz8To12];

    /// Identifier used in the summary contract.
    pub fn id(self) -> &'static str {
        match self {
            Band::Hz4To6 => "hz_4_6",
            Band::Hz6To8 => "hz_6_8",
            Band::Hz8To12 => "hz_8_12",
        }
    }

    /// Human-readable label used in report strings.
    pub fn label(self) -> &'static str {
        match self {
            Band::Hz4To6 => "4–6 Hz",
            Band::Hz6To8 => "6–8 Hz",
            Band::Hz8To12 => "8–12 Hz",
        }
    }

    /// The dominant band for a triple of powers.
    ///
    /// b1 wins if it is at least as large as both others, otherwise b2 wins
    /// if it is at least as large as b3, otherwise b3. Used for both the
    /// session-mean and the per-window dominant band.
    pub fn dominant(b1: f64, b2: f64, b3: f64) -> Band {
        if b1 >= b2 && b1 >= b3 {
            Band::Hz4To6
        } else if b2 >= b3 {
            Band::Hz6To8
        } else {
            Band::Hz8To12
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single analysis window as emitted by the sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSample {
    /// Power in the 4–6 Hz band
    pub b1: f64,
    /// Power in the 6–8 Hz band
    pub b2: f64,
    /// Power in the 8–12 Hz band
    pub b3: f64,
    /// Log-scaled tremor intensity, conventionally 0-10
    pub score: f64,
    /// Classifier label, empty if unclassified
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Classifier confidence (0-1)
    #[serde(default)]
    pub confidence: f64,
    /// Normalized RMS-like amplitude
    #[serde(rename = "meanNorm", default)]
    pub mean_norm: f64,
    /// Capture time in milliseconds
    #[serde(alias = "ts", default)]
    pub timestamp: i64,
}

impl WindowSample {
    /// Create a sample with band powers and score only.
    pub fn new(b1: f64, b2: f64, b3: f64, score: f64, timestamp: i64) -> Self {
        Self {
            b1,
            b2,
            b3,
            score,
            kind: String::new(),
            confidence: 0.0,
            mean_norm: 0.0,
            timestamp,
        }
    }

    /// Attach classifier output.
    pub fn with_classification(mut self, kind: impl Into<String>, confidence: f64) -> Self {
        self.kind = kind.into();
        self.confidence = confidence;
        self
    }

    /// Attach the normalized amplitude.
    pub fn with_mean_norm(mut self, mean_norm: f64) -> Self {
        self.mean_norm = mean_norm;
        self
    }

    /// Band powers in band order.
    pub fn bands(&self) -> [f64; 3] {
        [self.b1, self.b2, self.b3]
    }

    /// Dominant band of this single window.
    pub fn dominant_band(&self) -> Band {
        Band::dominant(self.b1, self.b2, self.b3)
    }

    /// Check every field against its domain.
    pub fn validate(&self) -> Result<(), SessionError> {
        for (band, power) in Band::ALL.iter().zip(self.bands()) {
            if !power.is_finite() || power < 0.0 {
                return Err(SessionError::invalid_input(format!(
                    "band power {} must be a non-negative number, got {power}",
                    band.id()
                )));
            }
        }
        if !self.score.is_finite() {
            return Err(SessionError::invalid_input(format!(
                "score must be finite, got {}",
                self.score
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SessionError::invalid_input(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        if !self.mean_norm.is_finite() || self.mean_norm < 0.0 {
            return Err(SessionError::invalid_input(format!(
                "meanNorm must be non-negative, got {}",
                self.mean_norm
            )));
        }
        Ok(())
    }
}
