//! Session summary builder.
//!
//! Turns a completed window sequence plus the recent session history into the
//! structured report consumed by the analysis service. Computation happens in
//! two passes: [`SessionSummaryBuilder::compute`] derives every statistic at
//! full precision into [`SessionMetrics`], then [`Summary::from_metrics`]
//! applies the per-field rounding and string formatting of the output
//! contract. The builder reads no clock and performs no I/O, so identical
//! inputs always produce identical summaries.

use crate::core::history::SessionHistoryEntry;
use crate::core::sample::{Band, WindowSample};
use crate::core::stats;
use crate::error::SessionError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Minimum number of windows a summary needs.
pub const MIN_WINDOWS: usize = 3;

/// Sensor sampling rate reported in the metadata.
pub const SAMPLING_RATE_HZ: u32 = 50;

pub const CONDITION: &str = "rest";
pub const MEDICATION_STATUS: &str = "unknown";
pub const TREMOR_SCORE_SCALE: &str = "0_to_10_log_scaled";

/// Severity change reported when there is no prior session to compare with.
pub const FIRST_SESSION_MARKER: &str = "N/A (first session)";

/// Weekly slope reported when fewer than two sessions are available.
pub const NEUTRAL_WEEKLY_SLOPE: &str = "+0.0";

/// Uncalibrated noise-floor correction applied to the mean amplitude.
const NOISE_FLOOR_FALLBACK_FACTOR: f64 = 0.93;

/// Late-vs-early increase (percent) above which fatigue is flagged.
const FATIGUE_THRESHOLD_PERCENT: f64 = 5.0;

/// Prior sessions included in the multi-session comparison.
const HISTORY_LOOKBACK: usize = 2;

const MS_PER_MINUTE: f64 = 60_000.0;
const MS_PER_WEEK: f64 = 604_800_000.0;

/// Intensity bucket of a single window score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntensityBucket {
    /// score < 2.5
    Low = 0,
    /// 2.5 <= score < 5
    Moderate = 1,
    /// 5 <= score < 7.5
    High = 2,
    /// score >= 7.5
    VeryHigh = 3,
}

impl IntensityBucket {
    pub const ALL: [IntensityBucket; 4] = [
        IntensityBucket::Low,
        IntensityBucket::Moderate,
        IntensityBucket::High,
        IntensityBucket::VeryHigh,
    ];

    pub fn of(score: f64) -> Self {
        if score < 2.5 {
            IntensityBucket::Low
        } else if score < 5.0 {
            IntensityBucket::Moderate
        } else if score < 7.5 {
            IntensityBucket::High
        } else {
            IntensityBucket::VeryHigh
        }
    }

    /// Half-open score range `[lo, hi)` of the bucket.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            IntensityBucket::Low => (f64::NEG_INFINITY, 2.5),
            IntensityBucket::Moderate => (2.5, 5.0),
            IntensityBucket::High => (5.0, 7.5),
            IntensityBucket::VeryHigh => (7.5, f64::INFINITY),
        }
    }
}

// ============================================================================
// Output contract
// ============================================================================

/// Session metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub session_id: String,
    /// End of the session (ISO-8601, UTC)
    pub timestamp: String,
    pub duration_minutes: f64,
    pub sampling_rate_hz: u32,
    pub condition: String,
    pub medication_status: String,
    pub tremor_score_scale: String,
}

/// One value per frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandValues {
    pub hz_4_6: f64,
    pub hz_6_8: f64,
    pub hz_8_12: f64,
}

impl BandValues {
    fn from_array([hz_4_6, hz_6_8, hz_8_12]: [f64; 3]) -> Self {
        Self {
            hz_4_6,
            hz_6_8,
            hz_8_12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyProfile {
    pub band_power_mean: BandValues,
    pub band_power_std: BandValues,
    pub dominant_band: Band,
    /// Largest band mean over smallest band mean
    pub dominance_ratio: f64,
    /// Share of the dominant band in the summed band means
    pub dominant_band_percentage: f64,
    /// Changes of per-window dominant band between consecutive windows
    pub band_switch_count: u32,
}

/// Distribution statistics of the window scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityProfile {
    pub tremor_score: ScoreStats,
    pub rms_mean: f64,
    pub noise_floor_adjusted_intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityDistribution {
    pub low_fraction: f64,
    pub moderate_fraction: f64,
    pub high_fraction: f64,
    pub very_high_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariabilityProfile {
    pub coefficient_of_variation: f64,
    pub stability_index: f64,
    /// Normalized entropy of band-mean proportions (1 = evenly spread)
    pub spectral_entropy: f64,
    pub window_to_window_variance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithinSessionTrend {
    pub linear_slope_per_minute_score_units: f64,
    pub early_vs_late_change_percent: f64,
    pub fatigue_pattern_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSessionTrend {
    /// e.g. "4–6 Hz in 2/3 sessions"
    pub dominant_band_consistency_last_3: String,
    /// Signed change of mean score per week, e.g. "-0.42"
    pub tremor_score_weekly_slope: String,
    /// Signed percentage, e.g. "+12.5%", or the first-session marker
    pub severity_change_percent: String,
    pub band_shift_detected: bool,
}

/// Structured report of one recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub metadata: SummaryMetadata,
    pub frequency_profile: FrequencyProfile,
    pub intensity_profile: IntensityProfile,
    pub intensity_distribution: IntensityDistribution,
    pub variability_profile: VariabilityProfile,
    pub within_session_trend: WithinSessionTrend,
    pub multi_session_trend: MultiSessionTrend,
}

// ============================================================================
// Full-precision metrics
// ============================================================================

/// Comparison of the current session against recent history.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiSessionMetrics {
    /// Sessions sharing the current dominant band
    pub consistency_count: usize,
    /// Sessions compared, including the current one
    pub sessions_compared: usize,
    /// Mean-score change per week; `None` with no prior session
    pub weekly_slope: Option<f64>,
    /// Percent change against the oldest compared session; `None` with no prior session
    pub severity_change_percent: Option<f64>,
    pub band_shift_detected: bool,
}

/// Every summary statistic before rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetrics {
    pub window_count: usize,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub duration_minutes: f64,

    pub band_mean: [f64; 3],
    pub band_std: [f64; 3],
    pub dominant_band: Band,
    pub dominance_ratio: f64,
    pub dominant_band_fraction: f64,
    pub band_switch_count: u32,

    pub score: ScoreStats,
    pub rms_mean: f64,
    pub noise_floor_adjusted_intensity: f64,

    /// Fractions in [`IntensityBucket`] order
    pub distribution: [f64; 4],

    pub coefficient_of_variation: f64,
    pub stability_index: f64,
    pub spectral_entropy: f64,
    pub window_to_window_variance: f64,

    pub slope_per_minute: f64,
    pub early_vs_late_change_percent: f64,
    pub fatigue_pattern_detected: bool,

    pub multi_session: MultiSessionMetrics,
}

// ============================================================================
// Builder
// ============================================================================

/// Builds [`Summary`] values from window samples and session history.
#[derive(Debug, Clone)]
pub struct SessionSummaryBuilder {
    sampling_rate_hz: u32,
}

impl SessionSummaryBuilder {
    pub fn new() -> Self {
        Self {
            sampling_rate_hz: SAMPLING_RATE_HZ,
        }
    }

    /// Override the sampling rate reported in the metadata.
    pub fn with_sampling_rate(mut self, sampling_rate_hz: u32) -> Self {
        self.sampling_rate_hz = sampling_rate_hz;
        self
    }

    /// Build the rounded summary.
    ///
    /// Only the last two `history` entries are consulted.
    pub fn build(
        &self,
        samples: &[WindowSample],
        history: &[SessionHistoryEntry],
        calibrated_noise_floor: Option<f64>,
    ) -> Result<Summary, SessionError> {
        let metrics = self.compute(samples, history, calibrated_noise_floor)?;
        Ok(Summary::from_metrics(&metrics, self.sampling_rate_hz))
    }

    /// Build the summary and serialize it as pretty JSON.
    pub fn build_json(
        &self,
        samples: &[WindowSample],
        history: &[SessionHistoryEntry],
        calibrated_noise_floor: Option<f64>,
    ) -> Result<String, SessionError> {
        let summary = self.build(samples, history, calibrated_noise_floor)?;
        serde_json::to_string_pretty(&summary)
            .map_err(|e| SessionError::invalid_input(format!("summary serialization: {e}")))
    }

    /// Derive every statistic at full precision.
    pub fn compute(
        &self,
        samples: &[WindowSample],
        history: &[SessionHistoryEntry],
        calibrated_noise_floor: Option<f64>,
    ) -> Result<SessionMetrics, SessionError> {
        if samples.len() < MIN_WINDOWS {
            return Err(SessionError::InsufficientData {
                count: samples.len(),
                required: MIN_WINDOWS,
            });
        }
        for sample in samples {
            sample.validate()?;
        }
        if let Some(pair) = samples
            .windows(2)
            .find(|pair| pair[1].timestamp < pair[0].timestamp)
        {
            return Err(SessionError::invalid_input(format!(
                "windows are not in time order: {} ms follows {} ms",
                pair[1].timestamp, pair[0].timestamp
            )));
        }
        if let Some(floor) = calibrated_noise_floor {
            if !floor.is_finite() {
                return Err(SessionError::invalid_input(format!(
                    "calibrated noise floor must be finite, got {floor}"
                )));
            }
        }

        let n = samples.len();
        let scores: Vec<f64> = samples.iter().map(|s| s.score).collect();
        let (first, last) = (&samples[0], &samples[n - 1]);
        let duration_minutes = (last.timestamp - first.timestamp) as f64 / MS_PER_MINUTE;

        // Frequency profile
        let mut band_mean = [0.0; 3];
        let mut band_std = [0.0; 3];
        for band in 0..3 {
            let powers: Vec<f64> = samples.iter().map(|s| s.bands()[band]).collect();
            band_mean[band] = stats::mean(&powers)?;
            band_std[band] = stats::population_std(&powers)?;
        }
        let [m1, m2, m3] = band_mean;
        let dominant_band = Band::dominant(m1, m2, m3);
        let max_mean = m1.max(m2).max(m3);
        let min_mean = m1.min(m2).min(m3);
        let total_mean = m1 + m2 + m3;
        let dominance_ratio = max_mean / if min_mean == 0.0 { 0.001 } else { min_mean };
        let band_total = if total_mean == 0.0 { 1.0 } else { total_mean };
        let dominant_band_fraction = max_mean / band_total;
        let band_switch_count = samples
            .windows(2)
            .filter(|pair| pair[0].dominant_band() != pair[1].dominant_band())
            .count() as u32;

        // Intensity profile
        let score = ScoreStats {
            mean: stats::mean(&scores)?,
            std: stats::population_std(&scores)?,
            min: stats::percentile(&scores, 0.0)?,
            max: stats::percentile(&scores, 100.0)?,
            p25: stats::percentile(&scores, 25.0)?,
            p50: stats::percentile(&scores, 50.0)?,
            p75: stats::percentile(&scores, 75.0)?,
            p90: stats::percentile(&scores, 90.0)?,
        };
        let norms: Vec<f64> = samples.iter().map(|s| s.mean_norm).collect();
        let rms_mean = stats::mean(&norms)?;
        let noise_floor_adjusted_intensity = match calibrated_noise_floor {
            Some(floor) => (rms_mean - floor).max(0.0),
            None => rms_mean * NOISE_FLOOR_FALLBACK_FACTOR,
        };

        // Intensity distribution
        let mut distribution = [0.0; 4];
        for bucket in IntensityBucket::ALL {
            let (lo, hi) = bucket.bounds();
            distribution[bucket as usize] = stats::fraction_in_range(&scores, lo, hi)?;
        }

        // Variability profile
        let cv_denominator = if score.mean == 0.0 { 1.0 } else { score.mean };
        let coefficient_of_variation = score.std / cv_denominator;
        let stability_index = (1.0 - coefficient_of_variation).max(0.0);
        let proportions = band_mean.map(|m| m / band_total);
        let spectral_entropy = stats::normalized_entropy(&proportions)?;
        let window_to_window_variance = stats::mean_squared_successive_difference(&scores)?;

        // Within-session trend
        let slope_per_window = stats::linear_regression_slope(&scores)?;
        let slope_per_minute = if duration_minutes > 0.0 {
            slope_per_window * n as f64 / duration_minutes
        } else {
            0.0
        };
        let half = n / 2;
        let early_avg = stats::mean(&scores[..half])?;
        let late_avg = stats::mean(&scores[half..])?;
        let early_vs_late_change_percent = if early_avg == 0.0 {
            0.0
        } else {
            (late_avg - early_avg) / early_avg * 100.0
        };
        let fatigue_pattern_detected = early_vs_late_change_percent > FATIGUE_THRESHOLD_PERCENT;

        let multi_session =
            compare_sessions(history, dominant_band, score.mean, last.timestamp)?;

        Ok(SessionMetrics {
            window_count: n,
            start_timestamp: first.timestamp,
            end_timestamp: last.timestamp,
            duration_minutes,
            band_mean,
            band_std,
            dominant_band,
            dominance_ratio,
            dominant_band_fraction,
            band_switch_count,
            score,
            rms_mean,
            noise_floor_adjusted_intensity,
            distribution,
            coefficient_of_variation,
            stability_index,
            spectral_entropy,
            window_to_window_variance,
            slope_per_minute,
            early_vs_late_change_percent,
            fatigue_pattern_detected,
            multi_session,
        })
    }
}

impl Default for SessionSummaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare the current session with the most recent history entries.
fn compare_sessions(
    history: &[SessionHistoryEntry],
    dominant_band: Band,
    mean_score: f64,
    end_timestamp: i64,
) -> Result<MultiSessionMetrics, SessionError> {
    let recent = &history[history.len().saturating_sub(HISTORY_LOOKBACK)..];

    let mut bands: Vec<Band> = recent.iter().map(|e| e.dominant_band).collect();
    let mut means: Vec<f64> = recent.iter().map(|e| e.mean_score).collect();
    let mut times: Vec<f64> = recent.iter().map(|e| e.timestamp as f64).collect();
    bands.push(dominant_band);
    means.push(mean_score);
    times.push(end_timestamp as f64);

    let consistency_count = bands.iter().filter(|&&b| b == dominant_band).count();

    let weekly_slope = if means.len() >= 2 {
        Some(stats::regression_slope(&times, &means)? * MS_PER_WEEK)
    } else {
        None
    };

    let severity_change_percent = recent.first().map(|oldest| {
        if oldest.mean_score > 0.0 {
            (mean_score - oldest.mean_score) / oldest.mean_score * 100.0
        } else {
            0.0
        }
    });

    let band_shift_detected = recent
        .last()
        .is_some_and(|latest| latest.dominant_band != dominant_band);

    Ok(MultiSessionMetrics {
        consistency_count,
        sessions_compared: bands.len(),
        weekly_slope,
        severity_change_percent,
        band_shift_detected,
    })
}

// ============================================================================
// Output boundary
// ============================================================================

/// Round to `places` decimals, folding negative zero into zero.
fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

fn signed(value: f64, places: usize) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value:+.places$}")
}

fn session_id(end_timestamp: i64) -> String {
    format!("S{:04}", end_timestamp.rem_euclid(10_000))
}

fn iso_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Summary {
    /// Apply output rounding and formatting to full-precision metrics.
    pub fn from_metrics(m: &SessionMetrics, sampling_rate_hz: u32) -> Self {
        let multi = &m.multi_session;
        let score = &m.score;

        Summary {
            metadata: SummaryMetadata {
                session_id: session_id(m.end_timestamp),
                timestamp: iso_timestamp(m.end_timestamp),
                duration_minutes: round_to(m.duration_minutes, 2),
                sampling_rate_hz,
                condition: CONDITION.to_string(),
                medication_status: MEDICATION_STATUS.to_string(),
                tremor_score_scale: TREMOR_SCORE_SCALE.to_string(),
            },
            frequency_profile: FrequencyProfile {
                band_power_mean: BandValues::from_array(m.band_mean.map(|v| round_to(v, 3))),
                band_power_std: BandValues::from_array(m.band_std.map(|v| round_to(v, 3))),
                dominant_band: m.dominant_band,
                dominance_ratio: round_to(m.dominance_ratio, 2),
                dominant_band_percentage: round_to(m.dominant_band_fraction, 3),
                band_switch_count: m.band_switch_count,
            },
            intensity_profile: IntensityProfile {
                tremor_score: ScoreStats {
                    mean: round_to(score.mean, 2),
                    std: round_to(score.std, 2),
                    min: round_to(score.min, 2),
                    max: round_to(score.max, 2),
                    p25: round_to(score.p25, 2),
                    p50: round_to(score.p50, 2),
                    p75: round_to(score.p75, 2),
                    p90: round_to(score.p90, 2),
                },
                rms_mean: round_to(m.rms_mean, 3),
                noise_floor_adjusted_intensity: round_to(m.noise_floor_adjusted_intensity, 3),
            },
            intensity_distribution: IntensityDistribution {
                low_fraction: round_to(m.distribution[IntensityBucket::Low as usize], 3),
                moderate_fraction: round_to(m.distribution[IntensityBucket::Moderate as usize], 3),
                high_fraction: round_to(m.distribution[IntensityBucket::High as usize], 3),
                very_high_fraction: round_to(m.distribution[IntensityBucket::VeryHigh as usize], 3),
            },
            variability_profile: VariabilityProfile {
                coefficient_of_variation: round_to(m.coefficient_of_variation, 3),
                stability_index: round_to(m.stability_index, 3),
                spectral_entropy: round_to(m.spectral_entropy, 4),
                window_to_window_variance: round_to(m.window_to_window_variance, 3),
            },
            within_session_trend: WithinSessionTrend {
                linear_slope_per_minute_score_units: round_to(m.slope_per_minute, 4),
                early_vs_late_change_percent: round_to(m.early_vs_late_change_percent, 1),
                fatigue_pattern_detected: m.fatigue_pattern_detected,
            },
            multi_session_trend: MultiSessionTrend {
                dominant_band_consistency_last_3: format!(
                    "{} in {}/{} sessions",
                    m.dominant_band.label(),
                    multi.consistency_count,
                    multi.sessions_compared
                ),
                tremor_score_weekly_slope: multi
                    .weekly_slope
                    .map(|slope| signed(slope, 2))
                    .unwrap_or_else(|| NEUTRAL_WEEKLY_SLOPE.to_string()),
                severity_change_percent: multi
                    .severity_change_percent
                    .map(|pct| format!("{}%", signed(pct, 1)))
                    .unwrap_or_else(|| FIRST_SESSION_MARKER.to_string()),
                band_shift_detected: multi.band_shift_detected,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;
    const DAY: i64 = 86_400_000;

    fn window(b1: f64, b2: f64, b3: f64, score: f64, timestamp: i64) -> WindowSample {
        WindowSample::new(b1, b2, b3, score, timestamp)
    }

    fn reference_session() -> Vec<WindowSample> {
        vec![
            window(1.0, 0.0, 0.0, 1.0, 0),
            window(1.0, 0.0, 0.0, 9.0, 0),
            window(0.0, 1.0, 0.0, 5.0, 0),
        ]
    }

    fn entry(band: Band, mean_score: f64, timestamp: i64) -> SessionHistoryEntry {
        SessionHistoryEntry::new(band, mean_score, timestamp)
    }

    #[test]
    fn test_reference_session() {
        let summary = SessionSummaryBuilder::new()
            .build(&reference_session(), &[], None)
            .unwrap();

        let freq = &summary.frequency_profile;
        assert_eq!(freq.dominant_band, Band::Hz4To6);
        assert_eq!(freq.band_power_mean.hz_4_6, 0.667);
        assert_eq!(freq.band_power_mean.hz_6_8, 0.333);
        assert_eq!(freq.band_power_mean.hz_8_12, 0.0);
        assert_eq!(freq.band_switch_count, 1);
        // zero minimum mean is replaced by 0.001
        assert_eq!(freq.dominance_ratio, 666.67);
        assert_eq!(freq.dominant_band_percentage, 0.667);

        let score = &summary.intensity_profile.tremor_score;
        assert_eq!(score.mean, 5.0);
        assert_eq!(score.std, 3.27);
        assert_eq!(score.min, 1.0);
        assert_eq!(score.max, 9.0);
        assert_eq!(score.p50, 5.0);
        assert_eq!(score.p25, 3.0);
        assert_eq!(score.p90, 8.2);
    }

    #[test]
    fn test_insufficient_data_below_three_windows() {
        let builder = SessionSummaryBuilder::new();
        let all = reference_session();
        for n in 0..3 {
            let result = builder.build(&all[..n], &[], None);
            assert!(
                matches!(result, Err(SessionError::InsufficientData { count, required: 3 }) if count == n)
            );
        }
        assert!(builder.build(&all, &[], None).is_ok());
    }

    #[test]
    fn test_malformed_sample_is_invalid_input() {
        let mut samples = reference_session();
        samples[1].b3 = -0.5;
        let result = SessionSummaryBuilder::new().build(&samples, &[], None);
        assert!(matches!(result, Err(SessionError::InvalidInput(_))));
    }

    #[test]
    fn test_unordered_windows_are_invalid_input() {
        let samples = vec![
            window(0.2, 0.1, 0.1, 1.0, 2 * MINUTE),
            window(0.2, 0.1, 0.1, 2.0, MINUTE),
            window(0.2, 0.1, 0.1, 3.0, 0),
        ];
        let result = SessionSummaryBuilder::new().compute(&samples, &[], None);
        assert!(matches!(result, Err(SessionError::InvalidInput(ref m)) if m.contains("time order")));
    }

    #[test]
    fn test_equal_band_means_pick_first_band() {
        let samples = vec![
            window(0.3, 0.3, 0.3, 2.0, 0),
            window(0.3, 0.3, 0.3, 2.0, MINUTE),
            window(0.3, 0.3, 0.3, 2.0, 2 * MINUTE),
        ];
        let summary = SessionSummaryBuilder::new().build(&samples, &[], None).unwrap();
        assert_eq!(summary.frequency_profile.dominant_band, Band::Hz4To6);
        assert_eq!(summary.frequency_profile.band_switch_count, 0);
        assert_eq!(summary.frequency_profile.dominance_ratio, 1.0);
        assert_eq!(summary.variability_profile.spectral_entropy, 1.0);
    }

    #[test]
    fn test_no_switches_when_dominant_band_is_constant() {
        let samples: Vec<WindowSample> = (0..6)
            .map(|i| window(0.1, 0.4 + i as f64 * 0.1, 0.2, 3.0, i * MINUTE))
            .collect();
        let summary = SessionSummaryBuilder::new().build(&samples, &[], None).unwrap();
        assert_eq!(summary.frequency_profile.dominant_band, Band::Hz6To8);
        assert_eq!(summary.frequency_profile.band_switch_count, 0);
    }

    #[test]
    fn test_distribution_sums_to_one() {
        let scores = [0.0, 2.49, 2.5, 4.99, 5.0, 7.49, 7.5, 10.0, 3.3];
        let samples: Vec<WindowSample> = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| window(0.2, 0.1, 0.1, s, i as i64 * 1000))
            .collect();
        let metrics = SessionSummaryBuilder::new().compute(&samples, &[], None).unwrap();
        let total: f64 = metrics.distribution.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);

        let dist = SessionSummaryBuilder::new()
            .build(&samples, &[], None)
            .unwrap()
            .intensity_distribution;
        assert_eq!(dist.low_fraction, 0.222);
        assert_eq!(dist.moderate_fraction, 0.333);
        assert_eq!(dist.high_fraction, 0.222);
        assert_eq!(dist.very_high_fraction, 0.222);
    }

    #[test]
    fn test_noise_floor_calibrated_and_fallback() {
        let samples: Vec<WindowSample> = (0..3)
            .map(|i| window(0.2, 0.1, 0.1, 2.0, i * 1000).with_mean_norm(0.5))
            .collect();
        let builder = SessionSummaryBuilder::new();

        let fallback = builder.build(&samples, &[], None).unwrap();
        assert_eq!(fallback.intensity_profile.rms_mean, 0.5);
        assert_eq!(fallback.intensity_profile.noise_floor_adjusted_intensity, 0.465);

        let calibrated = builder.build(&samples, &[], Some(0.2)).unwrap();
        assert_eq!(calibrated.intensity_profile.noise_floor_adjusted_intensity, 0.3);

        let above_signal = builder.build(&samples, &[], Some(0.9)).unwrap();
        assert_eq!(above_signal.intensity_profile.noise_floor_adjusted_intensity, 0.0);
    }

    #[test]
    fn test_variability_with_zero_mean_score() {
        let samples: Vec<WindowSample> = (0..4)
            .map(|i| window(0.0, 0.0, 0.0, 0.0, i * 1000))
            .collect();
        let summary = SessionSummaryBuilder::new().build(&samples, &[], None).unwrap();
        let var = &summary.variability_profile;
        assert_eq!(var.coefficient_of_variation, 0.0);
        assert_eq!(var.stability_index, 1.0);
        assert_eq!(var.spectral_entropy, 0.0);
        assert_eq!(summary.within_session_trend.early_vs_late_change_percent, 0.0);
        assert_eq!(summary.frequency_profile.dominant_band_percentage, 0.0);
    }

    #[test]
    fn test_stability_index_never_negative() {
        let samples = vec![
            window(0.2, 0.1, 0.1, 0.1, 0),
            window(0.2, 0.1, 0.1, 0.1, 1000),
            window(0.2, 0.1, 0.1, 9.0, 2000),
        ];
        let summary = SessionSummaryBuilder::new().build(&samples, &[], None).unwrap();
        assert!(summary.variability_profile.coefficient_of_variation > 1.0);
        assert_eq!(summary.variability_profile.stability_index, 0.0);
    }

    #[test]
    fn test_within_session_trend_and_fatigue() {
        // five windows one minute apart, score rising by one per window
        let samples: Vec<WindowSample> = (0..5)
            .map(|i| window(0.2, 0.1, 0.1, 2.0 + i as f64, i * MINUTE))
            .collect();
        let metrics = SessionSummaryBuilder::new().compute(&samples, &[], None).unwrap();
        assert!((metrics.duration_minutes - 4.0).abs() < 1e-12);
        // slope 1 per window, rescaled by n / duration = 5 / 4
        assert!((metrics.slope_per_minute - 1.25).abs() < 1e-12);
        // early = [2, 3] -> 2.5, late = [4, 5, 6] -> 5.0
        assert!((metrics.early_vs_late_change_percent - 100.0).abs() < 1e-9);
        assert!(metrics.fatigue_pattern_detected);

        let summary = Summary::from_metrics(&metrics, SAMPLING_RATE_HZ);
        assert_eq!(summary.metadata.duration_minutes, 4.0);
        assert_eq!(summary.within_session_trend.linear_slope_per_minute_score_units, 1.25);
        assert_eq!(summary.variability_profile.window_to_window_variance, 1.0);
    }

    #[test]
    fn test_zero_duration_gives_zero_slope() {
        let samples = vec![
            window(0.2, 0.1, 0.1, 1.0, 5000),
            window(0.2, 0.1, 0.1, 2.0, 5000),
            window(0.2, 0.1, 0.1, 3.0, 5000),
        ];
        let summary = SessionSummaryBuilder::new().build(&samples, &[], None).unwrap();
        assert_eq!(summary.within_session_trend.linear_slope_per_minute_score_units, 0.0);
        assert_eq!(summary.metadata.duration_minutes, 0.0);
    }

    #[test]
    fn test_small_increase_is_not_fatigue() {
        let samples = vec![
            window(0.2, 0.1, 0.1, 4.0, 0),
            window(0.2, 0.1, 0.1, 4.1, MINUTE),
            window(0.2, 0.1, 0.1, 4.1, 2 * MINUTE),
        ];
        let summary = SessionSummaryBuilder::new().build(&samples, &[], None).unwrap();
        assert_eq!(summary.within_session_trend.early_vs_late_change_percent, 2.5);
        assert!(!summary.within_session_trend.fatigue_pattern_detected);
    }

    #[test]
    fn test_first_session_markers() {
        let summary = SessionSummaryBuilder::new()
            .build(&reference_session(), &[], None)
            .unwrap();
        let trend = &summary.multi_session_trend;
        assert_eq!(trend.severity_change_percent, FIRST_SESSION_MARKER);
        assert_eq!(trend.tremor_score_weekly_slope, "+0.0");
        assert_eq!(trend.dominant_band_consistency_last_3, "4–6 Hz in 1/1 sessions");
        assert!(!trend.band_shift_detected);
    }

    #[test]
    fn test_multi_session_comparison_uses_last_two_entries() {
        let end = 30 * DAY;
        let samples = vec![
            window(0.1, 0.5, 0.1, 5.0, end - 2 * MINUTE),
            window(0.1, 0.5, 0.1, 5.0, end - MINUTE),
            window(0.1, 0.5, 0.1, 5.0, end),
        ];
        let history = vec![
            entry(Band::Hz8To12, 9.0, end - 21 * DAY),
            entry(Band::Hz6To8, 4.0, end - 14 * DAY),
            entry(Band::Hz4To6, 4.5, end - 7 * DAY),
        ];
        let summary = SessionSummaryBuilder::new().build(&samples, &history, None).unwrap();
        let trend = &summary.multi_session_trend;

        assert_eq!(trend.dominant_band_consistency_last_3, "6–8 Hz in 2/3 sessions");
        // (5.0 - 4.0) / 4.0
        assert_eq!(trend.severity_change_percent, "+25.0%");
        // points (-14d, 4.0), (-7d, 4.5), (0, 5.0): 0.5 per week
        assert_eq!(trend.tremor_score_weekly_slope, "+0.50");
        assert!(trend.band_shift_detected);
    }

    #[test]
    fn test_severity_decrease_and_zero_baseline() {
        let samples = vec![
            window(0.5, 0.1, 0.1, 2.0, DAY),
            window(0.5, 0.1, 0.1, 2.0, DAY + 1000),
            window(0.5, 0.1, 0.1, 2.0, DAY + 2000),
        ];
        let builder = SessionSummaryBuilder::new();

        let lower = builder
            .build(&samples, &[entry(Band::Hz4To6, 4.0, 0)], None)
            .unwrap();
        assert_eq!(lower.multi_session_trend.severity_change_percent, "-50.0%");
        assert!(lower.multi_session_trend.tremor_score_weekly_slope.starts_with('-'));
        assert!(!lower.multi_session_trend.band_shift_detected);

        let zero = builder
            .build(&samples, &[entry(Band::Hz4To6, 0.0, 0)], None)
            .unwrap();
        assert_eq!(zero.multi_session_trend.severity_change_percent, "+0.0%");
    }

    #[test]
    fn test_metadata_derives_from_last_window() {
        let end = 1_700_000_012_345;
        let samples = vec![
            window(0.2, 0.1, 0.1, 1.0, end - 90_000),
            window(0.2, 0.1, 0.1, 1.0, end - 45_000),
            window(0.2, 0.1, 0.1, 1.0, end),
        ];
        let meta = SessionSummaryBuilder::new()
            .with_sampling_rate(100)
            .build(&samples, &[], None)
            .unwrap()
            .metadata;
        assert_eq!(meta.session_id, "S2345");
        assert_eq!(meta.timestamp, "2023-11-14T22:13:32.345Z");
        assert_eq!(meta.duration_minutes, 1.5);
        assert_eq!(meta.sampling_rate_hz, 100);
        assert_eq!(meta.condition, "rest");
        assert_eq!(meta.medication_status, "unknown");
        assert_eq!(meta.tremor_score_scale, "0_to_10_log_scaled");
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let samples: Vec<WindowSample> = (0..12)
            .map(|i| {
                let x = i as f64;
                window(0.1 + (x * 0.7).sin().abs(), 0.3, 0.05 * x, (x * 1.3) % 10.0, i * 2560)
                    .with_mean_norm(0.01 * x)
            })
            .collect();
        let history = vec![entry(Band::Hz6To8, 3.2, -DAY)];
        let builder = SessionSummaryBuilder::new();

        let first = builder.build_json(&samples, &history, Some(0.01)).unwrap();
        let second = builder.build_json(&samples, &history, Some(0.01)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_summary_json_contract_keys() {
        let summary = SessionSummaryBuilder::new()
            .build(&reference_session(), &[], None)
            .unwrap();
        let value = serde_json::to_value(&summary).unwrap();

        assert_eq!(value["frequency_profile"]["dominant_band"], "hz_4_6");
        assert!(value["frequency_profile"]["band_power_std"]["hz_8_12"].is_number());
        assert!(value["intensity_profile"]["tremor_score"]["p75"].is_number());
        assert!(value["intensity_distribution"]["very_high_fraction"].is_number());
        assert!(value["variability_profile"]["window_to_window_variance"].is_number());
        assert!(value["within_session_trend"]["fatigue_pattern_detected"].is_boolean());
        assert!(value["multi_session_trend"]["dominant_band_consistency_last_3"].is_string());
        assert_eq!(value["metadata"]["sampling_rate_hz"], 50);
    }

    #[test]
    fn test_round_to_drops_negative_zero() {
        assert_eq!(round_to(-0.0001, 2).to_string(), "0");
        assert_eq!(round_to(2.345_6, 3), 2.346);
        assert_eq!(signed(-0.0, 2), "+0.00");
        assert_eq!(signed(-1.234, 1), "-1.2");
    }
}
