//! Decoding of the sensor event stream.
//!
//! The sensor publishes server-sent-event frames:
//!
//! ```text
//! event: bands
//! data: {"b1":0.41,"b2":0.12,"b3":0.05,"type":"Parkinsonian","confidence":0.7,"score":4.2,"meanNorm":0.3}
//!
//! event: calibrated
//! data: {"baseline":0.012,"noiseFloor":0.0216,"baseForScore":0.0168}
//! ```
//!
//! Recorded sessions may also be plain JSON lines, one object per line, or a
//! single JSON array of window samples.

use crate::core::WindowSample;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of a sensor calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calibration {
    /// Mean resting amplitude measured during calibration
    pub baseline: f64,
    #[serde(default)]
    pub noise_floor: f64,
    #[serde(default)]
    pub base_for_score: f64,
}

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Bands(WindowSample),
    Calibrated(Calibration),
}

/// Stream decoding and reading errors.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame at line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("stream reader is already running")]
    AlreadyRunning,
}

/// Incremental line decoder for SSE frames and bare JSON lines.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    event: Option<String>,
    data: Vec<String>,
    line_no: usize,
    frame_start: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator).
    ///
    /// `now_ms` stamps window samples that carry no timestamp of their own.
    pub fn push_line(&mut self, line: &str, now_ms: i64) -> Result<Option<StreamEvent>, StreamError> {
        self.line_no += 1;
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.trim().is_empty() {
            return self.dispatch(now_ms);
        }
        if line.starts_with(':') {
            return Ok(None);
        }
        if self.event.is_none() && self.data.is_empty() && line.trim_start().starts_with('{') {
            self.frame_start = self.line_no;
            return self.decode_bare(line, now_ms).map(Some);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if self.event.is_none() && self.data.is_empty() {
            self.frame_start = self.line_no;
        }
        match field {
            "event" => self.event = Some(value.trim().to_string()),
            "data" => self.data.push(value.to_string()),
            "id" | "retry" => {}
            other => {
                return Err(StreamError::Malformed {
                    line: self.line_no,
                    message: format!("unexpected field '{other}'"),
                })
            }
        }
        Ok(None)
    }

    /// Flush a frame left open at end of input.
    pub fn finish(&mut self, now_ms: i64) -> Result<Option<StreamEvent>, StreamError> {
        self.dispatch(now_ms)
    }

    fn dispatch(&mut self, now_ms: i64) -> Result<Option<StreamEvent>, StreamError> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data).join("\n");
        if data.is_empty() {
            return Ok(None);
        }

        match event.as_deref() {
            None | Some("bands") | Some("message") => {
                let sample = self.parse::<WindowSample>(&data)?;
                Ok(Some(StreamEvent::Bands(stamp(sample, now_ms))))
            }
            Some("calibrated") => Ok(Some(StreamEvent::Calibrated(self.parse(&data)?))),
            Some(other) => {
                tracing::debug!(event = other, "ignoring unknown stream event");
                Ok(None)
            }
        }
    }

    fn decode_bare(&self, line: &str, now_ms: i64) -> Result<StreamEvent, StreamError> {
        let value: serde_json::Value = self.parse(line)?;
        if value.get("baseline").is_some() {
            Ok(StreamEvent::Calibrated(self.from_value(value)?))
        } else {
            Ok(StreamEvent::Bands(stamp(self.from_value(value)?, now_ms)))
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(&self, data: &str) -> Result<T, StreamError> {
        serde_json::from_str(data).map_err(|e| self.malformed(e))
    }

    fn from_value<T: serde::de::DeserializeOwned>(
        &self,
        value: serde_json::Value,
    ) -> Result<T, StreamError> {
        serde_json::from_value(value).map_err(|e| self.malformed(e))
    }

    fn malformed(&self, e: serde_json::Error) -> StreamError {
        StreamError::Malformed {
            line: self.frame_start,
            message: e.to_string(),
        }
    }
}

fn stamp(mut sample: WindowSample, now_ms: i64) -> WindowSample {
    if sample.timestamp == 0 {
        sample.timestamp = now_ms;
    }
    sample
}

/// Decode a whole recording held in memory.
///
/// Accepts a JSON array of window samples, or SSE / JSON-lines text. Every
/// sample without a timestamp is stamped with the same `now_ms`, so a file
/// with no timestamps yields a zero-duration session.
pub fn decode_recording(text: &str, now_ms: i64) -> Result<Vec<StreamEvent>, StreamError> {
    if text.trim_start().starts_with('[') {
        let samples: Vec<WindowSample> =
            serde_json::from_str(text).map_err(|e| StreamError::Malformed {
                line: 1,
                message: e.to_string(),
            })?;
        return Ok(samples
            .into_iter()
            .map(|s| StreamEvent::Bands(stamp(s, now_ms)))
            .collect());
    }

    let mut decoder = FrameDecoder::new();
    let mut events = Vec::new();
    for line in text.lines() {
        if let Some(event) = decoder.push_line(line, now_ms)? {
            events.push(event);
        }
    }
    if let Some(event) = decoder.finish(now_ms)? {
        events.push(event);
    }
    Ok(events)
}
