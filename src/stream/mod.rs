//! Sensor event stream input.
//!
//! The sensor emits `bands` frames, one per analysis window, and occasional
//! `calibrated` frames carrying the resting baseline. A [`StreamReader`]
//! decodes them on a background thread and hands them over a bounded channel
//! to the recording loop.

pub mod frame;
pub mod reader;

pub use frame::{decode_recording, Calibration, FrameDecoder, StreamError, StreamEvent};
pub use reader::{StreamItem, StreamReader, DEFAULT_CAPACITY};
