//! Background reader that turns a byte source into stream events.

use crate::stream::frame::{FrameDecoder, StreamError, StreamEvent};
use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Channel capacity between the reader thread and the consumer.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Item delivered to the consumer. Malformed frames arrive as errors so the
/// consumer can count them; an I/O error is the last item sent.
pub type StreamItem = Result<StreamEvent, StreamError>;

/// Reads an event stream on a background thread.
pub struct StreamReader {
    receiver: Receiver<StreamItem>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl StreamReader {
    /// Start reading `source` on a background thread.
    pub fn spawn<R>(source: R, capacity: usize) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (sender, receiver) = bounded(capacity);
        let running = Arc::new(AtomicBool::new(true));

        let flag = running.clone();
        let handle = thread::spawn(move || {
            let lines = read_loop(source, &sender, &flag);
            tracing::debug!(lines, "stream reader finished");
            flag.store(false, Ordering::SeqCst);
        });

        Self {
            receiver,
            running,
            thread_handle: Some(handle),
        }
    }

    /// Open a file path, or standard input for `-`.
    pub fn open(input: &str) -> Result<Self, StreamError> {
        if input == "-" {
            let stdin = std::io::BufReader::new(std::io::stdin());
            return Ok(Self::spawn(stdin, DEFAULT_CAPACITY));
        }
        let file = std::fs::File::open(Path::new(input))?;
        Ok(Self::spawn(std::io::BufReader::new(file), DEFAULT_CAPACITY))
    }

    /// Ask the reader to stop after the line it is reading.
    ///
    /// A reader blocked on standard input only notices once the next line
    /// arrives, so this does not join the thread.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for stream items.
    pub fn receiver(&self) -> &Receiver<StreamItem> {
        &self.receiver
    }

    /// Try to receive an item without blocking.
    pub fn try_recv(&self) -> Option<StreamItem> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.thread_handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

fn read_loop<R: BufRead>(mut source: R, sender: &Sender<StreamItem>, running: &AtomicBool) -> usize {
    let mut decoder = FrameDecoder::new();
    let mut line = String::new();
    let mut count = 0;

    while running.load(Ordering::SeqCst) {
        line.clear();
        match source.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                count += 1;
                let text = line.trim_end_matches('\n');
                let now = Utc::now().timestamp_millis();
                match decoder.push_line(text, now) {
                    Ok(None) => {}
                    Ok(Some(event)) => {
                        if sender.send(Ok(event)).is_err() {
                            return count;
                        }
                    }
                    Err(e) => {
                        if sender.send(Err(e)).is_err() {
                            return count;
                        }
                    }
                }
            }
            Err(e) => {
                let _ = sender.send(Err(StreamError::Io(e)));
                return count;
            }
        }
    }

    match decoder.finish(Utc::now().timestamp_millis()) {
        Ok(Some(event)) => {
            let _ = sender.send(Ok(event));
        }
        Ok(None) => {}
        Err(e) => {
            let _ = sender.send(Err(e));
        }
    }
    count
}
