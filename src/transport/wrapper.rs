//! Message wrapper and incremental delta tracking.
//!
//! A [`MessageWrapper`] represents one question's lifecycle: a bounded
//! frame channel fed by the worker, the latest decoded [`Answer`]
//! snapshot, and a terminal flag. The wrapper is produced by every ask;
//! the worker is the only producer, external listeners drain the channel.
//!
//! [`DeltaTracker`] computes the newly-added text suffix between
//! successive cumulative update snapshots for live output.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::protocol::{Answer, Usage};

use super::worker::Worker;

// ============================================================================
// MessageWrapper
// ============================================================================

/// One question's lifecycle: frames, answer snapshot, terminal flag.
///
/// # Consumption
///
/// Frames are published in read order on a single-slot channel; the
/// worker blocks until each frame is drained, so none is dropped. Once
/// the terminal flag is set the channel is closed and no further frames
/// appear. A channel that closes *without* the terminal flag means the
/// exchange ended abnormally (no final frame was observed).
///
/// # Example
///
/// ```ignore
/// let mut wrapper = session.ask_async(style, "hello").await?;
/// tokio::spawn(wrapper.take_worker().expect("fresh wrapper").run());
///
/// let mut deltas = DeltaTracker::new();
/// while let Some(_frame) = wrapper.next_frame().await {
///     print!("{}", deltas.advance(wrapper.answer().text()));
/// }
/// ```
pub struct MessageWrapper {
    /// The question this wrapper belongs to.
    question: String,

    /// Frame channel, capacity 1 (blocking backpressure).
    frames: mpsc::Receiver<Vec<u8>>,

    /// Latest decoded answer snapshot (shared with the worker).
    answer: Arc<Mutex<Answer>>,

    /// Set when the final frame has been decoded.
    terminal: Arc<AtomicBool>,

    /// The exchange's read-loop worker, until taken.
    worker: Option<Worker>,
}

impl MessageWrapper {
    /// Creates a wrapper wired to a worker's shared state.
    pub(crate) fn new(
        question: String,
        frames: mpsc::Receiver<Vec<u8>>,
        answer: Arc<Mutex<Answer>>,
        terminal: Arc<AtomicBool>,
        worker: Worker,
    ) -> Self {
        Self {
            question,
            frames,
            answer,
            terminal,
            worker: Some(worker),
        }
    }

    /// Returns the question text.
    #[inline]
    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    /// Returns a clone of the latest answer snapshot.
    #[inline]
    #[must_use]
    pub fn answer(&self) -> Answer {
        self.answer.lock().clone()
    }

    /// Returns the usage counters of the latest snapshot.
    #[inline]
    #[must_use]
    pub fn usage(&self) -> Usage {
        self.answer.lock().usage()
    }

    /// Returns `true` once the final frame has been observed.
    #[inline]
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.terminal.load(Ordering::SeqCst)
    }

    /// Takes the worker for this exchange.
    ///
    /// Returns `None` if it was already taken. Async callers spawn the
    /// worker themselves; [`crate::Session::ask_sync`] takes and drives
    /// it internally.
    #[inline]
    pub fn take_worker(&mut self) -> Option<Worker> {
        self.worker.take()
    }

    /// Receives the next raw frame, or `None` once the channel closes.
    ///
    /// The final frame, when the exchange completes normally, is always
    /// the last one received before `None`.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.frames.recv().await
    }
}

impl fmt::Debug for MessageWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageWrapper")
            .field("question", &self.question)
            .field("final", &self.is_final())
            .field("worker_taken", &self.worker.is_none())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DeltaTracker
// ============================================================================

/// Computes the new suffix between successive cumulative answers.
///
/// Update frames carry the whole answer so far, not a delta. The tracker
/// records the length of the previously observed text; each call emits
/// only what was appended since. Empty, duplicate, or shorter snapshots
/// yield an empty delta, guarding against out-of-order frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaTracker {
    /// Byte length of the previously observed answer text.
    seen: usize,
}

impl DeltaTracker {
    /// Creates a tracker that has observed nothing.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { seen: 0 }
    }

    /// Returns the text appended since the last observed snapshot.
    ///
    /// The first non-empty snapshot is returned whole. Snapshots that are
    /// empty or not longer than the last one yield `""`.
    pub fn advance<'a>(&mut self, cumulative: &'a str) -> &'a str {
        let len = cumulative.len();
        if len == 0 || len <= self.seen {
            return "";
        }

        // Updates extend the previous text, so `seen` lands on a char
        // boundary; a snapshot that rewrote earlier text may not.
        let delta = cumulative.get(self.seen..).unwrap_or("");
        self.seen = len;
        delta
    }

    /// Resets the tracker for a new exchange.
    #[inline]
    pub fn reset(&mut self) {
        self.seen = 0;
    }
}

// ============================================================================
// Tests
// ============================================================================
