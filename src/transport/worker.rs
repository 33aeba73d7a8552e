//! Per-exchange read loop and frame state machine.
//!
//! One worker runs per in-flight exchange. It owns the physical stream
//! connection exclusively for the exchange's duration, decodes each
//! delimiter-terminated frame, republishes the raw bytes on the
//! wrapper's bounded channel, and updates the shared answer snapshot.
//!
//! # State machine
//!
//! ```text
//! AwaitingFrame ──read──► Decoding ──type 1──► Updated ──┐
//!       ▲                    │     ──other──► Undefined ─┤
//!       └────────────────────┼───────────────────────────┘
//!                            └──type 2──► Final (terminal, loop exits)
//! ```
//!
//! The final frame is the only normal exit; read or decode errors abort
//! the exchange, surface from [`Worker::run`], and leave the frame
//! channel open-then-dropped without the terminal flag.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::OwnedMutexGuard;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Answer, decode_answer, truncate_frame};

// ============================================================================
// Types
// ============================================================================

/// The physical stream connection.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection slot shared with the owning channel.
///
/// The worker returns the stream here after a normal exchange so the
/// next ask can reuse it; on error the slot stays empty and the next
/// ask redials.
pub(crate) type ConnSlot = Arc<tokio::sync::Mutex<Option<WsStream>>>;

// ============================================================================
// FramePump
// ============================================================================

/// Outcome of processing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    /// Non-terminal frame; keep reading.
    Continue,
    /// Final frame observed; the exchange is complete.
    Final,
}

/// Decodes frames and feeds the wrapper's shared state.
///
/// Split from [`Worker`] so the state machine is exercisable without a
/// live connection.
pub(crate) struct FramePump {
    /// Frame channel sender, capacity 1.
    frames_tx: mpsc::Sender<Vec<u8>>,

    /// Latest decoded answer snapshot (shared with the wrapper).
    answer: Arc<Mutex<Answer>>,

    /// Set when the final frame has been decoded.
    terminal: Arc<AtomicBool>,
}

impl FramePump {
    pub(crate) fn new(
        frames_tx: mpsc::Sender<Vec<u8>>,
        answer: Arc<Mutex<Answer>>,
        terminal: Arc<AtomicBool>,
    ) -> Self {
        Self {
            frames_tx,
            answer,
            terminal,
        }
    }

    /// Processes one physical message.
    ///
    /// Truncates at the first delimiter, decodes the prefix, replaces the
    /// answer snapshot, and publishes the raw frame. Publishing blocks
    /// until the consumer drains the previous frame (backpressure); a
    /// consumer that dropped its receiver is tolerated so the exchange
    /// still reaches its terminal frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the frame does not decode.
    pub(crate) async fn process(&self, raw: &[u8]) -> Result<FrameOutcome> {
        let frame = truncate_frame(raw);
        if frame.is_empty() {
            trace!("Skipping empty frame");
            return Ok(FrameOutcome::Continue);
        }

        let answer = decode_answer(frame)?;
        let is_final = answer.is_final();

        *self.answer.lock() = answer;
        if is_final {
            // Terminal goes first so consumers see it on the final frame.
            self.terminal.store(true, Ordering::SeqCst);
        }

        if self.frames_tx.send(frame.to_vec()).await.is_err() {
            debug!("Frame consumer gone, continuing to terminal");
        }

        if is_final {
            debug!("Final frame observed, exchange complete");
            Ok(FrameOutcome::Final)
        } else {
            trace!(bytes = frame.len(), "Frame published");
            Ok(FrameOutcome::Continue)
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Background read loop for one exchange.
///
/// Holds the exchange lock's owned guard; every exit path (final frame,
/// read error, decode error) releases it, so a blocked second ask always
/// unblocks.
pub struct Worker {
    /// The physical connection, owned for this exchange.
    stream: WsStream,

    /// Frame state machine and shared wrapper state.
    pump: FramePump,

    /// Slot to return the connection to after a normal exchange.
    conn_slot: ConnSlot,

    /// Exchange lock guard, released when the worker exits.
    exchange_guard: OwnedMutexGuard<()>,
}

impl Worker {
    pub(crate) fn new(
        stream: WsStream,
        pump: FramePump,
        conn_slot: ConnSlot,
        exchange_guard: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            stream,
            pump,
            conn_slot,
            exchange_guard,
        }
    }

    /// Runs the read loop until the final frame or an error.
    ///
    /// On the normal exit the connection is returned for reuse and the
    /// frame channel closes after the final frame. On error the
    /// connection is discarded and the channel closes without the
    /// terminal flag — consumers treat that as abnormal termination.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the stream ends mid-exchange
    /// - [`Error::WebSocket`] on read failure
    /// - [`Error::Json`] on frame decode failure
    pub async fn run(self) -> Result<()> {
        let Self {
            mut stream,
            pump,
            conn_slot,
            exchange_guard,
        } = self;

        loop {
            let raw = match stream.next().await {
                Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
                Some(Ok(Message::Binary(bin))) => bin.to_vec(),
                Some(Ok(Message::Close(_))) => {
                    warn!("Stream closed by provider mid-exchange");
                    return Err(Error::ConnectionClosed);
                }
                Some(Ok(_)) => continue, // ping/pong
                Some(Err(e)) => {
                    warn!(error = %e, "Stream read failed");
                    return Err(e.into());
                }
                None => {
                    warn!("Stream ended mid-exchange");
                    return Err(Error::ConnectionClosed);
                }
            };

            match pump.process(&raw).await? {
                FrameOutcome::Continue => {}
                FrameOutcome::Final => {
                    *conn_slot.lock().await = Some(stream);
                    drop(exchange_guard);
                    return Ok(());
                }
            }
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready};

    fn pump() -> (FramePump, mpsc::Receiver<Vec<u8>>, Arc<Mutex<Answer>>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::channel(1);
        let answer = Arc::new(Mutex::new(Answer::default()));
        let terminal = Arc::new(AtomicBool::new(false));
        let p = FramePump::new(tx, Arc::clone(&answer), Arc::clone(&terminal));
        (p, rx, answer, terminal)
    }

    const UPDATE: &[u8] = br#"{"type":1,"arguments":[{"messages":[{"text":"Hel","author":"bot"}]}]}"#;
    const FINAL: &[u8] = br#"{"type":2,"item":{"messages":[{"text":"Hello","author":"bot"}],"result":{"value":"Success"}}}"#;

    #[tokio::test]
    async fn test_update_then_final_in_order() {
        let (pump, mut rx, answer, terminal) = pump();

        let mut update = UPDATE.to_vec();
        update.push(0x1e);
        let mut final_ = FINAL.to_vec();
        final_.push(0x1e);

        assert_eq!(pump.process(&update).await.unwrap(), FrameOutcome::Continue);
        let first = rx.recv().await.expect("first frame");
        assert_eq!(first, UPDATE);
        assert!(!terminal.load(Ordering::SeqCst));
        assert_eq!(answer.lock().text(), "Hel");

        assert_eq!(pump.process(&final_).await.unwrap(), FrameOutcome::Final);
        let second = rx.recv().await.expect("second frame");
        assert_eq!(second, FINAL);
        assert!(terminal.load(Ordering::SeqCst));
        assert_eq!(answer.lock().text(), "Hello");

        // Dropping the pump (as the worker does on exit) closes the channel.
        drop(pump);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_terminal_set_before_final_frame_delivery() {
        let (pump, mut rx, _answer, terminal) = pump();

        pump.process(FINAL).await.unwrap();
        // The flag is observable at the moment the final frame arrives.
        assert!(terminal.load(Ordering::SeqCst));
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_undefined_frame_forwarded_non_terminal() {
        let (pump, mut rx, answer, terminal) = pump();

        let raw = br#"{"type":6}"#;
        assert_eq!(pump.process(raw).await.unwrap(), FrameOutcome::Continue);
        assert_eq!(rx.recv().await.expect("frame"), raw.to_vec());
        assert!(!terminal.load(Ordering::SeqCst));
        assert!(matches!(answer.lock().clone(), Answer::Undefined(_)));
    }

    #[tokio::test]
    async fn test_decode_error_surfaces() {
        let (pump, _rx, _answer, terminal) = pump();

        let result = pump.process(b"not json\x1e").await;
        assert!(matches!(result, Err(Error::Json(_))));
        assert!(!terminal.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_truncates_at_first_delimiter() {
        let (pump, mut rx, _answer, terminal) = pump();

        // Two objects in one physical message; only the prefix counts.
        let mut raw = UPDATE.to_vec();
        raw.push(0x1e);
        raw.extend_from_slice(FINAL);
        raw.push(0x1e);

        assert_eq!(pump.process(&raw).await.unwrap(), FrameOutcome::Continue);
        assert_eq!(rx.recv().await.expect("frame"), UPDATE);
        assert!(!terminal.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_frame_skipped() {
        let (pump, mut rx, _answer, _terminal) = pump();

        assert_eq!(pump.process(b"\x1e").await.unwrap(), FrameOutcome::Continue);

        // Nothing was published.
        drop(pump);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_backpressure_blocks_until_drained() {
        let (pump, mut rx, _answer, _terminal) = pump();

        pump.process(UPDATE).await.unwrap();

        // The slot is full; a second publish must wait for the consumer.
        let mut second = task::spawn(pump.process(UPDATE));
        assert_pending!(second.poll());

        rx.recv().await.expect("drain first frame");
        assert_ready!(second.poll()).unwrap();
        drop(second);
        drop(pump);

        rx.recv().await.expect("second frame");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_consumer_tolerated() {
        let (pump, rx, _answer, terminal) = pump();
        drop(rx);

        assert_eq!(pump.process(UPDATE).await.unwrap(), FrameOutcome::Continue);
        assert_eq!(pump.process(FINAL).await.unwrap(), FrameOutcome::Final);
        assert!(terminal.load(Ordering::SeqCst));
    }
}
