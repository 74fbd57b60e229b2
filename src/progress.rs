use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderProgress {
    /// Completed share of the render in `[0, 1]`.
    pub fraction: f64,
}

struct SinkState {
    tx: Option<mpsc::UnboundedSender<RenderProgress>>,
    last: f64,
}

/// Single-consumer progress channel for one render attempt.
///
/// Samples are clamped to `[0, 1]` and dropped when they would move
/// backwards. Nothing is delivered once the attempt's token is cancelled or
/// the sink has been closed. There is no guaranteed final sample at `1.0`.
#[derive(Clone)]
pub struct ProgressSink {
    state: Arc<Mutex<SinkState>>,
    cancel: CancellationToken,
}

impl ProgressSink {
    pub fn channel(
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<RenderProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sender(Some(tx), cancel), rx)
    }

    /// A sink nobody listens to.
    pub fn silent() -> Self {
        Self::with_sender(None, CancellationToken::new())
    }

    fn with_sender(
        tx: Option<mpsc::UnboundedSender<RenderProgress>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState { tx, last: 0.0 })),
            cancel,
        }
    }

    pub fn report(&self, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if self.cancel.is_cancelled() {
            state.tx = None;
            return;
        }
        if fraction <= state.last && state.last > 0.0 {
            return;
        }
        state.last = fraction;
        let delivered = state
            .tx
            .as_ref()
            .map(|tx| tx.send(RenderProgress { fraction }).is_ok())
            .unwrap_or(false);
        if !delivered {
            state.tx = None;
        }
    }

    /// Stops delivery; the receiver sees the channel end.
    pub fn close(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).tx = None;
    }

    pub fn last(&self) -> f64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).last
    }
}
