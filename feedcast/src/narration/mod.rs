//! Background narration.
//!
//! One worker task owns at most one speech process. Callers only enqueue
//! commands through a [`NarrationHandle`]; none of its methods wait for the
//! worker.

pub mod speaker;
mod worker;

pub use speaker::CommandSpeaker;

use crate::traits::Speaker;
use crate::types::Item;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use worker::NarrationWorker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationCommand {
    Speak(String),
    Stop,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationState {
    Idle,
    Speaking,
    /// The worker loop has ended; nothing will be spoken again.
    Exited,
}

/// Cheap to clone; every clone feeds the same worker.
#[derive(Clone)]
pub struct NarrationHandle {
    tx: mpsc::UnboundedSender<NarrationCommand>,
    state: watch::Receiver<NarrationState>,
    launches: watch::Receiver<u64>,
    closed: Arc<AtomicBool>,
}

impl NarrationHandle {
    /// Start the worker on the current tokio runtime. Text longer than
    /// `max_chars` is cut with an ellipsis before it reaches the speaker.
    pub fn spawn(speaker: Arc<dyn Speaker>, max_chars: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(NarrationState::Idle);
        let (launches_tx, launches_rx) = watch::channel(0u64);

        let worker = NarrationWorker::new(rx, speaker, max_chars, state_tx, launches_tx);
        let join = tokio::spawn(worker.run());

        let handle = Self {
            tx,
            state: state_rx,
            launches: launches_rx,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (handle, join)
    }

    /// Queue `text` for speaking, interrupting whatever is being spoken when
    /// the worker gets to it. Blank text is dropped here and never queued.
    /// Returns whether the request was queued.
    pub fn speak(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.send(NarrationCommand::Speak(text.to_string()))
    }

    /// Kill the current speech and discard everything still queued.
    pub fn stop(&self) -> bool {
        self.send(NarrationCommand::Stop)
    }

    /// Kill the current speech and end the worker. Later commands are refused.
    pub fn shutdown(&self) {
        if self.send(NarrationCommand::Shutdown) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    pub fn state(&self) -> NarrationState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NarrationState> {
        self.state.clone()
    }

    /// Number of speech processes started so far. Bumped after the state
    /// turns `Speaking`.
    pub fn launches(&self) -> u64 {
        *self.launches.borrow()
    }

    pub fn subscribe_launches(&self) -> watch::Receiver<u64> {
        self.launches.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    fn send(&self, command: NarrationCommand) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            debug!("Narration worker shut down, ignoring {:?}", command);
            return false;
        }
        match self.tx.send(command) {
            Ok(()) => true,
            Err(e) => {
                debug!("Narration worker gone, dropping {:?}", e.0);
                false
            }
        }
    }
}

/// Spoken form of an item: category, source code and title, optionally
/// followed by the summary.
pub fn compose_speak_text(item: &Item, include_summary: bool) -> String {
    let mut text = format!("{}. {}. {}.", item.category, item.source_code, item.title);
    if include_summary && !item.summary.is_empty() {
        text.push(' ');
        text.push_str(&item.summary);
    }
    text
}
