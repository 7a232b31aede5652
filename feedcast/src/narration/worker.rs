use super::{NarrationCommand, NarrationState};
use crate::rss_utils::text;
use crate::traits::{Speaker, Utterance};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// What the loop does after a command has been handled.
enum Flow {
    Continue,
    /// A command arrived mid-speech and still has to be handled.
    Next(NarrationCommand),
    Exit,
}

pub(super) struct NarrationWorker {
    rx: mpsc::UnboundedReceiver<NarrationCommand>,
    speaker: Arc<dyn Speaker>,
    max_chars: usize,
    state: watch::Sender<NarrationState>,
    launches: watch::Sender<u64>,
}

impl NarrationWorker {
    pub(super) fn new(
        rx: mpsc::UnboundedReceiver<NarrationCommand>,
        speaker: Arc<dyn Speaker>,
        max_chars: usize,
        state: watch::Sender<NarrationState>,
        launches: watch::Sender<u64>,
    ) -> Self {
        Self {
            rx,
            speaker,
            max_chars,
            state,
            launches,
        }
    }

    pub(super) async fn run(mut self) {
        debug!("Narration worker started");
        let mut pending: Option<NarrationCommand> = None;

        loop {
            let command = match pending.take() {
                Some(command) => command,
                None => match self.rx.recv().await {
                    Some(command) => command,
                    None => break,
                },
            };

            let flow = match command {
                NarrationCommand::Speak(text) => self.speak(&text).await,
                NarrationCommand::Stop => self.flush(),
                NarrationCommand::Shutdown => Flow::Exit,
            };

            match flow {
                Flow::Continue => {}
                Flow::Next(command) => pending = Some(command),
                Flow::Exit => break,
            }
        }

        self.rx.close();
        self.state.send_replace(NarrationState::Exited);
        info!("Narration worker stopped");
    }

    /// Speak until done or until the next command arrives. Any command
    /// arriving mid-speech kills the process first.
    async fn speak(&mut self, raw: &str) -> Flow {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Flow::Continue;
        }
        let spoken = text::truncate(trimmed, self.max_chars);

        let mut utterance = match self.speaker.launch(&spoken).await {
            Ok(utterance) => utterance,
            Err(e) => {
                warn!("Speech launch failed: {}", e);
                return Flow::Continue;
            }
        };
        self.state.send_replace(NarrationState::Speaking);
        self.launches.send_modify(|n| *n += 1);
        debug!("Speaking {} chars", spoken.chars().count());

        let flow = tokio::select! {
            result = utterance.wait() => {
                if let Err(e) = result {
                    warn!("Speech process failed: {}", e);
                    terminate(utterance.as_mut()).await;
                }
                Flow::Continue
            }
            command = self.rx.recv() => {
                terminate(utterance.as_mut()).await;
                match command {
                    Some(NarrationCommand::Speak(next)) => Flow::Next(NarrationCommand::Speak(next)),
                    Some(NarrationCommand::Stop) => self.flush(),
                    Some(NarrationCommand::Shutdown) | None => Flow::Exit,
                }
            }
        };

        self.state.send_replace(NarrationState::Idle);
        flow
    }

    /// Discard every queued command. A queued shutdown still ends the worker.
    fn flush(&mut self) -> Flow {
        let mut discarded = 0usize;
        while let Ok(command) = self.rx.try_recv() {
            if command == NarrationCommand::Shutdown {
                debug!("Shutdown found while flushing after {} commands", discarded);
                return Flow::Exit;
            }
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Stop discarded {} queued commands", discarded);
        }
        Flow::Continue
    }
}

async fn terminate(utterance: &mut dyn Utterance) {
    if let Err(e) = utterance.kill().await {
        warn!("Failed to kill speech process: {}", e);
    }
}
