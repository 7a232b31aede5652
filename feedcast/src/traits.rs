use crate::state::{CacheSnapshot, SeenLedger};
use crate::types::{PersistenceError, SpeechError, TransportError};
use async_trait::async_trait;

/// One bounded-timeout GET per call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the body of `url`. Timeouts, connection failures and non-2xx
    /// statuses are all errors.
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// Capability to start speaking a piece of text.
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn launch(&self, text: &str) -> Result<Box<dyn Utterance>, SpeechError>;
}

/// A running speech process, owned by whoever launched it.
#[async_trait]
pub trait Utterance: Send {
    /// Resolve when speech has finished on its own.
    async fn wait(&mut self) -> Result<(), SpeechError>;

    /// Forcibly terminate. Must be safe to call after the process has ended.
    async fn kill(&mut self) -> Result<(), SpeechError>;
}

/// Logical read/write contract for the cache snapshot and the seen ledger.
pub trait StateStore: Send + Sync {
    /// `Ok(None)` when there is nothing stored. Freshness is the caller's
    /// concern.
    fn load_cache(&self) -> Result<Option<CacheSnapshot>, PersistenceError>;

    fn save_cache(&self, snapshot: &CacheSnapshot) -> Result<(), PersistenceError>;

    fn clear_cache(&self) -> Result<(), PersistenceError>;

    fn load_seen(&self) -> Result<SeenLedger, PersistenceError>;

    fn save_seen(&self, ledger: &SeenLedger) -> Result<(), PersistenceError>;

    fn clear_seen(&self) -> Result<(), PersistenceError>;
}
