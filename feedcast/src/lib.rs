pub mod types;
pub mod config;
pub mod traits;
pub mod rss_utils;
pub mod feed_manager;
pub mod fetcher;
pub mod parser;
pub mod normalizer;
pub mod state;
pub mod aggregator;
pub mod pipeline;
pub mod narration;
pub mod latch;

pub use types::*;
pub use config::{AppConfig, SourceSpec};
pub use feed_manager::{FeedManager, FeedSource};
pub use fetcher::{Fetcher, HttpTransport};
pub use parser::FeedParser;
pub use normalizer::Normalizer;
pub use state::{CacheSnapshot, JsonFileStore, MemoryStore, SeenLedger};
pub use aggregator::Aggregator;
pub use pipeline::{RefreshPipeline, RefreshTrigger};
pub use narration::{CommandSpeaker, NarrationHandle, NarrationState};
pub use latch::{AutoNarrationLatch, ItemFilter};
