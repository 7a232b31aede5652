use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One normalized feed entry.
///
/// Serialized field names follow the cache file layout (`cat`, `src`,
/// `src_code`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub epoch: f64,
    pub ts: String,
    #[serde(rename = "cat")]
    pub category: String,
    #[serde(rename = "src")]
    pub source_name: String,
    #[serde(rename = "src_code")]
    pub source_code: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub domain: String,
    pub is_new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAIL")]
    Fail,
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedState::Ok => f.pad("OK"),
            FeedState::Fail => f.pad("FAIL"),
        }
    }
}

/// Per-source outcome of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedStatus {
    pub name: String,
    #[serde(rename = "cat")]
    pub category: String,
    pub status: FeedState,
    pub used_url: String,
    pub error: String,
    pub count: usize,
}

impl FeedStatus {
    pub fn is_ok(&self) -> bool {
        self.status == FeedState::Ok
    }
}

/// Where an aggregation result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Cache,
    Live,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Cache => f.pad("cache"),
            Provenance::Live => f.pad("live"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationOutput {
    pub items: Vec<Item>,
    pub statuses: Vec<FeedStatus>,
    pub provenance: Provenance,
}

impl AggregationOutput {
    pub fn ok_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.is_ok()).count()
    }

    pub fn fail_count(&self) -> usize {
        self.statuses.len() - self.ok_count()
    }

    pub fn new_count(&self) -> usize {
        self.items.iter().filter(|it| it.is_new).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
}

/// A feed entry as it came off the wire, before cleaning and identity.
/// Both the RSS and the Atom branch of the parser produce this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub format: FeedFormat,
    pub title: Option<String>,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub date: Option<String>,
}

impl RawRecord {
    pub fn title_str(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn url_str(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }

    pub fn summary_str(&self) -> &str {
        self.summary.as_deref().unwrap_or("")
    }

    pub fn date_str(&self) -> &str {
        self.date.as_deref().unwrap_or("")
    }
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub format: FeedFormat,
    pub records: Vec<RawRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Feed size exceeds limit: {size_kb}KB")]
    TooLarge { size_kb: usize },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("Document has no root element")]
    NoRoot,
}

/// Error of a single fetch-then-parse attempt against one candidate URL.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("TransportError: {0}")]
    Transport(#[from] TransportError),

    #[error("ParseError: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error on {}: {}", .path.display(), .source)]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Speech process failed: {0}")]
    Process(#[from] std::io::Error),

    #[error("Speech process exited with {0}")]
    Exit(std::process::ExitStatus),

    #[error("No speech program configured")]
    NotConfigured,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedcastError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, FeedcastError>;
