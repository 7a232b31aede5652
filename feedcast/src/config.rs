use crate::types::{FeedcastError, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = "feedcast.toml";

/// Category keys in display order.
pub const CATEGORY_KEYS: [&str; 9] = [
    "ECONOMY", "FINANCE", "TRADE", "TECH", "SCIENCE", "RESEARCH", "WEATHER", "WORLD", "NEWS",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) feedcast/0.1".to_string(),
            timeout_seconds: 15,
            max_retries: 0,
            retry_delay_seconds: 2,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_items_total: usize,
    pub max_items_per_feed: usize,
    pub title_chars: usize,
    pub summary_chars: usize,
    pub headline_title_chars: usize,
    pub headline_count: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_items_total: 700,
            max_items_per_feed: 140,
            title_chars: 260,
            summary_chars: 1400,
            headline_title_chars: 70,
            headline_count: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache_file: PathBuf,
    pub seen_file: PathBuf,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from("feedcast_cache.json"),
            seen_file: PathBuf::from("feedcast_seen.json"),
            ttl_seconds: 15 * 60,
        }
    }
}

/// External speech program. `{text}` in an argument is replaced by the text to
/// speak, `{text_b64_utf16}` by its UTF-16LE bytes in base64. When no argument
/// carries a placeholder the text is appended as the last argument.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub program: String,
    pub args: Vec<String>,
    pub max_chars: usize,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        let (program, args) = if cfg!(target_os = "windows") {
            (
                "powershell".to_string(),
                vec![
                    "-NoProfile".to_string(),
                    "-ExecutionPolicy".to_string(),
                    "Bypass".to_string(),
                    "-Command".to_string(),
                    concat!(
                        "$b=[Convert]::FromBase64String('{text_b64_utf16}');",
                        "$t=[Text.Encoding]::Unicode.GetString($b);",
                        "Add-Type -AssemblyName System.Speech;",
                        "$s=New-Object System.Speech.Synthesis.SpeechSynthesizer;",
                        "$s.Rate=0;$s.Volume=100;$s.Speak($t);"
                    )
                    .to_string(),
                ],
            )
        } else if cfg!(target_os = "macos") {
            ("say".to_string(), Vec::new())
        } else {
            ("espeak-ng".to_string(), Vec::new())
        };

        Self {
            program,
            args,
            max_chars: 2500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutoConfig {
    pub refresh_seconds: u64,
    pub speak_on_change: bool,
    pub speak_on_start: bool,
    pub include_summary: bool,
    pub headline_categories: Vec<String>,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            refresh_seconds: 180,
            speak_on_change: true,
            speak_on_start: false,
            include_summary: false,
            headline_categories: CATEGORY_KEYS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// One registry entry: a source with its ordered fallback mirrors.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceSpec {
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl SourceSpec {
    pub fn new(category: &str, name: &str, code: &str, urls: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            code: Some(code.to_string()),
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub limits: LimitsConfig,
    pub cache: CacheConfig,
    pub narration: NarrationConfig,
    pub auto: AutoConfig,
    pub feeds: Vec<SourceSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            limits: LimitsConfig::default(),
            cache: CacheConfig::default(),
            narration: NarrationConfig::default(),
            auto: AutoConfig::default(),
            feeds: default_sources(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit path, else `feedcast.toml` in the working
    /// directory if present, else built-in defaults. Environment overrides
    /// are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        info!("Loaded config from {} ({} feeds)", path.display(), config.feeds.len());
        Ok(config)
    }

    /// An omitted `[[feeds]]` list keeps the built-in registry.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = env::var("FEEDCAST_CACHE_FILE") {
            self.cache.cache_file = PathBuf::from(path);
        }
        if let Ok(path) = env::var("FEEDCAST_SEEN_FILE") {
            self.cache.seen_file = PathBuf::from(path);
        }
        if let Ok(ttl) = env::var("FEEDCAST_CACHE_TTL_SECS") {
            self.cache.ttl_seconds = ttl.trim().parse().map_err(|_| {
                FeedcastError::Config(format!("FEEDCAST_CACHE_TTL_SECS is not a number: {}", ttl))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.limits.title_chars == 0 || self.limits.summary_chars == 0 {
            return Err(FeedcastError::Config(
                "limits.title_chars and limits.summary_chars must be positive".to_string(),
            ));
        }
        if self.narration.max_chars == 0 {
            return Err(FeedcastError::Config("narration.max_chars must be positive".to_string()));
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(FeedcastError::Config("fetch.timeout_seconds must be positive".to_string()));
        }
        Ok(())
    }
}

/// Built-in feed registry.
pub fn default_sources() -> Vec<SourceSpec> {
    vec![
        // News / World
        SourceSpec::new("NEWS", "CBC Top Stories", "CBC", &["https://www.cbc.ca/webfeed/rss/rss-topstories"]),
        SourceSpec::new("NEWS", "CBC Canada", "CBC", &["https://www.cbc.ca/webfeed/rss/rss-canada"]),
        SourceSpec::new("WORLD", "Al Jazeera", "AJZ", &["https://www.aljazeera.com/xml/rss/all.xml"]),
        SourceSpec::new("WORLD", "The Guardian World", "GDN", &["https://www.theguardian.com/world/rss"]),
        SourceSpec::new("WORLD", "BBC World", "BBC", &["http://feeds.bbci.co.uk/news/world/rss.xml"]),
        // Finance / Economy / Trade
        SourceSpec::new("FINANCE", "The Guardian Business", "GDN", &["https://www.theguardian.com/business/rss"]),
        SourceSpec::new("ECONOMY", "Bank of Canada News", "BoC", &["https://www.bankofcanada.ca/utility/news/feed/"]),
        SourceSpec::new("ECONOMY", "BoC Press Releases", "BoC", &["https://www.bankofcanada.ca/content_type/press-releases/feed/"]),
        SourceSpec::new("FINANCE", "BoC Market Notices", "BoC", &["https://www.bankofcanada.ca/content_type/notices/feed/"]),
        SourceSpec::new("TRADE", "WTO Latest News", "WTO", &["https://www.wto.org/library/rss/latest_news_e.xml"]),
        // Science / Research / Tech
        SourceSpec::new("SCIENCE", "ScienceDaily", "SCI", &["https://www.sciencedaily.com/rss/all.xml"]),
        SourceSpec::new("SCIENCE", "BBC Sci/Env", "BBC", &["http://feeds.bbci.co.uk/news/science_and_environment/rss.xml"]),
        SourceSpec::new("SCIENCE", "NASA Breaking", "NASA", &["https://www.nasa.gov/rss/dyn/breaking_news.rss"]),
        SourceSpec::new("RESEARCH", "arXiv cs.AI", "ARX", &["http://export.arxiv.org/rss/cs.AI"]),
        SourceSpec::new("RESEARCH", "arXiv cs.LG", "ARX", &["http://export.arxiv.org/rss/cs.LG"]),
        SourceSpec::new("TECH", "Ars Technica", "ARS", &["https://feeds.arstechnica.com/arstechnica/index"]),
        SourceSpec::new("TECH", "The Register", "REG", &["https://www.theregister.com/headlines.atom"]),
        SourceSpec::new("TECH", "Hacker News", "HN", &["https://hnrss.org/frontpage"]),
        // Weather
        SourceSpec::new("WEATHER", "Env Canada (BC Warnings)", "ECCC", &["https://weather.gc.ca/rss/battleboard/bcrm1_e.xml"]),
    ]
}
