use crate::config::SourceSpec;
use crate::types::{FeedcastError, Result};
use tracing::{debug, info, warn};
use url::Url;

/// A registered source with its display code resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSource {
    pub category: String,
    pub name: String,
    pub code: String,
    /// Candidate URLs, tried in order.
    pub urls: Vec<String>,
}

/// Ordered feed registry.
#[derive(Debug, Clone, Default)]
pub struct FeedManager {
    sources: Vec<FeedSource>,
}

impl FeedManager {
    pub fn new(specs: &[SourceSpec]) -> Self {
        let mut manager = Self::default();
        for spec in specs {
            manager.register(spec);
        }
        info!("Feed registry loaded with {} sources", manager.sources.len());
        manager
    }

    /// Register a source, dropping candidate URLs that are not http(s).
    /// A source left without URLs is still kept so it shows up as failed.
    fn register(&mut self, spec: &SourceSpec) {
        let urls: Vec<String> = spec
            .urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| {
                let ok = Self::validate_feed_url(u);
                if !ok {
                    warn!("Dropping invalid URL for {}: {:?}", spec.name, u);
                }
                ok
            })
            .map(|u| u.to_string())
            .collect();

        if urls.is_empty() {
            warn!("Source {} has no usable candidate URLs", spec.name);
        }

        let code = spec
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .unwrap_or_else(|| default_code(&spec.name));

        debug!("Registered source {} [{}] as {} with {} URLs", spec.name, spec.category, code, urls.len());

        self.sources.push(FeedSource {
            category: spec.category.clone(),
            name: spec.name.clone(),
            code,
            urls,
        });
    }

    pub fn add_feed(&mut self, spec: SourceSpec) -> Result<()> {
        if self.sources.iter().any(|s| s.name == spec.name) {
            return Err(FeedcastError::Config(format!("Duplicate source name: {}", spec.name)));
        }
        self.register(&spec);
        Ok(())
    }

    pub fn list_feeds(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn get_feed(&self, name: &str) -> Option<&FeedSource> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn source_code(&self, name: &str) -> String {
        self.get_feed(name)
            .map(|s| s.code.clone())
            .unwrap_or_else(|| default_code(name))
    }

    /// Distinct categories in registry order.
    pub fn categories(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for source in &self.sources {
            if !out.contains(&source.category) {
                out.push(source.category.clone());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn validate_feed_url(url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
            Err(_) => false,
        }
    }
}

/// First six characters of the source name, upper-cased.
pub fn default_code(name: &str) -> String {
    name.chars().take(6).collect::<String>().to_uppercase()
}
