use crate::config::LimitsConfig;
use crate::feed_manager::FeedSource;
use crate::rss_utils::{feed, text, time, url};
use crate::state::SeenLedger;
use crate::types::{Item, RawRecord};

pub const NO_TITLE: &str = "(no title)";

const ID_TITLE_CHARS: usize = 200;
const ID_DATE_CHARS: usize = 50;

/// Turns raw parsed records into canonical items.
#[derive(Debug, Clone)]
pub struct Normalizer {
    title_chars: usize,
    summary_chars: usize,
}

impl Normalizer {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            title_chars: limits.title_chars,
            summary_chars: limits.summary_chars,
        }
    }

    /// `seen` must be the ledger as it was before the current pass started.
    pub fn normalize(&self, record: &RawRecord, source: &FeedSource, seen: &SeenLedger) -> Item {
        let title_clean = feed::clean_text(record.title_str());
        let summary_clean = feed::clean_text(record.summary_str());
        let link = record.url_str().trim().to_string();

        let id = item_id(&source.name, &title_clean, record.date_str(), &link);
        let epoch = time::parse_date_any(record.date_str());

        let mut title = text::truncate(&title_clean, self.title_chars);
        if title.is_empty() {
            title = NO_TITLE.to_string();
        }

        Item {
            is_new: !seen.contains(&id),
            id,
            epoch,
            ts: time::format_hhmm(epoch),
            category: source.category.clone(),
            source_name: source.name.clone(),
            source_code: source.code.clone(),
            title,
            summary: text::truncate(&summary_clean, self.summary_chars),
            domain: url::extract_domain(&link),
            url: link,
        }
    }
}

/// Stable identity: the link when there is one, else a composite of source
/// name, cleaned title and raw date string.
pub fn item_id(source_name: &str, clean_title: &str, raw_date: &str, link: &str) -> String {
    if !link.is_empty() {
        return link.to_string();
    }
    format!(
        "{}|{}|{}",
        source_name,
        text::prefix_chars(clean_title, ID_TITLE_CHARS),
        text::prefix_chars(raw_date, ID_DATE_CHARS)
    )
}
