use crate::narration::compose_speak_text;
use crate::types::Item;
use std::collections::BTreeSet;
use tracing::debug;

/// The consumer's active view filter: a category set (empty means all) and a
/// case-insensitive text query over title, summary, source name and domain.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub categories: BTreeSet<String>,
    pub query: String,
}

impl ItemFilter {
    pub fn new<I, S>(categories: I, query: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            query: query.trim().to_lowercase(),
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        if !self.categories.is_empty() && !self.categories.contains(&item.category) {
            return false;
        }
        if self.query.is_empty() {
            return true;
        }
        [&item.title, &item.summary, &item.source_name, &item.domain]
            .iter()
            .any(|field| field.to_lowercase().contains(&self.query))
    }
}

/// Headline-eligible items, newest first, at most `count` of them.
pub fn select_headlines(
    items: &[Item],
    headline_categories: &[String],
    filter: &ItemFilter,
    count: usize,
) -> Vec<Item> {
    let mut headlines: Vec<Item> = items
        .iter()
        .filter(|it| headline_categories.iter().any(|c| *c == it.category))
        .filter(|it| filter.matches(it))
        .cloned()
        .collect();
    headlines.sort_by(|a, b| b.epoch.total_cmp(&a.epoch));
    headlines.truncate(count);
    headlines
}

/// Decides when a new top headline deserves to be spoken: once per change of
/// the newest headline id, never for a re-sort or a cached repeat.
#[derive(Debug, Clone, Default)]
pub struct AutoNarrationLatch {
    last_spoken_id: Option<String>,
    first_pass_done: bool,
    speak_on_start: bool,
    include_summary: bool,
}

impl AutoNarrationLatch {
    pub fn new(speak_on_start: bool, include_summary: bool) -> Self {
        Self {
            speak_on_start,
            include_summary,
            ..Default::default()
        }
    }

    pub fn last_spoken_id(&self) -> Option<&str> {
        self.last_spoken_id.as_deref()
    }

    /// Feed one pass worth of ranked headlines. Returns the text to speak when
    /// the newest headline warrants it.
    pub fn observe(&mut self, headlines: &[Item]) -> Option<String> {
        let newest = headlines.first()?;

        if !self.first_pass_done {
            self.first_pass_done = true;
            self.last_spoken_id = Some(newest.id.clone());
            debug!("First headline pass recorded {}", newest.id);
            if self.speak_on_start && !newest.id.is_empty() {
                return Some(compose_speak_text(newest, self.include_summary));
            }
            return None;
        }

        if newest.id.is_empty() || self.last_spoken_id.as_deref() == Some(newest.id.as_str()) {
            return None;
        }

        debug!("Newest headline changed to {}", newest.id);
        self.last_spoken_id = Some(newest.id.clone());
        Some(compose_speak_text(newest, self.include_summary))
    }
}
