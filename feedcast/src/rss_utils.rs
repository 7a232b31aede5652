//! Helpers shared by the normalizer, the latch and the CLI.

/// URL utilities
pub mod url {
    use url::Url;

    /// Host of `url_str`, lower-cased, with a leading `www.` removed.
    /// Empty when the URL is empty. Falls back to plain string splitting for
    /// values `Url` refuses, so scheme-less links still yield a host.
    pub fn extract_domain(url_str: &str) -> String {
        let trimmed = url_str.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let host = Url::parse(trimmed)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| {
                let rest = trimmed.split_once("://").map(|(_, r)| r).unwrap_or(trimmed);
                rest.split('/').next().unwrap_or("").to_string()
            })
            .to_lowercase();

        match host.strip_prefix("www.") {
            Some(stripped) => stripped.to_string(),
            None => host,
        }
    }
}

/// Markup cleaning for feed text
pub mod feed {
    /// Drop everything between `<` and `>`. Not an HTML parser: unbalanced
    /// brackets simply swallow or keep the rest of the text.
    pub fn strip_markup(html: &str) -> String {
        html.chars()
            .fold((String::with_capacity(html.len()), false), |(mut text, in_tag), c| {
                match c {
                    '<' => (text, true),
                    '>' => (text, false),
                    _ if !in_tag => {
                        text.push(c);
                        (text, in_tag)
                    }
                    _ => (text, in_tag),
                }
            })
            .0
    }

    /// Strip tags, then decode entities, then trim. Non-breaking spaces become
    /// plain spaces.
    pub fn clean_text(raw: &str) -> String {
        let stripped = strip_markup(raw);
        html_escape::decode_html_entities(&stripped)
            .replace('\u{00a0}', " ")
            .trim()
            .to_string()
    }
}

/// Text utilities
pub mod text {
    pub const ELLIPSIS: char = '…';

    /// Cap `text` at `max_chars` characters. Over-long text keeps its first
    /// `max_chars - 1` characters, trailing whitespace removed, plus a single
    /// ellipsis, so the result never exceeds the cap.
    pub fn truncate(text: &str, max_chars: usize) -> String {
        let trimmed = text.trim();
        if trimmed.chars().count() <= max_chars {
            return trimmed.to_string();
        }

        let mut out: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
        let keep = out.trim_end().len();
        out.truncate(keep);
        out.push(ELLIPSIS);
        out
    }

    /// First `n` characters.
    pub fn prefix_chars(text: &str, n: usize) -> &str {
        match text.char_indices().nth(n) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }
}

/// Time utilities
pub mod time {
    use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

    const OFFSET_FORMATS: [&str; 3] = [
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M%:z",
    ];

    const NAIVE_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
        "%a, %d %b %Y %H:%M:%S",
    ];

    /// Current time as fractional Unix seconds.
    pub fn now_epoch() -> f64 {
        to_epoch(&Utc::now())
    }

    fn to_epoch<Tz: TimeZone>(dt: &DateTime<Tz>) -> f64 {
        dt.timestamp_millis() as f64 / 1000.0
    }

    /// Best-effort publish time: RFC 2822 first, then ISO 8601 with a
    /// trailing `Z` read as `+00:00`. Timestamps without a zone are taken as
    /// UTC. Anything unparseable is 0.
    pub fn parse_date_any(raw: &str) -> f64 {
        let s = raw.trim();
        if s.is_empty() {
            return 0.0;
        }

        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return to_epoch(&dt);
        }

        let iso = match s.strip_suffix('Z') {
            Some(head) => format!("{}+00:00", head),
            None => s.to_string(),
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&iso) {
            return to_epoch(&dt);
        }

        for fmt in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(&iso, fmt) {
                return to_epoch(&dt);
            }
        }

        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(&iso, fmt) {
                return to_epoch(&naive.and_utc());
            }
        }

        NaiveDate::parse_from_str(&iso, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| to_epoch(&naive.and_utc()))
            .unwrap_or(0.0)
    }

    /// Local `HH:MM` of an epoch, `--:--` for the unknown epoch.
    pub fn format_hhmm(epoch: f64) -> String {
        if epoch == 0.0 {
            return "--:--".to_string();
        }
        Local
            .timestamp_opt(epoch.trunc() as i64, 0)
            .single()
            .map(|dt| dt.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string())
    }

    /// Local wall-clock time as `YYYY-MM-DD HH:MM:SS`.
    pub fn human_now() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
