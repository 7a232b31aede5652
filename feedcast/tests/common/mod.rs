#![allow(dead_code)]

use async_trait::async_trait;
use feedcast::config::{AppConfig, SourceSpec};
use feedcast::traits::{Speaker, Transport, Utterance};
use feedcast::types::{SpeechError, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::oneshot;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Config with the given registry and otherwise default limits.
pub fn test_config(feeds: Vec<SourceSpec>) -> AppConfig {
    AppConfig {
        feeds,
        ..AppConfig::default()
    }
}

/// Poll `cond` every few milliseconds until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

pub fn rss_feed(items: &[(&str, &str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, link, date)| {
            format!(
                "<item><title>{}</title><link>{}</link><description>About {}</description><pubDate>{}</pubDate></item>",
                title, link, title, date
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Test</title>{}</channel></rss>"#,
        body
    )
}

pub fn atom_feed(entries: &[(&str, &str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(title, link, updated)| {
            format!(
                r#"<entry><title>{}</title><link rel="alternate" href="{}"/><updated>{}</updated><summary>About {}</summary></entry>"#,
                title, link, updated, title
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><feed xmlns="http://www.w3.org/2005/Atom"><title>Test</title>{}</feed>"#,
        body
    )
}

#[derive(Debug, Clone)]
pub enum Reply {
    Body(String),
    Status(u16),
}

/// Transport answering from a fixed URL table and recording every request.
/// Unknown URLs fail as unreachable.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: &str, body: impl Into<String>) -> Self {
        self.set(url, Reply::Body(body.into()));
        self
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.set(url, Reply::Status(status));
        self
    }

    pub fn set(&self, url: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        let reply = self.replies.lock().unwrap().get(url).cloned();
        match reply {
            Some(Reply::Body(body)) => Ok(body.into_bytes()),
            Some(Reply::Status(status)) => Err(TransportError::Status {
                status,
                reason: "scripted".to_string(),
            }),
            None => Err(TransportError::Connection(format!("unreachable: {}", url))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Launch(String),
    Kill(String),
    Finish(String),
}

/// Speaker whose utterances run until the test finishes or the worker kills
/// them. Every launch, kill and natural finish is recorded in order.
#[derive(Default)]
pub struct RecordingSpeaker {
    events: Arc<Mutex<Vec<SpeechEvent>>>,
    finishers: Mutex<Vec<oneshot::Sender<()>>>,
    failing_launches: AtomicUsize,
    instant: AtomicBool,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` launches fail.
    pub fn fail_next_launches(&self, n: usize) {
        self.failing_launches.store(n, Ordering::SeqCst);
    }

    /// Every later utterance ends as soon as it is launched.
    pub fn finish_on_launch(&self) {
        self.instant.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<SpeechEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn launched(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SpeechEvent::Launch(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Utterances launched and neither killed nor finished.
    pub fn alive(&self) -> usize {
        self.events().iter().fold(0i64, |n, e| match e {
            SpeechEvent::Launch(_) => n + 1,
            _ => n - 1,
        }) as usize
    }

    /// Let the most recent utterance end on its own.
    pub fn finish_latest(&self) {
        if let Some(tx) = self.finishers.lock().unwrap().pop() {
            let _ = tx.send(());
        }
    }
}

#[async_trait]
impl Speaker for RecordingSpeaker {
    async fn launch(&self, text: &str) -> Result<Box<dyn Utterance>, SpeechError> {
        let failing = self.failing_launches.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_launches.store(failing - 1, Ordering::SeqCst);
            return Err(SpeechError::NotConfigured);
        }

        let (tx, rx) = oneshot::channel();
        if self.instant.load(Ordering::SeqCst) {
            let _ = tx.send(());
        } else {
            self.finishers.lock().unwrap().push(tx);
        }
        self.events.lock().unwrap().push(SpeechEvent::Launch(text.to_string()));
        Ok(Box::new(RecordedUtterance {
            text: text.to_string(),
            events: self.events.clone(),
            done: rx,
            ended: false,
        }))
    }
}

struct RecordedUtterance {
    text: String,
    events: Arc<Mutex<Vec<SpeechEvent>>>,
    done: oneshot::Receiver<()>,
    ended: bool,
}

#[async_trait]
impl Utterance for RecordedUtterance {
    async fn wait(&mut self) -> Result<(), SpeechError> {
        if !self.ended {
            let _ = (&mut self.done).await;
            self.ended = true;
            self.events.lock().unwrap().push(SpeechEvent::Finish(self.text.clone()));
        }
        Ok(())
    }

    async fn kill(&mut self) -> Result<(), SpeechError> {
        if !self.ended {
            self.ended = true;
            self.events.lock().unwrap().push(SpeechEvent::Kill(self.text.clone()));
        }
        Ok(())
    }
}
