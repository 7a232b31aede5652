mod common;

use common::init_tracing;
use feedcast::rss_utils::time;
use feedcast::traits::StateStore;
use feedcast::types::{FeedState, FeedStatus, FeedcastError, Item};
use feedcast::{CacheSnapshot, JsonFileStore, MemoryStore, Result, SeenLedger};

fn item(id: &str) -> Item {
    Item {
        id: id.to_string(),
        epoch: 1_736_157_600.0,
        ts: "10:00".to_string(),
        category: "NEWS".to_string(),
        source_name: "Wire".to_string(),
        source_code: "WIRE".to_string(),
        title: format!("Title {}", id),
        summary: String::new(),
        url: id.to_string(),
        domain: "wire.example".to_string(),
        is_new: true,
    }
}

fn status() -> FeedStatus {
    FeedStatus {
        name: "Wire".to_string(),
        category: "NEWS".to_string(),
        status: FeedState::Ok,
        used_url: "https://wire.example/rss".to_string(),
        error: String::new(),
        count: 1,
    }
}

#[test]
fn test_cache_ttl_boundary_is_inclusive() {
    let now = time::now_epoch();
    let ttl = 900;

    let mut snapshot = CacheSnapshot::new(vec![item("a")], vec![status()]);
    snapshot.cache_ts = now - ttl as f64;
    assert!(snapshot.is_fresh_at(now, ttl));

    snapshot.cache_ts = now - ttl as f64 - 1.0;
    assert!(!snapshot.is_fresh_at(now, ttl));
    assert!((snapshot.age_seconds(now) - 901.0).abs() < 1e-3);
}

#[test]
fn test_seen_ledger_merge_returns_new_snapshot() {
    let ledger = SeenLedger::from_ids(["b", "a"]);
    let merged = ledger.merged(["c", "", "a"]);

    assert_eq!(ledger.len(), 2);
    assert_eq!(merged.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    assert!(!merged.contains(""));
}

#[tokio::test]
async fn test_json_store_round_trip() -> Result<()> {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let store = JsonFileStore::new(dir.path().join("nested/cache.json"), dir.path().join("seen.json"));

    assert!(store.load_cache()?.is_none());
    assert!(store.load_seen()?.is_empty());

    let snapshot = CacheSnapshot::new(vec![item("https://wire.example/1")], vec![status()]);
    store.save_cache(&snapshot)?;
    let loaded = store.load_cache()?.expect("cache written");
    assert_eq!(loaded.items, snapshot.items);
    assert_eq!(loaded.statuses, snapshot.statuses);
    assert_eq!(loaded.fetched_at, snapshot.fetched_at);
    assert!((loaded.cache_ts - snapshot.cache_ts).abs() < 1e-3);

    store.save_seen(&SeenLedger::from_ids(["z", "y"]))?;
    let raw = std::fs::read_to_string(store.seen_path())?;
    let ids: Vec<String> = serde_json::from_str(&raw).expect("seen ledger is a JSON array");
    assert_eq!(ids, vec!["y", "z"]);
    assert!(store.load_seen()?.contains("z"));

    store.clear_cache()?;
    store.clear_seen()?;
    assert!(!store.cache_path().exists());
    assert!(store.load_seen()?.is_empty());

    // clearing twice is fine
    store.clear_cache()?;
    Ok(())
}

#[tokio::test]
async fn test_json_store_reports_corrupt_files() -> Result<()> {
    init_tracing();

    let dir = tempfile::tempdir()?;
    let store = JsonFileStore::new(dir.path().join("cache.json"), dir.path().join("seen.json"));
    std::fs::write(store.seen_path(), "{\"not\": \"a list\"}")?;

    let err = store.load_seen().expect_err("object is not a ledger");
    let err: FeedcastError = err.into();
    assert!(err.to_string().contains("seen.json"));
    Ok(())
}

#[test]
fn test_cache_without_optional_fields_still_loads() {
    let raw = r#"{"cache_ts": 1700000000.5}"#;
    let snapshot: CacheSnapshot = serde_json::from_str(raw).expect("minimal cache");
    assert_eq!(snapshot.cache_ts, 1_700_000_000.5);
    assert!(snapshot.items.is_empty());
    assert!(snapshot.statuses.is_empty());

    assert!(serde_json::from_str::<CacheSnapshot>(r#"{"items": []}"#).is_err());
}

#[test]
fn test_memory_store() {
    let store = MemoryStore::with_seen(SeenLedger::from_ids(["x"]));
    assert!(store.load_seen().expect("memory").contains("x"));

    let snapshot = CacheSnapshot::new(Vec::new(), vec![status()]);
    store.save_cache(&snapshot).expect("memory");
    assert_eq!(store.snapshot(), Some(snapshot));

    store.clear_cache().expect("memory");
    store.clear_seen().expect("memory");
    assert!(store.snapshot().is_none());
    assert!(store.seen().is_empty());
}
