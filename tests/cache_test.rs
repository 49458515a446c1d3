//! Tests for [`CacheStore`]: durable content-addressed result storage.

use std::fs;
use std::sync::Arc;
use std::thread;

use huginn::CacheStore;

#[test]
fn miss_then_hit() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path().join("cache.json"));

    assert!(store.get("report text", "summaries").is_none());
    assert!(!store.has("report text", "summaries"));

    store.save("report text", "summaries", "a summary").unwrap();
    assert_eq!(store.get("report text", "summaries").as_deref(), Some("a summary"));
    assert!(store.has("report text", "summaries"));
}

#[test]
fn namespaces_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path().join("cache.json"));

    store.save("same content", "ns1", "one").unwrap();
    store.save("same content", "ns2", "two").unwrap();

    assert_eq!(store.get("same content", "ns1").as_deref(), Some("one"));
    assert_eq!(store.get("same content", "ns2").as_deref(), Some("two"));
    assert_eq!(store.len(), 2);
}

#[test]
fn overwrite_replaces_value() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path().join("cache.json"));

    store.save("c", "n", "first").unwrap();
    store.save("c", "n", "second").unwrap();

    assert_eq!(store.get("c", "n").as_deref(), Some("second"));
    assert_eq!(store.len(), 1);
}

#[test]
fn survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.json");

    {
        let store = CacheStore::open(&path);
        store.save("indicator 1.2.3.4", "enrichment", r#"{"score": 7}"#).unwrap();
        store.save("indicator 5.6.7.8", "enrichment", r#"{"score": 2}"#).unwrap();
    }

    let reopened = CacheStore::open(&path);
    assert_eq!(reopened.len(), 2);
    assert_eq!(
        reopened.get("indicator 1.2.3.4", "enrichment").as_deref(),
        Some(r#"{"score": 7}"#)
    );
}

#[test]
fn file_is_keyed_by_digest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let store = CacheStore::open(&path);
    store.save("hello", "greetings", "world").unwrap();

    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let key = CacheStore::compute_key("hello", "greetings");
    assert_eq!(on_disk[&key], "world");
    assert_eq!(on_disk.as_object().unwrap().len(), 1);
}

#[test]
fn remove_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let store = CacheStore::open(&path);

    store.save("a", "n", "1").unwrap();
    store.save("b", "n", "2").unwrap();

    assert!(store.remove("a", "n").unwrap());
    assert!(!store.remove("a", "n").unwrap());
    assert_eq!(store.len(), 1);

    store.clear().unwrap();
    assert!(store.is_empty());
    assert!(CacheStore::open(&path).is_empty());
}

#[test]
fn corrupt_file_starts_empty_and_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    fs::write(&path, "{ not json").unwrap();

    let store = CacheStore::open(&path);
    assert!(store.is_empty());

    store.save("c", "n", "v").unwrap();
    assert_eq!(CacheStore::open(&path).get("c", "n").as_deref(), Some("v"));
}

#[test]
fn listing_accessors_agree() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path().join("cache.json"));
    store.save("a", "n", "1").unwrap();
    store.save("b", "n", "2").unwrap();

    let mut keys = store.keys();
    keys.sort();
    let mut expected = vec![CacheStore::compute_key("a", "n"), CacheStore::compute_key("b", "n")];
    expected.sort();
    assert_eq!(keys, expected);

    let mut values = store.values();
    values.sort();
    assert_eq!(values, vec!["1", "2"]);
    assert_eq!(store.items().len(), 2);
}

#[test]
fn concurrent_writers_lose_nothing() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let store = Arc::new(CacheStore::open(&path));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    store
                        .save(&format!("content-{t}-{i}"), "concurrent", format!("{t}:{i}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), THREADS * PER_THREAD);
    let reopened = CacheStore::open(&path);
    assert_eq!(reopened.len(), THREADS * PER_THREAD);
    assert_eq!(reopened.get("content-3-7", "concurrent").as_deref(), Some("3:7"));
}
