use std::fs;

use serde_json::json;
use stitch_engine::{
    ensure_output_dir, load_typed, save_typed, AtomicFileWriter, DirectorySaveTarget, FileStore,
    KeyValueStore, MemoryStore, SaveTarget, StoreError,
};
use stitch_core::Preferences;
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("books");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path());

    let first = writer.write("book.html", "one").unwrap();
    assert_eq!(fs::read_to_string(&first).unwrap(), "one");
    let second = writer.write("book.html", "two").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "two");
}

#[test]
fn writer_refuses_a_file_as_directory() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    assert!(writer.write("book.html", "data").is_err());
}

#[test]
fn directory_target_saves_book() {
    let temp = TempDir::new().unwrap();
    let target = DirectorySaveTarget::new(temp.path().join("out"));
    let saved = target.save("<html></html>", "三体.html").unwrap();
    assert_eq!(saved.bytes, 13);
    assert_eq!(saved.location, temp.path().join("out").join("三体.html"));
    assert_eq!(fs::read_to_string(saved.location).unwrap(), "<html></html>");
}

#[test]
fn memory_store_round_trips() {
    let store = MemoryStore::new();
    assert_eq!(store.get("k").unwrap(), None);
    store.set("k", json!({"scraping": true})).unwrap();
    assert_eq!(store.get("k").unwrap(), Some(json!({"scraping": true})));
    store.delete("k").unwrap();
    assert_eq!(store.get("k").unwrap(), None);
}

#[test]
fn file_store_persists_across_opens() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state").join("prefs.json");

    let store = FileStore::open(&path).unwrap();
    let mut prefs = Preferences::default();
    prefs.set_turn_delay(750.0).unwrap();
    save_typed(&store, "scraper-preferences", &prefs).unwrap();
    assert!(path.exists());

    let reopened = FileStore::open(&path).unwrap();
    let loaded: Preferences = load_typed(&reopened, "scraper-preferences")
        .unwrap()
        .unwrap();
    assert_eq!(loaded, prefs);

    reopened.delete("scraper-preferences").unwrap();
    let again = FileStore::open(&path).unwrap();
    assert_eq!(again.get("scraper-preferences").unwrap(), None);
}

#[test]
fn corrupt_file_store_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("prefs.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        FileStore::open(&path),
        Err(StoreError::Corrupt { .. })
    ));
}

#[test]
fn mistyped_value_is_reported() {
    let store = MemoryStore::new();
    store.set("scraper-preferences", json!("oops")).unwrap();
    let result = load_typed::<Preferences>(&store, "scraper-preferences");
    assert!(matches!(result, Err(StoreError::Shape { .. })));
}
