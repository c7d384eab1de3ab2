//! Integration tests for the entry store: persistence, import and export.

use cmdkit::classifier::SensitivityClassifier;
use cmdkit::crypto::LocalKeyProtector;
use cmdkit::protect::{is_encrypted, SecretProtector};
use cmdkit::{Entry, EntryDraft, EntryStore, KitError};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn protector() -> SecretProtector {
    SecretProtector::new(Arc::new(LocalKeyProtector::with_key([7u8; 32])))
}

fn open_store(path: &Path) -> EntryStore {
    let mut store = EntryStore::new(
        path.to_path_buf(),
        protector(),
        SensitivityClassifier::default(),
    );
    store.load().unwrap();
    store
}

fn read_raw(path: &Path) -> Vec<Entry> {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_sensitive_values_protected_on_disk() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("commands.json");
    let mut store = open_store(&data);

    store
        .add(EntryDraft::new("GitHub Token", "ghp_abc123", None, None, false).unwrap())
        .unwrap();
    store
        .add(EntryDraft::new("list files", "ls -la", None, None, false).unwrap())
        .unwrap();
    store
        .add(EntryDraft::new("db", "hunter2", Some("prod pwd"), None, false).unwrap())
        .unwrap();

    let raw = fs::read_to_string(&data).unwrap();
    assert!(!raw.contains("ghp_abc123"));
    assert!(!raw.contains("hunter2"));
    assert!(raw.contains("ls -la"));

    // A fresh store with the same key reads the values back
    let reopened = open_store(&data);
    assert_eq!(reopened.reveal("github token").unwrap(), "ghp_abc123");
    assert_eq!(reopened.reveal("db").unwrap(), "hunter2");
    assert_eq!(reopened.reveal("list files").unwrap(), "ls -la");
}

#[test]
fn test_reads_legacy_pascal_case_file() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("commands.json");
    fs::write(
        &data,
        r#"[{
            "Id": "6f1c1f0e-8d7a-4c3e-9b2a-0a4f5e6d7c8b",
            "Name": "ssh prod",
            "Value": "ssh deploy@prod",
            "Description": null,
            "Kind": "Command",
            "CreatedUtc": "2024-01-01T00:00:00Z",
            "UpdatedUtc": "2024-01-02T00:00:00Z"
        }]"#,
    )
    .unwrap();

    let store = open_store(&data);
    assert_eq!(store.entries().len(), 1);
    assert_eq!(store.entries()[0].name, "ssh prod");
    assert!(store.kinds().contains("command"));
}

#[test]
fn test_import_merges_case_insensitively() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("commands.json");
    let mut store = open_store(&data);
    store
        .add(EntryDraft::new("API Key", "old-key", None, None, false).unwrap())
        .unwrap();

    let incoming = dir.path().join("incoming.json");
    fs::write(
        &incoming,
        r#"[
            {"name": "api key", "value": "new-key", "kind": "Password", "wasEncrypted": true},
            {"name": "open docs", "value": "https://docs.rs", "kind": "Link"}
        ]"#,
    )
    .unwrap();

    let report = store.import(&incoming).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.reprotected, 1);

    assert_eq!(store.entries().len(), 2);
    let key = store.find("API KEY").unwrap();
    assert_eq!(key.name, "API Key");
    assert_eq!(key.kind, "Password");
    assert!(key.is_encrypted());
    assert_eq!(store.reveal("api key").unwrap(), "new-key");
    assert!(store.kinds().contains("link"));

    for entry in read_raw(&data) {
        assert_eq!(entry.was_encrypted, None);
    }
}

#[test]
fn test_export_then_import_restores_protection() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("commands.json");
    let mut store = open_store(&data);
    store
        .add(EntryDraft::new("vault", "s3cr3t", None, None, true).unwrap())
        .unwrap();
    store
        .add(EntryDraft::new("build", "cargo build", None, None, false).unwrap())
        .unwrap();

    let exported = dir.path().join("export.json");
    let report = store.export(&exported).unwrap();
    assert_eq!(report.exported, 2);
    assert_eq!(report.decoded, 1);
    assert_eq!(report.left_protected, 0);

    let raw = read_raw(&exported);
    let vault = raw.iter().find(|e| e.name == "vault").unwrap();
    assert_eq!(vault.value, "s3cr3t");
    assert_eq!(vault.was_encrypted, Some(true));
    let build = raw.iter().find(|e| e.name == "build").unwrap();
    assert_eq!(build.was_encrypted, None);

    // Import into a store using a different key
    let other_data = dir.path().join("other").join("commands.json");
    let mut other = EntryStore::new(
        other_data.clone(),
        SecretProtector::new(Arc::new(LocalKeyProtector::with_key([9u8; 32]))),
        SensitivityClassifier::default(),
    );
    other.load().unwrap();
    other.import(&exported).unwrap();

    let vault = other.find("vault").unwrap();
    assert!(is_encrypted(&vault.value));
    assert_eq!(vault.was_encrypted, None);
    assert_eq!(other.reveal("vault").unwrap(), "s3cr3t");
    assert!(!fs::read_to_string(&other_data).unwrap().contains("s3cr3t"));
}

#[test]
fn test_corrupt_file_is_kept_aside() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("commands.json");
    fs::write(&data, "{ not json").unwrap();

    let mut store = EntryStore::new(data.clone(), protector(), SensitivityClassifier::default());
    assert!(matches!(store.load(), Err(KitError::Parse { .. })));
    assert!(store.entries().is_empty());

    let backups: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt."))
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read_to_string(backups[0].path()).unwrap(), "{ not json");
}

#[test]
fn test_custom_patterns() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("commands.json");
    let mut store = EntryStore::new(
        data.clone(),
        protector(),
        SensitivityClassifier::new(&["^pin$", "(unclosed"]),
    );
    store.load().unwrap();
    assert_eq!(store.classifier().rejected().len(), 1);

    store
        .add(EntryDraft::new("PIN", "1234", None, None, false).unwrap())
        .unwrap();
    store
        .add(EntryDraft::new("password hint", "blue", None, None, false).unwrap())
        .unwrap();

    assert!(store.find("pin").unwrap().is_encrypted());
    assert!(!store.find("password hint").unwrap().is_encrypted());
}
