use std::collections::VecDeque;

use gate::crypto;
use gate::error::PromptError;
use gate::models::Entry;
use gate::prompt::SecretPrompt;
use gate::{SessionCache, UnlockError, VaultError, VaultHandle, VaultSnapshot};
use tempfile::tempdir;
use zeroize::Zeroizing;

struct Typed(VecDeque<&'static str>);

impl SecretPrompt for Typed {
    fn read_secret(&mut self, _message: &str) -> Result<Zeroizing<String>, PromptError> {
        self.0
            .pop_front()
            .map(|s| Zeroizing::new(s.to_string()))
            .ok_or(PromptError::NotATerminal)
    }

    fn notify(&mut self, _message: &str) {}
}

fn db1() -> Entry {
    Entry::new(
        "db1".to_string(),
        "root".to_string(),
        "10.0.0.5".to_string(),
        5432,
        "secret".to_string(),
    )
}

#[test]
fn test_entry_creation() {
    let entry = db1();

    assert_eq!(entry.label, "db1");
    assert_eq!(entry.user, "root");
    assert_eq!(entry.host, "10.0.0.5");
    assert_eq!(entry.port, 5432);
    assert_eq!(entry.password, "secret");
    assert_eq!(entry.destination(), "root@10.0.0.5:5432");
}

#[test]
fn test_end_to_end_vault_lifecycle() {
    let dir = tempdir().unwrap();
    let vault = VaultHandle::new(dir.path().join(".gate").join("store.enc"));

    vault.init("masterpw").unwrap();
    vault.add("masterpw", db1()).unwrap();

    let got = vault.get("masterpw", "db1").unwrap();
    assert_eq!(got.user, "root");
    assert_eq!(got.host, "10.0.0.5");
    assert_eq!(got.port, 5432);
    assert_eq!(got.password, "secret");
    assert_eq!(vault.list("masterpw").unwrap().len(), 1);

    vault.delete("masterpw", "db1").unwrap();
    assert!(matches!(
        vault.get("masterpw", "db1"),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn test_on_disk_layout_is_salt_nonce_ciphertext() {
    let dir = tempdir().unwrap();
    let vault = VaultHandle::new(dir.path().join("store.enc"));
    vault.init("masterpw").unwrap();

    let bytes = std::fs::read(vault.path()).unwrap();
    assert!(bytes.len() > crypto::HEADER_LEN);

    let plain = crypto::decrypt_bytes(b"masterpw", &bytes).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&plain).unwrap();
    assert!(value["entries"].as_object().unwrap().is_empty());
}

#[test]
fn test_session_unlocks_then_reuses_password() {
    let dir = tempdir().unwrap();
    let vault = VaultHandle::new(dir.path().join("store.enc"));
    vault.init("masterpw").unwrap();

    let mut session = SessionCache::new();
    let mut prompt = Typed(VecDeque::from(["wrong", "masterpw"]));
    let first = session.require(&vault, &mut prompt).unwrap();
    assert_eq!(first.as_str(), "masterpw");

    // Nothing left to type: the cached password must be used.
    let second = session.require(&vault, &mut prompt).unwrap();
    assert_eq!(second.as_str(), "masterpw");
}

#[test]
fn test_session_gives_up_after_three_attempts() {
    let dir = tempdir().unwrap();
    let vault = VaultHandle::new(dir.path().join("store.enc"));
    vault.init("masterpw").unwrap();

    let mut session = SessionCache::new();
    let mut prompt = Typed(VecDeque::from(["a", "b", "c"]));
    assert!(matches!(
        session.require(&vault, &mut prompt),
        Err(UnlockError::RetryExhausted)
    ));
}

#[test]
fn test_import_from_exported_store() {
    let dir = tempdir().unwrap();
    let vault = VaultHandle::new(dir.path().join("store.enc"));
    vault.init("masterpw").unwrap();
    vault
        .add(
            "masterpw",
            Entry::new("a".into(), "local".into(), "h".into(), 22, "p".into()),
        )
        .unwrap();

    let mut export = VaultSnapshot::new();
    export
        .insert(Entry::new("a".into(), "remote".into(), "h".into(), 22, "p".into()))
        .unwrap();
    export
        .insert(Entry::new("b".into(), "new".into(), "h2".into(), 2222, "q".into()))
        .unwrap();
    let export_path = dir.path().join("export.enc");
    let blob = crypto::encrypt(b"exportpw", &export.to_json().unwrap()).unwrap();
    std::fs::write(&export_path, blob.to_bytes()).unwrap();

    vault
        .import_file("masterpw", "exportpw", &export_path)
        .unwrap();

    let entries = vault.list("masterpw").unwrap();
    let summary: Vec<(String, String)> = entries
        .iter()
        .map(|e| (e.label.clone(), e.user.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("a".to_string(), "remote".to_string()),
            ("b".to_string(), "new".to_string())
        ]
    );
}
