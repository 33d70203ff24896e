//! Integration tests for the encrypted key store
//!
//! These tests open the store the way separate processes would: a fresh
//! `KeyStore` over the same file and master key sees exactly what the
//! previous one persisted.

use assert_matches::assert_matches;
use std::path::PathBuf;
use std::sync::Arc;
use synctrust::envelope::EnvelopeCipher;
use synctrust::keystore::DEFAULT_KEY_NAME;
use synctrust::{KeyPair, KeyStore, MasterKey, TrustError};
use tempfile::TempDir;

fn cipher() -> EnvelopeCipher {
    EnvelopeCipher::new(&MasterKey::from_bytes(b"0123456789abcdef0123456789abcdef").unwrap())
}

fn store_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("authdata.enc")
}

#[test]
fn test_absent_store_then_default_key_then_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);
    assert!(!path.exists());

    let store = KeyStore::open(path.clone(), cipher());
    store.new_key(DEFAULT_KEY_NAME).unwrap();
    assert!(path.exists());

    let second_process = KeyStore::open(path, cipher());
    assert_eq!(second_process.key_names().unwrap(), vec![DEFAULT_KEY_NAME.to_string()]);
}

#[test]
fn test_new_key_is_usable_after_reload() {
    let temp_dir = TempDir::new().unwrap();
    let created = KeyStore::open(store_path(&temp_dir), cipher()).new_key("x").unwrap();

    let reloaded = KeyStore::open(store_path(&temp_dir), cipher());
    let pair = reloaded.get_key("x").unwrap().unwrap();
    assert_eq!(pair, created);
    assert_eq!(pair.name, "x");

    let sealed = synctrust::crypto::encrypt(&pair.public_key, b"round trip").unwrap();
    assert_eq!(synctrust::crypto::decrypt(&pair.private_key, &sealed).unwrap(), b"round trip");
}

#[test]
fn test_store_file_is_not_plaintext() {
    let temp_dir = TempDir::new().unwrap();
    let store = KeyStore::open(store_path(&temp_dir), cipher());
    store.new_key("secret-name").unwrap();

    let raw = std::fs::read(store_path(&temp_dir)).unwrap();
    let text = String::from_utf8_lossy(&raw);
    assert!(!text.contains("secret-name"));
    assert!(!text.contains("PRIVATE KEY"));
}

#[test]
fn test_connections_survive_reload() {
    let temp_dir = TempDir::new().unwrap();
    let remote = KeyPair::generate("remote").unwrap();

    let store = KeyStore::open(store_path(&temp_dir), cipher());
    store.add_connection("peer.example", &remote.public_key().unwrap()).unwrap();

    let reloaded = KeyStore::open(store_path(&temp_dir), cipher());
    let connection = reloaded.get_connection("peer.example").unwrap().unwrap();
    assert_eq!(connection.host, "peer.example");
    assert_eq!(connection.public_key, remote.public_key);

    let sealed = connection.encrypt(b"to the peer").unwrap();
    assert_eq!(remote.decrypt(&sealed).unwrap(), b"to the peer");
}

#[test]
fn test_failed_write_is_not_committed() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let store = KeyStore::open(data_dir.join("authdata.enc"), cipher());

    // Keep the snapshot loaded while the directory disappears
    let handle = store.acquire().unwrap();
    std::fs::remove_dir_all(&data_dir).unwrap();
    std::fs::write(&data_dir, b"not a directory").unwrap();

    assert_matches!(store.new_key("doomed"), Err(TrustError::Io(_)));
    assert!(!handle.read().keys.contains_key("doomed"));
    assert!(store.get_key("doomed").unwrap().is_none());
}

#[test]
fn test_concurrent_writers_all_commit() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(KeyStore::open(store_path(&temp_dir), cipher()));
    let remote = KeyPair::generate("remote").unwrap().public_key().unwrap();

    let threads: Vec<_> = (0..4)
        .map(|i| {
            let store = store.clone();
            let remote = remote.clone();
            std::thread::spawn(move || {
                store.add_connection(&format!("host-{}", i), &remote).unwrap();
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(store.repository().ref_count(), 0);
    let reloaded = KeyStore::open(store_path(&temp_dir), cipher());
    assert_eq!(reloaded.connection_hosts().unwrap().len(), 4);
}

#[test]
fn test_eviction_forces_reload_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let store = KeyStore::open(store_path(&temp_dir), cipher());
    store.key_names().unwrap();
    store.key_names().unwrap();
    assert_eq!(store.repository().load_count(), 2);

    {
        let _held = store.acquire().unwrap();
        store.key_names().unwrap();
        store.key_names().unwrap();
    }
    assert_eq!(store.repository().load_count(), 3);
}

#[test]
fn test_corrupted_store_is_decrypt_error() {
    let temp_dir = TempDir::new().unwrap();
    let store = KeyStore::open(store_path(&temp_dir), cipher());
    store.key_names().unwrap();

    let mut raw = std::fs::read(store_path(&temp_dir)).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    std::fs::write(store_path(&temp_dir), raw).unwrap();

    assert_matches!(store.key_names(), Err(TrustError::Decrypt(_)));
}
