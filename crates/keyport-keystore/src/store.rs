//! Single-file keystore.
//!
//! The file is one JSON object mapping checksum addresses to key records.
//! It is read completely on [`KeyStore::open`] and rewritten completely after
//! every mutation, so the in-memory map and the file agree whenever a public
//! method returns.
//!
//! # Concurrency
//!
//! There is no locking. A `KeyStore` takes `&mut self` for mutations, which
//! serializes writers inside one process, but two processes (or two
//! instances) writing the same file will lose each other's updates. Callers
//! must keep to a single writer per file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use keyport_core::{Address, WalletError, parse_address};

use crate::record::KeyRecord;

/// Address-keyed collection of encrypted key records backed by one file.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
    records: BTreeMap<Address, KeyRecord>,
}

impl KeyStore {
    /// Open the keystore at `path`. A missing file is an empty keystore.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref().to_path_buf();
        let records = load(&path)?;
        debug!(path = %path.display(), accounts = records.len(), "keystore loaded");
        Ok(Self { path, records })
    }

    /// Backing file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the backing file, replacing the in-memory map.
    pub fn reload(&mut self) -> Result<(), WalletError> {
        self.records = load(&self.path)?;
        Ok(())
    }

    /// Write the whole map to disk.
    ///
    /// The data goes to a sibling temp file which is flushed and then
    /// renamed over the real file, so the keystore on disk is always either
    /// the old or the new version.
    pub fn save(&self) -> Result<(), WalletError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let on_disk: BTreeMap<String, &KeyRecord> = self
            .records
            .iter()
            .map(|(addr, rec)| (addr.to_checksum(None), rec))
            .collect();
        let content = serde_json::to_string_pretty(&on_disk)
            .map_err(|e| WalletError::CorruptStore(e.to_string()))?;

        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        debug!(path = %self.path.display(), accounts = self.records.len(), "keystore saved");
        Ok(())
    }

    pub fn get(&self, address: &Address) -> Option<&KeyRecord> {
        self.records.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.records.contains_key(address)
    }

    /// Insert or replace the record for `address` and persist.
    pub fn set(&mut self, address: Address, record: KeyRecord) -> Result<(), WalletError> {
        let previous = self.records.insert(address, record);
        if let Err(e) = self.save() {
            // Keep memory in step with the file we failed to replace.
            match previous {
                Some(old) => self.records.insert(address, old),
                None => self.records.remove(&address),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Remove the record for `address` and persist.
    pub fn delete(&mut self, address: &Address) -> Result<KeyRecord, WalletError> {
        let removed = self
            .records
            .remove(address)
            .ok_or(WalletError::NotFound(*address))?;
        if let Err(e) = self.save() {
            self.records.insert(*address, removed);
            return Err(e);
        }
        Ok(removed)
    }

    /// All stored addresses, in ascending byte order.
    pub fn addresses(&self) -> Vec<Address> {
        self.records.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn load(path: &Path) -> Result<BTreeMap<Address, KeyRecord>, WalletError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&data)
        .map_err(|e| WalletError::CorruptStore(format!("{}: {e}", path.display())))?;

    let mut records = BTreeMap::new();
    for (key, value) in raw {
        let address = parse_address(&key)
            .map_err(|e| WalletError::CorruptStore(format!("entry {key:?}: {e}")))?;
        let record = KeyRecord::from_value(value)
            .map_err(|e| WalletError::CorruptStore(format!("entry {key:?}: {e}")))?;
        let declared = record
            .declared_address()
            .map_err(|e| WalletError::CorruptStore(format!("entry {key:?}: {e}")))?;
        if let Some(declared) = declared {
            if declared != address {
                return Err(WalletError::CorruptStore(format!(
                    "entry {key:?} holds the record for {declared}"
                )));
            }
        }
        records.insert(address, record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::KdfParams;
    use keyport_core::RawKey;

    fn new_record(password: &str) -> (Address, KeyRecord) {
        let key = RawKey::generate();
        let record = KeyRecord::encrypt(&key, password, KdfParams::pbkdf2(2)).unwrap();
        (key.address().unwrap(), record)
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn set_persists_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let (addr, record) = new_record("pw");

        let mut store = KeyStore::open(&path).unwrap();
        store.set(addr, record.clone()).unwrap();

        let reopened = KeyStore::open(&path).unwrap();
        assert_eq!(reopened.get(&addr), Some(&record));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn file_keys_are_checksum_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let (addr, record) = new_record("pw");

        let mut store = KeyStore::open(&path).unwrap();
        store.set(addr, record).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get(addr.to_checksum(None)).is_some());
    }

    #[test]
    fn lowercase_keys_in_file_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let (addr, record) = new_record("pw");
        let lower = format!("0x{}", hex::encode(addr.as_slice()));
        let mut doc = serde_json::Map::new();
        doc.insert(lower, serde_json::to_value(&record).unwrap());
        fs::write(&path, serde_json::Value::Object(doc).to_string()).unwrap();

        let store = KeyStore::open(&path).unwrap();
        assert!(store.contains(&addr));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KeyStore::open(dir.path().join("keys.json")).unwrap();
        let (addr, record) = new_record("pw");
        assert_eq!(store.delete(&addr).unwrap_err(), WalletError::NotFound(addr));

        store.set(addr, record).unwrap();
        store.delete(&addr).unwrap();
        assert_eq!(store.delete(&addr).unwrap_err(), WalletError::NotFound(addr));
        assert!(KeyStore::open(store.path()).unwrap().is_empty());
    }

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = KeyStore::open(dir.path().join("keys.json")).unwrap();
        let key = RawKey::generate();
        let addr = key.address().unwrap();
        let first = KeyRecord::encrypt(&key, "one", KdfParams::pbkdf2(2)).unwrap();
        let second = KeyRecord::encrypt(&key, "two", KdfParams::pbkdf2(2)).unwrap();

        store.set(addr, first).unwrap();
        store.set(addr, second.clone()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&addr), Some(&second));
    }

    #[test]
    fn garbage_file_is_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        fs::write(&path, "{ this is not json").unwrap();
        assert!(matches!(
            KeyStore::open(&path),
            Err(WalletError::CorruptStore(_))
        ));
    }

    #[test]
    fn entry_under_another_address_is_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let (x, _) = new_record("pw");
        let (_, y_record) = new_record("pw");
        let mut doc = serde_json::Map::new();
        doc.insert(x.to_checksum(None), serde_json::to_value(&y_record).unwrap());
        fs::write(&path, serde_json::Value::Object(doc).to_string()).unwrap();

        assert!(matches!(
            KeyStore::open(&path),
            Err(WalletError::CorruptStore(msg)) if msg.contains("holds the record for")
        ));
    }

    #[test]
    fn bad_entry_is_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        fs::write(&path, r#"{"not-an-address": {"version": 3}}"#).unwrap();
        assert!(matches!(
            KeyStore::open(&path),
            Err(WalletError::CorruptStore(_))
        ));
    }

    #[test]
    fn stale_temp_file_does_not_affect_load() {
        // A crash between temp write and rename leaves the old file intact.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let (addr, record) = new_record("pw");
        let mut store = KeyStore::open(&path).unwrap();
        store.set(addr, record).unwrap();

        fs::write(path.with_extension("tmp"), "{ half writ").unwrap();
        let reopened = KeyStore::open(&path).unwrap();
        assert_eq!(reopened.addresses(), vec![addr]);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("keys.json");
        let (addr, record) = new_record("pw");
        let mut store = KeyStore::open(&path).unwrap();
        store.set(addr, record).unwrap();
        assert!(path.exists());
    }
}
