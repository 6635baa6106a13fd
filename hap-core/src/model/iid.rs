//! Stable 16-bit instance-ID assignment and database-structure-hash tracking.
//!
//! Keys are human-structural, mirroring the original implementation: `S:<type>:<aid>` for a
//! service, `C:<type>:<service-type>:<aid>` for a characteristic. An IID, once assigned to a key,
//! is never reused for a different key while the map lives.

use crate::storage::Storage;
use crate::Error;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub struct IidManager {
    map: BTreeMap<String, u16>,
    next_iid: u16,
    dirty: bool,
}

const KEY_IID_MAP: &str = "iid_map";
const KEY_IID_NEXT: &str = "iid_next";
const KEY_DB_HASH: &str = "db_hash";

impl IidManager {
    /// Loads persisted state from storage, or starts fresh (`next_iid = 1`) if absent.
    pub fn load(storage: &dyn Storage) -> Result<Self, Error> {
        let mut map = BTreeMap::new();
        if let Some(bytes) = storage.get(KEY_IID_MAP)? {
            let text = String::from_utf8(bytes).map_err(|_| Error::Storage("iid_map not utf8".into()))?;
            for line in text.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    if let Ok(iid) = value.parse::<u16>() {
                        map.insert(key.to_string(), iid);
                    }
                }
            }
        }

        let next_iid = match storage.get(KEY_IID_NEXT)? {
            Some(bytes) if bytes.len() == 2 => u16::from_le_bytes([bytes[0], bytes[1]]),
            _ => 1,
        };

        Ok(IidManager {
            map,
            next_iid,
            dirty: false,
        })
    }

    /// Returns the existing IID for `key`, or assigns and returns `next_iid`, advancing it
    /// (skipping zero on wraparound).
    pub fn get_or_assign(&mut self, key: &str) -> u16 {
        if let Some(iid) = self.map.get(key) {
            return *iid;
        }
        let iid = self.next_iid;
        self.map.insert(key.to_string(), iid);
        self.next_iid = self.next_iid.wrapping_add(1);
        if self.next_iid == 0 {
            self.next_iid = 1;
        }
        self.dirty = true;
        iid
    }

    pub fn next_iid(&self) -> u16 {
        self.next_iid
    }

    /// Computes a stable ordered digest of the current key set and compares it to the stored hash.
    /// Returns `true` (and leaves the new hash ready to be saved via [`Self::update_stored_hash`])
    /// if the structure changed since the last run.
    pub fn has_structure_changed(&self, storage: &dyn Storage, current_hash: &str) -> Result<bool, Error> {
        let stored = storage
            .get(KEY_DB_HASH)?
            .map(|b| String::from_utf8_lossy(&b).into_owned());
        Ok(stored.as_deref() != Some(current_hash))
    }

    pub fn update_stored_hash(&self, storage: &dyn Storage, hash: &str) -> Result<(), Error> {
        storage.set(KEY_DB_HASH, hash.as_bytes())
    }

    /// Persists the key map and `next_iid` if either has changed since the last [`Self::save`].
    pub fn save(&mut self, storage: &dyn Storage) -> Result<(), Error> {
        if !self.dirty {
            return Ok(());
        }
        let mut text = String::new();
        for (key, iid) in &self.map {
            text.push_str(key);
            text.push('=');
            text.push_str(&iid.to_string());
            text.push('\n');
        }
        storage.set(KEY_IID_MAP, text.as_bytes())?;
        storage.set(KEY_IID_NEXT, &self.next_iid.to_le_bytes())?;
        self.dirty = false;
        Ok(())
    }

    pub fn reset(&mut self, storage: &dyn Storage) -> Result<(), Error> {
        self.map.clear();
        self.next_iid = 1;
        self.dirty = true;
        storage.remove(KEY_IID_MAP)?;
        storage.remove(KEY_IID_NEXT)?;
        storage.remove(KEY_DB_HASH)
    }
}

/// Builds the structural key for a service: `S:<type>:<aid>`.
pub fn service_key(service_type: crate::uuid::Uuid128, aid: u64) -> String {
    format!("S:{}:{}", service_type.to_hap_string(), aid)
}

/// Builds the structural key for a characteristic: `C:<type>:<service-type>:<aid>`.
pub fn characteristic_key(
    char_type: crate::uuid::Uuid128,
    service_type: crate::uuid::Uuid128,
    aid: u64,
) -> String {
    format!(
        "C:{}:{}:{}",
        char_type.to_hap_string(),
        service_type.to_hap_string(),
        aid
    )
}

/// Computes the stable ordered digest of an accessory tree's structural keys, used to decide
/// whether the configuration number needs bumping.
pub fn structure_hash(keys: &[String]) -> String {
    let mut sorted = keys.to_vec();
    sorted.sort();
    let mut hasher = Sha256::new();
    for key in &sorted {
        hasher.update(key.as_bytes());
        hasher.update(b"\0");
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn assigns_sequential_iids_and_reuses_for_same_key() {
        let storage = MemoryStorage::new();
        let mut mgr = IidManager::load(&storage).unwrap();
        let a = mgr.get_or_assign("S:3E:1");
        let b = mgr.get_or_assign("C:23:3E:1");
        let a_again = mgr.get_or_assign("S:3E:1");
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(a_again, 1);
    }

    #[test]
    fn never_returns_zero() {
        let storage = MemoryStorage::new();
        let mut mgr = IidManager::load(&storage).unwrap();
        mgr.next_iid = u16::MAX;
        let last = mgr.get_or_assign("X");
        assert_eq!(last, u16::MAX);
        let wrapped = mgr.get_or_assign("Y");
        assert_ne!(wrapped, 0);
    }

    #[test]
    fn persists_and_reloads() {
        let storage = MemoryStorage::new();
        {
            let mut mgr = IidManager::load(&storage).unwrap();
            mgr.get_or_assign("S:3E:1");
            mgr.save(&storage).unwrap();
        }
        let mgr = IidManager::load(&storage).unwrap();
        assert_eq!(mgr.map.get("S:3E:1"), Some(&1));
        assert_eq!(mgr.next_iid, 2);
    }
}
