//! The `Storage` platform contract (§6): a byte-blob key/value store the host must provide.
//!
//! Keys used by the core: `accessory_ltpk`, `accessory_ltsk`, `pairing_<id>`, `pairing_list`,
//! `config_number`, `setup_id`, `gsn`, `iid_map`, `iid_next`, `db_hash`.

use crate::Error;

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), Error>;
    fn remove(&self, key: &str) -> Result<(), Error>;
    fn has(&self, key: &str) -> Result<bool, Error> {
        Ok(self.get(key)?.is_some())
    }
}

/// An in-memory `Storage` used by tests and as a reference implementation for hosts that don't
/// need durability (e.g. transient demo accessories).
#[derive(Default)]
pub struct MemoryStorage {
    inner: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.inner.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        self.inner.lock().unwrap().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.inner.lock().unwrap().remove(key);
        Ok(())
    }
}
