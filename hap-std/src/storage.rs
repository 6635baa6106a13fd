//! A [`Storage`] implementation that persists the key/value store as a single JSON file, with an
//! in-memory cache mirroring [`hap_core::storage::MemoryStorage`]'s locking but write-through to
//! disk on every mutation.

use hap_core::storage::Storage;
use hap_core::Error;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct FileStorage {
    path: PathBuf,
    cache: Mutex<HashMap<String, Vec<u8>>>,
}

impl FileStorage {
    /// Loads (or creates) the store at `path`. The file holds a JSON object mapping each key to
    /// its value, base64-encoded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let cache = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let encoded: HashMap<String, String> =
                serde_json::from_str(&contents).map_err(|e| Error::Storage(e.to_string()))?;
            encoded
                .into_iter()
                .map(|(k, v)| {
                    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, v)
                        .map_err(|e| Error::Storage(e.to_string()))?;
                    Ok((k, bytes))
                })
                .collect::<Result<HashMap<_, _>, Error>>()?
        } else {
            HashMap::new()
        };
        Ok(FileStorage {
            path,
            cache: Mutex::new(cache),
        })
    }

    fn flush(&self, cache: &HashMap<String, Vec<u8>>) -> Result<(), Error> {
        let encoded: HashMap<&str, String> = cache
            .iter()
            .map(|(k, v)| (k.as_str(), base64::Engine::encode(&base64::engine::general_purpose::STANDARD, v)))
            .collect();
        let json = serde_json::to_string_pretty(&encoded).map_err(|e| Error::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.cache.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        let mut cache = self.cache.lock().unwrap();
        cache.insert(key.to_string(), value.to_vec());
        self.flush(&cache)
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        let mut cache = self.cache.lock().unwrap();
        cache.remove(key);
        self.flush(&cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set("accessory_ltsk", &[1, 2, 3]).unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("accessory_ltsk").unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn remove_clears_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("store.json")).unwrap();
        storage.set("k", b"v").unwrap();
        storage.remove("k").unwrap();
        assert_eq!(storage.get("k").unwrap(), None);
    }
}
