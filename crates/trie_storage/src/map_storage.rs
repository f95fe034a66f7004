use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::MapStorageError;
use crate::storage_trait::KvStore;

/// Reference in-memory [`KvStore`]. Used by tests and by anything that does not need
/// cross-process durability.
#[derive(Debug, Default, Clone)]
pub struct MapStorage {
    map: HashMap<Vec<u8>, Vec<u8>>,
}

impl MapStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<(Vec<u8>, Vec<u8>)> for MapStorage {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>>(iter: I) -> Self {
        Self { map: HashMap::from_iter(iter) }
    }
}

#[async_trait]
impl KvStore for MapStorage {
    type Error = MapStorageError;

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.map.get(key).cloned())
    }

    async fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), Self::Error> {
        self.map.insert(key, value);
        Ok(())
    }

    async fn delete(&mut self, key: &[u8]) -> Result<(), Self::Error> {
        self.map.remove(key);
        Ok(())
    }

    async fn iterate(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Self::Error> {
        Ok(self.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_delete_round_trip() {
        let mut store = MapStorage::new();
        assert_eq!(store.get(b"k").await.unwrap(), None);

        store.set(b"k".to_vec(), b"v".to_vec()).await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(b"v".to_vec()));

        store.delete(b"k").await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn iterate_returns_every_entry() {
        let mut store = MapStorage::new();
        store.set(b"a".to_vec(), b"1".to_vec()).await.unwrap();
        store.set(b"b".to_vec(), b"2".to_vec()).await.unwrap();

        let mut entries = store.iterate().await.unwrap();
        entries.sort();
        assert_eq!(entries, vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]);
    }
}
