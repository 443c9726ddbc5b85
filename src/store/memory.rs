use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::{collections::BTreeMap, sync::Mutex};

use super::BlobStore;

type Key = (String, String);

/// In-process blob store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<Key, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all containers.
    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, container: &str, path: &str) -> bool {
        self.objects
            .lock()
            .map(|o| o.contains_key(&(container.to_string(), path.to_string())))
            .unwrap_or(false)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, container: &str, path: &str) -> Result<Bytes> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("blob store lock poisoned"))?;
        objects
            .get(&(container.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("object {}/{} not found", container, path))
    }

    async fn put(&self, container: &str, path: &str, data: Bytes) -> Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("blob store lock poisoned"))?;
        objects.insert((container.to_string(), path.to_string()), data);
        Ok(())
    }

    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("blob store lock poisoned"))?;
        Ok(objects
            .keys()
            .filter(|(c, p)| c == container && p.starts_with(prefix))
            .map(|(_, p)| p.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn objects_are_scoped_by_container() -> Result<()> {
        let store = MemoryBlobStore::new();
        store.put("bronze", "owid/a.csv", Bytes::from_static(b"a")).await?;
        store.put("silver", "owid/a.csv", Bytes::from_static(b"b")).await?;

        assert_eq!(store.get("bronze", "owid/a.csv").await?, Bytes::from_static(b"a"));
        assert_eq!(store.list("silver", "owid/").await?, vec!["owid/a.csv".to_string()]);
        assert!(store.get("gold", "owid/a.csv").await.is_err());
        assert_eq!(store.len(), 2);
        Ok(())
    }
}
