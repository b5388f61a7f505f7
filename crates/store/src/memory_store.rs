use std::{
    collections::HashMap,
    io::Cursor,
    time::{SystemTime, UNIX_EPOCH},
};

use {async_trait::async_trait, bytes::Bytes, tokio::sync::RwLock};

use crate::{
    Error, Result,
    resource::{ByteStream, ResourceRef, ResourceStore, Revision},
};

/// In-memory resource store for embedding and tests.
#[derive(Default)]
pub struct MemoryResourceStore {
    resources: RwLock<HashMap<ResourceRef, Vec<(Revision, Bytes)>>>,
    url_base: Option<String>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base used by `src`; without one the store produces no URLs. Empty
    /// strings disable URLs.
    #[must_use]
    pub fn with_url_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.url_base = (!base.is_empty()).then_some(base);
        self
    }

    /// Store under a caller-chosen reference.
    pub async fn insert(
        &self,
        resource: ResourceRef,
        bytes: Vec<u8>,
        mime_type: &str,
        title: &str,
    ) -> Revision {
        let mut resources = self.resources.write().await;
        let revisions = resources.entry(resource).or_default();
        let revision = Revision {
            number: revisions.len() as u32 + 1,
            mime_type: mime_type.to_string(),
            size_bytes: bytes.len() as u64,
            title: title.to_string(),
            created_at: now_secs(),
        };
        revisions.push((revision.clone(), Bytes::from(bytes)));
        revision
    }

    async fn current(&self, resource: &ResourceRef) -> Option<(Revision, Bytes)> {
        self.resources
            .read()
            .await
            .get(resource)
            .and_then(|revs| revs.last().cloned())
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn find(&self, serialized: &str) -> Option<ResourceRef> {
        let resource = ResourceRef::parse(serialized)?;
        self.resources
            .read()
            .await
            .contains_key(&resource)
            .then_some(resource)
    }

    async fn current_revision(&self, resource: &ResourceRef) -> Result<Option<Revision>> {
        Ok(self.current(resource).await.map(|(rev, _)| rev))
    }

    async fn stream_revision(&self, resource: &ResourceRef, number: u32) -> Result<ByteStream> {
        let bytes = self
            .resources
            .read()
            .await
            .get(resource)
            .and_then(|revs| revs.iter().find(|(rev, _)| rev.number == number))
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| Error::not_found(format!("{resource}@r{number}")))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn src(&self, resource: &ResourceRef) -> Result<Option<String>> {
        if self.current(resource).await.is_none() {
            return Ok(None);
        }
        Ok(self
            .url_base
            .as_ref()
            .map(|base| format!("{}/{resource}", base.trim_end_matches('/'))))
    }

    async fn store(&self, bytes: Vec<u8>, mime_type: &str, title: &str) -> Result<ResourceRef> {
        let resource = ResourceRef::generate();
        self.insert(resource.clone(), bytes, mime_type, title).await;
        Ok(resource)
    }

    async fn store_revision(
        &self,
        resource: &ResourceRef,
        bytes: Vec<u8>,
        mime_type: &str,
        title: &str,
    ) -> Result<Revision> {
        if self.current(resource).await.is_none() {
            return Err(Error::not_found(resource.as_str()));
        }
        Ok(self.insert(resource.clone(), bytes, mime_type, title).await)
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revisions_replace_content() {
        let store = MemoryResourceStore::new().with_url_base("https://lms.example/storage/");
        let r = store.store(b"v1".to_vec(), "text/plain", "a.txt").await.unwrap();
        let rev = store
            .store_revision(&r, b"version 2".to_vec(), "text/plain", "a.txt")
            .await
            .unwrap();
        assert_eq!(rev.number, 2);
        assert_eq!(store.read_all(&r).await.unwrap(), b"version 2");
        assert_eq!(
            store.src(&r).await.unwrap().unwrap(),
            format!("https://lms.example/storage/{r}")
        );
    }

    #[tokio::test]
    async fn unknown_resources() {
        let store = MemoryResourceStore::new();
        let r = ResourceRef::generate();
        assert!(store.find(r.as_str()).await.is_none());
        assert!(matches!(
            store.stream(&r).await.err().unwrap(),
            Error::NotFound { .. }
        ));
        assert!(store.store_revision(&r, vec![], "a/b", "x").await.is_err());
    }

    #[tokio::test]
    async fn no_url_base_means_no_src() {
        let store = MemoryResourceStore::new();
        let r = store.store(b"x".to_vec(), "text/plain", "x").await.unwrap();
        assert!(store.src(&r).await.unwrap().is_none());

        let empty = MemoryResourceStore::new().with_url_base("");
        let r = empty.store(b"x".to_vec(), "text/plain", "x").await.unwrap();
        assert!(empty.src(&r).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn earlier_revisions_stay_readable() {
        let store = MemoryResourceStore::new();
        let r = store.store(b"first".to_vec(), "text/plain", "a.txt").await.unwrap();
        store
            .store_revision(&r, b"second".to_vec(), "text/plain", "a.txt")
            .await
            .unwrap();
        assert_eq!(store.read_revision(&r, 1).await.unwrap(), b"first");
        assert_eq!(store.read_revision(&r, 2).await.unwrap(), b"second");
        assert!(store.read_revision(&r, 3).await.is_err());
    }
}
