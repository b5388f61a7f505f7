//! Stored resources, their revisions, and the store/locator contracts.

use std::{fmt, sync::Arc};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    tokio::io::{AsyncRead, AsyncReadExt},
    tracing::debug,
};

use crate::{Error, Result};

/// Byte stream over a revision or an artifact.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

const MAX_REF_LEN: usize = 128;

/// Opaque reference to a stored resource.
///
/// The serialized form is a token of `[A-Za-z0-9_-]`, at most 128 characters,
/// which makes it safe to embed in paths and URLs without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceRef(String);

impl ResourceRef {
    /// Parse a serialized reference. Malformed input yields `None`.
    #[must_use]
    pub fn parse(serialized: &str) -> Option<Self> {
        let valid = !serialized.is_empty()
            && serialized.len() <= MAX_REF_LEN
            && serialized
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        valid.then(|| Self(serialized.to_string()))
    }

    /// Fresh random reference for a new upload.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value).ok_or_else(|| Error::message(format!("invalid resource reference: {value:?}")))
    }
}

impl From<ResourceRef> for String {
    fn from(value: ResourceRef) -> Self {
        value.0
    }
}

/// Immutable metadata of one stored version of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// 1-based, increases with every upload to the same resource.
    pub number: u32,
    pub mime_type: String,
    pub size_bytes: u64,
    pub title: String,
    /// Unix seconds.
    pub created_at: u64,
}

/// Storage service consumed by the representation pipeline.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Look up a serialized reference. `None` when malformed or unknown.
    async fn find(&self, serialized: &str) -> Option<ResourceRef>;

    /// Current revision, `None` when the resource has none.
    async fn current_revision(&self, resource: &ResourceRef) -> Result<Option<Revision>>;

    /// Stream the bytes of one revision. Revisions are immutable, so the
    /// bytes always match the metadata of `number`.
    async fn stream_revision(&self, resource: &ResourceRef, number: u32) -> Result<ByteStream>;

    /// Stream the bytes of the current revision.
    async fn stream(&self, resource: &ResourceRef) -> Result<ByteStream> {
        let revision = self
            .current_revision(resource)
            .await?
            .ok_or_else(|| Error::not_found(resource.as_str()))?;
        self.stream_revision(resource, revision.number).await
    }

    /// Canonical URL of the current revision, `None` when the store cannot
    /// produce one.
    async fn src(&self, resource: &ResourceRef) -> Result<Option<String>>;

    /// Store bytes as a new resource with revision 1.
    async fn store(&self, bytes: Vec<u8>, mime_type: &str, title: &str) -> Result<ResourceRef>;

    /// Replace the content of an existing resource with a new revision.
    async fn store_revision(
        &self,
        resource: &ResourceRef,
        bytes: Vec<u8>,
        mime_type: &str,
        title: &str,
    ) -> Result<Revision>;

    /// Read the current revision into memory.
    async fn read_all(&self, resource: &ResourceRef) -> Result<Vec<u8>> {
        let mut stream = self.stream(resource).await?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Read one revision into memory.
    async fn read_revision(&self, resource: &ResourceRef, number: u32) -> Result<Vec<u8>> {
        let mut stream = self.stream_revision(resource, number).await?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

/// A reference together with the revision it currently resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub resource: ResourceRef,
    pub revision: Revision,
}

/// Read-only resolution of serialized references.
///
/// Never fails: every kind of absence, including store errors while looking
/// up the revision, comes back as `None`.
#[derive(Clone)]
pub struct ResourceLocator {
    store: Arc<dyn ResourceStore>,
}

impl ResourceLocator {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub async fn resolve(&self, serialized: &str) -> Option<Located> {
        let Some(resource) = self.store.find(serialized).await else {
            debug!(reference = serialized, "resource reference does not resolve");
            return None;
        };
        match self.store.current_revision(&resource).await {
            Ok(Some(revision)) => Some(Located { resource, revision }),
            Ok(None) => {
                debug!(%resource, "resource has no current revision");
                None
            },
            Err(e) => {
                debug!(%resource, error = %e, "failed to read current revision");
                None
            },
        }
    }
}
