//! Filesystem-backed resource store.
//!
//! Layout under the root directory:
//! ```text
//! <root>/<ref>/meta.json     revision list, newest last
//! <root>/<ref>/rev-<n>.bin   bytes of revision n
//! ```
//! Every file is written to a temp name, flushed, and renamed into place, so a
//! reader sees either the previous state or the complete new one. Appending a
//! revision is serialized per resource: the number is claimed, the blob is
//! written, and `meta.json` is rewritten under one lock.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_trait::async_trait,
    dashmap::DashMap,
    serde::{Deserialize, Serialize},
    tokio::{fs, io::AsyncWriteExt, sync::Mutex},
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    memory_store::now_secs,
    resource::{ByteStream, ResourceRef, ResourceStore, Revision},
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Meta {
    revisions: Vec<Revision>,
}

pub struct FsResourceStore {
    root: PathBuf,
    url_base: Option<String>,
    /// Held while a revision is appended; entries live only while contended.
    writers: DashMap<ResourceRef, Arc<Mutex<()>>>,
}

impl FsResourceStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            url_base: None,
            writers: DashMap::new(),
        }
    }

    /// Base for `src` URLs (`<base>/<ref>`). Empty strings disable URLs.
    #[must_use]
    pub fn with_url_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.url_base = (!base.is_empty()).then_some(base);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_for(&self, resource: &ResourceRef) -> PathBuf {
        self.root.join(resource.as_str())
    }

    fn blob_path(&self, resource: &ResourceRef, number: u32) -> PathBuf {
        self.dir_for(resource).join(format!("rev-{number}.bin"))
    }

    async fn read_meta(&self, resource: &ResourceRef) -> Result<Option<Meta>> {
        let path = self.dir_for(resource).join("meta.json");
        match fs::read(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a revision under the resource's writer lock. With
    /// `must_exist`, a resource without `meta.json` is `NotFound`.
    async fn append_revision(
        &self,
        resource: &ResourceRef,
        must_exist: bool,
        bytes: Vec<u8>,
        mime_type: &str,
        title: &str,
    ) -> Result<Revision> {
        let lock = Arc::clone(self.writers.entry(resource.clone()).or_default().value());
        let guard = lock.lock_owned().await;
        let result = self
            .append_locked(resource, must_exist, bytes, mime_type, title)
            .await;
        drop(guard);
        self.writers
            .remove_if(resource, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn append_locked(
        &self,
        resource: &ResourceRef,
        must_exist: bool,
        bytes: Vec<u8>,
        mime_type: &str,
        title: &str,
    ) -> Result<Revision> {
        let mut meta = match self.read_meta(resource).await? {
            Some(meta) => meta,
            None if must_exist => return Err(Error::not_found(resource.as_str())),
            None => Meta::default(),
        };
        let revision = Revision {
            number: meta.revisions.last().map_or(1, |r| r.number + 1),
            mime_type: mime_type.to_string(),
            size_bytes: bytes.len() as u64,
            title: title.to_string(),
            created_at: now_secs(),
        };

        let dir = self.dir_for(resource);
        fs::create_dir_all(&dir).await?;
        // Blob first: meta must never point at a revision that is not on disk.
        write_atomic(&self.blob_path(resource, revision.number), &bytes).await?;
        meta.revisions.push(revision.clone());
        write_atomic(&dir.join("meta.json"), &serde_json::to_vec_pretty(&meta)?).await?;

        debug!(%resource, revision = revision.number, size = revision.size_bytes, "stored revision");
        Ok(revision)
    }
}

#[async_trait]
impl ResourceStore for FsResourceStore {
    async fn find(&self, serialized: &str) -> Option<ResourceRef> {
        let resource = ResourceRef::parse(serialized)?;
        fs::try_exists(self.dir_for(&resource).join("meta.json"))
            .await
            .unwrap_or(false)
            .then_some(resource)
    }

    async fn current_revision(&self, resource: &ResourceRef) -> Result<Option<Revision>> {
        Ok(self
            .read_meta(resource)
            .await?
            .and_then(|meta| meta.revisions.last().cloned()))
    }

    async fn stream_revision(&self, resource: &ResourceRef, number: u32) -> Result<ByteStream> {
        match fs::File::open(self.blob_path(resource, number)).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(format!("{resource}@r{number}")))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn src(&self, resource: &ResourceRef) -> Result<Option<String>> {
        let Some(ref base) = self.url_base else {
            return Ok(None);
        };
        if self.current_revision(resource).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(format!("{}/{resource}", base.trim_end_matches('/'))))
    }

    async fn store(&self, bytes: Vec<u8>, mime_type: &str, title: &str) -> Result<ResourceRef> {
        let resource = ResourceRef::generate();
        self.append_revision(&resource, false, bytes, mime_type, title)
            .await?;
        info!(%resource, mime_type, title, "stored new resource");
        Ok(resource)
    }

    async fn store_revision(
        &self,
        resource: &ResourceRef,
        bytes: Vec<u8>,
        mime_type: &str,
        title: &str,
    ) -> Result<Revision> {
        self.append_revision(resource, true, bytes, mime_type, title)
            .await
    }
}

/// Write to a unique temp file next to `path`, fsync, then rename over it.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_name = format!(".tmp.{}", uuid::Uuid::new_v4());
    let temp_path = path.with_file_name(
        path.file_name()
            .map(|n| format!("{}{temp_name}", n.to_string_lossy()))
            .unwrap_or_else(|| temp_name.clone()),
    );
    {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
    }
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}
