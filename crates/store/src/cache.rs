//! Derived-representation cache.
//!
//! Entries are keyed by resource, revision, and definition id. A persisted
//! entry is a directory:
//! ```text
//! <root>/<ref>/r<revision>/<definition-id>/manifest.json
//! <root>/<ref>/r<revision>/<definition-id>/artifact.<ext> | page-0001.<ext> ...
//! ```
//! It is assembled under a temp name and renamed into place, so readers see
//! either no entry or a complete one. When two writers race, the first rename
//! wins and the loser discards its copy; transforms are idempotent, so both
//! copies were identical anyway.
//!
//! Non-persisted entries live in memory, one per resource and definition:
//! publishing for a newer revision replaces the entry of the older one.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    attache_media::mime,
    bytes::Bytes,
    dashmap::DashMap,
    serde::{Deserialize, Serialize},
    tokio::{
        fs,
        sync::{Mutex, OwnedMutexGuard},
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use attache_metrics::{cache as cache_metrics, counter, histogram, labels};

use crate::{
    Error, Result,
    fs_store::write_atomic,
    machine::{TransformMachine, TransformOutput},
    representation::{Artifact, Representation},
    resource::{ResourceRef, ResourceStore, Revision},
    transform::TransformDefinition,
};

/// Default bound on a single transform invocation.
pub const DEFAULT_TRANSFORM_TIMEOUT: Duration = Duration::from_secs(30);

const MANIFEST: &str = "manifest.json";

/// Ensures and serves derived representations.
///
/// `ensure` never reports failure: a transform that cannot run simply leaves
/// no entry behind, and the next `get` answers `None`.
#[async_trait]
pub trait RepresentationCache: Send + Sync {
    /// Generate and publish the entry unless it already exists.
    async fn ensure(&self, resource: &ResourceRef, definition: &TransformDefinition);

    /// Fetch a published entry without generating anything.
    async fn get(&self, resource: &ResourceRef, definition: &TransformDefinition) -> Option<Representation>;

    /// Public URL of a published entry.
    async fn url(&self, resource: &ResourceRef, definition: &TransformDefinition) -> Option<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    definition_id: String,
    kind: String,
    paged: bool,
    files: Vec<String>,
}

pub struct FsRepresentationCache {
    root: PathBuf,
    store: Arc<dyn ResourceStore>,
    machine: Arc<dyn TransformMachine>,
    url_base: Option<String>,
    timeout: Duration,
    /// Entries of non-persisted definitions, with the revision they belong to.
    volatile: DashMap<String, (u32, Representation)>,
    /// Per-key locks when single-flight is enabled; removed once uncontended.
    flights: Option<DashMap<String, Arc<Mutex<()>>>>,
}

/// A held single-flight lock. Dropping it releases the lock and removes the
/// map entry when nobody else is waiting on it.
struct Flight<'a> {
    flights: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'a> Flight<'a> {
    async fn acquire(flights: &'a DashMap<String, Arc<Mutex<()>>>, key: String) -> Self {
        let lock = Arc::clone(flights.entry(key.clone()).or_default().value());
        let guard = lock.lock_owned().await;
        Self {
            flights,
            key,
            guard: Some(guard),
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.flights
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// An entry directory that has not been published yet. It is removed on drop,
/// which also covers a cancelled `ensure`.
struct TempEntry {
    path: PathBuf,
    published: bool,
}

impl Drop for TempEntry {
    fn drop(&mut self) {
        if !self.published {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

impl FsRepresentationCache {
    pub fn new(root: PathBuf, store: Arc<dyn ResourceStore>, machine: Arc<dyn TransformMachine>) -> Self {
        Self {
            root,
            store,
            machine,
            url_base: None,
            timeout: DEFAULT_TRANSFORM_TIMEOUT,
            volatile: DashMap::new(),
            flights: None,
        }
    }

    /// Base for representation URLs: `<base>/<definition-id>/<ref>`.
    #[must_use]
    pub fn with_url_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.url_base = (!base.is_empty()).then_some(base);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Serialize concurrent `ensure` calls for the same key.
    #[must_use]
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.flights = enabled.then(DashMap::new);
        self
    }

    fn entry_dir(&self, resource: &ResourceRef, revision: &Revision, definition: &TransformDefinition) -> PathBuf {
        self.root
            .join(resource.as_str())
            .join(format!("r{}", revision.number))
            .join(definition.id())
    }

    fn flight_key(resource: &ResourceRef, revision: &Revision, definition: &TransformDefinition) -> String {
        format!("{resource}/r{}/{}", revision.number, definition.id())
    }

    fn volatile_key(resource: &ResourceRef, definition: &TransformDefinition) -> String {
        format!("{resource}/{}", definition.id())
    }

    async fn current(&self, resource: &ResourceRef) -> Option<Revision> {
        match self.store.current_revision(resource).await {
            Ok(revision) => revision,
            Err(e) => {
                debug!(%resource, error = %e, "cannot read current revision");
                None
            },
        }
    }

    async fn exists(&self, resource: &ResourceRef, revision: &Revision, definition: &TransformDefinition) -> bool {
        if definition.persist() {
            let manifest = self.entry_dir(resource, revision, definition).join(MANIFEST);
            fs::try_exists(manifest).await.unwrap_or(false)
        } else {
            self.volatile
                .get(&Self::volatile_key(resource, definition))
                .is_some_and(|entry| entry.0 == revision.number)
        }
    }

    async fn generate(
        &self,
        resource: &ResourceRef,
        revision: &Revision,
        definition: &TransformDefinition,
    ) -> Result<TransformOutput> {
        let source = self.store.read_revision(resource, revision.number).await?;
        let started = Instant::now();
        let run = self.machine.run(source, &revision.mime_type, definition.kind());
        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(attache_common::Error::timeout(
                    format!("{} transform", definition.kind().name()),
                    self.timeout,
                )
                .into());
            },
        };

        #[cfg(feature = "metrics")]
        histogram!(
            cache_metrics::TRANSFORM_DURATION_SECONDS,
            labels::KIND => definition.kind().name()
        )
        .record(started.elapsed().as_secs_f64());

        debug!(
            %resource,
            definition = definition.id(),
            kind = definition.kind().name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transform finished"
        );
        Ok(output)
    }

    async fn publish(
        &self,
        resource: &ResourceRef,
        revision: &Revision,
        definition: &TransformDefinition,
        output: TransformOutput,
    ) -> Result<()> {
        if !definition.persist() {
            let representation = match output {
                TransformOutput::Single(bytes) => Representation::Single(Artifact::Memory(Bytes::from(bytes))),
                TransformOutput::Pages(pages) => Representation::Pages(
                    pages
                        .into_iter()
                        .map(|p| Artifact::Memory(Bytes::from(p)))
                        .collect(),
                ),
            };
            let mut entry = self
                .volatile
                .entry(Self::volatile_key(resource, definition))
                .or_insert_with(|| (revision.number, representation.clone()));
            if entry.0 < revision.number {
                *entry = (revision.number, representation);
            }
            return Ok(());
        }

        let final_dir = self.entry_dir(resource, revision, definition);
        let parent = final_dir
            .parent()
            .ok_or_else(|| Error::message("cache entry has no parent directory"))?;
        fs::create_dir_all(parent).await?;

        let temp_dir = parent.join(format!("{}.tmp-{}", definition.id(), uuid::Uuid::new_v4()));
        fs::create_dir(&temp_dir).await?;
        let mut temp = TempEntry {
            path: temp_dir,
            published: false,
        };

        write_entry(&temp.path, definition, output).await?;

        if let Err(e) = fs::rename(&temp.path, &final_dir).await {
            drop(temp);
            if fs::try_exists(final_dir.join(MANIFEST)).await.unwrap_or(false) {
                debug!(%resource, definition = definition.id(), "another writer published first");
                #[cfg(feature = "metrics")]
                counter!(cache_metrics::PUBLISH_RACES_TOTAL).increment(1);
                return Ok(());
            }
            return Err(e.into());
        }
        temp.published = true;
        Ok(())
    }

    async fn load(&self, resource: &ResourceRef, revision: &Revision, definition: &TransformDefinition) -> Result<Option<Representation>> {
        if !definition.persist() {
            return Ok(self
                .volatile
                .get(&Self::volatile_key(resource, definition))
                .filter(|entry| entry.0 == revision.number)
                .map(|entry| entry.1.clone()));
        }

        let dir = self.entry_dir(resource, revision, definition);
        let raw = match fs::read(dir.join(MANIFEST)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&raw)?;
        let mut artifacts = manifest
            .files
            .iter()
            .map(|name| Artifact::File(dir.join(name)));

        if manifest.paged {
            Ok(Some(Representation::Pages(artifacts.collect())))
        } else {
            Ok(artifacts.next().map(Representation::Single))
        }
    }
}

#[async_trait]
impl RepresentationCache for FsRepresentationCache {
    async fn ensure(&self, resource: &ResourceRef, definition: &TransformDefinition) {
        let Some(revision) = self.current(resource).await else {
            return;
        };

        let _flight = match self.flights {
            Some(ref flights) => {
                Some(Flight::acquire(flights, Self::flight_key(resource, &revision, definition)).await)
            },
            None => None,
        };

        if self.exists(resource, &revision, definition).await {
            return;
        }

        #[cfg(feature = "metrics")]
        counter!(cache_metrics::MISSES_TOTAL).increment(1);

        let result = match self.generate(resource, &revision, definition).await {
            Ok(output) => self.publish(resource, &revision, definition, output).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => info!(
                %resource,
                revision = revision.number,
                definition = definition.id(),
                kind = definition.kind().name(),
                "representation published"
            ),
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(cache_metrics::FAILURES_TOTAL).increment(1);
                warn!(
                    %resource,
                    definition = definition.id(),
                    kind = definition.kind().name(),
                    timed_out = e.is_timeout(),
                    error = %e,
                    "representation could not be generated"
                );
            },
        }
    }

    async fn get(&self, resource: &ResourceRef, definition: &TransformDefinition) -> Option<Representation> {
        let revision = self.current(resource).await?;
        match self.load(resource, &revision, definition).await {
            Ok(Some(representation)) => {
                #[cfg(feature = "metrics")]
                counter!(cache_metrics::HITS_TOTAL).increment(1);
                Some(representation)
            },
            Ok(None) => None,
            Err(e) => {
                warn!(%resource, definition = definition.id(), error = %e, "unreadable cache entry");
                None
            },
        }
    }

    async fn url(&self, resource: &ResourceRef, definition: &TransformDefinition) -> Option<String> {
        let base = self.url_base.as_ref()?;
        let representation = self.get(resource, definition).await?;
        let base = base.trim_end_matches('/');
        match representation {
            Representation::Single(_) => Some(format!("{base}/{}/{resource}", definition.id())),
            Representation::Pages(pages) if !pages.is_empty() => {
                Some(format!("{base}/{}/{resource}/1", definition.id()))
            },
            Representation::Pages(_) => None,
        }
    }
}

async fn write_entry(dir: &Path, definition: &TransformDefinition, output: TransformOutput) -> Result<()> {
    let (paged, blobs) = match output {
        TransformOutput::Single(bytes) => (false, vec![bytes]),
        TransformOutput::Pages(pages) => (true, pages),
    };

    let mut files = Vec::with_capacity(blobs.len());
    for (index, blob) in blobs.iter().enumerate() {
        let ext = mime::extension_for_mime(mime::sniff_content_type(blob).unwrap_or_default());
        let name = if paged {
            format!("page-{:04}.{ext}", index + 1)
        } else {
            format!("artifact.{ext}")
        };
        fs::write(dir.join(&name), blob).await?;
        files.push(name);
    }

    let manifest = Manifest {
        definition_id: definition.id().to_string(),
        kind: definition.kind().name().to_string(),
        paged,
        files,
    };
    // The directory is still private; the rename that publishes it is the
    // atomic step, but the manifest is written last all the same.
    write_atomic(&dir.join(MANIFEST), &serde_json::to_vec_pretty(&manifest)?).await
}
