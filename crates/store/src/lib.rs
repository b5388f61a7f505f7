//! Resource storage and the derived-representation cache.
//!
//! - [`ResourceStore`]: stored binaries with immutable revisions.
//! - [`ResourceLocator`]: resolves serialized references, absence is `None`.
//! - [`TransformDefinition`]: content-addressed description of a transform.
//! - [`RepresentationCache`]: generate-once, publish-atomically artifacts.

pub mod cache;
pub mod error;
pub mod fs_store;
pub mod machine;
pub mod memory_store;
pub mod rasterizer;
pub mod representation;
pub mod resource;
pub mod transform;

pub use {
    cache::{FsRepresentationCache, RepresentationCache},
    error::{Error, Result},
    fs_store::FsResourceStore,
    machine::{DefaultTransformMachine, TransformMachine, TransformOutput},
    memory_store::MemoryResourceStore,
    rasterizer::{PageOptions, PageRasterizer, PdftoppmRasterizer},
    representation::{Artifact, Representation},
    resource::{ByteStream, Located, ResourceLocator, ResourceRef, ResourceStore, Revision},
    transform::{TransformDefinition, TransformKind},
};
