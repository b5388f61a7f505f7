//! Media primitives: image optimization and square transforms, magic-number
//! MIME sniffing, and data URL encoding.

pub mod data_url;
pub mod error;
pub mod image_ops;
pub mod mime;

pub use {
    error::{Error, Result},
    image_ops::{BoundedImageOptimizer, ImageOptimizer, OptimizedImage},
};
