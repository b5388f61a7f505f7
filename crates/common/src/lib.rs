//! Shared error plumbing used across the attache crates.

pub mod error;

pub use error::{AttacheError, Error, FromMessage, Result};
