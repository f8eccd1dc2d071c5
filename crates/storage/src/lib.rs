//! Object storage collaborators for the scan pipeline.
//!
//! A [`StorageBackend`] does exactly two things: it lists the objects in a
//! bucket as [`ObjectInfo`] descriptors, and it downloads a single object to
//! a local temporary file ([`Download`]) that the caller owns.

pub mod backend;
pub mod error;
mod object;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::object::{Download, ObjectInfo};
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
