//! # Model Configuration
//!
//! Descriptor types for available upscaling models and the on-disk catalog
//! document they are loaded from.

pub mod catalog;
pub mod descriptor;

pub use catalog::{ModelCatalog, default_storage_roots};
pub use descriptor::{ModelDescriptor, ModelKind, TilingConfig};
