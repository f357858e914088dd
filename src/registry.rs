//! # Descriptor Registry
//!
//! Resolution of the active model descriptor. The registry pins one
//! "preferred" descriptor across calls and re-validates it (file still
//! resolvable) every time; when the pin goes stale it reloads the catalog and
//! picks a fresh candidate.
//!
//! ## Selection Order
//!
//! Among descriptors whose backing file resolves on disk:
//! 1. a descriptor whose file matches the well-known default file name
//! 2. the first resolvable catalog entry
//! 3. the built-in default descriptor, if its file happens to resolve
//! 4. none — the caller skips upscaling silently
//!
//! ## Path Resolution
//!
//! - Absolute paths and `~`-prefixed paths are used as given (after home
//!   expansion)
//! - Relative paths are searched under `<root>/Models/` in each storage
//!   root, first as the literal relative path, then as just the file name
//!
//! Registry state is owned by the instance and injected into its
//! [`crate::manager::ModelManager`]; there is no process-wide singleton, so
//! tests can run several configurations side by side.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::catalog::{ModelCatalog, MODELS_DIR};
use crate::config::descriptor::ModelDescriptor;

/// Well-known default model file name, preferred when present.
pub const DEFAULT_MODEL_FILE: &str = "default.model";

/// A descriptor paired with the absolute path its file resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub descriptor: ModelDescriptor,
    pub path: PathBuf,
}

/// Stateful resolver for the active model descriptor.
pub struct DescriptorRegistry {
    storage_roots: Vec<PathBuf>,
    preferred: Option<ModelDescriptor>,
}

impl DescriptorRegistry {
    /// Create a registry over the given storage roots.
    pub fn new(storage_roots: Vec<PathBuf>) -> Self {
        Self {
            storage_roots,
            preferred: None,
        }
    }

    /// Create a registry over the platform's default storage roots.
    pub fn with_default_roots() -> Self {
        Self::new(crate::config::catalog::default_storage_roots())
    }

    /// Resolve the active descriptor, re-validating the pinned preference
    /// and re-selecting from the catalog when it has gone stale.
    pub fn resolve_active(&mut self) -> Option<ResolvedModel> {
        // Fast path: the pinned descriptor still resolves.
        if let Some(preferred) = &self.preferred {
            if let Some(path) = self.resolve_path(&preferred.file) {
                return Some(ResolvedModel {
                    descriptor: preferred.clone(),
                    path,
                });
            }
            debug!(name = %preferred.name, "pinned model no longer resolves, re-selecting");
            self.preferred = None;
        }

        let selected = self.select_candidate()?;
        self.preferred = Some(selected.descriptor.clone());
        debug!(name = %selected.descriptor.name, path = %selected.path.display(), "pinned model descriptor");
        Some(selected)
    }

    /// Load the catalog and pick the best resolvable candidate.
    fn select_candidate(&self) -> Option<ResolvedModel> {
        let catalog = ModelCatalog::load(&self.storage_roots);
        let resolvable: Vec<ResolvedModel> = catalog
            .models
            .iter()
            .filter_map(|d| {
                self.resolve_path(&d.file).map(|path| ResolvedModel {
                    descriptor: d.clone(),
                    path,
                })
            })
            .collect();

        if let Some(default_named) = resolvable.iter().find(|r| {
            Path::new(&r.descriptor.file)
                .file_name()
                .is_some_and(|n| n == DEFAULT_MODEL_FILE)
        }) {
            return Some(default_named.clone());
        }
        if let Some(first) = resolvable.into_iter().next() {
            return Some(first);
        }

        // Last resort: the hardcoded default, if its file exists anywhere.
        let fallback = ModelDescriptor::builtin_default();
        self.resolve_path(&fallback.file).map(|path| ResolvedModel {
            descriptor: fallback,
            path,
        })
    }

    /// Resolve a descriptor file reference to an existing absolute path.
    pub fn resolve_path(&self, file: &str) -> Option<PathBuf> {
        let raw = Path::new(file);

        if raw.is_absolute() {
            return raw.is_file().then(|| raw.to_path_buf());
        }
        if let Some(rest) = file.strip_prefix("~/") {
            let expanded = dirs::home_dir()?.join(rest);
            return expanded.is_file().then_some(expanded);
        }

        for root in &self.storage_roots {
            let models = root.join(MODELS_DIR);
            let literal = models.join(raw);
            if literal.is_file() {
                return Some(literal);
            }
            if let Some(name) = raw.file_name() {
                let by_name = models.join(name);
                if by_name.is_file() {
                    return Some(by_name);
                }
            }
        }
        None
    }
}
