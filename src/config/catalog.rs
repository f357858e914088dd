//! # Model Catalog
//!
//! Loading of the optional `Models/models.json` catalog document and the
//! per-user storage roots it is searched under.
//!
//! ## Resolution Chain
//!
//! 1. Each storage root is checked for `Models/models.json`
//! 2. The first document that parses wins
//! 3. If no document is found (or none parses), a small built-in default
//!    descriptor set is used instead
//!
//! A missing or malformed catalog is never an error to the caller; it only
//! narrows the set of candidate descriptors.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::descriptor::ModelDescriptor;

/// Subdirectory of a storage root that holds model files and the catalog.
pub const MODELS_DIR: &str = "Models";

/// File name of the catalog document inside [`MODELS_DIR`].
pub const CATALOG_FILE: &str = "models.json";

/// Application directory name used under the per-user storage roots.
const APP_DIR: &str = "reader-upscale";

/// The parsed catalog document: a list of model descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// The built-in default descriptor set, used when no catalog document is
    /// available.
    pub fn builtin() -> Self {
        Self {
            models: vec![ModelDescriptor::builtin_default()],
        }
    }

    /// Parse a catalog document from JSON text.
    pub fn from_json(text: &str) -> crate::error::UpscaleResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load the catalog from the first storage root that has a parsable
    /// document, falling back to the built-in set.
    pub fn load(storage_roots: &[PathBuf]) -> Self {
        for root in storage_roots {
            let path = root.join(MODELS_DIR).join(CATALOG_FILE);
            match try_load(&path) {
                Some(catalog) => {
                    debug!(path = %path.display(), models = catalog.models.len(), "loaded model catalog");
                    return catalog;
                }
                None => continue,
            }
        }
        debug!("no model catalog found, using built-in defaults");
        Self::builtin()
    }
}

fn try_load(path: &Path) -> Option<ModelCatalog> {
    let text = fs::read_to_string(path).ok()?;
    match ModelCatalog::from_json(&text) {
        Ok(catalog) => Some(catalog),
        Err(err) => {
            warn!(path = %path.display(), %err, "ignoring unparsable model catalog");
            None
        }
    }
}

/// Well-known per-user storage roots searched for a `Models/` directory.
///
/// Order matters: earlier roots shadow later ones. Mirrors the platform
/// data-directory conventions (local data dir, roaming data dir, documents).
pub fn default_storage_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(dir) = dirs::data_local_dir() {
        roots.push(dir.join(APP_DIR));
    }
    if let Some(dir) = dirs::data_dir() {
        let candidate = dir.join(APP_DIR);
        if !roots.contains(&candidate) {
            roots.push(candidate);
        }
    }
    if let Some(dir) = dirs::document_dir() {
        roots.push(dir.join(APP_DIR));
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::descriptor::ModelKind;
    use std::fs;

    #[test]
    fn test_catalog_parse() {
        let json = r#"{
            "models": [
                { "name": "tiled-2x", "type": "multiarray", "file": "tiled-2x.model",
                  "config": { "blockSize": 128, "shrinkSize": 8, "scale": 2 } },
                { "name": "whole", "type": "image", "file": "whole.model" }
            ]
        }"#;
        let catalog = ModelCatalog::from_json(json).unwrap();
        assert_eq!(catalog.models.len(), 2);
        assert_eq!(catalog.models[0].kind, ModelKind::Tiled);
        assert_eq!(catalog.models[1].kind, ModelKind::WholeImage);
    }

    #[test]
    fn test_unparsable_catalog_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let models = dir.path().join(MODELS_DIR);
        fs::create_dir_all(&models).unwrap();
        fs::write(models.join(CATALOG_FILE), "{ not json").unwrap();

        let catalog = ModelCatalog::load(&[dir.path().to_path_buf()]);
        assert_eq!(catalog, ModelCatalog::builtin());
    }

    #[test]
    fn test_first_parsable_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        for (dir, name) in [(&first, "a"), (&second, "b")] {
            let models = dir.path().join(MODELS_DIR);
            fs::create_dir_all(&models).unwrap();
            fs::write(
                models.join(CATALOG_FILE),
                format!(
                    r#"{{ "models": [ {{ "name": "{name}", "type": "multiarray", "file": "{name}.model" }} ] }}"#
                ),
            )
            .unwrap();
        }

        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let catalog = ModelCatalog::load(&roots);
        assert_eq!(catalog.models[0].name, "a");
    }

    #[test]
    fn test_missing_catalog_uses_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::load(&[dir.path().to_path_buf()]);
        assert_eq!(catalog.models.len(), 1);
        assert_eq!(catalog.models[0].name, "default");
    }
}
