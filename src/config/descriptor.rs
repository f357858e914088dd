//! # Model Descriptors
//!
//! Typed configuration records identifying a model file and the tensor/tiling
//! parameters needed to drive it. Descriptors are plain values: they carry no
//! loaded model state and are cheap to clone and compare.
//!
//! ## Catalog Wire Format
//!
//! Descriptors are deserialized from the catalog document described in
//! [`crate::config::catalog`]:
//!
//! ```json
//! {
//!   "name": "waifu-denoise-2x",
//!   "type": "multiarray",
//!   "file": "waifu-denoise-2x.model",
//!   "config": {
//!     "inputName": "input",
//!     "outputName": "output",
//!     "blockSize": 256,
//!     "shrinkSize": 16,
//!     "scale": 2
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};

/// How a model consumes pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// Fixed-shape tensor input; pages are decomposed into padded tiles.
    #[serde(rename = "multiarray")]
    Tiled,
    /// The model accepts a full image buffer in one shot.
    #[serde(rename = "image")]
    WholeImage,
}

/// Tensor and tiling parameters for one model.
///
/// `block_size` is the model's full input side including the shrink margin;
/// the usable tile interior is `block_size - 2 * shrink_size` and must be
/// positive for a tiled engine to be constructible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TilingConfig {
    /// Name of the model's input feature.
    pub input_name: String,
    /// Name of the model's output feature.
    pub output_name: String,
    /// Full model input side in pixels, shrink margin included.
    pub block_size: usize,
    /// Context margin trimmed from each tile edge, in pixels.
    pub shrink_size: usize,
    /// Output magnification factor. Values below 1 are treated as 1.
    pub scale: usize,
    /// Explicit input tensor shape. Empty means `[1, 3, block, block]`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<usize>,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            input_name: "input".to_string(),
            output_name: "output".to_string(),
            block_size: 256,
            shrink_size: 0,
            scale: 2,
            shape: Vec::new(),
        }
    }
}

impl TilingConfig {
    /// The usable tile interior in source pixels, or `None` when the shrink
    /// margin consumes the whole block.
    pub fn model_block_size(&self) -> Option<usize> {
        let margin = self.shrink_size.checked_mul(2)?;
        let interior = self.block_size.checked_sub(margin)?;
        (interior > 0).then_some(interior)
    }

    /// Output magnification, clamped to at least 1.
    pub fn out_scale(&self) -> usize {
        self.scale.max(1)
    }

    /// Effective input tensor shape: the declared one, or the conventional
    /// `[1, 3, block, block]` when none was given.
    pub fn input_shape(&self) -> Vec<usize> {
        if self.shape.is_empty() {
            vec![1, 3, self.block_size, self.block_size]
        } else {
            self.shape.clone()
        }
    }
}

/// One entry of the model catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Human-readable model name.
    pub name: String,
    /// Input contract of the model.
    #[serde(rename = "type")]
    pub kind: ModelKind,
    /// Model file path, relative to a `Models/` directory or absolute.
    pub file: String,
    /// Tensor/tiling parameters. Optional in the document; missing fields
    /// take the conventional defaults.
    #[serde(default)]
    pub config: TilingConfig,
}

impl ModelDescriptor {
    /// The built-in descriptor used when no catalog is available. Only
    /// useful if its file happens to resolve on disk.
    pub fn builtin_default() -> Self {
        Self {
            name: "default".to_string(),
            kind: ModelKind::Tiled,
            file: crate::registry::DEFAULT_MODEL_FILE.to_string(),
            config: TilingConfig::default(),
        }
    }
}
