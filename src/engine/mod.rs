//! # Inference Engines
//!
//! The processing seam between page images and the opaque neural inference
//! runtime. Two engine variants implement one capability,
//! `process(image) -> Option<image>`:
//!
//! - [`tiled::TiledEngine`] — block-tiled path for models with a fixed
//!   small-tensor input contract
//! - [`whole::WholeImageEngine`] — single-shot path for models that accept a
//!   full image buffer
//!
//! The runtime itself stays behind [`InferenceRuntime`]: given a fixed-shape
//! numeric tensor it returns a fixed-shape numeric tensor. That keeps the
//! tiling algorithm and the concurrency gate fully unit-testable with
//! deterministic stubs, decoupled from any real ML backend.

pub mod runtime;
pub mod tiled;
pub mod whole;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::descriptor::ModelDescriptor;
use crate::image::PageImage;

/// A dense float tensor with an explicit shape.
///
/// Invariant: `data.len() == shape.iter().product()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Zero-filled tensor of the given shape.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Opaque neural inference runtime: fixed-shape tensor in, fixed-shape
/// tensor out. Implementations wrap whatever ML backend is available.
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    async fn infer(&self, input: &Tensor) -> Result<Tensor>;
}

/// One capability shared by both engine variants: consume a page, produce an
/// upscaled page, or `None` meaning "leave the page unmodified".
#[async_trait]
pub trait ImageProcessingEngine: Send + Sync {
    async fn process(&self, image: &PageImage) -> Option<PageImage>;
}

/// Loads (and possibly compiles) an inference runtime from a model file.
///
/// Loading is async and may be cancelled by dropping the future; a load
/// failure is reported as an error and treated by the manager as "no model
/// available" for that call, never as fatal.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load_runtime(
        &self,
        descriptor: &ModelDescriptor,
        path: &Path,
    ) -> Result<Arc<dyn InferenceRuntime>>;
}
