//! # Deterministic Interpolating Runtime
//!
//! A stand-in inference runtime that upscales channel planes by bilinear
//! interpolation instead of a neural model. It honors the same tensor
//! contract as a real backend, which makes it useful in two places:
//!
//! - the `pagescale` CLI, so the full pipeline can run end to end on a
//!   machine with no model runtime installed
//! - tests that need a real-shaped, deterministic engine without coupling to
//!   any ML framework
//!
//! Output quality is obviously not neural; that is the point.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::config::descriptor::ModelDescriptor;
use crate::engine::{InferenceRuntime, ModelLoader, Tensor};

/// Bilinear plane upscaler behind the [`InferenceRuntime`] contract.
///
/// Expects an input tensor whose trailing two dimensions are spatial and
/// produces the same layout magnified by `scale`.
pub struct BilinearRuntime {
    scale: usize,
}

impl BilinearRuntime {
    pub fn new(scale: usize) -> Self {
        Self { scale: scale.max(1) }
    }
}

#[async_trait]
impl InferenceRuntime for BilinearRuntime {
    async fn infer(&self, input: &Tensor) -> Result<Tensor> {
        let (h, w) = match input.shape.as_slice() {
            [.., h, w] if *h > 0 && *w > 0 => (*h, *w),
            _ => bail!("input shape {:?} has no spatial dimensions", input.shape),
        };
        let planes = input.len() / (h * w);
        if planes * h * w != input.len() {
            bail!(
                "input length {} is not a multiple of the {h}x{w} plane",
                input.len()
            );
        }

        let out_h = h * self.scale;
        let out_w = w * self.scale;
        let mut out = Tensor::zeros(vec![1, planes, out_h, out_w]);

        for p in 0..planes {
            let src = &input.data[p * h * w..(p + 1) * h * w];
            let dst = &mut out.data[p * out_h * out_w..(p + 1) * out_h * out_w];
            for oy in 0..out_h {
                // Half-pixel-centered sample position in source space.
                let sy = ((oy as f32 + 0.5) / self.scale as f32 - 0.5).max(0.0);
                let y0 = (sy as usize).min(h - 1);
                let y1 = (y0 + 1).min(h - 1);
                let fy = sy - y0 as f32;
                for ox in 0..out_w {
                    let sx = ((ox as f32 + 0.5) / self.scale as f32 - 0.5).max(0.0);
                    let x0 = (sx as usize).min(w - 1);
                    let x1 = (x0 + 1).min(w - 1);
                    let fx = sx - x0 as f32;

                    let top = src[y0 * w + x0] * (1.0 - fx) + src[y0 * w + x1] * fx;
                    let bottom = src[y1 * w + x0] * (1.0 - fx) + src[y1 * w + x1] * fx;
                    dst[oy * out_w + ox] = top * (1.0 - fy) + bottom * fy;
                }
            }
        }

        Ok(out)
    }
}

/// Loader producing [`BilinearRuntime`] instances.
///
/// The model file is only required to exist (the registry already verified
/// that); its contents are ignored. `fail_loads` lets tests simulate a
/// corrupt model file.
///
/// Only meaningful for descriptors without a shrink margin: the bilinear
/// stand-in magnifies the whole padded block, so a non-zero margin would
/// misalign its output with the tiled engine's stitch layout.
pub struct BilinearLoader {
    fail_loads: bool,
}

impl BilinearLoader {
    pub fn new() -> Self {
        Self { fail_loads: false }
    }

    #[cfg(test)]
    pub fn failing() -> Self {
        Self { fail_loads: true }
    }
}

impl Default for BilinearLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelLoader for BilinearLoader {
    async fn load_runtime(
        &self,
        descriptor: &ModelDescriptor,
        path: &Path,
    ) -> Result<Arc<dyn InferenceRuntime>> {
        if self.fail_loads {
            bail!("cannot load model at {}", path.display());
        }
        Ok(Arc::new(BilinearRuntime::new(descriptor.config.out_scale())))
    }
}
