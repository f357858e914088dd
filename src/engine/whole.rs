//! # Whole-Image Inference Engine
//!
//! The single-shot path for models that accept a full image buffer: resize
//! the page to the model's declared input shape, run one inference, convert
//! the output tensor back to RGBA. No tiling or border handling; bounded
//! concurrency is the manager's concern.

use async_trait::async_trait;
use image::imageops::FilterType;
use std::sync::Arc;
use tracing::warn;

use crate::config::descriptor::TilingConfig;
use crate::engine::{ImageProcessingEngine, InferenceRuntime, Tensor};
use crate::error::{UpscaleError, UpscaleResult};
use crate::image::{CHANNELS, PageImage};

/// Color channels exchanged with the model; alpha is forced opaque.
const COLOR_CHANNELS: usize = 3;

/// Single-shot inference engine for full-image models.
pub struct WholeImageEngine {
    runtime: Arc<dyn InferenceRuntime>,
    /// Model input side; pages are resized to `input_side × input_side`
    /// unless the declared shape names other dimensions.
    input_height: usize,
    input_width: usize,
    out_scale: usize,
}

impl WholeImageEngine {
    /// Build an engine from a loaded runtime and its descriptor config.
    ///
    /// The declared shape's trailing two dimensions give the input height
    /// and width; without a shape the model's block size is used for both.
    pub fn new(
        runtime: Arc<dyn InferenceRuntime>,
        config: TilingConfig,
    ) -> UpscaleResult<Self> {
        let shape = config.input_shape();
        let (input_height, input_width) = match shape.as_slice() {
            [.., h, w] if *h > 0 && *w > 0 => (*h, *w),
            _ => {
                return Err(UpscaleError::InvalidDescriptor {
                    name: config.input_name.clone(),
                    reason: format!("shape {shape:?} has no usable spatial dimensions"),
                });
            }
        };
        Ok(Self {
            runtime,
            input_height,
            input_width,
            out_scale: config.out_scale(),
        })
    }
}

#[async_trait]
impl ImageProcessingEngine for WholeImageEngine {
    async fn process(&self, image: &PageImage) -> Option<PageImage> {
        if image.width() == 0 || image.height() == 0 {
            return None;
        }

        // Preprocess: bilinear resize to the model's input contract.
        let rgba: image::RgbaImage = image.into();
        let resized = image::imageops::resize(
            &rgba,
            self.input_width as u32,
            self.input_height as u32,
            FilterType::Triangle,
        );

        let mut input = Tensor::zeros(vec![1, COLOR_CHANNELS, self.input_height, self.input_width]);
        let plane = self.input_height * self.input_width;
        for (i, px) in resized.pixels().enumerate() {
            for c in 0..COLOR_CHANNELS {
                input.data[c * plane + i] = f32::from(px.0[c]) / 255.0;
            }
        }

        let output = match self.runtime.infer(&input).await {
            Ok(output) => output,
            Err(err) => {
                warn!(%err, "whole-image inference failed");
                return None;
            }
        };

        let out_width = self.input_width * self.out_scale;
        let out_height = self.input_height * self.out_scale;
        let out_plane = out_width * out_height;
        if output.len() < COLOR_CHANNELS * out_plane {
            warn!(
                got = output.len(),
                needed = COLOR_CHANNELS * out_plane,
                "whole-image output tensor too small"
            );
            return None;
        }

        let mut img_data = vec![255u8; out_width * out_height * CHANNELS];
        for i in 0..out_plane {
            for c in 0..COLOR_CHANNELS {
                img_data[i * CHANNELS + c] =
                    (output.data[c * out_plane + i] * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }

        PageImage::from_rgba(out_width as u32, out_height as u32, img_data)
    }
}
