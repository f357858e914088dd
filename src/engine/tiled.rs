//! # Tiled Inference Engine
//!
//! The block-tiled upscaling path for models with a fixed small-tensor input
//! contract. A page is decomposed into fixed-size, overlap-padded tiles, each
//! tile runs through the model, and the per-tile outputs are stitched back
//! into one image.
//!
//! ## Pipeline
//!
//! 1. **Expand**: build a border-extrapolated, normalized float copy of the
//!    page so every tile (edge tiles included) has a full context window
//!    without reading out of bounds
//! 2. **Decompose**: full tile grid plus right/bottom/corner remainder tiles
//!    so every source pixel is covered at least once
//! 3. **Infer**: one runtime call per tile; a failed tile is skipped, never
//!    the whole page
//! 4. **Stitch**: scale model floats back to 8-bit, last-write-wins in the
//!    deliberate overlap near the trailing edges, then force alpha opaque
//!
//! ## Border Handling
//!
//! The margin is edge replication with a small epsilon bias: interior pixels
//! are normalized as `v/255 + ε` and border strips replicate the nearest edge
//! value minus ε. The bias keeps model inputs strictly inside the open unit
//! interval and avoids dark artifacts at page borders.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::config::descriptor::TilingConfig;
use crate::engine::{ImageProcessingEngine, InferenceRuntime, Tensor};
use crate::error::{UpscaleError, UpscaleResult};
use crate::image::{CHANNELS, PageImage};

/// Epsilon bias applied during normalization (≈ 1/510).
const CLIP_ETA: f32 = 0.001_960_784_11;

/// Color channels fed to the model; alpha is carried separately.
const COLOR_CHANNELS: usize = 3;

/// Block-tiled inference engine.
pub struct TiledEngine {
    runtime: Arc<dyn InferenceRuntime>,
    config: TilingConfig,
    /// Usable tile interior: `block_size - 2 * shrink_size`.
    model_block_size: usize,
    /// Output magnification, clamped to at least 1.
    out_scale: usize,
    /// Model input tensor shape.
    input_shape: Vec<usize>,
}

impl TiledEngine {
    /// Build an engine from a loaded runtime and tiling parameters.
    ///
    /// Fails when the shrink margin consumes the whole block (the usable
    /// interior must be positive) or when the declared input shape cannot
    /// hold three planar channels of the padded block. A failed construction
    /// means the descriptor has no tiled path; the caller falls back to
    /// "no model available".
    pub fn new(
        runtime: Arc<dyn InferenceRuntime>,
        config: TilingConfig,
    ) -> UpscaleResult<Self> {
        let model_block_size =
            config
                .model_block_size()
                .ok_or_else(|| UpscaleError::InvalidDescriptor {
                    name: config.input_name.clone(),
                    reason: format!(
                        "block size {} leaves no usable interior after 2x{} shrink margin",
                        config.block_size, config.shrink_size
                    ),
                })?;

        let input_shape = config.input_shape();
        let needed = COLOR_CHANNELS * config.block_size * config.block_size;
        let declared: usize = input_shape.iter().product();
        if declared < needed {
            return Err(UpscaleError::InvalidDescriptor {
                name: config.input_name.clone(),
                reason: format!(
                    "input shape {input_shape:?} holds {declared} elements, {needed} required"
                ),
            });
        }

        let out_scale = config.out_scale();
        Ok(Self {
            runtime,
            config,
            model_block_size,
            out_scale,
            input_shape,
        })
    }

    pub fn model_block_size(&self) -> usize {
        self.model_block_size
    }

    pub fn out_scale(&self) -> usize {
        self.out_scale
    }
}

#[async_trait]
impl ImageProcessingEngine for TiledEngine {
    async fn process(&self, image: &PageImage) -> Option<PageImage> {
        let width = image.width() as usize;
        let height = image.height() as usize;
        if width == 0 || height == 0 {
            return None;
        }

        let shrink = self.config.shrink_size;
        let block = self.model_block_size;
        let block_and_shrink = block + 2 * shrink;
        let channel_stride = block_and_shrink * block_and_shrink;
        let expanded_width = width + 2 * shrink;
        let expanded_height = height + 2 * shrink;

        let out_width = width * self.out_scale;
        let out_height = height * self.out_scale;
        let out_block = block * self.out_scale;

        let expanded = expand(image, shrink);
        let rects = calculate_rects(width, height, block);

        let mut input = Tensor::zeros(self.input_shape.clone());
        let mut img_data = vec![0u8; out_width * out_height * CHANNELS];

        for &(x, y) in &rects {
            // Copy the padded window into the channel-planar input tensor.
            // Origins can be negative for pages smaller than one block; the
            // guards skip the out-of-range context exactly as the padded
            // buffer bounds require.
            for y_exp in y..y + block_and_shrink as i64 {
                if y_exp < 0 || y_exp >= expanded_height as i64 {
                    continue;
                }
                for x_exp in x..x + block_and_shrink as i64 {
                    if x_exp < 0 || x_exp >= expanded_width as i64 {
                        continue;
                    }
                    let base_idx =
                        ((y_exp - y) as usize) * block_and_shrink + (x_exp - x) as usize;
                    let base_pixel = (y_exp as usize) * expanded_width + x_exp as usize;
                    let plane = expanded_width * expanded_height;
                    input.data[base_idx] = expanded[base_pixel];
                    input.data[base_idx + channel_stride] = expanded[base_pixel + plane];
                    input.data[base_idx + channel_stride * 2] =
                        expanded[base_pixel + plane * 2];
                }
            }

            // A failed tile leaves its destination pixels as previously
            // written; degraded output beats aborting the page.
            let prediction = match self.runtime.infer(&input).await {
                Ok(output) => output,
                Err(err) => {
                    warn!(tile_x = x, tile_y = y, %err, "tile inference failed, skipping tile");
                    continue;
                }
            };
            if prediction.len() < COLOR_CHANNELS * out_block * out_block {
                warn!(
                    tile_x = x,
                    tile_y = y,
                    got = prediction.len(),
                    "tile output tensor too small, skipping tile"
                );
                continue;
            }

            let origin_x = x * self.out_scale as i64;
            let origin_y = y * self.out_scale as i64;
            let mut temp_block = vec![0u8; out_block * out_block];

            for channel in 0..COLOR_CHANNELS {
                let channel_offset = out_block * out_block * channel;
                normalize(
                    &prediction.data[channel_offset..channel_offset + out_block * out_block],
                    &mut temp_block,
                );

                for src_y in 0..out_block {
                    for src_x in 0..out_block {
                        let dest_x = origin_x + src_x as i64;
                        let dest_y = origin_y + src_y as i64;
                        if dest_x < 0
                            || dest_y < 0
                            || dest_x >= out_width as i64
                            || dest_y >= out_height as i64
                        {
                            continue;
                        }
                        let dest_index = ((dest_y as usize) * out_width + dest_x as usize)
                            * CHANNELS
                            + channel;
                        img_data[dest_index] = temp_block[src_y * out_block + src_x];
                    }
                }
            }
        }

        // The model only produces color channels; the page is opaque.
        for alpha in img_data.iter_mut().skip(3).step_by(CHANNELS) {
            *alpha = 255;
        }

        PageImage::from_rgba(out_width as u32, out_height as u32, img_data)
    }
}

/// Scale model floats to 8-bit: multiply by 255, clip to [0, 255], truncate.
fn normalize(src: &[f32], dst: &mut [u8]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = (s * 255.0).clamp(0.0, 255.0) as u8;
    }
}

/// Build the border-extrapolated, normalized planar float buffer.
///
/// Layout: three planes of `(width + 2*shrink) × (height + 2*shrink)` floats
/// (R, G, B). Interior values are `v/255 + ε`; the margin replicates the
/// nearest edge/corner value minus ε.
fn expand(image: &PageImage, shrink: usize) -> Vec<f32> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let ex_width = width + 2 * shrink;
    let ex_height = height + 2 * shrink;
    let rgba = image.as_rgba();

    let mut arr = vec![0.0f32; COLOR_CHANNELS * ex_width * ex_height];

    for channel in 0..COLOR_CHANNELS {
        // Normalized channel plane with the epsilon bias applied.
        let src: Vec<f32> = (0..width * height)
            .map(|i| f32::from(rgba[i * CHANNELS + channel]) / 255.0 + CLIP_ETA)
            .collect();

        let base = channel * ex_width * ex_height;

        // Interior: direct copy offset by the shrink margin.
        for y in 0..height {
            let dst_start = base + (y + shrink) * ex_width + shrink;
            arr[dst_start..dst_start + width].copy_from_slice(&src[y * width..(y + 1) * width]);
        }

        // Corners replicate the nearest corner pixel.
        let tl = src[0] - CLIP_ETA;
        let tr = src[width - 1] - CLIP_ETA;
        let bl = src[(height - 1) * width] - CLIP_ETA;
        let br = src[height * width - 1] - CLIP_ETA;
        fill_region(&mut arr, base, ex_width, 0..shrink, 0..shrink, tl);
        fill_region(
            &mut arr,
            base,
            ex_width,
            width + shrink..ex_width,
            0..shrink,
            tr,
        );
        fill_region(
            &mut arr,
            base,
            ex_width,
            0..shrink,
            height + shrink..ex_height,
            bl,
        );
        fill_region(
            &mut arr,
            base,
            ex_width,
            width + shrink..ex_width,
            height + shrink..ex_height,
            br,
        );

        // Top and bottom strips replicate each column's edge pixel.
        for x in 0..width {
            let top = src[x] - CLIP_ETA;
            let bottom = src[(height - 1) * width + x] - CLIP_ETA;
            let xx = x + shrink;
            fill_region(&mut arr, base, ex_width, xx..xx + 1, 0..shrink, top);
            fill_region(
                &mut arr,
                base,
                ex_width,
                xx..xx + 1,
                height + shrink..ex_height,
                bottom,
            );
        }

        // Left and right strips replicate each row's edge pixel.
        for y in 0..height {
            let left = src[y * width] - CLIP_ETA;
            let right = src[y * width + width - 1] - CLIP_ETA;
            let yy = y + shrink;
            fill_region(&mut arr, base, ex_width, 0..shrink, yy..yy + 1, left);
            fill_region(
                &mut arr,
                base,
                ex_width,
                width + shrink..ex_width,
                yy..yy + 1,
                right,
            );
        }
    }

    arr
}

fn fill_region(
    arr: &mut [f32],
    base: usize,
    ex_width: usize,
    x_range: std::ops::Range<usize>,
    y_range: std::ops::Range<usize>,
    value: f32,
) {
    for y in y_range {
        let row = base + y * ex_width;
        arr[row + x_range.start..row + x_range.end].fill(value);
    }
}

/// Tile origins needed to cover the unpadded page with `block_size` steps.
///
/// Full grid first, then the right remainder column, the bottom remainder
/// row, and the bottom-right corner. Remainder tiles overlap the trailing
/// edge of the grid; their later position in the list makes them win the
/// overlap (last-write-wins stitching). Origins are signed because a page
/// smaller than one block yields a single tile with a negative origin.
pub(crate) fn calculate_rects(width: usize, height: usize, block_size: usize) -> Vec<(i64, i64)> {
    let mut rects = Vec::new();
    let num_w = width / block_size;
    let num_h = height / block_size;
    let rem_w = width % block_size;
    let rem_h = height % block_size;
    let b = block_size as i64;

    for i in 0..num_w as i64 {
        for j in 0..num_h as i64 {
            rects.push((i * b, j * b));
        }
    }
    if rem_w > 0 {
        for j in 0..num_h as i64 {
            rects.push((width as i64 - b, j * b));
        }
    }
    if rem_h > 0 {
        for i in 0..num_w as i64 {
            rects.push((i * b, height as i64 - b));
        }
    }
    if rem_w > 0 && rem_h > 0 {
        rects.push((width as i64 - b, height as i64 - b));
    }

    rects
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    /// Echoes its input: only valid for scale 1, shrink 0.
    struct IdentityRuntime;

    #[async_trait]
    impl InferenceRuntime for IdentityRuntime {
        async fn infer(&self, input: &Tensor) -> Result<Tensor> {
            Ok(input.clone())
        }
    }

    /// Crops the shrink margin off each channel plane (scale 1in, 1out).
    struct CenterCropRuntime {
        block_and_shrink: usize,
        shrink: usize,
    }

    #[async_trait]
    impl InferenceRuntime for CenterCropRuntime {
        async fn infer(&self, input: &Tensor) -> Result<Tensor> {
            let bas = self.block_and_shrink;
            let block = bas - 2 * self.shrink;
            let mut out = Tensor::zeros(vec![1, 3, block, block]);
            for c in 0..3 {
                for y in 0..block {
                    for x in 0..block {
                        out.data[c * block * block + y * block + x] = input.data
                            [c * bas * bas + (y + self.shrink) * bas + (x + self.shrink)];
                    }
                }
            }
            Ok(out)
        }
    }

    /// Fails on selected invocations to exercise per-tile degradation.
    struct FlakyRuntime {
        fail_on: std::sync::Mutex<Vec<usize>>,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl InferenceRuntime for FlakyRuntime {
        async fn infer(&self, input: &Tensor) -> Result<Tensor> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.fail_on.lock().unwrap().contains(&call) {
                anyhow::bail!("synthetic tile failure");
            }
            Ok(input.clone())
        }
    }

    fn config(block_size: usize, shrink_size: usize, scale: usize) -> TilingConfig {
        TilingConfig {
            block_size,
            shrink_size,
            scale,
            ..TilingConfig::default()
        }
    }

    fn gradient_page(width: u32, height: u32) -> PageImage {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[
                    (x * 7 % 256) as u8,
                    (y * 11 % 256) as u8,
                    ((x + y) * 5 % 256) as u8,
                    0, // engines must force alpha themselves
                ]);
            }
        }
        PageImage::from_rgba(width, height, data).unwrap()
    }

    #[test]
    fn test_construction_fails_on_nonpositive_interior() {
        let runtime: Arc<dyn InferenceRuntime> = Arc::new(IdentityRuntime);
        assert!(TiledEngine::new(Arc::clone(&runtime), config(32, 16, 2)).is_err());
        assert!(TiledEngine::new(Arc::clone(&runtime), config(32, 20, 2)).is_err());
        assert!(TiledEngine::new(runtime, config(32, 15, 2)).is_ok());
    }

    #[test]
    fn test_construction_fails_on_undersized_shape() {
        let runtime: Arc<dyn InferenceRuntime> = Arc::new(IdentityRuntime);
        let mut cfg = config(32, 0, 1);
        cfg.shape = vec![1, 3, 16, 16];
        assert!(TiledEngine::new(runtime, cfg).is_err());
    }

    #[test]
    fn test_rects_cover_every_pixel() {
        // (width, height, block) combinations exercising every remainder
        // branch, including a page smaller than one block.
        let cases = [
            (64, 64, 16),
            (65, 64, 16),
            (64, 65, 16),
            (65, 67, 16),
            (10, 10, 16),
            (100, 3, 16),
            (16, 16, 16),
        ];
        for (w, h, b) in cases {
            let rects = calculate_rects(w, h, b);
            let mut covered = vec![false; w * h];
            for (x, y) in &rects {
                for yy in *y..y + b as i64 {
                    for xx in *x..x + b as i64 {
                        if xx >= 0 && yy >= 0 && (xx as usize) < w && (yy as usize) < h {
                            covered[(yy as usize) * w + xx as usize] = true;
                        }
                    }
                }
            }
            assert!(
                covered.iter().all(|&c| c),
                "gap in coverage for {w}x{h} block {b}"
            );
        }
    }

    #[test]
    fn test_remainder_tiles_come_last() {
        let rects = calculate_rects(40, 40, 16);
        // 2x2 full grid, then right column, bottom row, corner.
        assert_eq!(rects.len(), 4 + 2 + 2 + 1);
        assert_eq!(rects[rects.len() - 1], (24, 24));
    }

    #[test]
    fn test_expand_interior_and_borders() {
        let page = gradient_page(4, 3);
        let shrink = 2;
        let ex_w = 4 + 2 * shrink;
        let ex_h = 3 + 2 * shrink;
        let arr = expand(&page, shrink);
        assert_eq!(arr.len(), 3 * ex_w * ex_h);

        // Interior carries the epsilon bias.
        let interior = arr[(shrink) * ex_w + shrink];
        let expected = f32::from(page.pixel(0, 0)[0]) / 255.0 + CLIP_ETA;
        assert!((interior - expected).abs() < 1e-6);

        // The corner margin replicates the corner pixel without the bias.
        let corner = arr[0];
        let expected = f32::from(page.pixel(0, 0)[0]) / 255.0;
        assert!((corner - expected).abs() < 1e-6);

        // The right margin of an interior row replicates that row's edge.
        let y = 1usize;
        let right = arr[(y + shrink) * ex_w + ex_w - 1];
        let expected = f32::from(page.pixel(3, y as u32)[0]) / 255.0;
        assert!((right - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_identity_round_trip_preserves_colors() {
        let engine =
            TiledEngine::new(Arc::new(IdentityRuntime), config(16, 0, 1)).unwrap();
        let page = gradient_page(40, 24);
        let out = engine.process(&page).await.unwrap();

        assert_eq!(out.width(), 40);
        assert_eq!(out.height(), 24);
        for y in 0..24 {
            for x in 0..40 {
                let src = page.pixel(x, y);
                let dst = out.pixel(x, y);
                assert_eq!(&dst[..3], &src[..3], "color mismatch at ({x},{y})");
                assert_eq!(dst[3], 255, "alpha not forced opaque at ({x},{y})");
            }
        }
    }

    #[tokio::test]
    async fn test_shrink_margin_trimmed_from_output() {
        let engine = TiledEngine::new(
            Arc::new(CenterCropRuntime {
                block_and_shrink: 16,
                shrink: 4,
            }),
            config(16, 4, 1),
        )
        .unwrap();
        let page = gradient_page(24, 16);
        let out = engine.process(&page).await.unwrap();
        assert_eq!((out.width(), out.height()), (24, 16));
        for y in 0..16 {
            for x in 0..24 {
                assert_eq!(&out.pixel(x, y)[..3], &page.pixel(x, y)[..3]);
            }
        }
    }

    #[tokio::test]
    async fn test_output_dimensions_scale() {
        // A runtime that nearest-neighbor doubles each channel plane.
        struct DoublingRuntime;
        #[async_trait]
        impl InferenceRuntime for DoublingRuntime {
            async fn infer(&self, input: &Tensor) -> Result<Tensor> {
                let side = 8; // block_and_shrink for config(8, 0, 2)
                let out_side = side * 2;
                let mut out = Tensor::zeros(vec![1, 3, out_side, out_side]);
                for c in 0..3 {
                    for y in 0..out_side {
                        for x in 0..out_side {
                            out.data[c * out_side * out_side + y * out_side + x] =
                                input.data[c * side * side + (y / 2) * side + x / 2];
                        }
                    }
                }
                Ok(out)
            }
        }

        let engine = TiledEngine::new(Arc::new(DoublingRuntime), config(8, 0, 2)).unwrap();
        let page = gradient_page(20, 12);
        let out = engine.process(&page).await.unwrap();
        assert_eq!((out.width(), out.height()), (40, 24));
        // Spot-check a doubled pixel.
        assert_eq!(&out.pixel(10, 10)[..3], &page.pixel(5, 5)[..3]);
        assert_eq!(out.pixel(39, 23)[3], 255);
    }

    #[tokio::test]
    async fn test_failed_tile_degrades_not_aborts() {
        let engine = TiledEngine::new(
            Arc::new(FlakyRuntime {
                fail_on: std::sync::Mutex::new(vec![0]),
                calls: std::sync::atomic::AtomicUsize::new(0),
            }),
            config(16, 0, 1),
        )
        .unwrap();
        let page = gradient_page(32, 16);
        let out = engine.process(&page).await.unwrap();

        // The first tile (origin 0,0) was skipped: its pixels stay zero with
        // forced alpha. The second tile landed normally.
        assert_eq!(out.pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(&out.pixel(16, 0)[..3], &page.pixel(16, 0)[..3]);
    }

    #[tokio::test]
    async fn test_page_smaller_than_block() {
        let engine =
            TiledEngine::new(Arc::new(IdentityRuntime), config(16, 0, 1)).unwrap();
        let page = gradient_page(10, 7);
        let out = engine.process(&page).await.unwrap();
        assert_eq!((out.width(), out.height()), (10, 7));
        for y in 0..7 {
            for x in 0..10 {
                assert_eq!(&out.pixel(x, y)[..3], &page.pixel(x, y)[..3]);
                assert_eq!(out.pixel(x, y)[3], 255);
            }
        }
    }
}
