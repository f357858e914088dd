//! # Page Image Types
//!
//! Immutable RGBA page images and pixel geometry shared across the upscaling
//! pipeline. Engines consume one `PageImage` and produce a new one; the pixel
//! buffer is reference-counted so pages can flow between tasks without
//! copying.
//!
//! ## Zero-Copy Design
//!
//! - Pixel data lives behind `Arc<Vec<u8>>`; cloning a `PageImage` is cheap
//! - Buffers are tightly packed (stride is always `width * 4`)
//! - Construction validates buffer length so downstream indexing never needs
//!   to re-check it

use std::sync::Arc;

/// Number of interleaved bytes per pixel (RGBA).
pub const CHANNELS: usize = 4;

/// Pixel dimensions as floating-point values.
///
/// The decision policy works with measured pixel geometry that may come from
/// layout code as fractional or non-positive values, so this is deliberately
/// not a `u32` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSize {
    pub width: f64,
    pub height: f64,
}

impl PixelSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// An immutable RGBA page image.
///
/// Length invariant: `data.len() == width * height * 4`, tightly packed rows.
/// Enforced at construction; a buffer that does not satisfy it cannot become
/// a `PageImage`.
///
/// # Examples
///
/// ```rust
/// use reader_upscale::image::PageImage;
///
/// let page = PageImage::from_rgba(2, 2, vec![0u8; 16]).unwrap();
/// assert_eq!(page.width(), 2);
/// assert_eq!(page.pixel(1, 1), [0, 0, 0, 0]);
/// ```
#[derive(Debug, Clone)]
pub struct PageImage {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
}

impl PageImage {
    /// Wrap a tightly-packed RGBA buffer as a page image.
    ///
    /// Returns `None` if the buffer length does not match
    /// `width * height * 4` or either dimension is zero. This is the
    /// "image construction failure" exit of the pipeline: callers treat
    /// `None` as "leave the page unmodified".
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(CHANNELS)?;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            data: Arc::new(data),
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel dimensions as floating-point geometry for the decision policy.
    pub fn pixel_size(&self) -> PixelSize {
        PixelSize::new(f64::from(self.width), f64::from(self.height))
    }

    /// Raw interleaved RGBA bytes, row-major, stride `width * 4`.
    pub fn as_rgba(&self) -> &[u8] {
        &self.data
    }

    /// RGBA value at `(x, y)`. Panics if out of bounds; only used by tests
    /// and small diagnostic paths.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y as usize) * (self.width as usize) + x as usize) * CHANNELS;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }
}

impl From<::image::RgbaImage> for PageImage {
    fn from(img: ::image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            data: Arc::new(img.into_raw()),
            width,
            height,
        }
    }
}

impl From<&PageImage> for ::image::RgbaImage {
    fn from(page: &PageImage) -> Self {
        // Length invariant guarantees this succeeds.
        ::image::RgbaImage::from_raw(page.width, page.height, page.data.as_ref().clone())
            .unwrap_or_else(|| ::image::RgbaImage::new(page.width, page.height))
    }
}
