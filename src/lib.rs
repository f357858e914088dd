//! # Reader Upscale Library
//!
//! Tiled neural image-upscaling engine for comic/book reader clients. The
//! page reader hands each displayed page to this crate, which decides from
//! policy and measured pixel geometry whether upscaling is worthwhile, runs
//! a tile-decomposed (or single-shot) model inference over the page, and
//! returns a sharpened image — or `None`, meaning "show the original page".
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `policy`: pure upscale/skip decision from mode, sizes and thresholds
//! - `config`: model descriptors and the on-disk catalog document
//! - `registry`: descriptor pinning and model file path resolution
//! - `engine`: tiled and whole-image inference engines over an opaque runtime
//! - `gate`: FIFO-fair bounded inference concurrency
//! - `manager`: lifecycle orchestration, engine caching, cancellation
//!
//! ## Degradation Contract
//!
//! Nothing in this crate is fatal to the host process. Missing models,
//! corrupt model files, failed tiles and cancelled calls all degrade to
//! "do not upscale this page".
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reader_upscale::{
//!     DescriptorRegistry, ModelManager, PageImage, UpscaleSettings,
//!     engine::runtime::BilinearLoader,
//! };
//!
//! # async fn example(page: PageImage) {
//! let manager = ModelManager::new(
//!     DescriptorRegistry::with_default_roots(),
//!     Arc::new(BilinearLoader::new()),
//!     UpscaleSettings::default(),
//! );
//!
//! match manager.process(&page).await {
//!     Some(upscaled) => { /* display the sharpened page */ }
//!     None => { /* display the original page unchanged */ }
//! }
//! # }
//! ```

// Internal module imports
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod image;
pub mod manager;
pub mod policy;
pub mod registry;

/// Re-export the working set for convenience
pub use crate::image::{PageImage, PixelSize};
pub use error::{ErrorSeverity, UpscaleError, UpscaleResult};
pub use manager::ModelManager;
pub use policy::{SkipReason, UpscaleDecision, UpscaleMode, evaluate};
pub use registry::DescriptorRegistry;

/// Configuration for a [`ModelManager`] instance.
///
/// Mirrors the user-facing reader preferences: the upscaling mode and its
/// two thresholds, plus the inference concurrency cap.
///
/// # Examples
///
/// ```rust
/// use reader_upscale::{UpscaleMode, UpscaleSettings};
///
/// let settings = UpscaleSettings {
///     mode: UpscaleMode::Auto,
///     auto_trigger_scale: 1.5,
///     ..UpscaleSettings::default()
/// };
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct UpscaleSettings {
    /// When to upscale at all.
    pub mode: UpscaleMode,

    /// Auto mode: minimum screen-fit scale before inference is worth paying
    /// for. Values below 1.0 behave as 1.0.
    pub auto_trigger_scale: f64,

    /// Always mode: largest source-to-screen multiple that still gets
    /// upscaled. Values below 1.0 behave as 1.0.
    pub always_max_screen_scale: f64,

    /// Maximum simultaneous inferences. Small by design: each inference may
    /// allocate large intermediate tensors.
    pub max_concurrent_inferences: usize,
}

impl Default for UpscaleSettings {
    fn default() -> Self {
        Self {
            mode: UpscaleMode::Auto,
            auto_trigger_scale: 1.0,
            always_max_screen_scale: 2.0,
            max_concurrent_inferences: 2,
        }
    }
}

impl UpscaleSettings {
    /// Validates the settings.
    ///
    /// The thresholds are clamped at use sites, so validation only rejects
    /// values that cannot mean anything (non-finite thresholds, a zero
    /// concurrency cap).
    pub fn validate(&self) -> Result<(), String> {
        if !self.auto_trigger_scale.is_finite() {
            return Err("auto trigger scale must be a finite number".to_string());
        }
        if !self.always_max_screen_scale.is_finite() {
            return Err("always max screen scale must be a finite number".to_string());
        }
        if self.max_concurrent_inferences == 0 {
            return Err("at least one concurrent inference must be allowed".to_string());
        }
        Ok(())
    }
}
