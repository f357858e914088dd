//! # Model Manager
//!
//! Owns the model lifecycle for the page reader: resolves the active
//! descriptor, lazily loads and caches engine instances keyed by resolved
//! file path, and throttles concurrent inference through the FIFO
//! [`crate::gate::ConcurrencyGate`].
//!
//! ## Call Path
//!
//! `process(image)` → resolve descriptor → load or fetch cached engine →
//! acquire a concurrency slot → engine `process` → release slot → result.
//! `None` at any point means "use the original page unchanged"; nothing on
//! this path is fatal to the host process.
//!
//! ## Cancellation
//!
//! Calls carry a [`CancellationToken`]. Cancellation is re-checked at the
//! start of the call, after descriptor/engine resolution, and after slot
//! acquisition; a cancelled call returns `None` without running inference,
//! and the RAII permit guarantees it never keeps a slot.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::descriptor::ModelKind;
use crate::engine::tiled::TiledEngine;
use crate::engine::whole::WholeImageEngine;
use crate::engine::{ImageProcessingEngine, ModelLoader};
use crate::gate::ConcurrencyGate;
use crate::image::{PageImage, PixelSize};
use crate::policy::{self, UpscaleDecision};
use crate::registry::{DescriptorRegistry, ResolvedModel};
use crate::UpscaleSettings;

/// Orchestrates descriptor resolution, engine caching and bounded inference.
pub struct ModelManager {
    registry: Mutex<DescriptorRegistry>,
    loader: Arc<dyn ModelLoader>,
    settings: UpscaleSettings,
    /// Engines keyed by resolved absolute path, so two descriptors backed by
    /// the same file share one loaded instance. Entries live for the process
    /// lifetime; the catalog holds a handful of models at most.
    engines: Mutex<HashMap<PathBuf, Arc<dyn ImageProcessingEngine>>>,
    gate: Arc<ConcurrencyGate>,
    /// Set while we are in a "no model available" streak, so the condition
    /// is logged once instead of once per page.
    missing_logged: AtomicBool,
}

impl ModelManager {
    pub fn new(
        registry: DescriptorRegistry,
        loader: Arc<dyn ModelLoader>,
        settings: UpscaleSettings,
    ) -> Self {
        let gate = ConcurrencyGate::new(settings.max_concurrent_inferences);
        Self {
            registry: Mutex::new(registry),
            loader,
            settings,
            engines: Mutex::new(HashMap::new()),
            gate,
            missing_logged: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &UpscaleSettings {
        &self.settings
    }

    /// Evaluate the decision policy for a page against a screen size, using
    /// this manager's configured mode and thresholds.
    pub fn decide(&self, source: PixelSize, screen: PixelSize) -> UpscaleDecision {
        policy::evaluate(
            self.settings.mode,
            source,
            screen,
            self.settings.auto_trigger_scale,
            self.settings.always_max_screen_scale,
        )
    }

    /// Upscale a page. Returns `None` to mean "use the original image
    /// unchanged" — because no model is available, the call was cancelled,
    /// or processing failed.
    pub async fn process(&self, image: &PageImage) -> Option<PageImage> {
        self.process_with_cancel(image, &CancellationToken::new())
            .await
    }

    /// Upscale a page with an externally owned cancellation token.
    pub async fn process_with_cancel(
        &self,
        image: &PageImage,
        cancel: &CancellationToken,
    ) -> Option<PageImage> {
        if cancel.is_cancelled() {
            return None;
        }

        let resolved = {
            let mut registry = self.registry.lock().unwrap();
            registry.resolve_active()
        };
        let Some(resolved) = resolved else {
            // Log once per missing streak, not once per page.
            if !self.missing_logged.swap(true, Ordering::Relaxed) {
                warn!("no upscaling model available, pages pass through unmodified");
            }
            return None;
        };
        self.missing_logged.store(false, Ordering::Relaxed);

        let engine = self.engine_for(&resolved).await?;

        if cancel.is_cancelled() {
            return None;
        }

        let permit = self.gate.acquire().await;
        if cancel.is_cancelled() {
            // Permit drop returns the slot before inference starts.
            drop(permit);
            return None;
        }

        // The permit is held across the engine call and released by drop on
        // every exit path.
        let result = engine.process(image).await;
        drop(permit);
        result
    }

    /// Decide-then-process convenience for the reader view: runs the policy
    /// and only touches the model when the page is worth upscaling.
    pub async fn maybe_upscale(
        &self,
        image: &PageImage,
        screen: PixelSize,
        cancel: &CancellationToken,
    ) -> Option<PageImage> {
        let decision = self.decide(image.pixel_size(), screen);
        if !decision.should_upscale {
            debug!(reason = ?decision.skip_reason, "skipping upscale");
            return None;
        }
        self.process_with_cancel(image, cancel).await
    }

    /// Fetch the cached engine for a resolved model, loading it on miss.
    ///
    /// A load failure is logged and yields `None` for this call only; the
    /// failed path is not cached, so a later call may retry or pick a
    /// different descriptor.
    async fn engine_for(&self, resolved: &ResolvedModel) -> Option<Arc<dyn ImageProcessingEngine>> {
        if let Some(engine) = self.engines.lock().unwrap().get(&resolved.path) {
            return Some(Arc::clone(engine));
        }

        let runtime = match self
            .loader
            .load_runtime(&resolved.descriptor, &resolved.path)
            .await
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(
                    path = %resolved.path.display(),
                    %err,
                    "model load failed, treating as unavailable"
                );
                return None;
            }
        };

        let engine: Arc<dyn ImageProcessingEngine> = match resolved.descriptor.kind {
            ModelKind::Tiled => {
                match TiledEngine::new(runtime, resolved.descriptor.config.clone()) {
                    Ok(engine) => Arc::new(engine),
                    Err(err) => {
                        error!(name = %resolved.descriptor.name, %err, "engine construction failed");
                        return None;
                    }
                }
            }
            ModelKind::WholeImage => {
                match WholeImageEngine::new(runtime, resolved.descriptor.config.clone()) {
                    Ok(engine) => Arc::new(engine),
                    Err(err) => {
                        error!(name = %resolved.descriptor.name, %err, "engine construction failed");
                        return None;
                    }
                }
            }
        };

        // First load wins if two calls raced on the same path.
        let mut engines = self.engines.lock().unwrap();
        let entry = engines
            .entry(resolved.path.clone())
            .or_insert_with(|| Arc::clone(&engine));
        Some(Arc::clone(entry))
    }

    /// Number of distinct loaded engines. Exposed for instrumentation.
    pub fn loaded_engine_count(&self) -> usize {
        self.engines.lock().unwrap().len()
    }
}
