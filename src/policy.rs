//! # Upscale Decision Policy
//!
//! Pure sizing math that decides whether a page is worth upscaling before it
//! gets anywhere near a model. The policy maps (mode, source geometry, screen
//! geometry, thresholds) to an [`UpscaleDecision`] with no I/O, no clocks and
//! no shared state, so callers can evaluate it as often as layout changes.
//!
//! ## Rationale
//!
//! - `Auto` skips inference when the page's native resolution is already
//!   close to the display's pixel density (the scale needed to fill the
//!   screen is below the trigger threshold)
//! - `Always` skips pages that are already oversized relative to the screen,
//!   where upscaling would only produce an enormous, wasteful output

use crate::image::PixelSize;

/// User-selectable upscaling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum UpscaleMode {
    /// Never upscale.
    Disabled,
    /// Upscale only when the page is noticeably below screen density.
    #[default]
    Auto,
    /// Upscale every page that is not already oversized for the screen.
    Always,
}

/// Why a page was left unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Upscaling is switched off.
    Disabled,
    /// The fit scale did not exceed the auto-mode trigger threshold.
    BelowAutoTriggerScale,
    /// The source already exceeds the allowed multiple of the screen size.
    ExceedsAlwaysMaxScreenScale,
    /// Source width or height was not a positive value.
    InvalidSourceSize,
}

/// Result of one policy evaluation. Pure value, recomputed per call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpscaleDecision {
    pub should_upscale: bool,
    /// Uniform scale factor that would make the source exactly fill the
    /// screen without overshoot on either axis. Zero for invalid sources.
    pub required_scale: f64,
    pub skip_reason: Option<SkipReason>,
}

impl UpscaleDecision {
    fn skip(required_scale: f64, reason: SkipReason) -> Self {
        Self {
            should_upscale: false,
            required_scale,
            skip_reason: Some(reason),
        }
    }

    fn upscale(required_scale: f64) -> Self {
        Self {
            should_upscale: true,
            required_scale,
            skip_reason: None,
        }
    }
}

/// Evaluate the upscale policy for one page.
///
/// # Arguments
/// * `mode` - user-selected upscaling mode
/// * `source` - measured page size in pixels
/// * `screen` - display size in physical pixels
/// * `auto_trigger_scale` - minimum fit scale before `Auto` pays for
///   inference; clamped to at least 1.0
/// * `always_max_screen_scale` - largest source-to-screen multiple `Always`
///   will still upscale; clamped to at least 1.0
///
/// Deterministic: identical inputs always produce an identical decision.
pub fn evaluate(
    mode: UpscaleMode,
    source: PixelSize,
    screen: PixelSize,
    auto_trigger_scale: f64,
    always_max_screen_scale: f64,
) -> UpscaleDecision {
    if source.width <= 0.0 || source.height <= 0.0 {
        return UpscaleDecision::skip(0.0, SkipReason::InvalidSourceSize);
    }

    // Classic "fit" scale: fill the screen without overshoot on either axis.
    let required_scale = (screen.width / source.width).min(screen.height / source.height);

    match mode {
        UpscaleMode::Disabled => UpscaleDecision::skip(required_scale, SkipReason::Disabled),
        UpscaleMode::Auto => {
            let trigger = auto_trigger_scale.max(1.0);
            if required_scale <= trigger {
                UpscaleDecision::skip(required_scale, SkipReason::BelowAutoTriggerScale)
            } else {
                UpscaleDecision::upscale(required_scale)
            }
        }
        UpscaleMode::Always => {
            let max_scale = always_max_screen_scale.max(1.0);
            let max_allowed_width = screen.width * max_scale;
            let max_allowed_height = screen.height * max_scale;
            if source.width > max_allowed_width || source.height > max_allowed_height {
                UpscaleDecision::skip(required_scale, SkipReason::ExceedsAlwaysMaxScreenScale)
            } else {
                UpscaleDecision::upscale(required_scale)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(w: f64, h: f64) -> PixelSize {
        PixelSize::new(w, h)
    }

    #[test]
    fn test_required_scale_is_fit_scale() {
        let d = evaluate(
            UpscaleMode::Auto,
            size(500.0, 250.0),
            size(1000.0, 1000.0),
            1.5,
            2.0,
        );
        // min(1000/500, 1000/250) = 2.0
        assert_eq!(d.required_scale, 2.0);
    }

    #[test]
    fn test_disabled_never_upscales() {
        let d = evaluate(
            UpscaleMode::Disabled,
            size(100.0, 100.0),
            size(4000.0, 4000.0),
            1.0,
            100.0,
        );
        assert!(!d.should_upscale);
        assert_eq!(d.skip_reason, Some(SkipReason::Disabled));
        assert_eq!(d.required_scale, 40.0);
    }

    #[test]
    fn test_auto_triggers_above_threshold() {
        let d = evaluate(
            UpscaleMode::Auto,
            size(500.0, 500.0),
            size(1000.0, 1000.0),
            1.5,
            2.0,
        );
        assert_eq!(d.required_scale, 2.0);
        assert!(d.should_upscale);
        assert_eq!(d.skip_reason, None);
    }

    #[test]
    fn test_auto_skips_below_threshold() {
        let d = evaluate(
            UpscaleMode::Auto,
            size(800.0, 800.0),
            size(1000.0, 1000.0),
            1.5,
            2.0,
        );
        assert_eq!(d.required_scale, 1.25);
        assert!(!d.should_upscale);
        assert_eq!(d.skip_reason, Some(SkipReason::BelowAutoTriggerScale));
    }

    #[test]
    fn test_auto_trigger_clamped_to_one() {
        // Threshold 0.5 clamps to 1.0; a fit scale of exactly 1.0 must skip.
        let d = evaluate(
            UpscaleMode::Auto,
            size(1000.0, 1000.0),
            size(1000.0, 1000.0),
            0.5,
            2.0,
        );
        assert!(!d.should_upscale);
        assert_eq!(d.skip_reason, Some(SkipReason::BelowAutoTriggerScale));
    }

    #[test]
    fn test_always_skips_oversized_source() {
        let d = evaluate(
            UpscaleMode::Always,
            size(2500.0, 2500.0),
            size(1000.0, 1000.0),
            1.5,
            2.0,
        );
        assert!(!d.should_upscale);
        assert_eq!(d.skip_reason, Some(SkipReason::ExceedsAlwaysMaxScreenScale));
    }

    #[test]
    fn test_always_upscales_within_limit() {
        let d = evaluate(
            UpscaleMode::Always,
            size(1800.0, 1800.0),
            size(1000.0, 1000.0),
            1.5,
            2.0,
        );
        assert!(d.should_upscale);
        assert_eq!(d.skip_reason, None);
    }

    #[test]
    fn test_invalid_source_size_wins_over_mode() {
        for mode in [UpscaleMode::Disabled, UpscaleMode::Auto, UpscaleMode::Always] {
            let d = evaluate(mode, size(0.0, 500.0), size(1000.0, 1000.0), 1.5, 2.0);
            assert!(!d.should_upscale);
            assert_eq!(d.required_scale, 0.0);
            assert_eq!(d.skip_reason, Some(SkipReason::InvalidSourceSize));

            let d = evaluate(mode, size(500.0, -1.0), size(1000.0, 1000.0), 1.5, 2.0);
            assert_eq!(d.skip_reason, Some(SkipReason::InvalidSourceSize));
        }
    }

    #[test]
    fn test_pure_function_same_inputs_same_output() {
        let a = evaluate(
            UpscaleMode::Auto,
            size(123.0, 456.0),
            size(789.0, 1011.0),
            1.3,
            2.5,
        );
        let b = evaluate(
            UpscaleMode::Auto,
            size(123.0, 456.0),
            size(789.0, 1011.0),
            1.3,
            2.5,
        );
        assert_eq!(a, b);
    }
}
