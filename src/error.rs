//! # Error Handling
//!
//! Error types for the upscaling pipeline, organized around one rule from the
//! pipeline's contract: nothing in this subsystem is fatal to the host
//! process. Every failure degrades to "do not upscale this page", so the
//! error taxonomy exists for logging and for callers that want to distinguish
//! why a page came back unmodified.
//!
//! ## Error Classification
//!
//! - `Retryable`: a later call may succeed (a different descriptor may
//!   resolve, a transient runtime hiccup may clear)
//! - `Recoverable`: the call can fall back to the original page
//!
//! All variants here are recoverable by construction; only a subset is worth
//! retrying.

use std::{error::Error as StdError, fmt, path::PathBuf};

/// Severity levels for pipeline errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected degradation (no model installed, page skipped).
    Info,
    /// Partial degradation (a tile failed, output quality reduced).
    Warning,
    /// The whole call failed and the original page is used instead.
    Error,
}

/// Errors produced by the upscaling pipeline.
#[derive(Debug)]
pub enum UpscaleError {
    /// No descriptor resolved to an existing model file.
    NoModelAvailable,
    /// A model file exists but could not be loaded or compiled.
    ModelLoad {
        path: PathBuf,
        source: anyhow::Error,
    },
    /// A descriptor's tiling parameters cannot produce a usable engine
    /// (for example a non-positive tile interior).
    InvalidDescriptor { name: String, reason: String },
    /// The inference runtime rejected a tensor.
    Inference(anyhow::Error),
    /// The output buffer could not be wrapped as an image.
    ImageConstruction,
    /// The catalog document could not be read or parsed.
    Catalog(String),
    /// The caller's task was cancelled. Not a failure; reported so callers
    /// can tell cancellation apart from degradation.
    Cancelled,
}

impl UpscaleError {
    /// Severity used when logging this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NoModelAvailable | Self::Cancelled => ErrorSeverity::Info,
            Self::Catalog(_) => ErrorSeverity::Warning,
            Self::ModelLoad { .. }
            | Self::InvalidDescriptor { .. }
            | Self::Inference(_)
            | Self::ImageConstruction => ErrorSeverity::Error,
        }
    }

    /// Whether a later call against the same manager may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            // A model may be installed, or a different descriptor may
            // resolve, between calls.
            Self::NoModelAvailable | Self::ModelLoad { .. } | Self::Inference(_) => true,
            Self::InvalidDescriptor { .. }
            | Self::ImageConstruction
            | Self::Catalog(_)
            | Self::Cancelled => false,
        }
    }

    /// Every pipeline error degrades to "use the original page".
    pub fn is_recoverable(&self) -> bool {
        true
    }
}

impl fmt::Display for UpscaleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoModelAvailable => write!(f, "no upscaling model is available"),
            Self::ModelLoad { path, source } => {
                write!(f, "failed to load model {}: {source}", path.display())
            }
            Self::InvalidDescriptor { name, reason } => {
                write!(f, "descriptor '{name}' cannot build an engine: {reason}")
            }
            Self::Inference(source) => write!(f, "inference failed: {source}"),
            Self::ImageConstruction => write!(f, "failed to construct output image"),
            Self::Catalog(msg) => write!(f, "model catalog error: {msg}"),
            Self::Cancelled => write!(f, "upscale call was cancelled"),
        }
    }
}

impl StdError for UpscaleError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::ModelLoad { source, .. } | Self::Inference(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for UpscaleError {
    fn from(error: serde_json::Error) -> Self {
        Self::Catalog(error.to_string())
    }
}

/// Result alias for pipeline operations.
pub type UpscaleResult<T> = Result<T, UpscaleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
    }

    #[test]
    fn test_classification() {
        assert!(UpscaleError::NoModelAvailable.is_retryable());
        assert!(!UpscaleError::ImageConstruction.is_retryable());
        assert!(UpscaleError::Cancelled.is_recoverable());
        assert_eq!(
            UpscaleError::NoModelAvailable.severity(),
            ErrorSeverity::Info
        );
        assert_eq!(
            UpscaleError::ImageConstruction.severity(),
            ErrorSeverity::Error
        );
    }

    #[test]
    fn test_display_includes_path() {
        let err = UpscaleError::ModelLoad {
            path: PathBuf::from("/models/x.model"),
            source: anyhow::anyhow!("bad magic"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/models/x.model"));
        assert!(msg.contains("bad magic"));
    }
}
