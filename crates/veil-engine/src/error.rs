//! Error taxonomy for the rendering runtime.
//!
//! Three classes, ordered by severity:
//! - [`UsageError`]: the caller broke an API contract. Fix the call site.
//! - backend failures: resource, pipeline, surface or readback failures reported
//!   with the source location of the failing call.
//! - device loss: the logical device is gone; nothing created from it is usable.

use std::panic::Location;

/// Crate-wide result alias.
pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// Coarse error class, most severe last.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    Usage,
    Backend,
    DeviceLost,
}

/// Broken call contracts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("no render surface is bound as the current render target")]
    NoRenderTarget,

    #[error("transparent draw issued while transparency is disabled on the current target")]
    TransparencyDisabled,

    #[error("drawable was built without updates enabled")]
    UpdatesDisabled,

    #[error("{0} was created static and cannot be updated")]
    NotDynamic(&'static str),

    #[error("update size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("{stage} slot {slot} is reserved for the surface perspective block")]
    ReservedSlot { stage: &'static str, slot: u32 },

    #[error("{kind} slot {slot} is out of range (max {max})")]
    SlotOutOfRange { kind: &'static str, slot: u32, max: u32 },

    #[error("draw requires a bound {0}")]
    MissingBinding(&'static str),

    #[error("no vertex buffer bound at input slot {0}")]
    MissingVertexStream(u32),

    #[error("input layout {layout} was created for a different vertex shader than {shader}")]
    LayoutMismatch { layout: u64, shader: u64 },

    #[error("index count {count} exceeds bound index buffer length {len}")]
    IndexRange { count: u32, len: u32 },

    #[error("drawable has no index buffer")]
    MissingIndexBuffer,

    #[error("updates enabled but no dynamic vertex buffer was attached")]
    NoDynamicVertexBuffer,

    #[error("input layout slots must be contiguous from 0; slot {0} is missing")]
    SparseInputSlots(u32),

    #[error("drawable has no unit at index {index} (len {len})")]
    UnitIndex { index: usize, len: usize },

    #[error("drawable has no {0}")]
    MissingUnit(&'static str),

    #[error("image is {width}x{height} but carries {actual} bytes (expected {expected})")]
    ImageSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("cube texture faces must be square and equally sized")]
    CubeFaces,

    #[error("shader blob is not valid UTF-8 WGSL: {0}")]
    ShaderEncoding(String),

    #[error("surface has zero dimensions")]
    ZeroDimensions,
}

/// Top-level error type for every fallible operation in the crate.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("{context} failed at {location}: {message}")]
    Backend {
        context: &'static str,
        message: String,
        location: &'static Location<'static>,
    },

    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),

    #[error("device removed ({reason}): {message}")]
    DeviceLost { reason: String, message: String },
}

impl RenderError {
    /// Builds a backend error tagged with the caller's source location.
    #[track_caller]
    pub fn backend(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            context,
            message: err.to_string(),
            location: Location::caller(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Usage(_) => Severity::Usage,
            Self::Backend { .. } | Self::Unsupported(_) => Severity::Backend,
            Self::DeviceLost { .. } => Severity::DeviceLost,
        }
    }

    /// Returns the contract violation, if this is one.
    pub fn as_usage(&self) -> Option<&UsageError> {
        match self {
            Self::Usage(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_device_loss_last() {
        let usage = RenderError::from(UsageError::NoRenderTarget);
        let backend = RenderError::backend("map readback buffer", "timeout");
        let lost = RenderError::DeviceLost {
            reason: "Unknown".into(),
            message: "gpu hung".into(),
        };

        assert!(usage.severity() < backend.severity());
        assert!(backend.severity() < lost.severity());
    }

    #[test]
    fn backend_error_records_call_site() {
        let err = RenderError::backend("create surface", "no adapter");
        let RenderError::Backend { location, .. } = err else {
            panic!("expected backend error");
        };
        assert!(location.file().ends_with("error.rs"));
    }

    #[test]
    fn usage_error_is_transparent_in_display() {
        let err = RenderError::from(UsageError::TransparencyDisabled);
        assert_eq!(err.to_string(), UsageError::TransparencyDisabled.to_string());
        assert_eq!(err.as_usage(), Some(&UsageError::TransparencyDisabled));
    }
}
