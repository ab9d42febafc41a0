//! Veil engine crate.
//!
//! Real-time 3D rendering runtime on wgpu: bindable GPU resource units,
//! drawables composed from them, render surfaces with one current render
//! target per context, and weighted blended order-independent transparency.

pub mod device;
pub mod bindable;
pub mod drawable;
pub mod surface;
pub mod window;
pub mod time;
pub mod core;

pub mod logging;
pub mod paint;
pub mod image;
mod error;

pub use error::{RenderError, Result, Severity, UsageError};
