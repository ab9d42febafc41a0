//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and Windows, and ties one render surface to
//! each window.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
