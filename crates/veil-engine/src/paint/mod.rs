//! Color values used for clears and constant data.

mod color;

pub use color::Color;
