//! Frame timing.
//!
//! - one [`FrameClock`] per surface, ticked once per pushed frame
//! - one [`FramePacer`] per render loop, called after the frame was pushed

mod frame_clock;
mod pacer;

pub use frame_clock::{FrameClock, FrameTime};
pub use pacer::FramePacer;
