use std::time::{Duration, Instant};

/// Frame-rate limiter.
///
/// Called once per loop iteration after the frame was pushed; sleeps the
/// thread for whatever is left of the target frame interval. With no target
/// the pacer only records timestamps and relies on present-time vsync.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Option<Duration>,
    last: Instant,
}

impl FramePacer {
    /// Creates a pacer limited to `target_fps` frames per second.
    ///
    /// `None`, zero or non-finite values disable limiting.
    pub fn new(target_fps: Option<f32>) -> Self {
        Self {
            interval: Self::interval_for(target_fps),
            last: Instant::now(),
        }
    }

    /// Creates a pacer that never sleeps.
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn set_target_fps(&mut self, target_fps: Option<f32>) {
        self.interval = Self::interval_for(target_fps);
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Time that still has to pass for the current frame to fill its interval.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.interval {
            Some(interval) => interval.saturating_sub(now.saturating_duration_since(self.last)),
            None => Duration::ZERO,
        }
    }

    /// Sleeps out the remainder of the frame interval and starts the next one.
    pub fn pace(&mut self) {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        self.last = Instant::now();
    }

    fn interval_for(target_fps: Option<f32>) -> Option<Duration> {
        target_fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_nanos((1e9 / f64::from(fps)).round() as u64))
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_targets_disable_limiting() {
        assert!(FramePacer::new(None).interval().is_none());
        assert!(FramePacer::new(Some(0.0)).interval().is_none());
        assert!(FramePacer::new(Some(-30.0)).interval().is_none());
        assert!(FramePacer::new(Some(f32::NAN)).interval().is_none());
    }

    #[test]
    fn remaining_shrinks_as_time_passes() {
        let pacer = FramePacer::new(Some(10.0));
        let start = pacer.last;

        assert_eq!(pacer.remaining(start), Duration::from_millis(100));
        assert_eq!(
            pacer.remaining(start + Duration::from_millis(40)),
            Duration::from_millis(60)
        );
        assert_eq!(pacer.remaining(start + Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn interval_is_rounded_to_whole_nanoseconds() {
        assert_eq!(FramePacer::new(Some(10.0)).interval(), Some(Duration::from_millis(100)));
        assert_eq!(FramePacer::new(Some(60.0)).interval(), Some(Duration::from_nanos(16_666_667)));
        assert_eq!(FramePacer::new(Some(144.0)).interval(), Some(Duration::from_nanos(6_944_444)));
    }

    #[test]
    fn pace_waits_out_the_interval() {
        let mut pacer = FramePacer::new(Some(50.0));
        pacer.pace();
        let before = Instant::now();
        pacer.pace();
        assert!(before.elapsed() >= Duration::from_millis(15));
    }
}
