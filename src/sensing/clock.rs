use std::time::Instant;

/// Monotonic clock shared by every stage of the pipeline.
///
/// Timestamps are seconds since the clock was created, never wall-clock time,
/// so NTP or OS clock adjustments cannot reorder samples.
#[derive(Debug, Clone, Copy)]
pub struct StudyClock {
    origin: Instant,
}

impl Default for StudyClock {
    fn default() -> Self {
        Self::new()
    }
}

impl StudyClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}
