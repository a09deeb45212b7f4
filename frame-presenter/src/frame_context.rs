use std::time::{Duration, Instant};

/// Per-frame timing handed to the command recorder.
///
/// The application owns the clock and advances it once per loop iteration
/// with [`FrameContext::tick`]. A rebuilt frame does not have to be ticked
/// again before retrying.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub frame_number: u64,
    /// Time since the previous tick.
    pub delta: Duration,
    /// Time accumulated across all ticks.
    pub elapsed: Duration,
    last_tick: Instant,
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameContext {
    pub fn new() -> Self {
        Self {
            frame_number: 0,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            last_tick: Instant::now(),
        }
    }

    /// Advances the clock by the wall time since the last tick.
    pub fn tick(&mut self) {
        let now = Instant::now();
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.advance(delta);
    }

    /// Advances the clock by a fixed step. Useful for deterministic replays.
    pub fn tick_with(&mut self, delta: Duration) {
        self.last_tick += delta;
        self.advance(delta);
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    fn advance(&mut self, delta: Duration) {
        self.frame_number += 1;
        self.delta = delta;
        self.elapsed += delta;
    }
}
