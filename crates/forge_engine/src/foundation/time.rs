//! Frame timing

use std::time::Instant;

/// Measures the time between frames
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Advance to the next frame and return its delta in seconds
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.advance(now.duration_since(self.last_frame).as_secs_f32());
        self.last_frame = now;
        self.delta_time
    }

    fn advance(&mut self, delta: f32) {
        self.delta_time = delta;
        self.total_time += delta;
        self.frame_count += 1;
    }

    /// Seconds between the last two ticks
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Seconds accumulated over all ticks
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Number of ticks so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average frames per second since creation
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_count as f32 / self.total_time
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_advance_accumulates() {
        let mut timer = Timer::new();
        timer.advance(0.25);
        timer.advance(0.25);

        assert_eq!(timer.frame_count(), 2);
        assert_relative_eq!(timer.total_time(), 0.5);
        assert_relative_eq!(timer.average_fps(), 4.0);
    }

    #[test]
    fn test_tick_is_non_negative() {
        let mut timer = Timer::new();
        assert!(timer.tick() >= 0.0);
        assert_eq!(timer.frame_count(), 1);
        assert_eq!(Timer::new().average_fps(), 0.0);
    }
}
