use std::time::{Duration, Instant};

/// Frame timer: [`begin`](Tick::begin) marks the start of a frame,
/// [`end`](Tick::end) records how long it took.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    start: Instant,
    delta: Duration,
}

impl Default for Tick {
    fn default() -> Self {
        Self::new()
    }
}

impl Tick {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            delta: Duration::ZERO,
        }
    }

    /// Marks the start of a frame.
    pub fn begin(&mut self) {
        self.start = Instant::now();
    }

    /// Records the time since [`begin`](Self::begin) as the frame delta.
    pub fn end(&mut self) {
        self.delta = self.start.elapsed();
    }

    /// Time since the last `begin`, frame still running.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Duration of the last completed frame.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_secs(&self) -> f64 {
        self.delta.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn delta_is_zero_before_first_frame() {
        let tick = Tick::new();
        assert_eq!(tick.delta(), Duration::ZERO);
        assert_eq!(tick.delta_secs(), 0.0);
    }

    #[test]
    fn end_records_frame_duration() {
        let mut tick = Tick::new();
        tick.begin();
        thread::sleep(Duration::from_millis(5));
        tick.end();

        assert!(tick.delta() >= Duration::from_millis(5));
        assert!(tick.delta_secs() >= 0.005);
        assert!(tick.elapsed() >= tick.delta());
    }

    #[test]
    fn delta_is_frozen_until_next_end() {
        let mut tick = Tick::new();
        tick.begin();
        tick.end();
        let delta = tick.delta();

        thread::sleep(Duration::from_millis(2));
        assert_eq!(tick.delta(), delta);
    }
}
