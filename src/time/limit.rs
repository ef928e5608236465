use crate::time::Tick;

use std::time::Duration;

const MIN_FPS: u16 = 5;
const MAX_FPS: u16 = 300;

/// Framerate cap. Zero means unlimited; anything else is clamped to
/// `5..=300` frames per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameLimit {
    fps: u16,
}

impl FrameLimit {
    pub fn new(fps: u16) -> Self {
        let mut limit = Self::default();
        limit.set(fps);
        limit
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn set(&mut self, fps: u16) {
        self.fps = if fps == 0 {
            0
        } else {
            fps.clamp(MIN_FPS, MAX_FPS)
        };
    }

    pub fn fps(&self) -> u16 {
        self.fps
    }

    /// Time one frame may take, or `None` when unlimited.
    pub fn budget(&self) -> Option<Duration> {
        (self.fps > 0).then(|| Duration::from_secs(1) / u32::from(self.fps))
    }

    /// Time left in the current frame of `tick`, or `None` when unlimited.
    /// Zero once the frame is over budget.
    pub fn remaining(&self, tick: &Tick) -> Option<Duration> {
        self.budget()
            .map(|budget| budget.saturating_sub(tick.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_unlimited() {
        let limit = FrameLimit::new(0);
        assert_eq!(limit.fps(), 0);
        assert_eq!(limit.budget(), None);
        assert_eq!(limit.remaining(&Tick::new()), None);
        assert_eq!(limit, FrameLimit::unlimited());
    }

    #[test]
    fn framerate_is_clamped() {
        assert_eq!(FrameLimit::new(1).fps(), 5);
        assert_eq!(FrameLimit::new(1000).fps(), 300);
        assert_eq!(FrameLimit::new(60).fps(), 60);
    }

    #[test]
    fn budget_matches_framerate() {
        assert_eq!(
            FrameLimit::new(50).budget(),
            Some(Duration::from_millis(20))
        );
    }

    #[test]
    fn remaining_never_exceeds_budget() {
        let limit = FrameLimit::new(10);
        let mut tick = Tick::new();
        tick.begin();

        let rest = limit.remaining(&tick).unwrap();
        assert!(rest <= Duration::from_millis(100));
    }
}
