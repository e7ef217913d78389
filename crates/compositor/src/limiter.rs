use std::time::{Duration, Instant};

/// Throttles the encoder and preview destinations to a target frame rate.
///
/// The limiter is consulted once per tick. A tick that passes schedules the
/// next deadline one frame interval later; ticks arriving before that deadline
/// are limited. Deadlines advance by whole intervals so a steady source keeps
/// the requested rate instead of drifting below it, and a stalled source does
/// not earn a burst of catch-up frames.
#[derive(Debug, Clone)]
pub(crate) struct FpsLimiter {
    fps: u32,
    interval: Option<Duration>,
    next_deadline: Option<Instant>,
}

impl FpsLimiter {
    pub fn new(fps: u32) -> Self {
        let mut limiter = Self {
            fps: 0,
            interval: None,
            next_deadline: None,
        };
        limiter.set_fps(fps);
        limiter
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Changes the target rate and restarts timing. Zero disables limiting.
    pub fn set_fps(&mut self, fps: u32) {
        self.fps = fps;
        self.interval = frame_interval(fps);
        self.next_deadline = None;
    }

    /// Re-targets only when the requested rate differs from the current one.
    pub fn sync_fps(&mut self, fps: u32) {
        if fps != self.fps() {
            tracing::debug!(previous = self.fps, fps, "frame rate limit changed");
            self.set_fps(fps);
        }
    }

    /// Returns `true` when the destination draw should be skipped this tick.
    pub fn limit(&mut self, now: Instant) -> bool {
        let Some(interval) = self.interval else {
            return false;
        };

        match self.next_deadline {
            Some(deadline) if now < deadline => true,
            Some(deadline) => {
                let mut next = deadline + interval;
                if next <= now {
                    next = now + interval;
                }
                self.next_deadline = Some(next);
                false
            }
            None => {
                self.next_deadline = Some(now + interval);
                false
            }
        }
    }
}

impl Default for FpsLimiter {
    fn default() -> Self {
        Self::new(0)
    }
}

pub(crate) fn frame_interval(fps: u32) -> Option<Duration> {
    if fps == 0 {
        None
    } else {
        Some(Duration::from_secs_f64(1.0 / f64::from(fps)))
    }
}
