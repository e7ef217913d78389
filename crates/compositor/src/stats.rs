use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Destination;

/// Counters describing what the render worker has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    /// Draw ticks completed while running.
    pub ticks: u64,
    /// Presentations per destination.
    pub main_frames: u64,
    pub encoder_frames: u64,
    pub photo_frames: u64,
    pub preview_frames: u64,
    /// Ticks on which the frame rate limiter skipped encoder and preview.
    pub limited_ticks: u64,
}

impl RenderStats {
    pub fn frames(&self, destination: Destination) -> u64 {
        match destination {
            Destination::Main => self.main_frames,
            Destination::Encoder => self.encoder_frames,
            Destination::Photo => self.photo_frames,
            Destination::Preview => self.preview_frames,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    ticks: AtomicU64,
    main_frames: AtomicU64,
    encoder_frames: AtomicU64,
    photo_frames: AtomicU64,
    preview_frames: AtomicU64,
    limited_ticks: AtomicU64,
}

impl StatsCounters {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_limited(&self) {
        self.limited_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self, destination: Destination) {
        let counter = match destination {
            Destination::Main => &self.main_frames,
            Destination::Encoder => &self.encoder_frames,
            Destination::Photo => &self.photo_frames,
            Destination::Preview => &self.preview_frames,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RenderStats {
        RenderStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            main_frames: self.main_frames.load(Ordering::Relaxed),
            encoder_frames: self.encoder_frames.load(Ordering::Relaxed),
            photo_frames: self.photo_frames.load(Ordering::Relaxed),
            preview_frames: self.preview_frames.load(Ordering::Relaxed),
            limited_ticks: self.limited_ticks.load(Ordering::Relaxed),
        }
    }
}
