//! Render-path counters, inspectable from tests and logged periodically.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RenderMetrics {
    pub frames: AtomicU64,
    pub windows_reframed: AtomicU64,
    pub mode_lines_drawn: AtomicU64,
    pub rows_composed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderMetricsSnapshot {
    pub frames: u64,
    pub windows_reframed: u64,
    pub mode_lines_drawn: u64,
    pub rows_composed: u64,
}

impl RenderMetrics {
    pub fn snapshot(&self) -> RenderMetricsSnapshot {
        RenderMetricsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            windows_reframed: self.windows_reframed.load(Ordering::Relaxed),
            mode_lines_drawn: self.mode_lines_drawn.load(Ordering::Relaxed),
            rows_composed: self.rows_composed.load(Ordering::Relaxed),
        }
    }
}
