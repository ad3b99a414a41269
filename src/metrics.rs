// Performance metrics module
//
// Provides lightweight metrics tracking for monitoring pipeline performance

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Global performance metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// Metrics are collected throughout the session lifecycle and can be
/// logged periodically or on shutdown for performance analysis.
#[derive(Debug)]
pub struct Metrics {
    /// Total number of pipeline stages completed
    pub stages_completed: AtomicUsize,

    /// Total number of pipeline stages that failed
    pub stages_failed: AtomicUsize,

    /// Total number of engine subprocess calls
    pub engine_calls: AtomicU64,

    /// Total engine subprocess time in milliseconds
    pub total_engine_time_ms: AtomicU64,

    /// Number of previews generated
    pub previews_generated: AtomicU64,

    /// Number of frame edits applied
    pub frames_edited: AtomicU64,

    /// Number of session event broadcasts sent
    pub session_broadcasts: AtomicU64,

    /// Number of session broadcast errors (channel full or closed)
    pub session_broadcast_errors: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            stages_completed: AtomicUsize::new(0),
            stages_failed: AtomicUsize::new(0),
            engine_calls: AtomicU64::new(0),
            total_engine_time_ms: AtomicU64::new(0),
            previews_generated: AtomicU64::new(0),
            frames_edited: AtomicU64::new(0),
            session_broadcasts: AtomicU64::new(0),
            session_broadcast_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed pipeline stage
    pub fn record_stage_completed(&self) {
        self.stages_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed pipeline stage
    pub fn record_stage_failed(&self) {
        self.stages_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one engine subprocess call and its duration
    pub fn record_engine_call(&self, duration: Duration) {
        self.engine_calls.fetch_add(1, Ordering::Relaxed);
        self.total_engine_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a generated preview
    pub fn record_preview(&self) {
        self.previews_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an applied frame edit
    pub fn record_frame_edit(&self) {
        self.frames_edited.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session event broadcast
    pub fn record_session_broadcast(&self) {
        self.session_broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session broadcast error
    pub fn record_session_broadcast_error(&self) {
        self.session_broadcast_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get average engine call time in milliseconds
    pub fn avg_engine_time_ms(&self) -> f64 {
        let total = self.total_engine_time_ms.load(Ordering::Relaxed);
        let count = self.engine_calls.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Performance Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Stages: {} completed, {} failed",
            self.stages_completed.load(Ordering::Relaxed),
            self.stages_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Engine: {} calls, {:.2}s total (avg: {:.2}ms per call)",
            self.engine_calls.load(Ordering::Relaxed),
            self.total_engine_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_engine_time_ms()
        );
        tracing::info!(
            "Previews: {}, frame edits: {}",
            self.previews_generated.load(Ordering::Relaxed),
            self.frames_edited.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Session broadcasts: {}, errors: {}",
            self.session_broadcasts.load(Ordering::Relaxed),
            self.session_broadcast_errors.load(Ordering::Relaxed)
        );
    }

    /// Log periodic metrics (for long-running sessions)
    pub fn log_periodic(&self) {
        tracing::info!(
            "Metrics: {} stages run, {} engine calls, {} previews, uptime {:.0}s",
            self.stages_completed.load(Ordering::Relaxed)
                + self.stages_failed.load(Ordering::Relaxed),
            self.engine_calls.load(Ordering::Relaxed),
            self.previews_generated.load(Ordering::Relaxed),
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
