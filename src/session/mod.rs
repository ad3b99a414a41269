// Session management module
//
// This module provides the SessionManager which wraps SessionState with
// thread-safe access using Arc<RwLock<T>> and emits change events for
// frontend updates.

use crate::metrics::Metrics;
use crate::models::SessionState;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

/// Change events emitted when session state is modified
///
/// These events notify interested parties (primarily the frontend) about
/// session changes without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The session's canonical input asset has changed (frame edit or
    /// replacement image load)
    InputSwapped {
        path: Utf8PathBuf,
        frame_count: usize,
    },

    /// Background color was sampled from the loaded asset
    BackgroundDetected {
        color: Option<String>,
    },

    /// A pipeline or frame operation has started
    ProcessingStarted {
        operation: String,
    },

    /// The running operation has finished
    ProcessingFinished,

    /// Current operation description has changed
    OperationChanged {
        operation: String,
    },

    /// Frame count or timing changed without swapping the input path
    FramesEdited {
        frame_count: usize,
        delay_cs: Option<u32>,
    },

    /// Settings have been updated
    SettingsChanged,

    /// Session has been reset
    SessionReset,
}

/// Thread-safe session manager with event emission
///
/// This is the central state component for one open image:
/// - Provides thread-safe access to [`SessionState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`SessionEvent`]s
/// - Owns the validate-then-swap protocol for the canonical input asset
/// - Supports subscribing to changes via tokio broadcast channels
///
/// # Usage
///
/// Always use `SessionManager` instead of accessing [`SessionState`] directly:
/// - [`read()`](Self::read) for reading state without cloning
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to session changes
pub struct SessionManager {
    /// The session state protected by RwLock for thread-safe access
    state: Arc<RwLock<SessionState>>,

    /// Broadcast channel for emitting session change events
    event_tx: broadcast::Sender<SessionEvent>,

    /// Optional counters for emitted events and failed sends
    metrics: Option<Arc<Metrics>>,
}

impl SessionManager {
    /// Create a new SessionManager with default (unloaded) state
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            event_tx,
            metrics: None,
        }
    }

    /// Count broadcasts on a shared metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Get a read-only snapshot of the current session state
    pub fn snapshot(&self) -> SessionState {
        self.state.read().unwrap().clone()
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// This is the primary way to modify session state. It captures the old
    /// state, applies the update function, detects what changed, and emits
    /// the corresponding events.
    pub fn update<F>(&self, update_fn: F) -> Vec<SessionEvent>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.state.write().unwrap();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = self.detect_changes(&old_state, &state);

        for change in &changes {
            self.broadcast(change.clone());
        }

        changes
    }

    /// Send one event, counting the outcome. A send error only means no
    /// receiver is currently subscribed.
    fn broadcast(&self, event: SessionEvent) {
        match self.event_tx.send(event) {
            Ok(_) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_session_broadcast();
                }
            }
            Err(_) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_session_broadcast_error();
                }
            }
        }
    }

    /// Subscribe to session change events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn detect_changes(&self, old: &SessionState, new: &SessionState) -> Vec<SessionEvent> {
        let mut changes = Vec::new();

        if old.current_input_path != new.current_input_path {
            changes.push(SessionEvent::InputSwapped {
                path: new.current_input_path.clone(),
                frame_count: new.frame_count,
            });
        } else if old.frame_count != new.frame_count
            || old.original_frame_delay_cs != new.original_frame_delay_cs
        {
            changes.push(SessionEvent::FramesEdited {
                frame_count: new.frame_count,
                delay_cs: new.original_frame_delay_cs,
            });
        }

        if old.detected_background_color != new.detected_background_color {
            changes.push(SessionEvent::BackgroundDetected {
                color: new.detected_background_color.clone(),
            });
        }

        if old.is_processing != new.is_processing {
            if new.is_processing {
                changes.push(SessionEvent::ProcessingStarted {
                    operation: new.current_operation.clone(),
                });
            } else {
                changes.push(SessionEvent::ProcessingFinished);
            }
        } else if old.current_operation != new.current_operation {
            changes.push(SessionEvent::OperationChanged {
                operation: new.current_operation.clone(),
            });
        }

        if old.engine_timeout != new.engine_timeout || old.preview_max_dim != new.preview_max_dim {
            changes.push(SessionEvent::SettingsChanged);
        }

        changes
    }

    // Convenience methods for common session updates

    /// Open the session on a source file, recording the sampled background
    /// color and frame metadata.
    pub fn open(
        &self,
        source: &Utf8Path,
        background_color: Option<String>,
        frame_count: usize,
        frame_delay_cs: Option<u32>,
    ) -> Vec<SessionEvent> {
        self.update(|state| {
            state.source_path = source.to_path_buf();
            state.current_input_path = source.to_path_buf();
            state.current_input_is_temp = false;
            state.detected_background_color = background_color;
            state.frame_count = frame_count;
            state.original_frame_delay_cs = frame_delay_cs;
            state.reset_runtime_state();
        })
    }

    /// Mark a request as running with a human-readable operation label
    pub fn start_processing(&self, operation: impl Into<String>) -> Vec<SessionEvent> {
        let operation = operation.into();
        self.update(|state| {
            state.is_processing = true;
            state.current_operation = operation;
        })
    }

    /// Mark the running request as finished
    pub fn finish_processing(&self) -> Vec<SessionEvent> {
        self.update(|state| {
            state.reset_runtime_state();
        })
    }

    /// Adopt a new canonical input asset, validating before the swap.
    ///
    /// The new file must already exist on disk: callers produce it fully
    /// (frame edit output, replacement image) and only then swap it in, so
    /// the session never points at a half-written file. The superseded temp
    /// input, if any, is deleted after the swap.
    pub fn swap_current_input(
        &self,
        new_path: Utf8PathBuf,
        is_temp: bool,
        frame_count: usize,
        frame_delay_cs: Option<u32>,
    ) -> anyhow::Result<Vec<SessionEvent>> {
        if !new_path.exists() {
            anyhow::bail!("Cannot swap session input: {new_path} does not exist");
        }

        let (old_path, old_was_temp) =
            self.read(|s| (s.current_input_path.clone(), s.current_input_is_temp));

        let changes = self.update(|state| {
            state.current_input_path = new_path.clone();
            state.current_input_is_temp = is_temp;
            state.frame_count = frame_count;
            state.original_frame_delay_cs = frame_delay_cs;
        });

        if old_was_temp && old_path != new_path && old_path.exists() {
            if let Err(e) = fs::remove_file(&old_path) {
                tracing::warn!("Failed to clean superseded session input {}: {}", old_path, e);
            }
        }

        Ok(changes)
    }

    /// Reset the session to its unloaded default, cleaning any owned temp
    /// input.
    pub fn reset(&self) -> Vec<SessionEvent> {
        let (old_path, old_was_temp) =
            self.read(|s| (s.current_input_path.clone(), s.current_input_is_temp));

        let mut changes = self.update(|state| {
            *state = SessionState::default();
        });

        if old_was_temp && old_path.exists() {
            if let Err(e) = fs::remove_file(&old_path) {
                tracing::warn!("Failed to clean session input {}: {}", old_path, e);
            }
        }

        let reset_event = SessionEvent::SessionReset;
        self.broadcast(reset_event.clone());
        changes.push(reset_event);

        changes
    }

    /// Load tunables from UserConfig
    pub fn load_from_user_config(
        &self,
        user_config: &crate::models::UserConfig,
    ) -> Vec<SessionEvent> {
        self.update(|state| {
            let settings = &user_config.piclet_settings;

            state.engine_timeout = Duration::from_secs(settings.engine_timeout as u64);
            state.preview_max_dim = settings.preview_max_dim;

            tracing::info!(
                "Loaded user config: engine_timeout={}s, preview_max_dim={}",
                settings.engine_timeout,
                settings.preview_max_dim
            );
        })
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make SessionManager cloneable for sharing across tasks
impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            event_tx: self.event_tx.clone(),
            metrics: self.metrics.clone(),
        }
    }
}
