use camino::Utf8PathBuf;
use std::time::Duration;

/// Maximum number of concurrent requests per session.
///
/// **IMPORTANT:** This is hardcoded to 1 because every preview, process, and
/// frame edit reads and may swap `current_input_path`. Concurrent mutation
/// would leave the session pointing at a half-written or deleted temp file.
/// The constraint is enforced in [`crate::services::Toolkit`] with a
/// `tokio::sync::Mutex` held for the duration of each request.
pub const MAX_CONCURRENT_SESSION_REQUESTS: usize = 1;

/// Single source of truth for one GUI/CLI session over one image.
///
/// Created when a tool is invoked on a file, destroyed when the session's
/// window is torn down. Frame edits and replacement loads produce a new
/// canonical asset; `current_input_path` is swapped only after the new file
/// is confirmed valid.
///
/// # Thread Safety
///
/// `SessionState` is wrapped in `Arc<RwLock<SessionState>>` by
/// [`crate::session::SessionManager`]. Never hold the raw struct across
/// requests - use [`SessionManager`](crate::session::SessionManager) methods:
/// - [`read()`](crate::session::SessionManager::read) for read-only access
/// - [`update()`](crate::session::SessionManager::update) for mutations with change events
#[derive(Clone, Debug)]
pub struct SessionState {
    /// The file the session was opened on. Durable outputs derive their
    /// directory and base name from this path even after frame edits.
    pub source_path: Utf8PathBuf,

    /// The asset current operations read from. Starts as `source_path`;
    /// frame edits and replacement loads point it at a new temp file.
    pub current_input_path: Utf8PathBuf,

    /// Whether `current_input_path` is a temp file this session owns and
    /// must delete when it is superseded or the session ends.
    pub current_input_is_temp: bool,

    /// Background color sampled from the image corners at load, cached for
    /// the lifetime of the session. None when sampling failed.
    pub detected_background_color: Option<String>,

    // Animation state (frame_count == 1 for static images)
    pub frame_count: usize,
    pub original_frame_delay_cs: Option<u32>,

    // Runtime state
    pub is_processing: bool,
    pub current_operation: String,

    // Settings
    pub engine_timeout: Duration,
    pub preview_max_dim: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            source_path: Utf8PathBuf::new(),
            current_input_path: Utf8PathBuf::new(),
            current_input_is_temp: false,
            detected_background_color: None,
            frame_count: 1,
            original_frame_delay_cs: None,
            is_processing: false,
            current_operation: String::new(),
            engine_timeout: Duration::from_secs(30),
            preview_max_dim: 512,
        }
    }
}

impl SessionState {
    /// Whether the loaded asset is a multi-frame (animated) container.
    pub fn is_animated(&self) -> bool {
        self.frame_count >= 2
    }

    /// Whether a session has been opened on a real file.
    pub fn is_loaded(&self) -> bool {
        !self.current_input_path.as_str().is_empty()
    }

    /// Reset per-request runtime state, keeping the loaded asset.
    pub fn reset_runtime_state(&mut self) {
        self.is_processing = false;
        self.current_operation.clear();
    }
}
