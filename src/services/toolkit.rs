use crate::metrics::Metrics;
use crate::models::stage::{PipelineRequest, PreviewResult, ProcessResult};
use crate::models::SessionState;
use crate::services::animation::{AnimationController, ExportMode, FrameError};
use crate::services::artifact::ScratchSpace;
use crate::services::engine::ImageOps;
use crate::services::executor::{PipelineError, PipelineExecutor};
use crate::services::preview::PreviewGenerator;
use crate::session::SessionManager;
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A frame-level edit applied to the session's current animated asset.
#[derive(Debug, Clone)]
pub enum FrameEdit {
    Delete { index: usize },
    Replace { index: usize, image: Vec<u8> },
    Simplify { skip_factor: usize },
    ResampleDelay { delay_cs: u32 },
}

/// Public surface of one open-image session.
///
/// Owns the engine, the session state, the scratch space, and the service
/// objects, and serializes requests: previews, pipeline runs, and frame
/// edits all read and may swap `current_input_path`, so each request holds
/// the session lock for its full duration. See
/// [`MAX_CONCURRENT_SESSION_REQUESTS`](crate::models::MAX_CONCURRENT_SESSION_REQUESTS).
pub struct Toolkit<E: ImageOps> {
    engine: Arc<E>,
    session: SessionManager,
    scratch: ScratchSpace,
    executor: PipelineExecutor<E>,
    preview: PreviewGenerator<E>,
    animation: AnimationController<E>,
    metrics: Arc<Metrics>,
    request_lock: Mutex<()>,
}

impl<E: ImageOps> Toolkit<E> {
    pub fn new(engine: Arc<E>, scratch: ScratchSpace, preview_max_dim: u32) -> Self {
        Self {
            executor: PipelineExecutor::new(Arc::clone(&engine)),
            preview: PreviewGenerator::new(Arc::clone(&engine), preview_max_dim),
            animation: AnimationController::new(Arc::clone(&engine)),
            engine,
            session: SessionManager::new(),
            scratch,
            metrics: Arc::new(Metrics::new()),
            request_lock: Mutex::new(()),
        }
    }

    /// Share a metrics instance with the engine or the host application.
    /// The session manager counts its event broadcasts on it too.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.session = self.session.with_metrics(Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    /// Open the session on a source image.
    ///
    /// Samples the corner background color once and caches it for the
    /// session's lifetime; a failed sample is non-fatal (background removal
    /// will report the missing color if attempted). Frame metadata is read
    /// for multi-frame container formats only.
    pub async fn open(&self, source: &Utf8Path) -> Result<SessionState> {
        let _guard = self.request_lock.lock().await;

        self.engine
            .dimensions(source)
            .await
            .with_context(|| format!("Cannot open {source}"))?;

        let background = match self.engine.dominant_corner_color(source).await {
            Ok(color) => Some(color),
            Err(e) => {
                tracing::warn!("Background sampling failed for {}: {}", source, e);
                None
            }
        };

        let mut frame_count = 1;
        let mut frame_delay = None;
        if self.engine.is_multi_frame_format(source) {
            frame_count = self.engine.frame_count(source).await.unwrap_or(1);
            if frame_count >= 2 {
                frame_delay = self.engine.frame_delay(source).await.ok();
            }
        }

        self.session.open(source, background, frame_count, frame_delay);
        tracing::info!(
            "Opened session on {} ({} frame{})",
            source,
            frame_count,
            if frame_count == 1 { "" } else { "s" }
        );
        Ok(self.session.snapshot())
    }

    /// Render a scratch-only preview of the pipeline's effect on the
    /// session's current input.
    pub async fn run_preview(
        &self,
        request: &PipelineRequest,
        full_resolution: bool,
    ) -> Result<PreviewResult, PipelineError> {
        let _guard = self.request_lock.lock().await;
        let (input, background) = self.loaded_input()?;

        self.session.start_processing("Generating preview");
        let result = self
            .preview
            .preview(
                &input,
                request,
                background.as_deref(),
                &self.scratch,
                full_resolution,
            )
            .await;
        self.session.finish_processing();
        if result.is_ok() {
            self.metrics.record_preview();
        }
        result
    }

    /// Run the pipeline against the session's current input, producing
    /// durable outputs named from the original source path.
    pub async fn run_process(
        &self,
        request: &PipelineRequest,
    ) -> Result<ProcessResult, PipelineError> {
        let _guard = self.request_lock.lock().await;
        let (input, background) = self.loaded_input()?;
        let source = self.session.read(|s| s.source_path.clone());

        self.session.start_processing("Processing image");
        let result = self
            .executor
            .execute(&input, &source, request, background.as_deref(), &self.scratch)
            .await;
        self.session.finish_processing();
        match &result {
            Ok(_) => {
                for _ in request.active_stages() {
                    self.metrics.record_stage_completed();
                }
            }
            Err(_) => self.metrics.record_stage_failed(),
        }
        result
    }

    /// Preview one frame of an animated asset, optionally with the
    /// pipeline's stages applied to it. `full_resolution` bypasses the
    /// preview cap for frame scrubbing.
    pub async fn run_frame_preview(
        &self,
        index: usize,
        request: &PipelineRequest,
        full_resolution: bool,
    ) -> Result<PreviewResult, PipelineError> {
        let _guard = self.request_lock.lock().await;
        let (input, background) = self.loaded_input()?;

        let frame = self
            .animation
            .extract_representative_frame(&input, index, &self.scratch)
            .await
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;

        let result = self
            .preview
            .preview(
                frame.path(),
                request,
                background.as_deref(),
                &self.scratch,
                full_resolution,
            )
            .await;
        if result.is_ok() {
            self.metrics.record_preview();
        }
        result
    }

    /// Apply one frame edit, swapping the session's canonical input to the
    /// edited asset on success.
    pub async fn run_frame_edit(&self, edit: FrameEdit) -> Result<SessionState, FrameError> {
        let _guard = self.request_lock.lock().await;
        let input = self
            .session
            .read(|s| s.is_loaded().then(|| s.current_input_path.clone()))
            .ok_or(FrameError::NoSession)?;

        self.session.start_processing("Editing frames");
        let result = self.apply_frame_edit(&input, edit).await;
        self.session.finish_processing();
        result?;
        self.metrics.record_frame_edit();
        Ok(self.session.snapshot())
    }

    async fn apply_frame_edit(&self, input: &Utf8Path, edit: FrameEdit) -> Result<(), FrameError> {
        let outcome = match edit {
            FrameEdit::Delete { index } => {
                self.animation.delete_frame(input, index, &self.scratch).await?
            }
            FrameEdit::Replace { index, image } => {
                self.animation
                    .replace_frame(input, index, &image, &self.scratch)
                    .await?
            }
            FrameEdit::Simplify { skip_factor } => {
                self.animation.simplify(input, skip_factor, &self.scratch).await?
            }
            FrameEdit::ResampleDelay { delay_cs } => {
                // In-place metadata restamp; no asset swap needed.
                self.engine.set_frame_delay(input, delay_cs).await?;
                self.session.update(|s| {
                    s.original_frame_delay_cs = Some(delay_cs);
                });
                return Ok(());
            }
        };

        let delay = match outcome.adjusted_delay_cs {
            Some(d) => Some(d),
            None => self.session.read(|s| s.original_frame_delay_cs),
        };
        let new_path = outcome.artifact.into_path();
        self.session
            .swap_current_input(new_path, true, outcome.new_frame_count, delay)
            .map_err(|e| FrameError::Io(std::io::Error::other(e.to_string())))?;
        Ok(())
    }

    /// Export the session's animated asset to durable output.
    pub async fn run_gif_export(
        &self,
        mode: ExportMode,
        request: &PipelineRequest,
        restamp_delay_cs: Option<u32>,
        restamp_loops: Option<u32>,
    ) -> Result<ProcessResult, PipelineError> {
        let _guard = self.request_lock.lock().await;
        let (input, background) = self.loaded_input()?;
        let source = self.session.read(|s| s.source_path.clone());

        self.session.start_processing("Exporting animation");
        let result = self
            .animation
            .export_gif(
                &input,
                &source,
                mode,
                request,
                background.as_deref(),
                restamp_delay_cs,
                restamp_loops,
                &self.scratch,
            )
            .await;
        self.session.finish_processing();
        result
    }

    /// Load caller-supplied image bytes as the session's new input asset.
    ///
    /// The bytes are written to scratch and validated as a readable image
    /// before the session swaps to them; an unreadable payload leaves the
    /// session untouched.
    pub async fn load_replacement_image(&self, image: &[u8], ext: &str) -> Result<SessionState> {
        let _guard = self.request_lock.lock().await;
        if !self.session.read(|s| s.is_loaded()) {
            anyhow::bail!("No session is open");
        }

        let artifact = self.scratch.allocate(ext);
        fs::write(artifact.path(), image)
            .with_context(|| format!("Failed to write replacement to {}", artifact.path()))?;

        self.engine
            .dimensions(artifact.path())
            .await
            .context("Replacement image is not readable")?;

        let mut frame_count = 1;
        let mut frame_delay = None;
        if self.engine.is_multi_frame_format(artifact.path()) {
            frame_count = self.engine.frame_count(artifact.path()).await.unwrap_or(1);
            if frame_count >= 2 {
                frame_delay = self.engine.frame_delay(artifact.path()).await.ok();
            }
        }

        let new_path = artifact.into_path();
        self.session
            .swap_current_input(new_path, true, frame_count, frame_delay)?;
        Ok(self.session.snapshot())
    }

    fn loaded_input(&self) -> Result<(camino::Utf8PathBuf, Option<String>), PipelineError> {
        self.session
            .read(|s| {
                s.is_loaded()
                    .then(|| (s.current_input_path.clone(), s.detected_background_color.clone()))
            })
            .ok_or_else(|| PipelineError::InvalidInput("no session is open".to_string()))
    }
}
