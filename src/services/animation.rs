use crate::models::stage::{OutputDescriptor, PipelineRequest, ProcessResult};
use crate::services::artifact::{ScratchSpace, WorkingArtifact, derive_output_dir, derive_output_path};
use crate::services::engine::{EngineError, ImageOps};
use crate::services::executor::{PipelineError, PipelineExecutor};
use camino::Utf8Path;
use std::fs;
use std::sync::Arc;
use thiserror::Error;

/// Errors from frame-level edits on an animated asset.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame {index} out of range (asset has {count} frames)")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("cannot delete the last remaining frame")]
    LastFrame,

    #[error("skip factor must be at least 2")]
    InvalidSkipFactor,

    #[error("asset is not animated")]
    NotAnimated,

    #[error("no session is open")]
    NoSession,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("process error: {0}")]
    Io(#[from] std::io::Error),
}

/// How an animated asset leaves the session as durable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Extract (and optionally pipeline) one frame to a durable PNG.
    SingleFrame { index: usize },
    /// Extract every frame as individual PNGs into `{basename}_frames/`.
    AllFramesAsStills,
    /// Run the full pipeline against the whole animated asset.
    ReprocessedGif,
}

/// Result of an edit that produced a new canonical animated asset.
///
/// The artifact is handed to the session, which swaps it in as the new
/// current input only after validating it.
#[derive(Debug)]
pub struct FrameEditOutcome {
    pub artifact: WorkingArtifact,
    pub new_frame_count: usize,
    /// Set when the edit changed frame timing (simplify).
    pub adjusted_delay_cs: Option<u32>,
}

/// Frame-level operations over a multi-frame asset.
///
/// Edits never mutate the asset in place: each produces a new working file
/// the session adopts as its canonical input. Extraction and preview never
/// mutate anything.
pub struct AnimationController<E: ImageOps> {
    engine: Arc<E>,
    executor: PipelineExecutor<E>,
}

impl<E: ImageOps> AnimationController<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            executor: PipelineExecutor::new(Arc::clone(&engine)),
            engine,
        }
    }

    /// Pull one frame out as a static PNG for thumbnailing or as the source
    /// for single-frame pipeline operations. Never mutates the asset.
    pub async fn extract_representative_frame(
        &self,
        input: &Utf8Path,
        index: usize,
        scratch: &ScratchSpace,
    ) -> Result<WorkingArtifact, FrameError> {
        let count = self.engine.frame_count(input).await?;
        if index >= count {
            return Err(FrameError::IndexOutOfRange { index, count });
        }
        let out = scratch.allocate("png");
        self.engine.extract_frame(input, index, out.path()).await?;
        Ok(out)
    }

    /// Produce a new animated asset lacking one frame.
    ///
    /// Deleting the last remaining frame is rejected outright: a zero-frame
    /// container is not a valid asset, and a silent no-op would leave the
    /// session lying about its frame count.
    pub async fn delete_frame(
        &self,
        input: &Utf8Path,
        index: usize,
        scratch: &ScratchSpace,
    ) -> Result<FrameEditOutcome, FrameError> {
        let count = self.engine.frame_count(input).await?;
        if count <= 1 {
            return Err(FrameError::LastFrame);
        }
        if index >= count {
            return Err(FrameError::IndexOutOfRange { index, count });
        }

        let out = scratch.allocate("gif");
        self.engine.delete_frame(input, out.path(), index).await?;
        tracing::info!("Deleted frame {} ({} -> {} frames)", index, count, count - 1);
        Ok(FrameEditOutcome {
            artifact: out,
            new_frame_count: count - 1,
            adjusted_delay_cs: None,
        })
    }

    /// Substitute one frame's content with caller-supplied image bytes,
    /// preserving frame count and timing.
    pub async fn replace_frame(
        &self,
        input: &Utf8Path,
        index: usize,
        frame_bytes: &[u8],
        scratch: &ScratchSpace,
    ) -> Result<FrameEditOutcome, FrameError> {
        let count = self.engine.frame_count(input).await?;
        if index >= count {
            return Err(FrameError::IndexOutOfRange { index, count });
        }

        let replacement = scratch.allocate("png");
        fs::write(replacement.path(), frame_bytes)?;

        let out = scratch.allocate("gif");
        self.engine
            .replace_frame(input, out.path(), index, replacement.path())
            .await?;
        tracing::info!("Replaced frame {} of {}", index, count);
        Ok(FrameEditOutcome {
            artifact: out,
            new_frame_count: count,
            adjusted_delay_cs: None,
        })
    }

    /// Drop every Nth frame and stretch the per-frame delay so total
    /// playback duration is approximately preserved.
    pub async fn simplify(
        &self,
        input: &Utf8Path,
        skip_factor: usize,
        scratch: &ScratchSpace,
    ) -> Result<FrameEditOutcome, FrameError> {
        if skip_factor < 2 {
            return Err(FrameError::InvalidSkipFactor);
        }
        let count = self.engine.frame_count(input).await?;
        if count < 2 {
            return Err(FrameError::NotAnimated);
        }

        let original_delay = self.engine.frame_delay(input).await?;
        let out = scratch.allocate("gif");
        self.engine
            .simplify_frames(input, out.path(), skip_factor)
            .await?;

        let adjusted = original_delay.saturating_mul(skip_factor as u32);
        self.engine.set_frame_delay(out.path(), adjusted).await?;

        let new_count = count.div_ceil(skip_factor);
        tracing::info!(
            "Simplified {} -> {} frames, delay {} -> {}cs",
            count,
            new_count,
            original_delay,
            adjusted
        );
        Ok(FrameEditOutcome {
            artifact: out,
            new_frame_count: new_count,
            adjusted_delay_cs: Some(adjusted),
        })
    }

    /// Export the animated asset to a durable location.
    ///
    /// Temp intermediates are best-effort cleaned on failure; the durable
    /// output path never holds a partial write (stages compose in scratch
    /// and the result is moved into place).
    pub async fn export_gif(
        &self,
        input: &Utf8Path,
        source: &Utf8Path,
        mode: ExportMode,
        request: &PipelineRequest,
        background_color: Option<&str>,
        restamp_delay_cs: Option<u32>,
        restamp_loops: Option<u32>,
        scratch: &ScratchSpace,
    ) -> Result<ProcessResult, PipelineError> {
        let result = match mode {
            ExportMode::SingleFrame { index } => {
                self.export_single_frame(input, source, index, request, background_color, scratch)
                    .await
            }
            ExportMode::AllFramesAsStills => {
                self.export_all_frames(input, source, request, background_color, scratch)
                    .await
            }
            ExportMode::ReprocessedGif => {
                self.executor
                    .execute(input, source, request, background_color, scratch)
                    .await
            }
        }?;

        // Re-stamp timing metadata on gif outputs when explicitly asked.
        for output in &result.outputs {
            if output.path.extension() == Some("gif") {
                if let Some(delay) = restamp_delay_cs {
                    self.engine
                        .set_frame_delay(&output.path, delay)
                        .await
                        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
                }
                if let Some(loops) = restamp_loops {
                    self.engine
                        .set_loop_count(&output.path, loops)
                        .await
                        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
                }
            }
        }

        Ok(result)
    }

    /// One frame, optionally pipelined, to `{basename}_frame{N}[-{w}x{h}].png`.
    async fn export_single_frame(
        &self,
        input: &Utf8Path,
        source: &Utf8Path,
        index: usize,
        request: &PipelineRequest,
        background_color: Option<&str>,
        scratch: &ScratchSpace,
    ) -> Result<ProcessResult, PipelineError> {
        let frame = self
            .extract_representative_frame(input, index, scratch)
            .await
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;

        let mut log: Vec<String> = Vec::new();
        let mut current = frame;
        if !request.is_empty() && !request.original_image {
            current = self
                .pipeline_frame(current, request, background_color, scratch, &mut log)
                .await?;
        }

        let dims = self.engine.dimensions(current.path()).await.ok();
        let dest = derive_output_path(source, &format!("_frame{index}"), dims, "png");
        let path = current
            .persist(&dest)
            .map_err(|e| PipelineError::InvalidInput(format!("cannot write {dest}: {e}")))?;
        log.push(format!("wrote {path}"));

        Ok(ProcessResult {
            primary_output: Some(path.clone()),
            outputs: vec![OutputDescriptor::file(path, "extracted frame")],
            log,
        })
    }

    /// Every frame as a still into `{basename}_frames/`, optionally
    /// pipelining each. Per-frame pipeline failures are tolerated and
    /// surfaced as generated/requested counts.
    async fn export_all_frames(
        &self,
        input: &Utf8Path,
        source: &Utf8Path,
        request: &PipelineRequest,
        background_color: Option<&str>,
        scratch: &ScratchSpace,
    ) -> Result<ProcessResult, PipelineError> {
        let dest_dir = derive_output_dir(source, "_frames");
        fs::create_dir_all(&dest_dir)
            .map_err(|e| PipelineError::InvalidInput(format!("cannot create {dest_dir}: {e}")))?;

        // Extract into scratch first so the durable directory never holds
        // half a frame set on failure.
        let staging = scratch
            .allocate_dir("frames")
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        let frames = self
            .engine
            .extract_all_frames(input, &staging)
            .await
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;

        let mut log: Vec<String> = Vec::new();
        let requested = frames.len();
        let mut generated = 0usize;
        let run_pipeline = !request.is_empty() && !request.original_image;

        for frame_path in &frames {
            let Some(name) = frame_path.file_name() else {
                continue;
            };
            let mut artifact = WorkingArtifact::new(frame_path.clone());
            if run_pipeline {
                match self
                    .pipeline_frame(artifact, request, background_color, scratch, &mut log)
                    .await
                {
                    Ok(processed) => artifact = processed,
                    Err(e) => {
                        log.push(format!("{name}: pipeline failed: {e}"));
                        tracing::warn!("Frame {} pipeline failed: {}", name, e);
                        continue;
                    }
                }
            }
            match artifact.persist(&dest_dir.join(name)) {
                Ok(_) => generated += 1,
                Err(e) => log.push(format!("{name}: write failed: {e}")),
            }
        }

        log.push(format!("frames: {generated}/{requested} stills in {dest_dir}"));
        Ok(ProcessResult {
            primary_output: None,
            outputs: vec![OutputDescriptor {
                path: dest_dir,
                label: "frame stills".to_string(),
                generated,
                requested,
            }],
            log,
        })
    }

    /// Run the request's visual transforms over one extracted frame.
    async fn pipeline_frame(
        &self,
        frame: WorkingArtifact,
        request: &PipelineRequest,
        background_color: Option<&str>,
        scratch: &ScratchSpace,
        log: &mut Vec<String>,
    ) -> Result<WorkingArtifact, PipelineError> {
        let mut current = frame;
        let mut first_stage = true;
        for params in request.active_stages() {
            if let Err(reason) = params.validate() {
                return Err(PipelineError::StageFailed {
                    stage: params.kind(),
                    log: vec![format!("{}: {}", params.kind(), reason)],
                });
            }
            let produced = self
                .executor
                .apply_stage_visual(
                    params,
                    current.path(),
                    first_stage,
                    background_color,
                    scratch,
                    log,
                )
                .await
                .map_err(|failure| PipelineError::StageFailed {
                    stage: params.kind(),
                    log: vec![format!("{}: {}", params.kind(), failure.0)],
                })?;
            if let Some(artifact) = produced {
                // Drop of the superseded frame artifact deletes it.
                current = artifact;
                first_stage = false;
            }
        }
        Ok(current)
    }
}
