use crate::models::stage::{PipelineRequest, PreviewResult};
use crate::services::artifact::{ScratchSpace, WorkingArtifact};
use crate::services::engine::ImageOps;
use crate::services::executor::{PipelineError, PipelineExecutor};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use camino::Utf8Path;
use std::fs;
use std::sync::Arc;

/// Side-effect-free variant of the pipeline: same stage transforms, but
/// every intermediate and the final image live in scratch space. Nothing is
/// ever written to the source's directory.
///
/// Pack generation (icons, store pack) is skipped during preview - only the
/// trim/squarify side effects on the working image are shown, since pack
/// files are not meaningful to render inline.
pub struct PreviewGenerator<E: ImageOps> {
    engine: Arc<E>,
    executor: PipelineExecutor<E>,
    /// Neither preview dimension exceeds this cap unless the caller asks
    /// for full resolution (frame scrubbing in an editor view).
    max_dim: u32,
}

impl<E: ImageOps> PreviewGenerator<E> {
    pub fn new(engine: Arc<E>, max_dim: u32) -> Self {
        Self {
            executor: PipelineExecutor::new(Arc::clone(&engine)),
            engine,
            max_dim,
        }
    }

    /// Render the pipeline's effect on `source` as an inline-encoded PNG.
    ///
    /// With `request.original_image` set or no stages selected, the
    /// (possibly downscaled) unmodified input is reflected back. Animated
    /// inputs are previewed through a single representative frame unless
    /// `full_resolution` is requested.
    pub async fn preview(
        &self,
        source: &Utf8Path,
        request: &PipelineRequest,
        background_color: Option<&str>,
        scratch: &ScratchSpace,
        full_resolution: bool,
    ) -> Result<PreviewResult, PipelineError> {
        self.engine
            .dimensions(source)
            .await
            .map_err(|e| PipelineError::InvalidInput(format!("{source}: {e}")))?;

        // Animated assets preview through one extracted frame.
        let mut working: Option<WorkingArtifact> = None;
        let mut input = source.to_path_buf();
        if !full_resolution && self.engine.is_multi_frame_format(source) {
            if let Ok(count) = self.engine.frame_count(source).await {
                if count >= 2 {
                    let frame = scratch.allocate("png");
                    self.engine
                        .extract_frame(source, 0, frame.path())
                        .await
                        .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
                    input = frame.path().to_path_buf();
                    working = Some(frame);
                }
            }
        }

        if !request.original_image && !request.is_empty() {
            let active = request.active_stages();
            for params in &active {
                if let Err(reason) = params.validate() {
                    return Err(PipelineError::StageFailed {
                        stage: params.kind(),
                        log: vec![format!("{}: {}", params.kind(), reason)],
                    });
                }
            }

            let mut log: Vec<String> = Vec::new();
            let mut first_stage = true;
            for params in active {
                let produced = self
                    .executor
                    .apply_stage_visual(
                        params,
                        &input,
                        first_stage,
                        background_color,
                        scratch,
                        &mut log,
                    )
                    .await
                    .map_err(|failure| PipelineError::StageFailed {
                        stage: params.kind(),
                        log: vec![format!("{}: {}", params.kind(), failure.0)],
                    })?;

                if let Some(artifact) = produced {
                    input = artifact.path().to_path_buf();
                    // Superseded intermediate drops (and deletes) here.
                    working = Some(artifact);
                    first_stage = false;
                }
            }
        }

        let result = self.encode(&input, scratch, full_resolution).await;
        // The last intermediate is cleaned only after its bytes were read.
        drop(working);
        result
    }

    /// Downscale to the preview cap if needed, then base64-encode.
    async fn encode(
        &self,
        image: &Utf8Path,
        scratch: &ScratchSpace,
        full_resolution: bool,
    ) -> Result<PreviewResult, PipelineError> {
        let (width, height) = self
            .engine
            .dimensions(image)
            .await
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;

        let mut final_path = image.to_path_buf();
        let mut downscaled: Option<WorkingArtifact> = None;
        let mut out_dims = (width, height);

        if !full_resolution && width.max(height) > self.max_dim {
            let out = scratch.allocate("png");
            let (w, h) = if width >= height {
                (self.max_dim, 0)
            } else {
                (0, self.max_dim)
            };
            self.engine
                .resize_exact(image, out.path(), w, h)
                .await
                .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
            out_dims = self
                .engine
                .dimensions(out.path())
                .await
                .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
            final_path = out.path().to_path_buf();
            downscaled = Some(out);
        }

        let bytes = fs::read(&final_path)
            .map_err(|e| PipelineError::InvalidInput(format!("cannot read preview: {e}")))?;
        drop(downscaled);

        Ok(PreviewResult {
            image_data: BASE64.encode(bytes),
            width: out_dims.0,
            height: out_dims.1,
        })
    }
}
