use crate::models::preset::{self, FAVICON_SIZES, ICO_SIZES, IconSpec};
use crate::models::stage::{
    OutputDescriptor, PipelineRequest, ProcessResult, ScaleMode, StageKind, StageParams,
};
use crate::services::artifact::{
    ScratchSpace, WorkingArtifact, derive_output_dir, derive_output_path, source_ext,
};
use crate::services::engine::ImageOps;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Arc;
use thiserror::Error;

/// Errors crossing the executor's public boundary.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("image engine not available: {0}")]
    MissingDependency(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("stage {stage} failed")]
    StageFailed {
        stage: StageKind,
        /// Stage-scoped log including completed stages and the failure.
        log: Vec<String>,
    },
}

/// Internal stage failure: the message lands in the run log, the executor
/// turns it into [`PipelineError::StageFailed`].
#[derive(Debug)]
pub(crate) struct StageFailure(pub String);

impl From<crate::services::engine::EngineError> for StageFailure {
    fn from(e: crate::services::engine::EngineError) -> Self {
        StageFailure(e.to_string())
    }
}

/// Background-removal strategies in fallback order. The tie-break order is
/// data, not control flow: the list is built once from the stage parameters
/// and evaluated first-success-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemovalStrategy {
    EdgeFeather,
    BorderFlood,
    GlobalReplace,
}

/// Ordered strategy list for a removebg stage: edge-feather first when
/// requested, border flood next, global replace as the final fallback.
pub(crate) fn removal_strategies(edge_detect: bool, preserve_inner: bool) -> Vec<RemovalStrategy> {
    let mut strategies = Vec::with_capacity(3);
    if edge_detect {
        strategies.push(RemovalStrategy::EdgeFeather);
    }
    if preserve_inner {
        strategies.push(RemovalStrategy::BorderFlood);
    }
    strategies.push(RemovalStrategy::GlobalReplace);
    strategies
}

/// Executes a pipeline request against one source file, producing durable
/// outputs in the source's directory.
///
/// The "current artifact" threads through the stages in fixed order; each
/// stage's output supersedes (and deletes) its predecessor via
/// [`WorkingArtifact`] ownership. Cleanup is automatic on every exit path.
pub struct PipelineExecutor<E: ImageOps> {
    engine: Arc<E>,
}

/// The input the next stage reads from: the untouched source, or the
/// previous stage's owned temp file.
enum Current<'a> {
    Source(&'a Utf8Path),
    Working(WorkingArtifact),
}

impl Current<'_> {
    fn path(&self) -> &Utf8Path {
        match self {
            Current::Source(p) => p,
            Current::Working(a) => a.path(),
        }
    }

    fn is_source(&self) -> bool {
        matches!(self, Current::Source(_))
    }
}

impl<E: ImageOps> PipelineExecutor<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self { engine }
    }

    /// Run the selected stages in dependency order.
    ///
    /// `input` is the asset read by the first stage; `source` is the file
    /// the session was opened on and only anchors durable output naming.
    /// They differ after frame edits swap the session input to a temp file.
    ///
    /// `background_color` is the session's cached corner sample; removebg
    /// fails without one. On stage failure all working artifacts allocated
    /// so far are cleaned and the caller gets the stage-scoped log.
    pub async fn execute(
        &self,
        input: &Utf8Path,
        source: &Utf8Path,
        request: &PipelineRequest,
        background_color: Option<&str>,
        scratch: &ScratchSpace,
    ) -> Result<ProcessResult, PipelineError> {
        // Unreadable inputs are fatal before the pipeline starts.
        self.engine
            .dimensions(input)
            .await
            .map_err(|e| PipelineError::InvalidInput(format!("{input}: {e}")))?;

        let active = request.active_stages();
        if active.is_empty() {
            return Err(PipelineError::InvalidInput("no stages selected".to_string()));
        }

        // Parameter validation happens at the boundary, before any engine
        // call, so a doomed stage produces zero files.
        for params in &active {
            if let Err(reason) = params.validate() {
                return Err(PipelineError::StageFailed {
                    stage: params.kind(),
                    log: vec![format!("{}: {}", params.kind(), reason)],
                });
            }
        }

        let mut log: Vec<String> = Vec::new();
        let mut outputs: Vec<OutputDescriptor> = Vec::new();
        let mut current = Current::Source(input);
        let ext = source_ext(source);
        let last_index = active.len() - 1;

        for (index, params) in active.iter().enumerate() {
            let stage = params.kind();
            tracing::info!("Running stage {} on {}", stage, current.path());

            let outcome = match params {
                StageParams::RemoveBackground { .. } => self
                    .run_remove_background(params, current.path(), background_color, scratch, &mut log)
                    .await
                    .map(|artifact| (Some(artifact), Some("_nobg"))),
                StageParams::Scale { .. } => self
                    .run_scale(params, current.path(), scratch, &mut log)
                    .await
                    .map(|artifact| (Some(artifact), Some("_scaled"))),
                StageParams::IconGeneration { .. } => {
                    match self
                        .prep_icon_source(params, current.path(), current.is_source(), scratch, &mut log)
                        .await
                    {
                        Ok(prepared) => {
                            let working = prepared
                                .as_ref()
                                .map(|a| a.path().to_path_buf())
                                .unwrap_or_else(|| current.path().to_path_buf());
                            match self
                                .emit_icon_outputs(params, &working, source, scratch, &mut log)
                                .await
                            {
                                Ok(mut produced) => {
                                    outputs.append(&mut produced);
                                    Ok((prepared, None))
                                }
                                Err(e) => Err(e),
                            }
                        }
                        Err(e) => Err(e),
                    }
                }
                StageParams::StorePack { .. } => {
                    match self
                        .emit_store_pack(params, current.path(), source, &mut log)
                        .await
                    {
                        Ok(descriptor) => {
                            outputs.push(descriptor);
                            Ok((None, None))
                        }
                        Err(e) => Err(e),
                    }
                }
            };

            match outcome {
                Ok((artifact, durable_suffix)) => {
                    if let Some(artifact) = artifact {
                        if index == last_index {
                            if let Some(suffix) = durable_suffix {
                                let descriptor = self
                                    .persist_final(artifact, source, stage, suffix, ext, &mut log)
                                    .await?;
                                outputs.push(descriptor);
                            }
                            // No durable suffix: the artifact was only a
                            // working copy; dropping it cleans up.
                        } else {
                            // Ownership transfers forward; dropping the old
                            // `current` deletes the superseded artifact.
                            current = Current::Working(artifact);
                        }
                    }
                }
                Err(StageFailure(message)) => {
                    log.push(format!("{stage}: {message}"));
                    tracing::error!("Stage {} failed: {}", stage, message);
                    // `current` and any pending artifact drop here, deleting
                    // every temp file this run allocated.
                    return Err(PipelineError::StageFailed { stage, log });
                }
            }
        }

        let primary_output = match outputs.as_slice() {
            [only] => Some(only.path.clone()),
            _ => None,
        };

        Ok(ProcessResult {
            outputs,
            primary_output,
            log,
        })
    }

    /// Move the last stage's artifact to its durable, caller-visible path,
    /// embedding measured dimensions in the filename when readable.
    async fn persist_final(
        &self,
        artifact: WorkingArtifact,
        source: &Utf8Path,
        stage: StageKind,
        suffix: &str,
        ext: &str,
        log: &mut Vec<String>,
    ) -> Result<OutputDescriptor, PipelineError> {
        let dims = self.engine.dimensions(artifact.path()).await.ok();
        let dest = derive_output_path(source, suffix, dims, ext);
        let path = artifact
            .persist(&dest)
            .map_err(|e| PipelineError::StageFailed {
                stage,
                log: vec![format!("failed to write output {dest}: {e}")],
            })?;
        log.push(format!("wrote {path}"));
        Ok(OutputDescriptor::file(path, format!("{suffix} output")))
    }

    /// RemoveBackground: ordered strategy fallback, then a non-fatal trim.
    pub(crate) async fn run_remove_background(
        &self,
        params: &StageParams,
        input: &Utf8Path,
        background_color: Option<&str>,
        scratch: &ScratchSpace,
        log: &mut Vec<String>,
    ) -> Result<WorkingArtifact, StageFailure> {
        let StageParams::RemoveBackground {
            fuzz,
            trim,
            preserve_inner,
            edge_detect,
            edge_strength,
        } = params
        else {
            return Err(StageFailure("wrong parameter variant".to_string()));
        };

        let Some(color) = background_color else {
            return Err(StageFailure(
                "no background color detected for this image".to_string(),
            ));
        };

        let strategies = removal_strategies(*edge_detect, *preserve_inner);
        let mut removed: Option<WorkingArtifact> = None;
        // The engine encodes by output extension; working artifacts must
        // carry the input's container or a multi-frame input would splinter.
        let ext = source_ext(input);

        for strategy in &strategies {
            let out = scratch.allocate(ext);
            let attempt = match strategy {
                RemovalStrategy::EdgeFeather => {
                    self.engine
                        .remove_background_edge_feather(input, out.path(), color, *fuzz, *edge_strength)
                        .await
                }
                RemovalStrategy::BorderFlood => {
                    self.engine
                        .remove_background_border_flood(input, out.path(), color, *fuzz)
                        .await
                }
                RemovalStrategy::GlobalReplace => {
                    self.engine
                        .remove_background_global(input, out.path(), color, *fuzz)
                        .await
                }
            };

            match attempt {
                Ok(()) => {
                    log.push(format!(
                        "removebg: {strategy:?} succeeded (fuzz {fuzz}% against {color})"
                    ));
                    removed = Some(out);
                    break;
                }
                Err(e) => {
                    log.push(format!("removebg: {strategy:?} failed, trying next: {e}"));
                    tracing::warn!("Removal strategy {:?} failed: {}", strategy, e);
                }
            }
        }

        let Some(mut result) = removed else {
            return Err(StageFailure("all removal strategies failed".to_string()));
        };

        if *trim {
            let trimmed = scratch.allocate(ext);
            match self.engine.trim(result.path(), trimmed.path()).await {
                Ok(()) => {
                    log.push("removebg: trimmed transparent margins".to_string());
                    result = trimmed;
                }
                Err(e) => {
                    // Trim failure is non-fatal: keep the untrimmed result.
                    log.push(format!("removebg: trim failed, keeping untrimmed: {e}"));
                    tracing::warn!("Trim after background removal failed: {}", e);
                }
            }
        }

        Ok(result)
    }

    /// Scale: square padding to max(w,h), or a direct exact resize.
    pub(crate) async fn run_scale(
        &self,
        params: &StageParams,
        input: &Utf8Path,
        scratch: &ScratchSpace,
        log: &mut Vec<String>,
    ) -> Result<WorkingArtifact, StageFailure> {
        let StageParams::Scale {
            target_width,
            target_height,
            make_square,
        } = params
        else {
            return Err(StageFailure("wrong parameter variant".to_string()));
        };

        let out = scratch.allocate(source_ext(input));
        if *make_square {
            let (effective_w, effective_h) = self
                .effective_scale_dims(input, *target_width, *target_height)
                .await?;
            let side = effective_w.max(effective_h);
            self.engine
                .scale_with_padding(input, out.path(), side, side)
                .await?;
            log.push(format!("scale: padded to {side}x{side} square"));
        } else {
            self.engine
                .resize_exact(input, out.path(), *target_width, *target_height)
                .await?;
            log.push(format!("scale: resized to {target_width}x{target_height}"));
        }
        Ok(out)
    }

    /// Resolve zero dimensions from the source aspect ratio.
    async fn effective_scale_dims(
        &self,
        input: &Utf8Path,
        width: u32,
        height: u32,
    ) -> Result<(u32, u32), StageFailure> {
        if width > 0 && height > 0 {
            return Ok((width, height));
        }
        let (src_w, src_h) = self.engine.dimensions(input).await?;
        if width == 0 {
            let derived = ((height as u64 * src_w as u64) / src_h.max(1) as u64) as u32;
            Ok((derived.max(1), height))
        } else {
            let derived = ((width as u64 * src_h as u64) / src_w.max(1) as u64) as u32;
            Ok((width, derived.max(1)))
        }
    }

    /// IconGeneration prep: trim only while the input is still the
    /// unmodified original (no earlier stage ran), then optional squarify.
    /// Returns None when neither adjustment applied.
    pub(crate) async fn prep_icon_source(
        &self,
        params: &StageParams,
        input: &Utf8Path,
        input_is_original: bool,
        scratch: &ScratchSpace,
        log: &mut Vec<String>,
    ) -> Result<Option<WorkingArtifact>, StageFailure> {
        let StageParams::IconGeneration {
            trim, make_square, ..
        } = params
        else {
            return Err(StageFailure("wrong parameter variant".to_string()));
        };

        let mut prepared: Option<WorkingArtifact> = None;

        if *trim && input_is_original {
            let out = scratch.allocate(source_ext(input));
            self.engine.trim(input, out.path()).await?;
            log.push("icons: trimmed source".to_string());
            prepared = Some(out);
        } else if *trim {
            log.push("icons: skipping trim, input already processed".to_string());
        }

        if *make_square {
            let square_input = prepared
                .as_ref()
                .map(|a| a.path().to_path_buf())
                .unwrap_or_else(|| input.to_path_buf());
            let out = scratch.allocate(source_ext(&square_input));
            self.engine.squarify(&square_input, out.path()).await?;
            log.push("icons: squarified source".to_string());
            prepared = Some(out);
        }

        Ok(prepared)
    }

    /// Produce the requested icon container and packs from a high-resolution
    /// intermediate. Individual pack asset failures are tolerated and
    /// surfaced as generated/requested counts.
    async fn emit_icon_outputs(
        &self,
        params: &StageParams,
        working: &Utf8Path,
        source: &Utf8Path,
        scratch: &ScratchSpace,
        log: &mut Vec<String>,
    ) -> Result<Vec<OutputDescriptor>, StageFailure> {
        let StageParams::IconGeneration {
            single_icon,
            web_pack,
            android_pack,
            ios_pack,
            ..
        } = params
        else {
            return Err(StageFailure("wrong parameter variant".to_string()));
        };

        let any_pack = *web_pack | *android_pack | *ios_pack;
        let intermediate_size = if any_pack { 1024 } else { 512 };

        let intermediate = scratch.allocate(source_ext(working));
        self.engine
            .scale_to_square_size(working, intermediate.path(), intermediate_size)
            .await?;
        log.push(format!("icons: built {intermediate_size}px intermediate"));

        let mut outputs = Vec::new();

        if *single_icon {
            let dest = derive_output_path(source, "", None, "ico");
            self.engine
                .pack_multi_resolution_icon(intermediate.path(), &dest, &ICO_SIZES)
                .await?;
            log.push(format!("icons: wrote {dest}"));
            outputs.push(OutputDescriptor::file(dest, "multi-resolution icon"));
        }

        let icons_root = derive_output_dir(source, "_icons");
        let packs: [(bool, &str, Vec<IconSpec>, bool); 3] = [
            (*web_pack, "web", preset::web_pack(), true),
            (*android_pack, "android", preset::android_pack(), false),
            (*ios_pack, "ios", preset::ios_pack(), false),
        ];

        for (requested, name, manifest, wants_favicon) in packs {
            if !requested {
                continue;
            }
            let descriptor = self
                .emit_one_pack(
                    intermediate.path(),
                    &icons_root.join(name),
                    name,
                    &manifest,
                    wants_favicon,
                    scratch,
                    log,
                )
                .await?;
            outputs.push(descriptor);
        }

        Ok(outputs)
    }

    /// Write one pack's manifest into its directory, counting successes.
    async fn emit_one_pack(
        &self,
        intermediate: &Utf8Path,
        pack_dir: &Utf8Path,
        pack_name: &str,
        manifest: &[IconSpec],
        wants_favicon: bool,
        scratch: &ScratchSpace,
        log: &mut Vec<String>,
    ) -> Result<OutputDescriptor, StageFailure> {
        fs::create_dir_all(pack_dir)
            .map_err(|e| StageFailure(format!("cannot create {pack_dir}: {e}")))?;

        let requested = manifest.len() + usize::from(wants_favicon);
        let mut generated = 0usize;

        for spec in manifest {
            let dest = pack_dir.join(&spec.filename);
            if let Some(parent) = dest.parent() {
                if fs::create_dir_all(parent).is_err() {
                    log.push(format!("icons: cannot create directory for {dest}"));
                    continue;
                }
            }
            let result = if spec.width == spec.height {
                self.engine
                    .scale_to_square_size(intermediate, &dest, spec.width)
                    .await
            } else {
                self.engine
                    .scale_fill_crop(intermediate, &dest, spec.width, spec.height)
                    .await
            };
            match result {
                Ok(()) => generated += 1,
                Err(e) => {
                    log.push(format!("icons: {pack_name}/{} failed: {e}", spec.filename));
                    tracing::warn!("Icon pack asset {} failed: {}", spec.filename, e);
                }
            }
        }

        if wants_favicon {
            match self
                .emit_favicon(intermediate, &pack_dir.join("favicon.ico"), scratch)
                .await
            {
                Ok(()) => generated += 1,
                Err(StageFailure(message)) => {
                    log.push(format!("icons: {pack_name}/favicon.ico failed: {message}"));
                }
            }
        }

        log.push(format!(
            "icons: {pack_name} pack {generated}/{requested} assets"
        ));
        Ok(OutputDescriptor {
            path: pack_dir.to_path_buf(),
            label: format!("{pack_name} icon pack"),
            generated,
            requested,
        })
    }

    /// The web pack's favicon.ico: a 16/32/48 triad in one container.
    async fn emit_favicon(
        &self,
        intermediate: &Utf8Path,
        dest: &Utf8Path,
        scratch: &ScratchSpace,
    ) -> Result<(), StageFailure> {
        let mut triad: Vec<WorkingArtifact> = Vec::with_capacity(FAVICON_SIZES.len());
        for size in FAVICON_SIZES {
            let out = scratch.allocate("png");
            self.engine
                .scale_to_square_size(intermediate, out.path(), size)
                .await?;
            triad.push(out);
        }
        let sources: Vec<Utf8PathBuf> = triad.iter().map(|a| a.path().to_path_buf()).collect();
        self.engine
            .pack_icon_from_multiple_sources(&sources, dest)
            .await?;
        Ok(())
    }

    /// StorePack: every requested dimension written into one pack directory,
    /// partial failures tolerated.
    async fn emit_store_pack(
        &self,
        params: &StageParams,
        input: &Utf8Path,
        source: &Utf8Path,
        log: &mut Vec<String>,
    ) -> Result<OutputDescriptor, StageFailure> {
        let StageParams::StorePack {
            entries,
            scale_mode,
            pack_name,
        } = params
        else {
            return Err(StageFailure("wrong parameter variant".to_string()));
        };

        let name = pack_name.as_deref().unwrap_or("storepack");
        let pack_dir = derive_output_dir(source, &format!("_{name}"));
        fs::create_dir_all(&pack_dir)
            .map_err(|e| StageFailure(format!("cannot create {pack_dir}: {e}")))?;

        let requested = entries.len();
        let mut generated = 0usize;

        for entry in entries {
            let dest = pack_dir.join(entry.output_name());
            let result = match scale_mode {
                ScaleMode::Fit => {
                    self.engine
                        .scale_with_padding(input, &dest, entry.width, entry.height)
                        .await
                }
                ScaleMode::Fill => {
                    self.engine
                        .scale_fill_crop(input, &dest, entry.width, entry.height)
                        .await
                }
                ScaleMode::Stretch => {
                    self.engine
                        .resize_exact(input, &dest, entry.width, entry.height)
                        .await
                }
            };
            match result {
                Ok(()) => generated += 1,
                Err(e) => {
                    log.push(format!(
                        "storepack: {}x{} failed: {e}",
                        entry.width, entry.height
                    ));
                    tracing::warn!(
                        "Store pack entry {}x{} failed: {}",
                        entry.width,
                        entry.height,
                        e
                    );
                }
            }
        }

        log.push(format!("storepack: {generated}/{requested} assets in {pack_dir}"));
        Ok(OutputDescriptor {
            path: pack_dir,
            label: format!("{name} store pack"),
            generated,
            requested,
        })
    }

    /// Apply only a stage's visible image transform, for previews. Pack
    /// generation (icons, store pack) is skipped: pack files are not
    /// meaningful to preview, only the trim/squarify side effects are.
    pub(crate) async fn apply_stage_visual(
        &self,
        params: &StageParams,
        input: &Utf8Path,
        input_is_original: bool,
        background_color: Option<&str>,
        scratch: &ScratchSpace,
        log: &mut Vec<String>,
    ) -> Result<Option<WorkingArtifact>, StageFailure> {
        match params {
            StageParams::RemoveBackground { .. } => self
                .run_remove_background(params, input, background_color, scratch, log)
                .await
                .map(Some),
            StageParams::Scale { .. } => self
                .run_scale(params, input, scratch, log)
                .await
                .map(Some),
            StageParams::IconGeneration { .. } => {
                self.prep_icon_source(params, input, input_is_original, scratch, log)
                    .await
            }
            // Store pack only produces durable files; visually a no-op.
            StageParams::StorePack { .. } => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removal_strategy_order_full() {
        assert_eq!(
            removal_strategies(true, true),
            vec![
                RemovalStrategy::EdgeFeather,
                RemovalStrategy::BorderFlood,
                RemovalStrategy::GlobalReplace,
            ]
        );
    }

    #[test]
    fn test_removal_strategy_global_always_last() {
        assert_eq!(
            removal_strategies(false, false),
            vec![RemovalStrategy::GlobalReplace]
        );
        assert_eq!(
            removal_strategies(false, true),
            vec![RemovalStrategy::BorderFlood, RemovalStrategy::GlobalReplace]
        );
        assert_eq!(
            removal_strategies(true, false),
            vec![RemovalStrategy::EdgeFeather, RemovalStrategy::GlobalReplace]
        );
    }
}
