//! Command-line surface over the pipeline toolkit.
//!
//! Every subcommand is a thin adapter: flags become a [`PipelineRequest`]
//! (or a direct [`ImageOps`] primitive call) and results are printed as the
//! durable paths they produced. All pixel work still happens behind the
//! engine facade.

use crate::config::ConfigManager;
use crate::metrics::Metrics;
use crate::models::stage::{PipelineRequest, ProcessResult, ScaleMode, StageParams, StoreEntry};
use crate::services::animation::ExportMode;
use crate::services::artifact::{ScratchSpace, WorkingArtifact, derive_output_path, source_ext};
use crate::services::engine::{ImageOps, build_engine};
use crate::services::executor::PipelineError;
use crate::services::toolkit::{FrameEdit, Toolkit};
use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "piclet",
    version,
    about = "Image pipeline toolkit driving an external raster engine",
    long_about = "PicLet runs images through a fixed-order pipeline (background removal, \
scaling, icon generation, store packs) and edits multi-frame GIFs, delegating all pixel \
work to ImageMagick subprocesses. Durable outputs land next to the source file."
)]
pub struct Cli {
    /// Log debug-level detail
    #[arg(long, global = true)]
    pub debug: bool,

    /// Configuration directory (defaults to "PicLet Data")
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline with the selected stage flags
    Process {
        file: Utf8PathBuf,
        #[command(flatten)]
        stages: StageFlags,
    },

    /// Render the pipeline's effect without touching the source directory
    Preview {
        file: Utf8PathBuf,
        /// Where to write the preview PNG
        #[arg(long, value_name = "FILE")]
        out: Utf8PathBuf,
        /// Skip the preview dimension cap
        #[arg(long)]
        full_resolution: bool,
        #[command(flatten)]
        stages: StageFlags,
    },

    /// Background removal only
    Removebg {
        file: Utf8PathBuf,
        /// Color-distance tolerance, 0-100 percent
        #[arg(long, default_value_t = 10)]
        fuzz: u8,
        /// Trim transparent margins after removal
        #[arg(long)]
        trim: bool,
        /// Flood from the borders only, preserving interior pixels
        #[arg(long)]
        preserve_inner: bool,
        /// Try edge-feathered removal first
        #[arg(long)]
        edge_detect: bool,
        #[arg(long, default_value_t = 2.0)]
        edge_strength: f32,
    },

    /// Scaling only
    Scale {
        file: Utf8PathBuf,
        /// Target width (0 = derive from aspect ratio)
        #[arg(long, default_value_t = 0)]
        width: u32,
        /// Target height (0 = derive from aspect ratio)
        #[arg(long, default_value_t = 0)]
        height: u32,
        /// Pad to a centered square afterwards
        #[arg(long)]
        square: bool,
    },

    /// Icon generation only
    Icons {
        file: Utf8PathBuf,
        #[arg(long)]
        trim: bool,
        #[arg(long)]
        square: bool,
        /// Single multi-resolution .ico
        #[arg(long)]
        single_icon: bool,
        #[arg(long)]
        web: bool,
        #[arg(long)]
        android: bool,
        #[arg(long)]
        ios: bool,
    },

    /// Generate a store pack from a named preset
    Storepack {
        file: Utf8PathBuf,
        /// Preset id (msstore, webstore, social, or a user preset)
        #[arg(long)]
        preset: String,
        #[arg(long, value_enum, default_value_t = ScaleModeArg::Fit)]
        scale_mode: ScaleModeArg,
    },

    /// Multi-frame (GIF) operations
    Gif {
        file: Utf8PathBuf,
        #[command(subcommand)]
        op: GifCommand,
    },

    /// Geometric transforms (rotate, flip, flop, border)
    Transform {
        file: Utf8PathBuf,
        /// Rotation in degrees (clockwise)
        #[arg(long, value_name = "DEGREES")]
        rotate: Option<f32>,
        /// Mirror top-to-bottom
        #[arg(long)]
        flip: bool,
        /// Mirror left-to-right
        #[arg(long)]
        flop: bool,
        /// Border width in pixels
        #[arg(long, value_name = "PIXELS")]
        border: Option<u32>,
        #[arg(long, default_value = "black", value_name = "COLOR")]
        border_color: String,
        #[arg(long, value_name = "FILE")]
        out: Option<Utf8PathBuf>,
    },

    /// Color filters (grayscale, sepia, negate)
    Filter {
        file: Utf8PathBuf,
        #[arg(long)]
        grayscale: bool,
        #[arg(long)]
        sepia: bool,
        #[arg(long)]
        negate: bool,
        #[arg(long, value_name = "FILE")]
        out: Option<Utf8PathBuf>,
    },

    /// Replace one color with another
    Recolor {
        file: Utf8PathBuf,
        #[arg(long, value_name = "COLOR")]
        from: String,
        #[arg(long, value_name = "COLOR")]
        to: String,
        #[arg(long, default_value_t = 10)]
        fuzz: u8,
        #[arg(long, value_name = "FILE")]
        out: Option<Utf8PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum GifCommand {
    /// Extract one frame (optionally pipelined) to a durable PNG
    Frame {
        index: usize,
        #[command(flatten)]
        stages: StageFlags,
    },
    /// Extract every frame as stills into {basename}_frames/
    Frames {
        #[command(flatten)]
        stages: StageFlags,
    },
    /// Run the pipeline over the whole animation
    Export {
        #[command(flatten)]
        stages: StageFlags,
        /// Restamp the per-frame delay (centiseconds)
        #[arg(long, value_name = "CS")]
        delay: Option<u32>,
        /// Restamp the loop count (0 = forever)
        #[arg(long = "loop", value_name = "COUNT")]
        loops: Option<u32>,
    },
    /// Keep every Nth frame, stretching the delay to preserve duration
    Simplify {
        #[arg(long, default_value_t = 2)]
        skip: usize,
    },
    /// Delete one frame
    Delete { index: usize },
    /// Restamp the per-frame delay in place (centiseconds)
    Delay { delay_cs: u32 },
    /// Restamp the loop count in place (0 = forever)
    Loop { count: u32 },
}

/// Stage selection flags shared by `process`, `preview`, and the GIF
/// export subcommands.
#[derive(Args, Debug, Default)]
pub struct StageFlags {
    /// Enable the background removal stage
    #[arg(long)]
    pub removebg: bool,
    #[arg(long, default_value_t = 10)]
    pub fuzz: u8,
    #[arg(long)]
    pub trim: bool,
    #[arg(long)]
    pub preserve_inner: bool,
    #[arg(long)]
    pub edge_detect: bool,
    #[arg(long, default_value_t = 2.0)]
    pub edge_strength: f32,

    /// Target width for the scale stage (0 = derive from aspect)
    #[arg(long, default_value_t = 0)]
    pub width: u32,
    /// Target height for the scale stage (0 = derive from aspect)
    #[arg(long, default_value_t = 0)]
    pub height: u32,
    /// Pad the scaled image to a centered square
    #[arg(long)]
    pub square: bool,

    /// Enable the icon generation stage
    #[arg(long)]
    pub icons: bool,
    #[arg(long)]
    pub single_icon: bool,
    #[arg(long)]
    pub web: bool,
    #[arg(long)]
    pub android: bool,
    #[arg(long)]
    pub ios: bool,

    /// Enable the store pack stage with this preset id
    #[arg(long, value_name = "PRESET")]
    pub preset: Option<String>,
    #[arg(long, value_enum, default_value_t = ScaleModeArg::Fit)]
    pub scale_mode: ScaleModeArg,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ScaleModeArg {
    /// Fit inside the canvas, pad the remainder
    #[default]
    Fit,
    /// Cover the canvas, crop the overflow
    Fill,
    /// Stretch to the exact canvas
    Stretch,
}

impl From<ScaleModeArg> for ScaleMode {
    fn from(arg: ScaleModeArg) -> Self {
        match arg {
            ScaleModeArg::Fit => ScaleMode::Fit,
            ScaleModeArg::Fill => ScaleMode::Fill,
            ScaleModeArg::Stretch => ScaleMode::Stretch,
        }
    }
}

impl StageFlags {
    /// Build the pipeline request these flags select. Preset ids resolve
    /// against the merged built-in and user presets.
    pub fn to_request(&self, config: &ConfigManager) -> Result<PipelineRequest> {
        let mut stages = Vec::new();

        if self.removebg {
            stages.push(StageParams::RemoveBackground {
                fuzz: self.fuzz,
                trim: self.trim,
                preserve_inner: self.preserve_inner,
                edge_detect: self.edge_detect,
                edge_strength: self.edge_strength,
            });
        }

        if self.width > 0 || self.height > 0 {
            stages.push(StageParams::Scale {
                target_width: self.width,
                target_height: self.height,
                make_square: self.square,
            });
        }

        if self.icons {
            stages.push(StageParams::IconGeneration {
                trim: self.trim,
                make_square: self.square,
                single_icon: self.single_icon,
                web_pack: self.web,
                android_pack: self.android,
                ios_pack: self.ios,
            });
        }

        if let Some(preset_id) = &self.preset {
            stages.push(storepack_stage(config, preset_id, self.scale_mode)?);
        }

        if stages.is_empty() {
            bail!("no stages selected (try --removebg, --width/--height, --icons, or --preset)");
        }

        Ok(PipelineRequest::new(stages))
    }

    /// Like [`StageFlags::to_request`], but a fully unselected flag group
    /// yields `None` (frame extraction without processing) instead of an
    /// error. Real failures such as an unknown preset still propagate.
    pub fn to_optional_request(&self, config: &ConfigManager) -> Result<Option<PipelineRequest>> {
        if !self.any_selected() {
            return Ok(None);
        }
        self.to_request(config).map(Some)
    }

    fn any_selected(&self) -> bool {
        self.removebg
            || self.width > 0
            || self.height > 0
            || self.icons
            || self.preset.is_some()
    }
}

fn storepack_stage(
    config: &ConfigManager,
    preset_id: &str,
    scale_mode: ScaleModeArg,
) -> Result<StageParams> {
    let presets = config.merged_presets()?;
    let preset = presets.get(preset_id).with_context(|| {
        let known: Vec<&str> = presets.keys().map(String::as_str).collect();
        format!("unknown preset {preset_id:?} (available: {})", known.join(", "))
    })?;

    let entries = preset
        .icons
        .iter()
        .map(|icon| StoreEntry {
            width: icon.width,
            height: icon.height,
            filename: Some(icon.filename.clone()),
        })
        .collect();

    Ok(StageParams::StorePack {
        entries,
        scale_mode: scale_mode.into(),
        pack_name: Some(preset.id.clone()),
    })
}

/// Parse settings, build the engine, and dispatch the subcommand.
pub async fn run(cli: Cli) -> Result<()> {
    let config_dir = cli
        .config_dir
        .unwrap_or_else(|| Utf8PathBuf::from("PicLet Data"));
    let config = ConfigManager::new(&config_dir)?;
    let user_config = config.load_user_config()?;
    let settings = user_config.piclet_settings.clone();

    let metrics = Arc::new(Metrics::new());
    let configured_path = (!settings.engine_path.is_empty())
        .then(|| Utf8PathBuf::from(&settings.engine_path));
    let engine = build_engine(
        configured_path.as_deref(),
        Duration::from_secs(settings.engine_timeout as u64),
    )
    .await?
    .with_metrics(Arc::clone(&metrics));

    let scratch = if settings.scratch_dir.is_empty() {
        ScratchSpace::new()?
    } else {
        ScratchSpace::in_dir(Utf8Path::new(&settings.scratch_dir))?
    };

    let toolkit = Toolkit::new(Arc::new(engine), scratch, settings.preview_max_dim)
        .with_metrics(Arc::clone(&metrics));

    let result = dispatch(cli.command, &config, &toolkit).await;

    if settings.stat_logging {
        metrics.log_summary();
    }

    result
}

async fn dispatch<E: ImageOps>(
    command: Command,
    config: &ConfigManager,
    toolkit: &Toolkit<E>,
) -> Result<()> {
    match command {
        Command::Process { file, stages } => {
            let request = stages.to_request(config)?;
            toolkit.open(&file).await?;
            let result = run_pipeline(toolkit, &request).await?;
            report(&result);
        }

        Command::Preview {
            file,
            out,
            full_resolution,
            stages,
        } => {
            let request = stages.to_request(config)?;
            toolkit.open(&file).await?;
            let preview = toolkit
                .run_preview(&request, full_resolution)
                .await
                .map_err(print_pipeline_error)?;
            let bytes = BASE64
                .decode(&preview.image_data)
                .context("preview payload is not valid base64")?;
            fs::write(&out, bytes).with_context(|| format!("Failed to write {out}"))?;
            println!("{out} ({}x{})", preview.width, preview.height);
        }

        Command::Removebg {
            file,
            fuzz,
            trim,
            preserve_inner,
            edge_detect,
            edge_strength,
        } => {
            let request = PipelineRequest::new(vec![StageParams::RemoveBackground {
                fuzz,
                trim,
                preserve_inner,
                edge_detect,
                edge_strength,
            }]);
            toolkit.open(&file).await?;
            let result = run_pipeline(toolkit, &request).await?;
            report(&result);
        }

        Command::Scale {
            file,
            width,
            height,
            square,
        } => {
            let request = PipelineRequest::new(vec![StageParams::Scale {
                target_width: width,
                target_height: height,
                make_square: square,
            }]);
            toolkit.open(&file).await?;
            let result = run_pipeline(toolkit, &request).await?;
            report(&result);
        }

        Command::Icons {
            file,
            trim,
            square,
            single_icon,
            web,
            android,
            ios,
        } => {
            let request = PipelineRequest::new(vec![StageParams::IconGeneration {
                trim,
                make_square: square,
                single_icon,
                web_pack: web,
                android_pack: android,
                ios_pack: ios,
            }]);
            toolkit.open(&file).await?;
            let result = run_pipeline(toolkit, &request).await?;
            report(&result);
        }

        Command::Storepack {
            file,
            preset,
            scale_mode,
        } => {
            let request =
                PipelineRequest::new(vec![storepack_stage(config, &preset, scale_mode)?]);
            toolkit.open(&file).await?;
            let result = run_pipeline(toolkit, &request).await?;
            report(&result);
        }

        Command::Gif { file, op } => run_gif(config, toolkit, &file, op).await?,

        Command::Transform {
            file,
            rotate,
            flip,
            flop,
            border,
            border_color,
            out,
        } => {
            if rotate.is_none() && !flip && !flop && border.is_none() {
                bail!("no transform selected (try --rotate, --flip, --flop, or --border)");
            }
            let dest = out.unwrap_or_else(|| {
                derive_output_path(&file, "_transformed", None, source_ext(&file))
            });
            let engine = toolkit.engine();
            let scratch = toolkit.scratch();
            let ext = source_ext(&file);

            // Chain the selected transforms through scratch, persisting the
            // last intermediate to the destination.
            let mut current = file.clone();
            let mut pending: Vec<WorkingArtifact> = Vec::new();
            if let Some(degrees) = rotate {
                let step = scratch.allocate(ext);
                engine.rotate(&current, step.path(), degrees).await?;
                current = step.path().to_path_buf();
                pending.push(step);
            }
            if flip {
                let step = scratch.allocate(ext);
                engine.flip_vertical(&current, step.path()).await?;
                current = step.path().to_path_buf();
                pending.push(step);
            }
            if flop {
                let step = scratch.allocate(ext);
                engine.flop_horizontal(&current, step.path()).await?;
                current = step.path().to_path_buf();
                pending.push(step);
            }
            if let Some(size) = border {
                let step = scratch.allocate(ext);
                engine
                    .add_border(&current, step.path(), size, &border_color)
                    .await?;
                pending.push(step);
            }

            let last = take_final(pending)?;
            last.persist(&dest)?;
            println!("{dest}");
        }

        Command::Filter {
            file,
            grayscale,
            sepia,
            negate,
            out,
        } => {
            if !(grayscale || sepia || negate) {
                bail!("no filter selected (try --grayscale, --sepia, or --negate)");
            }
            let dest =
                out.unwrap_or_else(|| derive_output_path(&file, "_filtered", None, source_ext(&file)));
            let engine = toolkit.engine();
            let scratch = toolkit.scratch();
            let ext = source_ext(&file);

            let mut current = file.clone();
            let mut pending: Vec<WorkingArtifact> = Vec::new();
            if grayscale {
                let step = scratch.allocate(ext);
                engine.grayscale(&current, step.path()).await?;
                current = step.path().to_path_buf();
                pending.push(step);
            }
            if sepia {
                let step = scratch.allocate(ext);
                engine.sepia(&current, step.path()).await?;
                current = step.path().to_path_buf();
                pending.push(step);
            }
            if negate {
                let step = scratch.allocate(ext);
                engine.negate(&current, step.path()).await?;
                pending.push(step);
            }

            let last = take_final(pending)?;
            last.persist(&dest)?;
            println!("{dest}");
        }

        Command::Recolor {
            file,
            from,
            to,
            fuzz,
            out,
        } => {
            let dest = out
                .unwrap_or_else(|| derive_output_path(&file, "_recolored", None, source_ext(&file)));
            toolkit.engine().recolor(&file, &dest, &from, &to, fuzz).await?;
            println!("{dest}");
        }
    }

    Ok(())
}

async fn run_gif<E: ImageOps>(
    config: &ConfigManager,
    toolkit: &Toolkit<E>,
    file: &Utf8Path,
    op: GifCommand,
) -> Result<()> {
    toolkit.open(file).await?;

    match op {
        GifCommand::Frame { index, stages } => {
            let request = stages.to_optional_request(config)?.unwrap_or_default();
            let result = toolkit
                .run_gif_export(ExportMode::SingleFrame { index }, &request, None, None)
                .await
                .map_err(print_pipeline_error)?;
            report(&result);
        }
        GifCommand::Frames { stages } => {
            let request = stages.to_optional_request(config)?.unwrap_or_default();
            let result = toolkit
                .run_gif_export(ExportMode::AllFramesAsStills, &request, None, None)
                .await
                .map_err(print_pipeline_error)?;
            report(&result);
        }
        GifCommand::Export {
            stages,
            delay,
            loops,
        } => {
            let request = stages.to_request(config)?;
            let result = toolkit
                .run_gif_export(ExportMode::ReprocessedGif, &request, delay, loops)
                .await
                .map_err(print_pipeline_error)?;
            report(&result);
        }
        GifCommand::Simplify { skip } => {
            let state = toolkit
                .run_frame_edit(FrameEdit::Simplify { skip_factor: skip })
                .await?;
            let dest = derive_output_path(file, "_simplified", None, "gif");
            fs::copy(&state.current_input_path, &dest)
                .with_context(|| format!("Failed to write {dest}"))?;
            println!(
                "{dest} ({} frames, {}cs delay)",
                state.frame_count,
                state.original_frame_delay_cs.unwrap_or(0)
            );
        }
        GifCommand::Delete { index } => {
            let state = toolkit.run_frame_edit(FrameEdit::Delete { index }).await?;
            let dest = derive_output_path(file, "_edited", None, "gif");
            fs::copy(&state.current_input_path, &dest)
                .with_context(|| format!("Failed to write {dest}"))?;
            println!("{dest} ({} frames)", state.frame_count);
        }
        GifCommand::Delay { delay_cs } => {
            toolkit
                .run_frame_edit(FrameEdit::ResampleDelay { delay_cs })
                .await?;
            println!("{file} delay restamped to {delay_cs}cs");
        }
        GifCommand::Loop { count } => {
            toolkit.engine().set_loop_count(file, count).await?;
            println!("{file} loop count restamped to {count}");
        }
    }

    Ok(())
}

/// Last artifact of a sequential tool chain. The no-selection guards above
/// make an empty chain unreachable, but it must not panic.
fn take_final(mut pending: Vec<WorkingArtifact>) -> Result<WorkingArtifact> {
    pending.pop().context("no operation produced an output")
}

async fn run_pipeline<E: ImageOps>(
    toolkit: &Toolkit<E>,
    request: &PipelineRequest,
) -> Result<ProcessResult> {
    toolkit.run_process(request).await.map_err(print_pipeline_error)
}

/// Print the stage-scoped log on failure, then surface a terse error.
fn print_pipeline_error(err: PipelineError) -> anyhow::Error {
    if let PipelineError::StageFailed { stage, log } = &err {
        eprintln!("stage {stage} failed:");
        for line in log {
            eprintln!("  {line}");
        }
    }
    anyhow::anyhow!(err.to_string())
}

fn report(result: &ProcessResult) {
    for output in &result.outputs {
        if output.requested > 1 {
            println!(
                "{} ({}: {}/{} generated)",
                output.path, output.label, output.generated, output.requested
            );
        } else {
            println!("{} ({})", output.path, output.label);
        }
    }
    for line in &result.log {
        tracing::debug!("{}", line);
    }
}
