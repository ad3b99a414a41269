use crate::metrics::Metrics;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Errors that can occur while driving the external image engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("image engine not found: {0}")]
    MissingDependency(String),

    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),

    #[error("process error: {0}")]
    ProcessError(#[from] std::io::Error),

    #[error("unreadable image: {0}")]
    UnreadableImage(String),

    #[error("{op} failed: {detail}")]
    OperationFailed { op: &'static str, detail: String },
}

/// Facade over every external engine invocation.
///
/// All pixel manipulation is delegated to the engine; callers only see named
/// operations with success/failure plus optional structured data (dimensions,
/// frame counts). The trait exists so the pipeline, preview, and animation
/// layers can be exercised against a scripted double in tests.
#[allow(async_fn_in_trait)]
pub trait ImageOps {
    async fn dimensions(&self, path: &Utf8Path) -> Result<(u32, u32), EngineError>;

    /// Sample the top-left corner pixel as a color string usable in later
    /// engine calls (e.g. `srgb(255,255,255)`).
    async fn dominant_corner_color(&self, path: &Utf8Path) -> Result<String, EngineError>;

    async fn trim(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError>;

    /// Pad with transparency so width == height, content centered.
    /// Short-circuits to a byte copy when the image is already square.
    async fn squarify(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError>;

    /// Fit inside a size x size box, then pad to exactly size x size.
    async fn scale_to_square_size(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        size: u32,
    ) -> Result<(), EngineError>;

    /// Fit inside width x height, pad the remainder with transparency.
    async fn scale_with_padding(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        width: u32,
        height: u32,
    ) -> Result<(), EngineError>;

    /// Resize to exactly width x height. A zero dimension means "derive
    /// from aspect ratio"; with both set the aspect ratio is not preserved.
    async fn resize_exact(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        width: u32,
        height: u32,
    ) -> Result<(), EngineError>;

    /// Scale to cover width x height, cropping overflow (center gravity).
    async fn scale_fill_crop(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        width: u32,
        height: u32,
    ) -> Result<(), EngineError>;

    /// Replace every pixel within `fuzz` percent of `color` with transparency.
    async fn remove_background_global(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        color: &str,
        fuzz: u8,
    ) -> Result<(), EngineError>;

    /// Flood-fill transparency inward from the borders only, preserving
    /// interior regions of the background color.
    async fn remove_background_border_flood(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        color: &str,
        fuzz: u8,
    ) -> Result<(), EngineError>;

    /// Global replace followed by alpha-channel feathering to soften edges.
    async fn remove_background_edge_feather(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        color: &str,
        fuzz: u8,
        edge_strength: f32,
    ) -> Result<(), EngineError>;

    /// Package one source into a multi-resolution .ico container.
    async fn pack_multi_resolution_icon(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        sizes: &[u32],
    ) -> Result<(), EngineError>;

    /// Bundle several already-sized images into one .ico container.
    async fn pack_icon_from_multiple_sources(
        &self,
        inputs: &[Utf8PathBuf],
        output: &Utf8Path,
    ) -> Result<(), EngineError>;

    async fn extract_frame(
        &self,
        input: &Utf8Path,
        index: usize,
        output: &Utf8Path,
    ) -> Result<(), EngineError>;

    /// Extract every frame as `frame{NNN}.png` into `dest_dir`, returning
    /// the produced paths in frame order.
    async fn extract_all_frames(
        &self,
        input: &Utf8Path,
        dest_dir: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, EngineError>;

    async fn frame_count(&self, path: &Utf8Path) -> Result<usize, EngineError>;

    /// Whether the file's container format can hold multiple frames.
    fn is_multi_frame_format(&self, path: &Utf8Path) -> bool;

    /// Per-frame delay in centiseconds (first frame's value).
    async fn frame_delay(&self, path: &Utf8Path) -> Result<u32, EngineError>;

    /// Restamp every frame's delay, in place.
    async fn set_frame_delay(&self, path: &Utf8Path, delay_cs: u32) -> Result<(), EngineError>;

    /// Restamp the animation loop count, in place. Zero means forever.
    async fn set_loop_count(&self, path: &Utf8Path, loops: u32) -> Result<(), EngineError>;

    /// Keep every `skip_factor`-th frame, dropping the rest. Delay
    /// adjustment is the caller's concern.
    async fn simplify_frames(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        skip_factor: usize,
    ) -> Result<(), EngineError>;

    async fn delete_frame(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        index: usize,
    ) -> Result<(), EngineError>;

    /// Substitute one frame's content, preserving count and timing.
    async fn replace_frame(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        index: usize,
        frame: &Utf8Path,
    ) -> Result<(), EngineError>;

    // Primitives shared with the sibling transform/filter/recolor tools.

    async fn rotate(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        degrees: f32,
    ) -> Result<(), EngineError>;

    async fn flip_vertical(&self, input: &Utf8Path, output: &Utf8Path)
    -> Result<(), EngineError>;

    async fn flop_horizontal(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<(), EngineError>;

    async fn grayscale(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError>;

    async fn sepia(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError>;

    async fn negate(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError>;

    async fn add_border(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        size: u32,
        color: &str,
    ) -> Result<(), EngineError>;

    async fn recolor(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        from: &str,
        to: &str,
        fuzz: u8,
    ) -> Result<(), EngineError>;
}

/// Locate a working ImageMagick binary.
///
/// Probes the configured path first, then `magick` on PATH, verifying each
/// candidate with `-version`. This runs once at startup so a missing engine
/// is surfaced before any stage does.
pub async fn detect_engine(configured: Option<&Utf8Path>) -> Result<Utf8PathBuf, EngineError> {
    let mut candidates: Vec<Utf8PathBuf> = Vec::new();
    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }
    candidates.push(Utf8PathBuf::from("magick"));

    for candidate in &candidates {
        let probe = Command::new(candidate.as_str())
            .arg("-version")
            .output()
            .await;

        match probe {
            Ok(output) if output.status.success() => {
                let banner = String::from_utf8_lossy(&output.stdout);
                let version = banner.lines().next().unwrap_or("unknown version");
                tracing::info!("Found image engine at {}: {}", candidate, version);
                return Ok(candidate.clone());
            }
            Ok(output) => {
                tracing::debug!(
                    "Engine candidate {} exited with {}",
                    candidate,
                    output.status
                );
            }
            Err(e) => {
                tracing::debug!("Engine candidate {} not invokable: {}", candidate, e);
            }
        }
    }

    Err(EngineError::MissingDependency(
        "no ImageMagick binary found (configure \"Engine Path\" or install `magick`)".to_string(),
    ))
}

/// ImageMagick-backed implementation of [`ImageOps`].
///
/// Every operation is an out-of-process `magick` invocation executed under a
/// per-call timeout. Multi-frame inputs are handled by coalescing frames
/// before whole-image transforms and re-optimizing frame layering after, so
/// a GIF run through the pipeline keeps all of its frames.
pub struct MagickEngine {
    binary: Utf8PathBuf,
    call_timeout: Duration,
    metrics: Option<Arc<Metrics>>,

    /// Matches `identify -format "%w %h"` output, e.g. "800 600".
    dimensions_pattern: Regex,
}

impl MagickEngine {
    pub fn new(binary: Utf8PathBuf, call_timeout: Duration) -> Self {
        Self {
            binary,
            call_timeout,
            metrics: None,
            dimensions_pattern: Regex::new(r"^(\d+)\s+(\d+)").expect("Invalid dimensions regex"),
        }
    }

    /// Record per-call counts and durations into the given metrics.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `magick` with the given arguments, mapping timeouts and non-zero
    /// exits into [`EngineError`]. Returns captured stdout.
    async fn run(&self, op: &'static str, args: &[String]) -> Result<String, EngineError> {
        tracing::debug!("Engine call [{}]: magick {}", op, args.join(" "));

        let start = Instant::now();
        let child = Command::new(self.binary.as_str())
            .args(args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()?;

        let output = timeout(self.call_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::warn!("Engine call [{}] timed out after {:?}", op, self.call_timeout);
                EngineError::Timeout(self.call_timeout)
            })??;

        tracing::debug!(
            "Engine call [{}] finished in {:.2}s with {}",
            op,
            start.elapsed().as_secs_f32(),
            output.status
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_engine_call(start.elapsed());
        }

        if !output.status.success() {
            let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(EngineError::OperationFailed {
                op,
                detail: if detail.is_empty() {
                    format!("exit status {}", output.status)
                } else {
                    detail
                },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Convert-style invocation: input, transform args, output. GIF inputs
    /// are coalesced first and layer-optimized after so per-frame deltas
    /// survive whole-image transforms.
    async fn run_convert(
        &self,
        op: &'static str,
        input: &Utf8Path,
        transform: &[String],
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        let mut args: Vec<String> = vec![input.to_string()];
        let animated = self.is_multi_frame_format(input);
        if animated {
            args.push("-coalesce".to_string());
        }
        args.extend_from_slice(transform);
        if animated {
            args.push("-layers".to_string());
            args.push("optimize".to_string());
        }
        args.push(output.to_string());

        self.run(op, &args).await.map(|_| ())
    }

    /// In-place metadata edit: write to a sibling temp path, then swap.
    async fn run_in_place(
        &self,
        op: &'static str,
        path: &Utf8Path,
        transform: &[String],
    ) -> Result<(), EngineError> {
        let staging = in_place_staging_path(path);
        let mut args: Vec<String> = vec![path.to_string()];
        args.extend_from_slice(transform);
        args.push(staging.to_string());

        self.run(op, &args).await?;
        fs::rename(&staging, path)?;
        Ok(())
    }

    fn parse_dimensions(&self, raw: &str) -> Result<(u32, u32), EngineError> {
        let caps = self
            .dimensions_pattern
            .captures(raw.trim())
            .ok_or_else(|| EngineError::UnreadableImage(format!("bad identify output: {raw:?}")))?;

        // Both captures are \d+ so the parses cannot fail.
        let width = caps[1].parse().unwrap_or(0);
        let height = caps[2].parse().unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(EngineError::UnreadableImage(format!(
                "degenerate dimensions in {raw:?}"
            )));
        }
        Ok((width, height))
    }
}

/// Staging path for in-place edits: `name.ext` -> `name.inplace.ext`.
fn in_place_staging_path(path: &Utf8Path) -> Utf8PathBuf {
    let stem = path.file_stem().unwrap_or("edit");
    let ext = path.extension().unwrap_or("tmp");
    path.with_file_name(format!("{stem}.inplace.{ext}"))
}

/// `WxH` geometry string with zero meaning "derive from aspect".
fn exact_geometry(width: u32, height: u32) -> String {
    match (width, height) {
        (w, 0) => format!("{w}x"),
        (0, h) => format!("x{h}"),
        (w, h) => format!("{w}x{h}!"),
    }
}

/// Comma list deleting every frame except `keep`.
fn keep_one_delete_list(frame_count: usize, keep: usize) -> String {
    (0..frame_count)
        .filter(|&i| i != keep)
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Comma list of frame indexes to delete when keeping every
/// `skip_factor`-th frame of `frame_count` frames.
fn simplify_delete_list(frame_count: usize, skip_factor: usize) -> String {
    (0..frame_count)
        .filter(|i| i % skip_factor != 0)
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl ImageOps for MagickEngine {
    async fn dimensions(&self, path: &Utf8Path) -> Result<(u32, u32), EngineError> {
        let args = vec![
            "identify".to_string(),
            "-format".to_string(),
            "%w %h".to_string(),
            format!("{path}[0]"),
        ];
        let raw = self.run("dimensions", &args).await?;
        self.parse_dimensions(&raw)
    }

    async fn dominant_corner_color(&self, path: &Utf8Path) -> Result<String, EngineError> {
        let args = vec![
            format!("{path}[0]"),
            "-format".to_string(),
            "%[pixel:u.p{0,0}]".to_string(),
            "info:".to_string(),
        ];
        let raw = self.run("corner_color", &args).await?;
        let color = raw.trim().to_string();
        if color.is_empty() {
            return Err(EngineError::UnreadableImage(
                "empty corner color sample".to_string(),
            ));
        }
        Ok(color)
    }

    async fn trim(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        let transform = vec!["-trim".to_string(), "+repage".to_string()];
        self.run_convert("trim", input, &transform, output).await
    }

    async fn squarify(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        let (width, height) = self.dimensions(input).await?;
        if width == height {
            // Already square: lossless copy instead of a re-encode.
            fs::copy(input, output)?;
            return Ok(());
        }

        let side = width.max(height);
        let transform = vec![
            "-background".to_string(),
            "none".to_string(),
            "-gravity".to_string(),
            "center".to_string(),
            "-extent".to_string(),
            format!("{side}x{side}"),
        ];
        self.run_convert("squarify", input, &transform, output)
            .await
    }

    async fn scale_to_square_size(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        size: u32,
    ) -> Result<(), EngineError> {
        let transform = vec![
            "-resize".to_string(),
            format!("{size}x{size}"),
            "-background".to_string(),
            "none".to_string(),
            "-gravity".to_string(),
            "center".to_string(),
            "-extent".to_string(),
            format!("{size}x{size}"),
        ];
        self.run_convert("scale_square", input, &transform, output)
            .await
    }

    async fn scale_with_padding(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        width: u32,
        height: u32,
    ) -> Result<(), EngineError> {
        let transform = vec![
            "-resize".to_string(),
            format!("{width}x{height}"),
            "-background".to_string(),
            "none".to_string(),
            "-gravity".to_string(),
            "center".to_string(),
            "-extent".to_string(),
            format!("{width}x{height}"),
        ];
        self.run_convert("scale_pad", input, &transform, output)
            .await
    }

    async fn resize_exact(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        width: u32,
        height: u32,
    ) -> Result<(), EngineError> {
        let transform = vec!["-resize".to_string(), exact_geometry(width, height)];
        self.run_convert("resize", input, &transform, output).await
    }

    async fn scale_fill_crop(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        width: u32,
        height: u32,
    ) -> Result<(), EngineError> {
        let transform = vec![
            "-resize".to_string(),
            format!("{width}x{height}^"),
            "-gravity".to_string(),
            "center".to_string(),
            "-extent".to_string(),
            format!("{width}x{height}"),
        ];
        self.run_convert("fill_crop", input, &transform, output)
            .await
    }

    async fn remove_background_global(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        color: &str,
        fuzz: u8,
    ) -> Result<(), EngineError> {
        let transform = vec![
            "-alpha".to_string(),
            "set".to_string(),
            "-fuzz".to_string(),
            format!("{fuzz}%"),
            "-transparent".to_string(),
            color.to_string(),
        ];
        self.run_convert("removebg_global", input, &transform, output)
            .await
    }

    async fn remove_background_border_flood(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        color: &str,
        fuzz: u8,
    ) -> Result<(), EngineError> {
        // A one-pixel border of the background color guarantees the flood
        // fill reaches every outer region, then gets shaved back off.
        let transform = vec![
            "-alpha".to_string(),
            "set".to_string(),
            "-bordercolor".to_string(),
            color.to_string(),
            "-border".to_string(),
            "1".to_string(),
            "-fuzz".to_string(),
            format!("{fuzz}%"),
            "-fill".to_string(),
            "none".to_string(),
            "-draw".to_string(),
            "alpha 0,0 floodfill".to_string(),
            "-shave".to_string(),
            "1x1".to_string(),
        ];
        self.run_convert("removebg_flood", input, &transform, output)
            .await
    }

    async fn remove_background_edge_feather(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        color: &str,
        fuzz: u8,
        edge_strength: f32,
    ) -> Result<(), EngineError> {
        let transform = vec![
            "-alpha".to_string(),
            "set".to_string(),
            "-fuzz".to_string(),
            format!("{fuzz}%"),
            "-transparent".to_string(),
            color.to_string(),
            "-channel".to_string(),
            "A".to_string(),
            "-blur".to_string(),
            format!("0x{edge_strength}"),
            "-level".to_string(),
            "50%,100%".to_string(),
            "+channel".to_string(),
        ];
        self.run_convert("removebg_feather", input, &transform, output)
            .await
    }

    async fn pack_multi_resolution_icon(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        sizes: &[u32],
    ) -> Result<(), EngineError> {
        let ladder = sizes
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let args = vec![
            input.to_string(),
            "-define".to_string(),
            format!("icon:auto-resize={ladder}"),
            output.to_string(),
        ];
        self.run("pack_icon", &args).await.map(|_| ())
    }

    async fn pack_icon_from_multiple_sources(
        &self,
        inputs: &[Utf8PathBuf],
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        let mut args: Vec<String> = inputs.iter().map(|p| p.to_string()).collect();
        args.push(output.to_string());
        self.run("pack_icon_multi", &args).await.map(|_| ())
    }

    async fn extract_frame(
        &self,
        input: &Utf8Path,
        index: usize,
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        // Coalesce so frames of delta-optimized GIFs come out whole, then
        // drop every frame except the requested one.
        let count = if self.is_multi_frame_format(input) {
            self.frame_count(input).await?
        } else {
            1
        };
        if index >= count {
            return Err(EngineError::OperationFailed {
                op: "extract_frame",
                detail: format!("frame {index} out of range (0..{count})"),
            });
        }

        let mut args = vec![input.to_string(), "-coalesce".to_string()];
        let delete_list = keep_one_delete_list(count, index);
        if !delete_list.is_empty() {
            args.push("-delete".to_string());
            args.push(delete_list);
        }
        args.push(output.to_string());
        self.run("extract_frame", &args).await.map(|_| ())
    }

    async fn extract_all_frames(
        &self,
        input: &Utf8Path,
        dest_dir: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, EngineError> {
        fs::create_dir_all(dest_dir)?;
        let pattern = dest_dir.join("frame%03d.png");
        let args = vec![
            input.to_string(),
            "-coalesce".to_string(),
            pattern.to_string(),
        ];
        self.run("extract_frames", &args).await?;

        let mut frames: Vec<Utf8PathBuf> = Vec::new();
        for entry in dest_dir
            .read_dir_utf8()
            .map_err(|e| EngineError::ProcessError(e))?
        {
            let entry = entry.map_err(EngineError::ProcessError)?;
            let name = entry.file_name();
            if name.starts_with("frame") && name.ends_with(".png") {
                frames.push(entry.path().to_path_buf());
            }
        }
        frames.sort();
        Ok(frames)
    }

    async fn frame_count(&self, path: &Utf8Path) -> Result<usize, EngineError> {
        let args = vec![
            "identify".to_string(),
            "-format".to_string(),
            "%n\\n".to_string(),
            path.to_string(),
        ];
        let raw = self.run("frame_count", &args).await?;
        raw.lines()
            .next()
            .and_then(|line| line.trim().parse().ok())
            .filter(|&n| n > 0)
            .ok_or_else(|| EngineError::UnreadableImage(format!("bad frame count: {raw:?}")))
    }

    fn is_multi_frame_format(&self, path: &Utf8Path) -> bool {
        matches!(
            path.extension().map(|e| e.to_ascii_lowercase()).as_deref(),
            Some("gif")
        )
    }

    async fn frame_delay(&self, path: &Utf8Path) -> Result<u32, EngineError> {
        let args = vec![
            "identify".to_string(),
            "-format".to_string(),
            "%T\\n".to_string(),
            path.to_string(),
        ];
        let raw = self.run("frame_delay", &args).await?;
        raw.lines()
            .next()
            .and_then(|line| line.trim().parse().ok())
            .ok_or_else(|| EngineError::UnreadableImage(format!("bad frame delay: {raw:?}")))
    }

    async fn set_frame_delay(&self, path: &Utf8Path, delay_cs: u32) -> Result<(), EngineError> {
        let transform = vec![
            "-coalesce".to_string(),
            "-set".to_string(),
            "delay".to_string(),
            delay_cs.to_string(),
            "-layers".to_string(),
            "optimize".to_string(),
        ];
        self.run_in_place("set_delay", path, &transform).await
    }

    async fn set_loop_count(&self, path: &Utf8Path, loops: u32) -> Result<(), EngineError> {
        let transform = vec!["-loop".to_string(), loops.to_string()];
        self.run_in_place("set_loop", path, &transform).await
    }

    async fn simplify_frames(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        skip_factor: usize,
    ) -> Result<(), EngineError> {
        let count = self.frame_count(input).await?;
        let delete_list = simplify_delete_list(count, skip_factor);
        if delete_list.is_empty() {
            fs::copy(input, output)?;
            return Ok(());
        }

        let args = vec![
            input.to_string(),
            "-coalesce".to_string(),
            "-delete".to_string(),
            delete_list,
            "-layers".to_string(),
            "optimize".to_string(),
            output.to_string(),
        ];
        self.run("simplify", &args).await.map(|_| ())
    }

    async fn delete_frame(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        index: usize,
    ) -> Result<(), EngineError> {
        let args = vec![
            input.to_string(),
            "-coalesce".to_string(),
            "-delete".to_string(),
            index.to_string(),
            "-layers".to_string(),
            "optimize".to_string(),
            output.to_string(),
        ];
        self.run("delete_frame", &args).await.map(|_| ())
    }

    async fn replace_frame(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        index: usize,
        frame: &Utf8Path,
    ) -> Result<(), EngineError> {
        let delay = self.frame_delay(input).await.unwrap_or(10);

        // Reading `frame` appends it at the end of the sequence; `-insert`
        // then moves it into the deleted slot with the original timing.
        let args = vec![
            input.to_string(),
            "-coalesce".to_string(),
            "-delete".to_string(),
            index.to_string(),
            "-delay".to_string(),
            delay.to_string(),
            frame.to_string(),
            "-insert".to_string(),
            index.to_string(),
            "-layers".to_string(),
            "optimize".to_string(),
            output.to_string(),
        ];
        self.run("replace_frame", &args).await.map(|_| ())
    }

    async fn rotate(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        degrees: f32,
    ) -> Result<(), EngineError> {
        let transform = vec![
            "-background".to_string(),
            "none".to_string(),
            "-rotate".to_string(),
            degrees.to_string(),
        ];
        self.run_convert("rotate", input, &transform, output).await
    }

    async fn flip_vertical(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        self.run_convert("flip", input, &["-flip".to_string()], output)
            .await
    }

    async fn flop_horizontal(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        self.run_convert("flop", input, &["-flop".to_string()], output)
            .await
    }

    async fn grayscale(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        let transform = vec!["-colorspace".to_string(), "Gray".to_string()];
        self.run_convert("grayscale", input, &transform, output)
            .await
    }

    async fn sepia(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        let transform = vec!["-sepia-tone".to_string(), "80%".to_string()];
        self.run_convert("sepia", input, &transform, output).await
    }

    async fn negate(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        self.run_convert("negate", input, &["-negate".to_string()], output)
            .await
    }

    async fn add_border(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        size: u32,
        color: &str,
    ) -> Result<(), EngineError> {
        let transform = vec![
            "-bordercolor".to_string(),
            color.to_string(),
            "-border".to_string(),
            size.to_string(),
        ];
        self.run_convert("border", input, &transform, output).await
    }

    async fn recolor(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        from: &str,
        to: &str,
        fuzz: u8,
    ) -> Result<(), EngineError> {
        let transform = vec![
            "-fuzz".to_string(),
            format!("{fuzz}%"),
            "-fill".to_string(),
            to.to_string(),
            "-opaque".to_string(),
            from.to_string(),
        ];
        self.run_convert("recolor", input, &transform, output).await
    }
}

/// Build a [`MagickEngine`] from settings, probing for the binary.
pub async fn build_engine(
    configured_path: Option<&Utf8Path>,
    call_timeout: Duration,
) -> Result<MagickEngine> {
    let binary = detect_engine(configured_path)
        .await
        .context("image engine detection failed")?;
    Ok(MagickEngine::new(binary, call_timeout))
}
