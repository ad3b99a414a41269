use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// The four named pipeline stages in their fixed dependency order.
///
/// The order is an invariant of the pipeline: stages always execute in this
/// sequence regardless of the order the caller lists them in. Background
/// removal must see the untouched pixels, scaling must see the transparency
/// mask, and the packaging stages consume whatever the earlier stages left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageKind {
    RemoveBackground,
    Scale,
    IconGeneration,
    StorePack,
}

impl StageKind {
    /// The full execution order. `active_stages` filters this down to the
    /// stages a request actually selected.
    pub const ORDER: [StageKind; 4] = [
        StageKind::RemoveBackground,
        StageKind::Scale,
        StageKind::IconGeneration,
        StageKind::StorePack,
    ];

    /// Short name used in logs and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::RemoveBackground => "removebg",
            StageKind::Scale => "scale",
            StageKind::IconGeneration => "icons",
            StageKind::StorePack => "storepack",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a store-pack entry maps the source onto the requested canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    /// Scale to fit inside the canvas, pad the rest with transparency.
    Fit,
    /// Scale to cover the canvas, crop the overflow (center gravity).
    Fill,
    /// Stretch to the exact canvas, distorting aspect ratio.
    Stretch,
}

/// One requested output in a StorePack stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub width: u32,
    pub height: u32,
    /// Output filename within the pack directory. Synthesized as
    /// `{width}x{height}.png` when absent.
    pub filename: Option<String>,
}

impl StoreEntry {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            filename: None,
        }
    }

    /// Effective output filename for this entry.
    pub fn output_name(&self) -> String {
        match &self.filename {
            Some(name) => name.clone(),
            None => format!("{}x{}.png", self.width, self.height),
        }
    }
}

/// Per-stage parameter bag: one variant per [`StageKind`].
///
/// Validated at the request boundary rather than deep inside stage handlers,
/// so a handler never has to guess what an absent field means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageParams {
    RemoveBackground {
        /// Color-distance tolerance, 0-100 percent.
        fuzz: u8,
        /// Trim transparent margins after removal (non-fatal on failure).
        trim: bool,
        /// Border-only flood fill instead of a global color replace.
        preserve_inner: bool,
        /// Try edge-feathered removal before the other strategies.
        edge_detect: bool,
        /// Feather amount for edge-detected removal.
        edge_strength: f32,
    },
    Scale {
        target_width: u32,
        /// Zero means "derive from the source aspect ratio".
        target_height: u32,
        /// Pad to max(width, height) square with centered content.
        make_square: bool,
    },
    IconGeneration {
        trim: bool,
        make_square: bool,
        /// Single multi-resolution .ico container.
        single_icon: bool,
        web_pack: bool,
        android_pack: bool,
        ios_pack: bool,
    },
    StorePack {
        entries: Vec<StoreEntry>,
        scale_mode: ScaleMode,
        /// Names the output folder; falls back to "storepack".
        pack_name: Option<String>,
    },
}

impl StageParams {
    /// Which stage these parameters belong to.
    pub fn kind(&self) -> StageKind {
        match self {
            StageParams::RemoveBackground { .. } => StageKind::RemoveBackground,
            StageParams::Scale { .. } => StageKind::Scale,
            StageParams::IconGeneration { .. } => StageKind::IconGeneration,
            StageParams::StorePack { .. } => StageKind::StorePack,
        }
    }

    /// Cheap structural validation done at the request boundary.
    ///
    /// Returns a human-readable reason when the parameters can never
    /// produce output, so the pipeline can refuse before any engine call.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StageParams::RemoveBackground { fuzz, .. } => {
                if *fuzz > 100 {
                    return Err(format!("fuzz must be 0-100, got {fuzz}"));
                }
                Ok(())
            }
            StageParams::Scale {
                target_width,
                target_height,
                ..
            } => {
                if *target_width == 0 && *target_height == 0 {
                    return Err("scale requires at least one non-zero dimension".to_string());
                }
                Ok(())
            }
            StageParams::IconGeneration {
                single_icon,
                web_pack,
                android_pack,
                ios_pack,
                ..
            } => {
                if !(single_icon | web_pack | android_pack | ios_pack) {
                    return Err("no output format selected".to_string());
                }
                Ok(())
            }
            StageParams::StorePack { entries, .. } => {
                if entries.is_empty() {
                    return Err("store pack requires at least one dimension entry".to_string());
                }
                Ok(())
            }
        }
    }
}

/// One pipeline invocation: the selected stages with their parameters.
///
/// Caller order is irrelevant; duplicates are dropped (first occurrence
/// wins) and execution follows [`StageKind::ORDER`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub stages: Vec<StageParams>,
    /// Ignore the stages entirely and reflect the unmodified input.
    /// Only meaningful for previews.
    pub original_image: bool,
}

impl PipelineRequest {
    pub fn new(stages: Vec<StageParams>) -> Self {
        Self {
            stages,
            original_image: false,
        }
    }

    /// The stages to execute, deduplicated and in dependency order.
    pub fn active_stages(&self) -> Vec<&StageParams> {
        let mut picked: Vec<&StageParams> = Vec::new();
        for kind in StageKind::ORDER {
            if let Some(params) = self.stages.iter().find(|p| p.kind() == kind) {
                picked.push(params);
            }
        }
        picked
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// One durable file or directory produced by a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub path: Utf8PathBuf,
    /// What this output is, e.g. "scaled image" or "web icon pack".
    pub label: String,
    /// Assets successfully written for this output.
    pub generated: usize,
    /// Assets requested for this output. `generated < requested` marks a
    /// tolerated partial failure (StorePack / icon packs).
    pub requested: usize,
}

impl OutputDescriptor {
    /// A single-file output that either fully exists or doesn't.
    pub fn file(path: Utf8PathBuf, label: impl Into<String>) -> Self {
        Self {
            path,
            label: label.into(),
            generated: 1,
            requested: 1,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.generated == self.requested
    }
}

/// Result of a full pipeline execution.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    pub outputs: Vec<OutputDescriptor>,
    /// Set when the run produced exactly one durable file.
    pub primary_output: Option<Utf8PathBuf>,
    /// Stage-scoped log lines, in execution order.
    pub log: Vec<String>,
}

/// Result of a preview render: an inline-encoded image, never a durable file.
#[derive(Debug, Clone)]
pub struct PreviewResult {
    /// Base64-encoded PNG bytes.
    pub image_data: String,
    pub width: u32,
    pub height: u32,
}
