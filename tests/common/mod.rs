//! Shared test support: a scripted engine double.
//!
//! `FakeEngine` implements [`ImageOps`] without ImageMagick: transforms copy
//! the input file, metadata comes from per-path maps, and every call is
//! recorded so tests can assert on ordering. Individual operations can be
//! told to fail.

// Not every test binary exercises every helper.
#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use piclet::services::{EngineError, ImageOps};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::Mutex;

pub const DEFAULT_DIMS: (u32, u32) = (200, 150);
pub const DEFAULT_DELAY_CS: u32 = 10;

#[derive(Default)]
pub struct FakeEngine {
    pub calls: Mutex<Vec<String>>,
    outputs: Mutex<Vec<(String, Utf8PathBuf)>>,
    dims: Mutex<HashMap<Utf8PathBuf, (u32, u32)>>,
    frame_counts: Mutex<HashMap<Utf8PathBuf, usize>>,
    delays: Mutex<HashMap<Utf8PathBuf, u32>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future call to `op` fail.
    pub fn fail_on(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    /// Pretend `path` has these dimensions.
    pub fn set_dims(&self, path: &Utf8Path, dims: (u32, u32)) {
        self.dims.lock().unwrap().insert(path.to_path_buf(), dims);
    }

    /// Pretend `path` holds this many frames.
    pub fn set_frame_count(&self, path: &Utf8Path, count: usize) {
        self.frame_counts
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), count);
    }

    pub fn set_delay(&self, path: &Utf8Path, delay_cs: u32) {
        self.delays
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), delay_cs);
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Output paths written by calls to `op`, in call order.
    pub fn outputs_for(&self, op: &str) -> Vec<Utf8PathBuf> {
        self.outputs
            .lock()
            .unwrap()
            .iter()
            .filter(|(recorded, _)| recorded == op)
            .map(|(_, path)| path.clone())
            .collect()
    }

    fn record(&self, op: &'static str) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(op.to_string());
        if self.failing.lock().unwrap().contains(op) {
            return Err(EngineError::OperationFailed {
                op,
                detail: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn record_out(&self, op: &'static str, output: &Utf8Path) -> Result<(), EngineError> {
        self.outputs
            .lock()
            .unwrap()
            .push((op.to_string(), output.to_path_buf()));
        self.record(op)
    }

    fn lookup_dims(&self, path: &Utf8Path) -> (u32, u32) {
        self.dims
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(DEFAULT_DIMS)
    }

    fn lookup_frames(&self, path: &Utf8Path) -> usize {
        self.frame_counts
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(1)
    }

    /// Copy input to output, carrying metadata forward.
    fn copy(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        fs::copy(input, output)?;
        let dims = self.lookup_dims(input);
        self.set_dims(output, dims);
        let frames = self.lookup_frames(input);
        self.set_frame_count(output, frames);
        Ok(())
    }

    fn copy_with_dims(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        dims: (u32, u32),
    ) -> Result<(), EngineError> {
        self.copy(input, output)?;
        self.set_dims(output, dims);
        Ok(())
    }

    /// Resolve a requested geometry where zero means "keep aspect".
    fn resolve_dims(&self, input: &Utf8Path, width: u32, height: u32) -> (u32, u32) {
        let (sw, sh) = self.lookup_dims(input);
        match (width, height) {
            (0, h) => (((sw as f64 / sh as f64) * h as f64).round() as u32, h),
            (w, 0) => (w, ((sh as f64 / sw as f64) * w as f64).round() as u32),
            (w, h) => (w, h),
        }
    }
}

impl ImageOps for FakeEngine {
    async fn dimensions(&self, path: &Utf8Path) -> Result<(u32, u32), EngineError> {
        self.record("dimensions")?;
        if !path.exists() {
            return Err(EngineError::UnreadableImage(format!("no such file: {path}")));
        }
        Ok(self.lookup_dims(path))
    }

    async fn dominant_corner_color(&self, path: &Utf8Path) -> Result<String, EngineError> {
        self.record("dominant_corner_color")?;
        let _ = path;
        Ok("srgb(255,255,255)".to_string())
    }

    async fn trim(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        self.record_out("trim", output)?;
        self.copy(input, output)
    }

    async fn squarify(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        self.record_out("squarify", output)?;
        let (w, h) = self.lookup_dims(input);
        let side = w.max(h);
        self.copy_with_dims(input, output, (side, side))
    }

    async fn scale_to_square_size(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        size: u32,
    ) -> Result<(), EngineError> {
        self.record_out("scale_to_square_size", output)?;
        self.copy_with_dims(input, output, (size, size))
    }

    async fn scale_with_padding(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        width: u32,
        height: u32,
    ) -> Result<(), EngineError> {
        self.record_out("scale_with_padding", output)?;
        self.copy_with_dims(input, output, (width, height))
    }

    async fn resize_exact(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        width: u32,
        height: u32,
    ) -> Result<(), EngineError> {
        self.record_out("resize_exact", output)?;
        let dims = self.resolve_dims(input, width, height);
        self.copy_with_dims(input, output, dims)
    }

    async fn scale_fill_crop(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        width: u32,
        height: u32,
    ) -> Result<(), EngineError> {
        self.record_out("scale_fill_crop", output)?;
        self.copy_with_dims(input, output, (width, height))
    }

    async fn remove_background_global(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        _color: &str,
        _fuzz: u8,
    ) -> Result<(), EngineError> {
        self.record_out("remove_background_global", output)?;
        self.copy(input, output)
    }

    async fn remove_background_border_flood(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        _color: &str,
        _fuzz: u8,
    ) -> Result<(), EngineError> {
        self.record_out("remove_background_border_flood", output)?;
        self.copy(input, output)
    }

    async fn remove_background_edge_feather(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        _color: &str,
        _fuzz: u8,
        _edge_strength: f32,
    ) -> Result<(), EngineError> {
        self.record_out("remove_background_edge_feather", output)?;
        self.copy(input, output)
    }

    async fn pack_multi_resolution_icon(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        _sizes: &[u32],
    ) -> Result<(), EngineError> {
        self.record_out("pack_multi_resolution_icon", output)?;
        self.copy(input, output)
    }

    async fn pack_icon_from_multiple_sources(
        &self,
        inputs: &[Utf8PathBuf],
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        self.record_out("pack_icon_from_multiple_sources", output)?;
        let first = inputs
            .first()
            .ok_or_else(|| EngineError::UnreadableImage("no inputs".to_string()))?;
        self.copy(first, output)
    }

    async fn extract_frame(
        &self,
        input: &Utf8Path,
        _index: usize,
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        self.record_out("extract_frame", output)?;
        self.copy(input, output)?;
        // A single extracted frame is a still.
        self.set_frame_count(output, 1);
        Ok(())
    }

    async fn extract_all_frames(
        &self,
        input: &Utf8Path,
        dest_dir: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, EngineError> {
        self.record("extract_all_frames")?;
        let count = self.lookup_frames(input);
        let mut produced = Vec::new();
        for i in 0..count {
            let frame = dest_dir.join(format!("frame{i:03}.png"));
            fs::copy(input, &frame)?;
            self.set_dims(&frame, self.lookup_dims(input));
            self.set_frame_count(&frame, 1);
            produced.push(frame);
        }
        Ok(produced)
    }

    async fn frame_count(&self, path: &Utf8Path) -> Result<usize, EngineError> {
        self.record("frame_count")?;
        Ok(self.lookup_frames(path))
    }

    fn is_multi_frame_format(&self, path: &Utf8Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gif"))
    }

    async fn frame_delay(&self, path: &Utf8Path) -> Result<u32, EngineError> {
        self.record("frame_delay")?;
        Ok(self
            .delays
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(DEFAULT_DELAY_CS))
    }

    async fn set_frame_delay(&self, path: &Utf8Path, delay_cs: u32) -> Result<(), EngineError> {
        self.record("set_frame_delay")?;
        self.set_delay(path, delay_cs);
        Ok(())
    }

    async fn set_loop_count(&self, _path: &Utf8Path, _loops: u32) -> Result<(), EngineError> {
        self.record("set_loop_count")
    }

    async fn simplify_frames(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        skip_factor: usize,
    ) -> Result<(), EngineError> {
        self.record_out("simplify_frames", output)?;
        self.copy(input, output)?;
        let count = self.lookup_frames(input);
        self.set_frame_count(output, count.div_ceil(skip_factor));
        Ok(())
    }

    async fn delete_frame(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        _index: usize,
    ) -> Result<(), EngineError> {
        self.record_out("delete_frame", output)?;
        self.copy(input, output)?;
        let count = self.lookup_frames(input);
        self.set_frame_count(output, count.saturating_sub(1));
        Ok(())
    }

    async fn replace_frame(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        _index: usize,
        _frame: &Utf8Path,
    ) -> Result<(), EngineError> {
        self.record_out("replace_frame", output)?;
        self.copy(input, output)
    }

    async fn rotate(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        _degrees: f32,
    ) -> Result<(), EngineError> {
        self.record_out("rotate", output)?;
        self.copy(input, output)
    }

    async fn flip_vertical(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        self.record_out("flip_vertical", output)?;
        self.copy(input, output)
    }

    async fn flop_horizontal(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        self.record_out("flop_horizontal", output)?;
        self.copy(input, output)
    }

    async fn grayscale(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        self.record_out("grayscale", output)?;
        self.copy(input, output)
    }

    async fn sepia(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        self.record_out("sepia", output)?;
        self.copy(input, output)
    }

    async fn negate(&self, input: &Utf8Path, output: &Utf8Path) -> Result<(), EngineError> {
        self.record_out("negate", output)?;
        self.copy(input, output)
    }

    async fn add_border(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        size: u32,
        _color: &str,
    ) -> Result<(), EngineError> {
        self.record_out("add_border", output)?;
        let (w, h) = self.lookup_dims(input);
        self.copy_with_dims(input, output, (w + 2 * size, h + 2 * size))
    }

    async fn recolor(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        _from: &str,
        _to: &str,
        _fuzz: u8,
    ) -> Result<(), EngineError> {
        self.record_out("recolor", output)?;
        self.copy(input, output)
    }
}

/// Write a tiny placeholder image file and register its metadata.
pub fn make_image(dir: &Utf8Path, name: &str, engine: &FakeEngine, dims: (u32, u32)) -> Utf8PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"fake image bytes").unwrap();
    engine.set_dims(&path, dims);
    path
}

/// Write a placeholder animated asset with the given frame count.
pub fn make_gif(
    dir: &Utf8Path,
    name: &str,
    engine: &FakeEngine,
    frames: usize,
    delay_cs: u32,
) -> Utf8PathBuf {
    let path = make_image(dir, name, engine, DEFAULT_DIMS);
    engine.set_frame_count(&path, frames);
    engine.set_delay(&path, delay_cs);
    path
}

/// Utf8 view of a tempdir path.
pub fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}
