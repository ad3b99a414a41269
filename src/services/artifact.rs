use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;

/// Allocator for uniquely named working files in a scratch directory.
///
/// Backed either by a private [`TempDir`] (deleted when the session ends) or
/// by a user-configured directory. Allocation hands out a path; nothing is
/// created on disk until an engine call writes there.
pub struct ScratchSpace {
    dir: Utf8PathBuf,
    seq: AtomicU64,
    // Held for its Drop: removing the directory tree on session teardown.
    _owned: Option<TempDir>,
}

impl ScratchSpace {
    /// Private per-session scratch directory under the system temp area.
    pub fn new() -> Result<Self> {
        let owned = TempDir::with_prefix("piclet-").context("Failed to create scratch dir")?;
        let dir = Utf8PathBuf::from_path_buf(owned.path().to_path_buf())
            .map_err(|p| anyhow::anyhow!("scratch dir is not UTF-8: {}", p.display()))?;
        Ok(Self {
            dir,
            seq: AtomicU64::new(0),
            _owned: Some(owned),
        })
    }

    /// Scratch space in a caller-managed directory (created if missing).
    /// Artifacts are still cleaned individually, but the directory stays.
    pub fn in_dir(dir: &Utf8Path) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create scratch dir: {dir}"))?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            seq: AtomicU64::new(0),
            _owned: None,
        })
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Allocate a uniquely named working artifact with the given extension.
    pub fn allocate(&self, ext: &str) -> WorkingArtifact {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("piclet-{}-{:04}.{}", std::process::id(), seq, ext);
        WorkingArtifact::new(self.dir.join(name))
    }

    /// Allocate a uniquely named subdirectory (for frame extraction).
    pub fn allocate_dir(&self, label: &str) -> Result<Utf8PathBuf> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let dir = self
            .dir
            .join(format!("piclet-{}-{:04}-{}", std::process::id(), seq, label));
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {dir}"))?;
        Ok(dir)
    }
}

/// An owned temporary file produced by one pipeline stage.
///
/// Exactly one artifact is "live" at a time during pipeline execution; when
/// a stage's output supersedes its input, dropping the old artifact deletes
/// the file. This makes cleanup automatic on every exit path - success,
/// stage failure, or panic unwinding out of the executor.
#[derive(Debug)]
pub struct WorkingArtifact {
    path: Utf8PathBuf,
    armed: bool,
}

impl WorkingArtifact {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Take ownership of the path without deleting the file.
    pub fn into_path(mut self) -> Utf8PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Move the artifact to a durable destination, disarming cleanup.
    /// Falls back to copy + remove when rename crosses filesystems.
    pub fn persist(mut self, dest: &Utf8Path) -> Result<Utf8PathBuf> {
        if fs::rename(&self.path, dest).is_err() {
            fs::copy(&self.path, dest)
                .with_context(|| format!("Failed to persist {} to {dest}", self.path))?;
            let _ = fs::remove_file(&self.path);
        }
        self.armed = false;
        Ok(dest.to_path_buf())
    }
}

impl Drop for WorkingArtifact {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!("Failed to clean working artifact {}: {}", self.path, e);
            } else {
                tracing::trace!("Cleaned working artifact {}", self.path);
            }
        }
    }
}

/// Derive a durable output path from the original source path:
/// `{dir}/{basename}{suffix}[-{w}x{h}].{ext}`.
pub fn derive_output_path(
    source: &Utf8Path,
    suffix: &str,
    dims: Option<(u32, u32)>,
    ext: &str,
) -> Utf8PathBuf {
    let dir = source.parent().unwrap_or(Utf8Path::new("."));
    let base = source.file_stem().unwrap_or("output");
    let name = match dims {
        Some((w, h)) => format!("{base}{suffix}-{w}x{h}.{ext}"),
        None => format!("{base}{suffix}.{ext}"),
    };
    dir.join(name)
}

/// Durable sibling directory: `{dir}/{basename}{suffix}/`.
pub fn derive_output_dir(source: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    let dir = source.parent().unwrap_or(Utf8Path::new("."));
    let base = source.file_stem().unwrap_or("output");
    dir.join(format!("{base}{suffix}"))
}

/// Extension of the source, defaulting to png for extension-less inputs.
pub fn source_ext(source: &Utf8Path) -> &str {
    source.extension().unwrap_or("png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_allocate_unique_names() {
        let scratch = ScratchSpace::new().unwrap();
        let a = scratch.allocate("png");
        let b = scratch.allocate("png");
        assert_ne!(a.path(), b.path());
        assert!(a.path().as_str().ends_with(".png"));
    }

    #[test]
    fn test_drop_deletes_file() {
        let scratch = ScratchSpace::new().unwrap();
        let artifact = scratch.allocate("png");
        let path = artifact.path().to_path_buf();
        fs::File::create(&path)
            .unwrap()
            .write_all(b"pixels")
            .unwrap();
        assert!(path.exists());

        drop(artifact);
        assert!(!path.exists());
    }

    #[test]
    fn test_into_path_disarms_cleanup() {
        let scratch = ScratchSpace::new().unwrap();
        let artifact = scratch.allocate("png");
        let path = artifact.path().to_path_buf();
        fs::write(&path, b"pixels").unwrap();

        let kept = artifact.into_path();
        assert_eq!(kept, path);
        assert!(path.exists());
    }

    #[test]
    fn test_persist_moves_and_disarms() {
        let scratch = ScratchSpace::new().unwrap();
        let artifact = scratch.allocate("png");
        let temp_path = artifact.path().to_path_buf();
        fs::write(&temp_path, b"pixels").unwrap();

        let dest = scratch.dir().join("final.png");
        let persisted = artifact.persist(&dest).unwrap();

        assert_eq!(persisted, dest);
        assert!(dest.exists());
        assert!(!temp_path.exists());
    }

    #[test]
    fn test_drop_of_unwritten_artifact_is_silent() {
        let scratch = ScratchSpace::new().unwrap();
        let artifact = scratch.allocate("png");
        // Never written to disk; drop must not error.
        drop(artifact);
    }

    #[test]
    fn test_derive_output_path_with_dims() {
        let path = derive_output_path(
            Utf8Path::new("/pics/cat.png"),
            "_scaled",
            Some((400, 400)),
            "png",
        );
        assert_eq!(path, "/pics/cat_scaled-400x400.png");
    }

    #[test]
    fn test_derive_output_path_without_dims() {
        let path = derive_output_path(Utf8Path::new("/pics/cat.jpg"), "_nobg", None, "png");
        assert_eq!(path, "/pics/cat_nobg.png");
    }

    #[test]
    fn test_derive_output_dir() {
        assert_eq!(
            derive_output_dir(Utf8Path::new("/pics/cat.png"), "_icons"),
            "/pics/cat_icons"
        );
        assert_eq!(
            derive_output_dir(Utf8Path::new("/pics/cat.png"), "_frames"),
            "/pics/cat_frames"
        );
    }

    #[test]
    fn test_source_ext_default() {
        assert_eq!(source_ext(Utf8Path::new("/pics/cat.jpg")), "jpg");
        assert_eq!(source_ext(Utf8Path::new("/pics/cat")), "png");
    }
}
