use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique path under the system temp dir, e.g. `reframe_spool_<pid>_<nanos>_<seq>.mp4`.
pub(crate) fn scratch_path(prefix: &str, ext: &str) -> PathBuf {
    scratch_path_in(&std::env::temp_dir(), prefix, ext)
}

/// Unique path under `dir`.
pub(crate) fn scratch_path_in(dir: &Path, prefix: &str, ext: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(
        "reframe_{prefix}_{}_{nanos}_{seq}.{ext}",
        std::process::id()
    ))
}

/// Removes the file at the held path when dropped.
#[derive(Debug)]
pub(crate) struct ScratchFile(Option<PathBuf>);

impl ScratchFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self(Some(path))
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.0.as_deref()
    }

    /// Stop tracking the file so it survives the guard.
    pub(crate) fn keep(mut self) -> Option<PathBuf> {
        self.0.take()
    }

    /// Delete now; later calls are no-ops.
    pub(crate) fn remove(&mut self) {
        if let Some(path) = self.0.take()
            && let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch file");
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        self.remove();
    }
}
