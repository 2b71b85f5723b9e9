//! Scratch directory management for transient pipeline files.
//!
//! # Design
//! - The directory is created and probed once at startup; later operations assume it exists.
//! - Every stored file gets a generated UUID name and is opened with `create_new`, so
//!   concurrent requests never share a path.
//! - Removal is restricted to files located under the registered roots.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use closet_telemetry::Metrics;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{ScratchError, ScratchResult};
use crate::model::{SweepReport, UploadedImage};

const PROBE_PREFIX: &str = ".closet-probe-";
const MAX_EXTENSION_LEN: usize = 8;

/// Handle to the writable scratch directory and the roots it may clean.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: Arc<PathBuf>,
    sweep_roots: Arc<Vec<PathBuf>>,
}

impl ScratchDir {
    /// Create `root` if needed, resolve it to an absolute path, and verify it is writable.
    ///
    /// Calling this repeatedly for the same directory is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, resolved, or written to.
    pub fn ensure(root: impl AsRef<Path>) -> ScratchResult<Self> {
        let requested = root.as_ref();
        fs::create_dir_all(requested)
            .map_err(|err| ScratchError::io("create_dir", requested, err))?;
        let root = requested
            .canonicalize()
            .map_err(|err| ScratchError::io("canonicalize", requested, err))?;
        probe_writable(&root)?;
        info!(root = %root.display(), "scratch directory ready");

        Ok(Self {
            sweep_roots: Arc::new(vec![root.clone()]),
            root: Arc::new(root),
        })
    }

    /// Register additional directories that may be cleaned (worker output dirs).
    ///
    /// The directories need not exist yet.
    #[must_use]
    pub fn with_sweep_roots(self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut merged = self.sweep_roots.as_ref().clone();
        for root in roots {
            let resolved = resolve_root(&root);
            if !merged.contains(&resolved) {
                merged.push(resolved);
            }
        }
        Self {
            root: self.root,
            sweep_roots: Arc::new(merged),
        }
    }

    /// Absolute path of the scratch directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directories considered owned by this scratch area, starting with [`Self::root`].
    #[must_use]
    pub fn sweep_roots(&self) -> &[PathBuf] {
        &self.sweep_roots
    }

    /// Whether the scratch directory still exists as a directory.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    /// Produce a fresh path inside the scratch directory with the given extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is empty, too long, or not ASCII alphanumeric.
    pub fn allocate_path(&self, extension: &str) -> ScratchResult<PathBuf> {
        validate_extension(extension)?;
        Ok(self
            .root
            .join(format!("{}.{}", Uuid::new_v4().simple(), extension)))
    }

    /// Write uploaded bytes to a newly allocated scratch file.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is invalid or the file cannot be written.
    pub async fn persist_upload(
        &self,
        bytes: &[u8],
        original_name: Option<&str>,
        extension: &str,
    ) -> ScratchResult<UploadedImage> {
        let path = self.allocate_path(extension)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|err| ScratchError::io("create_upload", &path, err))?;
        file.write_all(bytes)
            .await
            .map_err(|err| ScratchError::io("write_upload", &path, err))?;
        file.flush()
            .await
            .map_err(|err| ScratchError::io("flush_upload", &path, err))?;

        debug!(path = %path.display(), bytes = bytes.len(), "upload persisted");
        Ok(UploadedImage {
            path,
            original_name: original_name.map(str::to_string),
            size: bytes.len() as u64,
        })
    }

    /// Best-effort removal of request artifacts.
    ///
    /// Paths outside the registered roots are left untouched. Returns the number
    /// of files removed.
    pub async fn remove_artifacts(&self, paths: &[PathBuf]) -> usize {
        let mut removed = 0;
        for path in paths {
            let Ok(canonical) = tokio::fs::canonicalize(path).await else {
                continue;
            };
            if !self.owns(&canonical) {
                debug!(path = %canonical.display(), "skipping artifact outside scratch roots");
                continue;
            }
            match tokio::fs::remove_file(&canonical).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(error = %err, path = %canonical.display(), "failed to remove artifact");
                }
            }
        }
        removed
    }

    /// Remove regular files older than `max_age` under every sweep root.
    ///
    /// Blocking; run it on a blocking thread from async contexts.
    #[must_use]
    pub fn sweep(&self, max_age: Duration) -> SweepReport {
        let now = SystemTime::now();
        let mut report = SweepReport::default();

        for root in self.sweep_roots.iter().filter(|root| root.is_dir()) {
            for entry in WalkDir::new(root).min_depth(1) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        report.failed += 1;
                        warn!(error = %err, root = %root.display(), "scratch sweep walk failed");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                report.scanned += 1;

                let age = entry
                    .metadata()
                    .ok()
                    .and_then(|meta| meta.modified().ok())
                    .map(|modified| now.duration_since(modified).unwrap_or(Duration::ZERO));
                let Some(age) = age else {
                    report.failed += 1;
                    continue;
                };
                if age < max_age {
                    continue;
                }

                match fs::remove_file(entry.path()) {
                    Ok(()) => report.removed += 1,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => {
                        report.failed += 1;
                        warn!(
                            error = %err,
                            path = %entry.path().display(),
                            "failed to remove stale scratch file"
                        );
                    }
                }
            }
        }
        report
    }

    /// Run [`Self::sweep`] every `interval` until the returned task is aborted.
    #[must_use]
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        max_age: Duration,
        metrics: Metrics,
    ) -> JoinHandle<()> {
        let scratch = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let pass = scratch.clone();
                match tokio::task::spawn_blocking(move || pass.sweep(max_age)).await {
                    Ok(report) => {
                        metrics.add_swept_files(report.removed);
                        if report.removed > 0 || report.failed > 0 {
                            info!(
                                scanned = report.scanned,
                                removed = report.removed,
                                failed = report.failed,
                                "scratch sweep finished"
                            );
                        }
                    }
                    Err(err) => warn!(error = %err, "scratch sweep task failed"),
                }
            }
        })
    }

    fn owns(&self, canonical: &Path) -> bool {
        self.sweep_roots
            .iter()
            .any(|root| canonical.starts_with(root) && canonical != root.as_path())
    }
}

fn probe_writable(root: &Path) -> ScratchResult<()> {
    let probe = root.join(format!("{PROBE_PREFIX}{}", Uuid::new_v4().simple()));
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
        .map_err(|err| ScratchError::io("probe_write", &probe, err))?;
    fs::remove_file(&probe).map_err(|err| ScratchError::io("probe_remove", &probe, err))
}

/// Canonicalise a root when possible; for roots that do not exist yet, resolve the
/// parent so later comparisons against canonical artifact paths still match.
fn resolve_root(root: &Path) -> PathBuf {
    if let Ok(canonical) = root.canonicalize() {
        return canonical;
    }
    match (root.parent(), root.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map_or_else(|_| root.to_path_buf(), |parent| parent.join(name)),
        _ => root.to_path_buf(),
    }
}

fn validate_extension(extension: &str) -> ScratchResult<()> {
    let invalid = |reason| ScratchError::InvalidInput {
        field: "extension",
        reason,
        value: Some(extension.to_string()),
    };
    if extension.is_empty() {
        return Err(invalid("empty"));
    }
    if extension.len() > MAX_EXTENSION_LEN {
        return Err(invalid("too_long"));
    }
    if !extension.bytes().all(|byte| byte.is_ascii_alphanumeric()) {
        return Err(invalid("not_alphanumeric"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn temp_dir() -> Result<TempDir> {
        Ok(tempfile::Builder::new().prefix("closet-scratch-").tempdir()?)
    }

    #[test]
    fn ensure_creates_nested_directory_and_is_idempotent() -> Result<()> {
        let temp = temp_dir()?;
        let target = temp.path().join("srv").join("uploads");

        let first = ScratchDir::ensure(&target)?;
        let second = ScratchDir::ensure(&target)?;

        assert!(first.root().is_absolute());
        assert!(first.is_available());
        assert_eq!(first.root(), second.root());
        assert_eq!(fs::read_dir(first.root())?.count(), 0, "probe must be removed");
        Ok(())
    }

    #[test]
    fn ensure_fails_when_root_is_a_file() -> Result<()> {
        let temp = temp_dir()?;
        let blocker = temp.path().join("uploads");
        fs::write(&blocker, b"not a directory")?;

        let err = ScratchDir::ensure(&blocker).expect_err("file root must be rejected");
        assert!(matches!(err, ScratchError::Io { .. }));
        Ok(())
    }

    #[test]
    fn allocate_path_rejects_unsafe_extensions() -> Result<()> {
        let temp = temp_dir()?;
        let scratch = ScratchDir::ensure(temp.path())?;

        for extension in ["", "../png", "p/ng", "averyverylongext"] {
            assert!(
                scratch.allocate_path(extension).is_err(),
                "extension {extension:?} must be rejected"
            );
        }
        let path = scratch.allocate_path("png")?;
        assert_eq!(path.parent(), Some(scratch.root()));
        assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("png"));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_persists_use_distinct_paths() -> Result<()> {
        let temp = temp_dir()?;
        let scratch = ScratchDir::ensure(temp.path())?;

        let mut handles = Vec::new();
        for index in 0..32_u8 {
            let scratch = scratch.clone();
            handles.push(tokio::spawn(async move {
                scratch
                    .persist_upload(&[index; 16], Some("../../etc/passwd"), "png")
                    .await
            }));
        }

        let mut paths = HashSet::new();
        for handle in handles {
            let upload = handle.await??;
            assert_eq!(upload.size, 16);
            assert!(upload.path.starts_with(scratch.root()));
            assert_eq!(upload.original_name.as_deref(), Some("../../etc/passwd"));
            paths.insert(upload.path);
        }
        assert_eq!(paths.len(), 32);
        Ok(())
    }

    #[tokio::test]
    async fn remove_artifacts_only_touches_owned_files() -> Result<()> {
        let temp = temp_dir()?;
        let uploads = temp.path().join("uploads");
        let outputs = temp.path().join("outputs");
        let elsewhere = temp_dir()?;
        let scratch = ScratchDir::ensure(&uploads)?.with_sweep_roots([outputs.clone()]);

        fs::create_dir_all(&outputs)?;
        let upload = scratch.persist_upload(b"raw", None, "jpg").await?;
        let stage_output = outputs.join("item_bg_removed.png");
        fs::write(&stage_output, b"png")?;
        let foreign = elsewhere.path().join("keep.png");
        fs::write(&foreign, b"keep")?;

        let removed = scratch
            .remove_artifacts(&[
                upload.path.clone(),
                stage_output.clone(),
                foreign.clone(),
                temp.path().join("uploads").join("missing.png"),
            ])
            .await;

        assert_eq!(removed, 2);
        assert!(!upload.path.exists());
        assert!(!stage_output.exists());
        assert!(foreign.exists());
        Ok(())
    }

    #[test]
    fn sweep_respects_age_threshold_and_missing_roots() -> Result<()> {
        let temp = temp_dir()?;
        let uploads = temp.path().join("uploads");
        let scratch = ScratchDir::ensure(&uploads)?
            .with_sweep_roots([temp.path().join("normalized")]);
        fs::write(uploads.join("a.png"), b"a")?;
        fs::create_dir_all(uploads.join("nested"))?;
        fs::write(uploads.join("nested").join("b.png"), b"b")?;

        let fresh = scratch.sweep(Duration::from_secs(3600));
        assert_eq!(fresh.scanned, 2);
        assert_eq!(fresh.removed, 0);

        let stale = scratch.sweep(Duration::ZERO);
        assert_eq!(stale.removed, 2);
        assert_eq!(stale.failed, 0);
        assert!(uploads.is_dir(), "sweep never removes the root itself");
        Ok(())
    }
}
