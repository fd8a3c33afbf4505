use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use zip::read::ZipArchive;

use crate::config::LauncherConfig;
use crate::transfer::{TransferEngine, TransferError, TransferProgress, TransferRequest, probe_host};
use crate::util::cancel_requested;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One install: where the archive comes from, where it stages, where it
/// lands, and how "already installed" is decided.
#[derive(Clone, Debug)]
pub struct InstallJob {
    pub source_url: String,
    pub staging_path: PathBuf,
    pub install_dir: PathBuf,
    /// `Some(rel)`: installed iff `install_dir/rel` exists (game archive).
    /// `None`: installed iff `install_dir` exists and is non-empty (data
    /// bundle).
    pub entry_point: Option<PathBuf>,
    pub expected_sha256: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractionProgress {
    pub extracted: u64,
    pub total: u64,
}

/// Progress notifications for a single install attempt. Delivered in
/// order; the pipeline's return value is the terminal outcome and nothing
/// is emitted after it.
#[derive(Clone, Debug)]
pub enum InstallEvent {
    AlreadyInstalled,
    Connecting,
    Download(TransferProgress),
    ExtractionStarted { total_entries: u64 },
    Extraction(ExtractionProgress),
    Normalizing,
}

#[derive(Debug, Error)]
pub enum InstallError {
    /// Surfaced as a quiet terminal state, never as an error dialog.
    #[error("install cancelled")]
    Cancelled,
    #[error("no internet connection")]
    NoConnectivity,
    #[error(transparent)]
    Transfer(TransferError),
    #[error("archive is corrupt: {0}")]
    ArchiveCorrupt(String),
    #[error("unexpected install error: {0}")]
    Unexpected(String),
}

impl InstallError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InstallError::Cancelled)
    }

    /// Stable kind string for the caller boundary; the frontend turns
    /// these into localized text.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            InstallError::Cancelled => "canceled",
            InstallError::NoConnectivity => "no_connectivity",
            InstallError::Transfer(_) => "download_failed",
            InstallError::ArchiveCorrupt(_) => "extract_failed",
            InstallError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<TransferError> for InstallError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Cancelled => InstallError::Cancelled,
            other => InstallError::Transfer(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyInstalled,
    Installed,
}

pub struct Installer {
    engine: TransferEngine,
    user_agent: String,
    request_timeout: Duration,
    connectivity_probe: (String, u16),
}

impl Installer {
    pub fn new(config: &LauncherConfig) -> Self {
        Self {
            engine: TransferEngine::new(),
            user_agent: config.user_agent.clone(),
            request_timeout: config.request_timeout,
            connectivity_probe: config.connectivity_probe.clone(),
        }
    }

    /// Download and extract `job`, idempotently. Either leaves
    /// `install_dir` fully normalized or rolls it back; the staging file
    /// is gone on every terminal path.
    pub async fn ensure_installed<F>(
        &self,
        job: &InstallJob,
        cancel: Option<Arc<AtomicBool>>,
        mut events: F,
    ) -> Result<InstallOutcome, InstallError>
    where
        F: FnMut(InstallEvent),
    {
        if already_installed(job) {
            info!("install: {} already present", job.install_dir.display());
            events(InstallEvent::AlreadyInstalled);
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        events(InstallEvent::Connecting);
        let (host, port) = &self.connectivity_probe;
        if !probe_host(host, *port, PROBE_TIMEOUT).await {
            warn!("install: connectivity probe to {host}:{port} failed");
            return Err(InstallError::NoConnectivity);
        }

        let mut request = TransferRequest::new(&job.source_url, &job.staging_path, &self.user_agent)
            .with_timeout(self.request_timeout);
        request.expected_sha256 = job.expected_sha256.clone();

        info!(
            "install: downloading {} to {}",
            job.source_url,
            job.staging_path.display()
        );
        // The transfer engine removes the staging file on its own failure
        // paths, including cancellation.
        self.engine
            .download(&request, cancel.clone(), |p| events(InstallEvent::Download(p)))
            .await?;

        let result = self.extract_and_normalize(job, &cancel, &mut events);
        // Staging is scratch space, never state.
        let _ = fs::remove_file(&job.staging_path);

        if let Err(err) = result {
            // A half-extracted directory must not be mistaken for an
            // install; a retry starts clean.
            warn!(
                "install: rolling back {} ({})",
                job.install_dir.display(),
                err
            );
            let _ = fs::remove_dir_all(&job.install_dir);
            return Err(err);
        }

        info!("install: {} ready", job.install_dir.display());
        Ok(InstallOutcome::Installed)
    }

    fn extract_and_normalize<F>(
        &self,
        job: &InstallJob,
        cancel: &Option<Arc<AtomicBool>>,
        events: &mut F,
    ) -> Result<(), InstallError>
    where
        F: FnMut(InstallEvent),
    {
        fs::create_dir_all(&job.install_dir)
            .map_err(|e| InstallError::Unexpected(format!("failed to create install dir: {e}")))?;

        let file = fs::File::open(&job.staging_path)
            .map_err(|e| InstallError::Unexpected(format!("failed to open archive: {e}")))?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| InstallError::ArchiveCorrupt(e.to_string()))?;
        let total = archive.len() as u64;
        events(InstallEvent::ExtractionStarted {
            total_entries: total,
        });

        for index in 0..archive.len() {
            if cancel_requested(cancel) {
                warn!("install: cancelled at entry {index} of {total}");
                return Err(InstallError::Cancelled);
            }
            let mut entry = archive
                .by_index(index)
                .map_err(|e| InstallError::ArchiveCorrupt(e.to_string()))?;
            // enclosed_name rejects paths that would escape the install dir.
            if let Some(rel) = entry.enclosed_name() {
                let out_path = job.install_dir.join(rel);
                if entry.is_dir() {
                    fs::create_dir_all(&out_path)
                        .map_err(|e| InstallError::Unexpected(format!("entry dir error: {e}")))?;
                } else {
                    if let Some(parent) = out_path.parent() {
                        fs::create_dir_all(parent).map_err(|e| {
                            InstallError::Unexpected(format!("parent dir error: {e}"))
                        })?;
                    }
                    let mut out_file = fs::File::create(&out_path).map_err(|e| {
                        InstallError::Unexpected(format!("entry create error: {e}"))
                    })?;
                    io::copy(&mut entry, &mut out_file)
                        .map_err(|e| InstallError::Unexpected(format!("entry write error: {e}")))?;
                }
            } else {
                warn!("install: skipping unsafe archive path {}", entry.name());
            }
            events(InstallEvent::Extraction(ExtractionProgress {
                extracted: index as u64 + 1,
                total,
            }));
        }

        events(InstallEvent::Normalizing);
        flatten_single_subdir(&job.install_dir).map_err(InstallError::Unexpected)?;
        Ok(())
    }
}

fn already_installed(job: &InstallJob) -> bool {
    match &job.entry_point {
        Some(rel) => job.install_dir.join(rel).exists(),
        None => fs::read_dir(&job.install_dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false),
    }
}

/// Archives commonly wrap everything in one top-level folder. If `dir`
/// holds exactly one child and it is a directory, re-parent its contents
/// into `dir` and drop the wrapper. Collisions overwrite the existing
/// destination entry.
fn flatten_single_subdir(dir: &Path) -> Result<(), String> {
    let mut entries = fs::read_dir(dir).map_err(|e| format!("read install dir error: {e}"))?;
    let first = match entries.next() {
        Some(Ok(entry)) => entry,
        _ => return Ok(()),
    };
    if entries.next().is_some() {
        return Ok(()); // already flat enough
    }
    if !first.file_type().map_err(|e| e.to_string())?.is_dir() {
        return Ok(());
    }

    // Park the wrapper under a scratch name so a child sharing its name
    // cannot collide with it mid-move.
    let subdir = dir.join(".unwrap-tmp");
    fs::rename(first.path(), &subdir).map_err(|e| format!("stage wrapper dir error: {e}"))?;
    debug!("install: flattening wrapper {}", first.path().display());

    for entry in fs::read_dir(&subdir).map_err(|e| format!("read wrapper dir error: {e}"))? {
        let entry = entry.map_err(|e| format!("wrapper entry error: {e}"))?;
        let from = entry.path();
        let to = dir.join(entry.file_name());
        if to.exists() {
            // Overwrite policy: the archive's copy wins.
            if to.is_dir() {
                fs::remove_dir_all(&to).map_err(|e| format!("replace dir error: {e}"))?;
            } else {
                fs::remove_file(&to).map_err(|e| format!("replace file error: {e}"))?;
            }
        }
        match fs::rename(&from, &to) {
            Ok(_) => {}
            Err(_) => {
                // Fallback to copy if rename crosses devices.
                match entry.file_type() {
                    Ok(ft) if ft.is_dir() => copy_dir(&from, &to)?,
                    _ => {
                        fs::copy(&from, &to).map_err(|e| format!("copy file error: {e}"))?;
                    }
                }
                let _ = fs::remove_file(&from);
            }
        }
    }

    let _ = fs::remove_dir_all(subdir);
    Ok(())
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), String> {
    fs::create_dir_all(to).map_err(|e| format!("copy dir create error: {e}"))?;
    for entry in fs::read_dir(from).map_err(|e| format!("copy dir read error: {e}"))? {
        let entry = entry.map_err(|e| format!("copy dir entry error: {e}"))?;
        let src_path = entry.path();
        let dst_path = to.join(entry.file_name());
        if entry
            .file_type()
            .map_err(|e| format!("copy filetype error: {e}"))?
            .is_dir()
        {
            copy_dir(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(|e| format!("copy file error: {e}"))?;
        }
    }
    Ok(())
}
