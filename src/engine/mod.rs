use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::config::LauncherConfig;
use crate::diagnostics;
use crate::engine::state::{AppState, UserAction};
use crate::install::{InstallError, InstallEvent, InstallJob, Installer};
use crate::process::ProcessLauncher;
use crate::storage::StorageManager;
use crate::updater;

pub mod state;

/// Orchestrates the launcher's long-running work on the worker runtime and
/// publishes `AppState` snapshots over the updates channel. One engine
/// instance lives behind an async mutex, so actions are serialized and at
/// most one install touches the staging and install paths at a time.
pub struct LauncherEngine {
    pub state: AppState,
    config: LauncherConfig,
    installer: Installer,
    storage: StorageManager,
    process: ProcessLauncher,
    cancel_flag: Arc<AtomicBool>,
}

impl LauncherEngine {
    pub fn new(
        config: LauncherConfig,
        storage: StorageManager,
        process: ProcessLauncher,
        cancel_flag: Arc<AtomicBool>,
    ) -> Self {
        let installer = Installer::new(&config);
        Self {
            state: AppState::Idle,
            config,
            installer,
            storage,
            process,
            cancel_flag,
        }
    }

    pub async fn handle_action(
        &mut self,
        action: UserAction,
        updates: &mpsc::UnboundedSender<AppState>,
    ) {
        match action {
            UserAction::DownloadData => {
                info!("action: DownloadData");
                self.run_install(self.data_job(), updates).await;
            }
            UserAction::DownloadGame => {
                info!("action: DownloadGame");
                self.run_install(self.game_job(), updates).await;
            }
            UserAction::Play => {
                info!("action: Play");
                self.play(updates).await;
            }
            UserAction::DeleteGame => {
                info!("action: DeleteGame");
                match self.storage.delete_game(&self.config).await {
                    Ok(_) => {
                        self.publish(AppState::Deleted, updates);
                        info!("game deleted");
                    }
                    Err(err) => {
                        error!("delete failed: {err}");
                        self.publish(
                            AppState::Error {
                                kind: "unexpected",
                                message: err,
                            },
                            updates,
                        );
                    }
                }
            }
            UserAction::CancelDownload => {
                self.cancel_flag.store(true, Ordering::SeqCst);
                warn!("action: CancelDownload");
            }
            UserAction::CheckForUpdates => {
                info!("action: CheckForUpdates");
                match updater::check_for_updates(&self.config, env!("CARGO_PKG_VERSION")).await {
                    Ok(status) => self.publish(AppState::UpdateCheckReady { status }, updates),
                    Err(err) => {
                        error!("update check failed: {err}");
                        self.publish(
                            AppState::Error {
                                kind: "unexpected",
                                message: err,
                            },
                            updates,
                        );
                    }
                }
            }
            UserAction::RunDiagnostics => {
                info!("action: RunDiagnostics");
                let report = diagnostics::Diagnostics::new(&self.config, &self.storage)
                    .run()
                    .await;
                self.publish(AppState::DiagnosticsReady { report }, updates);
            }
        }
    }

    fn data_job(&self) -> InstallJob {
        InstallJob {
            source_url: self.config.data_url.clone(),
            staging_path: self.config.data_staging_path(),
            install_dir: self.config.data_dir(),
            entry_point: None,
            expected_sha256: None,
        }
    }

    fn game_job(&self) -> InstallJob {
        InstallJob {
            source_url: self.config.game_url.clone(),
            staging_path: self.config.game_staging_path(),
            install_dir: self.config.game_dir(),
            entry_point: Some(PathBuf::from(&self.config.game_exe_name)),
            expected_sha256: None,
        }
    }

    async fn run_install(&mut self, job: InstallJob, updates: &mpsc::UnboundedSender<AppState>) {
        self.reset_cancel_flag();
        self.publish(AppState::CheckingInstall, updates);

        let result = self
            .installer
            .ensure_installed(&job, Some(self.cancel_flag.clone()), |event| {
                if let Some(state) = state_for(event) {
                    let _ = updates.send(state);
                }
            })
            .await;

        let terminal = match result {
            Ok(_) => AppState::Installed,
            Err(err) if err.is_cancelled() => AppState::Cancelled,
            Err(err) => {
                error!("install failed ({}): {err}", err.kind());
                AppState::Error {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            }
        };
        self.publish(terminal, updates);
    }

    async fn play(&mut self, updates: &mpsc::UnboundedSender<AppState>) {
        // First run: the data bundle carries the launcher's own assets.
        self.reset_cancel_flag();
        self.publish(AppState::CheckingInstall, updates);
        let bootstrap = self
            .installer
            .ensure_installed(&self.data_job(), Some(self.cancel_flag.clone()), |event| {
                if let Some(state) = state_for(event) {
                    let _ = updates.send(state);
                }
            })
            .await;
        match bootstrap {
            Ok(_) => {}
            Err(InstallError::Cancelled) => {
                self.publish(AppState::Cancelled, updates);
                return;
            }
            Err(err) => {
                error!("data bootstrap failed ({}): {err}", err.kind());
                self.publish(
                    AppState::Error {
                        kind: err.kind(),
                        message: err.to_string(),
                    },
                    updates,
                );
                return;
            }
        }

        let exe = match self.resolve_game_exe().await {
            Ok(path) => path,
            Err(message) => {
                warn!("play: {message}");
                self.publish(
                    AppState::Error {
                        kind: "unexpected",
                        message,
                    },
                    updates,
                );
                return;
            }
        };

        self.publish(AppState::Playing, updates);
        let wineprefix = self.storage.wineprefix().await;
        match self.process.launch(&exe, wineprefix.as_deref()) {
            Ok(_) => {
                info!("game launched");
                self.publish(AppState::Idle, updates);
            }
            Err(err) => {
                error!("launch failed: {err}");
                self.publish(
                    AppState::Error {
                        kind: "unexpected",
                        message: err,
                    },
                    updates,
                );
            }
        }
    }

    /// Prefer the user-selected executable; fall back to the default
    /// install location.
    async fn resolve_game_exe(&self) -> Result<PathBuf, String> {
        if let Some(configured) = self.storage.game_path().await {
            if configured.exists() {
                return Ok(configured);
            }
            return Err(format!(
                "the saved game path {} no longer exists; select the executable again",
                configured.display()
            ));
        }
        let installed = self.config.game_exe_path();
        if installed.exists() {
            return Ok(installed);
        }
        Err("no game executable configured or installed; download the game or select an .exe".into())
    }

    fn publish(&mut self, state: AppState, updates: &mpsc::UnboundedSender<AppState>) {
        self.state = state.clone();
        let _ = updates.send(state);
    }

    fn reset_cancel_flag(&self) {
        self.cancel_flag.store(false, Ordering::SeqCst);
        debug!("cancel flag reset");
    }
}

fn state_for(event: InstallEvent) -> Option<AppState> {
    match event {
        // The terminal Installed state is published once the pipeline
        // returns.
        InstallEvent::AlreadyInstalled => None,
        InstallEvent::Connecting => Some(AppState::Connecting),
        InstallEvent::Download(p) => Some(AppState::Downloading {
            bytes: p.bytes,
            total: p.total,
        }),
        InstallEvent::ExtractionStarted { total_entries } => Some(AppState::Extracting {
            extracted: 0,
            total: total_entries,
        }),
        InstallEvent::Extraction(p) => Some(AppState::Extracting {
            extracted: p.extracted,
            total: p.total,
        }),
        InstallEvent::Normalizing => Some(AppState::Normalizing),
    }
}
