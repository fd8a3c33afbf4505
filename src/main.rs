use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::sync::mpsc;

mod config;
mod diagnostics;
mod engine;
mod env;
mod install;
mod process;
mod storage;
mod transfer;
mod updater;
mod util;

use crate::config::LauncherConfig;
use crate::engine::LauncherEngine;
use crate::engine::state::{AppState, UserAction};
use crate::process::ProcessLauncher;
use crate::storage::StorageManager;
use crate::updater::UpdateStatus;
use crate::util::{format_bytes, format_speed};

const SUPPORT_URL: &str = "https://gitea.com/nikoyandere/yanix-launcher/issues";
const DISCORD_URL: &str = "https://discord.gg/7JC4FGn69U";

#[derive(Parser, Debug)]
#[command(
    name = "yanix-launcher",
    author,
    version,
    about = "Launcher for Yandere Simulator on Linux: downloads, WINE launching and diagnostics"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Fetch the data bundle if needed, then start the game through WINE.
    Play,
    /// Download and install the latest game build.
    Download,
    /// Download the launcher data bundle (themes, translations).
    Data,
    /// Delete the installed game.
    Delete,
    /// Check whether a newer launcher version has been published.
    CheckUpdates,
    /// Collect a diagnostic report.
    Doctor {
        /// Also write the report into the logs directory.
        #[arg(long)]
        save: bool,
        /// Emit the report as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Remember a custom game executable for `play`.
    SetGamePath { path: PathBuf },
    /// Remember a WINEPREFIX directory for game launches.
    SetWineprefix { path: PathBuf },
    /// Set the interface language code.
    SetLanguage { code: String },
    /// Set the theme name.
    SetTheme { name: String },
    /// Set the blog feed opened by `open blog`.
    SetBlogLink { url: String },
    /// Run winetricks against the configured prefix.
    Winetricks,
    /// Open a community page in the browser.
    Open {
        #[arg(value_enum)]
        target: OpenTarget,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OpenTarget {
    Blog,
    Support,
    Discord,
}

#[derive(Clone, Copy, Default)]
struct DoctorOptions {
    save: bool,
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = LauncherConfig::default();
    let storage = StorageManager::new(&config);

    match cli.command {
        CliCommand::Play => {
            run_engine_action(config, storage, UserAction::Play, DoctorOptions::default()).await
        }
        CliCommand::Download => {
            run_engine_action(
                config,
                storage,
                UserAction::DownloadGame,
                DoctorOptions::default(),
            )
            .await
        }
        CliCommand::Data => {
            run_engine_action(
                config,
                storage,
                UserAction::DownloadData,
                DoctorOptions::default(),
            )
            .await
        }
        CliCommand::Delete => {
            run_engine_action(
                config,
                storage,
                UserAction::DeleteGame,
                DoctorOptions::default(),
            )
            .await
        }
        CliCommand::CheckUpdates => {
            run_engine_action(
                config,
                storage,
                UserAction::CheckForUpdates,
                DoctorOptions::default(),
            )
            .await
        }
        CliCommand::Doctor { save, json } => {
            run_engine_action(
                config,
                storage,
                UserAction::RunDiagnostics,
                DoctorOptions { save, json },
            )
            .await
        }
        CliCommand::SetGamePath { path } => finish(
            storage
                .set_game_path(&path)
                .await
                .map(|_| format!("game path saved: {}", path.display())),
        ),
        CliCommand::SetWineprefix { path } => finish(
            storage
                .set_wineprefix(&path)
                .await
                .map(|_| format!("wineprefix saved: {}", path.display())),
        ),
        CliCommand::SetLanguage { code } => finish(
            storage
                .set_language(&code)
                .await
                .map(|_| format!("language set to {code}")),
        ),
        CliCommand::SetTheme { name } => finish(
            storage
                .set_theme(&name)
                .await
                .map(|_| format!("theme set to {name}")),
        ),
        CliCommand::SetBlogLink { url } => {
            let mut advanced = storage.advanced_config().await;
            advanced.blog_link = url.clone();
            finish(
                storage
                    .save_advanced_config(&advanced)
                    .await
                    .map(|_| format!("blog link saved: {url}")),
            )
        }
        CliCommand::Winetricks => {
            let wineprefix = storage.wineprefix().await;
            finish(
                ProcessLauncher::new()
                    .winetricks(wineprefix.as_deref())
                    .map(|_| "winetricks started".to_owned()),
            )
        }
        CliCommand::Open { target } => {
            let url = match target {
                OpenTarget::Blog => storage.advanced_config().await.blog_link,
                OpenTarget::Support => SUPPORT_URL.to_owned(),
                OpenTarget::Discord => DISCORD_URL.to_owned(),
            };
            finish(
                open::that(&url)
                    .map(|_| format!("opened {url}"))
                    .map_err(|e| format!("unable to open {url}: {e}")),
            )
        }
    }
}

/// Drive one engine action on the worker side and render its `AppState`
/// stream on this side. Ctrl-C raises the shared cancel flag; the engine
/// winds down cooperatively and reports `Cancelled`.
async fn run_engine_action(
    config: LauncherConfig,
    storage: StorageManager,
    action: UserAction,
    doctor: DoctorOptions,
) -> ExitCode {
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let report_config = config.clone();
    let engine = Arc::new(Mutex::new(LauncherEngine::new(
        config,
        storage,
        ProcessLauncher::new(),
        cancel_flag.clone(),
    )));

    {
        let cancel_flag = cancel_flag.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("cancellation requested");
                cancel_flag.store(true, Ordering::SeqCst);
            }
        });
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.lock().await.handle_action(action, &tx).await;
        })
    };

    let exit = render_updates(&mut rx, &report_config, doctor).await;
    let _ = worker.await;
    debug!("final engine state: {:?}", engine.lock().await.state);
    exit
}

async fn render_updates(
    rx: &mut mpsc::UnboundedReceiver<AppState>,
    config: &LauncherConfig,
    doctor: DoctorOptions,
) -> ExitCode {
    let mut download_bar: Option<ProgressBar> = None;
    let mut extract_bar: Option<ProgressBar> = None;
    let mut download_started = Instant::now();
    let mut exit = ExitCode::SUCCESS;

    while let Some(state) = rx.recv().await {
        match state {
            AppState::Idle => {}
            AppState::CheckingInstall => println!("Checking the current install..."),
            AppState::Connecting => println!("Connecting..."),
            AppState::Downloading { bytes, total } => {
                let bar = download_bar.get_or_insert_with(|| {
                    download_started = Instant::now();
                    match total {
                        Some(len) => byte_bar(len),
                        None => byte_spinner(),
                    }
                });
                bar.set_position(bytes);
                if total.is_none() {
                    let elapsed = download_started.elapsed().as_secs_f32().max(0.001);
                    bar.set_message(format!(
                        "{} ({})",
                        format_bytes(bytes),
                        format_speed(bytes as f32 / elapsed)
                    ));
                }
            }
            AppState::Extracting { extracted, total } => {
                if let Some(bar) = download_bar.take() {
                    bar.finish_with_message("download complete");
                }
                let bar = extract_bar.get_or_insert_with(|| entry_bar(total));
                bar.set_position(extracted);
            }
            AppState::Normalizing => {
                if let Some(bar) = extract_bar.take() {
                    bar.finish_with_message("extraction complete");
                }
                println!("Normalizing install layout...");
            }
            AppState::Installed => {
                clear_bars(&mut download_bar, &mut extract_bar);
                println!("Install up to date.");
            }
            AppState::Cancelled => {
                clear_bars(&mut download_bar, &mut extract_bar);
                println!("Canceled.");
            }
            AppState::Playing => println!("Starting the game..."),
            AppState::Deleted => println!("Game deleted."),
            AppState::UpdateCheckReady { status } => match status {
                UpdateStatus::UpToDate => println!("Launcher is up to date."),
                UpdateStatus::UpdateAvailable { latest_version } => println!(
                    "Update available: {latest_version} (running {})",
                    env!("CARGO_PKG_VERSION")
                ),
                UpdateStatus::DeveloperBuild => {
                    println!("Running a build newer than the published release.")
                }
            },
            AppState::DiagnosticsReady { report } => {
                let (rendered, ext) = if doctor.json {
                    match serde_json::to_string_pretty(&report) {
                        Ok(text) => (text + "\n", "json"),
                        Err(err) => {
                            eprintln!("error: unable to encode report: {err}");
                            exit = ExitCode::FAILURE;
                            continue;
                        }
                    }
                } else {
                    (diagnostics::format_report(&report), "txt")
                };
                print!("{rendered}");
                if doctor.save {
                    match diagnostics::save_report(config, &rendered, ext) {
                        Ok(path) => println!("Report saved to {}", path.display()),
                        Err(err) => {
                            eprintln!("error: {err}");
                            exit = ExitCode::FAILURE;
                        }
                    }
                }
            }
            AppState::Error { kind, message } => {
                clear_bars(&mut download_bar, &mut extract_bar);
                eprintln!("error ({kind}): {message}");
                exit = ExitCode::FAILURE;
            }
        }
    }
    exit
}

fn clear_bars(download_bar: &mut Option<ProgressBar>, extract_bar: &mut Option<ProgressBar>) {
    if let Some(bar) = download_bar.take() {
        bar.finish_and_clear();
    }
    if let Some(bar) = extract_bar.take() {
        bar.finish_and_clear();
    }
}

fn byte_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template(
            "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn byte_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} downloading {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn entry_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.green/white} {pos}/{len} files {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn finish(result: Result<String, String>) -> ExitCode {
    match result {
        Ok(message) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
