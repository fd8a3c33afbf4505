use std::env::consts as os_consts;
use std::fmt::Write;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use log::{debug, info};
use reqwest::Url;
use serde::Serialize;
use sysinfo::System;
use walkdir::WalkDir;

use crate::config::LauncherConfig;
use crate::process::which;
use crate::storage::StorageManager;
use crate::transfer::probe_host;
use crate::util::format_bytes;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub platform: PlatformInfo,
    pub connectivity: ConnectivityInfo,
    pub game_status: GameStatusInfo,
    pub dependencies: DependenciesInfo,
    pub system: SystemInfo,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    pub launcher_version: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ConnectivityInfo {
    pub data_host: bool,
    pub game_host: bool,
    pub update_host: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct GameStatusInfo {
    pub installed: bool,
    pub install_size_bytes: u64,
    pub configured_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DependenciesInfo {
    pub wine_installed: bool,
    pub wine_path: Option<String>,
    pub winetricks_installed: bool,
    pub winetricks_path: Option<String>,
    pub wineprefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct SystemInfo {
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
}

pub struct Diagnostics<'a> {
    config: &'a LauncherConfig,
    storage: &'a StorageManager,
}

impl<'a> Diagnostics<'a> {
    pub fn new(config: &'a LauncherConfig, storage: &'a StorageManager) -> Self {
        Self { config, storage }
    }

    pub async fn run(&self) -> DiagnosticReport {
        DiagnosticReport {
            platform: self.platform_info(),
            connectivity: self.check_connectivity().await,
            game_status: self.check_game_status().await,
            dependencies: self.check_dependencies().await,
            system: memory_info(),
            timestamp: format_timestamp(SystemTime::now()),
        }
    }

    fn platform_info(&self) -> PlatformInfo {
        PlatformInfo {
            os: os_consts::OS.into(),
            arch: os_consts::ARCH.into(),
            launcher_version: env!("CARGO_PKG_VERSION").into(),
        }
    }

    async fn check_connectivity(&self) -> ConnectivityInfo {
        info!("diagnostics: checking connectivity");
        ConnectivityInfo {
            data_host: endpoint_reachable(&self.config.data_url).await,
            game_host: endpoint_reachable(&self.config.game_url).await,
            update_host: endpoint_reachable(&self.config.latest_version_url).await,
        }
    }

    async fn check_game_status(&self) -> GameStatusInfo {
        let game_dir = self.config.game_dir();
        let installed = self.config.game_exe_path().exists();
        let install_size_bytes = if game_dir.exists() {
            dir_size(&game_dir)
        } else {
            0
        };
        let configured_path = self
            .storage
            .game_path()
            .await
            .map(|p| p.display().to_string());
        debug!(
            "diagnostics: installed={installed} size={install_size_bytes} configured={configured_path:?}"
        );
        GameStatusInfo {
            installed,
            install_size_bytes,
            configured_path,
        }
    }

    async fn check_dependencies(&self) -> DependenciesInfo {
        let wine = which("wine");
        let winetricks = which("winetricks");
        DependenciesInfo {
            wine_installed: wine.is_some(),
            wine_path: wine.map(|p| p.display().to_string()),
            winetricks_installed: winetricks.is_some(),
            winetricks_path: winetricks.map(|p| p.display().to_string()),
            wineprefix: self.storage.wineprefix().await,
        }
    }
}

/// Write a rendered report into the logs directory with a timestamped
/// filename. `ext` matches the rendering (`txt` or `json`).
pub fn save_report(config: &LauncherConfig, rendered: &str, ext: &str) -> Result<PathBuf, String> {
    let logs = config.logs_dir();
    fs::create_dir_all(&logs).map_err(|e| format!("unable to create logs dir: {e}"))?;

    let filename = format!(
        "diagnostic_{}.{ext}",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );
    let path = logs.join(filename);
    fs::write(&path, rendered).map_err(|e| format!("failed to write report: {e}"))?;
    info!("diagnostics: report written to {}", path.display());
    Ok(path)
}

async fn endpoint_reachable(url: &str) -> bool {
    let Some((host, port)) = host_and_port(url) else {
        return false;
    };
    probe_host(&host, port, PROBE_TIMEOUT).await
}

fn host_and_port(url: &str) -> Option<(String, u16)> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_owned();
    let port = parsed.port_or_known_default()?;
    Some((host, port))
}

fn dir_size(dir: &std::path::Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

fn memory_info() -> SystemInfo {
    let mut system = System::new();
    system.refresh_memory();
    SystemInfo {
        total_memory_bytes: system.total_memory(),
        available_memory_bytes: system.available_memory(),
    }
}

fn format_timestamp(time: SystemTime) -> String {
    let dt: chrono::DateTime<chrono::Utc> = time.into();
    dt.to_rfc3339()
}

pub fn format_report(report: &DiagnosticReport) -> String {
    let mut output = String::new();

    let yes_no = |value| if value { "yes" } else { "no" };
    let status = |value| if value { "OK" } else { "FAILED" };
    let fallback = |value: &Option<String>, placeholder: &str| {
        value
            .as_deref()
            .map(str::to_owned)
            .unwrap_or_else(|| placeholder.to_owned())
    };

    let connectivity_ok = report.connectivity.data_host
        && report.connectivity.game_host
        && report.connectivity.update_host;

    let _ = writeln!(&mut output, "Yanix Launcher Diagnostic Report");
    let _ = writeln!(&mut output, "Generated: {}", report.timestamp);
    let _ = writeln!(
        &mut output,
        "Summary: connectivity={} | installed={} | wine={}",
        status(connectivity_ok),
        yes_no(report.game_status.installed),
        yes_no(report.dependencies.wine_installed),
    );

    let _ = writeln!(&mut output, "\n=== PLATFORM ===");
    let _ = writeln!(&mut output, "OS: {}", report.platform.os);
    let _ = writeln!(&mut output, "Arch: {}", report.platform.arch);
    let _ = writeln!(
        &mut output,
        "Launcher Version: {}",
        report.platform.launcher_version
    );

    let _ = writeln!(&mut output, "\n=== CONNECTIVITY ===");
    let _ = writeln!(
        &mut output,
        "Data Host: {}",
        status(report.connectivity.data_host)
    );
    let _ = writeln!(
        &mut output,
        "Game Host: {}",
        status(report.connectivity.game_host)
    );
    let _ = writeln!(
        &mut output,
        "Update Host: {}",
        status(report.connectivity.update_host)
    );

    let _ = writeln!(&mut output, "\n=== GAME STATUS ===");
    let _ = writeln!(
        &mut output,
        "Installed: {}",
        yes_no(report.game_status.installed)
    );
    let _ = writeln!(
        &mut output,
        "Install Size: {}",
        format_bytes(report.game_status.install_size_bytes)
    );
    let _ = writeln!(
        &mut output,
        "Configured Executable: {}",
        fallback(&report.game_status.configured_path, "-")
    );

    let _ = writeln!(&mut output, "\n=== DEPENDENCIES ===");
    let _ = writeln!(
        &mut output,
        "WINE Installed: {}",
        yes_no(report.dependencies.wine_installed)
    );
    let _ = writeln!(
        &mut output,
        "WINE Path: {}",
        fallback(&report.dependencies.wine_path, "-")
    );
    let _ = writeln!(
        &mut output,
        "Winetricks Installed: {}",
        yes_no(report.dependencies.winetricks_installed)
    );
    let _ = writeln!(
        &mut output,
        "Winetricks Path: {}",
        fallback(&report.dependencies.winetricks_path, "-")
    );
    let _ = writeln!(
        &mut output,
        "Wineprefix: {}",
        fallback(&report.dependencies.wineprefix, "default")
    );

    let _ = writeln!(&mut output, "\n=== SYSTEM ===");
    let _ = writeln!(
        &mut output,
        "Total Memory: {}",
        format_bytes(report.system.total_memory_bytes)
    );
    let _ = writeln!(
        &mut output,
        "Available Memory: {}",
        format_bytes(report.system.available_memory_bytes)
    );

    output
}
