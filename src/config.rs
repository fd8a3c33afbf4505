use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::env;

pub const USER_AGENT: &str = concat!("YanixLauncher/", env!("CARGO_PKG_VERSION"));

const DATA_DOWNLOAD_URL: &str = "https://nikoyandere.github.io/data.zip";
const GAME_DOWNLOAD_URL: &str = "https://yanderesimulator.com/dl/latest.zip";
const LATEST_VERSION_URL: &str =
    "https://gitea.com/YanixLauncher/Yanix-Launcher-Gitea/raw/branch/main/yanix-launcher.py";
const CONNECTIVITY_HOST: &str = "nikoyandere.github.io";
const GAME_EXE_NAME: &str = "YandereSimulator.exe";

/// All paths, URLs and policies the launcher operates on. Constructed once
/// in `main` and passed down; nothing below this reads ambient globals.
#[derive(Clone, Debug)]
pub struct LauncherConfig {
    pub app_dir: PathBuf,
    pub data_url: String,
    pub game_url: String,
    pub latest_version_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub connectivity_probe: (String, u16),
    pub game_exe_name: String,
}

impl LauncherConfig {
    pub fn new(app_dir: PathBuf) -> Self {
        Self {
            app_dir,
            data_url: DATA_DOWNLOAD_URL.into(),
            game_url: GAME_DOWNLOAD_URL.into(),
            latest_version_url: LATEST_VERSION_URL.into(),
            user_agent: USER_AGENT.into(),
            request_timeout: Duration::from_secs(30),
            connectivity_probe: (CONNECTIVITY_HOST.into(), 80),
            game_exe_name: GAME_EXE_NAME.into(),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.app_dir.join("data")
    }

    pub fn game_dir(&self) -> PathBuf {
        self.app_dir.join("game")
    }

    pub fn themes_dir(&self) -> PathBuf {
        self.app_dir.join("themes")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.app_dir.join("logs")
    }

    /// Scratch file for the data bundle download. Deleted on every exit path.
    pub fn data_staging_path(&self) -> PathBuf {
        self.app_dir.join("data.zip")
    }

    /// Scratch file for the game archive download. Deleted on every exit path.
    pub fn game_staging_path(&self) -> PathBuf {
        self.app_dir.join("yansim.zip")
    }

    pub fn game_exe_path(&self) -> PathBuf {
        self.game_dir().join(&self.game_exe_name)
    }

    /// Create the on-disk folder layout expected by the launcher.
    pub fn ensure_base_dirs(&self) -> std::io::Result<()> {
        let folders = [
            self.app_dir.clone(),
            self.data_dir(),
            self.themes_dir(),
            self.logs_dir(),
        ];
        for dir in folders {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self::new(env::default_app_dir())
    }
}
