use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::LauncherConfig;

const GAME_PATH_FILE: &str = "game_path.txt";
const WINEPREFIX_FILE: &str = "wineprefix_path.txt";
const LANGUAGE_FILE: &str = "multilang.txt";
const THEME_FILE: &str = "theme.txt";
const ADVANCED_CONFIG_FILE: &str = "advanced_config.json";

const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_THEME: &str = "yanix-default";
const DEFAULT_BLOG_LINK: &str = "https://yanix-launcher.blogspot.com";

/// Optional knobs stored as JSON at the app root. Missing or corrupt files
/// fall back to defaults rather than failing the launcher.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedConfig {
    pub blog_link: String,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            blog_link: DEFAULT_BLOG_LINK.into(),
        }
    }
}

/// User preferences: one small text file per setting under the data dir,
/// plus the advanced JSON config.
#[derive(Clone)]
pub struct StorageManager {
    base_dir: PathBuf,
    data_dir: PathBuf,
}

impl StorageManager {
    pub fn new(config: &LauncherConfig) -> Self {
        // Best-effort directory creation; failures are surfaced on write.
        if let Err(err) = config.ensure_base_dirs() {
            warn!("storage: unable to prepare base directories: {err}");
        }
        Self {
            base_dir: config.app_dir.clone(),
            data_dir: config.data_dir(),
        }
    }

    pub async fn game_path(&self) -> Option<PathBuf> {
        self.read_setting(GAME_PATH_FILE).await.map(PathBuf::from)
    }

    pub async fn set_game_path(&self, path: &Path) -> Result<(), String> {
        self.write_setting(GAME_PATH_FILE, &path.display().to_string())
            .await
    }

    pub async fn clear_game_path(&self) -> Result<(), String> {
        let path = self.data_dir.join(GAME_PATH_FILE);
        match fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(format!("unable to clear game path: {err}")),
        }
    }

    pub async fn wineprefix(&self) -> Option<String> {
        self.read_setting(WINEPREFIX_FILE).await
    }

    pub async fn set_wineprefix(&self, path: &Path) -> Result<(), String> {
        self.write_setting(WINEPREFIX_FILE, &path.display().to_string())
            .await
    }

    pub async fn language(&self) -> String {
        self.read_setting(LANGUAGE_FILE)
            .await
            .unwrap_or_else(|| DEFAULT_LANGUAGE.into())
    }

    pub async fn set_language(&self, code: &str) -> Result<(), String> {
        self.write_setting(LANGUAGE_FILE, code).await
    }

    pub async fn theme(&self) -> String {
        self.read_setting(THEME_FILE)
            .await
            .unwrap_or_else(|| DEFAULT_THEME.into())
    }

    pub async fn set_theme(&self, name: &str) -> Result<(), String> {
        self.write_setting(THEME_FILE, name).await
    }

    pub async fn advanced_config(&self) -> AdvancedConfig {
        let path = self.base_dir.join(ADVANCED_CONFIG_FILE);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!("storage: invalid {ADVANCED_CONFIG_FILE}, using defaults: {err}");
                AdvancedConfig::default()
            }),
            Err(_) => AdvancedConfig::default(),
        }
    }

    pub async fn save_advanced_config(&self, config: &AdvancedConfig) -> Result<(), String> {
        let path = self.base_dir.join(ADVANCED_CONFIG_FILE);
        let bytes = serde_json::to_vec_pretty(config)
            .map_err(|e| format!("unable to serialize advanced config: {e}"))?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| format!("unable to write advanced config: {e}"))
    }

    /// Remove the installed game. Also clears the saved game path when it
    /// pointed inside the install directory, so Play does not chase a
    /// dangling file.
    pub async fn delete_game(&self, config: &LauncherConfig) -> Result<(), String> {
        let game_dir = config.game_dir();
        if fs::metadata(&game_dir).await.is_err() {
            return Err("game not found at the installed path".into());
        }
        fs::remove_dir_all(&game_dir)
            .await
            .map_err(|e| format!("failed to delete game: {e}"))?;

        if let Some(saved) = self.game_path().await
            && saved.starts_with(&game_dir)
        {
            self.clear_game_path().await?;
        }
        Ok(())
    }

    async fn read_setting(&self, file: &str) -> Option<String> {
        let path = self.data_dir.join(file);
        fs::read(&path).await.ok().and_then(|bytes| {
            let value = String::from_utf8_lossy(&bytes).trim().to_owned();
            (!value.is_empty()).then_some(value)
        })
    }

    async fn write_setting(&self, file: &str, value: &str) -> Result<(), String> {
        let path = self.data_dir.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("unable to create settings dir: {e}"))?;
        }
        fs::write(&path, value.as_bytes())
            .await
            .map_err(|e| format!("unable to save setting {file}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_in(dir: &Path) -> StorageManager {
        let config = LauncherConfig::new(dir.to_path_buf());
        StorageManager::new(&config)
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(dir.path());

        assert!(storage.game_path().await.is_none());
        storage
            .set_game_path(Path::new("/games/sim/YandereSimulator.exe"))
            .await
            .unwrap();
        assert_eq!(
            storage.game_path().await,
            Some(PathBuf::from("/games/sim/YandereSimulator.exe"))
        );

        storage.set_language("pt").await.unwrap();
        assert_eq!(storage.language().await, "pt");

        storage.set_theme("dark").await.unwrap();
        assert_eq!(storage.theme().await, "dark");
    }

    #[tokio::test]
    async fn defaults_apply_when_settings_missing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(dir.path());
        assert_eq!(storage.language().await, "en");
        assert_eq!(storage.theme().await, "yanix-default");
        assert!(storage.wineprefix().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_advanced_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(dir.path());
        std::fs::write(dir.path().join("advanced_config.json"), b"{not json").unwrap();
        let advanced = storage.advanced_config().await;
        assert_eq!(advanced.blog_link, DEFAULT_BLOG_LINK);
    }

    #[tokio::test]
    async fn advanced_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage_in(dir.path());
        let custom = AdvancedConfig {
            blog_link: "https://example.com/blog".into(),
        };
        storage.save_advanced_config(&custom).await.unwrap();
        assert_eq!(
            storage.advanced_config().await.blog_link,
            "https://example.com/blog"
        );
    }

    #[tokio::test]
    async fn delete_game_clears_saved_path_inside_install_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = LauncherConfig::new(dir.path().to_path_buf());
        let storage = StorageManager::new(&config);

        let game_dir = config.game_dir();
        std::fs::create_dir_all(&game_dir).unwrap();
        let exe = game_dir.join("YandereSimulator.exe");
        std::fs::write(&exe, b"exe").unwrap();
        storage.set_game_path(&exe).await.unwrap();

        storage.delete_game(&config).await.unwrap();
        assert!(!game_dir.exists());
        assert!(storage.game_path().await.is_none());
    }

    #[tokio::test]
    async fn delete_game_keeps_unrelated_saved_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = LauncherConfig::new(dir.path().to_path_buf());
        let storage = StorageManager::new(&config);

        std::fs::create_dir_all(config.game_dir()).unwrap();
        storage
            .set_game_path(Path::new("/elsewhere/custom.exe"))
            .await
            .unwrap();

        storage.delete_game(&config).await.unwrap();
        assert_eq!(
            storage.game_path().await,
            Some(PathBuf::from("/elsewhere/custom.exe"))
        );
    }

    #[tokio::test]
    async fn delete_game_errors_when_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let config = LauncherConfig::new(dir.path().to_path_buf());
        let storage = StorageManager::new(&config);
        // ensure_base_dirs created data/, but not game/.
        assert!(storage.delete_game(&config).await.is_err());
    }
}
