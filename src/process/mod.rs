use std::env as std_env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info, warn};

/// Spawns the game and helper tools through the WINE compatibility layer.
#[derive(Clone, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }

    /// Run `exe` through `wine`, with the working directory set to the
    /// executable's folder and `WINEPREFIX` applied when configured.
    pub fn launch(&self, exe: &Path, wineprefix: Option<&str>) -> Result<(), String> {
        if !exe.exists() {
            warn!("launch: executable missing at {}", exe.display());
            return Err(format!("game executable not found at {}", exe.display()));
        }
        let wine = which("wine").ok_or("WINE is not installed or not on PATH")?;

        let game_dir = exe.parent().unwrap_or_else(|| Path::new("."));
        info!("launch: starting {} via {}", exe.display(), wine.display());
        debug!(
            "launch: game_dir={} wineprefix={:?}",
            game_dir.display(),
            wineprefix
        );

        let mut cmd = Command::new(wine);
        cmd.arg(exe)
            .current_dir(game_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(prefix) = wineprefix {
            cmd.env("WINEPREFIX", prefix);
        }

        cmd.spawn()
            .map_err(|e| format!("failed to start game process: {e}"))?;
        info!("launch: process started");
        Ok(())
    }

    /// Open winetricks for prefix maintenance.
    pub fn winetricks(&self, wineprefix: Option<&str>) -> Result<(), String> {
        let winetricks = which("winetricks").ok_or("winetricks is not installed or not on PATH")?;
        let mut cmd = Command::new(winetricks);
        if let Some(prefix) = wineprefix {
            cmd.env("WINEPREFIX", prefix);
        }
        cmd.spawn()
            .map_err(|e| format!("failed to launch winetricks: {e}"))?;
        Ok(())
    }
}

/// Locate a binary on PATH.
#[must_use]
pub fn which(bin: &str) -> Option<PathBuf> {
    which_in(std_env::var_os("PATH")?.as_os_str(), bin)
}

fn which_in(path_var: &OsStr, bin: &str) -> Option<PathBuf> {
    std_env::split_paths(path_var)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn which_finds_binaries_on_a_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wine"), b"#!/bin/sh\n").unwrap();
        let path_var = std_env::join_paths([dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            which_in(&path_var, "wine"),
            Some(dir.path().join("wine"))
        );
        assert!(which_in(&path_var, "winetricks").is_none());
    }

    #[test]
    fn launch_rejects_missing_executable() {
        let launcher = ProcessLauncher::new();
        let err = launcher
            .launch(Path::new("/definitely/not/here.exe"), None)
            .unwrap_err();
        assert!(err.contains("not found"));
    }
}
