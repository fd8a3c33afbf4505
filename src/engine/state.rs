use crate::diagnostics::DiagnosticReport;
use crate::updater::UpdateStatus;

// The central source of truth for the frontend. One install attempt walks
// Idle -> CheckingInstall -> (Installed | Connecting -> Downloading ->
// Extracting -> Normalizing -> Installed), or ends in Cancelled / Error.
#[derive(Clone, Debug)]
pub enum AppState {
    Idle,
    CheckingInstall,
    Connecting,
    Downloading {
        bytes: u64,
        total: Option<u64>,
    },
    Extracting {
        extracted: u64,
        total: u64,
    },
    Normalizing,
    Installed,
    /// Quiet terminal state; the frontend must not show an error for it.
    Cancelled,
    Playing,
    Deleted,
    UpdateCheckReady {
        status: UpdateStatus,
    },
    DiagnosticsReady {
        report: DiagnosticReport,
    },
    Error {
        kind: &'static str,
        message: String,
    },
}

impl AppState {
    /// Terminal states are the last event of an attempt; no progress state
    /// follows them.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppState::Idle
                | AppState::Installed
                | AppState::Cancelled
                | AppState::Deleted
                | AppState::UpdateCheckReady { .. }
                | AppState::DiagnosticsReady { .. }
                | AppState::Error { .. }
        )
    }
}

// Actions triggered by the user from the frontend.
#[derive(Clone, Debug)]
pub enum UserAction {
    DownloadData,
    DownloadGame,
    Play,
    DeleteGame,
    CancelDownload,
    CheckForUpdates,
    RunDiagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_flagged() {
        assert!(AppState::Installed.is_terminal());
        assert!(AppState::Cancelled.is_terminal());
        assert!(
            AppState::Error {
                kind: "download_failed",
                message: "boom".into()
            }
            .is_terminal()
        );
        assert!(!AppState::Connecting.is_terminal());
        assert!(
            !AppState::Downloading {
                bytes: 0,
                total: None
            }
            .is_terminal()
        );
        assert!(!AppState::Playing.is_terminal());
    }
}
