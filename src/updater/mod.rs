use std::time::Duration;

use log::{debug, warn};

use crate::config::LauncherConfig;

/// Outcome of comparing the running launcher against the published source.
/// Applying an update is the user's job; the launcher only reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate,
    UpdateAvailable { latest_version: String },
    /// Running a version newer than anything published.
    DeveloperBuild,
}

/// Fetch the published launcher source and compare its version constant
/// against `current_version`.
///
/// # Errors
/// Returns an error string when the fetch fails or the published source
/// carries no recognizable version.
pub async fn check_for_updates(
    config: &LauncherConfig,
    current_version: &str,
) -> Result<UpdateStatus, String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))?;

    let response = client
        .get(&config.latest_version_url)
        .header(reqwest::header::USER_AGENT, &config.user_agent)
        .send()
        .await
        .map_err(|e| format!("failed to check for updates: {e}"))?
        .error_for_status()
        .map_err(|e| format!("update source unavailable: {e}"))?;

    let content = response
        .text()
        .await
        .map_err(|e| format!("failed to read update source: {e}"))?;

    let latest =
        parse_remote_version(&content).ok_or("published source carries no version constant")?;
    debug!("updater: latest={latest} current={current_version}");

    Ok(match compare_versions(&latest, current_version) {
        VersionComparison::Greater => UpdateStatus::UpdateAvailable {
            latest_version: latest,
        },
        VersionComparison::Equal => UpdateStatus::UpToDate,
        VersionComparison::Less => UpdateStatus::DeveloperBuild,
    })
}

/// The published source declares its version inside a `USER_AGENT`
/// constant shaped like `YanixLauncher/1.0.2`; take the part after the
/// final slash.
fn parse_remote_version(content: &str) -> Option<String> {
    for line in content.lines() {
        if !line.contains("USER_AGENT") {
            continue;
        }
        let candidate = line
            .split('/')
            .next_back()?
            .trim()
            .trim_matches(|c| c == '\'' || c == '"' || c == ')' || c == ';')
            .to_owned();
        if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Some(candidate);
        }
        warn!("updater: unparseable USER_AGENT line: {line}");
    }
    None
}

#[derive(Debug, PartialEq, Eq)]
enum VersionComparison {
    Greater,
    Equal,
    Less,
}

/// Compare two dotted versions. Returns Greater if `a` > `b`.
fn compare_versions(a: &str, b: &str) -> VersionComparison {
    let parts_a = parse_version_parts(a);
    let parts_b = parse_version_parts(b);

    let max_len = parts_a.len().max(parts_b.len());
    for i in 0..max_len {
        let a_part = parts_a.get(i).copied().unwrap_or(0);
        let b_part = parts_b.get(i).copied().unwrap_or(0);
        if a_part > b_part {
            return VersionComparison::Greater;
        } else if a_part < b_part {
            return VersionComparison::Less;
        }
    }
    VersionComparison::Equal
}

fn parse_version_parts(version: &str) -> Vec<u32> {
    version
        .split('.')
        .filter_map(|part| part.parse::<u32>().ok())
        .collect()
}
