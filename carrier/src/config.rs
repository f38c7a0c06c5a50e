use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "CARRIER_CONFIG";

const DEFAULT_PATHS: [&str; 2] = ["./carrier.config.ron", "/etc/carrier/carrier.config.ron"];

/// Find the configuration file using the following precedence:
/// 1. `explicit` (from `--config` or `CARRIER_CONFIG`)
/// 2. ./carrier.config.ron (current working directory)
/// 3. /etc/carrier/carrier.config.ron (system-wide config)
///
/// # Errors
/// Returns an error if an explicit path does not exist, or if none of the
/// default locations hold a file.
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("Configuration file does not exist: {}", path.display());
    }

    find_in(DEFAULT_PATHS.iter().map(PathBuf::from))
}

fn find_in(candidates: impl IntoIterator<Item = PathBuf>) -> anyhow::Result<PathBuf> {
    let candidates: Vec<_> = candidates.into_iter().collect();

    if let Some(path) = candidates.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = candidates
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config / {CONFIG_ENV}\n{paths_tried}"
    )
}
