use std::env;
use std::path::PathBuf;

use directories_next::BaseDirs;
use tracing::debug;

pub const ENV_CONFIG: &str = "SHADECLOCK_CONFIG";

pub const APP_NAME: &str = "shadeclock";

/// `$XDG_CONFIG_HOME`, falling back to the platform config directory.
pub fn config_home() -> Option<PathBuf> {
    env_dir("XDG_CONFIG_HOME")
        .or_else(|| BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf()))
}

pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// `$XDG_STATE_HOME`, falling back to `~/.local/state`.
pub fn state_home() -> Option<PathBuf> {
    env_dir("XDG_STATE_HOME").or_else(|| home_dir().map(|home| home.join(".local").join("state")))
}

/// Candidate config files in lookup order. The environment override comes
/// first, then the compositor's config directory, then our own.
pub fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = env_dir(ENV_CONFIG) {
        candidates.push(path);
    }
    if let Some(home) = config_home() {
        candidates.push(home.join("hypr").join(format!("{APP_NAME}.toml")));
        candidates.push(home.join(APP_NAME).join("config.toml"));
    }
    candidates
}

/// The first candidate that is an existing file.
pub fn locate_config(candidates: &[PathBuf]) -> Option<PathBuf> {
    let found = candidates.iter().find(|path| path.is_file()).cloned();
    debug!(?candidates, ?found, "searched for config file");
    found
}

fn env_dir(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.to_string_lossy().trim().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
