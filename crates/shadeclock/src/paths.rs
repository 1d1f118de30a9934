use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use shadeconfig::config_home;

pub const ENV_SYSTEMD_DIR: &str = "SHADECLOCK_SYSTEMD_DIR";

/// Where user units are installed: `$SHADECLOCK_SYSTEMD_DIR`, else
/// `$XDG_CONFIG_HOME/systemd/user`.
pub fn systemd_user_dir() -> Result<PathBuf> {
    if let Some(value) = env_override(ENV_SYSTEMD_DIR) {
        return Ok(value);
    }
    config_home()
        .map(|home| home.join("systemd").join("user"))
        .ok_or_else(|| anyhow!("failed to determine the systemd user unit directory"))
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
