use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use tracing::debug;

/// Value the compositor uses for "no screen shader".
pub const EMPTY_SHADER: &str = "[[EMPTY]]";
pub const SCREEN_SHADER_OPTION: &str = "decoration:screen_shader";
pub const ENV_HYPRCTL: &str = "SHADECLOCK_HYPRCTL";

/// Reads and writes the active screen shader.
pub trait DisplayControl {
    fn set(&self, path: &Path) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn current(&self) -> Result<Option<PathBuf>>;
}

#[derive(Debug, Clone)]
pub struct Hyprctl {
    program: PathBuf,
}

impl Hyprctl {
    /// `hyprctl` from `PATH`, or the program named by `$SHADECLOCK_HYPRCTL`.
    pub fn from_env() -> Self {
        let program = env::var_os(ENV_HYPRCTL)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("hyprctl"));
        Self { program }
    }

    fn keyword(&self, value: &OsStr) -> Result<()> {
        self.run(&[
            OsStr::new("keyword"),
            OsStr::new(SCREEN_SHADER_OPTION),
            value,
        ])?;
        Ok(())
    }

    fn run(&self, args: &[&OsStr]) -> Result<Output> {
        debug!(program = %self.program.display(), ?args, "invoking compositor");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("failed to run {}", self.program.display()))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }
}

impl DisplayControl for Hyprctl {
    fn set(&self, path: &Path) -> Result<()> {
        self.keyword(path.as_os_str())
    }

    fn clear(&self) -> Result<()> {
        self.keyword(OsStr::new(EMPTY_SHADER))
    }

    fn current(&self) -> Result<Option<PathBuf>> {
        let output = self.run(&[
            OsStr::new("-j"),
            OsStr::new("getoption"),
            OsStr::new(SCREEN_SHADER_OPTION),
        ])?;
        parse_current(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_current(stdout: &str) -> Result<Option<PathBuf>> {
    let json: Value = serde_json::from_str(stdout)
        .with_context(|| format!("hyprctl returned invalid JSON:\n{stdout}"))?;
    let shader = json
        .get("str")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("hyprctl output has no string `str` field:\n{stdout}"))?
        .trim();
    if shader == EMPTY_SHADER || shader.is_empty() {
        return Ok(None);
    }
    Ok(Some(PathBuf::from(shader)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_active_shader() {
        let stdout = r#"{"option": "decoration:screen_shader", "str": "/tmp/warm.glsl ", "set": true}"#;
        assert_eq!(
            parse_current(stdout).unwrap(),
            Some(PathBuf::from("/tmp/warm.glsl"))
        );
    }

    #[test]
    fn empty_sentinel_means_none() {
        let stdout = r#"{"option": "decoration:screen_shader", "str": "[[EMPTY]]", "set": false}"#;
        assert_eq!(parse_current(stdout).unwrap(), None);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let err = parse_current("no such option").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
        assert!(parse_current(r#"{"int": 1}"#).is_err());
    }
}
