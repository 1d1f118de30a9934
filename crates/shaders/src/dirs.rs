//! Decides where shader files are looked up and how the environment override
//! is expanded, so name resolution and listing agree on the search order.
//!
//! Types:
//!
//! - `ShaderDirs` holds the ordered candidate directories. Earlier entries win
//!   when the same shader name exists in several of them.
//!
//! Functions:
//!
//! - `ShaderDirs::discover` builds the standard order: environment override,
//!   compositor config dir, our own config dir, then the system install dir.
//! - `ShaderDirs::files` walks the existing directories (shallow files first)
//!   and is the single traversal used by resolution and `ls`.
//! - Internal helpers `expand_home`, `expand_env_vars`, and `is_env_name_char`
//!   implement `$VAR`/`~` expansion for the override.
use std::env;
use std::path::{Path, PathBuf};

use shadeconfig::{config_home, home_dir, APP_NAME};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::ShaderError;

pub const ENV_SHADERS_DIR: &str = "SHADECLOCK_SHADERS_DIR";
pub const SYSTEM_DIR: &str = "/usr/share/shadeclock/shaders";

/// Files nested deeper than this below a search directory are ignored.
pub const MAX_SCAN_DEPTH: usize = 6;

#[derive(Debug, Clone, Default)]
pub struct ShaderDirs {
    candidates: Vec<PathBuf>,
}

impl ShaderDirs {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    pub fn discover() -> Self {
        let mut candidates = Vec::new();
        if let Some(raw) = env::var_os(ENV_SHADERS_DIR) {
            let raw = raw.to_string_lossy();
            match expand_path(&raw) {
                Ok(path) => candidates.push(path),
                Err(err) => {
                    warn!(variable = ENV_SHADERS_DIR, error = %err, "ignoring shader dir override");
                }
            }
        }
        if let Some(home) = config_home() {
            candidates.push(home.join("hypr").join("shaders"));
            candidates.push(home.join(APP_NAME).join("shaders"));
        }
        candidates.push(PathBuf::from(SYSTEM_DIR));
        debug!(?candidates, "resolved shader search directories");
        Self { candidates }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Candidates that currently exist, in priority order.
    pub fn existing(&self) -> Vec<PathBuf> {
        self.candidates
            .iter()
            .filter(|dir| dir.is_dir())
            .cloned()
            .collect()
    }

    /// Every file below the existing directories in priority order. Within a
    /// directory, shallower files come before nested ones, then by file name.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for dir in self.existing() {
            let mut found: Vec<(usize, PathBuf)> = WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(MAX_SCAN_DEPTH)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warn!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                        None
                    }
                })
                .filter(|entry| !entry.file_type().is_dir())
                .map(|entry| (entry.depth(), entry.into_path()))
                .collect();
            found.sort_by_key(|(depth, _)| *depth);
            files.extend(found.into_iter().map(|(_, path)| path));
        }
        files
    }

    /// All shader files sorted by file name, as shown by listings.
    pub fn listing(&self) -> Vec<PathBuf> {
        let mut files = self.files();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        files
    }
}

pub fn expand_path(input: &str) -> Result<PathBuf, ShaderError> {
    let expanded_env = expand_env_vars(input)?;
    let expanded = expand_home(&expanded_env)?;
    let path = PathBuf::from(expanded);
    debug!(original = %input, expanded = %path.display(), "expanded shader path");
    Ok(path)
}

/// Strips every extension: `foo.glsl.mustache` becomes `foo`.
pub fn stripped_name(path: &Path) -> String {
    let mut name = PathBuf::from(path.file_name().unwrap_or_default());
    while name.extension().is_some() {
        match name.file_stem() {
            Some(stem) => name = PathBuf::from(stem),
            None => break,
        }
    }
    name.to_string_lossy().into_owned()
}

fn expand_home(input: &str) -> Result<String, ShaderError> {
    if !input.starts_with('~') {
        return Ok(input.to_string());
    }

    let home_dir = home_dir().ok_or_else(|| {
        ShaderError::Expand("unable to determine home directory for '~' expansion".into())
    })?;

    if input == "~" {
        return Ok(home_dir.to_string_lossy().into_owned());
    }

    if let Some(rest) = input.strip_prefix("~/") {
        let mut path = home_dir;
        path.push(rest);
        return Ok(path.to_string_lossy().into_owned());
    }

    Err(ShaderError::Expand(format!(
        "user-specific home expansion ('{input}') is not supported"
    )))
}

fn expand_env_vars(input: &str) -> Result<String, ShaderError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            output.push(ch);
            continue;
        }

        match chars.peek() {
            None => {
                output.push('$');
                break;
            }
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }

                if !closed {
                    return Err(ShaderError::Expand(
                        "missing closing '}' in environment variable reference".into(),
                    ));
                }
                output.push_str(&lookup_env(&name)?);
            }
            Some(&c) if is_env_name_char(c) => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if is_env_name_char(c) {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                output.push_str(&lookup_env(&name)?);
            }
            _ => {
                output.push('$');
            }
        }
    }

    Ok(output)
}

fn lookup_env(name: &str) -> Result<String, ShaderError> {
    if name.is_empty() {
        return Err(ShaderError::Expand(
            "environment variable name must not be empty".into(),
        ));
    }
    env::var(name)
        .map_err(|_| ShaderError::Expand(format!("environment variable '{name}' is not set")))
}

fn is_env_name_char(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphanumeric()
}
