mod dirs;
mod model;
mod variables;

use std::fs;
use std::path::{Path, PathBuf};

pub use dirs::{
    config_candidates, config_home, home_dir, locate_config, state_home, APP_NAME, ENV_CONFIG,
};
pub use model::{ConfigTree, FieldError, FieldErrorKind, Location, ShaderEntry, SCHEDULE_KEYS};
pub use variables::{
    coerce_scalar, deep_merge, expand_dotted, expand_overrides, merge_sources,
    reserved_collisions, set_dotted, Variable, VariableError, VariableOverride, VariableSet,
    RESERVED_NAMES,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not find a config file; searched: {}", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Invalid(#[from] FieldError),
}

impl ConfigError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(no candidate locations)".to_string();
    }
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigTree {
    pub fn from_toml_str(input: &str, document: impl Into<String>) -> Result<Self, ConfigError> {
        let document = document.into();
        let raw: toml::Table = toml::from_str(input).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(&document),
            source,
        })?;
        Ok(Self::new(raw, document))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path.display().to_string())
    }

    /// Loads the first config found among [`config_candidates`].
    pub fn discover() -> Result<Self, ConfigError> {
        let candidates = config_candidates();
        match locate_config(&candidates) {
            Some(path) => Self::load(&path),
            None => Err(ConfigError::NotFound {
                searched: candidates,
            }),
        }
    }
}
