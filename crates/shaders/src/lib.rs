mod dirs;
mod identity;
mod instance;
mod template;

pub use dirs::{
    expand_path, stripped_name, ShaderDirs, ENV_SHADERS_DIR, MAX_SCAN_DEPTH, SYSTEM_DIR,
};
pub use identity::{ResolvedShader, ShaderIdentity};
pub use instance::{
    is_template, materialize, source_of, InstanceStore, ENV_STATE_DIR, SOURCE_MARKER,
    TEMPLATE_EXTENSION,
};
pub use template::{render, TemplateError};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("shader name must not be empty")]
    EmptyName,
    #[error("shader name '{0}' must not contain a '.' character")]
    InvalidName(String),
    #[error("no shader file found at {}", .0.display())]
    MissingPath(PathBuf),
    #[error(
        "could not find shader '{name}' in any of:\n\t{}",
        .searched.iter().map(|dir| dir.display().to_string()).collect::<Vec<_>>().join("\n\t")
    )]
    NotFound { name: String, searched: Vec<PathBuf> },
    #[error("{0}")]
    Expand(String),
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render shader template: {0}")]
    Template(#[from] TemplateError),
}

impl ShaderError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
