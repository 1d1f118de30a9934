//! Rendered copies of templated shaders.
//!
//! A shader whose file name ends in `.mustache` cannot be handed to the
//! compositor directly. It is rendered into the state directory under its
//! base name, and the first line records where it came from so the active
//! shader can be traced back to its source later.
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use shadeconfig::{state_home, VariableSet, APP_NAME};
use tracing::{debug, info};

use crate::identity::ResolvedShader;
use crate::template::render;
use crate::ShaderError;

pub const TEMPLATE_EXTENSION: &str = "mustache";
pub const SOURCE_MARKER: &str = "// shadeclock-source: ";
pub const ENV_STATE_DIR: &str = "SHADECLOCK_STATE_DIR";

pub fn is_template(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == TEMPLATE_EXTENSION)
}

#[derive(Debug, Clone)]
pub struct InstanceStore {
    root: PathBuf,
}

impl InstanceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$SHADECLOCK_STATE_DIR`, else the per-user state directory.
    pub fn discover() -> Result<Self, ShaderError> {
        if let Some(dir) = env::var_os(ENV_STATE_DIR).filter(|value| !value.is_empty()) {
            return Ok(Self::new(dir));
        }
        state_home()
            .map(|home| Self::new(home.join(APP_NAME)))
            .ok_or_else(|| ShaderError::Expand("unable to determine the state directory".into()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the rendered copy of `source` lives: the source file name with
    /// its last extension removed.
    pub fn instance_path(&self, source: &Path) -> PathBuf {
        let name = source
            .file_stem()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("shader"));
        self.root.join(name)
    }

    pub fn write(&self, source: &Path, rendered: &str) -> Result<PathBuf, ShaderError> {
        fs::create_dir_all(&self.root).map_err(ShaderError::io(&self.root))?;
        let path = self.instance_path(source);
        let contents = format!("{SOURCE_MARKER}{}\n{rendered}", source.display());
        fs::write(&path, contents).map_err(ShaderError::io(&path))?;
        info!(source = %source.display(), instance = %path.display(), "wrote rendered shader");
        Ok(path)
    }
}

/// The source recorded in the first line of a rendered instance, if any.
/// Plain shader files have no marker and yield `None`.
pub fn source_of(path: &Path) -> Result<Option<PathBuf>, ShaderError> {
    let contents = fs::read_to_string(path).map_err(ShaderError::io(path))?;
    let first = contents.lines().next().unwrap_or_default();
    Ok(first
        .strip_prefix(SOURCE_MARKER)
        .map(|source| PathBuf::from(source.trim())))
}

/// Returns a path the compositor can load: the shader itself, or for
/// templates a freshly rendered instance.
pub fn materialize(
    shader: &ResolvedShader,
    variables: &VariableSet,
    store: &InstanceStore,
) -> Result<PathBuf, ShaderError> {
    if !is_template(&shader.path) {
        debug!(shader = %shader.name(), "shader is not a template");
        return Ok(shader.path.clone());
    }
    let template = fs::read_to_string(&shader.path).map_err(ShaderError::io(&shader.path))?;
    let rendered = render(&template, variables)?;
    store.write(&shader.path, &rendered)
}
