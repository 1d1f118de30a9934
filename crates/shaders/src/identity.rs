use std::fmt;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use tracing::debug;

use crate::dirs::{stripped_name, ShaderDirs};
use crate::ShaderError;

/// A shader as the user named it: either a bare name looked up in the search
/// directories, or an explicit path.
///
/// Identities are not comparable on their own because two spellings can point
/// at the same file. Resolve them first and compare the [`ResolvedShader`]s,
/// or use [`ShaderIdentity::same_shader`].
#[derive(Debug, Clone)]
pub struct ShaderIdentity {
    name: String,
    explicit_path: Option<PathBuf>,
}

impl ShaderIdentity {
    /// Anything containing a path separator, or naming an existing file, is
    /// taken as a path; everything else must be a bare name without periods.
    pub fn parse(input: &str) -> Result<Self, ShaderError> {
        if input.is_empty() {
            return Err(ShaderError::EmptyName);
        }
        let path = Path::new(input);
        if input.contains(MAIN_SEPARATOR) || input.contains('/') || path.is_file() {
            return Ok(Self::from_path(path));
        }
        if input.contains('.') {
            return Err(ShaderError::InvalidName(input.to_string()));
        }
        Ok(Self {
            name: input.to_string(),
            explicit_path: None,
        })
    }

    pub fn from_path(path: &Path) -> Self {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        Self {
            name: stripped_name(path),
            explicit_path: Some(absolute),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn explicit_path(&self) -> Option<&Path> {
        self.explicit_path.as_deref()
    }

    pub fn resolve(&self, dirs: &ShaderDirs) -> Result<ResolvedShader, ShaderError> {
        let path = match &self.explicit_path {
            Some(path) if path.exists() => path.clone(),
            Some(path) => return Err(ShaderError::MissingPath(path.clone())),
            None => self.search(dirs)?,
        };
        debug!(shader = %self.name, path = %path.display(), "resolved shader");
        Ok(ResolvedShader {
            identity: self.clone(),
            path,
        })
    }

    /// True when both sides resolve to the same file. A side that cannot be
    /// resolved makes the answer `false`.
    pub fn same_shader(&self, other: &ShaderIdentity, dirs: &ShaderDirs) -> bool {
        match (self.resolve(dirs), other.resolve(dirs)) {
            (Ok(lhs), Ok(rhs)) => lhs == rhs,
            _ => false,
        }
    }

    fn search(&self, dirs: &ShaderDirs) -> Result<PathBuf, ShaderError> {
        dirs.files()
            .into_iter()
            .find(|file| stripped_name(file) == self.name)
            .ok_or_else(|| ShaderError::NotFound {
                name: self.name.clone(),
                searched: dirs.existing(),
            })
    }
}

impl fmt::Display for ShaderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An identity paired with the concrete file it resolved to. Equality is
/// file identity, not path spelling.
#[derive(Debug, Clone)]
pub struct ResolvedShader {
    pub identity: ShaderIdentity,
    pub path: PathBuf,
}

impl ResolvedShader {
    pub fn name(&self) -> &str {
        self.identity.name()
    }

    pub fn dirname(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

impl PartialEq for ResolvedShader {
    fn eq(&self, other: &Self) -> bool {
        same_file(&self.path, &other.path)
    }
}

#[cfg(unix)]
fn same_file(lhs: &Path, rhs: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (fs::metadata(lhs), fs::metadata(rhs)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(lhs: &Path, rhs: &Path) -> bool {
    match (fs::canonicalize(lhs), fs::canonicalize(rhs)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
