//! Bundled read-only assets.
//!
//! Files are read from a fixed directory. Paths must stay inside it, may not
//! pass through symlinks, must carry an allowed extension and must fit under
//! a small size ceiling.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use rphud_domain::{DomainError, Template, TemplateKind, TemplateSet};
use serde::de::DeserializeOwned;

pub const MAX_ASSET_BYTES: u64 = 64 * 1024;
pub const ALLOWED_EXTENSIONS: &[&str] = &["json", "txt"];

pub const ATTACH_POINTS_FILE: &str = "attach_points.json";

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset path escapes the asset directory: {0}")]
    PathTraversal(String),
    #[error("Asset extension not allowed: {0}")]
    Extension(String),
    #[error("Asset is a symlink: {0}")]
    Symlink(String),
    #[error("Asset too large: {path} ({size} bytes)")]
    TooLarge { path: String, size: u64 },
    #[error("Asset not found: {0}")]
    NotFound(String),
    #[error("Failed to read asset {path}: {message}")]
    Io { path: String, message: String },
    #[error("Invalid asset {path}: {message}")]
    Invalid { path: String, message: String },
    #[error(transparent)]
    Template(#[from] DomainError),
}

/// Reads assets from one root directory.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    root: PathBuf,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `relative` under the root, rejecting unsafe paths.
    fn resolve(&self, relative: &str) -> Result<PathBuf, AssetError> {
        let rel = Path::new(relative);
        if relative.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AssetError::PathTraversal(relative.to_string()));
        }

        let extension = rel
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AssetError::Extension(relative.to_string()));
        }

        // Every component below the root, the file included, must be a real entry.
        let mut path = self.root.clone();
        for component in rel.components() {
            path.push(component);
            match fs::symlink_metadata(&path) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(AssetError::Symlink(relative.to_string()));
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(AssetError::NotFound(relative.to_string()));
                }
                Err(e) => {
                    return Err(AssetError::Io {
                        path: relative.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(path)
    }

    pub fn read_to_string(&self, relative: &str) -> Result<String, AssetError> {
        let path = self.resolve(relative)?;
        let io_err = |e: std::io::Error| AssetError::Io {
            path: relative.to_string(),
            message: e.to_string(),
        };

        let meta = fs::metadata(&path).map_err(io_err)?;
        if !meta.is_file() {
            return Err(AssetError::NotFound(relative.to_string()));
        }
        if meta.len() > MAX_ASSET_BYTES {
            return Err(AssetError::TooLarge {
                path: relative.to_string(),
                size: meta.len(),
            });
        }
        fs::read_to_string(&path).map_err(io_err)
    }

    pub fn read_json<T: DeserializeOwned>(&self, relative: &str) -> Result<T, AssetError> {
        let raw = self.read_to_string(relative)?;
        serde_json::from_str(&raw).map_err(|e| AssetError::Invalid {
            path: relative.to_string(),
            message: e.to_string(),
        })
    }

    /// Loads `templates/{character,settings,stats}.json`.
    pub fn load_templates(&self) -> Result<TemplateSet, AssetError> {
        let load = |kind: TemplateKind| -> Result<Template, AssetError> {
            let relative = format!("templates/{}.json", kind.name());
            let raw = self.read_to_string(&relative)?;
            Ok(Template::from_json(kind, &raw)?)
        };
        Ok(TemplateSet::new(
            load(TemplateKind::Titler)?,
            load(TemplateKind::Settings)?,
            load(TemplateKind::Stats)?,
        )?)
    }

    pub fn load_attach_points(&self) -> Result<AttachPointTable, AssetError> {
        let codes: HashMap<String, i64> = self.read_json(ATTACH_POINTS_FILE)?;
        if codes.is_empty() {
            return Err(AssetError::Invalid {
                path: ATTACH_POINTS_FILE.to_string(),
                message: "no attach points defined".to_string(),
            });
        }
        Ok(AttachPointTable::new(codes))
    }
}

/// Attachment point names mapped to viewer codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachPointTable {
    codes: HashMap<String, i64>,
}

impl AttachPointTable {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: AsRef<str>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(|(name, code)| (normalize(name.as_ref()), code))
                .collect(),
        }
    }

    /// Viewer code for `name`, matched case-insensitively.
    pub fn resolve(&self, name: &str) -> Option<i64> {
        self.codes.get(&normalize(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}
