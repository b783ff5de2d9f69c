//! Per-save tracking configuration (`.gsb_manifest`)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the manifest, relative to the save root
pub const MANIFEST_NAME: &str = ".gsb_manifest";

/// Files that are always tracked, whatever the patterns say
pub const REQUIRED_FILES: [&str; 2] = [".gitignore", MANIFEST_NAME];

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("{0} is not a gsb-managed save (no .gsb_manifest found)")]
    NotAGsbRepo(PathBuf),
    #[error("Invalid manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What gets tracked in a save directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(skip)]
    pub root: PathBuf,
    /// Display name of the save
    #[serde(default)]
    pub name: String,
    /// Git pathspecs selecting tracked files
    pub patterns: Vec<String>,
}

impl Manifest {
    pub fn new(root: &Path, name: &str, patterns: Vec<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            name: name.to_string(),
            patterns,
        }
    }

    /// Path of the manifest file for a save rooted at `root`
    pub fn path_of(root: &Path) -> PathBuf {
        root.join(MANIFEST_NAME)
    }

    /// Read the manifest of the save rooted at `root`.
    ///
    /// A missing name falls back to the directory name.
    pub fn read(root: &Path) -> Result<Self, ManifestError> {
        let path = Self::path_of(root);
        if !path.exists() {
            return Err(ManifestError::NotAGsbRepo(root.to_path_buf()));
        }

        let contents = fs::read_to_string(&path)?;
        let mut manifest: Manifest =
            toml::from_str(&contents).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;

        manifest.root = root.to_path_buf();
        if manifest.name.trim().is_empty() {
            manifest.name = default_name(root);
        }
        Ok(manifest)
    }

    pub fn write(&self) -> Result<(), ManifestError> {
        let contents = toml::to_string(self)?;
        fs::write(Self::path_of(&self.root), contents)?;
        tracing::debug!(root = %self.root.display(), "Wrote manifest");
        Ok(())
    }
}

/// Name of the directory itself, resolving `.` and friends where possible
pub fn default_name(root: &Path) -> String {
    let resolved = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "save".to_string())
}
