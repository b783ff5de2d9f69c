//! Export a backup as a standalone archive

use std::path::{Path, PathBuf};

use super::SaveRepo;
use crate::error::{HistoryError, HistoryResult};
use crate::store::{ArchiveFormat, GitStore};
use crate::util::sanitize_filename;

/// Extension used when no destination is given
pub fn default_archive_extension() -> &'static str {
    if cfg!(windows) {
        ArchiveFormat::Zip.extension()
    } else {
        ArchiveFormat::TarGz.extension()
    }
}

/// Pick the archive format from the destination's extension
pub fn archive_format_for(path: &Path) -> HistoryResult<ArchiveFormat> {
    if path.extension().is_none() {
        return Err(HistoryError::invalid(format!(
            "{} does not specify an extension",
            path.display()
        )));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let has = |suffixes: &[&str]| suffixes.iter().any(|suffix| name.ends_with(suffix));
    if has(&[".tar.gz", ".tgz"]) {
        Ok(ArchiveFormat::TarGz)
    } else if has(&[".tar.bz2", ".tbz", ".tbz2"]) {
        Ok(ArchiveFormat::TarBz2)
    } else if has(&[".tar.xz", ".txz"]) {
        Ok(ArchiveFormat::TarXz)
    } else if name.ends_with(".tar") {
        Ok(ArchiveFormat::Tar)
    } else if name.ends_with(".zip") {
        Ok(ArchiveFormat::Zip)
    } else {
        Err(HistoryError::invalid(format!(
            "{}: unsupported archive format (use .zip, .tar, .tar.gz, .tar.bz2 or .tar.xz)",
            path.display()
        )))
    }
}

impl SaveRepo<GitStore> {
    /// Write the files of a backup to an archive and return its path.
    ///
    /// Without a destination the archive is named after the save and the
    /// backup and placed in the current directory. A relative destination is
    /// also taken from the current directory, not the save. Existing files
    /// are never overwritten.
    pub fn export(&self, reference: &str, destination: Option<&Path>) -> HistoryResult<PathBuf> {
        let ledger = self.ledger()?;
        let snapshot = ledger.find(reference)?;

        let destination = match destination {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(format!(
                "{}_{}.{}",
                sanitize_filename(self.name()),
                sanitize_filename(snapshot.identifier()),
                default_archive_extension()
            )),
        };
        let destination = if destination.is_absolute() {
            destination
        } else {
            std::env::current_dir()?.join(destination)
        };

        if destination.exists() {
            return Err(HistoryError::invalid(format!(
                "{} already exists",
                destination.display()
            )));
        }
        let format = archive_format_for(&destination)?;

        self.store().archive(&snapshot.id, &destination, format)?;
        tracing::info!(
            backup = %snapshot.identifier(),
            path = %destination.display(),
            "Exported backup"
        );
        Ok(destination)
    }
}
