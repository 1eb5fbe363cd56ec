//! Local storage for uploaded files.

use std::path::{Path, PathBuf};

use tracing::debug;

use rag_core::{RagError, Result};

/// Keeps a copy of every ingested file in the upload directory.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    upload_dir: PathBuf,
}

impl DocumentRepository {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Copy `source` into the upload directory under its own file name and
    /// return the stored path. An existing file with that name is replaced.
    pub fn store(&self, source: &Path) -> Result<PathBuf> {
        let file_name = source.file_name().ok_or_else(|| {
            RagError::file_storage(format!("{} has no file name", source.display()))
        })?;

        if !source.is_file() {
            return Err(RagError::file_storage(format!(
                "{} is not a readable file",
                source.display()
            )));
        }

        std::fs::create_dir_all(&self.upload_dir).map_err(|e| {
            RagError::file_storage(format!(
                "Failed to create upload directory {}: {}",
                self.upload_dir.display(),
                e
            ))
        })?;

        let destination = self.upload_dir.join(file_name);

        // Re-ingesting a file that already lives in the upload directory.
        if same_file(source, &destination) {
            return Ok(destination);
        }

        std::fs::copy(source, &destination).map_err(|e| {
            RagError::file_storage(format!(
                "Failed to copy {} to {}: {}",
                source.display(),
                destination.display(),
                e
            ))
        })?;

        debug!("Stored {:?} at {:?}", source, destination);
        Ok(destination)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
