use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::UploadError;

/// Recursively list the regular files under `root`, sorted by path.
///
/// `root` must be an existing directory. Entries that cannot be read during
/// the walk are logged and skipped.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>, UploadError> {
    let meta = std::fs::metadata(root).map_err(|e| UploadError::Enumeration {
        root: root.to_path_buf(),
        message: e.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(UploadError::Enumeration {
            root: root.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();

    debug!(root = %root.display(), count = files.len(), "Enumerated source files");
    Ok(files)
}
