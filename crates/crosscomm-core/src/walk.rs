//! Recursive directory listing shared by the offload path and the local store

use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Regular files below `root`, as paths relative to `root`, sorted
///
/// When `skip_hidden` is set, entries whose name starts with `.` are skipped
/// together with everything below them.
pub(crate) fn relative_files(root: &Path, skip_hidden: bool) -> io::Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !(skip_hidden && is_hidden(entry)));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Join the components of a relative path with `/`, the key separator
pub(crate) fn to_key_suffix(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
