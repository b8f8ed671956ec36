use crate::models::FileEntry;
use sha2::{Digest, Sha256};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

const SKIPPED_DIRECTORIES: &[&str] = &["target", "node_modules", "__pycache__", "dist", "build", ".venv"];

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && SKIPPED_DIRECTORIES.contains(&&*name)
}

pub fn discover_files(root: &Path) -> Vec<FileEntry> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !is_skipped(entry))
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(FileEntry::new(relative, entry.path()));
    }

    files.sort_unstable_by(|left, right| left.relative_path.cmp(&right.relative_path));
    files
}

pub fn collection_name_for_root(prefix: &str, root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{prefix}_{}", &digest[..12])
}
