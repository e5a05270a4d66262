use std::fs;
use std::path::{Path, PathBuf};

pub enum DirEntryCategory {
    DoesNotExist,
    RegularFile,
    SymbolicLink,
    Directory,
    Unknown,
}

pub fn classify_file(path: &Path) -> DirEntryCategory {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.is_symlink() {
                DirEntryCategory::SymbolicLink
            } else if metadata.is_file() {
                DirEntryCategory::RegularFile
            } else if metadata.is_dir() {
                DirEntryCategory::Directory
            } else {
                DirEntryCategory::Unknown
            }
        },
        Err(_) => DirEntryCategory::DoesNotExist,
    }
}

/// The input path with its extension replaced by `.mp4`.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("mp4")
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}
