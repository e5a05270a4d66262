//! Fake ffmpeg/ffprobe executables for tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

static SCRIPTS: Mutex<()> = Mutex::new(());

/// Serializes tests that write and execute scripts, avoiding ETXTBSY when
/// another test forks while a script is still open for writing.
pub fn serial() -> MutexGuard<'static, ()> {
    SCRIPTS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
