use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub mod command;
pub mod lines;
pub mod probe;
pub mod progress;

/// An external ffmpeg-family executable at a configured location.
pub struct Tool {
    path: PathBuf,
}

impl Tool {
    pub fn new(path: &Path) -> Self {
        Tool { path: path.to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Runs `<tool> -version` to tell a present binary from a working one.
    pub fn is_installed(&self) -> bool {
        let cmd = Command::new(&self.path)
            .arg("-version")
            .stdin(Stdio::null())
            .output();
        match cmd {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool() {
        let tool = Tool::new(Path::new("/nonexistent/ffmpeg"));
        assert!(!tool.exists());
        assert!(!tool.is_installed());
    }
}
