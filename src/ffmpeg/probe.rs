use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::Config;
use crate::error::ProbeError;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Asks ffprobe for the container duration of a file.
#[derive(Clone, Debug)]
pub struct DurationProber {
    path: PathBuf,
    fallback: f64,
    timeout: Duration,
}

impl DurationProber {
    pub fn new(path: &Path, fallback: f64, timeout: Duration) -> Self {
        DurationProber {
            path: path.to_path_buf(),
            fallback,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        DurationProber::new(&config.probe_path, config.fallback_duration, config.probe_timeout())
    }

    /// Duration in seconds, or the fallback when probing fails for any reason.
    pub fn probe(&self, input: &Path) -> f64 {
        match self.try_probe(input) {
            Ok(duration) => {
                info!(input = %input.display(), duration, "probed duration");
                duration
            },
            Err(err) => {
                warn!(input = %input.display(), fallback = self.fallback, "duration probe failed: {err}");
                self.fallback
            },
        }
    }

    pub fn try_probe(&self, input: &Path) -> Result<f64, ProbeError> {
        let mut child = Command::new(&self.path)
            .args([
                "-v", "error",
                "-show_entries", "format=duration",
                "-of", "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child.stdout.take();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut output = String::new();
            let result = match stdout {
                Some(mut stream) => stream.read_to_string(&mut output).map(|_| output),
                None => Ok(output),
            };
            let _ = tx.send(result);
        });

        // one deadline covers both the exit and the output
        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProbeError::Timeout(self.timeout));
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let output = match rx.recv_timeout(remaining) {
            Ok(result) => result?,
            Err(_) => return Err(ProbeError::Timeout(self.timeout)),
        };

        if !status.success() {
            return Err(ProbeError::ExitStatus(status.to_string()));
        }

        parse_duration(&output)
    }
}

pub fn parse_duration(output: &str) -> Result<f64, ProbeError> {
    let trimmed = output.trim();
    let duration: f64 = trimmed
        .parse()
        .map_err(|_| ProbeError::Parse(String::from(trimmed)))?;
    if duration.is_finite() && duration > 0.0 {
        Ok(duration)
    } else {
        Err(ProbeError::Invalid(duration))
    }
}
