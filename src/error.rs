use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Reasons a conversion is refused before any process starts.
#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("A conversion is already running.")]
    AlreadyRunning,

    #[error("Transcoder not found at {0:?}.")]
    TranscoderMissing(PathBuf),

    #[error("Input file {0:?} does not exist.")]
    InputMissing(PathBuf),

    #[error("Please specify the {0} file.")]
    EmptyField(&'static str),

    #[error("Unable to start the transcoder: {0}")]
    Spawn(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("unable to run probe tool: {0}")]
    Io(#[from] io::Error),

    #[error("probe tool did not finish within {0:?}")]
    Timeout(Duration),

    #[error("probe tool exited with {0}")]
    ExitStatus(String),

    #[error("unable to parse duration {0:?}")]
    Parse(String),

    #[error("duration {0} is not usable")]
    Invalid(f64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Unable to parse config file {path:?}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error("{0} is not configured.")]
    NotConfigured(&'static str),

    #[error("{key} is configured but not usable: {reason}")]
    Nonfunctional { key: &'static str, reason: String },
}
