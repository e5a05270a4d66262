//! Supervises an external ffmpeg process converting one video at a time,
//! turning its status output into progress events.

pub mod config;
pub mod error;
pub mod events;
pub mod ffmpeg;
pub mod fstools;
pub mod quality;
pub mod report;
pub mod supervisor;
pub mod transcode_state;

#[cfg(all(test, unix))]
mod testing;

pub use config::Config;
pub use error::{ConfigError, PreflightError, ProbeError};
pub use events::{ConversionEvent, Outcome};
pub use quality::{EncodingParameters, Quality};
pub use supervisor::Supervisor;
pub use transcode_state::{ConversionRequest, RunSnapshot, SupervisorStatus};
