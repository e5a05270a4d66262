use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::Config;
use crate::quality::{EncodingParameters, Quality};

/// The full transcoder invocation for one conversion.
#[derive(Clone, Debug)]
pub struct TranscodeCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl TranscodeCommand {
    pub fn new(config: &Config, input: &Path, output: &Path, quality: Quality) -> Self {
        TranscodeCommand {
            program: config.transcoder_path.clone(),
            args: build_args(config, input, output, quality.parameters()),
        }
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Stdin is closed; stdout and stderr are both piped so they can be merged.
    ///
    /// On unix the child gets its own process group, so a terminal interrupt
    /// reaches only us and turns into a cancel.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}

fn build_args(config: &Config, input: &Path, output: &Path, parameters: EncodingParameters) -> Vec<OsString> {
    fn os(s: &str) -> OsString { OsString::from(s) }

    vec![
        os("-i"), input.as_os_str().to_owned(),
        os("-c:v"), os(&config.video_codec),
        os("-crf"), OsString::from(parameters.quality_factor.to_string()),
        os("-preset"), os(parameters.speed_preset),
        os("-c:a"), os(&config.audio_codec),
        os("-b:a"), os(&config.audio_bitrate),
        // always overwrite; confirmation belongs to the caller
        os("-y"),
        output.as_os_str().to_owned(),
    ]
}
