//! Invocation and discovery of the external ffmpeg / ffprobe executables.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;

/// Install locations checked when ffmpeg is not on `PATH`.
const COMMON_FFMPEG_PATHS: &[&str] = &[
    "/usr/local/bin/ffmpeg",
    "/usr/bin/ffmpeg",
    "/opt/homebrew/bin/ffmpeg",
    "/opt/local/bin/ffmpeg",
];

/// Output captured from a finished tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Exit code, absent when the process was killed by a signal.
    pub code: Option<i32>,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// Runs an external program to completion and captures its output.
pub trait ToolRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<ToolOutput>;
}

/// [`ToolRunner`] that spawns real child processes and blocks until they exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<ToolOutput> {
        debug!("Running {:?} {:?}", program, args);
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Human-readable program name for log and error messages.
pub fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string_lossy().into_owned())
}

/// Locates the ffmpeg executable.
///
/// An explicit path wins but must exist. Otherwise `PATH` is searched, then
/// a few well-known install locations.
pub fn locate_transcoder(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.is_file().then(|| path.to_path_buf());
    }
    which::which("ffmpeg").ok().or_else(|| {
        COMMON_FFMPEG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
    })
}

/// Locates ffprobe, preferring the one installed next to `transcoder`.
pub fn locate_prober(explicit: Option<&Path>, transcoder: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.is_file().then(|| path.to_path_buf());
    }
    let sibling = transcoder.with_file_name(format!("ffprobe{}", std::env::consts::EXE_SUFFIX));
    if sibling.is_file() {
        return Some(sibling);
    }
    which::which("ffprobe").ok()
}
