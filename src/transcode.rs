//! Running ffmpeg with the restoration filter ladder.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::plan::ConversionPlan;
use crate::tool::{ToolOutput, ToolRunner};

/// Declick, declip and a 10 kHz notch.
pub const PRIMARY_FILTER_CHAIN: &str = "adeclick,adeclip,equalizer=f=10000:t=q:w=2:g=-3";

/// The 10 kHz notch alone, for builds without declick/declip.
pub const REDUCED_FILTER_CHAIN: &str = "equalizer=f=10000:t=q:w=2:g=-3";

/// Returns whether ffmpeg's diagnostics say the filter graph could not be built.
pub fn is_filter_error(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such filter") || stderr.contains("error initializing filter")
}

/// One rung of the fallback ladder.
#[derive(Debug, Clone, Copy)]
pub struct FilterStage {
    pub name: &'static str,
    pub chain: Option<&'static str>,
    /// Whether a failure at this stage may fall through to the next one.
    pub retry_on: fn(&str) -> bool,
}

/// Ordered filter stages tried for `plan`.
pub fn filter_ladder(plan: &ConversionPlan) -> Vec<FilterStage> {
    if !plan.apply_restoration_filters {
        return vec![FilterStage {
            name: "plain",
            chain: None,
            retry_on: |_| false,
        }];
    }
    vec![
        FilterStage {
            name: "primary",
            chain: Some(PRIMARY_FILTER_CHAIN),
            retry_on: is_filter_error,
        },
        FilterStage {
            name: "reduced",
            chain: Some(REDUCED_FILTER_CHAIN),
            retry_on: is_filter_error,
        },
        FilterStage {
            name: "unfiltered",
            chain: None,
            retry_on: |_| false,
        },
    ]
}

/// Arguments for one ffmpeg invocation.
pub fn transcode_args(
    source: &Path,
    target: &Path,
    plan: &ConversionPlan,
    chain: Option<&str>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-loglevel".into(),
        "warning".into(),
        "-i".into(),
        source.as_os_str().to_os_string(),
    ];
    if plan.force_sixteen_bit {
        args.extend(["-c:a".into(), "pcm_s16le".into()]);
    }
    if let Some(rate) = plan.resample_target_hz {
        args.extend(["-ar".into(), rate.to_string().into()]);
    }
    if let Some(chain) = chain {
        args.extend(["-af".into(), chain.into()]);
    }
    args.push(target.as_os_str().to_os_string());
    args
}

/// Result of [`execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeReport {
    pub success: bool,
    /// Diagnostics of the last attempt.
    pub diagnostics: String,
    /// Names of the stages that were run, in order.
    pub stages: Vec<&'static str>,
}

fn output_is_valid(target: &Path) -> bool {
    fs::metadata(target).is_ok_and(|m| m.is_file() && m.len() > 0)
}

fn remove_partial(target: &Path) {
    if target.exists() {
        if let Err(e) = fs::remove_file(target) {
            warn!("Failed to remove partial output {:?}: {}", target, e);
        }
    }
}

/// Converts `source` into `target` according to `plan`.
///
/// Success needs exit status 0 and a non-empty output file. Any failed
/// attempt leaves no output behind.
pub fn execute(
    runner: &dyn ToolRunner,
    ffmpeg: &Path,
    source: &Path,
    target: &Path,
    plan: &ConversionPlan,
) -> TranscodeReport {
    let mut stages = Vec::new();
    let mut diagnostics = String::new();

    for stage in filter_ladder(plan) {
        stages.push(stage.name);
        let args = transcode_args(source, target, plan, stage.chain);
        let output = runner.run(ffmpeg, &args).unwrap_or_else(|e| ToolOutput {
            success: false,
            code: None,
            stdout: String::new(),
            stderr: format!("failed to spawn {}: {}", ffmpeg.display(), e),
        });
        diagnostics = output.stderr.trim().to_string();

        if output.success && output_is_valid(target) {
            debug!("Converted {:?} with {} filter stage", source, stage.name);
            return TranscodeReport {
                success: true,
                diagnostics,
                stages,
            };
        }
        remove_partial(target);

        if output.success {
            diagnostics = format!("ffmpeg produced no output at {}", target.display());
            break;
        }
        if !(stage.retry_on)(&output.stderr) {
            break;
        }
        warn!(
            "Filter stage {} unsupported for {:?}, falling back: {}",
            stage.name, source, diagnostics
        );
    }

    TranscodeReport {
        success: false,
        diagnostics,
        stages,
    }
}

/// Owning handle bundling what [`execute`] needs.
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: PathBuf,
}

impl Transcoder {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self { ffmpeg }
    }

    pub fn execute(
        &self,
        runner: &dyn ToolRunner,
        source: &Path,
        target: &Path,
        plan: &ConversionPlan,
    ) -> TranscodeReport {
        execute(runner, &self.ffmpeg, source, target, plan)
    }
}
