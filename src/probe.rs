//! Audio property probing.
//!
//! Probing is a ranked list of [`ProbeStrategy`] implementations. The first
//! one returning a non-empty [`AudioProperties`] wins; when none does the
//! all-unknown record is returned. Probing never fails the caller.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::error::ProbeError;
use crate::tool::{ToolRunner, tool_name};

/// What is known about the first audio stream of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioProperties {
    pub sample_rate: Option<u32>,
    /// Sample format tag such as `s16`, `s32p` or `fltp`.
    pub sample_format: Option<String>,
    pub bit_depth: Option<u32>,
    /// Lowercase codec name such as `mp3` or `pcm_s16le`.
    pub codec: Option<String>,
}

impl AudioProperties {
    pub fn is_empty(&self) -> bool {
        self.sample_rate.is_none()
            && self.sample_format.is_none()
            && self.bit_depth.is_none()
            && self.codec.is_none()
    }

    /// Fills `bit_depth` from the sample format when it was not reported.
    fn with_derived_depth(mut self) -> Self {
        if self.bit_depth.is_none() {
            self.bit_depth = self.sample_format.as_deref().and_then(bit_depth_from_format);
        }
        self
    }
}

/// Bit depth implied by a sample format token.
///
/// `s16`/`u8`/`s32p` use their digit run, `flt*` is 32, `dbl*` is 64.
pub fn bit_depth_from_format(format: &str) -> Option<u32> {
    let format = format.trim().to_ascii_lowercase();
    if format.starts_with("flt") {
        return Some(32);
    }
    if format.starts_with("dbl") {
        return Some(64);
    }
    let rest = format
        .strip_prefix('s')
        .or_else(|| format.strip_prefix('u'))?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// One way of discovering [`AudioProperties`].
pub trait ProbeStrategy {
    fn name(&self) -> &'static str;
    fn probe(&self, runner: &dyn ToolRunner, path: &Path) -> Result<AudioProperties, ProbeError>;
}

/// Structured query through `ffprobe -of json`.
#[derive(Debug, Clone)]
pub struct FfprobeStrategy {
    ffprobe_path: Option<PathBuf>,
}

impl FfprobeStrategy {
    pub fn new(ffprobe_path: Option<PathBuf>) -> Self {
        Self { ffprobe_path }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default, deserialize_with = "number_or_string")]
    sample_rate: Option<u32>,
    sample_fmt: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    bits_per_raw_sample: Option<u32>,
    #[serde(default, deserialize_with = "number_or_string")]
    bit_depth: Option<u32>,
    codec_name: Option<String>,
}

/// ffprobe reports most numeric fields as strings, and `0` or `N/A` when unknown.
fn number_or_string<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(value.filter(|&n| n > 0))
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty() && s != "unknown")
}

/// Maps ffprobe's JSON answer onto [`AudioProperties`].
pub(crate) fn parse_ffprobe_json(json: &str) -> Result<AudioProperties, ProbeError> {
    let output: FfprobeOutput = serde_json::from_str(json)?;
    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or(ProbeError::NoAudioStream)?;

    let props = AudioProperties {
        sample_rate: stream.sample_rate,
        sample_format: non_empty(stream.sample_fmt),
        bit_depth: stream.bit_depth.or(stream.bits_per_raw_sample),
        codec: non_empty(stream.codec_name),
    };
    Ok(props.with_derived_depth())
}

impl ProbeStrategy for FfprobeStrategy {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn probe(&self, runner: &dyn ToolRunner, path: &Path) -> Result<AudioProperties, ProbeError> {
        let ffprobe = self.ffprobe_path.as_deref().ok_or(ProbeError::Unavailable)?;
        let mut args: Vec<OsString> = [
            "-v",
            "error",
            "-select_streams",
            "a:0",
            "-show_entries",
            "stream=sample_rate,sample_fmt,bits_per_raw_sample,bit_depth,codec_name",
            "-of",
            "json",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(path.as_os_str().to_os_string());

        let output = runner
            .run(ffprobe, &args)
            .map_err(|source| ProbeError::Spawn {
                tool: tool_name(ffprobe),
                source,
            })?;
        if !output.success {
            return Err(ProbeError::Exit {
                tool: tool_name(ffprobe),
                stderr: output.stderr.trim().to_string(),
            });
        }
        parse_ffprobe_json(&output.stdout)
    }
}

/// Scrapes the stream banner printed by `ffmpeg -i <file>` without an output.
#[derive(Debug, Clone)]
pub struct BannerStrategy {
    ffmpeg_path: PathBuf,
}

impl BannerStrategy {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }
}

static SAMPLE_RATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*Hz").expect("valid sample rate regex"));
static SAMPLE_FORMAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(u8p?|s16p?|s24p?|s32p?|s64p?|fltp?|dblp?)\b").expect("valid sample format regex")
});
static EXPLICIT_BITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+) bit\)").expect("valid bit depth regex"));
static CODEC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Audio:\s*([A-Za-z0-9_]+)").expect("valid codec regex"));

/// Extracts [`AudioProperties`] from ffmpeg's diagnostic output.
///
/// Only the first line describing an audio stream is considered.
pub(crate) fn parse_banner(banner: &str) -> AudioProperties {
    let Some(line) = banner.lines().find(|l| l.contains("Stream #") && l.contains("Audio:"))
    else {
        return AudioProperties::default();
    };

    let props = AudioProperties {
        sample_rate: SAMPLE_RATE_RE
            .captures(line)
            .and_then(|c| c[1].parse().ok()),
        sample_format: SAMPLE_FORMAT_RE.captures(line).map(|c| c[1].to_string()),
        bit_depth: EXPLICIT_BITS_RE
            .captures(line)
            .and_then(|c| c[1].parse().ok()),
        codec: CODEC_RE.captures(line).map(|c| c[1].to_ascii_lowercase()),
    };
    props.with_derived_depth()
}

impl ProbeStrategy for BannerStrategy {
    fn name(&self) -> &'static str {
        "ffmpeg banner"
    }

    fn probe(&self, runner: &dyn ToolRunner, path: &Path) -> Result<AudioProperties, ProbeError> {
        let args = [
            OsString::from("-hide_banner"),
            OsString::from("-i"),
            path.as_os_str().to_os_string(),
        ];
        // Exits non-zero because no output is given; only the text matters.
        let output = runner
            .run(&self.ffmpeg_path, &args)
            .map_err(|source| ProbeError::Spawn {
                tool: tool_name(&self.ffmpeg_path),
                source,
            })?;
        Ok(parse_banner(&output.stderr))
    }
}

/// Tries each strategy in order until one yields something.
pub struct Prober {
    strategies: Vec<Box<dyn ProbeStrategy + Send>>,
}

impl Prober {
    pub fn new(strategies: Vec<Box<dyn ProbeStrategy + Send>>) -> Self {
        Self { strategies }
    }

    /// ffprobe first, then the ffmpeg banner.
    pub fn ffmpeg(ffmpeg_path: PathBuf, ffprobe_path: Option<PathBuf>) -> Self {
        Self::new(vec![
            Box::new(FfprobeStrategy::new(ffprobe_path)),
            Box::new(BannerStrategy::new(ffmpeg_path)),
        ])
    }

    pub fn probe(&self, runner: &dyn ToolRunner, path: &Path) -> AudioProperties {
        for strategy in &self.strategies {
            match strategy.probe(runner, path) {
                Ok(props) if !props.is_empty() => {
                    debug!("Probed {:?} via {}: {:?}", path, strategy.name(), props);
                    return props;
                }
                Ok(_) => debug!("{} found nothing for {:?}", strategy.name(), path),
                Err(e) => debug!("{} failed for {:?}: {}", strategy.name(), path, e),
            }
        }
        debug!("No audio properties recovered for {:?}", path);
        AudioProperties::default()
    }
}
