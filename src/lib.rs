/// Module for error handling
pub mod error;
/// Module deciding per-file conversion parameters
pub mod plan;
/// Module recovering audio properties through ffprobe / ffmpeg
pub mod probe;
/// Module for output file naming
pub mod sanitize;
/// Module for invoking external tools
pub mod tool;
/// Module running ffmpeg with the filter fallback ladder
pub mod transcode;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use strum_macros::Display;
use walkdir::WalkDir;

pub use crate::error::Error;
use crate::plan::DEFAULT_MAX_SAMPLE_RATE;
use crate::probe::Prober;
use crate::sanitize::{resolve_with, sanitize};
use crate::tool::{SystemRunner, ToolRunner};
use crate::transcode::Transcoder;

/// Represents supported input audio formats, in scanning order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AudioFormats {
    Mp3,
    Wav,
    Aac,
    M4a,
    Flac,
    Ogg,
    Wma,
    Aiff,
    Alac,
    Tak,
}

impl AudioFormats {
    /// All formats in the order files are processed.
    pub const ALL: [AudioFormats; 10] = [
        Self::Mp3,
        Self::Wav,
        Self::Aac,
        Self::M4a,
        Self::Flac,
        Self::Ogg,
        Self::Wma,
        Self::Aiff,
        Self::Alac,
        Self::Tak,
    ];

    /// Returns a list of supported file extensions
    #[inline]
    pub fn supported_extensions() -> &'static [&'static str] {
        &[
            "mp3", "wav", "aac", "m4a", "flac", "ogg", "wma", "aiff", "alac", "tak",
        ]
    }

    /// Creates an AudioFormats enum from a file path based on its extension
    #[inline]
    pub fn from_path(value: impl AsRef<Path>) -> Option<Self> {
        Some(
            match value
                .as_ref()
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase()
                .as_ref()
            {
                "mp3" => Self::Mp3,
                "wav" => Self::Wav,
                "aac" => Self::Aac,
                "m4a" => Self::M4a,
                "flac" => Self::Flac,
                "ogg" => Self::Ogg,
                "wma" => Self::Wma,
                "aiff" => Self::Aiff,
                "alac" => Self::Alac,
                "tak" => Self::Tak,
                _ => return None,
            },
        )
    }

    fn scan_rank(self) -> usize {
        Self::ALL.iter().position(|&f| f == self).unwrap_or(usize::MAX)
    }
}

/// Configuration options for a conversion run
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Directory tree whose audio files are converted in place
    pub input_dir: PathBuf,
    /// Explicit ffmpeg executable. Discovered automatically when not set.
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe executable. Looked up next to ffmpeg, then on `PATH`.
    pub ffprobe_path: Option<PathBuf>,
    /// Sources above this sample rate are resampled down to it
    pub max_sample_rate: u32,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        ConversionOptions {
            input_dir: PathBuf::from("."),
            ffmpeg_path: None,
            ffprobe_path: None,
            max_sample_rate: DEFAULT_MAX_SAMPLE_RATE,
        }
    }
}

/// An audio file discovered during the scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Lowercase extension without the dot
    pub extension: String,
    pub directory: PathBuf,
    pub format: AudioFormats,
}

impl SourceFile {
    fn new(path: PathBuf, format: AudioFormats) -> Self {
        let extension = path
            .extension()
            .unwrap_or_default()
            .to_string_lossy()
            .to_lowercase();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        SourceFile {
            path,
            extension,
            directory,
            format,
        }
    }
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub success_count: usize,
    pub error_count: usize,
    /// WAV files already in canonical format, left untouched
    pub unchanged_count: usize,
}

/// Human-readable progress stream of a run.
///
/// Every converted file yields `Converting`, `NewName` and then one of
/// `Converted` or `Failed`. A run ends with exactly one `Finished`, or emits a
/// single `Fatal` and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Converting { source: PathBuf },
    NewName { target: PathBuf },
    Converted { source: PathBuf, target: PathBuf },
    Failed { source: PathBuf, reason: String },
    Unchanged { source: PathBuf },
    Finished(RunTally),
    Fatal(String),
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converting { source } => write!(f, "🔄 Converting: {}", source.display()),
            Self::NewName { target } => write!(f, "📝 New name: {}", target.display()),
            Self::Converted { source, target } => {
                write!(f, "✅ Done: {} → {}", source.display(), target.display())
            }
            Self::Failed { source, reason } => {
                write!(f, "❌ Conversion failed: {}: {}", source.display(), reason)
            }
            Self::Unchanged { source } => {
                write!(f, "⏭️ Already canonical WAV: {}", source.display())
            }
            Self::Finished(tally) => {
                write!(f, "🎉 Finished! Converted files: {}", tally.success_count)?;
                if tally.unchanged_count > 0 {
                    write!(f, ", already canonical: {}", tally.unchanged_count)?;
                }
                if tally.error_count > 0 {
                    write!(f, "\n⚠️ Errors: {}", tally.error_count)?;
                }
                Ok(())
            }
            Self::Fatal(message) => write!(f, "⛔ {message}"),
        }
    }
}

/// Per-file result before it is turned into a progress event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Success { target: PathBuf },
    Failure { reason: String },
    Unchanged,
}

/// Tools resolved once the run preconditions hold
struct Toolchain {
    input_dir: PathBuf,
    transcoder: Transcoder,
    prober: Prober,
}

/// Converts every supported audio file below a directory into canonical WAV
pub struct Converter<R = SystemRunner> {
    options: ConversionOptions,
    runner: R,
}

impl Converter<SystemRunner> {
    pub fn new(options: ConversionOptions) -> Self {
        Self::with_runner(options, SystemRunner)
    }
}

impl<R: ToolRunner> Converter<R> {
    /// Uses `runner` for every ffmpeg / ffprobe invocation.
    pub fn with_runner(options: ConversionOptions, runner: R) -> Self {
        Converter { options, runner }
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    /// Runs the whole conversion, reporting through `progress`.
    ///
    /// Files are processed strictly one after another. Only a failed
    /// precondition returns `Err`, after a single [`ProgressEvent::Fatal`].
    pub fn run(&self, mut progress: impl FnMut(ProgressEvent)) -> Result<RunTally, Error> {
        let toolchain = match self.prepare() {
            Ok(toolchain) => toolchain,
            Err(e) => {
                error!("Aborting run: {}", e);
                progress(ProgressEvent::Fatal(e.to_string()));
                return Err(e);
            }
        };

        info!("Discovering audio files in {:?}...", toolchain.input_dir);
        let sources = find_audio_files(&toolchain.input_dir);
        info!("Found {} audio files.", sources.len());

        // Scanned sources are never valid output paths, even after removal.
        let mut claimed: HashSet<PathBuf> = sources.iter().map(|s| s.path.clone()).collect();
        let mut tally = RunTally::default();

        for source in &sources {
            match self.process_file(source, &toolchain, &mut claimed, &mut progress) {
                Ok(ConversionOutcome::Success { target }) => {
                    tally.success_count += 1;
                    progress(ProgressEvent::Converted {
                        source: source.path.clone(),
                        target,
                    });
                }
                Ok(ConversionOutcome::Failure { reason }) => {
                    warn!("Conversion failed for {:?}: {}", source.path, reason);
                    tally.error_count += 1;
                    progress(ProgressEvent::Failed {
                        source: source.path.clone(),
                        reason,
                    });
                }
                Ok(ConversionOutcome::Unchanged) => {
                    tally.unchanged_count += 1;
                    progress(ProgressEvent::Unchanged {
                        source: source.path.clone(),
                    });
                }
                Err(e) => {
                    error!("Error: {}", e);
                    tally.error_count += 1;
                    progress(ProgressEvent::Failed {
                        source: source.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Processing complete. {} files converted, {} failed, {} already canonical.",
            tally.success_count, tally.error_count, tally.unchanged_count
        );
        progress(ProgressEvent::Finished(tally));
        Ok(tally)
    }

    /// Checks the run-fatal preconditions and locates the tools
    fn prepare(&self) -> Result<Toolchain, Error> {
        let input_dir = &self.options.input_dir;
        if !input_dir.is_dir() {
            return Err(Error::MissingDirectory(input_dir.clone()));
        }
        tempfile::tempfile_in(input_dir).map_err(|source| Error::NotWritable {
            path: input_dir.clone(),
            source,
        })?;
        let input_dir = fs::canonicalize(input_dir).map_err(|source| Error::Io {
            path: input_dir.clone(),
            source,
        })?;

        let explicit = self.options.ffmpeg_path.as_deref();
        let ffmpeg = tool::locate_transcoder(explicit).ok_or_else(|| {
            Error::TranscoderNotFound(match explicit {
                Some(path) => format!("no executable at {}", path.display()),
                None => "not on PATH or in any common install location".to_string(),
            })
        })?;
        let ffprobe = tool::locate_prober(self.options.ffprobe_path.as_deref(), &ffmpeg);
        match &ffprobe {
            Some(path) => debug!("Using ffprobe at {:?}", path),
            None => warn!("ffprobe not found, probing will rely on ffmpeg output only"),
        }
        info!("Using ffmpeg at {:?}", ffmpeg);

        Ok(Toolchain {
            input_dir,
            prober: Prober::ffmpeg(ffmpeg.clone(), ffprobe),
            transcoder: Transcoder::new(ffmpeg),
        })
    }

    /// Sanitize, resolve, probe, select and transcode a single file
    fn process_file(
        &self,
        source: &SourceFile,
        toolchain: &Toolchain,
        claimed: &mut HashSet<PathBuf>,
        progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<ConversionOutcome, Error> {
        let runner: &dyn ToolRunner = &self.runner;
        let max_sample_rate = self.options.max_sample_rate;

        // WAV sources are only rewritten when they are not canonical already.
        let mut early_props = None;
        if source.format == AudioFormats::Wav {
            let props = toolchain.prober.probe(runner, &source.path);
            if plan::is_canonical(&props, max_sample_rate) {
                debug!("Leaving canonical WAV untouched: {:?}", source.path);
                return Ok(ConversionOutcome::Unchanged);
            }
            early_props = Some(props);
        }

        let stem = source
            .path
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        let target = resolve_with(&source.directory, &sanitize(&stem), claimed);
        claimed.insert(target.clone());

        progress(ProgressEvent::Converting {
            source: source.path.clone(),
        });
        progress(ProgressEvent::NewName {
            target: target.clone(),
        });

        let props = match early_props {
            Some(props) => props,
            None => toolchain.prober.probe(runner, &source.path),
        };
        let plan = plan::select(&props, &source.extension, max_sample_rate);
        debug!("Plan for {:?}: {:?} (from {:?})", source.path, plan, props);

        let report = toolchain
            .transcoder
            .execute(runner, &source.path, &target, &plan);
        if !report.success {
            let reason = if report.diagnostics.is_empty() {
                "ffmpeg exited unsuccessfully".to_string()
            } else {
                report.diagnostics
            };
            return Ok(ConversionOutcome::Failure { reason });
        }

        fs::remove_file(&source.path).map_err(|e| Error::Io {
            path: source.path.clone(),
            source: e,
        })?;
        Ok(ConversionOutcome::Success { target })
    }
}

/// Converts all audio files below `options.input_dir` using the system ffmpeg
pub fn convert_folder_to_wav(
    options: &ConversionOptions,
    progress: impl FnMut(ProgressEvent),
) -> Result<RunTally, Error> {
    Converter::new(options.clone()).run(progress)
}

/// Finds all supported audio files, grouped by format in scanning order
///
/// Within one format, files keep the (name-sorted) directory walk order.
pub fn find_audio_files(input_dir: impl AsRef<Path>) -> Vec<SourceFile> {
    let mut audio_files: Vec<SourceFile> = WalkDir::new(input_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok()) // Filter out directory reading errors
        .filter(|e| e.file_type().is_file())
        .filter_map(|entry| {
            let format = AudioFormats::from_path(entry.path())?;
            Some(SourceFile::new(entry.into_path(), format))
        })
        .collect();
    audio_files.sort_by_key(|f| f.format.scan_rank());
    audio_files
}
