use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use audio_batch_wav_convert::tool::{ToolOutput, ToolRunner};
use audio_batch_wav_convert::transcode::PRIMARY_FILTER_CHAIN;
use audio_batch_wav_convert::{ConversionOptions, Converter, Error, ProgressEvent, RunTally};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Stands in for ffmpeg and ffprobe.
///
/// ffprobe answers from `streams` keyed by file name; files without an entry
/// make ffprobe fail. ffmpeg writes a small WAV stub unless the source is
/// listed in `broken`, or the filter chain is listed in `missing_filters`.
/// Sources named in `vanishing` are deleted while being converted.
#[derive(Default)]
struct FakeToolchain {
    streams: HashMap<String, String>,
    broken: HashMap<String, String>,
    missing_filters: Vec<&'static str>,
    vanishing: Vec<&'static str>,
    conversions: RefCell<Vec<Vec<String>>>,
    probes: RefCell<Vec<String>>,
}

impl FakeToolchain {
    fn stream(mut self, file: &str, codec: &str, fmt: &str, rate: u32, bits: u32) -> Self {
        let json = format!(
            r#"{{"streams":[{{"codec_name":"{codec}","sample_fmt":"{fmt}","sample_rate":"{rate}","bits_per_raw_sample":"{bits}"}}]}}"#
        );
        self.streams.insert(file.to_string(), json);
        self
    }

    fn conversion_count(&self) -> usize {
        self.conversions.borrow().len()
    }
}

fn file_name(arg: &str) -> String {
    Path::new(arg)
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

fn failed(stderr: &str) -> ToolOutput {
    ToolOutput {
        success: false,
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl ToolRunner for FakeToolchain {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<ToolOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let program = file_name(&program.to_string_lossy());

        if program.starts_with("ffprobe") {
            let name = file_name(args.last().unwrap());
            self.probes.borrow_mut().push(name.clone());
            return Ok(match self.streams.get(&name) {
                Some(json) => ToolOutput {
                    success: true,
                    code: Some(0),
                    stdout: json.clone(),
                    stderr: String::new(),
                },
                None => failed("Invalid data found when processing input"),
            });
        }

        if args.first().map(String::as_str) == Some("-hide_banner") {
            return Ok(failed("At least one output file must be specified"));
        }

        self.conversions.borrow_mut().push(args.clone());
        let input = &args[args.iter().position(|a| a == "-i").unwrap() + 1];
        if let Some(stderr) = self.broken.get(&file_name(input)) {
            return Ok(failed(stderr));
        }
        if let Some(i) = args.iter().position(|a| a == "-af") {
            if self.missing_filters.contains(&args[i + 1].as_str()) {
                return Ok(failed("[AVFilterGraph @ 0x5555] No such filter: 'adeclick'"));
            }
        }
        fs::write(args.last().unwrap(), b"RIFF\0\0\0\0WAVEfmt ")?;
        if self.vanishing.contains(&file_name(input).as_str()) {
            fs::remove_file(input)?;
        }
        Ok(ToolOutput {
            success: true,
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

struct Fixture {
    music: TempDir,
    _tools: TempDir,
    options: ConversionOptions,
}

fn fixture() -> Fixture {
    let music = TempDir::new().unwrap();
    let tools = TempDir::new().unwrap();
    let suffix = std::env::consts::EXE_SUFFIX;
    let ffmpeg = tools.path().join(format!("ffmpeg{suffix}"));
    let ffprobe = tools.path().join(format!("ffprobe{suffix}"));
    fs::write(&ffmpeg, b"").unwrap();
    fs::write(&ffprobe, b"").unwrap();
    let options = ConversionOptions {
        input_dir: music.path().to_path_buf(),
        ffmpeg_path: Some(ffmpeg),
        ffprobe_path: None,
        ..Default::default()
    };
    Fixture {
        music,
        _tools: tools,
        options,
    }
}

impl Fixture {
    fn add(&self, name: &str) -> PathBuf {
        let path = self.music.path().join(name);
        fs::write(&path, b"audio").unwrap();
        path
    }

    fn run(&self, runner: FakeToolchain) -> (Result<RunTally, Error>, Vec<ProgressEvent>, FakeToolchain) {
        let converter = Converter::with_runner(self.options.clone(), runner);
        let mut events = Vec::new();
        let result = converter.run(|e| events.push(e));
        (result, events, converter.into_runner())
    }

    fn wav_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.music.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".wav"))
            .collect();
        names.sort();
        names
    }
}

#[test]
fn cyrillic_high_res_mp3_becomes_trek_wav() {
    let fx = fixture();
    let source = fx.add("трек.mp3");
    let runner = FakeToolchain::default().stream("трек.mp3", "mp3", "s32p", 96_000, 24);

    let (result, events, runner) = fx.run(runner);
    let tally = result.unwrap();

    assert_eq!(tally.success_count, 1);
    assert_eq!(tally.error_count, 0);
    assert!(!source.exists(), "original must be removed");
    assert_eq!(fx.wav_files(), ["trek.wav"]);

    // The freshly written trek.wav is not picked up again by the WAV pass.
    assert_eq!(runner.conversion_count(), 1);
    let conversions = runner.conversions.borrow();
    let args = &conversions[0];
    let joined = args.join(" ");
    assert!(joined.contains("-c:a pcm_s16le"), "{joined}");
    assert!(joined.contains("-ar 48000"), "{joined}");
    assert!(args.iter().any(|a| a == PRIMARY_FILTER_CHAIN), "{joined}");

    let target = fs::canonicalize(fx.music.path()).unwrap().join("trek.wav");
    assert!(matches!(&events[1], ProgressEvent::NewName { target: t } if *t == target));
    assert!(matches!(&events[2], ProgressEvent::Converted { target: t, .. } if *t == target));
    assert_eq!(events.len(), 4);
    assert_eq!(events[3], ProgressEvent::Finished(tally));
}

#[test]
fn colliding_names_get_numbered() {
    let fx = fixture();
    fx.add("a!.mp3");
    fx.add("a@.mp3");

    let (result, events, _) = fx.run(FakeToolchain::default());
    let tally = result.unwrap();

    assert_eq!(tally.success_count, 2);
    assert_eq!(fx.wav_files(), ["a.wav", "a_1.wav"]);
    // Two files, three events each, plus the summary.
    assert_eq!(events.len(), 7);
}

#[test]
fn untitled_names_are_numbered_without_underscore() {
    let fx = fixture();
    fx.add("!!!.mp3");
    fx.add("???.ogg");

    let (result, _, _) = fx.run(FakeToolchain::default());
    assert_eq!(result.unwrap().success_count, 2);
    assert_eq!(fx.wav_files(), ["untitled.wav", "untitled1.wav"]);
}

#[test]
fn missing_transcoder_aborts_before_touching_files() {
    let mut fx = fixture();
    let source = fx.add("song.mp3");
    fx.options.ffmpeg_path = Some(fx.music.path().join("no-such-ffmpeg"));

    let (result, events, runner) = fx.run(FakeToolchain::default());

    assert!(matches!(result, Err(Error::TranscoderNotFound(_))));
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ProgressEvent::Fatal(_)));
    assert!(source.exists());
    assert_eq!(runner.conversion_count(), 0);
    assert!(runner.probes.borrow().is_empty());
}

#[test]
fn missing_directory_aborts_with_one_fatal_event() {
    let mut fx = fixture();
    fx.options.input_dir = fx.music.path().join("gone");

    let (result, events, runner) = fx.run(FakeToolchain::default());

    assert!(matches!(result, Err(Error::MissingDirectory(_))));
    assert_eq!(events.len(), 1);
    assert!(events[0].to_string().contains("not a valid directory"));
    assert_eq!(runner.conversion_count(), 0);
}

#[cfg(target_os = "linux")]
#[test]
fn read_only_directory_aborts_with_one_fatal_event() {
    let mut fx = fixture();
    // Not writable even for root.
    fx.options.input_dir = PathBuf::from("/proc/self");

    let (result, events, runner) = fx.run(FakeToolchain::default());

    assert!(matches!(result, Err(Error::NotWritable { .. })));
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ProgressEvent::Fatal(_)));
    assert_eq!(runner.conversion_count(), 0);
    assert!(runner.probes.borrow().is_empty());
}

#[test]
fn source_deletion_error_is_counted_and_run_continues() {
    let fx = fixture();
    fx.add("gone.mp3");
    fx.add("keep.mp3");
    let runner = FakeToolchain {
        vanishing: vec!["gone.mp3"],
        ..Default::default()
    };

    let (result, events, _) = fx.run(runner);
    let tally = result.unwrap();

    assert_eq!(tally.success_count, 1);
    assert_eq!(tally.error_count, 1);
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::Failed { source, .. } if source.ends_with("gone.mp3")
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::Converted { source, .. } if source.ends_with("keep.mp3")
    )));
    // The converted output of the failed file is kept.
    assert_eq!(fx.wav_files(), ["gone.wav", "keep.wav"]);
    assert_eq!(events.last(), Some(&ProgressEvent::Finished(tally)));
}

#[test]
fn failed_conversion_is_counted_and_run_continues() {
    let fx = fixture();
    let bad = fx.add("bad.mp3");
    fx.add("good.mp3");
    let mut runner = FakeToolchain::default();
    runner.broken.insert(
        "bad.mp3".into(),
        "bad.mp3: Invalid data found when processing input".into(),
    );

    let (result, events, runner) = fx.run(runner);
    let tally = result.unwrap();

    assert_eq!(tally.success_count, 1);
    assert_eq!(tally.error_count, 1);
    assert!(bad.exists(), "failed source is kept");
    assert_eq!(fx.wav_files(), ["good.wav"]);
    // No fallback for non-filter errors: one call per file.
    assert_eq!(runner.conversion_count(), 2);
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::Failed { reason, .. } if reason.contains("Invalid data")
    )));
}

#[test]
fn unsupported_filters_fall_back() {
    let fx = fixture();
    fx.add("old.mp3");
    let runner = FakeToolchain {
        missing_filters: vec![PRIMARY_FILTER_CHAIN],
        ..Default::default()
    };

    let (result, _, runner) = fx.run(runner);

    assert_eq!(result.unwrap().success_count, 1);
    assert_eq!(runner.conversion_count(), 2);
    assert_eq!(fx.wav_files(), ["old.wav"]);
}

#[test]
fn lossless_cd_quality_flac_is_not_filtered() {
    let fx = fixture();
    fx.add("Album Track.flac");
    let runner = FakeToolchain::default().stream("Album Track.flac", "flac", "s16", 44_100, 16);

    let (result, _, runner) = fx.run(runner);

    assert_eq!(result.unwrap().success_count, 1);
    let args = runner.conversions.borrow()[0].clone();
    assert!(!args.iter().any(|a| a == "-af"));
    assert!(!args.iter().any(|a| a == "-c:a"));
    assert!(!args.iter().any(|a| a == "-ar"));
    assert_eq!(fx.wav_files(), ["albumtrack.wav"]);
}

#[test]
fn canonical_wav_is_left_alone() {
    let fx = fixture();
    let wav = fx.add("Ready.wav");
    let runner = FakeToolchain::default().stream("Ready.wav", "pcm_s16le", "s16", 44_100, 16);

    let (result, events, runner) = fx.run(runner);
    let tally = result.unwrap();

    assert_eq!(tally.unchanged_count, 1);
    assert_eq!(tally.success_count, 0);
    assert!(wav.exists());
    assert_eq!(runner.conversion_count(), 0);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ProgressEvent::Unchanged { .. }));
}

#[test]
fn high_res_wav_never_overwrites_itself() {
    let fx = fixture();
    let wav = fx.add("song.wav");
    let runner = FakeToolchain::default().stream("song.wav", "pcm_s24le", "s32", 96_000, 24);

    let (result, _, runner) = fx.run(runner);

    assert_eq!(result.unwrap().success_count, 1);
    assert!(!wav.exists());
    assert_eq!(fx.wav_files(), ["song_1.wav"]);
    let conversions = runner.conversions.borrow();
    let args = &conversions[0];
    assert_ne!(args.last(), Some(&wav.to_string_lossy().into_owned()));
    // Probed once for the canonical check, the result is reused for planning.
    assert_eq!(runner.probes.borrow().len(), 1);
}
