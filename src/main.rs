use anyhow::{Result, bail};
use audio_batch_wav_convert::{ConversionOptions, Converter, ProgressEvent};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// directory whose audio files are converted to WAV in place
    input: PathBuf,

    /// ffmpeg executable, default to searching PATH and common locations
    #[arg(long, env = "WAV_CONVERT_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    /// ffprobe executable, default to the one next to ffmpeg
    #[arg(long, env = "WAV_CONVERT_FFPROBE")]
    ffprobe: Option<PathBuf>,

    /// sources above this sample rate are resampled down to it
    #[arg(long, default_value_t = 48_000)]
    max_sample_rate: u32,
}

fn main() -> Result<()> {
    _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();

    // --- Configuration ---
    let options = ConversionOptions {
        input_dir: cli.input,
        ffmpeg_path: cli.ffmpeg,
        ffprobe_path: cli.ffprobe,
        max_sample_rate: cli.max_sample_rate,
    };

    info!("Starting WAV conversion with options:");
    info!("  Input Directory: {:?}", options.input_dir);
    match &options.ffmpeg_path {
        Some(p) => info!("  FFmpeg: {:?}", p),
        None => info!("  FFmpeg: Automatic"),
    }
    match &options.ffprobe_path {
        Some(p) => info!("  FFprobe: {:?}", p),
        None => info!("  FFprobe: Automatic"),
    }
    info!("  Max Sample Rate: {} Hz", options.max_sample_rate);
    info!("---");

    // The run lives on a worker thread, this thread only renders its events.
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        Converter::new(options).run(|event| {
            _ = tx.send(event);
        })
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .expect("Internal Error: Failed to set progress bar style"),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    for event in rx {
        if let ProgressEvent::Converting { source } = &event {
            spinner.set_message(source.display().to_string());
        }
        spinner.println(event.to_string());
    }
    spinner.finish_and_clear();

    let tally = match worker.join() {
        Ok(Ok(tally)) => tally,
        Ok(Err(e)) => {
            error!("Conversion failed: {}", e);
            return Err(e.into());
        }
        Err(_) => bail!("Conversion worker panicked"),
    };

    if tally.error_count > 0 {
        bail!("{} files failed to convert", tally.error_count);
    }
    info!("Conversion finished successfully!");
    Ok(())
}
