use std::path::PathBuf;

/// Failure of a single probing strategy. Never leaves the prober.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("{tool} could not be started: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited unsuccessfully: {stderr}")]
    Exit { tool: String, stderr: String },
    #[error("ffprobe JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No audio stream found")]
    NoAudioStream,
    #[error("Prober executable is not available")]
    Unavailable,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Input path is not a valid directory: {0:?}")]
    MissingDirectory(PathBuf),
    #[error("No write permission for directory {path:?}: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("FFmpeg not found: {0}")]
    TranscoderNotFound(String),
    #[error("I/O error during processing of {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
