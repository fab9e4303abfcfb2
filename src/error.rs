use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions. Any of these aborts the run.
#[derive(Error, Debug)]
pub enum StitchError {
    #[error("directory '{}' does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("destination directory '{}' does not exist", .0.display())]
    DestinationNotFound(PathBuf),

    #[error("could not create destination directory '{}': {source}", path.display())]
    DestinationCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no video segments found under '{}'", .0.display())]
    NoSegmentsFound(PathBuf),

    #[error("failed to write concat manifest in '{}': {source}", dir.display())]
    ManifestWrite {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "muxer '{}' could not be executed: {reason}. Install ffmpeg (https://ffmpeg.org/download.html) and make sure it is on PATH, or pass --ffmpeg <path>",
        program.display()
    )]
    MuxerNotFound { program: PathBuf, reason: String },

    #[error("muxer failed ({}) after opening {opened}/{total} segments", exit_description(.exit_code))]
    MuxerNonZeroExit {
        exit_code: Option<i32>,
        opened: usize,
        total: usize,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recoverable conditions, collected and reported once at the end of a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunWarning {
    #[error("could not get size of {file}: {reason}")]
    StatFailed { file: String, reason: String },

    #[error("skipped unreadable entry: {0}")]
    ScanEntrySkipped(String),

    #[error("skipped {path}: {reason}, cannot be listed for the muxer")]
    SegmentPathUnusable { path: String, reason: &'static str },

    #[error("output file has a path specified, ignoring destination folder '{}'", .0.display())]
    DestinationIgnored(PathBuf),

    #[error("output file '{}' is inside the source tree, left out of the input list", .0.display())]
    OutputExcluded(PathBuf),

    #[error("could not remove concat manifest '{}': {reason}", path.display())]
    ManifestCleanup { path: PathBuf, reason: String },
}

fn exit_description(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code: {}", code),
        None => "terminated by signal".to_string(),
    }
}
