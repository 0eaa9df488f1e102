//! Telemetry capture and replay.
//!
//! This module provides functionality to:
//! - Record selected record types to capture files
//! - Replay captures back through the ingestion path
//! - Manage capture files (resolve, name, list)
//!
//! ## File Formats
//!
//! ```text
//! tagged (.ftr)                      raw (.bin)
//! ┌─────┬──────────┬───────────┐     ┌──────────┬───────────┐
//! │ tag │ header   │ payload   │     │ header   │ payload   │
//! ├─────┼──────────┼───────────┤     ├──────────┼───────────┤
//! │ tag │ header   │ payload   │     │ header   │ payload   │
//! └─────┴──────────┴───────────┘     └──────────┴───────────┘
//!  1 B    29 B      per type          the game's byte stream
//! ```

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod manager;
pub mod player;
pub mod recorder;

pub use manager::{default_recordings_dir, CaptureInfo, CaptureManager};
pub use player::{ReplayConfig, ReplaySummary, Replayer};
pub use recorder::{Recorder, RecordingConfig, RecordingStatus};

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Already recording to {0}")]
    AlreadyActive(String),
    #[error("No recording is active")]
    NotActive,
    #[error("Invalid capture filename {0:?}")]
    InvalidFilename(String),
    #[error("Capture file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Cannot open capture {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Replay I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Telemetry source did not switch to replay within {0:?}")]
    SwitchTimeout(Duration),
    #[error("A replay is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Capture(#[from] RecordingError),
}
