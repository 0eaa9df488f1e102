//! Capture file manager.
//!
//! Resolves capture filenames inside the recordings directory, generates
//! names for new captures and lists existing ones.

use log::{debug, error};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use paddock_core::capture::CaptureFormat;

use super::RecordingError;

/// Default recordings directory, in the user's data directory
pub fn default_recordings_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "paddock", "paddock")
        .map(|dirs| dirs.data_dir().join("recordings"))
        .unwrap_or_else(|| PathBuf::from("./recordings"))
}

/// Information about a capture file
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureInfo {
    pub filename: String,
    /// File size in bytes
    pub size: u64,
    /// File modification time (Unix timestamp ms)
    pub modified_ms: u64,
    pub format: CaptureFormat,
}

pub struct CaptureManager {
    base_dir: PathBuf,
}

impl CaptureManager {
    pub fn new(base_dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&base_dir) {
            error!("Failed to create recordings directory: {}", e);
        } else {
            debug!("Recordings directory: {}", base_dir.display());
        }
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Full path of `filename`, which must name a file directly inside the
    /// recordings directory
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, RecordingError> {
        validate_filename(filename)?;
        Ok(self.base_dir.join(filename))
    }

    /// Generate a unique filename for a new capture
    pub fn generate_filename(&self, format: CaptureFormat) -> String {
        let now = chrono::Utc::now();
        let base_name = format!("session_{}", now.format("%Y%m%d_%H%M%S"));
        let extension = format.extension();

        let mut name = format!("{}.{}", base_name, extension);
        let mut counter = 1;
        while self.base_dir.join(&name).exists() {
            name = format!("{}_{}.{}", base_name, counter, extension);
            counter += 1;
        }

        name
    }

    /// All captures, newest first
    pub fn list(&self) -> Vec<CaptureInfo> {
        let mut captures = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.base_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if let Some(info) = capture_info(&path) {
                    captures.push(info);
                }
            }
        }

        captures.sort_by(|a, b| b.modified_ms.cmp(&a.modified_ms));
        captures
    }
}

/// Capture format implied by the file extension. Files without a known
/// extension are treated as raw streams.
pub fn format_of(path: &Path) -> CaptureFormat {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(CaptureFormat::from_extension)
        .unwrap_or(CaptureFormat::Raw)
}

fn capture_info(path: &Path) -> Option<CaptureInfo> {
    let extension = path.extension()?.to_str()?;
    let format = CaptureFormat::from_extension(extension)?;
    let filename = path.file_name()?.to_str()?.to_string();

    let metadata = fs::metadata(path).ok()?;
    let modified_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    Some(CaptureInfo {
        filename,
        size: metadata.len(),
        modified_ms,
        format,
    })
}

fn validate_filename(filename: &str) -> Result<(), RecordingError> {
    let invalid = filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
        || filename.contains("..");
    if invalid {
        return Err(RecordingError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}
