//! Recorder - writes accepted records to a capture file.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use paddock_core::capture::CaptureFormat;
use paddock_core::protocol::{RecordType, RecordTypeMask, UDP_MAX_PACKET_SIZE};
use paddock_core::Record;

use super::RecordingError;

/// What to record and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingConfig {
    /// Capture filename inside the recordings directory
    pub filename: String,
    /// Record types written to the capture
    pub types: RecordTypeMask,
    pub format: CaptureFormat,
}

impl RecordingConfig {
    /// A config with nothing selected
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            types: RecordTypeMask::empty(),
            format: CaptureFormat::default(),
        }
    }

    pub fn with_format(mut self, format: CaptureFormat) -> Self {
        self.format = format;
        self
    }

    pub fn record_all(mut self) -> Self {
        self.types = RecordTypeMask::all();
        self
    }

    pub fn record(mut self, record_type: RecordType) -> Self {
        self.types |= RecordTypeMask::from(record_type);
        self
    }

    pub fn is_recording(&self, record_type: RecordType) -> bool {
        self.types.selects(record_type)
    }
}

/// Recording state as reported to the control surface
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<CaptureFormat>,
    pub types: Vec<RecordType>,
    pub records_written: u64,
    pub bytes_written: u64,
    pub write_failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// An open capture file
pub struct Recorder {
    config: RecordingConfig,
    path: PathBuf,
    writer: BufWriter<File>,
    scratch: Vec<u8>,
    records_written: u64,
    bytes_written: u64,
    write_failures: u64,
    started_at: DateTime<Utc>,
}

impl Recorder {
    /// Create a fresh capture file at `path`; an existing file is never
    /// overwritten.
    pub fn create(path: &Path, config: RecordingConfig) -> Result<Self, RecordingError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| RecordingError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            "Recording {:?} to {} ({})",
            config.types.record_types().collect::<Vec<_>>(),
            path.display(),
            config.format
        );

        Ok(Self {
            config,
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            scratch: Vec::with_capacity(UDP_MAX_PACKET_SIZE),
            records_written: 0,
            bytes_written: 0,
            write_failures: 0,
            started_at: Utc::now(),
        })
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` if its type is selected.
    ///
    /// Returns whether it was written. Failures are logged and only skip this
    /// record.
    pub fn record(&mut self, record: &Record) -> bool {
        if !self.config.is_recording(record.record_type()) {
            return false;
        }

        self.scratch.clear();
        if let Err(e) = self.config.format.encode_into(record, &mut self.scratch) {
            warn!("Cannot encode {} record: {}", record.record_type(), e);
            self.write_failures += 1;
            return false;
        }

        match self.writer.write_all(&self.scratch) {
            Ok(()) => {
                self.records_written += 1;
                self.bytes_written += self.scratch.len() as u64;
                true
            }
            Err(e) => {
                warn!("Capture write to {} failed: {}", self.path.display(), e);
                self.write_failures += 1;
                false
            }
        }
    }

    pub fn status(&self) -> RecordingStatus {
        RecordingStatus {
            active: true,
            filename: Some(self.config.filename.clone()),
            format: Some(self.config.format),
            types: self.config.types.record_types().collect(),
            records_written: self.records_written,
            bytes_written: self.bytes_written,
            write_failures: self.write_failures,
            started_at: Some(self.started_at),
        }
    }

    /// Flush and close the capture, returning the final status
    pub fn finish(mut self) -> RecordingStatus {
        if let Err(e) = self.writer.flush() {
            warn!("Final flush of {} failed: {}", self.path.display(), e);
            self.write_failures += 1;
        }

        let mut status = self.status();
        status.active = false;
        info!(
            "Recording to {} stopped: {} records, {} bytes",
            self.path.display(),
            status.records_written,
            status.bytes_written
        );
        if status.write_failures > 0 {
            debug!("{} capture writes failed", status.write_failures);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paddock_core::protocol::{MotionPayload, Packet, PacketHeader, HEADER_SIZE};
    use paddock_core::TaggedReader;
    use tempfile::TempDir;

    fn motion(frame: u32) -> Record {
        let header = PacketHeader {
            frame_identifier: frame,
            ..Default::default()
        };
        let mut body = MotionPayload::default();
        body.car_motion_data[0].g_force_lateral = 2.5;
        Packet::new(header, body).into()
    }

    #[test]
    fn test_selection() {
        let config = RecordingConfig::new("x.ftr").record(RecordType::MotionEx);
        assert!(config.is_recording(RecordType::MotionEx));
        assert!(!config.is_recording(RecordType::Motion));
        let all = RecordingConfig::new("y.ftr").record_all();
        assert!(all.is_recording(RecordType::CarDamage));
    }

    #[test]
    fn test_create_rejects_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taken.ftr");
        std::fs::write(&path, b"keep").unwrap();

        let result = Recorder::create(&path, RecordingConfig::new("taken.ftr"));
        assert!(matches!(result, Err(RecordingError::Io { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
    }

    #[test]
    fn test_tagged_capture_decodes_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lap.ftr");
        let config = RecordingConfig::new("lap.ftr").record(RecordType::Motion);
        let mut recorder = Recorder::create(&path, config).unwrap();

        let records = vec![motion(1), motion(2)];
        for record in &records {
            assert!(recorder.record(record));
        }
        let status = recorder.finish();
        assert_eq!(status.records_written, 2);
        assert!(!status.active);

        let data = std::fs::read(&path).unwrap();
        let decoded: Vec<Record> = TaggedReader::new(&data)
            .map(|entry| entry.unwrap().decode().unwrap())
            .collect();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_raw_capture() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lap.bin");
        let config = RecordingConfig::new("lap.bin")
            .record_all()
            .with_format(CaptureFormat::Raw);
        let mut recorder = Recorder::create(&path, config).unwrap();
        recorder.record(&motion(7));
        recorder.finish();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), RecordType::Motion.encoded_len());
        assert_eq!(data[6], RecordType::Motion.tag());
        assert_eq!(Record::from_bytes(&data).unwrap(), motion(7));
        assert!(data.len() > HEADER_SIZE);
    }

    #[test]
    fn test_unselected_type_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("none.ftr");
        let config = RecordingConfig::new("none.ftr");
        let mut recorder = Recorder::create(&path, config).unwrap();

        assert!(!recorder.record(&motion(1)));
        let status = recorder.finish();
        assert_eq!(status.records_written, 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
