//! Packet store.
//!
//! Keeps a bounded history per decoded record type and forwards every
//! appended record to the broadcast hub and, when one is open, the recorder.
//! All of it happens under one write lock, so the hub and the capture see
//! records in append order.

use log::{debug, info, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, RwLock};

use paddock_core::protocol::{RecordType, RECORD_TYPE_COUNT};
use paddock_core::Record;
use strum::IntoEnumIterator;

use crate::hub::{BroadcastHub, Payload};
use crate::recording::{Recorder, RecordingConfig, RecordingError, RecordingStatus};

pub const DEFAULT_CAPACITY: usize = 128;
pub const MIN_CAPACITY: usize = 16;
pub const MAX_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Records kept per record type
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

struct StoreInner {
    histories: [VecDeque<Record>; RECORD_TYPE_COUNT],
    recorder: Option<Recorder>,
}

impl StoreInner {
    fn history(&self, record_type: RecordType) -> &VecDeque<Record> {
        &self.histories[record_type.tag() as usize]
    }
}

pub struct PacketStore {
    capacity: usize,
    inner: RwLock<StoreInner>,
    hub: Arc<BroadcastHub>,
}

impl PacketStore {
    pub fn new(config: StoreConfig, hub: Arc<BroadcastHub>) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            capacity,
            inner: RwLock::new(StoreInner {
                histories: std::array::from_fn(|_| VecDeque::with_capacity(capacity)),
                recorder: None,
            }),
            hub,
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Append `record` to its history, evicting the oldest entry when full,
    /// then hand it to the hub and the recorder.
    pub fn append(&self, record: Record) {
        let payload = self.serialize_for_hub(&record);

        let mut guard = self.inner.write().unwrap();
        let inner = &mut *guard;
        if let Some(recorder) = inner.recorder.as_mut() {
            recorder.record(&record);
        }
        if let Some(payload) = payload {
            self.hub.publish(payload);
        }

        let history = &mut inner.histories[record.record_type().tag() as usize];
        if history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(record);
    }

    fn serialize_for_hub(&self, record: &Record) -> Option<Payload> {
        if self.hub.subscriber_count() == 0 {
            return None;
        }
        match serde_json::to_vec(record) {
            Ok(json) => Some(Payload::from(json)),
            Err(e) => {
                warn!("Cannot serialize {} record: {}", record.record_type(), e);
                None
            }
        }
    }

    /// A consistent copy of every decoded history
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().unwrap();
        let histories = RecordType::iter()
            .filter(|rt| rt.is_decoded())
            .map(|rt| (rt, inner.history(rt).iter().cloned().collect()))
            .collect();
        StoreSnapshot { histories }
    }

    /// Copy of one history, oldest first
    pub fn history(&self, record_type: RecordType) -> Vec<Record> {
        let inner = self.inner.read().unwrap();
        inner.history(record_type).iter().cloned().collect()
    }

    pub fn len(&self, record_type: RecordType) -> usize {
        self.inner.read().unwrap().history(record_type).len()
    }

    /// Clear every history
    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap();
        for history in inner.histories.iter_mut() {
            history.clear();
        }
        debug!("Packet store cleared");
    }

    /// Open a capture at `path`. Fails if a recording is already active; the
    /// active one is left untouched.
    pub fn start_recording(
        &self,
        path: &Path,
        config: RecordingConfig,
    ) -> Result<(), RecordingError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(active) = inner.recorder.as_ref() {
            let filename = active.config().filename.clone();
            return Err(RecordingError::AlreadyActive(filename));
        }
        inner.recorder = Some(Recorder::create(path, config)?);
        Ok(())
    }

    /// Close the active capture and return its final status, or `None` if no
    /// recording was active.
    pub fn stop_recording(&self) -> Option<RecordingStatus> {
        let recorder = self.inner.write().unwrap().recorder.take();
        match recorder {
            Some(recorder) => Some(recorder.finish()),
            None => {
                warn!("Stop requested but no recording is active");
                None
            }
        }
    }

    pub fn recording_status(&self) -> RecordingStatus {
        self.inner
            .read()
            .unwrap()
            .recorder
            .as_ref()
            .map(Recorder::status)
            .unwrap_or_default()
    }
}

impl Drop for PacketStore {
    fn drop(&mut self) {
        let recorder = match self.inner.get_mut() {
            Ok(inner) => inner.recorder.take(),
            Err(_) => None,
        };
        if let Some(recorder) = recorder {
            info!("Closing active recording {}", recorder.path().display());
            recorder.finish();
        }
    }
}

/// Copy of the decoded histories, serialized as a map from history name to
/// the records, oldest first
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    histories: Vec<(RecordType, Vec<Record>)>,
}

impl StoreSnapshot {
    pub fn get(&self, record_type: RecordType) -> &[Record] {
        self.histories
            .iter()
            .find(|(rt, _)| *rt == record_type)
            .map(|(_, records)| records.as_slice())
            .unwrap_or_default()
    }

    pub fn total_records(&self) -> usize {
        self.histories
            .iter()
            .map(|(_, records)| records.len())
            .sum()
    }
}

impl Serialize for StoreSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.histories.len()))?;
        for (record_type, records) in &self.histories {
            map.serialize_entry(record_type.history_name(), records)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use paddock_core::protocol::{CarTelemetryPayload, MotionPayload, Packet, PacketHeader};
    use paddock_core::TaggedReader;
    use tempfile::TempDir;

    fn store(capacity: usize) -> PacketStore {
        let hub = Arc::new(BroadcastHub::new(HubConfig::default()));
        PacketStore::new(StoreConfig { capacity }, hub)
    }

    fn header(frame: u32) -> PacketHeader {
        PacketHeader {
            frame_identifier: frame,
            ..Default::default()
        }
    }

    fn motion(frame: u32) -> Record {
        Packet::new(header(frame), MotionPayload::default()).into()
    }

    fn telemetry(frame: u32) -> Record {
        let body = CarTelemetryPayload::default();
        Packet::new(header(frame), body).into()
    }

    fn frames(records: &[Record]) -> Vec<u32> {
        records
            .iter()
            .map(|r| r.header().frame_identifier)
            .collect()
    }

    #[test]
    fn test_fifo_eviction() {
        let store = store(16);
        for frame in 0..17 {
            store.append(motion(frame));
        }

        assert_eq!(store.len(RecordType::Motion), 16);
        assert_eq!(
            frames(&store.history(RecordType::Motion)),
            (1..17).collect::<Vec<_>>()
        );
        assert_eq!(store.len(RecordType::CarTelemetry), 0);
    }

    #[test]
    fn test_reset() {
        let store = store(16);
        store.append(motion(1));
        store.append(telemetry(1));
        store.reset();
        assert_eq!(store.snapshot().total_records(), 0);
    }

    #[test]
    fn test_recording_gating() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lap.ftr");
        let store = store(16);
        let config = RecordingConfig::new("lap.ftr").record(RecordType::Motion);
        store.start_recording(&path, config).unwrap();

        store.append(motion(1));
        store.append(telemetry(1));
        let status = store.stop_recording().unwrap();
        assert_eq!(status.records_written, 1);

        let data = std::fs::read(&path).unwrap();
        let entries: Vec<_> = TaggedReader::new(&data).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].as_ref().unwrap().record_type, RecordType::Motion);
    }

    #[test]
    fn test_double_start_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(16);
        let (a, b) = (dir.path().join("a.ftr"), dir.path().join("b.ftr"));
        let first = RecordingConfig::new("a.ftr").record_all();
        store.start_recording(&a, first).unwrap();

        let second = RecordingConfig::new("b.ftr").record_all();
        let result = store.start_recording(&b, second);
        assert!(matches!(result, Err(RecordingError::AlreadyActive(name)) if name == "a.ftr"));
        assert!(!b.exists());

        // The first recording keeps going
        store.append(motion(1));
        assert_eq!(store.recording_status().records_written, 1);
        assert_eq!(store.recording_status().filename.as_deref(), Some("a.ftr"));
    }

    #[test]
    fn test_stop_without_recording() {
        let store = store(16);
        assert!(store.stop_recording().is_none());
        assert!(!store.recording_status().active);
    }

    #[test]
    fn test_snapshot_keys() {
        let store = store(16);
        store.append(motion(3));
        store.append(telemetry(4));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get(RecordType::Motion).len(), 1);
        assert!(snapshot.get(RecordType::Session).is_empty());

        let json = serde_json::to_value(&snapshot).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 6);
        assert_eq!(
            json["CarMotionDataPackets"][0]["Header"]["FrameIdentifier"],
            3
        );
        assert_eq!(
            json["CarTelemetryDataPackets"][0]["Header"]["FrameIdentifier"],
            4
        );
        assert!(json["LapDataPackets"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_publishes_json() {
        use crate::hub::{Sink, SinkError};
        use async_trait::async_trait;
        use tokio::sync::mpsc;

        struct Collect(mpsc::UnboundedSender<Vec<u8>>);

        #[async_trait]
        impl Sink for Collect {
            fn describe(&self) -> String {
                "collect".into()
            }
            async fn send(&mut self, payload: &[u8]) -> Result<(), SinkError> {
                self.0.send(payload.to_vec()).map_err(|_| SinkError::Closed)
            }
            async fn closed(&mut self) {
                std::future::pending::<()>().await
            }
        }

        let store = store(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.hub().subscribe(Collect(tx));

        store.append(motion(9));
        let json: serde_json::Value = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(json["Header"]["FrameIdentifier"], 9);
        assert_eq!(json["Body"]["CarMotionData"].as_array().unwrap().len(), 22);
    }
}
