use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use paddock_core::protocol::{
    CarTelemetryPayload, EventPayload, MotionPayload, Packet, PacketHeader, RecordType,
};
use paddock_core::{CaptureFormat, Record, TaggedReader};
use paddock_server::hub::{BroadcastHub, HubConfig};
use paddock_server::ingest::Ingest;
use paddock_server::recording::{RecordingConfig, ReplayConfig, Replayer};
use paddock_server::source::{MuxConfig, Source, SourceControl, SourceMux};
use paddock_server::store::{PacketStore, StoreConfig};

struct Harness {
    store: Arc<PacketStore>,
    control: SourceControl,
    live_addr: SocketAddr,
    ingest: JoinHandle<()>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.ingest.abort();
    }
}

fn start() -> Harness {
    let hub = Arc::new(BroadcastHub::new(HubConfig::default()));
    let store = Arc::new(PacketStore::new(StoreConfig { capacity: 16 }, hub));
    let (mux, control) = SourceMux::bind(MuxConfig {
        live_addr: "127.0.0.1:0".parse().unwrap(),
        replay_addr: "127.0.0.1:0".parse().unwrap(),
        recv_timeout: Duration::from_millis(30),
    })
    .unwrap();
    let live_addr = mux.live_addr().unwrap();

    let mut ingest = Ingest::new(mux, store.clone());
    let ingest = tokio::spawn(async move {
        loop {
            ingest.poll().await.unwrap();
        }
    });

    Harness {
        store,
        control,
        live_addr,
        ingest,
    }
}

fn header(frame: u32) -> PacketHeader {
    PacketHeader {
        packet_format: 2023,
        game_year: 23,
        session_uid: 0xfeed,
        frame_identifier: frame,
        overall_frame_identifier: frame,
        ..Default::default()
    }
}

fn motion(frame: u32) -> Record {
    let mut body = MotionPayload::default();
    body.car_motion_data[3].world_position_x = frame as f32;
    Packet::new(header(frame), body).into()
}

fn telemetry(frame: u32) -> Record {
    let mut body = CarTelemetryPayload::default();
    body.car_telemetry_data[0].speed = 312;
    body.car_telemetry_data[0].throttle = 50.0;
    body.car_telemetry_data[0].brake = 25.0;
    body.car_telemetry_data[0].steer = -100.0;
    Packet::new(header(frame), body).into()
}

fn button_event(frame: u32) -> Record {
    let payload = EventPayload::Buttons(paddock_core::protocol::Buttons {
        button_status: 0x0001_0004,
    });
    Packet::new(header(frame), payload).into()
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn wait_for_len(store: &PacketStore, record_type: RecordType, len: usize) {
    let what: &'static str = record_type.into();
    eventually(what, || store.len(record_type) == len).await;
}

/// Records captured from one store come back through replay, framing and
/// decoding field for field.
#[tokio::test]
async fn replay_round_trip() {
    let dir = TempDir::new().unwrap();
    let capture = dir.path().join("stint.ftr");

    let records = vec![
        motion(1),
        telemetry(1),
        button_event(2),
        motion(2),
        telemetry(2),
    ];
    {
        let hub = Arc::new(BroadcastHub::new(HubConfig::default()));
        let store = PacketStore::new(StoreConfig::default(), hub);
        store
            .start_recording(&capture, RecordingConfig::new("stint.ftr").record_all())
            .unwrap();
        for record in &records {
            store.append(record.clone());
        }
        assert_eq!(store.stop_recording().unwrap().records_written, 5);
    }

    let harness = start();
    // Stale live data must not survive the replay
    harness.store.append(motion(99));

    let config = ReplayConfig {
        chunk_interval: Duration::from_millis(1),
        switch_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let replayer = Replayer::new(config, harness.store.clone(), harness.control.clone());
    let summary = replayer.replay(&capture).await.unwrap();
    assert!(summary.chunks_sent >= 2);
    assert_eq!(summary.chunks_failed, 0);

    let store = harness.store.clone();
    wait_for_len(&store, RecordType::Motion, 2).await;
    wait_for_len(&store, RecordType::CarTelemetry, 2).await;

    assert_eq!(
        store.history(RecordType::Motion),
        vec![motion(1), motion(2)]
    );
    assert_eq!(
        store.history(RecordType::CarTelemetry),
        vec![telemetry(1), telemetry(2)]
    );
    assert_eq!(store.history(RecordType::Event), vec![button_event(2)]);

    let control = harness.control.clone();
    let live = || control.active().source == Source::Live;
    eventually("switch back to live", live).await;
}

/// While replaying, datagrams on the live port never reach the store.
#[tokio::test]
async fn live_source_excluded_during_replay() {
    let harness = start();
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    harness.control.request_switch(Source::Replay);
    let active = harness
        .control
        .wait_for(Source::Replay, Duration::from_secs(2))
        .await
        .unwrap();
    let replay_addr = active.replay_addr.unwrap();

    sender
        .send_to(&motion(1).encode().unwrap(), harness.live_addr)
        .await
        .unwrap();
    sender
        .send_to(&telemetry(2).encode().unwrap(), replay_addr)
        .await
        .unwrap();

    let store = harness.store.clone();
    wait_for_len(&store, RecordType::CarTelemetry, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.len(RecordType::Motion), 0);

    // Back on live, the live port feeds the store again
    harness.control.request_switch(Source::Live);
    harness
        .control
        .wait_for(Source::Live, Duration::from_secs(2))
        .await
        .unwrap();
    sender
        .send_to(&motion(3).encode().unwrap(), harness.live_addr)
        .await
        .unwrap();
    wait_for_len(&store, RecordType::Motion, 1).await;
}

/// A raw capture is the plain wire stream and replays verbatim.
#[tokio::test]
async fn raw_capture_replays_verbatim() {
    let dir = TempDir::new().unwrap();
    let capture = dir.path().join("raw.bin");

    let mut stream = Vec::new();
    for frame in 0..6 {
        stream.extend(motion(frame).encode().unwrap());
    }
    std::fs::write(&capture, &stream).unwrap();

    let harness = start();
    let config = ReplayConfig {
        chunk_interval: Duration::from_millis(1),
        ..Default::default()
    };
    let replayer = Replayer::new(config, harness.store.clone(), harness.control.clone());
    let summary = replayer.replay(&capture).await.unwrap();
    assert_eq!(summary.bytes_sent, stream.len() as u64);

    let store = harness.store.clone();
    wait_for_len(&store, RecordType::Motion, 6).await;
    let frames: Vec<u32> = store
        .history(RecordType::Motion)
        .iter()
        .map(|r| r.header().frame_identifier)
        .collect();
    assert_eq!(frames, vec![0, 1, 2, 3, 4, 5]);
}

/// Recording keeps only selected types and every entry decodes back to the
/// appended record.
#[tokio::test]
async fn recorder_round_trip() {
    let dir = TempDir::new().unwrap();
    let capture = dir.path().join("telemetry.ftr");
    let harness = start();

    let config = RecordingConfig::new("telemetry.ftr")
        .record(RecordType::CarTelemetry)
        .with_format(CaptureFormat::Tagged);
    harness.store.start_recording(&capture, config).unwrap();
    harness.store.append(motion(1));
    harness.store.append(telemetry(1));
    harness.store.append(telemetry(2));
    harness.store.stop_recording().unwrap();

    let data = std::fs::read(&capture).unwrap();
    let decoded: Vec<Record> = TaggedReader::new(&data)
        .map(|entry| entry.unwrap().decode().unwrap())
        .collect();
    assert_eq!(decoded, vec![telemetry(1), telemetry(2)]);
}
