//! # Paddock Server
//!
//! Racing telemetry server: listens for the game's UDP telemetry stream,
//! keeps a rolling history per record type, pushes every record to
//! WebSocket subscribers and records or replays capture files.
//!
//! ## Architecture
//!
//! Record decoding and framing live in [`paddock_core`]; this crate owns the
//! sockets, the shared state and the tasks.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     paddock-server                       │
//! │                                                          │
//! │  live UDP ──┐                                            │
//! │             ├─► SourceMux ─► StreamFramer ─► PacketStore │
//! │  loopback ──┘     ▲            (core)         │    │     │
//! │      ▲            │ switch                    │    ▼     │
//! │      │            │                           │ Recorder │
//! │  Replayer ────────┘                           ▼          │
//! │                                        BroadcastHub      │
//! │                                          │  │  │         │
//! │                                    WebSocket subscribers │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`Pipeline`] - constructs and owns the shared components
//! - [`source::SourceMux`] - live/replay source switching
//! - [`store::PacketStore`] - bounded histories and forwarding
//! - [`hub::BroadcastHub`] - non-blocking fan-out to subscribers
//! - [`recording`] - capture files, recorder and replayer
//!
//! ## Example: Starting the Pipeline
//!
//! ```rust,no_run
//! use clap::Parser;
//! use paddock_server::{Cli, Pipeline, PipelineConfig};
//! use tokio_graceful_shutdown::Toplevel;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let args = Cli::parse_from(["paddock-server", "--telemetry-port", "20777"]);
//!
//!     Toplevel::new(|s| async move {
//!         let pipeline = Pipeline::new(&s, PipelineConfig::from(&args)).unwrap();
//!         // Start web server, etc.
//!     })
//!     .catch_signals()
//!     .handle_shutdown_requests(Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! }
//! ```

use clap::Parser;
use log::{error, info, warn};
use serde::Serialize;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};

use paddock_core::capture::CaptureFormat;
use paddock_core::protocol::{RecordType, RecordTypeMask};

pub mod hub;
pub mod ingest;
pub mod network;
pub mod recording;
pub mod source;
pub mod store;

use hub::{BroadcastHub, HubConfig, Sink, SubscriberId};
use ingest::Ingest;
use recording::{
    default_recordings_dir, CaptureInfo, CaptureManager, RecordingConfig, RecordingError,
    RecordingStatus, ReplayConfig, ReplayError, Replayer,
};
use source::{ActiveSource, MuxConfig, SourceControl, SourceMux};
use store::{PacketStore, StoreConfig, StoreSnapshot, MAX_CAPACITY, MIN_CAPACITY};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Port for webserver
    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// UDP port the game sends telemetry to
    #[arg(short, long, default_value_t = source::DEFAULT_TELEMETRY_PORT)]
    pub telemetry_port: u16,

    /// Loopback UDP port used while replaying a capture
    #[arg(long, default_value_t = source::DEFAULT_REPLAY_PORT)]
    pub replay_port: u16,

    /// Records kept per record type (16 to 1024)
    #[arg(short, long, default_value_t = store::DEFAULT_CAPACITY)]
    pub capacity: usize,

    /// Directory holding capture files
    #[arg(short, long)]
    pub recordings_dir: Option<PathBuf>,

    /// Receive timeout in milliseconds; source switches happen at timeouts
    #[arg(long, default_value_t = 1000)]
    pub recv_timeout_ms: u64,

    /// Outbound queue length per WebSocket subscriber
    #[arg(long, default_value_t = hub::DEFAULT_QUEUE_SIZE)]
    pub queue_size: usize,

    /// Minimum milliseconds between two messages to one subscriber
    #[arg(long, default_value_t = 8)]
    pub tick_ms: u64,

    /// Milliseconds between replayed datagrams
    #[arg(long, default_value_t = 50)]
    pub replay_interval_ms: u64,

    /// Write the log to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Typed configuration of every pipeline component
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub mux: MuxConfig,
    pub store: StoreConfig,
    pub hub: HubConfig,
    pub replay: ReplayConfig,
    pub recordings_dir: Option<PathBuf>,
}

impl From<&Cli> for PipelineConfig {
    fn from(args: &Cli) -> Self {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let capacity = args.capacity.clamp(MIN_CAPACITY, MAX_CAPACITY);
        if capacity != args.capacity {
            warn!("History capacity {} clamped to {}", args.capacity, capacity);
        }

        PipelineConfig {
            mux: MuxConfig {
                live_addr: SocketAddr::new(any, args.telemetry_port),
                replay_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), args.replay_port),
                recv_timeout: Duration::from_millis(args.recv_timeout_ms.max(1)),
            },
            store: StoreConfig { capacity },
            hub: HubConfig {
                queue_size: args.queue_size,
                tick: Duration::from_millis(args.tick_ms),
            },
            replay: ReplayConfig {
                chunk_interval: Duration::from_millis(args.replay_interval_ms),
                ..Default::default()
            },
            recordings_dir: args.recordings_dir.clone(),
        }
    }
}

/// Parameters of a recording request; unset fields get defaults
#[derive(Debug, Clone, Default)]
pub struct RecordingRequest {
    pub filename: Option<String>,
    /// Record types to capture, all types when `None`
    pub types: Option<Vec<RecordType>>,
    pub format: Option<CaptureFormat>,
}

/// Current input source plus whether a replay task is running
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    #[serde(flatten)]
    pub active: ActiveSource,
    pub replaying: bool,
}

/// Handle to the running pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<PacketStore>,
    hub: Arc<BroadcastHub>,
    control: SourceControl,
    captures: Arc<CaptureManager>,
    replay_config: ReplayConfig,
    replay_running: Arc<AtomicBool>,
}

impl Pipeline {
    /// Bind the telemetry socket and start the ingestion subsystem
    pub fn new(subsystem: &SubsystemHandle, config: PipelineConfig) -> io::Result<Self> {
        let (mux, control) = SourceMux::bind(config.mux)?;
        let pipeline = Self::with_parts(
            config.store,
            config.hub,
            config.replay,
            config.recordings_dir,
            control,
        );

        let ingest = Ingest::new(mux, pipeline.store.clone());
        subsystem.start(SubsystemBuilder::new("Ingest", |subsys| {
            ingest.run(subsys)
        }));
        Ok(pipeline)
    }

    /// Build a pipeline around an existing source control handle. The caller
    /// drives the multiplexer.
    pub fn with_parts(
        store: StoreConfig,
        hub: HubConfig,
        replay_config: ReplayConfig,
        recordings_dir: Option<PathBuf>,
        control: SourceControl,
    ) -> Self {
        let hub = Arc::new(BroadcastHub::new(hub));
        let store = Arc::new(PacketStore::new(store, hub.clone()));
        let captures = Arc::new(CaptureManager::new(
            recordings_dir.unwrap_or_else(default_recordings_dir),
        ));

        Pipeline {
            store,
            hub,
            control,
            captures,
            replay_config,
            replay_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> &Arc<PacketStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn captures(&self) -> &CaptureManager {
        &self.captures
    }

    /// Open a new capture. Returns the status of the started recording.
    pub fn start_recording(
        &self,
        request: RecordingRequest,
    ) -> Result<RecordingStatus, RecordingError> {
        let format = request.format.unwrap_or_default();
        let filename = match request.filename {
            Some(filename) => filename,
            None => self.captures.generate_filename(format),
        };
        let path = self.captures.resolve(&filename)?;

        let mut config = RecordingConfig::new(filename).with_format(format);
        config.types = match request.types {
            Some(types) => types.into_iter().collect::<RecordTypeMask>(),
            None => RecordTypeMask::all(),
        };

        self.store.start_recording(&path, config)?;
        Ok(self.store.recording_status())
    }

    pub fn stop_recording(&self) -> Result<RecordingStatus, RecordingError> {
        self.store.stop_recording().ok_or(RecordingError::NotActive)
    }

    pub fn recording_status(&self) -> RecordingStatus {
        self.store.recording_status()
    }

    /// Start replaying `filename` in the background.
    ///
    /// Only checks that the file exists and no replay is running; the replay
    /// itself reports its outcome in the log.
    pub fn start_replay(&self, filename: &str) -> Result<PathBuf, ReplayError> {
        let path = self.captures.resolve(filename)?;
        if !path.is_file() {
            return Err(ReplayError::Open {
                path,
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        if self.replay_running.swap(true, Ordering::AcqRel) {
            return Err(ReplayError::AlreadyRunning);
        }

        let replayer = Replayer::new(
            self.replay_config.clone(),
            self.store.clone(),
            self.control.clone(),
        );
        let running = self.replay_running.clone();
        let replay_path = path.clone();
        tokio::spawn(async move {
            if let Err(e) = replayer.replay(&replay_path).await {
                error!("Replay of {} failed: {}", replay_path.display(), e);
            }
            running.store(false, Ordering::Release);
        });

        info!("Replay of {} started", path.display());
        Ok(path)
    }


    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe<S: Sink>(&self, sink: S) -> SubscriberId {
        self.hub.subscribe(sink)
    }

    pub fn source_status(&self) -> SourceStatus {
        SourceStatus {
            active: self.control.active(),
            replaying: self.replay_running.load(Ordering::Acquire),
        }
    }

    pub fn list_captures(&self) -> Vec<CaptureInfo> {
        self.captures.list()
    }
}
