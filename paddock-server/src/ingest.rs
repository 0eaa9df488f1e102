//! Ingestion subsystem: receive, frame, decode, store.
//!
//! This is the only task that blocks on the telemetry sockets. A receive
//! error other than a timeout ends it with an error.

use log::{debug, error, info, trace, warn};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio_graceful_shutdown::SubsystemHandle;

use paddock_core::protocol::UDP_MAX_PACKET_SIZE;
use paddock_core::{Frame, StreamFramer};

use crate::source::{Incoming, SourceMux};
use crate::store::PacketStore;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Telemetry receive failed: {0}")]
    Io(#[from] io::Error),
}

pub struct Ingest {
    mux: SourceMux,
    framer: StreamFramer,
    store: Arc<PacketStore>,
    buf: Vec<u8>,
}

impl Ingest {
    pub fn new(mux: SourceMux, store: Arc<PacketStore>) -> Self {
        Self {
            mux,
            framer: StreamFramer::new(),
            store,
            buf: vec![0u8; UDP_MAX_PACKET_SIZE],
        }
    }

    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), IngestError> {
        info!("Telemetry ingestion started on {}", self.mux.live_addr()?);

        loop {
            tokio::select! { biased;
                _ = subsys.on_shutdown_requested() => {
                    info!("Telemetry ingestion shutdown requested");
                    return Ok(());
                },
                r = self.poll() => {
                    if let Err(e) = r {
                        error!("Telemetry ingestion stopped: {}", e);
                        return Err(e);
                    }
                }
            }
        }
    }

    /// One receive followed by draining every complete record from the
    /// framer. Returns the number of records appended to the store.
    pub async fn poll(&mut self) -> Result<usize, IngestError> {
        match self.mux.receive(&mut self.buf).await? {
            Incoming::Datagram { len, from } => {
                trace!("{} bytes from {}", len, from);
                self.framer.feed(&self.buf[..len]);
                Ok(self.drain())
            }
            Incoming::Timeout => Ok(0),
            Incoming::Switched(source) => {
                if self.framer.buffered() > 0 {
                    debug!(
                        "Discarding {} buffered bytes on switch to {} source",
                        self.framer.buffered(),
                        source
                    );
                }
                self.framer.clear();
                Ok(0)
            }
        }
    }

    fn drain(&mut self) -> usize {
        let mut appended = 0;
        loop {
            match self.framer.next_frame() {
                Frame::Record(record) => {
                    self.store.append(record);
                    appended += 1;
                }
                Frame::Skipped(record_type) => {
                    debug!("Skipped {} record", record_type);
                }
                Frame::UnknownType { tag, discarded } => {
                    debug!("Unknown record type {}, discarded {} bytes", tag, discarded);
                    break;
                }
                Frame::Dropped { record_type, error } => {
                    warn!("Dropped malformed {} record: {}", record_type, error);
                }
                Frame::NeedMoreData => break,
            }
        }
        appended
    }
}
