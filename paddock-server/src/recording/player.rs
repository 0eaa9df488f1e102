//! Replayer - feeds a capture back through the loopback telemetry socket.
//!
//! The replayer never touches the store directly, apart from clearing it once
//! the source has switched. Replayed bytes re-enter the pipeline exactly like
//! live datagrams.

use log::{debug, info, warn};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::net::UdpSocket;

use paddock_core::capture::CaptureFormat;
use paddock_core::protocol::{RecordType, UDP_MAX_PACKET_SIZE};

use super::manager::format_of;
use super::ReplayError;
use crate::source::{Source, SourceControl};
use crate::store::PacketStore;

pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_SWITCH_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_SEND_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Largest datagram sent to the loopback socket
    pub chunk_size: usize,
    /// Pause between two datagrams
    pub chunk_interval: Duration,
    /// Retries for a datagram that failed to send
    pub max_retries: u32,
    /// How long to wait for the multiplexer to apply the switch
    pub switch_timeout: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            chunk_size: UDP_MAX_PACKET_SIZE,
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
            max_retries: MAX_SEND_RETRIES,
            switch_timeout: DEFAULT_SWITCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub chunks_sent: u64,
    pub bytes_sent: u64,
    pub chunks_failed: u64,
}

pub struct Replayer {
    config: ReplayConfig,
    store: Arc<PacketStore>,
    control: SourceControl,
}

impl Replayer {
    pub fn new(config: ReplayConfig, store: Arc<PacketStore>, control: SourceControl) -> Self {
        Self {
            config,
            store,
            control,
        }
    }

    /// Replay the capture at `path`, then hand the pipeline back to the live
    /// source.
    ///
    /// Tagged captures have their tag bytes stripped and whole records packed
    /// into each datagram; raw captures are sent in fixed-size chunks as they
    /// are.
    pub async fn replay(&self, path: &Path) -> Result<ReplaySummary, ReplayError> {
        let file = File::open(path).await.map_err(|source| ReplayError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let format = format_of(path);

        self.control.request_switch(Source::Replay);
        let target = match self
            .control
            .wait_for(Source::Replay, self.config.switch_timeout)
            .await
            .and_then(|active| active.replay_addr)
        {
            Some(target) => target,
            None => {
                self.control.request_switch(Source::Live);
                return Err(ReplayError::SwitchTimeout(self.config.switch_timeout));
            }
        };

        // Anything appended from here on comes from the capture
        self.store.reset();
        info!("Replaying {} ({}) to {}", path.display(), format, target);

        let result = self.stream(BufReader::new(file), format, target).await;
        self.control.request_switch(Source::Live);

        match &result {
            Ok(summary) => info!(
                "Replay of {} finished: {} datagrams, {} bytes",
                path.display(),
                summary.chunks_sent,
                summary.bytes_sent
            ),
            Err(e) => warn!("Replay of {} aborted: {}", path.display(), e),
        }
        result
    }

    async fn stream<R: AsyncRead + Unpin>(
        &self,
        mut reader: R,
        format: CaptureFormat,
        target: SocketAddr,
    ) -> Result<ReplaySummary, ReplayError> {
        let socket = UdpSocket::bind(local_bind_addr(&target)).await?;
        let chunk_size = self.config.chunk_size.max(1);
        let mut chunk = Vec::with_capacity(chunk_size);
        let mut pending = Vec::new();
        let mut summary = ReplaySummary::default();

        loop {
            let more = match format {
                CaptureFormat::Raw => fill_raw(&mut reader, &mut chunk, chunk_size).await?,
                CaptureFormat::Tagged => {
                    fill_tagged(&mut reader, &mut chunk, &mut pending, chunk_size)
                        .await?
                }
            };
            if chunk.is_empty() {
                break;
            }

            self.send_chunk(&socket, &chunk, target, &mut summary).await;
            chunk.clear();
            if !more {
                break;
            }
            tokio::time::sleep(self.config.chunk_interval).await;
        }

        Ok(summary)
    }

    async fn send_chunk(
        &self,
        socket: &UdpSocket,
        chunk: &[u8],
        target: SocketAddr,
        summary: &mut ReplaySummary,
    ) {
        let mut attempt = 0;
        loop {
            match socket.send_to(chunk, target).await {
                Ok(_) => {
                    summary.chunks_sent += 1;
                    summary.bytes_sent += chunk.len() as u64;
                    return;
                }
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    debug!("Replay send failed ({}), retry {}", e, attempt);
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(e) => {
                    warn!("Dropping replay datagram after {} retries: {}", attempt, e);
                    summary.chunks_failed += 1;
                    return;
                }
            }
        }
    }
}

fn local_bind_addr(target: &SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 0),
    }
}

/// Fill `chunk` with up to `chunk_size` bytes. Returns false at end of file.
async fn fill_raw<R: AsyncRead + Unpin>(
    reader: &mut R,
    chunk: &mut Vec<u8>,
    chunk_size: usize,
) -> io::Result<bool> {
    chunk.resize(chunk_size, 0);
    let mut filled = 0;
    while filled < chunk_size {
        let n = reader.read(&mut chunk[filled..]).await?;
        if n == 0 {
            chunk.truncate(filled);
            return Ok(false);
        }
        filled += n;
    }
    Ok(true)
}

/// Fill `chunk` with whole untagged records from a tagged capture. A record
/// that does not fit is parked in `pending` for the next chunk. Returns false
/// at end of file or at the first malformed entry.
async fn fill_tagged<R: AsyncRead + Unpin>(
    reader: &mut R,
    chunk: &mut Vec<u8>,
    pending: &mut Vec<u8>,
    chunk_size: usize,
) -> io::Result<bool> {
    chunk.append(pending);

    loop {
        let tag = match reader.read_u8().await {
            Ok(tag) => tag,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e),
        };
        let Some(record_type) = RecordType::from_tag(tag) else {
            warn!("Unknown record type {} in capture, ending replay", tag);
            return Ok(false);
        };

        let mut record = vec![0u8; record_type.encoded_len()];
        match reader.read_exact(&mut record).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!("Capture ends inside a {} record", record_type);
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        if !chunk.is_empty() && chunk.len() + record.len() > chunk_size {
            *pending = record;
            return Ok(true);
        }
        chunk.extend_from_slice(&record);
    }
}
