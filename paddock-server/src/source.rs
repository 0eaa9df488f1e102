//! Source multiplexer.
//!
//! Owns the live telemetry socket and, while replaying, a loopback socket the
//! replayer sends to. Only the active source feeds the pipeline. A switch is
//! requested over a single-slot channel and applied by [`SourceMux::receive`]
//! only after a receive timeout, so a switch never lands in the middle of a
//! record being assembled.

use log::{debug, error, info, trace};
use serde::Serialize;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use paddock_core::protocol::UDP_MAX_PACKET_SIZE;

use crate::network::create_udp_listen;

pub const DEFAULT_TELEMETRY_PORT: u16 = 20777;
pub const DEFAULT_REPLAY_PORT: u16 = 20778;
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    Live,
    Replay,
}

/// The source currently feeding the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSource {
    pub source: Source,
    /// Bound loopback address while replaying
    pub replay_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Address the live telemetry socket binds to
    pub live_addr: SocketAddr,
    /// Loopback address bound while replaying
    pub replay_addr: SocketAddr,
    /// Longest a single receive waits; also the switch poll interval
    pub recv_timeout: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            live_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_TELEMETRY_PORT),
            replay_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_REPLAY_PORT),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }
}

/// Result of one [`SourceMux::receive`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// `len` bytes from the active source were written to the buffer
    Datagram { len: usize, from: SocketAddr },
    /// Nothing arrived within the receive timeout
    Timeout,
    /// Nothing arrived and a pending switch was applied
    Switched(Source),
}

/// Handle for requesting and observing source switches
#[derive(Clone)]
pub struct SourceControl {
    switch_tx: Arc<watch::Sender<Source>>,
    active_rx: watch::Receiver<ActiveSource>,
}

impl SourceControl {
    /// Ask the multiplexer to switch. Returns immediately; a newer request
    /// replaces one that was not applied yet.
    pub fn request_switch(&self, target: Source) {
        debug!("Requesting switch to {} source", target);
        self.switch_tx.send_replace(target);
    }

    pub fn active(&self) -> ActiveSource {
        *self.active_rx.borrow()
    }

    /// Wait until `target` is the active source, giving up after `within`
    pub async fn wait_for(&self, target: Source, within: Duration) -> Option<ActiveSource> {
        let mut rx = self.active_rx.clone();
        let waited = tokio::time::timeout(within, rx.wait_for(|active| active.source == target));
        let active = match waited.await {
            Ok(Ok(active)) => Some(*active),
            _ => None,
        };
        active
    }
}

pub struct SourceMux {
    config: MuxConfig,
    live: UdpSocket,
    loopback: Option<UdpSocket>,
    active: Source,
    switch_rx: watch::Receiver<Source>,
    active_tx: watch::Sender<ActiveSource>,
    discard: Vec<u8>,
}

impl SourceMux {
    /// Bind the live socket and create the control handle
    pub fn bind(config: MuxConfig) -> io::Result<(SourceMux, SourceControl)> {
        let live = create_udp_listen(&config.live_addr)?;
        info!("Listening for telemetry on {}", live.local_addr()?);

        let (switch_tx, switch_rx) = watch::channel(Source::Live);
        let (active_tx, active_rx) = watch::channel(ActiveSource {
            source: Source::Live,
            replay_addr: None,
        });

        let mux = SourceMux {
            config,
            live,
            loopback: None,
            active: Source::Live,
            switch_rx,
            active_tx,
            discard: vec![0u8; UDP_MAX_PACKET_SIZE],
        };
        let control = SourceControl {
            switch_tx: Arc::new(switch_tx),
            active_rx,
        };
        Ok((mux, control))
    }

    pub fn live_addr(&self) -> io::Result<SocketAddr> {
        self.live.local_addr()
    }

    pub fn active(&self) -> Source {
        self.active
    }

    /// Receive the next datagram from the active source.
    ///
    /// While replaying, datagrams arriving on the live socket are read and
    /// dropped. Any error other than a timeout is returned to the caller.
    pub async fn receive(&mut self, buf: &mut [u8]) -> io::Result<Incoming> {
        let received = match (self.active, self.loopback.as_ref()) {
            (Source::Replay, Some(loopback)) => {
                let recv = recv_replay(&self.live, loopback, buf, &mut self.discard);
                tokio::time::timeout(self.config.recv_timeout, recv).await
            }
            _ => {
                let recv = self.live.recv_from(buf);
                tokio::time::timeout(self.config.recv_timeout, recv).await
            }
        };

        match received {
            Ok(Ok((len, from))) => Ok(Incoming::Datagram { len, from }),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                trace!("No telemetry within {:?}", self.config.recv_timeout);
                Ok(match self.apply_pending_switch() {
                    Some(source) => Incoming::Switched(source),
                    None => Incoming::Timeout,
                })
            }
        }
    }

    fn apply_pending_switch(&mut self) -> Option<Source> {
        if !self.switch_rx.has_changed().unwrap_or(false) {
            return None;
        }
        let target = *self.switch_rx.borrow_and_update();
        if target == self.active {
            return None;
        }

        let replay_addr = match target {
            Source::Replay => match create_udp_listen(&self.config.replay_addr) {
                Ok(socket) => {
                    let addr = socket.local_addr().ok();
                    self.loopback = Some(socket);
                    addr
                }
                Err(e) => {
                    error!(
                        "Cannot bind replay socket {}: {}, staying on {} source",
                        self.config.replay_addr, e, self.active
                    );
                    return None;
                }
            },
            Source::Live => {
                self.loopback = None;
                None
            }
        };

        self.active = target;
        self.active_tx.send_replace(ActiveSource {
            source: target,
            replay_addr,
        });
        info!("Switched to {} telemetry source", target);
        Some(target)
    }
}

async fn recv_replay(
    live: &UdpSocket,
    loopback: &UdpSocket,
    buf: &mut [u8],
    discard: &mut [u8],
) -> io::Result<(usize, SocketAddr)> {
    loop {
        tokio::select! {
            r = loopback.recv_from(&mut *buf) => return r,
            r = live.recv_from(&mut *discard) => {
                let (len, from) = r?;
                trace!("Dropping {} live bytes from {} during replay", len, from);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> MuxConfig {
        MuxConfig {
            live_addr: "127.0.0.1:0".parse().unwrap(),
            replay_addr: "127.0.0.1:0".parse().unwrap(),
            recv_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_live_datagram() {
        let (mut mux, _control) = SourceMux::bind(test_config()).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let live = mux.live_addr().unwrap();
        sender.send_to(b"live", live).await.unwrap();

        let mut buf = vec![0u8; UDP_MAX_PACKET_SIZE];
        let incoming = mux.receive(&mut buf).await.unwrap();
        assert_eq!(
            incoming,
            Incoming::Datagram {
                len: 4,
                from: sender.local_addr().unwrap()
            }
        );
        assert_eq!(&buf[..4], b"live");
    }

    #[tokio::test]
    async fn test_timeout_without_switch() {
        let (mut mux, _control) = SourceMux::bind(test_config()).unwrap();
        let mut buf = vec![0u8; UDP_MAX_PACKET_SIZE];
        assert_eq!(mux.receive(&mut buf).await.unwrap(), Incoming::Timeout);
        assert_eq!(mux.active(), Source::Live);
    }

    #[tokio::test]
    async fn test_switch_applied_only_after_timeout() {
        let (mut mux, control) = SourceMux::bind(test_config()).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let live_addr = mux.live_addr().unwrap();
        let mut buf = vec![0u8; UDP_MAX_PACKET_SIZE];

        sender.send_to(b"first", live_addr).await.unwrap();
        control.request_switch(Source::Replay);

        // Data is still pending, so the switch waits
        assert!(matches!(
            mux.receive(&mut buf).await.unwrap(),
            Incoming::Datagram { len: 5, .. }
        ));
        assert_eq!(control.active().source, Source::Live);

        assert_eq!(
            mux.receive(&mut buf).await.unwrap(),
            Incoming::Switched(Source::Replay)
        );
        let active = control.active();
        assert_eq!(active.source, Source::Replay);
        assert!(active.replay_addr.is_some());
    }

    #[tokio::test]
    async fn test_live_discarded_while_replaying() {
        let (mut mux, control) = SourceMux::bind(test_config()).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let live_addr = mux.live_addr().unwrap();
        let mut buf = vec![0u8; UDP_MAX_PACKET_SIZE];

        control.request_switch(Source::Replay);
        assert_eq!(
            mux.receive(&mut buf).await.unwrap(),
            Incoming::Switched(Source::Replay)
        );
        let replay_addr = control.active().replay_addr.unwrap();

        sender.send_to(b"live", live_addr).await.unwrap();
        assert_eq!(mux.receive(&mut buf).await.unwrap(), Incoming::Timeout);

        sender.send_to(b"replayed", replay_addr).await.unwrap();
        assert!(matches!(
            mux.receive(&mut buf).await.unwrap(),
            Incoming::Datagram { len: 8, .. }
        ));
        assert_eq!(&buf[..8], b"replayed");
    }

    #[tokio::test]
    async fn test_switch_back_tears_down_loopback() {
        let (mut mux, control) = SourceMux::bind(test_config()).unwrap();
        let mut buf = vec![0u8; UDP_MAX_PACKET_SIZE];

        control.request_switch(Source::Replay);
        mux.receive(&mut buf).await.unwrap();
        assert!(mux.loopback.is_some());

        control.request_switch(Source::Live);
        assert_eq!(
            mux.receive(&mut buf).await.unwrap(),
            Incoming::Switched(Source::Live)
        );
        assert!(mux.loopback.is_none());
        assert_eq!(control.active().replay_addr, None);
    }

    #[tokio::test]
    async fn test_latest_request_wins() {
        let (mut mux, control) = SourceMux::bind(test_config()).unwrap();
        let mut buf = vec![0u8; UDP_MAX_PACKET_SIZE];

        control.request_switch(Source::Replay);
        control.request_switch(Source::Live);
        assert_eq!(mux.receive(&mut buf).await.unwrap(), Incoming::Timeout);
        assert_eq!(mux.active(), Source::Live);
    }

    #[tokio::test]
    async fn test_wait_for() {
        let (mut mux, control) = SourceMux::bind(test_config()).unwrap();
        let live = control
            .wait_for(Source::Live, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(live.source, Source::Live);
        assert_eq!(live.replay_addr, None);

        assert!(control
            .wait_for(Source::Replay, Duration::from_millis(20))
            .await
            .is_none());

        control.request_switch(Source::Replay);
        let waiter = {
            let control = control.clone();
            tokio::spawn(async move {
                control
                    .wait_for(Source::Replay, Duration::from_secs(2))
                    .await
            })
        };
        let mut buf = vec![0u8; UDP_MAX_PACKET_SIZE];
        mux.receive(&mut buf).await.unwrap();

        let active = waiter.await.unwrap().unwrap();
        assert_eq!(active.source, Source::Replay);
        assert!(active.replay_addr.is_some());
    }
}
