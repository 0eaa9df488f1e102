//! UDP socket helpers.

use socket2::{Domain, Protocol, SockAddr, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Kernel receive buffer requested for telemetry sockets, enough to absorb a
/// burst at the game's highest send rate.
const RECV_BUFFER_SIZE: usize = 1024 * 1024;

// this will be common for all our sockets
pub fn new_socket(addr: &SocketAddr) -> io::Result<socket2::Socket> {
    let socket =
        socket2::Socket::new(Domain::for_address(*addr), Type::DGRAM, Some(Protocol::UDP))?;

    // tokio drives the socket, reads never block the thread
    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;

    Ok(socket)
}

/// Bind a UDP socket for receiving telemetry on `addr`
pub fn create_udp_listen(addr: &SocketAddr) -> io::Result<UdpSocket> {
    let socket = new_socket(addr)?;

    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        log::debug!("Cannot enlarge receive buffer for {}: {}", addr, e);
    }

    socket.bind(&SockAddr::from(*addr))?;
    log::trace!("Binding socket to {}", addr);

    UdpSocket::from_std(socket.into())
}
