//! UDP transport: unicast bind or IPv4 multicast join, with bounded receives.

use crate::error::{ListenerError, Result};
use log::{debug, warn};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Datagrams larger than this are truncated.
pub const MAX_DATAGRAM: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Unicast { host: String, port: u16 },
    Multicast { group: Ipv4Addr, port: u16 },
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Unicast { host, port } => write!(f, "{}:{}", host, port),
            Transport::Multicast { group, port } => write!(f, "multicast group {}:{}", group, port),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub source: SocketAddr,
}

pub struct Receiver {
    socket: UdpSocket,
    group: Option<Ipv4Addr>,
    buf: [u8; MAX_DATAGRAM],
}

impl Receiver {
    pub async fn bind(transport: &Transport) -> Result<Self> {
        match transport {
            Transport::Unicast { host, port } => {
                let addr = format!("{}:{}", host, port);
                let socket = UdpSocket::bind(&addr)
                    .await
                    .map_err(|source| ListenerError::Bind { addr, source })?;
                Ok(Self::from_socket(socket, None))
            }
            Transport::Multicast { group, port } => {
                let addr = format!("{}:{}", Ipv4Addr::UNSPECIFIED, port);
                let socket = UdpSocket::bind(&addr)
                    .await
                    .map_err(|source| ListenerError::Bind { addr, source })?;

                let join_err = |source| ListenerError::JoinMulticast {
                    group: group.to_string(),
                    source,
                };
                socket
                    .join_multicast_v4(*group, Ipv4Addr::UNSPECIFIED)
                    .map_err(join_err)?;
                socket.set_multicast_loop_v4(true).map_err(join_err)?;
                socket.set_multicast_ttl_v4(32).map_err(join_err)?;

                Ok(Self::from_socket(socket, Some(*group)))
            }
        }
    }

    fn from_socket(socket: UdpSocket, group: Option<Ipv4Addr>) -> Self {
        Self {
            socket,
            group,
            buf: [0; MAX_DATAGRAM],
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Waits up to `wait` for one datagram. `Ok(None)` means the wait timed out.
    pub async fn recv_timeout(&mut self, wait: Duration) -> Result<Option<Datagram>> {
        match timeout(wait, self.socket.recv_from(&mut self.buf)).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok((len, source))) => {
                debug!("Received {} bytes from {}", len, source);
                Ok(Some(Datagram {
                    payload: self.buf[..len].to_vec(),
                    source,
                }))
            }
            Ok(Err(e)) => Err(ListenerError::Receive(e)),
        }
    }

    /// Leaves the multicast group, if one was joined, and releases the socket.
    pub fn close(self) {
        if let Some(group) = self.group {
            if let Err(e) = self.socket.leave_multicast_v4(group, Ipv4Addr::UNSPECIFIED) {
                warn!("Error leaving multicast group {}: {}", group, e);
            }
        }
    }
}
