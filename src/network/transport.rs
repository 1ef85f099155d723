use std::io::ErrorKind;
use std::net::{self, SocketAddr};

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use super::NetworkError;
use crate::config::NetworkConfig;
use crate::mesh::codec::MAX_DATAGRAM;
use crate::mesh::{MailboxSender, Origin};

/// Broadcast, best-effort datagram delivery to every peer. Sends never
/// block; there is no ordering, delivery or de-duplication guarantee.
pub trait Transport: Send + Sync {
    fn broadcast(&self, bytes: &[u8]) -> Result<(), NetworkError>;
}

/// UDP broadcast on a fixed port shared by every node.
///
/// Sends go through a non-blocking std handle of the same socket, so they
/// never wait on the reactor's writability tracking.
pub struct UdpTransport {
    sender: net::UdpSocket,
    target: SocketAddr,
    receiver: JoinHandle<()>,
}

impl UdpTransport {
    /// Bind the shared port and start forwarding received datagrams into
    /// `mailbox`. Forwarding stops when the mailbox is dropped.
    pub async fn bind(config: &NetworkConfig, mailbox: MailboxSender) -> Result<Self, NetworkError> {
        let std_socket = net::UdpSocket::bind(SocketAddr::new(config.bind_addr, config.port))?;
        std_socket.set_broadcast(true)?;
        std_socket.set_nonblocking(true)?;
        let sender = std_socket.try_clone()?;
        let socket = UdpSocket::from_std(std_socket)?;
        info!(
            "UDP transport bound to {}, broadcasting to {}:{}",
            socket.local_addr()?,
            config.broadcast_addr,
            config.port
        );

        let receiver = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => {
                        if !mailbox.offer(buf[..len].to_vec(), Origin::Udp(from)) {
                            debug!("Mailbox closed, stopping UDP receive loop");
                            break;
                        }
                    }
                    Err(e) => warn!("UDP receive error: {e}"),
                }
            }
        });

        Ok(Self {
            sender,
            target: SocketAddr::new(config.broadcast_addr, config.port),
            receiver,
        })
    }

    /// Send to `target` instead of the configured broadcast address.
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.sender.local_addr()?)
    }
}

impl Transport for UdpTransport {
    fn broadcast(&self, bytes: &[u8]) -> Result<(), NetworkError> {
        match self.sender.send_to(bytes, self.target) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(NetworkError::WouldBlock),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}
