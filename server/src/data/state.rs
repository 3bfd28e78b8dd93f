use crate::data::session::SessionRegistry;

use common_data::server::data::packet::Packet;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use tracing::{debug, trace, warn};

/// One encoded frame waiting for the writer task.
pub type Outbound = (Arc<[u8]>, SocketAddr);

/// Where a packet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every session in the active set.
    All,
    /// One address, known session or not.
    To(SocketAddr),
}

/// Handle shared by the receive loop, packet handlers and the application.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub sessions: Arc<SessionRegistry>,
    udp_tx: Sender<Outbound>,
    heartbeat_timeout: Duration,
    local_addr: SocketAddr,
}

impl ServerState {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        udp_tx: Sender<Outbound>,
        heartbeat_timeout: Duration,
        local_addr: SocketAddr,
    ) -> Self {
        Self {
            sessions,
            udp_tx,
            heartbeat_timeout,
            local_addr,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.sessions.count()
    }

    /// Queues `packet` for `target` and returns how many datagrams were queued.
    ///
    /// Never blocks. A full queue or a closed socket drops the datagram.
    pub fn send(&self, packet: &Packet, target: Target) -> usize {
        let bytes: Arc<[u8]> = packet.encode().into();

        match target {
            Target::To(addr) => usize::from(self.enqueue(Arc::clone(&bytes), addr)),
            Target::All => {
                let recipients = self.sessions.addresses();
                let mut queued = 0;
                for addr in recipients {
                    if self.enqueue(Arc::clone(&bytes), addr) {
                        queued += 1;
                    }
                }
                trace!(code = %packet.code(), queued, "broadcast");
                queued
            }
        }
    }

    fn enqueue(&self, bytes: Arc<[u8]>, addr: SocketAddr) -> bool {
        match self.udp_tx.try_send((bytes, addr)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%addr, "outbound queue full, datagram dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%addr, "server closed, datagram dropped");
                false
            }
        }
    }

    /// Runs a liveness sweep with the configured timeout.
    pub fn tick(&self) -> Vec<SocketAddr> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&self, now: Instant) -> Vec<SocketAddr> {
        self.sessions.sweep(self.heartbeat_timeout, now)
    }
}
