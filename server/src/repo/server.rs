//! The server facade: socket, session registry, dispatch table and the
//! background tasks, started and stopped as one unit.
//!
//! ```no_run
//! use mocap_server::config::ServerConfig;
//! use mocap_server::repo::handlers::udphandler::builtin_handlers;
//! use mocap_server::repo::server::UdpServer;
//!
//! # async fn run() -> mocap_server::error::Result<()> {
//! let server = UdpServer::start(ServerConfig::default(), builtin_handlers()).await?;
//! server.tick();
//! server.close().await;
//! # Ok(())
//! # }
//! ```

use crate::config::ServerConfig;
use crate::data::session::SessionRegistry;
use crate::data::state::{ServerState, Target};
use crate::error::Result;
use crate::repo::handlers::udphandler::{HandlerTable, PacketHandler};
use crate::repo::transport::udp;

use common_data::server::data::packet::{Packet, PacketCode};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tracing::{info, warn};

pub struct UdpServer {
    state: ServerState,
    receive_cancel: CancellationToken,
    writer_cancel: CancellationToken,
    receive_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<()>>,
}

impl UdpServer {
    /// Binds the socket and spawns the receive loop.
    ///
    /// `handlers` is registered in order before any datagram is read; for a
    /// repeated code the first entry wins. Bind and resolve failures are
    /// returned here and nowhere else.
    pub async fn start(
        config: ServerConfig,
        handlers: impl IntoIterator<Item = (PacketCode, PacketHandler)>,
    ) -> Result<UdpServer> {
        config.validate()?;

        let handlers = Arc::new(HandlerTable::from_list(handlers));
        let socket = udp::bind(&config).await?;
        let local_addr = socket.local_addr()?;

        let (udp_tx, udp_rx) = mpsc::channel(config.outbound_queue_capacity);
        let state = ServerState::new(
            Arc::new(SessionRegistry::new()),
            udp_tx,
            config.heartbeat_timeout,
            local_addr,
        );

        let receive_cancel = CancellationToken::new();
        let writer_cancel = CancellationToken::new();

        let writer_task = udp::spawn_writer(Arc::clone(&socket), udp_rx, writer_cancel.clone());
        let receive_task = udp::spawn_receive_loop(
            socket,
            state.clone(),
            Arc::clone(&handlers),
            config.receive_buffer_size,
            receive_cancel.clone(),
        );

        info!(%local_addr, handlers = handlers.len(), "udp server started");

        Ok(UdpServer {
            state,
            receive_cancel,
            writer_cancel,
            receive_task: Some(receive_task),
            writer_task: Some(writer_task),
        })
    }

    /// Handle for code that outlives a borrow of the server.
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.state.local_addr()
    }

    /// Drops stale sessions. Call this regularly from the application loop.
    pub fn tick(&self) -> Vec<SocketAddr> {
        self.state.tick()
    }

    pub fn send(&self, packet: &Packet, target: Target) -> usize {
        self.state.send(packet, target)
    }

    pub fn broadcast(&self, packet: &Packet) -> usize {
        self.state.send(packet, Target::All)
    }

    pub fn client_count(&self) -> usize {
        self.state.client_count()
    }

    /// Stops the receive loop, tells remaining clients the server is quitting,
    /// flushes queued datagrams and releases the socket.
    pub async fn close(mut self) {
        self.receive_cancel.cancel();
        if let Some(task) = self.receive_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "receive loop ended abnormally");
            }
        }

        let notified = self.broadcast(&Packet::empty(PacketCode::QUIT_NOTIFY));

        self.writer_cancel.cancel();
        if let Some(task) = self.writer_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "writer ended abnormally");
            }
        }

        info!(local_addr = %self.local_addr(), notified, "udp server closed");
    }
}

impl Drop for UdpServer {
    // Without `close` the tasks are cancelled without a quit notice; the
    // socket is freed once both tasks have returned.
    fn drop(&mut self) {
        self.receive_cancel.cancel();
        self.writer_cancel.cancel();
    }
}
