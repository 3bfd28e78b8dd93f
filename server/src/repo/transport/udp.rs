//! Socket ownership and the two background tasks that use it.
//!
//! The receive task reads datagrams and hands them to [`handle_udp`]. The
//! writer task drains the outbound queue fed by [`ServerState::send`]. Both
//! tasks race their socket call against a cancellation token, so shutdown
//! never waits on a blocked `recv_from`.

use crate::config::ServerConfig;
use crate::data::state::{Outbound, ServerState};
use crate::error::{Result, ServerError};
use crate::repo::handlers::udphandler::{handle_udp, HandlerTable};

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tracing::{debug, trace};

/// Address the server binds: the configured one, or the host name's first
/// IPv4 address.
pub async fn resolve_bind_addr(config: &ServerConfig) -> Result<SocketAddr> {
    if let Some(ip) = config.bind_address {
        return Ok(SocketAddr::new(ip, config.port));
    }

    let host = hostname::get()
        .map_err(|source| ServerError::Resolve {
            host: "<local host name>".to_string(),
            source,
        })?
        .to_string_lossy()
        .into_owned();

    let ip = lookup_host((host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Resolve {
            host: host.clone(),
            source,
        })?
        .map(|addr| addr.ip())
        .find(IpAddr::is_ipv4)
        .ok_or_else(|| ServerError::NoIpv4Address(host.clone()))?;

    debug!(%host, %ip, "resolved bind address");
    Ok(SocketAddr::new(ip, config.port))
}

pub async fn bind(config: &ServerConfig) -> Result<Arc<UdpSocket>> {
    let addr = resolve_bind_addr(config).await?;
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    Ok(Arc::new(socket))
}

pub fn spawn_receive_loop(
    socket: Arc<UdpSocket>,
    state: ServerState,
    handlers: Arc<HandlerTable>,
    buffer_size: usize,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buff = vec![0u8; buffer_size];

        loop {
            let incoming = tokio::select! {
                _ = cancel.cancelled() => break,
                incoming = socket.recv_from(&mut buff) => incoming,
            };

            let (len, addr) = match incoming {
                Ok(v) => v,
                Err(e) => {
                    // ICMP port-unreachable and similar surface here; none are fatal
                    debug!(error = %e, "error on udp read");
                    continue;
                }
            };

            trace!(len, %addr, "datagram received");
            handle_udp(&state, &handlers, &buff[..len], addr);
        }

        debug!("receive loop stopped");
    })
}

pub fn spawn_writer(
    socket: Arc<UdpSocket>,
    mut udp_rx: Receiver<Outbound>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // no new sends after close; drain what is already queued
                    udp_rx.close();
                    let mut flushed = 0usize;
                    while let Some((bytes, addr)) = udp_rx.recv().await {
                        send_datagram(&socket, &bytes, addr).await;
                        flushed += 1;
                    }
                    debug!(flushed, "outbound queue flushed");
                    break;
                }
                outbound = udp_rx.recv() => match outbound {
                    Some((bytes, addr)) => send_datagram(&socket, &bytes, addr).await,
                    None => break,
                },
            }
        }

        debug!("writer stopped");
    })
}

async fn send_datagram(socket: &UdpSocket, bytes: &[u8], addr: SocketAddr) {
    match socket.send_to(bytes, addr).await {
        Ok(len) => trace!(len, %addr, "datagram sent"),
        Err(e) => debug!(%addr, error = %e, "udp send failed"),
    }
}

