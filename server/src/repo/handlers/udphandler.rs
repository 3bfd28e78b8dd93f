//! Packet code dispatch.
//!
//! Handlers are registered from an ordered list before the receive loop
//! starts. The first handler registered for a code wins; later ones are
//! logged and ignored.

use crate::data::state::{ServerState, Target};

use common_data::server::data::packet::{Packet, PacketCode};

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

/// Callback run on the receive task for every packet with a matching code.
///
/// Must return quickly: the next datagram is not read until it does.
pub type PacketHandler = Arc<dyn Fn(&ServerState, SocketAddr, &Packet) + Send + Sync>;

/// Wraps a function or closure as a [`PacketHandler`].
pub fn handler<F>(f: F) -> PacketHandler
where
    F: Fn(&ServerState, SocketAddr, &Packet) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<PacketCode, PacketHandler>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<_> = self.handlers.keys().copied().collect();
        codes.sort();
        f.debug_struct("HandlerTable").field("codes", &codes).finish()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding only the heartbeat and quit handlers.
    pub fn with_builtins() -> Self {
        Self::from_list(builtin_handlers())
    }

    /// Registers `list` in order.
    pub fn from_list(list: impl IntoIterator<Item = (PacketCode, PacketHandler)>) -> Self {
        let mut table = Self::new();
        for (code, handler) in list {
            table.register(code, handler);
        }
        table
    }

    /// Returns `false` and keeps the existing handler if `code` is taken.
    pub fn register(&mut self, code: PacketCode, handler: PacketHandler) -> bool {
        if self.handlers.contains_key(&code) {
            warn!(%code, "duplicated packet handler ignored");
            return false;
        }

        let _ = self.handlers.insert(code, handler);
        debug!(%code, "packet handler registered");
        true
    }

    pub fn get(&self, code: PacketCode) -> Option<&PacketHandler> {
        self.handlers.get(&code)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

pub fn builtin_handlers() -> Vec<(PacketCode, PacketHandler)> {
    vec![
        (PacketCode::HEART_BEAT_REQ, handler(handle_heart_beat_req)),
        (PacketCode::QUIT_NOTIFY, handler(handle_quit_notify)),
    ]
}

pub fn handle_heart_beat_req(state: &ServerState, addr: SocketAddr, _packet: &Packet) {
    state.sessions.heartbeat(addr);
    let _ = state.send(&Packet::empty(PacketCode::HEART_BEAT_RSP), Target::To(addr));
}

pub fn handle_quit_notify(state: &ServerState, addr: SocketAddr, _packet: &Packet) {
    info!(%addr, "client quit");
    let _ = state.sessions.remove(addr);
}

/// Decodes one datagram and runs its handler.
///
/// The sender is registered as a session before the handler runs so that a
/// handler broadcasting a reply also reaches the sender.
pub fn handle_udp(state: &ServerState, handlers: &HandlerTable, buff: &[u8], addr: SocketAddr) {
    let packet = match Packet::try_decode(buff) {
        Ok(p) => p,
        Err(e) => {
            warn!(%addr, error = %e, "bad packet received");
            return;
        }
    };

    let Some(handler) = handlers.get(packet.code()) else {
        warn!(%addr, code = %packet.code(), "packet has no handler");
        return;
    };

    let _ = state.sessions.touch(addr);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(state, addr, &packet)));
    if outcome.is_err() {
        error!(%addr, code = %packet.code(), "packet handler panicked");
    }
}
