//! UDP transport for streaming landmark frames to game-engine clients.
//!
//! Clients are tracked by address without a handshake and kept alive by
//! heartbeats. The application loop owns the cadence: it calls
//! [`UdpServer::tick`](repo::server::UdpServer::tick) to expire silent
//! clients and broadcasts one packet per processed frame.

pub mod config;
pub mod data;
pub mod error;
pub mod repo;

pub use config::ServerConfig;
pub use data::state::{ServerState, Target};
pub use error::{Result, ServerError};
pub use repo::handlers::udphandler::{builtin_handlers, handler, HandlerTable, PacketHandler};
pub use repo::server::UdpServer;
