pub mod handlers;
pub mod server;
pub mod source;
pub mod transport;
