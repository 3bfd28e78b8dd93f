//! Wire types shared between the landmark streaming server and its clients.

pub mod server;
