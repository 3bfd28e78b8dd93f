//! Server configuration.
//!
//! Values come from compiled defaults, then the environment (a `.env` file is
//! honoured through `dotenvy`), and finally whatever the binary's command line
//! overrides.

use crate::error::{Result, ServerError};

use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use common_data::server::data::packet::FRAME_OVERHEAD;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: f64 = 10.0;
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 2048;
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 1_024;

pub const ENV_PORT: &str = "MOCAP_PORT";
pub const ENV_HEARTBEAT_TIMEOUT: &str = "MOCAP_HEARTBEAT_TIMEOUT_SECONDS";
pub const ENV_RECEIVE_BUFFER_SIZE: &str = "MOCAP_RECEIVE_BUFFER_SIZE";
pub const ENV_BIND_ADDRESS: &str = "MOCAP_BIND_ADDRESS";
pub const ENV_OUTBOUND_QUEUE_CAPACITY: &str = "MOCAP_OUTBOUND_QUEUE_CAPACITY";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    /// Sessions without a heartbeat for this long are dropped by `tick`.
    pub heartbeat_timeout: Duration,
    /// Largest datagram the receive loop accepts; longer ones fail to decode.
    pub receive_buffer_size: usize,
    /// Address to bind. `None` resolves the machine's host name.
    pub bind_address: Option<IpAddr>,
    /// Datagrams queued for the writer task before sends start dropping.
    pub outbound_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: DEFAULT_PORT,
            heartbeat_timeout: Duration::from_secs_f64(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            bind_address: None,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `MOCAP_*` environment variables.
    pub fn from_env() -> Result<ServerConfig> {
        let _ = dotenvy::dotenv();
        ServerConfig::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<ServerConfig> {
        let mut config = ServerConfig::default();

        if let Some(port) = parse_var::<u16>(&lookup, ENV_PORT)? {
            config.port = port;
        }

        if let Some(secs) = parse_var::<f64>(&lookup, ENV_HEARTBEAT_TIMEOUT)? {
            config.heartbeat_timeout = timeout_from_secs(secs)?;
        }

        if let Some(size) = parse_var::<usize>(&lookup, ENV_RECEIVE_BUFFER_SIZE)? {
            config.receive_buffer_size = size;
        }

        if let Some(addr) = parse_var::<IpAddr>(&lookup, ENV_BIND_ADDRESS)? {
            config.bind_address = Some(addr);
        }

        if let Some(capacity) = parse_var::<usize>(&lookup, ENV_OUTBOUND_QUEUE_CAPACITY)? {
            config.outbound_queue_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_timeout.is_zero() {
            return Err(ServerError::Config(
                "heartbeat timeout must be positive".to_string(),
            ));
        }

        if self.receive_buffer_size < FRAME_OVERHEAD {
            return Err(ServerError::Config(format!(
                "receive buffer of {} bytes cannot hold a {} byte frame header",
                self.receive_buffer_size, FRAME_OVERHEAD
            )));
        }

        if self.outbound_queue_capacity == 0 {
            return Err(ServerError::Config(
                "outbound queue capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Converts a seconds value from config into a timeout.
pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ServerError::Config(format!(
            "heartbeat timeout must be a positive number of seconds, got {}",
            secs
        )));
    }

    Ok(Duration::from_secs_f64(secs))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };

    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ServerError::Config(format!("{}={:?}: {}", key, raw, e)))
}
