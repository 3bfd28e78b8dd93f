use mocap_server::config::{timeout_from_secs, ServerConfig};
use mocap_server::repo::handlers::udphandler::builtin_handlers;
use mocap_server::repo::server::UdpServer;
use mocap_server::repo::source::{ReplaySource, SourceGroup, SyntheticSource};

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How long the loop sleeps between checks while no client is connected.
const IDLE_POLL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "mocap-server", version, about = "Streams landmark frames to UDP clients")]
struct Args {
    /// UDP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Seconds without a heartbeat before a client is dropped
    #[arg(long)]
    heartbeat_timeout: Option<f64>,

    /// Largest datagram accepted, in bytes
    #[arg(long)]
    receive_buffer_size: Option<usize>,

    /// Address to bind instead of the host name's IPv4 address
    #[arg(long)]
    bind: Option<IpAddr>,

    /// JSON-lines recording to replay instead of the synthetic face; repeat
    /// to stream several recordings (e.g. face and pose) side by side
    #[arg(long)]
    replay: Vec<PathBuf>,

    /// Frames processed per second
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
}

fn build_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::from_env().context("reading MOCAP_* environment")?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(secs) = args.heartbeat_timeout {
        config.heartbeat_timeout = timeout_from_secs(secs)?;
    }
    if let Some(size) = args.receive_buffer_size {
        config.receive_buffer_size = size;
    }
    if args.bind.is_some() {
        config.bind_address = args.bind;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mocap_server=info,common_data=info")),
        )
        .init();

    let args = Args::parse();
    if !args.fps.is_finite() || args.fps <= 0.0 {
        bail!("--fps must be a positive number, got {}", args.fps);
    }

    let config = build_config(&args)?;

    let mut sources = SourceGroup::new();
    for path in &args.replay {
        let replay = ReplaySource::open(path)
            .await
            .with_context(|| format!("opening replay {}", path.display()))?;
        sources.push(Box::new(replay));
    }
    if sources.is_empty() {
        sources.push(Box::new(SyntheticSource::new()));
    }

    let server = UdpServer::start(config, builtin_handlers())
        .await
        .context("starting udp server")?;

    let mut frames = time::interval(Duration::from_secs_f64(1.0 / args.fps));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut paused = false;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = frames.tick() => {}
        }

        server.tick();

        if server.client_count() == 0 {
            if !paused {
                sources.pause();
                paused = true;
                info!("no clients connected, detection paused");
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = time::sleep(IDLE_POLL) => continue,
            }
        }

        if paused {
            paused = false;
            info!(clients = server.client_count(), "detection resumed");
        }

        for packet in sources.next_frames().await {
            server.broadcast(&packet);
        }
    }

    info!("shutting down");
    server.close().await;
    Ok(())
}
