use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use radiotun_interfaces::VirtualInterface;
use radiotun_interfaces::udp::UdpRadio;
use radiotun_node::{Bridge, BridgeConfig, ConfigFile, NodeError, Overrides};

#[derive(Parser)]
#[command(
    name = "radiotun",
    about = "Bridge a TUN/TAP interface onto an nRF24 radio network"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Octal radio address of this node (e.g. 00, 01, 011)
    #[arg(short = 'a', long)]
    address: Option<String>,

    /// TUN mode: carry IP packets and route by mesh node id (implies -m)
    #[arg(short = 't', long)]
    tun: bool,

    /// Enable mesh (dynamic) addressing
    #[arg(short = 'm', long)]
    mesh: bool,

    /// Mesh node id of this node (1-255, ignored on the master)
    #[arg(short = 'i', long = "node-id")]
    node_id: Option<u16>,

    /// Radio data rate: 1 (1 Mbps), 2 (2 Mbps) or 250 (250 kbps)
    #[arg(short = 'd', long = "data-rate")]
    data_rate: Option<u16>,

    /// Radio channel
    #[arg(long)]
    channel: Option<u8>,

    /// Name of the TUN/TAP interface
    #[arg(long)]
    interface: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            address: self.address.clone(),
            tun: self.tun,
            mesh: self.mesh,
            node_id: self.node_id,
            data_rate: self.data_rate,
            channel: self.channel,
            interface: self.interface.clone(),
        }
    }
}

fn load_config(cli: &Cli) -> Result<BridgeConfig, NodeError> {
    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    BridgeConfig::resolve(file, &cli.overrides())
}

#[cfg(target_os = "linux")]
fn open_device(config: &BridgeConfig) -> Result<Arc<dyn VirtualInterface>, NodeError> {
    use radiotun_interfaces::tun::{TunConfig, TunDevice};

    let device = TunDevice::open(&TunConfig {
        name: config.interface.clone(),
        mode: config.mode,
        address: config.local_address,
        persist: config.persist,
    })?;
    Ok(Arc::new(device))
}

#[cfg(not(target_os = "linux"))]
fn open_device(_config: &BridgeConfig) -> Result<Arc<dyn VirtualInterface>, NodeError> {
    Err(NodeError::Config(
        "TUN/TAP devices are only supported on Linux".into(),
    ))
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("cannot listen for SIGTERM: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("radiotun: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        radiotun_node::logging::init_json(&config.log_level);
    } else {
        radiotun_node::logging::init(&config.log_level);
    }

    let device = match open_device(&config) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("failed to open {}: {e}", config.interface);
            std::process::exit(1);
        }
    };

    let radio = UdpRadio::new(config.udp);
    let mut bridge = Bridge::new(config);
    let handle = bridge.shutdown_handle();

    // Spawn signal handler
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
            _ = terminate_signal() => tracing::info!("received SIGTERM, shutting down"),
        }
        handle.shutdown();
    });

    if let Err(e) = bridge.start(device, radio).await {
        tracing::error!("failed to start bridge: {e}");
        std::process::exit(1);
    }

    bridge.wait_for_shutdown().await;
    let report = bridge.shutdown().await;
    if !report.is_clean() {
        tracing::error!("forcing exit, stuck stages: {}", report.stuck.join(", "));
        std::process::exit(1);
    }
}
