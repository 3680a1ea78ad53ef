#![forbid(unsafe_code)]

mod can;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rocketcan_core::broker::{Broker, BrokerConfig, RecvCallback};
use rocketcan_core::config::Config;
use rocketcan_core::frame;
use rocketcan_core::wire::WireRecord;
use rocketcan_core::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use can::LoopbackCan;

/// The acknowledgment the original CLI demanded interactively before opening
/// a CAN channel; kept as a non-interactive flag since this binary's channel
/// is simulated (see `can::LoopbackCan`).
const SECURITY_ACK: &str = "I ACCEPT";

#[derive(Parser, Debug)]
#[command(author, version, about = "RocketCAN CAN-over-Ethernet broker")]
struct Cli {
    /// Path to the broker's TOML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "rocketcan.toml")]
    config: PathBuf,

    /// Overrides the port in `broker.listen` from the config file.
    #[arg(long, value_name = "PORT")]
    listen_port: Option<u16>,

    /// Overrides `broker.logging` from the config file (none/info/data/all).
    #[arg(long, value_name = "LEVEL")]
    logging: Option<String>,

    /// Must be exactly "I ACCEPT"; refuses to start otherwise.
    #[arg(long, value_name = "\"I ACCEPT\"")]
    security_risks: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    if cli.security_risks.as_deref() != Some(SECURITY_ACK) {
        error!("refusing to start: pass --security-risks=\"I ACCEPT\" to acknowledge opening a CAN channel");
        return ExitCode::FAILURE;
    }

    let mut config = match Config::load_from_path(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = cli.listen_port {
        config.broker.listen = override_port(&config.broker.listen, port);
    }
    if let Some(level) = cli.logging {
        config.broker.logging = level;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "rocketcan exited with error");
            ExitCode::FAILURE
        }
    }
}

fn override_port(listen: &str, port: u16) -> String {
    let host = listen.rsplit_once(':').map(|(h, _)| h).unwrap_or(listen);
    format!("{host}:{port}")
}

/// Starts the broker, wires its client-frame callback to the simulated CAN
/// channel (net -> bus), and drives the channel's heartbeat back through the
/// broker's fan-out (bus -> net), until `Ctrl-C` is received.
async fn run(config: Config) -> Result<()> {
    let sock_type = config.broker.sock_type()?;
    let log_level = config.broker.log_level()?;

    let broker = Arc::new(Broker::new());
    let can = LoopbackCan::new();

    let callback: RecvCallback = {
        let broker = broker.clone();
        let can = can.clone();
        Arc::new(move |_client, bytes: [u8; rocketcan_core::wire::WIRE_SIZE]| {
            let host = match WireRecord::unpack(&bytes).and_then(|rec| frame::wire_to_host(&rec)) {
                Ok(host) => host,
                Err(err) => {
                    warn!(%err, "rejecting malformed client frame");
                    return false;
                }
            };
            let broker = broker.clone();
            let can_status = can.clone();
            can.write(host, &move |looped| {
                if let Ok(net) = frame::host_to_wire(&looped) {
                    let mut bytes = net.pack();
                    WireRecord::add_status(&mut bytes, can_status.status());
                    let broker = broker.clone();
                    tokio::spawn(async move {
                        let _ = broker.send(bytes).await;
                    });
                }
            });
            true
        })
    };

    broker
        .start(
            BrokerConfig {
                listen: config.broker.listen.clone(),
                sock_type,
                mtu: config.broker.mtu,
                log_level,
                log_dir: PathBuf::from("."),
            },
            callback,
        )
        .await?;

    info!(
        listen = %config.broker.listen,
        channel = %config.can.channel,
        "rocketcan broker started"
    );

    let heartbeat = {
        let broker = broker.clone();
        let can_status = can.clone();
        can.spawn_heartbeat(Duration::from_secs(2), move |frame| {
            if let Ok(net) = frame::host_to_wire(&frame) {
                let mut bytes = net.pack();
                WireRecord::add_status(&mut bytes, can_status.status());
                WireRecord::add_busload(&mut bytes, can_status.busload());
                let broker = broker.clone();
                tokio::spawn(async move {
                    let _ = broker.send(bytes).await;
                });
            }
        })
    };

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    heartbeat.abort();
    broker.stop().await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
