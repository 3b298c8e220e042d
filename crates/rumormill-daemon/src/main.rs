//! rumormill daemon — the gossip node.
//!
//! ```text
//! rumormill --gossipAddr 127.0.0.1:5000 --dataDir ./node-a \
//!           --UIPort 8080 --peers 127.0.0.1:5001,127.0.0.1:5002
//! ```
//!
//! Runs until interrupted. Exit code 0 on clean shutdown, non-zero on
//! a fatal init error.

use std::path::PathBuf;

use clap::Parser;
use rumormill_node::Node;
use rumormill_types::config::{AppConfig, DEFAULT_POW_DIFFICULTY, DEFAULT_RTIMER_SECS};

/// A peer-to-peer gossip node with self-certifying identities.
#[derive(Parser)]
#[command(name = "rumormill", version, about)]
struct Args {
    /// Port for the HTTP client API (0 disables it).
    #[arg(long = "UIPort", default_value_t = 0)]
    ui_port: u16,

    /// Bind address for gossip traffic (use ":PORT" to listen on all
    /// interfaces).
    #[arg(long = "gossipAddr")]
    gossip_addr: String,

    /// Initial peers, comma separated.
    #[arg(long = "peers", default_value = "")]
    peers: String,

    /// Seconds between route rumor broadcasts.
    #[arg(long = "rtimer", default_value_t = DEFAULT_RTIMER_SECS)]
    rtimer: u64,

    /// Disable forwarding of everything except route rumors.
    #[arg(long = "noforward")]
    noforward: bool,

    /// Directory for the keypair and the message database.
    #[arg(long = "dataDir")]
    data_dir: PathBuf,

    /// Proof-of-work difficulty in leading zero bits.
    #[arg(long = "powDifficulty", default_value_t = DEFAULT_POW_DIFFICULTY)]
    pow_difficulty: u32,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = AppConfig {
        gossip_addr: args.gossip_addr,
        ui_port: (args.ui_port != 0).then_some(args.ui_port),
        peers: args
            .peers
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        rtimer_secs: args.rtimer,
        no_forward: args.noforward,
        disable_traversal: false,
        data_dir: args.data_dir,
        pow_difficulty: args.pow_difficulty,
    };

    let node = match Node::start(config).await {
        Ok(node) => node,
        Err(e) => {
            tracing::error!("fatal: {e}");
            std::process::exit(1);
        }
    };

    if let Some(port) = node.handle.config.ui_port {
        let handle = node.handle.clone();
        tokio::spawn(async move {
            if let Err(e) = rumormill_http::serve(handle, port).await {
                tracing::error!("HTTP front-end failed: {e}");
            }
        });
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for shutdown signal: {e}");
        std::process::exit(1);
    }
    tracing::info!("shutting down");
}
