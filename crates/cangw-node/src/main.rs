use std::path::PathBuf;

use clap::Parser;

use cangw_node::{GatewayConfig, Node};

#[derive(Parser)]
#[command(name = "cangw-node", about = "CAN frame gateway daemon")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/cangw/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match GatewayConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config from {}: {e}", cli.config.display());
            std::process::exit(1);
        }
    };

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        cangw_node::logging::init_json(&config.logging.level);
    } else {
        cangw_node::logging::init(&config.logging.level);
    }

    let node = Node::new(config);

    // Spawn SIGINT handler
    let handle = node.shutdown_handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received SIGINT, shutting down");
        handle.shutdown();
    });

    // Spawn SIGTERM handler (Docker sends SIGTERM on `docker stop`)
    #[cfg(unix)]
    {
        let handle2 = node.shutdown_handle();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            sigterm.recv().await;
            tracing::info!("received SIGTERM, shutting down");
            handle2.shutdown();
        });
    }

    if let Err(e) = node.install_jobs() {
        tracing::error!("failed to install configured jobs: {e}");
        std::process::exit(1);
    }

    node.run().await;
    node.shutdown();
}
