//! Vesper MCP Server - Multi-Tier Agent Memory
//!
//! Tool-protocol server exposing the Vesper memory engine over JSON-RPC on
//! stdio. Three tiers (working / semantic graph / skills), smart query
//! routing with hybrid search, scheduled consolidation, and a fail-closed
//! rate limiter. Configuration comes from the environment; with no remote
//! services configured the engine runs fully in-process.

mod protocol;
mod server;
mod tools;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vesper_core::{Config, Vesper};

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

fn parse_args() {
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("Vesper MCP Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Multi-tier agent memory server using the Model Context Protocol.");
                println!();
                println!("USAGE:");
                println!("    vesper-mcp");
                println!();
                println!("ENVIRONMENT:");
                println!("    VESPER_HOME              Data root (default ~/.vesper)");
                println!("    SQLITE_DB                Relational store path");
                println!("    QDRANT_URL               Remote vector service (in-process when unset)");
                println!("    REDIS_HOST, REDIS_PORT   Remote cache (in-process when unset)");
                println!("    EMBEDDING_SERVICE_URL    Remote embedder (local vectoriser when unset)");
                println!("    RATE_LIMIT_DEFAULT_TIER  standard | premium | unlimited");
                println!("    RATE_LIMIT_FAIL_OPEN     Allow requests when the limiter store is down");
                println!("    RUST_LOG                 Log level filter (logs go to stderr)");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("vesper-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument '{arg}'");
                eprintln!("Try 'vesper-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
    }
}

#[tokio::main]
async fn main() {
    parse_args();

    // stdout is the protocol channel; all logging goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        error!("fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env();
    let vesper = Arc::new(
        Vesper::new(config)
            .await
            .context("failed to start engine")?,
    );

    // Nightly consolidation; redundant starts are no-ops
    vesper.scheduler().start();

    info!("vesper-mcp v{} serving on stdio", env!("CARGO_PKG_VERSION"));
    let server = McpServer::new(Arc::clone(&vesper));
    StdioTransport::new()
        .run(server)
        .await
        .context("transport error")?;

    vesper.scheduler().stop();
    info!("vesper-mcp shutting down");
    Ok(())
}
