//! # dbwire
//!
//! CLI tool for probing database servers with the dbwire transport.
//!
//! ## Commands
//!
//! - `probe`: Connect, optionally send a hex payload, print the reply as hex
//! - `ports`: List default ports of known database engines
//!
//! ## Example
//!
//! ```bash
//! # Is Postgres listening?
//! dbwire probe --host db.internal --database postgres
//!
//! # Send a Postgres SSLRequest and read the one-byte answer
//! dbwire probe --host db.internal --port 5432 --send 0000000804d2162f --expect 1
//!
//! # Use a TOML config, override the timeout
//! dbwire probe --config dbwire.toml --timeout-ms 2000
//! ```
//!
//! Set `RUST_LOG=dbwire_client=debug` to trace state transitions.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{ports, probe};

/// CLI tool for probing database servers over raw TCP/TLS.
#[derive(Parser, Debug)]
#[command(name = "dbwire")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open one connection and exchange bytes
    Probe {
        /// TOML file with host, port, tls and timeout_ms
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Server host name or IP address
        #[arg(long)]
        host: Option<String>,

        /// Server port
        #[arg(long, short)]
        port: Option<u16>,

        /// Database engine, used for the default port (postgres, mysql, ...)
        #[arg(long, short)]
        database: Option<String>,

        /// Negotiate TLS
        #[arg(long)]
        tls: bool,

        /// libpq-style sslmode (disable, require, verify-full, ...)
        #[arg(long, conflicts_with = "tls")]
        ssl_mode: Option<String>,

        /// PEM file with the CA certificate(s) to trust (implies --tls)
        #[arg(long)]
        ca: Option<PathBuf>,

        /// Skip certificate verification (implies --tls)
        #[arg(long)]
        insecure: bool,

        /// Connect timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Hex payload to send after connecting
        #[arg(long, short)]
        send: Option<String>,

        /// Exact number of reply bytes to read (default: whatever arrives)
        #[arg(long, short)]
        expect: Option<usize>,

        /// How long to wait for the reply, in milliseconds
        #[arg(long, default_value = "5000")]
        read_timeout_ms: u64,
    },

    /// List default ports of known database engines
    Ports,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Probe {
            config,
            host,
            port,
            database,
            tls,
            ssl_mode,
            ca,
            insecure,
            timeout_ms,
            send,
            expect,
            read_timeout_ms,
        } => {
            let args = probe::ProbeArgs {
                config,
                host,
                port,
                database,
                tls,
                ssl_mode,
                ca,
                insecure,
                timeout_ms,
                send,
                expect,
                read_timeout_ms,
            };
            probe::run(args).await?;
        }
        Commands::Ports => {
            ports::run();
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default: info).
fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
