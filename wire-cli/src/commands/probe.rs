//! Probe a server: connect, optionally send a payload, print the reply.

use anyhow::{Context, Result};
use dbwire_client::{ConnectOptions, TransportClient};
use dbwire_core::{DatabaseKind, SslConfig, SslSpec};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Arguments of the probe command.
#[derive(Debug, Default)]
pub struct ProbeArgs {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub tls: bool,
    pub ssl_mode: Option<String>,
    pub ca: Option<PathBuf>,
    pub insecure: bool,
    pub timeout_ms: Option<u64>,
    pub send: Option<String>,
    pub expect: Option<usize>,
    pub read_timeout_ms: u64,
}

/// Run the probe command.
pub async fn run(args: ProbeArgs) -> Result<()> {
    let ca = match &args.ca {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read CA file {}", path.display()))?,
        ),
        None => None,
    };
    let options = build_options(&args, ca)?;
    let payload = args.send.as_deref().map(decode_payload).transpose()?;
    tracing::debug!(?options, "Resolved probe options");

    println!("=== dbwire probe ===");
    println!();
    println!(
        "Target:   {}:{} ({})",
        options.host,
        options.port,
        if options.tls.is_enabled() { "tls" } else { "plain" }
    );

    let client = TransportClient::tcp();
    let started = Instant::now();
    client
        .connect(&options)
        .await
        .with_context(|| format!("Failed to connect to {}:{}", options.host, options.port))?;
    println!("Connected in {} ms", started.elapsed().as_millis());

    if let Some(payload) = &payload {
        client.send(payload).await.context("Failed to send payload")?;
        println!("Sent:     {} bytes", payload.len());
    }

    if payload.is_some() || args.expect.is_some() {
        let reply = client
            .receive_within(args.expect, Duration::from_millis(args.read_timeout_ms))
            .await
            .context("Failed to read reply")?;
        println!("Received: {} bytes", reply.len());
        println!("  {}", hex::encode(&reply));
    }

    client.disconnect();
    Ok(())
}

/// Merge the config file (if any) with command-line overrides.
///
/// Port precedence: `--port`, then the config file, then the default port
/// of `--database`.
fn build_options(args: &ProbeArgs, ca: Option<String>) -> Result<ConnectOptions> {
    let database_port = match &args.database {
        Some(name) => {
            let kind = name.parse::<DatabaseKind>()?;
            let port = kind
                .default_port()
                .with_context(|| format!("{name} is not reached over TCP"))?;
            Some(port)
        }
        None => None,
    };

    let mut options = match &args.config {
        Some(path) => ConnectOptions::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let host = args
                .host
                .clone()
                .context("--host is required without --config")?;
            let port = args
                .port
                .or(database_port)
                .context("--port or --database is required without --config")?;
            ConnectOptions::new(host, port)
        }
    };

    if let Some(host) = &args.host {
        options.host = host.clone();
    }
    if let Some(port) = args.port {
        options.port = port;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        options.timeout_ms = timeout_ms;
    }

    match args.ssl_mode.as_deref().and_then(SslSpec::from_ssl_mode) {
        Some(spec) => options.tls = spec,
        None if args.tls => options.tls = SslSpec::Flag(true),
        None => {}
    }

    // CA material or --insecure only make sense with TLS.
    if ca.is_some() || args.insecure {
        let mut config = match std::mem::take(&mut options.tls) {
            SslSpec::Config(config) => config,
            SslSpec::Flag(_) => SslConfig::default(),
        };
        config.enabled = true;
        if ca.is_some() {
            config.ca = ca;
        }
        if args.insecure {
            config.reject_unauthorized = Some(false);
        }
        options.tls = SslSpec::Config(config);
    }

    options.validate()?;
    Ok(options)
}

/// Decode a hex payload, ignoring whitespace and a leading `0x`.
fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact.strip_prefix("0x").unwrap_or(&compact);
    hex::decode(digits).context("--send must be a hex string")
}
