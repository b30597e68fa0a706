//! DL-CLI: command line client for esp32m devices.
//!
//! Talks to one device over its WebSocket control endpoint, batching and
//! correlating requests through `dl-04-client`.
//!
//! ## Usage
//!
//! ```bash
//! # Device info from the default access-point address
//! dl-cli request info-get
//!
//! # Module state with a payload and a tighter timeout
//! dl-cli --url ws://10.0.0.7/ws request state-get --target gpio --data '{"pins":[2]}' --timeout-ms 2000
//!
//! # Stream device frames while keeping two modules polled
//! dl-cli watch --poll gpio --poll wifi
//! ```

mod supervisor;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dl_04_client::{Client, ClientConfig, DeviceApi, RequestOptions, StateRegistration};
use dl_telemetry::{init_telemetry, TelemetryConfig};
use serde_json::Value;
use tracing::info;

use supervisor::{supervise, Backoff};

/// esp32m device client
#[derive(Parser, Debug)]
#[command(name = "dl-cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device WebSocket URL (defaults to DL_URL, then the access-point address)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Log filter, e.g. `debug` or `dl_04_client=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Do not reopen the connection after it drops
    #[arg(long, global = true)]
    no_reconnect: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request and print the response data as JSON
    Request {
        /// Request name, e.g. `info-get` or `state-set`
        name: String,

        /// Module to address; omitted means every module
        #[arg(long)]
        target: Option<String>,

        /// JSON payload
        #[arg(long)]
        data: Option<String>,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Print frames received from the device until interrupted
    Watch {
        /// Keep this module's state polled (repeatable)
        #[arg(long)]
        poll: Vec<String>,

        /// Print only broadcasts
        #[arg(long)]
        broadcasts: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if let Some(level) = &args.log_level {
        telemetry = telemetry.with_log_level(level);
    }
    init_telemetry(&telemetry)?;

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &args.url {
        config = config.with_url(url);
        config.validate()?;
    }

    let client = Client::connect_websocket(config)?;
    client.open();
    let supervisor = (!args.no_reconnect)
        .then(|| tokio::spawn(supervise(client.clone(), Backoff::default())));

    let outcome = match args.command {
        Command::Request {
            name,
            target,
            data,
            timeout_ms,
        } => run_request(&client, target.as_deref(), &name, data, timeout_ms).await,
        Command::Watch { poll, broadcasts } => run_watch(&client, &poll, broadcasts).await,
    };

    client.close();
    if let Some(supervisor) = supervisor {
        let _ = supervisor.await;
    }
    outcome
}

async fn run_request(
    client: &Client,
    target: Option<&str>,
    name: &str,
    data: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let data = data
        .map(|raw| serde_json::from_str::<Value>(&raw))
        .transpose()
        .context("--data is not valid JSON")?;
    let options = timeout_ms
        .map(|ms| RequestOptions::with_timeout(Duration::from_millis(ms)))
        .unwrap_or_default();

    let response = client
        .request(target, name, data, options)
        .await
        .with_context(|| format!("{name} failed"))?;

    info!(source = %response.source, seq = response.seq, "Response received");
    println!(
        "{}",
        serde_json::to_string_pretty(&response.data.unwrap_or(Value::Null))?
    );
    Ok(())
}

async fn run_watch(client: &Client, poll: &[String], broadcasts: bool) -> Result<()> {
    let _registrations: Vec<StateRegistration> = poll
        .iter()
        .map(|module| client.module(module).use_state(None))
        .collect::<Result<_, _>>()?;

    let mut frames = if broadcasts {
        client.broadcasts()
    } else {
        client.incoming()
    };
    let mut changes = client.status_changes();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => println!("{frame}"),
                None => return Ok(()),
            },
            change = changes.recv() => {
                if let Some(change) = change {
                    info!(
                        from = ?change.previous,
                        to = ?change.current,
                        detail = change.detail.as_deref().unwrap_or(""),
                        "Connection status changed"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing");
                return Ok(());
            }
        }
    }
}
