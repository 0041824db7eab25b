//! Tail the realtime trace feed of a device endpoint.
//!
//! Run with: cargo run -p trace-tail -- --host 192.168.1.20 --holographic
//!
//! Records go to stdout, diagnostics to stderr (`RUST_LOG` controls them).

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use futures::StreamExt;
use trace_relay_core::{
    CredentialStore, DeviceFamily, RecordFeed, RelayConfig, RelayEvent, SessionState, Severity,
    TraceRecord,
    config::{DEFAULT_HOST, DEFAULT_PROVIDER, DEFAULT_VERBOSITY},
};
use trace_relay_session::{
    SessionController,
    storage::{FileCredentialStore, MemoryCredentialStore},
};
use trace_relay_transport::WsConnector;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Stream trace records from a device's realtime session endpoint.
#[derive(Parser, Debug)]
#[command(name = "trace-tail")]
#[command(version, about, long_about = None)]
struct Args {
    /// Endpoint host
    #[arg(long, env = "TRACE_RELAY_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Endpoint port (defaults to 443 with --holographic, 50443 otherwise)
    #[arg(short, long, env = "TRACE_RELAY_PORT")]
    port: Option<u16>,

    /// Target is a holographic device
    #[arg(long)]
    holographic: bool,

    /// Username; overrides the cached credential
    #[arg(short, long, env = "TRACE_RELAY_USER")]
    user: Option<String>,

    /// Password; overrides the cached credential
    #[arg(long, env = "TRACE_RELAY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Credential vault file (defaults to the user config directory)
    #[arg(long)]
    vault: Option<PathBuf>,

    /// Trace provider GUID
    #[arg(long, default_value = DEFAULT_PROVIDER)]
    provider: String,

    /// Provider verbosity (0-5)
    #[arg(long, default_value_t = DEFAULT_VERBOSITY, value_parser = clap::value_parser!(u8).range(0..=5))]
    verbosity: u8,

    /// Attach again this many seconds after the session ends
    #[arg(long)]
    reattach: Option<u64>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let family = if args.holographic {
        DeviceFamily::Holographic
    } else {
        DeviceFamily::Desktop
    };
    let config = RelayConfig::for_device(family).with_provider(&args.provider, args.verbosity);
    let port = args.port.unwrap_or(config.port);

    let controller = SessionController::new(WsConnector::new()?, open_vault(args.vault), config);
    if let (Some(user), Some(password)) = (args.user, args.password) {
        controller.set_credential(user, password);
    }

    let printer = tokio::spawn(print_feed(controller.feed(), args.format));

    loop {
        // Failures are published on the feed; the loop only decides on retry.
        let _ = controller.attach(&args.host, port).await;

        let mut state = controller.subscribe_state();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                controller.detach().await;
                break;
            }
            _ = state.wait_for(|s| !s.is_connected()) => {}
        }

        let Some(secs) = args.reattach else {
            break;
        };
        tracing::info!("Attaching again in {secs}s");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = tokio::time::sleep(Duration::from_secs(secs)) => {}
        }
    }

    printer.abort();

    match controller.state() {
        SessionState::Failed(reason) => anyhow::bail!(reason),
        _ => Ok(()),
    }
}

fn open_vault(path: Option<PathBuf>) -> Arc<dyn CredentialStore> {
    if let Some(path) = path {
        return Arc::new(FileCredentialStore::new(path));
    }
    match FileCredentialStore::in_config_dir() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("Credentials will not be cached: {e}");
            Arc::new(MemoryCredentialStore::new())
        }
    }
}

async fn print_feed(feed: Arc<RecordFeed>, format: OutputFormat) {
    let mut events = feed.history_plus_stream();
    while let Some(event) = events.next().await {
        match event {
            RelayEvent::Records(records) => {
                for record in &records {
                    print_record(record, format);
                }
            }
            RelayEvent::State(SessionState::Failed(reason)) => {
                tracing::error!("Connection failed: {reason}");
            }
            RelayEvent::State(state) => tracing::info!(?state, "Connection state changed"),
            RelayEvent::Lagged(skipped) => {
                tracing::warn!("Output fell behind; {skipped} feed events were dropped");
            }
        }
    }
}

fn print_record(record: &TraceRecord, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            let marker = match record.level.severity() {
                Severity::Error => "E",
                Severity::Warning => "W",
                Severity::Info => "I",
            };
            println!("{} {marker} {}", record.display_timestamp(), record.message);
        }
        OutputFormat::Json => match serde_json::to_string(record) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!("Failed to serialize record: {e}"),
        },
    }
}
