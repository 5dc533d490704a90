//! edsts-relay - forwards Elite Dangerous journal events to the EDStS API
//!
//! # Usage
//!
//! ```bash
//! # Follow the live journal
//! tail -F "$JOURNAL_DIR"/Journal.*.log | edsts-relay
//!
//! # Replay a journal file, 200 ms between entries
//! edsts-relay --journal Journal.2024-05-01T100000.01.log --replay-delay-ms 200
//!
//! # Check an API key once
//! edsts-relay verify --key "$KEY"
//! ```
//!
//! # Environment Variables
//!
//! - `EDSTS_CONFIG`: path to the TOML config file
//! - `EDSTS_API_KEY`, `EDSTS_PERMISSIONS`: credential overrides
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::Parser;
use edsts_relay::delivery::ConnectionVerifier;
use edsts_relay::pipeline::source::{FileSource, JournalSource, SourceEvent, StdinSource};
use edsts_relay::{
    ConnectionState, HttpTransport, JournalStateTracker, Relay, RelayConfig, Route, SettingsStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "edsts-relay")]
#[command(about = "Relay Elite Dangerous journal events to the EDStS API")]
#[command(version)]
struct CliArgs {
    /// Replay this journal file instead of reading JSON lines from stdin
    #[arg(long, value_name = "PATH")]
    journal: Option<PathBuf>,

    /// Pause between replayed journal entries
    #[arg(long, default_value = "0", requires = "journal")]
    replay_delay_ms: u64,

    /// Config file (overrides EDSTS_CONFIG and ./edsts_relay.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Print the URL for creating an account and API key
    Register,

    /// Check an API key against the service and exit
    Verify {
        /// Key to check (default: the configured key)
        #[arg(long)]
        key: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<RelayConfig> {
    match path {
        Some(path) => {
            let mut config = RelayConfig::load_from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => Ok(RelayConfig::load()),
    }
}

// ============================================================================
// Subcommands
// ============================================================================

async fn run_verify(config: &RelayConfig, key: Option<String>) -> Result<()> {
    let store = Arc::new(SettingsStore::from_config(&config.credentials));
    let transport = Arc::new(HttpTransport::new(&config.api).context("building HTTP client")?);
    let connection = Arc::new(ConnectionState::new());
    let verifier = ConnectionVerifier::new(transport, store, Arc::clone(&connection));

    let valid = match key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => verifier.verify_key(key).await,
        None => verifier.verify().await,
    };

    println!("{}", connection.snapshot());
    if !valid {
        bail!("API key was not accepted");
    }
    Ok(())
}

// ============================================================================
// Relay Loop
// ============================================================================

async fn run_relay<S: JournalSource>(
    config: RelayConfig,
    mut source: S,
    cancel_token: CancellationToken,
) -> Result<()> {
    let store = Arc::new(SettingsStore::from_config(&config.credentials));
    let transport = Arc::new(HttpTransport::new(&config.api).context("building HTTP client")?);
    info!(base_url = transport.base_url(), "EDStS relay");
    let relay = Relay::new(&config, store, transport).context("invalid relay config")?;

    // The timer task checks the key right away; events are dropped until it is accepted
    relay.start();

    info!(source = source.source_name(), "Reading journal");
    let mut tracker = JournalStateTracker::new();
    let mut routed = 0u64;

    let result = loop {
        let next = tokio::select! {
            () = cancel_token.cancelled() => break Ok(()),
            next = source.next_event() => next,
        };

        match next {
            Ok(SourceEvent::Event(event)) => {
                let aux = tracker.observe(&event);
                let name = event.name().to_string();
                let route = relay.on_event(event, aux);
                if route != Route::Ignored {
                    routed += 1;
                }
                debug!(event = %name, ?route, "Journal entry handled");
            }
            Ok(SourceEvent::Eof) => {
                info!(source = source.source_name(), "End of journal");
                break Ok(());
            }
            Err(e) => break Err(e).context("reading journal"),
        }
    };

    relay.stop().await;

    let health = relay.health();
    info!(
        routed,
        delivered = health.general.delivered + health.fleet_carrier.delivered,
        skipped_disconnected = health.skipped_disconnected,
        "Relay finished"
    );
    match serde_json::to_string(&health) {
        Ok(json) => debug!(health = %json, "Final relay health"),
        Err(e) => warn!(error = %e, "Could not serialize relay health"),
    }

    result
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    let config = load_config(args.config.as_ref())?;

    match args.command {
        Some(SubCommand::Register) => {
            println!("{}", config.api.register_url());
            return Ok(());
        }
        Some(SubCommand::Verify { key }) => return run_verify(&config, key).await,
        Some(SubCommand::Config) => {
            print!("{}", config.to_toml()?);
            return Ok(());
        }
        None => {}
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down");
        shutdown_token.cancel();
    });

    match args.journal {
        Some(path) => {
            let delay = Duration::from_millis(args.replay_delay_ms);
            let source = FileSource::open(&path, delay).await?;
            run_relay(config, source, cancel_token).await
        }
        None => run_relay(config, StdinSource::new(), cancel_token).await,
    }
}
