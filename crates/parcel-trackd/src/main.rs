// # parcel-trackd - Parcel Tracker Daemon
//
// Thin integration layer over parcel-core and parcel-provider-dhl:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Running the setup wizard, or one poll coordinator per stored entry
//
// Polling, validation and projection logic lives in parcel-core.
//
// ## Commands
//
// - `parcel-trackd`: poll every stored entry until SIGINT/SIGTERM
// - `parcel-trackd setup`: interactive setup wizard over stdin/stdout
// - `parcel-trackd list`: print stored entries
// - `parcel-trackd remove <unique_id>`: delete a stored entry
//
// ## Configuration
//
// - `PARCEL_STORE_PATH`: Config store file (default `parcel-tracker.json`)
// - `PARCEL_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `PARCEL_DHL_REGION`: DHL API region (default `eu`)
// - `PARCEL_SETUP_POLICY`: lenient or strict (default lenient)
// - `PARCEL_SETUP_OFFER_SECRET`: true or false (default true)
//
// ## Example
//
// ```bash
// export PARCEL_STORE_PATH=/var/lib/parcel/tracker.json
// parcel-trackd setup
// parcel-trackd
// ```

use anyhow::Result;
use parcel_core::config::{DEFAULT_POLL_INTERVAL_MINUTES, TrackerConfig};
use parcel_core::setup::{
    CredentialsInput, FieldKind, FormField, SetupStep, TrackingInput, FIELD_API_KEY,
    FIELD_API_SECRET, FIELD_POLL_INTERVAL,
};
use parcel_core::{
    ConfigStore, CoordinatorEvent, FileConfigStore, PollCoordinator, SetupFlow, SetupOptions,
    ShipmentSourceFactory, Snapshot, StepOutcome, ValidationPolicy, entities_for,
};
use parcel_provider_dhl::{DhlClientFactory, ReqwestTransport, Transport};
use std::env;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
/// - 3: Credentials rejected, reconfiguration needed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackdExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
    /// At least one entry stopped polling because its credentials were rejected
    AuthFailure = 3,
}

impl From<TrackdExitCode> for ExitCode {
    fn from(code: TrackdExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Subcommand
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Run,
    Setup,
    List,
    Remove(String),
}

impl Command {
    fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let command = match args.next().as_deref() {
            None | Some("run") => Command::Run,
            Some("setup") => Command::Setup,
            Some("list") => Command::List,
            Some("remove") => match args.next() {
                Some(id) => Command::Remove(id),
                None => anyhow::bail!("Usage: parcel-trackd remove <unique_id>"),
            },
            Some(other) => anyhow::bail!(
                "Unknown command '{}'. Valid commands: run, setup, list, remove",
                other
            ),
        };

        if let Some(extra) = args.next() {
            anyhow::bail!("Unexpected argument '{}'", extra);
        }

        Ok(command)
    }
}

/// Application configuration
struct Config {
    command: Command,
    store_path: String,
    log_level: String,
    region: String,
    setup_policy: String,
    offer_secret: String,
}

impl Config {
    /// Load configuration from the command line and environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            command: Command::from_args(env::args().skip(1))?,
            store_path: env::var("PARCEL_STORE_PATH")
                .unwrap_or_else(|_| "parcel-tracker.json".to_string()),
            log_level: env::var("PARCEL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            region: env::var("PARCEL_DHL_REGION").unwrap_or_else(|_| "eu".to_string()),
            setup_policy: env::var("PARCEL_SETUP_POLICY")
                .unwrap_or_else(|_| "lenient".to_string()),
            offer_secret: env::var("PARCEL_SETUP_OFFER_SECRET")
                .unwrap_or_else(|_| "true".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.store_path.trim().is_empty() {
            anyhow::bail!(
                "PARCEL_STORE_PATH cannot be empty. \
                Set it via: export PARCEL_STORE_PATH=/var/lib/parcel/tracker.json"
            );
        }

        // The region is interpolated into the API host name
        if self.region.is_empty()
            || !self
                .region
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            anyhow::bail!(
                "PARCEL_DHL_REGION '{}' is not valid. Example: eu",
                self.region
            );
        }

        self.setup_options()?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PARCEL_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Wizard options from PARCEL_SETUP_POLICY and PARCEL_SETUP_OFFER_SECRET
    fn setup_options(&self) -> Result<SetupOptions> {
        let validation_policy: ValidationPolicy = self
            .setup_policy
            .parse()
            .map_err(|e| anyhow::anyhow!("PARCEL_SETUP_POLICY: {}", e))?;

        let offer_secret = match self.offer_secret.to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => anyhow::bail!(
                "PARCEL_SETUP_OFFER_SECRET '{}' is not valid. Valid: true, false",
                self.offer_secret
            ),
        };

        Ok(SetupOptions {
            validation_policy,
            offer_secret,
        })
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return TrackdExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return TrackdExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return TrackdExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return TrackdExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let outcome = match config.command.clone() {
            Command::Run => run_daemon(&config).await,
            Command::Setup => run_setup(&config).await,
            Command::List => list_entries(&config).await,
            Command::Remove(id) => remove_entry(&config, &id).await,
        };

        outcome.unwrap_or_else(|e| {
            error!("{}", e);
            TrackdExitCode::RuntimeError
        })
    });

    result.into()
}

/// Shared factory for DHL clients; all clients share one connection pool
fn client_factory(config: &Config) -> Result<Arc<DhlClientFactory>> {
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new()?);
    Ok(Arc::new(DhlClientFactory::new(
        config.region.clone(),
        transport,
    )))
}

/// Poll every stored entry until a shutdown signal arrives
async fn run_daemon(config: &Config) -> Result<TrackdExitCode> {
    info!("Starting parcel-trackd");

    let store = FileConfigStore::new(&config.store_path).await?;
    let entries = store.list().await?;
    if entries.is_empty() {
        error!(
            "No entries in {}. Run `parcel-trackd setup` first.",
            config.store_path
        );
        return Ok(TrackdExitCode::ConfigError);
    }
    info!("Loaded {} entries from {}", entries.len(), config.store_path);

    let factory = client_factory(config)?;
    let mut shutdown_senders = Vec::with_capacity(entries.len());
    let mut coordinators = JoinSet::new();

    for entry in entries {
        let source = factory.create(&entry.data.credentials)?;
        let (coordinator, events) =
            PollCoordinator::new(entry.unique_id.clone(), source, &entry.data)?;

        tokio::spawn(log_events(entry.unique_id.clone(), events));
        tokio::spawn(render_entities(entry.data.clone(), coordinator.subscribe()));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        shutdown_senders.push(shutdown_tx);

        let id = entry.unique_id;
        coordinators.spawn(async move {
            let result = coordinator.run_until(shutdown_rx).await;
            (id, result)
        });
    }

    let mut auth_failures = 0;
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                info!("Received shutdown signal: {}", signal?);
                break;
            }
            joined = coordinators.join_next() => match joined {
                Some(joined) => record_exit(joined, &mut auth_failures),
                None => {
                    warn!("All coordinators stopped");
                    break;
                }
            }
        }
    }

    info!("Shutting down");
    for tx in shutdown_senders {
        // Already finished coordinators dropped their receiver
        let _ = tx.send(());
    }
    while let Some(joined) = coordinators.join_next().await {
        record_exit(joined, &mut auth_failures);
    }

    if auth_failures > 0 {
        Ok(TrackdExitCode::AuthFailure)
    } else {
        Ok(TrackdExitCode::CleanShutdown)
    }
}

fn record_exit(
    joined: std::result::Result<(String, parcel_core::Result<()>), JoinError>,
    auth_failures: &mut usize,
) {
    match joined {
        Ok((id, Ok(()))) => info!("[{}] Stopped", id),
        Ok((id, Err(e))) if e.is_auth() => {
            *auth_failures += 1;
            error!(
                "[{}] {}. Remove the entry and run `parcel-trackd setup` with new credentials.",
                id, e
            );
        }
        Ok((id, Err(e))) => error!("[{}] Stopped with error: {}", id, e),
        Err(e) => error!("Coordinator task failed: {}", e),
    }
}

async fn log_events(id: String, mut events: mpsc::Receiver<CoordinatorEvent>) {
    while let Some(event) = events.recv().await {
        debug!("[{}] {:?}", id, event);
    }
}

/// Re-render every entity of an entry whenever a new snapshot is published
async fn render_entities(config: TrackerConfig, mut snapshots: watch::Receiver<Arc<Snapshot>>) {
    let entities = entities_for(&config);

    while snapshots.changed().await.is_ok() {
        let snapshot = Arc::clone(&*snapshots.borrow_and_update());
        for entity in &entities {
            match serde_json::to_string(&entity.render(&snapshot)) {
                Ok(json) => info!("{}", json),
                Err(e) => warn!("Failed to render {}: {}", entity.unique_id(), e),
            }
        }
    }
}

/// Interactive setup wizard
async fn run_setup(config: &Config) -> Result<TrackdExitCode> {
    let store: Arc<dyn ConfigStore> = Arc::new(FileConfigStore::new(&config.store_path).await?);
    let factory: Arc<dyn ShipmentSourceFactory> = client_factory(config)?;
    let mut flow = SetupFlow::new(factory, store, config.setup_options()?);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut outcome = flow.start();
    loop {
        outcome = match outcome {
            StepOutcome::Form {
                step,
                fields,
                error,
            } => {
                if let Some(error) = error {
                    println!("Error: {}", error.message());
                }
                match step {
                    SetupStep::Credentials => {
                        let input = prompt_credentials(&mut lines, &fields).await?;
                        flow.submit_credentials(input)
                    }
                    SetupStep::Tracking => {
                        let input = prompt_tracking(&mut lines).await?;
                        flow.submit_tracking(input).await
                    }
                }
            }
            StepOutcome::Created(entry) => {
                println!("Created {} ({})", entry.title, entry.unique_id);
                return Ok(TrackdExitCode::CleanShutdown);
            }
            StepOutcome::Aborted(reason) => {
                println!("Setup aborted: {}", reason.code());
                return Ok(TrackdExitCode::ConfigError);
            }
        };
    }
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    print!("{}: ", label);
    std::io::stdout().flush()?;

    match lines.next_line().await? {
        Some(line) => Ok(line),
        None => anyhow::bail!("Input closed during setup"),
    }
}

async fn prompt_credentials(
    lines: &mut Lines<BufReader<Stdin>>,
    fields: &[FormField],
) -> Result<CredentialsInput> {
    let mut input = CredentialsInput::default();

    for field in fields {
        match (field.name, field.kind) {
            (FIELD_API_KEY, _) => input.api_key = prompt(lines, "DHL API key").await?,
            (FIELD_API_SECRET, _) => {
                let secret = prompt(lines, "DHL API secret (optional)").await?;
                input.api_secret = Some(secret).filter(|s| !s.trim().is_empty());
            }
            (FIELD_POLL_INTERVAL, FieldKind::Integer { min, max }) => {
                let label = format!(
                    "Poll interval in minutes ({}-{}, default {})",
                    min, max, DEFAULT_POLL_INTERVAL_MINUTES
                );
                input.poll_interval_minutes = loop {
                    let raw = prompt(lines, &label).await?;
                    let raw = raw.trim();
                    if raw.is_empty() {
                        break None;
                    }
                    match raw.parse::<u32>() {
                        Ok(minutes) => break Some(minutes),
                        Err(_) => println!("Please enter a whole number of minutes"),
                    }
                };
            }
            (other, _) => debug!("Ignoring unknown field {}", other),
        }
    }

    Ok(input)
}

async fn prompt_tracking(lines: &mut Lines<BufReader<Stdin>>) -> Result<TrackingInput> {
    println!("Tracking numbers, separated by commas or one per line; empty line to finish");

    let mut numbers = Vec::new();
    loop {
        let line = prompt(lines, ">").await?;
        if line.trim().is_empty() {
            break;
        }
        numbers.push(line);
    }

    Ok(TrackingInput {
        tracking_numbers: numbers.join("\n"),
    })
}

async fn list_entries(config: &Config) -> Result<TrackdExitCode> {
    let store = FileConfigStore::new(&config.store_path).await?;
    for entry in store.list().await? {
        println!(
            "{}\t{}\t{} min\t{}",
            entry.unique_id,
            entry.title,
            entry.data.poll_interval_minutes,
            entry.created_at.to_rfc3339()
        );
    }
    Ok(TrackdExitCode::CleanShutdown)
}

async fn remove_entry(config: &Config, unique_id: &str) -> Result<TrackdExitCode> {
    let store = FileConfigStore::new(&config.store_path).await?;
    if !store.contains(unique_id).await? {
        error!("No entry {} in {}", unique_id, config.store_path);
        return Ok(TrackdExitCode::ConfigError);
    }

    store.remove(unique_id).await?;
    info!("Removed {}", unique_id);
    Ok(TrackdExitCode::CleanShutdown)
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    fn config() -> Config {
        Config {
            command: Command::Run,
            store_path: "parcel-tracker.json".to_string(),
            log_level: "info".to_string(),
            region: "eu".to_string(),
            setup_policy: "lenient".to_string(),
            offer_secret: "true".to_string(),
        }
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::from_args(args(&[])).unwrap(), Command::Run);
        assert_eq!(Command::from_args(args(&["setup"])).unwrap(), Command::Setup);
        assert_eq!(
            Command::from_args(args(&["remove", "parcel_tracker_1"])).unwrap(),
            Command::Remove("parcel_tracker_1".to_string())
        );
        assert!(Command::from_args(args(&["remove"])).is_err());
        assert!(Command::from_args(args(&["frobnicate"])).is_err());
        assert!(Command::from_args(args(&["list", "extra"])).is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.setup_options().unwrap(), SetupOptions::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut bad_region = config();
        bad_region.region = "eu.evil.com/".to_string();
        assert!(bad_region.validate().is_err());

        let mut bad_policy = config();
        bad_policy.setup_policy = "sometimes".to_string();
        assert!(bad_policy.validate().is_err());

        let mut bad_secret_flag = config();
        bad_secret_flag.offer_secret = "maybe".to_string();
        assert!(bad_secret_flag.validate().is_err());

        let mut bad_level = config();
        bad_level.log_level = "loud".to_string();
        assert!(bad_level.validate().is_err());
    }

    #[test]
    fn test_setup_options_from_env_values() {
        let mut config = config();
        config.setup_policy = "STRICT".to_string();
        config.offer_secret = "false".to_string();

        let options = config.setup_options().unwrap();
        assert_eq!(options.validation_policy, ValidationPolicy::Strict);
        assert!(!options.offer_secret);
    }

    #[test]
    fn test_core_errors_keep_their_kind_at_the_edge() {
        let err: anyhow::Error = parcel_core::Error::auth("rejected").into();
        let core = err
            .downcast_ref::<parcel_core::Error>()
            .expect("core error survives conversion");
        assert!(core.is_auth());
        assert!(err.to_string().contains("rejected"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(TrackdExitCode::CleanShutdown as u8, 0);
        assert_eq!(TrackdExitCode::ConfigError as u8, 1);
        assert_eq!(TrackdExitCode::RuntimeError as u8, 2);
        assert_eq!(TrackdExitCode::AuthFailure as u8, 3);
    }
}
