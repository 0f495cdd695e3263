// DeskKit - persistence diagnostics CLI
//
// Drives the same startup sequence a desktop host runs, so operators can see
// which storage mode a machine resolves to and why.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use deskkit::models::descriptor::ConnectionDescriptor;
use deskkit::services::encryption::generate_key;
use deskkit::state::AppState;
use deskkit::storage::config::ConfigService;
use deskkit::utils::paths;
use deskkit_core::{SettingKey, StorageMode};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "deskkit")]
#[command(about = "Inspect and configure DeskKit persistence", long_about = None)]
struct Cli {
    /// Data directory (defaults to $DESKKIT_DATA_DIR or ~/.deskkit)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Passphrase protecting settings and the bootstrap config
    #[arg(long, env = "DESKKIT_PASSPHRASE", hide_env_values = true, global = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the storage mode and print it
    Resolve,

    /// Run health checks and print the report as JSON
    Health,

    /// Request a storage mode for the next startup
    SetMode {
        /// Local or Database
        mode: String,
    },

    /// Save the encrypted database bootstrap configuration
    SetBootstrap {
        #[arg(long)]
        server: String,
        #[arg(long)]
        database: String,
        /// SQL login; omit for integrated security
        #[arg(long)]
        user: Option<String>,
        #[arg(long, requires = "user")]
        password: Option<String>,
        #[arg(long, default_value = "1433")]
        port: u16,
    },

    /// Remove the bootstrap configuration
    ClearBootstrap,

    /// Print a setting's stored text
    Get {
        category: String,
        key: String,
        /// Read the user-scoped value for this user id
        #[arg(long)]
        user: Option<Uuid>,
    },

    /// Store a setting as text
    Set {
        category: String,
        key: String,
        value: String,
        /// Write the user-scoped value for this user id
        #[arg(long)]
        user: Option<Uuid>,
    },

    /// Print the runtime config, updating any fields given
    Config {
        /// Attempts per database operation, including the first
        #[arg(long)]
        max_retries: Option<u32>,
        /// Base backoff delay between attempts
        #[arg(long)]
        retry_delay_ms: Option<u64>,
        /// Connectivity probe timeout at startup
        #[arg(long)]
        probe_timeout_secs: Option<u64>,
    },

    /// Print a random base64 encryption key
    GenerateKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::GenerateKey = cli.command {
        println!("{}", generate_key());
        return Ok(());
    }

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => paths::data_dir()?,
    };

    if let Commands::Config {
        max_retries,
        retry_delay_ms,
        probe_timeout_secs,
    } = cli.command
    {
        return update_config(&data_dir, max_retries, retry_delay_ms, probe_timeout_secs);
    }
    let passphrase = cli
        .passphrase
        .ok_or_else(|| anyhow!("a passphrase is required (--passphrase or DESKKIT_PASSPHRASE)"))?;

    let state = AppState::open(&data_dir, &passphrase)
        .with_context(|| format!("opening {}", data_dir.display()))?;
    let mode = state.initialize().await?;

    match cli.command {
        Commands::Resolve => {
            let resolution = state
                .resolver()
                .cached()
                .ok_or_else(|| anyhow!("storage mode was not resolved"))?;
            println!("requested: {}", state.resolver().requested_mode().await);
            println!("resolved:  {} ({:?})", resolution.mode(), resolution.reason());
            println!("effective: {}", mode);
        }
        Commands::Health => {
            let report = state.health().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::SetMode { mode } => {
            let requested: StorageMode = mode.parse()?;
            state.resolver().set_requested_mode(requested).await?;
            println!("Storage mode {} requested; restart to apply", requested);
        }
        Commands::SetBootstrap {
            server,
            database,
            user,
            password,
            port,
        } => {
            let descriptor = match user {
                Some(user) => ConnectionDescriptor::with_credentials(
                    server,
                    database,
                    user,
                    password.unwrap_or_default(),
                ),
                None => ConnectionDescriptor::integrated(server, database),
            }
            .port(port);
            state.bootstrap().save(&descriptor).await?;
            println!("Saved {}", state.bootstrap().path().display());
        }
        Commands::ClearBootstrap => {
            state.bootstrap().clear().await?;
            println!("Bootstrap configuration removed");
        }
        Commands::Get {
            category,
            key,
            user,
        } => {
            let key = match user {
                Some(user_id) => SettingKey::user(user_id, category, key),
                None => SettingKey::app(category, key),
            };
            match state.settings().await?.get_raw(&key).await? {
                Some(value) => println!("{}", value),
                None => println!("(not set)"),
            }
        }
        Commands::Set {
            category,
            key,
            value,
            user,
        } => {
            let settings = state.settings().await?;
            match user {
                Some(user_id) => settings.set_user(user_id, &category, &key, &value).await?,
                None => settings.set(&category, &key, &value).await?,
            }
            println!("{}/{} saved ({} mode)", category, key, settings.storage_mode());
        }
        Commands::Config { .. } | Commands::GenerateKey => {}
    }

    state.shutdown().await?;
    Ok(())
}

fn update_config(
    data_dir: &std::path::Path,
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    probe_timeout_secs: Option<u64>,
) -> Result<()> {
    let mut service = ConfigService::new(data_dir)
        .with_context(|| format!("reading runtime config in {}", data_dir.display()))?;

    if max_retries.is_some() || retry_delay_ms.is_some() || probe_timeout_secs.is_some() {
        let mut config = service.config().clone();
        if let Some(count) = max_retries {
            config.retry.max_retry_count = count;
        }
        if let Some(delay) = retry_delay_ms {
            config.retry.retry_delay_ms = delay;
        }
        if let Some(timeout) = probe_timeout_secs {
            config.probe_timeout_secs = timeout;
        }
        service.update(config)?;
        println!("Updated {}", service.path().display());
    }

    println!("{}", serde_json::to_string_pretty(service.config())?);
    Ok(())
}
