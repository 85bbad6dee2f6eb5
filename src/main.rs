use std::env;
use std::process::ExitCode;

use tracing::{error, info, warn};

use quotastore::{
    Config, Credentials, ListOptions, StorageError, StorageRegistry, StorageSettings,
};

const CONFIG_FILE: &str = "quotastore.toml";
const USER_ENV_VAR: &str = "QUOTASTORE_USER";
const PASSWORD_ENV_VAR: &str = "QUOTASTORE_PASSWORD";

fn main() -> ExitCode {
    // Load configuration
    let mut config = match Config::load(CONFIG_FILE) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_FILE}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();

    // Initialize logging
    if let Err(e) = quotastore::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        quotastore::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> quotastore::Result<()> {
    let username = env::var(USER_ENV_VAR).unwrap_or_else(|_| "admin".to_string());
    let password = env::var(PASSWORD_ENV_VAR)
        .map_err(|_| StorageError::InvalidCredentials(format!("{PASSWORD_ENV_VAR} is not set")))?;
    let credentials = Credentials::new(username, password);

    let registry = StorageRegistry::init(StorageSettings::from_config(&config.storage)?);
    info!("quotastore - opening {}", config.storage.root);

    let (handle, session) = registry.open(config.storage.root_path(), &credentials)?;
    if let Some(e) = session {
        warn!("Not logged in: {e}");
    }

    let listed = handle.with(|storage| {
        if storage.current_user().is_none() {
            return Ok(Vec::new());
        }
        storage.list("/", ListOptions::new().recursive())?.lines()
    });
    match listed {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
        }
        Err(e) => error!("Listing failed: {e}"),
    }

    registry.shutdown()
}
