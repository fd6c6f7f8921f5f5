// src/cli.rs
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::crypto;
use crate::error::{AppError, AppResult, StoreError};
use crate::generator::{self, PasswordCriteria};
use crate::server;
use crate::state::AppState;
use crate::store::RecordStore;

/// A multi-user password vault served over HTTP.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file. Defaults to the platform config directory.
    #[clap(long, global = true, value_parser)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct VaultArgs {
    /// Vault file, overriding `storage.data_file`
    #[clap(long, value_parser)]
    pub data_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        #[clap(flatten)]
        vault: VaultArgs,
        /// Port to listen on, overriding `server.port`
        #[clap(short, long)]
        port: Option<u16>,
    },
    /// Provision a user account
    AddUser {
        username: String,
        #[clap(flatten)]
        vault: VaultArgs,
    },
    /// Print a generated password
    Generate {
        #[clap(short, long, default_value_t = 20)]
        length: usize,
        #[clap(long)]
        no_uppercase: bool,
        #[clap(long)]
        no_lowercase: bool,
        #[clap(long)]
        no_numbers: bool,
        #[clap(long)]
        no_symbols: bool,
    },
}

pub async fn handle_cli_command(cli: Cli) -> AppResult<()> {
    log::debug!("Handling CLI command: {:?}", cli.command);
    match cli.command {
        Commands::Serve { vault, port } => {
            let mut config = config::load_config(cli.config.as_deref())?;
            apply_overrides(&mut config, &vault, port);
            let store = open_store(&config)?;
            server::serve(AppState::new(store, config)).await?;
            Ok(())
        }
        Commands::AddUser { username, vault } => {
            let mut config = config::load_config(cli.config.as_deref())?;
            apply_overrides(&mut config, &vault, None);
            let store = open_store(&config)?;

            let password = prompt(&format!("Password for {}: ", username))?;
            let confirm = prompt("Confirm password: ")?;
            if password != confirm {
                log::warn!("Password confirmation for {} did not match.", username);
                return Err(AppError::Cli("Passwords do not match.".to_string()));
            }
            if password.is_empty() {
                return Err(AppError::Cli("Password cannot be empty.".to_string()));
            }

            let hash = crypto::hash_password(&password, &config.argon2_params)?;
            match store.create_user(&username, &hash) {
                Ok(user) => {
                    println!("Created user {} with id {}.", user.username, user.id);
                    Ok(())
                }
                Err(StoreError::DuplicateUsername(name)) => {
                    Err(AppError::Cli(format!("User `{}` already exists.", name)))
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::Generate {
            length,
            no_uppercase,
            no_lowercase,
            no_numbers,
            no_symbols,
        } => {
            let criteria = PasswordCriteria {
                length,
                use_uppercase: !no_uppercase,
                use_lowercase: !no_lowercase,
                use_numbers: !no_numbers,
                use_symbols: !no_symbols,
            };
            let password = generator::generate_password(&criteria).map_err(AppError::Cli)?;
            println!("{}", password);
            Ok(())
        }
    }
}

fn apply_overrides(config: &mut Config, vault: &VaultArgs, port: Option<u16>) {
    if let Some(path) = &vault.data_file {
        config.storage.data_file = Some(path.clone());
    }
    if let Some(port) = port {
        config.server.port = port;
    }
}

fn open_store(config: &Config) -> AppResult<RecordStore> {
    let path = config.data_file()?;
    let master_password = read_master_password(config, &path)?;
    match RecordStore::open(&path, &master_password, &config.argon2_params) {
        Ok(store) => Ok(store),
        Err(StoreError::WrongMasterPassword) => Err(AppError::Cli(format!(
            "Master password does not unlock {:?}.",
            path
        ))),
        Err(e) => {
            log::error!("Failed to open vault {:?}: {}", path, e);
            Err(e.into())
        }
    }
}

/// Master password from the configured environment variable, else from the
/// terminal. A new vault asks for confirmation.
fn read_master_password(config: &Config, path: &Path) -> AppResult<String> {
    let env_name = &config.vault.master_password_env;
    let password = match std::env::var(env_name) {
        Ok(value) => {
            log::info!("Using master password from ${}", env_name);
            value
        }
        Err(_) if path.exists() => prompt("Master password: ")?,
        Err(_) => {
            println!("Creating a new vault at {:?}", path);
            let password = prompt("New master password: ")?;
            if password != prompt("Confirm master password: ")? {
                log::warn!("Master password confirmation failed: passwords do not match.");
                return Err(AppError::Cli("Passwords do not match.".to_string()));
            }
            password
        }
    };

    if password.is_empty() {
        log::warn!("Master password cannot be empty.");
        return Err(AppError::Cli("Master password cannot be empty.".to_string()));
    }
    Ok(password)
}

fn prompt(message: &str) -> AppResult<String> {
    rpassword::prompt_password(message).map_err(|e| {
        log::error!("Failed to read password: {}", e);
        AppError::Cli(format!("Failed to read password: {}", e))
    })
}
