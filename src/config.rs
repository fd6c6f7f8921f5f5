// src/config.rs
use directories::ProjectDirs;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use toml;

use crate::error::{AppError, AppResult};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Argon2Params {
    pub m_cost: u32, // KiB
    pub t_cost: u32, // iterations
    pub p_cost: u32, // parallelism
}

impl Default for Argon2Params {
    fn default() -> Self {
        Argon2Params {
            m_cost: 19456, // 19 MiB
            t_cost: 2,
            p_cost: 1,
        }
    }
}

#[cfg(test)]
impl Argon2Params {
    /// Smallest parameters argon2 accepts. Keeps key derivation cheap in tests.
    pub fn insecure_for_tests() -> Self {
        Argon2Params { m_cost: 8, t_cost: 1, p_cost: 1 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Vault file. Falls back to the platform data directory when unset.
    pub data_file: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    pub session_cookie_name: String,
    pub session_inactivity_minutes: i64,
    pub secure_cookies: bool,
    /// Header carrying the username of a request already authenticated by a
    /// fronting proxy. Ignored unless set.
    pub trusted_user_header: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            session_cookie_name: "passvault".to_string(),
            session_inactivity_minutes: 240,
            secure_cookies: false,
            trusted_user_header: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        PaginationConfig {
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct VaultConfig {
    /// Environment variable consulted for the master password before prompting.
    pub master_password_env: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            master_password_env: "PASSVAULT_MASTER_PASSWORD".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub argon2_params: Argon2Params,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub pagination: PaginationConfig,
    pub vault: VaultConfig,
}

impl Config {
    /// The configured vault file, or `passvault.db` in the platform data
    /// directory.
    pub fn data_file(&self) -> AppResult<PathBuf> {
        if let Some(path) = &self.storage.data_file {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join("passvault.db"))
            .ok_or_else(|| AppError::Config("Could not determine data directory; set storage.data_file".to_string()))
    }

    /// Rejects values that parse but would leave the service unusable.
    pub fn validate(&self) -> AppResult<()> {
        if self.pagination.default_page_size == 0 || self.pagination.max_page_size == 0 {
            return Err(AppError::Config(
                "pagination.default_page_size and pagination.max_page_size must be at least 1".to_string(),
            ));
        }
        if self.auth.session_inactivity_minutes < 1 {
            return Err(AppError::Config(format!(
                "auth.session_inactivity_minutes must be at least 1, got {}",
                self.auth.session_inactivity_minutes
            )));
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "Passvault", "Passvault")
}

fn get_config_path() -> Option<PathBuf> {
    project_dirs().map(|proj_dirs| proj_dirs.config_dir().join("passvault.toml"))
}

fn save_default_config(config_path: &Path, config: &Config) -> Result<(), String> {
    info!("Attempting to save default config to {:?}", config_path);
    if let Some(parent_dir) = config_path.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)
                .map_err(|e| format!("Failed to create config directory {:?}: {}", parent_dir, e))?;
            info!("Created config directory: {:?}", parent_dir);
        }
    }

    let toml_string = toml::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize default config to TOML: {}", e))?;

    let mut file = fs::File::create(config_path)
        .map_err(|e| format!("Failed to create default config file {:?}: {}", config_path, e))?;

    file.write_all(toml_string.as_bytes())
        .map_err(|e| format!("Failed to write default config to {:?}: {}", config_path, e))?;

    info!("Saved default configuration to {:?}", config_path);
    Ok(())
}

/// Reads and parses one config file.
pub fn read_config_file(config_path: &Path) -> AppResult<Config> {
    let content = fs::read_to_string(config_path)
        .map_err(|e| AppError::Config(format!("Failed to read config file {:?}: {}", config_path, e)))?;
    toml::from_str(&content)
        .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", config_path, e)))
}

/// Loads configuration. An explicitly given file must exist and parse. The
/// default location is created with defaults on first run, and a broken file
/// there falls back to defaults with a warning. Whatever is loaded must pass
/// [`Config::validate`].
pub fn load_config(explicit_path: Option<&Path>) -> AppResult<Config> {
    let config = locate_config(explicit_path)?;
    config.validate()?;
    Ok(config)
}

fn locate_config(explicit_path: Option<&Path>) -> AppResult<Config> {
    if let Some(path) = explicit_path {
        info!("Loading configuration from {:?}", path);
        return read_config_file(path);
    }

    let Some(config_path) = get_config_path() else {
        warn!("Could not determine config directory. Using default configuration.");
        return Ok(Config::default());
    };

    if config_path.exists() {
        info!("Loading configuration from {:?}", config_path);
        match read_config_file(&config_path) {
            Ok(loaded_config) => {
                info!("Configuration loaded successfully.");
                Ok(loaded_config)
            }
            Err(e) => {
                warn!("{}. Using default configuration.", e);
                Ok(Config::default())
            }
        }
    } else {
        info!(
            "Config file not found at {:?}. Creating and using default configuration.",
            config_path
        );
        let default_config = Config::default();
        if let Err(e) = save_default_config(&config_path, &default_config) {
            warn!("Failed to save default configuration: {}", e);
        }
        Ok(default_config)
    }
}
