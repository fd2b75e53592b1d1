// Configuration - TOML file with environment overrides
//
// Lookup order for the file: explicit path, BOOKSHELF_CONFIG, ./bookshelf.toml.
// A missing file is not an error; defaults apply.
// Environment variables BOOKSHELF_DB, BOOKSHELF_ADDR and BOOKSHELF_LOG override
// whatever the file says.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "BOOKSHELF_CONFIG";
pub const DATABASE_ENV: &str = "BOOKSHELF_DB";
pub const ADDR_ENV: &str = "BOOKSHELF_ADDR";
pub const LOG_ENV: &str = "BOOKSHELF_LOG";

const DEFAULT_CONFIG_FILE: &str = "bookshelf.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// env_logger filter (e.g. "info", "bookshelf=debug")
    pub log_level: String,

    /// How long a writer waits for the SQLite lock before giving up
    pub busy_timeout_ms: u64,

    /// Largest spreadsheet accepted by the upload endpoint
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: default_database_path(),
            bind_addr: "127.0.0.1:3000".to_string(),
            log_level: "info".to_string(),
            busy_timeout_ms: 5_000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("bookshelf").join("bookshelf.db"))
        .unwrap_or_else(|| PathBuf::from("bookshelf.db"))
}

impl Config {
    /// Load configuration, applying environment overrides last
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .or_else(|| {
                    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                    local.exists().then_some(local)
                }),
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from the environment (lookup injected for tests)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(DATABASE_ENV).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(addr) = lookup(ADDR_ENV).filter(|v| !v.is_empty()) {
            self.bind_addr = addr;
        }
        if let Some(level) = lookup(LOG_ENV).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Make sure the database's parent directory exists
    pub fn ensure_database_dir(&self) -> Result<()> {
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }
        Ok(())
    }
}
