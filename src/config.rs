use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::ssh::terminal;

pub const APP_DIR: &str = ".gate";
pub const VAULT_FILE: &str = "store.enc";
pub const LOG_DIR: &str = "logs";

/// Overrides the vault location.
pub const VAULT_ENV: &str = "GATE_VAULT";
/// Log filter directives, e.g. `gate=debug`.
pub const LOG_ENV: &str = "GATE_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub vault_path: PathBuf,
    pub log_dir: PathBuf,
    /// Terminal type requested for remote ptys.
    pub term: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(
            env::var_os(VAULT_ENV).map(PathBuf::from),
            dirs::home_dir(),
            env::var("TERM").ok(),
        )
    }

    fn resolve(
        vault_override: Option<PathBuf>,
        home: Option<PathBuf>,
        term: Option<String>,
    ) -> Result<Self, ConfigError> {
        let vault_path = match vault_override.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => path,
            None => home.ok_or(ConfigError::NoHomeDir)?.join(APP_DIR).join(VAULT_FILE),
        };
        let log_dir = vault_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(LOG_DIR);

        Ok(Self {
            vault_path,
            log_dir,
            term: terminal::term_name(term),
        })
    }
}
