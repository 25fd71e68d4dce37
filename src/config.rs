// ⚙️ Configuration - where things live and where the server listens

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const DATABASE_FILE: &str = "expenses.db";
pub const CATEGORIES_FILE: &str = "categories.json";

const HOST_VAR: &str = "EXPENSE_TRACKER_HOST";
const PORT_VAR: &str = "EXPENSE_TRACKER_PORT";

/// Files the tracker reads and writes. Both sit in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub database: PathBuf,
    pub categories: PathBuf,
}

impl AppPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            database: dir.join(DATABASE_FILE),
            categories: dir.join(CATEGORIES_FILE),
        }
    }

    /// Next to the running executable
    pub fn beside_executable() -> Result<Self> {
        let exe = env::current_exe().context("Could not determine executable path")?;
        let dir = exe
            .parent()
            .ok_or_else(|| anyhow!("Executable has no parent directory: {}", exe.display()))?;
        Ok(Self::in_dir(dir))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    /// Defaults, overridden by `EXPENSE_TRACKER_HOST` / `EXPENSE_TRACKER_PORT`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup(HOST_VAR).filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }
        if let Some(port) = lookup(PORT_VAR) {
            config.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", PORT_VAR, port))?;
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
