//! Path resolution for headroom's data directory

use std::path::PathBuf;

/// Environment variable that relocates the data directory
pub const HOME_ENV: &str = "HEADROOM_HOME";

/// Resolves standard paths for the log, store, and config files
#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
}

impl Paths {
    /// Resolve from `HEADROOM_HOME`, falling back to `~/.headroom`
    pub fn new() -> std::io::Result<Self> {
        if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::at(PathBuf::from(dir)));
        }

        let home = dirs::home_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "home directory not found")
        })?;

        Ok(Self::at(home.join(".headroom")))
    }

    /// Use an explicit data directory
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Append-only event log
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    /// Content-addressed blob database
    pub fn store_db(&self) -> PathBuf {
        self.data_dir.join("store.db")
    }

    /// Optional configuration file
    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("headroom.json")
    }
}
