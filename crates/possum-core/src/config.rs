//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database holding persisted decisions; `None` keeps everything in memory
    pub database_path: Option<PathBuf>,
    /// Strip cookies from third-party requests no reason ruled on
    pub strip_third_party_cookies: bool,
    /// Domains cancelled by the block list reason
    pub blocked_domains: Vec<String>,
    /// Domains the block list never cancels
    pub allow_domains: Vec<String>,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: Some(data_dir.join("possum.db")),
            ..Self::in_memory()
        }
    }

    /// Nothing touches disk
    pub fn in_memory() -> Self {
        Self {
            database_path: None,
            strip_third_party_cookies: true,
            blocked_domains: Vec::new(),
            allow_domains: Vec::new(),
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Possum"))
            .unwrap_or_else(|| PathBuf::from(".possum"))
    }

    pub fn validate(&self) -> Result<()> {
        for domain in self.blocked_domains.iter().chain(&self.allow_domains) {
            let bad = domain.is_empty()
                || domain.contains(|c: char| c == '/' || c == ':' || c.is_whitespace());
            if bad {
                return Err(CoreError::Config(format!("not a domain: {:?}", domain)));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
