use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Filesystem locations the tool reads and writes. Resolved once in `main`
/// and passed into whatever needs them; nothing else computes paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub blob_dir: PathBuf,
}

const APP_DIR: &str = "adstop";

impl AppPaths {
    pub fn resolve() -> Result<Self> {
        Ok(AppPaths {
            config_dir: config_dir()?,
            blob_dir: cache_dir()?.join("blobs"),
        })
    }

    pub fn org_auth_file(&self) -> PathBuf {
        self.config_dir.join("org-auth.json")
    }

    pub fn user_auth_file(&self) -> PathBuf {
        self.config_dir.join("user-auth.json")
    }
}

fn config_dir() -> Result<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }
    dirs::home_dir()
        .map(|path| path.join(".config").join(APP_DIR))
        .ok_or_else(|| anyhow!("$HOME not configured."))
}

fn cache_dir() -> Result<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CACHE_HOME") {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }
    dirs::home_dir()
        .map(|path| path.join(".cache").join(APP_DIR))
        .ok_or_else(|| anyhow!("$HOME not configured."))
}
