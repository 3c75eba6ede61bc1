//! Config loading and default paths.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::EngineError;

/// Read the config file at `path`, or at [`default_config_path`].
///
/// A missing file means defaults; a file that exists but does not parse is
/// an error. Relative pool paths are taken relative to the file's directory.
pub fn load_config(path: Option<&Path>) -> Result<Config, EngineError> {
    let config_path = path.map_or_else(default_config_path, Path::to_path_buf);

    let content = match std::fs::read_to_string(&config_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(EngineError::Config(format!(
                "cannot read {}: {e}",
                config_path.display()
            )))
        }
    };
    let mut config: Config = toml::from_str(&content).map_err(|e| {
        EngineError::Config(format!("cannot parse {}: {e}", config_path.display()))
    })?;

    if let Some(base) = config_path.parent() {
        for pool in &mut config.pools {
            if pool.path.is_relative() {
                pool.path = base.join(&pool.path);
            }
        }
    }
    info!(
        path = %config_path.display(),
        pools = config.pools.len(),
        "config loaded"
    );
    Ok(config)
}

/// `fleetdeck` under the platform config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_default()
        .join("fleetdeck")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
