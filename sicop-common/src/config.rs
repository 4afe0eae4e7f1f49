//! Configuration loading and data folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Default port for the read-only data service
pub const DEFAULT_API_PORT: u16 = 5780;

/// Environment variable overriding the data folder
pub const DATA_DIR_ENV: &str = "SICOP_DATA_DIR";

/// Environment variable overriding the data service port
pub const API_PORT_ENV: &str = "SICOP_API_PORT";

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(cli_arg: Option<&str>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(data_dir) = config.get("data_dir").and_then(|v| v.as_str()) {
                    return PathBuf::from(data_dir);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_data_dir()
}

/// Port resolution for the data service: environment variable, then the
/// `api_port` key of the config file, then the compiled default.
pub fn resolve_api_port() -> u16 {
    if let Ok(port) = std::env::var(API_PORT_ENV) {
        if let Ok(port) = port.parse::<u16>() {
            return port;
        }
    }

    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(port) = config.get("api_port").and_then(|v| v.as_integer()) {
                    if (1..=65535).contains(&port) {
                        return port as u16;
                    }
                }
            }
        }
    }

    DEFAULT_API_PORT
}

/// Locate the configuration file for the platform
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("sicop").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/sicop/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default data folder path
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("sicop"))
        .unwrap_or_else(|| PathBuf::from("./sicop_data"))
}

/// Ensure the data folder exists, creating it if needed
pub fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    Ok(())
}

/// Path of the cache database inside the data folder
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("sicop.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn cli_arg_beats_env_var() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/from-env");
        let resolved = resolve_data_dir(Some("/tmp/from-cli"));
        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(resolved, PathBuf::from("/tmp/from-cli"));
    }

    #[test]
    #[serial]
    fn env_var_beats_default() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/from-env");
        let resolved = resolve_data_dir(None);
        std::env::remove_var(DATA_DIR_ENV);
        assert_eq!(resolved, PathBuf::from("/tmp/from-env"));
    }

    #[test]
    #[serial]
    fn empty_env_var_is_ignored() {
        std::env::set_var(DATA_DIR_ENV, "");
        let resolved = resolve_data_dir(None);
        std::env::remove_var(DATA_DIR_ENV);
        assert_ne!(resolved, PathBuf::from(""));
    }

    #[test]
    fn database_path_is_inside_data_dir() {
        let path = database_path(Path::new("/tmp/sicop-test"));
        assert_eq!(path, PathBuf::from("/tmp/sicop-test/sicop.db"));
    }
}
