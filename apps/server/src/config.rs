//! Server configuration.
//!
//! Read from a TOML file (`ftecho.toml` unless a path is given on the
//! command line). Every key is optional; a missing file means defaults.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::Context;
use ftecho_protocol::constants::DEFAULT_PORT;
use ftecho_server::ServerConfig;
use serde::{Deserialize, Serialize};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ftecho.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Interface address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Directory holding served files.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Also write logs (without colors) to this file.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            storage_dir: default_storage_dir(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl Config {
    /// Loads `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Resolves the listener address and storage root for the server.
    pub fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .with_context(|| format!("invalid bind_address: {}", self.bind_address))?;
        Ok(ServerConfig {
            bind_addr: SocketAddr::new(ip, self.port),
            storage_root: self.storage_dir.clone(),
        })
    }
}

/// Config path from the first command-line argument, if any.
pub fn config_path(mut args: impl Iterator<Item = String>) -> PathBuf {
    args.next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.storage_dir, PathBuf::from("./storage"));
        assert_eq!(config.log_level, "info");
        assert!(config.log_file.is_none());
    }

    #[test]
    fn config_partial_toml() {
        let config: Config = toml::from_str("port = 7000\nlog_file = \"ft.log\"").unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.log_file, Some(PathBuf::from("ft.log")));
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            port: 9100,
            bind_address: "127.0.0.1".into(),
            storage_dir: PathBuf::from("/srv/ftecho"),
            log_level: "debug".into(),
            log_file: Some(PathBuf::from("/var/log/ftecho.log")),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.port, 9100);
        assert_eq!(parsed.bind_address, "127.0.0.1");
        assert_eq!(parsed.storage_dir, PathBuf::from("/srv/ftecho"));
        assert_eq!(parsed.log_level, "debug");
        assert_eq!(parsed.log_file, Some(PathBuf::from("/var/log/ftecho.log")));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn load_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ftecho.toml");
        std::fs::write(&path, "storage_dir = \"files\"\nbind_address = \"127.0.0.1\"").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("files"));

        let server = config.server_config().unwrap();
        assert_eq!(server.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(server.storage_root, PathBuf::from("files"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn invalid_bind_address_is_an_error() {
        let config = Config {
            bind_address: "not-an-ip".into(),
            ..Config::default()
        };
        assert!(config.server_config().is_err());
    }

    #[test]
    fn config_path_from_args() {
        assert_eq!(config_path(std::iter::empty()), PathBuf::from("ftecho.toml"));
        assert_eq!(
            config_path(["custom.toml".to_string()].into_iter()),
            PathBuf::from("custom.toml")
        );
    }
}
