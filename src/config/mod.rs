use serde::Deserialize;
use thiserror::Error;

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod exposition;
mod general;
mod log;

pub use exposition::Exposition;
pub use general::General;
pub use log::{Level, Log};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to open config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    general: General,
    #[serde(default)]
    exposition: Exposition,
    #[serde(default)]
    log: Log,
}

impl Config {
    pub fn load(path: &dyn AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        content.parse()
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        self.general.check()?;
        self.exposition.check()
    }

    pub fn general(&self) -> &General {
        &self.general
    }

    pub fn exposition(&self) -> &Exposition {
        &self.exposition
    }

    pub fn log(&self) -> &Log {
        &self.log
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(content)?;

        config.check()?;

        Ok(config)
    }
}
