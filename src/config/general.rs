use super::*;

use crate::common::units::KIBIBYTES;
use crate::input::InputSettings;
use crate::samplers::udp::PROC_NET_UDP;

fn id() -> String {
    "udp".into()
}

fn listen() -> String {
    "localhost:8080".into()
}

fn max_message_size() -> u64 {
    10 * KIBIBYTES
}

fn poll_interval() -> String {
    "1m".into()
}

fn proc_net_udp() -> String {
    PROC_NET_UDP.into()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct General {
    // identifies this input's metrics, an empty id disables them
    #[serde(default = "id")]
    id: String,

    // the `host:port` to receive packets on
    #[serde(default = "listen")]
    listen: String,

    // larger datagrams are truncated to this size
    #[serde(default = "max_message_size")]
    max_message_size: u64,

    // socket read buffer length, reported as a gauge
    #[serde(default)]
    read_buffer: u64,

    // how often to read OS socket stats, "0s" disables polling
    #[serde(default = "poll_interval")]
    poll_interval: String,

    #[serde(default = "proc_net_udp")]
    proc_net_udp: String,
}

impl Default for General {
    fn default() -> Self {
        Self {
            id: id(),
            listen: listen(),
            max_message_size: max_message_size(),
            read_buffer: 0,
            poll_interval: poll_interval(),
            proc_net_udp: proc_net_udp(),
        }
    }
}

impl General {
    pub fn check(&self) -> Result<(), ConfigError> {
        if let Err(e) = self.poll_interval.parse::<humantime::Duration>() {
            return Err(ConfigError::Invalid(format!(
                "poll_interval couldn't be parsed: {e}"
            )));
        }

        if !self.listen.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "listen address has no port: {}",
                self.listen
            )));
        }

        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "max_message_size must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn max_message_size(&self) -> usize {
        usize::try_from(self.max_message_size).unwrap_or(usize::MAX)
    }

    pub fn read_buffer(&self) -> u64 {
        self.read_buffer
    }

    /// The OS stats polling interval. Only valid after `check()`.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
            .parse::<humantime::Duration>()
            .map(Into::into)
            .unwrap_or(Duration::ZERO)
    }

    pub fn proc_net_udp(&self) -> &Path {
        Path::new(&self.proc_net_udp)
    }

    /// Settings for the input's metrics.
    pub fn input_settings(&self) -> InputSettings {
        InputSettings {
            id: self.id.clone(),
            device: self.listen.clone(),
            read_buffer: self.read_buffer,
            poll_interval: self.poll_interval(),
            proc_net_udp: self.proc_net_udp().to_path_buf(),
        }
    }
}
