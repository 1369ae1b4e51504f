use super::*;

fn enabled() -> bool {
    true
}

fn listen() -> String {
    "127.0.0.1:4241".into()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Exposition {
    #[serde(default = "enabled")]
    enabled: bool,

    #[serde(default = "listen")]
    listen: String,
}

impl Default for Exposition {
    fn default() -> Self {
        Self {
            enabled: enabled(),
            listen: listen(),
        }
    }
}

impl Exposition {
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.enabled {
            self.listen()?;
        }

        Ok(())
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn listen(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .to_socket_addrs()
            .map_err(|e| ConfigError::Invalid(format!("bad exposition listen address: {e}")))?
            .next()
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "could not resolve exposition listen address: {}",
                    self.listen
                ))
            })
    }
}
