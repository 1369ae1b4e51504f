//! The metrics handle owned by a UDP input.
//!
//! A UDP listener creates one [`InputMetrics`] when it starts, calls
//! [`InputMetrics::record`] for every packet it receives, and calls
//! [`InputMetrics::close`] when it stops.

use crate::metrics::{Registration, Registry, UdpMetrics, UDP_NAMESPACE};
use crate::samplers::udp::{Poller, PROC_NET_UDP};

use tracing::debug;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default period between reads of the OS socket table.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Settings for the metrics of one UDP input.
#[derive(Clone, Debug)]
pub struct InputSettings {
    /// Instance identifier. An empty id disables metrics for the input.
    pub id: String,
    /// The `host:port` the input listens on.
    pub device: String,
    /// Configured socket read buffer length in bytes.
    pub read_buffer: u64,
    /// How often to poll the OS socket table. Zero disables polling.
    pub poll_interval: Duration,
    /// Location of the OS socket table.
    pub proc_net_udp: PathBuf,
}

impl InputSettings {
    pub fn new(id: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            device: device.into(),
            read_buffer: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
            proc_net_udp: PathBuf::from(PROC_NET_UDP),
        }
    }
}

/// Metrics for a UDP input, or nothing at all if the input has no id.
pub enum InputMetrics {
    Disabled,
    Enabled(Box<EnabledMetrics>),
}

pub struct EnabledMetrics {
    // the poller must be stopped before the registration is released
    poller: Poller,
    registration: Registration,
    metrics: Arc<UdpMetrics>,
}

impl InputMetrics {
    /// Register the metrics for an input with `registry` and start the OS
    /// stats poller if the platform supports it. Returns
    /// [`InputMetrics::Disabled`] without touching the registry if
    /// `settings.id` is empty.
    pub fn new(registry: &Registry, settings: &InputSettings) -> Self {
        if settings.id.is_empty() {
            debug!("udp input metrics are disabled");
            return Self::Disabled;
        }

        let metrics = Arc::new(UdpMetrics::new());
        metrics.set_static_info(&settings.device, settings.read_buffer);

        let registration = registry.register(UDP_NAMESPACE, &settings.id, metrics.clone());

        let poller = Poller::start(
            &metrics,
            &settings.device,
            &settings.proc_net_udp,
            settings.poll_interval,
        );

        Self::Enabled(Box::new(EnabledMetrics {
            poller,
            registration,
            metrics,
        }))
    }

    /// Record a received packet.
    ///
    /// This must be called after the packet has been published: the
    /// processing time metric is the time from `receipt` until this call, so
    /// it includes the time spent publishing.
    pub fn record(&self, packet: &[u8], receipt: Instant) {
        match self {
            Self::Disabled => {}
            Self::Enabled(enabled) => enabled.metrics.record_packet(packet.len() as u64, receipt),
        }
    }

    /// Stop the OS stats poller, waiting for it to exit, then unregister the
    /// metrics.
    pub fn close(self) {
        match self {
            Self::Disabled => {}
            Self::Enabled(enabled) => {
                let EnabledMetrics {
                    poller,
                    mut registration,
                    metrics: _,
                } = *enabled;

                poller.stop();
                registration.unregister();
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Whether the OS stats poller is running.
    pub fn is_polling(&self) -> bool {
        match self {
            Self::Disabled => false,
            Self::Enabled(enabled) => enabled.poller.is_running(),
        }
    }

    /// The underlying metrics, if enabled.
    pub fn metrics(&self) -> Option<&Arc<UdpMetrics>> {
        match self {
            Self::Disabled => None,
            Self::Enabled(enabled) => Some(&enabled.metrics),
        }
    }
}
