//! Collects UDP socket statistics from procfs:
//! * `/proc/net/udp`
//!
//! And produces these stats:
//! * `receive_queue_length`
//! * `system_packet_drops`

pub mod address;
pub mod procfs;

pub use address::{resolve, AddressKeys, ResolveError};
pub use procfs::{parse_proc_net_udp, proc_net_udp, ProcNetUdpError, UdpSocketStats, PROC_NET_UDP};

use crate::common::Interval;
use crate::metrics::UdpMetrics;

use tracing::{debug, trace, warn};

use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const NAME: &str = "udp_stats";

/// Returns true if OS level socket stats can be polled at `interval` on this
/// platform.
pub fn eligible(interval: Duration) -> bool {
    !interval.is_zero() && cfg!(target_os = "linux")
}

/// The OS stats poller attached to a UDP listener.
///
/// A poller that was never started stays `Idle`. A `Running` poller is
/// stopped by [`Poller::stop`] (or by dropping it), after which it is gone.
pub enum Poller {
    Idle,
    Running(UdpStatsPoller),
}

impl Poller {
    /// Start polling the socket table at `path` for the socket bound to
    /// `device` if the platform and `interval` allow it.
    ///
    /// A `device` that can't be resolved doesn't prevent the poller from
    /// running, it just never finds the socket.
    pub fn start(metrics: &Arc<UdpMetrics>, device: &str, path: &Path, interval: Duration) -> Self {
        if !eligible(interval) {
            debug!("{NAME} polling is not enabled for {device}");
            return Self::Idle;
        }

        let keys = match resolve(device) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("{e}");
                AddressKeys::new()
            }
        };

        match UdpStatsPoller::spawn(metrics.clone(), keys, path.to_path_buf(), interval) {
            Ok(poller) => Self::Running(poller),
            Err(e) => {
                warn!("failed to start {NAME} poller: {e}");
                Self::Idle
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    /// Stop the poller, blocking until its thread has exited.
    pub fn stop(self) {
        if let Self::Running(poller) = self {
            poller.stop();
        }
    }
}

/// A background thread that periodically reads the socket table and updates
/// the OS gauges of a [`UdpMetrics`].
pub struct UdpStatsPoller {
    stop: Option<SyncSender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl UdpStatsPoller {
    pub fn spawn(
        metrics: Arc<UdpMetrics>,
        keys: AddressKeys,
        path: PathBuf,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop, signal) = sync_channel(1);

        debug!(
            "starting {NAME} poller for {keys} every {}",
            humantime::format_duration(interval)
        );

        let thread = std::thread::Builder::new()
            .name(NAME.to_string())
            .spawn(move || poll(&metrics, &keys, &path, interval, signal))?;

        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Signal the thread to stop and wait until it has. After this returns the
    /// poller no longer writes to the metrics.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            // the thread may have already exited, in which case there is no
            // one to signal
            let _ = stop.send(());
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("{NAME} poller panicked");
            }
        }
    }
}

impl Drop for UdpStatsPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poll(
    metrics: &UdpMetrics,
    keys: &AddressKeys,
    path: &Path,
    interval: Duration,
    signal: Receiver<()>,
) {
    let mut interval = Interval::new(Instant::now(), interval);

    loop {
        // wait for either the next tick or the stop signal
        match signal.recv_timeout(interval.remaining(Instant::now())) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();

        if interval.try_wait(now).is_err() {
            continue;
        }

        match proc_net_udp(path, keys) {
            Ok(stats) => {
                trace!(
                    "{NAME}: rx_queue: {} drops: {}",
                    stats.rx_queue,
                    stats.drops
                );
                metrics.update_os_stats(stats.rx_queue, stats.drops);
            }
            Err(e) => {
                warn!("failed to get udp stats: {e}");
            }
        }

        debug!("{NAME} sampling latency: {} us", now.elapsed().as_micros());
    }

    debug!("{NAME} poller stopped");
}
