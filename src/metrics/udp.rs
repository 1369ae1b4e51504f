use crate::metrics::sample::{HistogramSnapshot, UniformSample, DEFAULT_CAPACITY};

use metriken::{Counter, Gauge};
use parking_lot::Mutex;
use serde::Serialize;

use std::sync::OnceLock;
use std::time::{Duration, Instant};

pub const DEVICE: &str = "device";
pub const RECEIVED_EVENTS_TOTAL: &str = "received_events_total";
pub const RECEIVED_BYTES_TOTAL: &str = "received_bytes_total";
pub const UDP_READ_BUFFER_LENGTH_GAUGE: &str = "udp_read_buffer_length_gauge";
pub const RECEIVE_QUEUE_LENGTH: &str = "receive_queue_length";
pub const SYSTEM_PACKET_DROPS: &str = "system_packet_drops";
pub const ARRIVAL_PERIOD: &str = "arrival_period";
pub const PROCESSING_TIME: &str = "processing_time";

/// Metrics for a single UDP listener.
///
/// The packet path (`record_packet`) and the OS stats poller
/// (`update_os_stats`) write disjoint fields, so the only locks here guard the
/// reservoirs and the last-packet timestamp against concurrent packet
/// recording.
pub struct UdpMetrics {
    device: OnceLock<String>,
    packets: Counter,
    bytes: Counter,
    buffer_len: Gauge,
    rx_queue: Gauge,
    drops: Gauge,
    arrival_period: Mutex<UniformSample>,
    processing_time: Mutex<UniformSample>,
    last_packet: Mutex<Option<Instant>>,
}

impl Default for UdpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpMetrics {
    pub fn new() -> Self {
        Self {
            device: OnceLock::new(),
            packets: Counter::default(),
            bytes: Counter::default(),
            buffer_len: Gauge::default(),
            rx_queue: Gauge::default(),
            drops: Gauge::default(),
            arrival_period: Mutex::new(UniformSample::new(DEFAULT_CAPACITY)),
            processing_time: Mutex::new(UniformSample::new(DEFAULT_CAPACITY)),
            last_packet: Mutex::new(None),
        }
    }

    /// Account for one received packet of `size` bytes that arrived at
    /// `receipt`.
    ///
    /// The processing time is the time elapsed since `receipt` at the moment
    /// of this call, so it covers whatever the caller did with the packet
    /// before recording it (publication included).
    pub fn record_packet(&self, size: u64, receipt: Instant) {
        self.processing_time
            .lock()
            .update(nanos(receipt.elapsed()));

        self.packets.add(1);
        self.bytes.add(size);

        let previous = self.last_packet.lock().replace(receipt);

        if let Some(previous) = previous {
            self.arrival_period
                .lock()
                .update(signed_nanos(receipt, previous));
        }
    }

    /// Set the device label and the configured read buffer length. The device
    /// label can only be set once; later calls keep the first label.
    pub fn set_static_info(&self, device: &str, buffer_len: u64) {
        let _ = self.device.set(device.to_string());
        self.buffer_len
            .set(i64::try_from(buffer_len).unwrap_or(i64::MAX));
    }

    /// Overwrite the receive queue length and drop count gauges.
    pub fn update_os_stats(&self, rx_queue: i64, drops: i64) {
        self.rx_queue.set(rx_queue);
        self.drops.set(drops);
    }

    pub fn device(&self) -> &str {
        self.device.get().map(String::as_str).unwrap_or("")
    }

    pub fn packets(&self) -> u64 {
        self.packets.value()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.value()
    }

    pub fn buffer_len(&self) -> i64 {
        self.buffer_len.value()
    }

    pub fn rx_queue(&self) -> i64 {
        self.rx_queue.value()
    }

    pub fn drops(&self) -> i64 {
        self.drops.value()
    }

    /// Run `f` against the inter-arrival sample.
    pub fn with_arrival_period<T>(&self, f: impl FnOnce(&UniformSample) -> T) -> T {
        f(&*self.arrival_period.lock())
    }

    /// Run `f` against the processing time sample.
    pub fn with_processing_time<T>(&self, f: impl FnOnce(&UniformSample) -> T) -> T {
        f(&*self.processing_time.lock())
    }

    pub fn snapshot(&self) -> UdpMetricsSnapshot {
        UdpMetricsSnapshot {
            device: self.device().to_string(),
            received_events_total: self.packets(),
            received_bytes_total: self.bytes(),
            udp_read_buffer_length_gauge: self.buffer_len(),
            receive_queue_length: self.rx_queue(),
            system_packet_drops: self.drops(),
            arrival_period: self.with_arrival_period(UniformSample::snapshot),
            processing_time: self.with_processing_time(UniformSample::snapshot),
        }
    }
}

/// Exported view of [`UdpMetrics`], keyed by the exported metric names.
#[derive(Clone, Debug, Serialize)]
pub struct UdpMetricsSnapshot {
    pub device: String,
    pub received_events_total: u64,
    pub received_bytes_total: u64,
    pub udp_read_buffer_length_gauge: i64,
    pub receive_queue_length: i64,
    pub system_packet_drops: i64,
    pub arrival_period: Option<HistogramSnapshot>,
    pub processing_time: Option<HistogramSnapshot>,
}

fn nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

// `later - earlier` in nanoseconds, negative if the timestamps are out of
// order
fn signed_nanos(later: Instant, earlier: Instant) -> i64 {
    if later >= earlier {
        nanos(later - earlier)
    } else {
        -nanos(earlier - later)
    }
}
