//! Ingestion health metrics for a UDP listener.
//!
//! A listener owns an [`input::InputMetrics`] that counts received packets
//! and bytes, samples inter-arrival and processing times, and on Linux
//! periodically reads the socket's receive queue length and drop count from
//! `/proc/net/udp`. Metrics are registered with a [`metrics::Registry`] from
//! which exporters take snapshots.

pub mod common;
pub mod config;
pub mod exposition;
pub mod input;
pub mod metrics;
pub mod samplers;

pub use input::{InputMetrics, InputSettings};
pub use metrics::Registry;
