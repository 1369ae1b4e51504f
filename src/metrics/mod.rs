//! Per-instance metrics and the registry that exposes them to exporters.

pub mod sample;
pub mod udp;

pub use sample::{HistogramSnapshot, SampleError, UniformSample};
pub use udp::{UdpMetrics, UdpMetricsSnapshot};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use std::collections::BTreeMap;
use std::sync::Arc;

/// Namespace under which UDP input metrics are registered.
pub const UDP_NAMESPACE: &str = "udp";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct MetricKey {
    namespace: &'static str,
    id: String,
}

/// A handle to the set of registered input metrics.
///
/// Cloning the handle is cheap and every clone refers to the same set. The
/// owner of a listener registers its metrics here and exporters read
/// snapshots from it.
#[derive(Clone, Default)]
pub struct Registry {
    inputs: Arc<RwLock<BTreeMap<MetricKey, Arc<UdpMetrics>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `metrics` under `namespace` and `id`. An existing entry with
    /// the same key is replaced.
    pub fn register(
        &self,
        namespace: &'static str,
        id: &str,
        metrics: Arc<UdpMetrics>,
    ) -> Registration {
        let key = MetricKey {
            namespace,
            id: id.to_string(),
        };

        if self
            .inputs
            .write()
            .insert(key.clone(), metrics.clone())
            .is_some()
        {
            warn!("replacing existing metrics for {namespace} input '{id}'");
        } else {
            debug!("registered metrics for {namespace} input '{id}'");
        }

        Registration {
            registry: self.clone(),
            key,
            metrics: Some(metrics),
        }
    }

    /// Look up the metrics registered under `namespace` and `id`.
    pub fn get(&self, namespace: &'static str, id: &str) -> Option<Arc<UdpMetrics>> {
        self.inputs
            .read()
            .get(&MetricKey {
                namespace,
                id: id.to_string(),
            })
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inputs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.read().is_empty()
    }

    /// Take a snapshot of every registered input, ordered by namespace and id.
    pub fn snapshot(&self) -> Vec<InputSnapshot> {
        // clone the handles out so that the lock isn't held while sorting the
        // samples
        let inputs: Vec<_> = self
            .inputs
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        inputs
            .into_iter()
            .map(|(key, metrics)| InputSnapshot {
                namespace: key.namespace,
                id: key.id,
                metrics: metrics.snapshot(),
            })
            .collect()
    }

    fn remove(&self, key: &MetricKey, metrics: &Arc<UdpMetrics>) {
        let mut inputs = self.inputs.write();

        // only remove the entry if it still belongs to this registration
        if inputs
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, metrics))
        {
            inputs.remove(key);
            debug!(
                "unregistered metrics for {} input '{}'",
                key.namespace, key.id
            );
        }
    }
}

/// Proof of registration returned by [`Registry::register`]. Unregistering is
/// idempotent and also happens when the registration is dropped.
pub struct Registration {
    registry: Registry,
    key: MetricKey,
    metrics: Option<Arc<UdpMetrics>>,
}

impl Registration {
    pub fn unregister(&mut self) {
        if let Some(metrics) = self.metrics.take() {
            self.registry.remove(&self.key, &metrics);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Snapshot of one registered input.
#[derive(Clone, Debug, Serialize)]
pub struct InputSnapshot {
    pub namespace: &'static str,
    pub id: String,
    pub metrics: UdpMetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister() {
        let registry = Registry::new();
        let metrics = Arc::new(UdpMetrics::new());

        let mut registration = registry.register(UDP_NAMESPACE, "a", metrics.clone());
        assert_eq!(registry.len(), 1);
        assert!(registry.get(UDP_NAMESPACE, "a").is_some());

        registration.unregister();
        assert!(registry.is_empty());

        // a second unregister is harmless
        registration.unregister();
        assert!(registry.is_empty());
        assert_eq!(Arc::strong_count(&metrics), 1);
    }

    #[test]
    fn drop_unregisters() {
        let registry = Registry::new();

        {
            let _registration = registry.register(UDP_NAMESPACE, "a", Arc::new(UdpMetrics::new()));
            assert_eq!(registry.len(), 1);
        }

        assert!(registry.is_empty());
    }

    #[test]
    fn stale_registration_keeps_replacement() {
        let registry = Registry::new();
        let first = Arc::new(UdpMetrics::new());
        let second = Arc::new(UdpMetrics::new());

        let mut old = registry.register(UDP_NAMESPACE, "a", first);
        let _new = registry.register(UDP_NAMESPACE, "a", second.clone());

        old.unregister();

        let current = registry.get(UDP_NAMESPACE, "a").unwrap();
        assert!(Arc::ptr_eq(&current, &second));
    }

    #[test]
    fn snapshot_is_ordered() {
        let registry = Registry::new();
        let b = Arc::new(UdpMetrics::new());
        b.set_static_info("localhost:9000", 0);
        b.update_os_stats(1, 2);

        let _b = registry.register(UDP_NAMESPACE, "b", b);
        let _a = registry.register(UDP_NAMESPACE, "a", Arc::new(UdpMetrics::new()));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, "a");
        assert_eq!(snapshot[1].id, "b");
        assert_eq!(snapshot[1].metrics.device, "localhost:9000");
        assert_eq!(snapshot[1].metrics.receive_queue_length, 1);
        assert_eq!(snapshot[1].metrics.system_packet_drops, 2);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json[1]["namespace"], "udp");
        assert_eq!(json[1]["metrics"]["system_packet_drops"], 2);
    }
}
