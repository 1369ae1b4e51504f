use crate::metrics::udp::*;
use crate::metrics::{InputSnapshot, Registry};

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tracing::{debug, info};

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

struct AppState {
    registry: Registry,
}

/// Serve snapshots of `registry` over HTTP on `listen` until `shutdown`
/// completes.
pub async fn serve(
    listen: SocketAddr,
    registry: Registry,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = app(registry);

    let listener = TcpListener::bind(listen).await?;

    info!("serving metrics on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

fn app(registry: Registry) -> Router {
    let state = std::sync::Arc::new(AppState { registry });

    Router::new()
        .route("/", get(root))
        .route("/metrics/json", get(json))
        .route("/vars", get(human_readable))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(CompressionLayer::new()))
}

fn snapshot(state: &AppState) -> Vec<InputSnapshot> {
    let start = Instant::now();
    let snapshot = state.registry.snapshot();
    debug!("snapshot latency: {} us", start.elapsed().as_micros());
    snapshot
}

async fn json(State(state): State<std::sync::Arc<AppState>>) -> Json<Vec<InputSnapshot>> {
    Json(snapshot(&state))
}

async fn human_readable(State(state): State<std::sync::Arc<AppState>>) -> String {
    let mut content = String::new();

    for input in snapshot(&state) {
        let prefix = format!("{}/{}", input.namespace, input.id);
        let metrics = &input.metrics;

        for (name, value) in [
            (DEVICE, metrics.device.clone()),
            (RECEIVED_EVENTS_TOTAL, metrics.received_events_total.to_string()),
            (RECEIVED_BYTES_TOTAL, metrics.received_bytes_total.to_string()),
            (
                UDP_READ_BUFFER_LENGTH_GAUGE,
                metrics.udp_read_buffer_length_gauge.to_string(),
            ),
            (RECEIVE_QUEUE_LENGTH, metrics.receive_queue_length.to_string()),
            (SYSTEM_PACKET_DROPS, metrics.system_packet_drops.to_string()),
        ] {
            content += &format!("{prefix}/{name}: {value}\n");
        }

        for (name, histogram) in [
            (ARRIVAL_PERIOD, &metrics.arrival_period),
            (PROCESSING_TIME, &metrics.processing_time),
        ] {
            let Some(histogram) = histogram else {
                continue;
            };

            content += &format!("{prefix}/{name}/count: {}\n", histogram.count);
            for (label, value) in &histogram.percentiles {
                content += &format!("{prefix}/{name}/{label}: {value}\n");
            }
        }
    }

    content
}

async fn root() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("udp-ingest {version}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::metrics::{UdpMetrics, UDP_NAMESPACE};

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use std::sync::Arc;

    async fn get(registry: &Registry, uri: &str) -> (StatusCode, String) {
        let response = app(registry.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn registry() -> (Registry, crate::metrics::Registration) {
        let registry = Registry::new();
        let metrics = Arc::new(UdpMetrics::new());
        metrics.set_static_info("localhost:8080", 1024);
        metrics.record_packet(100, std::time::Instant::now());
        metrics.update_os_stats(26, 5);

        let registration = registry.register(UDP_NAMESPACE, "test", metrics);

        (registry, registration)
    }

    #[tokio::test]
    async fn root() {
        let (status, body) = get(&Registry::new(), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("udp-ingest"));
    }

    #[tokio::test]
    async fn json() {
        let (registry, _registration) = registry();
        let (status, body) = get(&registry, "/metrics/json").await;

        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json[0]["id"], "test");
        assert_eq!(json[0]["metrics"]["received_events_total"], 1);
        assert_eq!(json[0]["metrics"]["received_bytes_total"], 100);
        assert_eq!(json[0]["metrics"]["receive_queue_length"], 26);
        assert_eq!(json[0]["metrics"]["system_packet_drops"], 5);
        assert!(json[0]["metrics"]["arrival_period"].is_null());
        assert_eq!(json[0]["metrics"]["processing_time"]["count"], 1);
    }

    #[tokio::test]
    async fn vars() {
        let (registry, _registration) = registry();
        let (status, body) = get(&registry, "/vars").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("udp/test/device: localhost:8080\n"));
        assert!(body.contains("udp/test/udp_read_buffer_length_gauge: 1024\n"));
        assert!(body.contains("udp/test/system_packet_drops: 5\n"));
        assert!(body.contains("udp/test/processing_time/count: 1\n"));
        assert!(!body.contains("arrival_period"));
    }
}
