use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use lazy_static::lazy_static;
use std::sync::OnceLock;
use axum::response::IntoResponse;
use axum::http::StatusCode;
use tracing::error;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

struct ForestMetrics {
    requests: IntCounterVec,
    forest_nodes: IntGauge,
    summaries_generated: IntCounter,
}

static METRICS: OnceLock<ForestMetrics> = OnceLock::new();

pub fn init_metrics() -> prometheus::Result<()> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let requests = IntCounterVec::new(
        prometheus::opts!("requests_total", "Total requests per route"),
        &["route", "status"],
    )?;
    let forest_nodes = IntGauge::new("forest_nodes", "Nodes currently stored in the forest")?;
    let summaries_generated = IntCounter::new(
        "summaries_generated_total",
        "Parent summaries produced and cached",
    )?;

    if METRICS
        .set(ForestMetrics {
            requests: requests.clone(),
            forest_nodes: forest_nodes.clone(),
            summaries_generated: summaries_generated.clone(),
        })
        .is_ok()
    {
        REGISTRY.register(Box::new(requests)).ok();
        REGISTRY.register(Box::new(forest_nodes)).ok();
        REGISTRY.register(Box::new(summaries_generated)).ok();
    }
    Ok(())
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(m) = METRICS.get() {
        m.requests.with_label_values(&[route, status]).inc();
    }
}

pub fn set_forest_nodes(count: i64) {
    if let Some(m) = METRICS.get() {
        m.forest_nodes.set(count);
    }
}

pub fn inc_summaries() {
    if let Some(m) = METRICS.get() {
        m.summaries_generated.inc();
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_registry() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        inc_request("/chat", "200");
        inc_summaries();
        set_forest_nodes(7);

        let names: Vec<String> = REGISTRY.gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"requests_total".to_string()));
        assert!(names.contains(&"forest_nodes".to_string()));
        assert!(names.contains(&"summaries_generated_total".to_string()));
    }

    #[tokio::test]
    async fn test_metrics_handler_renders_text() {
        init_metrics().unwrap();
        inc_request("/tree", "200");

        let response = get_metrics().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("requests_total"));
    }
}
