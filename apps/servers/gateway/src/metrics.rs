use async_trait::async_trait;
use axum::http::StatusCode;
use gateway_collab::collaborators::MetricSink;
use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder};

lazy_static! {
	pub static ref WS_CONNECTIONS_TOTAL: IntCounterVec =
		register_int_counter_vec!("ws_connections_total", "Total `connect_document` outcomes", &["outcome"]).expect("failed to register WS_CONNECTIONS_TOTAL");
	pub static ref WS_DISCONNECTS_TOTAL: IntCounterVec =
		register_int_counter_vec!("ws_disconnects_total", "Total clients removed by the disconnect handler", &["reason"]).expect("failed to register WS_DISCONNECTS_TOTAL");
	pub static ref WS_THROTTLE_EXCEEDED_TOTAL: IntCounterVec =
		register_int_counter_vec!("ws_throttle_exceeded_total", "Throttle guard rejections", &["route"]).expect("failed to register WS_THROTTLE_EXCEEDED_TOTAL");
	pub static ref WS_SUBMIT_OP_LATENCY: HistogramVec =
		register_histogram_vec!("ws_submit_op_latency_seconds", "Latency samples reported by `RoundTrip` ops", &["tenant_id"]).expect("failed to register WS_SUBMIT_OP_LATENCY");
}

/// Production `MetricSink`: treats `RoundTrip` traces as round-trip latency
/// samples and records them as a histogram, the way the teacher's
/// `metrics::ws` module records WebSocket timings via `prometheus`.
#[derive(Default)]
pub struct PrometheusMetricSink;

#[async_trait]
impl MetricSink for PrometheusMetricSink {
	async fn write_latency_metric(&self, name: &str, traces: Vec<serde_json::Value>) {
		let Some(elapsed_secs) = round_trip_elapsed_secs(&traces) else {
			tracing::debug!(name, trace_count = traces.len(), "latency metric with no measurable round trip");
			return;
		};
		WS_SUBMIT_OP_LATENCY.with_label_values(&["unknown"]).observe(elapsed_secs);
	}

	fn record_connect_outcome(&self, outcome: &'static str) {
		WS_CONNECTIONS_TOTAL.with_label_values(&[outcome]).inc();
	}

	fn record_disconnect(&self) {
		WS_DISCONNECTS_TOTAL.with_label_values(&["client_disconnect"]).inc();
	}

	fn record_throttle_exceeded(&self, route: &'static str) {
		WS_THROTTLE_EXCEEDED_TOTAL.with_label_values(&[route]).inc();
	}
}

/// `traces` is a list of `{action, service, timestamp}` spans; the round trip
/// duration is simply the span between the earliest and latest timestamp.
fn round_trip_elapsed_secs(traces: &[serde_json::Value]) -> Option<f64> {
	let timestamps: Vec<f64> = traces.iter().filter_map(|t| t.get("timestamp")).filter_map(serde_json::Value::as_f64).collect();
	let min = timestamps.iter().copied().fold(f64::INFINITY, f64::min);
	let max = timestamps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
	if !min.is_finite() || !max.is_finite() || max < min {
		return None;
	}
	Some((max - min) / 1000.0)
}

/// Prometheus text-exposition handler for the `/metrics` route.
pub async fn metrics_handler() -> Result<String, StatusCode> {
	let encoder = TextEncoder::new();
	let metric_families = prometheus::gather();
	let mut buffer = Vec::new();

	if encoder.encode(&metric_families, &mut buffer).is_err() {
		return Err(StatusCode::INTERNAL_SERVER_ERROR);
	}
	String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
