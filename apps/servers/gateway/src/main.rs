mod config;
mod health;
mod metrics;
mod websocket;

use anyhow::Result;
use axum::{routing::get, Router};
use config::GatewayConfig;
use gateway_collab::{
	collaborators::{ClientRegistry, MetricSink, OrdererManager, TenantManager, TokenLib},
	memory::{AllowAllTenantManager, InMemoryClientRegistry, InMemoryOrdererManager, JsonClaimsTokenLib},
	rooms::RoomRegistry,
	throttle::{ThrottleGuard, TokenBucketRateLimiter},
	GatewayContext,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared state handed to every axum handler: the collaborator-backed
/// pipeline context plus the shutdown token every socket task races against.
#[derive(Clone)]
pub struct AppState {
	pub ctx: Arc<GatewayContext>,
	pub shutdown: CancellationToken,
}

#[tokio::main]
async fn main() -> Result<()> {
	dotenv::dotenv().ok();
	let config = GatewayConfig::new();

	if config.health_check {
		return health::perform_health_check(&config).await;
	}

	init_tracing(&config);

	let ctx = Arc::new(build_context(&config));
	let shutdown = CancellationToken::new();
	let state = AppState { ctx, shutdown: shutdown.clone() };

	let app = Router::new()
		.route("/healthz", get(healthz))
		.route("/metrics", get(metrics::metrics_handler))
		.merge(websocket::router())
		.layer(TraceLayer::new_for_http())
		.with_state(state);

	let listener = TcpListener::bind(&config.bind_addr).await?;
	tracing::info!(addr = %listener.local_addr()?, "gateway listening");

	let signal_shutdown = shutdown.clone();
	tokio::spawn(async move {
		tokio::signal::ctrl_c().await.ok();
		tracing::info!("received Ctrl+C, initiating shutdown");
		signal_shutdown.cancel();
	});

	let server_shutdown = shutdown.clone();
	axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
		.with_graceful_shutdown(async move {
			server_shutdown.cancelled().await;
		})
		.await?;

	tracing::info!("server stopped, shutdown complete");
	Ok(())
}

async fn healthz() -> &'static str {
	"ok"
}

fn build_context(config: &GatewayConfig) -> GatewayContext {
	let tenant_manager: Arc<dyn TenantManager> = Arc::new(AllowAllTenantManager);
	let token_lib: Arc<dyn TokenLib> = Arc::new(JsonClaimsTokenLib);
	let client_registry: Arc<dyn ClientRegistry> = Arc::new(InMemoryClientRegistry::default());
	let orderer_manager: Arc<dyn OrdererManager> = Arc::new(InMemoryOrdererManager::default());
	let metric_sink: Arc<dyn MetricSink> = Arc::new(metrics::PrometheusMetricSink);

	let connect_throttle = config.connect_throttle_capacity.map_or_else(ThrottleGuard::disabled, |capacity| {
		ThrottleGuard::new(Some(Arc::new(TokenBucketRateLimiter::new(capacity, Duration::from_secs(config.connect_throttle_period_secs)))))
	});
	let submit_op_throttle = config.submit_op_throttle_capacity.map_or_else(ThrottleGuard::disabled, |capacity| {
		ThrottleGuard::new(Some(Arc::new(TokenBucketRateLimiter::new(capacity, Duration::from_secs(config.submit_op_throttle_period_secs)))))
	});

	GatewayContext {
		tenant_manager,
		token_lib,
		client_registry,
		orderer_manager,
		metric_sink,
		rooms: Arc::new(RoomRegistry::new()),
		connect_throttle,
		submit_op_throttle,
		max_clients_per_document: config.max_clients_per_document,
		max_token_lifetime_sec: config.max_token_lifetime_sec,
		token_expiry_enabled: config.token_expiry_enabled,
	}
}

/// Structured logging setup, mirroring the teacher's `init_tracing`: optional
/// JSON formatting, `RUST_LOG`-driven filtering with a sane default when the
/// variable is unset.
fn init_tracing(config: &GatewayConfig) {
	use tracing_subscriber::{filter::EnvFilter, fmt::format::JsonFields, layer::SubscriberExt, util::SubscriberInitExt, Layer};

	let filter = config.rust_log.as_deref().map_or_else(|| EnvFilter::new("info"), EnvFilter::new);

	tracing_subscriber::registry()
		.with(if config.log_json {
			Box::new(
				tracing_subscriber::fmt::layer()
					.fmt_fields(JsonFields::default())
					.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false))
					.with_filter(filter),
			) as Box<dyn Layer<_> + Send + Sync>
		} else {
			Box::new(tracing_subscriber::fmt::layer().event_format(tracing_subscriber::fmt::format().pretty()).with_filter(filter))
		})
		.init();
}
