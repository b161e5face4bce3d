use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use ws_events::{Claims, ISignalClient, SanitizedOp, ServiceConfiguration};

/// `TenantManager::verify_token` failure. `status` carries the upstream HTTP
/// status when the tenant authority supplied one; absent it, the caller falls
/// back to `401` (`spec.md` §4.5 step 4).
#[derive(Debug, Clone, Error)]
#[error("tenant verification failed: {message}")]
pub struct TenantVerifyError {
	pub status: Option<u16>,
	pub message: String,
}

#[async_trait]
pub trait TenantManager: Send + Sync {
	async fn verify_token(&self, tenant_id: &str, token: &str) -> Result<(), TenantVerifyError>;
}

/// Raised by either `TokenLib` method. `status` follows HTTP conventions so
/// the connect pipeline can forward it verbatim.
#[derive(Debug, Clone, Error)]
#[error("token validation failed: {}", data.as_deref().unwrap_or("Invalid token"))]
pub struct TokenValidationError {
	pub status: u16,
	pub data: Option<String>,
}

#[async_trait]
pub trait TokenLib: Send + Sync {
	async fn validate_token_claims(&self, token: &str, document_id: &str, tenant_id: &str) -> Result<Claims, TokenValidationError>;

	/// Returns the remaining token lifetime in milliseconds.
	async fn validate_token_claims_expiration(&self, claims: &Claims, max_lifetime_sec: i64) -> Result<i64, TokenValidationError>;
}

#[derive(Debug, Clone, Error)]
#[error("client registry failure: {0}")]
pub struct RegistryError(pub String);

#[async_trait]
pub trait ClientRegistry: Send + Sync {
	async fn get_clients(&self, tenant_id: &str, document_id: &str) -> Result<Vec<ISignalClient>, RegistryError>;
	async fn add_client(&self, tenant_id: &str, document_id: &str, client_id: &str, descriptor: ws_events::ClientDescriptor) -> Result<(), RegistryError>;
	async fn remove_client(&self, tenant_id: &str, document_id: &str, client_id: &str) -> Result<(), RegistryError>;
}

#[derive(Debug, Clone, Error)]
#[error("orderer failure: {0}")]
pub struct OrdererError(pub String);

/// A live connection to a document's total-order service. `on_error` installs
/// a one-shot listener; the gateway uses it to force a transport close
/// (`spec.md` §4.5 step 12, §7 class 3).
#[async_trait]
pub trait Orderer: Send + Sync {
	fn max_message_size(&self) -> u64;
	fn service_configuration(&self) -> ServiceConfiguration;
	async fn connect(&self) -> Result<(), OrdererError>;
	async fn disconnect(&self);
	async fn order(&self, ops: Vec<SanitizedOp>) -> Result<(), OrdererError>;
	fn on_error(&self, handler: Box<dyn FnOnce(String) + Send>);
}

#[async_trait]
pub trait OrdererManager: Send + Sync {
	async fn get_orderer(&self, tenant_id: &str, document_id: &str) -> Result<Arc<dyn Orderer>, OrdererError>;
}

#[async_trait]
pub trait MetricSink: Send + Sync {
	async fn write_latency_metric(&self, name: &str, traces: Vec<serde_json::Value>);

	/// Records the outcome of one `connect_document` call. `outcome` is a
	/// short label (`"success"`, `"throttled"`, `"rejected"`); default is a
	/// no-op so in-memory/test sinks need not override it.
	fn record_connect_outcome(&self, _outcome: &'static str) {}

	/// Records one client removed by the disconnect handler.
	fn record_disconnect(&self) {}

	/// Records one throttle-guard rejection on the given route
	/// (`"connect"` or `"submit_op"`).
	fn record_throttle_exceeded(&self, _route: &'static str) {}
}
