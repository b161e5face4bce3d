//! In-memory collaborator implementations. Useful for local runs and tests;
//! production deployments swap these for HTTP/queue-backed variants that
//! implement the same traits (`spec.md` §9, "polymorphism over
//! collaborators").

use crate::collaborators::{ClientRegistry, MetricSink, Orderer, OrdererError, OrdererManager, RegistryError, TenantManager, TenantVerifyError, TokenLib, TokenValidationError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use ws_events::{Claims, ClientDescriptor, ISignalClient, SanitizedOp, ServiceConfiguration};

/// Accepts every token; good enough for tests and local runs where tenant
/// verification is not the thing under test.
#[derive(Default)]
pub struct AllowAllTenantManager;

#[async_trait]
impl TenantManager for AllowAllTenantManager {
	async fn verify_token(&self, _tenant_id: &str, _token: &str) -> Result<(), TenantVerifyError> {
		Ok(())
	}
}

/// Decodes a token as a JSON-encoded `Claims` blob directly — a stand-in for
/// signature verification, suitable for local runs and tests where the
/// bearer token is minted by a trusted test harness rather than a real
/// identity provider.
#[derive(Default)]
pub struct JsonClaimsTokenLib;

#[async_trait]
impl TokenLib for JsonClaimsTokenLib {
	async fn validate_token_claims(&self, token: &str, document_id: &str, tenant_id: &str) -> Result<Claims, TokenValidationError> {
		let claims: Claims = serde_json::from_str(token).map_err(|_| TokenValidationError {
			status: 401,
			data: Some("Invalid token".to_string()),
		})?;
		if claims.document_id != document_id || claims.tenant_id != tenant_id {
			return Err(TokenValidationError {
				status: 401,
				data: Some("Invalid token".to_string()),
			});
		}
		Ok(claims)
	}

	async fn validate_token_claims_expiration(&self, claims: &Claims, max_lifetime_sec: i64) -> Result<i64, TokenValidationError> {
		let now_sec = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
			.unwrap_or(0);
		let remaining_sec = claims.expiration_epoch_sec - now_sec;
		if remaining_sec <= 0 {
			return Err(TokenValidationError {
				status: 401,
				data: Some("Token has expired".to_string()),
			});
		}
		if remaining_sec > max_lifetime_sec {
			return Err(TokenValidationError {
				status: 401,
				data: Some("Token lifetime exceeds the configured maximum".to_string()),
			});
		}
		Ok(remaining_sec * 1000)
	}
}

#[derive(Default)]
pub struct InMemoryClientRegistry {
	clients: DashMap<(String, String), Vec<ISignalClient>>,
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
	async fn get_clients(&self, tenant_id: &str, document_id: &str) -> Result<Vec<ISignalClient>, RegistryError> {
		Ok(self.clients.get(&(tenant_id.to_string(), document_id.to_string())).map(|entry| entry.clone()).unwrap_or_default())
	}

	async fn add_client(&self, tenant_id: &str, document_id: &str, client_id: &str, descriptor: ClientDescriptor) -> Result<(), RegistryError> {
		self.clients
			.entry((tenant_id.to_string(), document_id.to_string()))
			.or_default()
			.push(ISignalClient {
				client_id: client_id.to_string(),
				client: descriptor,
			});
		Ok(())
	}

	async fn remove_client(&self, tenant_id: &str, document_id: &str, client_id: &str) -> Result<(), RegistryError> {
		if let Some(mut entry) = self.clients.get_mut(&(tenant_id.to_string(), document_id.to_string())) {
			entry.retain(|c| c.client_id != client_id);
		}
		Ok(())
	}
}

/// An in-memory stand-in for a document's total-order service. Records
/// ordered ops for inspection in tests rather than actually persisting them.
pub struct InMemoryOrderer {
	max_message_size: u64,
	service_configuration: ServiceConfiguration,
	ordered: Mutex<Vec<SanitizedOp>>,
	error_listener: Mutex<Option<Box<dyn FnOnce(String) + Send>>>,
}

impl InMemoryOrderer {
	#[must_use]
	pub fn new(max_message_size: u64, service_configuration: ServiceConfiguration) -> Self {
		Self {
			max_message_size,
			service_configuration,
			ordered: Mutex::new(Vec::new()),
			error_listener: Mutex::new(None),
		}
	}

	#[must_use]
	pub fn ordered_ops(&self) -> Vec<SanitizedOp> {
		self.ordered.lock().expect("orderer mutex poisoned").clone()
	}

	/// Fires the installed one-shot error listener, simulating a post-connect
	/// asynchronous fault (`spec.md` §7 class 3).
	pub fn fire_error(&self, message: String) {
		if let Some(handler) = self.error_listener.lock().expect("orderer mutex poisoned").take() {
			handler(message);
		}
	}
}

#[async_trait]
impl Orderer for InMemoryOrderer {
	fn max_message_size(&self) -> u64 {
		self.max_message_size
	}

	fn service_configuration(&self) -> ServiceConfiguration {
		self.service_configuration.clone()
	}

	async fn connect(&self) -> Result<(), OrdererError> {
		Ok(())
	}

	async fn disconnect(&self) {}

	async fn order(&self, ops: Vec<SanitizedOp>) -> Result<(), OrdererError> {
		self.ordered.lock().expect("orderer mutex poisoned").extend(ops);
		Ok(())
	}

	fn on_error(&self, handler: Box<dyn FnOnce(String) + Send>) {
		*self.error_listener.lock().expect("orderer mutex poisoned") = Some(handler);
	}
}

#[derive(Default)]
pub struct InMemoryOrdererManager {
	orderers: DashMap<(String, String), Arc<InMemoryOrderer>>,
}

impl InMemoryOrdererManager {
	/// Preconfigures the orderer a given document should resolve to; useful
	/// for tests that want to assert on what was ordered.
	pub fn insert(&self, tenant_id: impl Into<String>, document_id: impl Into<String>, orderer: Arc<InMemoryOrderer>) {
		self.orderers.insert((tenant_id.into(), document_id.into()), orderer);
	}
}

#[async_trait]
impl OrdererManager for InMemoryOrdererManager {
	async fn get_orderer(&self, tenant_id: &str, document_id: &str) -> Result<Arc<dyn Orderer>, OrdererError> {
		let orderer = self
			.orderers
			.entry((tenant_id.to_string(), document_id.to_string()))
			.or_insert_with(|| Arc::new(InMemoryOrderer::new(16 * 1024 * 1024, ServiceConfiguration::platform_default())))
			.value()
			.clone();
		Ok(orderer as Arc<dyn Orderer>)
	}
}

#[derive(Default)]
pub struct RecordingMetricSink {
	samples: Mutex<Vec<(String, Vec<serde_json::Value>)>>,
}

impl RecordingMetricSink {
	#[must_use]
	pub fn samples(&self) -> Vec<(String, Vec<serde_json::Value>)> {
		self.samples.lock().expect("metric sink mutex poisoned").clone()
	}
}

#[async_trait]
impl MetricSink for RecordingMetricSink {
	async fn write_latency_metric(&self, name: &str, traces: Vec<serde_json::Value>) {
		self.samples.lock().expect("metric sink mutex poisoned").push((name.to_string(), traces));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn registry_add_remove_round_trip() {
		let registry = InMemoryClientRegistry::default();
		registry.add_client("t", "d", "c1", ClientDescriptor::default()).await.unwrap();
		assert_eq!(registry.get_clients("t", "d").await.unwrap().len(), 1);
		registry.remove_client("t", "d", "c1").await.unwrap();
		assert_eq!(registry.get_clients("t", "d").await.unwrap().len(), 0);
	}

	#[tokio::test]
	async fn orderer_manager_returns_same_orderer_for_same_document() {
		let manager = InMemoryOrdererManager::default();
		let first = manager.get_orderer("t", "d").await.unwrap();
		first.order(vec![]).await.unwrap();
		let second = manager.get_orderer("t", "d").await.unwrap();
		assert!(Arc::ptr_eq(&first, &second));
	}
}
