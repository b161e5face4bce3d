use crate::collaborators::{ClientRegistry, MetricSink, OrdererManager, TenantManager, TokenLib};
use crate::rooms::RoomRegistry;
use crate::throttle::ThrottleGuard;
use std::sync::Arc;

/// Everything the connect/submit/disconnect/presence pipeline needs: the
/// swappable collaborators plus the configuration options `spec.md` §6 lists.
pub struct GatewayContext {
	pub tenant_manager: Arc<dyn TenantManager>,
	pub token_lib: Arc<dyn TokenLib>,
	pub client_registry: Arc<dyn ClientRegistry>,
	pub orderer_manager: Arc<dyn OrdererManager>,
	pub metric_sink: Arc<dyn MetricSink>,
	pub rooms: Arc<RoomRegistry>,
	pub connect_throttle: ThrottleGuard,
	pub submit_op_throttle: ThrottleGuard,
	pub max_clients_per_document: u64,
	pub max_token_lifetime_sec: i64,
	pub token_expiry_enabled: bool,
}
