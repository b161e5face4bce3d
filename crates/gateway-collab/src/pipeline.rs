use crate::collaborators::Orderer;
use crate::context::GatewayContext;
use crate::rooms::RoomEvent;
use crate::sanitize::{sanitize, SanitizeOutcome};
use crate::throttle::{connect_key, submit_op_key};
use async_broadcast::Receiver;
use std::sync::Arc;
use ws_connection::{ClientId, RoomId, SessionState};
use ws_events::{
	can_write, version, ConnectDocumentError, ConnectMode, IConnect, IConnected, NackMessage, NackType, OpOrBatch, RoomJoin, RoomLeave, ServerEvent,
	ServiceConfiguration, SignalMessage,
};

pub type OrdererHandle = Arc<dyn Orderer>;
pub type GatewaySessionState = SessionState<OrdererHandle>;

fn reject(code: u16, message: impl Into<String>) -> ConnectDocumentError {
	ConnectDocumentError {
		code,
		message: message.into(),
		retry_after: None,
	}
}

fn reject_with_retry(code: u16, message: impl Into<String>, retry_after_sec: u64) -> ConnectDocumentError {
	ConnectDocumentError {
		code,
		message: message.into(),
		retry_after: Some(retry_after_sec),
	}
}

fn nack(code: u16, nack_type: NackType, message: impl Into<String>, retry_after_sec: Option<u64>) -> NackMessage {
	NackMessage {
		code,
		nack_type,
		message: message.into(),
		retry_after: retry_after_sec,
	}
}

fn now_ms() -> i64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX)).unwrap_or(0)
}

/// Outcome of a successful `connect_document`. The orderer handle (when this
/// client connected as a writer) is handed back so the transport layer can
/// install the one-shot error listener §4.5 step 12 requires — that listener
/// has to force-close the actual socket, which this crate has no handle to.
/// `receiver` is the live room subscription obtained at step 6; the caller
/// must forward it rather than subscribing again, or it misses any broadcast
/// that fires while the remaining connect steps are still in flight.
pub struct ConnectSuccess {
	pub client_id: ClientId,
	pub room: RoomId,
	pub response: IConnected,
	pub orderer: Option<OrdererHandle>,
	pub expires_in_ms: Option<i64>,
	pub receiver: Receiver<RoomEvent>,
}

/// Maps a `connect_document` outcome to the short label `MetricSink::record_connect_outcome` expects.
fn outcome_label(code: u16) -> &'static str {
	match code {
		200..=299 => "success",
		429 => "throttled",
		401 | 403 => "unauthorized",
		400 => "bad_request",
		_ => "error",
	}
}

/// Runs `connect_document` (`spec.md` §4.5) and records exactly one outcome
/// metric for the attempt, success or failure alike.
pub async fn connect_document(ctx: &GatewayContext, state: &mut GatewaySessionState, connect: IConnect) -> Result<ConnectSuccess, ConnectDocumentError> {
	let result = connect_document_inner(ctx, state, connect).await;
	match &result {
		Ok(_) => ctx.metric_sink.record_connect_outcome(outcome_label(200)),
		Err(err) => ctx.metric_sink.record_connect_outcome(outcome_label(err.code)),
	}
	result
}

/// The full `connect_document` state machine (`spec.md` §4.5).
#[allow(clippy::too_many_lines)]
async fn connect_document_inner(ctx: &GatewayContext, state: &mut GatewaySessionState, connect: IConnect) -> Result<ConnectSuccess, ConnectDocumentError> {
	// 1. Throttle.
	if let Err(t) = ctx.connect_throttle.check(&connect_key(&connect.tenant_id)).await {
		ctx.metric_sink.record_throttle_exceeded("connect");
		return Err(reject_with_retry(t.code, t.message, t.retry_after_sec));
	}

	// 2. Token presence. A frame missing `token`/`tenantId`/`id` deserializes
	// to empty strings (`ws_events::IConnect`'s `#[serde(default)]` fields)
	// rather than failing transport decode, so this check is the single path
	// every flavor of "caller didn't supply identity" rejects through.
	if connect.token.is_empty() || connect.tenant_id.is_empty() || connect.id.is_empty() {
		return Err(reject(403, "Must provide an authorization token"));
	}

	// 3. Token claim validation.
	let claims = ctx
		.token_lib
		.validate_token_claims(&connect.token, &connect.id, &connect.tenant_id)
		.await
		.map_err(|e| reject(e.status, e.data.unwrap_or_else(|| "Invalid token".to_string())))?;

	// 4. Tenant verification.
	ctx.tenant_manager
		.verify_token(&claims.tenant_id, &connect.token)
		.await
		.map_err(|e| reject(e.status.unwrap_or(401), e.message))?;

	// 5. Mint clientId, compute room.
	let client_id = ClientId::new();
	let room = RoomId::new(claims.tenant_id.clone(), claims.document_id.clone());

	// 6. Transport room join: subscribing to the in-process broadcast hub
	// cannot itself fail, so there is no internal-fault arc to take here. The
	// receiver is kept and returned rather than discarded, since this client
	// is room-joined as of this step and must not miss anything broadcast
	// while the remaining steps below are still in flight.
	let receiver = ctx.rooms.subscribe(&room);

	// 7. Compose client descriptor; server-side scopes always win.
	let mut descriptor = connect.client.clone().unwrap_or_default();
	descriptor.user = Some(claims.user.clone());
	descriptor.timestamp = Some(now_ms());
	let mut effective_scopes = claims.scopes.clone();
	let is_summarizer = descriptor.details.as_ref().is_some_and(ws_events::ClientDetails::is_summarizer);
	if !is_summarizer {
		effective_scopes.remove(&ws_events::Scope::SummaryWrite);
	}

	// 8. Protocol negotiation.
	let negotiated_version = version::negotiate(&connect.versions).ok_or_else(|| {
		let server_list = format!("[{}]", version::SERVER_PROTOCOL_PREFERENCE.join(","));
		let client_list = serde_json::to_string(&connect.versions).unwrap_or_default();
		reject(400, format!("Unsupported client protocol. Server: {server_list}. Client: {client_list}"))
	})?;

	// 9. Quota.
	let existing_clients = ctx
		.client_registry
		.get_clients(&claims.tenant_id, &claims.document_id)
		.await
		.map_err(|_| reject(500, "Failed to connect client to document."))?;
	if existing_clients.len() as u64 > ctx.max_clients_per_document {
		return Err(reject_with_retry(429, "Too Many Clients Connected to Document", 300));
	}

	// 10. Register client.
	ctx.client_registry
		.add_client(&claims.tenant_id, &claims.document_id, client_id.as_str(), descriptor.clone())
		.await
		.map_err(|err| {
			tracing::error!(tenant_id = %claims.tenant_id, document_id = %claims.document_id, error = %err, "client registry add failed");
			reject(500, "Failed to connect client to document.")
		})?;

	// 11. Expiration arm.
	let expires_in_ms = if ctx.token_expiry_enabled {
		let remaining_ms = ctx
			.token_lib
			.validate_token_claims_expiration(&claims, ctx.max_token_lifetime_sec)
			.await
			.map_err(|e| reject(e.status, e.data.unwrap_or_else(|| "Token lifetime rejected".to_string())))?;
		Some(remaining_ms)
	} else {
		None
	};

	// 12. Mode selection.
	let wants_write = connect.mode == ConnectMode::Write;
	let writer = wants_write && can_write(&effective_scopes);

	let (orderer, max_message_size, service_configuration) = if writer {
		let orderer = ctx.orderer_manager.get_orderer(&claims.tenant_id, &claims.document_id).await.map_err(|err| {
			tracing::error!(tenant_id = %claims.tenant_id, document_id = %claims.document_id, error = %err, "orderer fetch failed");
			reject(500, "Failed to connect client to document.")
		})?;

		let max_message_size = orderer.max_message_size();
		let service_configuration = orderer.service_configuration();

		// Initiating connect() need not block the response; its rejection is
		// logged, never surfaced (`spec.md` §5, §9).
		let spawn_handle = Arc::clone(&orderer);
		tokio::spawn(async move {
			if let Err(err) = spawn_handle.connect().await {
				tracing::warn!(error = %err, "orderer connect() rejected");
			}
		});

		(Some(orderer), max_message_size, service_configuration)
	} else {
		(None, 1024, ServiceConfiguration::platform_default())
	};

	// 13. Populate per-socket state.
	state.join_room(client_id.clone(), room.clone(), effective_scopes.clone());
	if let Some(orderer) = &orderer {
		state
			.attach_connection(client_id.clone(), Arc::clone(orderer))
			.expect("client was just joined to this room and has no existing attachment");
	}

	// 14. Compose response.
	let response = IConnected {
		claims: ws_events::Claims {
			tenant_id: claims.tenant_id.clone(),
			document_id: claims.document_id.clone(),
			user: claims.user.clone(),
			scopes: effective_scopes,
			expiration_epoch_sec: claims.expiration_epoch_sec,
		},
		client_id: client_id.to_string(),
		existing: true,
		mode: if writer { ConnectMode::Write } else { ConnectMode::Read },
		max_message_size,
		service_configuration,
		initial_clients: existing_clients,
		initial_messages: Vec::new(),
		initial_signals: Vec::new(),
		supported_versions: version::SERVER_PROTOCOL_PREFERENCE.to_vec(),
		version: negotiated_version,
		timestamp: now_ms(),
	};

	// 15. Announce join.
	ctx.rooms.broadcast(
		&room,
		ServerEvent::SignalRoomJoin(RoomJoin {
			client_id: client_id.to_string(),
			details: Some(descriptor),
		}),
	);

	Ok(ConnectSuccess {
		client_id,
		room,
		response,
		orderer,
		expires_in_ms,
		receiver,
	})
}

/// Outcome of `submitOp` (`spec.md` §4.6).
pub enum SubmitOpOutcome {
	Forwarded,
	Nack(Vec<NackMessage>),
}

/// Outcome of `submitSignal`, `get_clients`, and `ping` (`spec.md` §4.7, §4.9);
/// all three share the same accepted/nack-if-absent shape.
pub enum RoomActionOutcome {
	Ok,
	Nack(Vec<NackMessage>),
}

fn flatten(batches: Vec<OpOrBatch>) -> Vec<ws_events::Op> {
	batches.into_iter().flat_map(OpOrBatch::into_vec).collect()
}

/// Runs `submitOp` (`spec.md` §4.6).
pub async fn submit_op(ctx: &GatewayContext, state: &GatewaySessionState, client_id: &str, batches: Vec<OpOrBatch>) -> SubmitOpOutcome {
	let Some(connection) = state.connection(client_id) else {
		let nack_message = if state.is_room_member(client_id) {
			if state.has_write_scope(client_id) {
				nack(400, NackType::BadRequestError, "Readonly client", None)
			} else {
				nack(403, NackType::InvalidScopeError, "Invalid scope", None)
			}
		} else {
			nack(400, NackType::BadRequestError, "Nonexistent client", None)
		};
		return SubmitOpOutcome::Nack(vec![nack_message]);
	};

	let Some(room) = state.room(client_id) else {
		return SubmitOpOutcome::Nack(vec![nack(400, NackType::BadRequestError, "Nonexistent client", None)]);
	};

	if let Err(throttled) = ctx.submit_op_throttle.check(&submit_op_key(client_id, &room.tenant_id)).await {
		ctx.metric_sink.record_throttle_exceeded("submit_op");
		return SubmitOpOutcome::Nack(vec![nack(throttled.code, NackType::ThrottlingError, throttled.message, Some(throttled.retry_after_sec))]);
	}

	// One `order()` call per batch element, carrying that batch's whole
	// surviving sanitized list (`spec.md` §4.6 step 3) — batches must not be
	// flattened across the whole submitOp call, only within each element.
	for batch in batches {
		let mut forwarded = Vec::new();
		for op in batch.into_vec() {
			match sanitize(&op) {
				SanitizeOutcome::Forward(sanitized) => forwarded.push(sanitized),
				SanitizeOutcome::RoundTrip { traces: Some(traces) } => {
					ctx.metric_sink.write_latency_metric("latency", traces).await;
				}
				SanitizeOutcome::RoundTrip { traces: None } | SanitizeOutcome::Drop => {}
			}
		}
		if !forwarded.is_empty() {
			if let Err(err) = connection.order(forwarded).await {
				tracing::warn!(client_id, error = %err, "orderer rejected submitted batch");
			}
		}
	}

	SubmitOpOutcome::Forwarded
}

/// Runs `submitSignal` (`spec.md` §4.7).
pub fn submit_signal(ctx: &GatewayContext, state: &GatewaySessionState, client_id: &str, batches: Vec<OpOrBatch>) -> RoomActionOutcome {
	let Some(room) = state.room(client_id) else {
		return RoomActionOutcome::Nack(vec![nack(400, NackType::BadRequestError, "Nonexistent client", None)]);
	};
	for payload in flatten(batches) {
		ctx.rooms.broadcast(
			room,
			ServerEvent::Signal(SignalMessage {
				client_id: client_id.to_string(),
				content: payload,
			}),
		);
	}
	RoomActionOutcome::Ok
}

/// Runs `get_clients` (`spec.md` §4.9).
pub async fn get_clients(ctx: &GatewayContext, state: &GatewaySessionState, client_id: &str) -> RoomActionOutcome {
	let Some(room) = state.room(client_id) else {
		return RoomActionOutcome::Nack(vec![nack(400, NackType::BadRequestError, "Nonexistent client", None)]);
	};
	match ctx.client_registry.get_clients(&room.tenant_id, &room.document_id).await {
		Ok(clients) => {
			ctx.rooms.broadcast(room, ServerEvent::ConnectedClients(clients));
			RoomActionOutcome::Ok
		}
		Err(err) => {
			// Internal fault (`spec.md` §7 class 2): never fabricate a client
			// list for the room. Broadcasting an empty list here would tell
			// every room member the room just emptied out, which is worse than
			// telling only the caller its own request failed.
			tracing::error!(tenant_id = %room.tenant_id, document_id = %room.document_id, error = %err, "failed to fetch client list");
			RoomActionOutcome::Nack(vec![nack(500, NackType::BadRequestError, "Failed to fetch client list.", None)])
		}
	}
}

/// Runs `ping` (`spec.md` §4.9).
pub fn ping(ctx: &GatewayContext, state: &GatewaySessionState, client_id: &str) -> RoomActionOutcome {
	let Some(room) = state.room(client_id) else {
		return RoomActionOutcome::Nack(vec![nack(400, NackType::BadRequestError, "Nonexistent client", None)]);
	};
	ctx.rooms.broadcast(room, ServerEvent::Pong { client_id: client_id.to_string() });
	RoomActionOutcome::Ok
}

/// Runs the disconnect handler (`spec.md` §4.8). Clearing the per-socket
/// expiration timer is the caller's responsibility: it is a transport-level
/// resource this crate never owns.
pub async fn disconnect(ctx: &GatewayContext, state: &mut GatewaySessionState) {
	let drained = state.drain();
	let mut removals = Vec::with_capacity(drained.len());

	for (client_id, room, connection) in drained {
		if let Some(connection) = connection {
			tracing::info!(client_id = %client_id, "tearing down orderer connection on disconnect");
			tokio::spawn(async move {
				connection.disconnect().await;
			});
		}

		tracing::info!(client_id = %client_id, room = %room, "removing client from registry on disconnect");
		ctx.metric_sink.record_disconnect();
		let registry = Arc::clone(&ctx.client_registry);
		let tenant_id = room.tenant_id.to_string();
		let document_id = room.document_id.to_string();
		let client_id_str = client_id.to_string();
		removals.push(async move {
			if let Err(err) = registry.remove_client(&tenant_id, &document_id, &client_id_str).await {
				tracing::error!(tenant_id, document_id, error = %err, "failed to remove client from registry");
			}
		});

		ctx.rooms.broadcast(&room, ServerEvent::SignalRoomLeave(RoomLeave { client_id: client_id.to_string() }));
	}

	futures::future::join_all(removals).await;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::{AllowAllTenantManager, InMemoryClientRegistry, JsonClaimsTokenLib, InMemoryOrdererManager, RecordingMetricSink};
	use crate::rooms::RoomRegistry;
	use crate::throttle::{ThrottleGuard, TokenBucketRateLimiter};
	use std::collections::HashSet;
	use std::time::{Duration, SystemTime, UNIX_EPOCH};
	use ws_events::{Claims, ClientDescriptor, Scope};

	fn test_context() -> GatewayContext {
		GatewayContext {
			tenant_manager: Arc::new(AllowAllTenantManager),
			token_lib: Arc::new(JsonClaimsTokenLib),
			client_registry: Arc::new(InMemoryClientRegistry::default()),
			orderer_manager: Arc::new(InMemoryOrdererManager::default()),
			metric_sink: Arc::new(RecordingMetricSink::default()),
			rooms: Arc::new(RoomRegistry::new()),
			connect_throttle: ThrottleGuard::disabled(),
			submit_op_throttle: ThrottleGuard::disabled(),
			max_clients_per_document: 1_000_000,
			max_token_lifetime_sec: 3600,
			token_expiry_enabled: false,
		}
	}

	fn epoch_sec_from_now(delta: i64) -> i64 {
		let now = i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()).unwrap();
		now + delta
	}

	fn scope_set(scopes: &[Scope]) -> HashSet<Scope> {
		scopes.iter().cloned().collect()
	}

	fn token_for(tenant_id: &str, document_id: &str, scopes: HashSet<Scope>, expiration_epoch_sec: i64) -> String {
		let claims = Claims {
			tenant_id: tenant_id.to_string(),
			document_id: document_id.to_string(),
			user: serde_json::json!({"name": "test-user"}),
			scopes,
			expiration_epoch_sec,
		};
		serde_json::to_string(&claims).unwrap()
	}

	fn connect_request(tenant_id: &str, document_id: &str, token: String, mode: ConnectMode) -> IConnect {
		IConnect {
			tenant_id: tenant_id.to_string(),
			id: document_id.to_string(),
			token,
			client: None,
			versions: vec!["^0.4.0".to_string()],
			mode,
		}
	}

	// Scenario: happy writer connects and is attached to an orderer.
	#[tokio::test]
	async fn happy_writer_connects_and_gets_an_orderer() {
		let ctx = test_context();
		let mut state: GatewaySessionState = SessionState::new();
		let token = token_for("tenant-a", "doc-1", scope_set(&[Scope::DocWrite]), epoch_sec_from_now(10_000));
		let connect = connect_request("tenant-a", "doc-1", token, ConnectMode::Write);

		let success = connect_document(&ctx, &mut state, connect).await.unwrap();

		assert_eq!(success.response.mode, ConnectMode::Write);
		assert!(success.orderer.is_some());
		assert!(state.is_writer(success.client_id.as_str()));
	}

	// Scenario: a read-scoped client requesting write mode falls back to read,
	// and is never attached to an orderer (writer gating invariant).
	#[tokio::test]
	async fn write_request_without_write_scope_falls_back_to_read() {
		let ctx = test_context();
		let mut state: GatewaySessionState = SessionState::new();
		let token = token_for("tenant-a", "doc-1", scope_set(&[Scope::DocRead]), epoch_sec_from_now(10_000));
		let connect = connect_request("tenant-a", "doc-1", token, ConnectMode::Write);

		let success = connect_document(&ctx, &mut state, connect).await.unwrap();

		assert_eq!(success.response.mode, ConnectMode::Read);
		assert!(success.orderer.is_none());
		assert!(!state.is_writer(success.client_id.as_str()));
	}

	// Scenario + invariant (scope safety): summary:write is stripped from the
	// effective scopes unless the connecting client identifies as a summarizer.
	#[tokio::test]
	async fn summarizer_scope_is_stripped_for_non_summarizer_clients() {
		let ctx = test_context();
		let mut state: GatewaySessionState = SessionState::new();
		let token = token_for("tenant-a", "doc-1", scope_set(&[Scope::DocWrite, Scope::SummaryWrite]), epoch_sec_from_now(10_000));
		let connect = connect_request("tenant-a", "doc-1", token, ConnectMode::Write);

		let success = connect_document(&ctx, &mut state, connect).await.unwrap();

		assert!(!success.response.claims.scopes.contains(&Scope::SummaryWrite));
	}

	// Scenario: quota is enforced per document; a document already at its
	// configured client cap rejects a new connect with 429.
	#[tokio::test]
	async fn quota_is_enforced_per_document() {
		let registry = InMemoryClientRegistry::default();
		registry.add_client("tenant-a", "doc-1", "already-connected", ClientDescriptor::default()).await.unwrap();

		let mut ctx = test_context();
		ctx.client_registry = Arc::new(registry);
		ctx.max_clients_per_document = 0;

		let mut state: GatewaySessionState = SessionState::new();
		let token = token_for("tenant-a", "doc-1", scope_set(&[Scope::DocRead]), epoch_sec_from_now(10_000));
		let connect = connect_request("tenant-a", "doc-1", token, ConnectMode::Read);

		let err = connect_document(&ctx, &mut state, connect).await.unwrap_err();

		assert_eq!(err.code, 429);
	}

	// Scenario: an offered protocol range that shares no intersection with the
	// server's preference list is rejected with 400.
	#[tokio::test]
	async fn unsupported_protocol_is_rejected() {
		let ctx = test_context();
		let mut state: GatewaySessionState = SessionState::new();
		let token = token_for("tenant-a", "doc-1", scope_set(&[Scope::DocRead]), epoch_sec_from_now(10_000));
		let mut connect = connect_request("tenant-a", "doc-1", token, ConnectMode::Read);
		connect.versions = vec!["^9.9.9".to_string()];

		let err = connect_document(&ctx, &mut state, connect).await.unwrap_err();

		assert_eq!(err.code, 400);
	}

	// Scenario: an already-expired token is rejected once expiry enforcement
	// is enabled.
	#[tokio::test]
	async fn expired_token_is_rejected_when_expiry_enforced() {
		let mut ctx = test_context();
		ctx.token_expiry_enabled = true;
		let mut state: GatewaySessionState = SessionState::new();
		let token = token_for("tenant-a", "doc-1", scope_set(&[Scope::DocRead]), epoch_sec_from_now(-10));
		let connect = connect_request("tenant-a", "doc-1", token, ConnectMode::Read);

		let err = connect_document(&ctx, &mut state, connect).await.unwrap_err();

		assert_eq!(err.code, 401);
	}

	// Companion to the expiry scenario: a token within its lifetime arms an
	// expiration deadline for the caller to track.
	#[tokio::test]
	async fn unexpired_token_arms_an_expiration_timer_when_enforced() {
		let mut ctx = test_context();
		ctx.token_expiry_enabled = true;
		let mut state: GatewaySessionState = SessionState::new();
		let token = token_for("tenant-a", "doc-1", scope_set(&[Scope::DocRead]), epoch_sec_from_now(10_000));
		let connect = connect_request("tenant-a", "doc-1", token, ConnectMode::Read);

		let success = connect_document(&ctx, &mut state, connect).await.unwrap();

		assert!(success.expires_in_ms.is_some());
	}

	// Scenario: submitOp is nacked once the per-client throttle is exhausted.
	#[tokio::test]
	async fn submit_op_is_nacked_once_throttle_is_exceeded() {
		let mut ctx = test_context();
		ctx.submit_op_throttle = ThrottleGuard::new(Some(Arc::new(TokenBucketRateLimiter::new(1, Duration::from_secs(60)))));
		let mut state: GatewaySessionState = SessionState::new();
		let token = token_for("tenant-a", "doc-1", scope_set(&[Scope::DocWrite]), epoch_sec_from_now(10_000));
		let connect = connect_request("tenant-a", "doc-1", token, ConnectMode::Write);
		let success = connect_document(&ctx, &mut state, connect).await.unwrap();
		let client_id = success.client_id.to_string();

		let first = submit_op(&ctx, &state, &client_id, vec![]).await;
		assert!(matches!(first, SubmitOpOutcome::Forwarded));

		let second = submit_op(&ctx, &state, &client_id, vec![]).await;
		assert!(matches!(second, SubmitOpOutcome::Nack(_)));
	}

	// Invariant (signal gating): submitSignal from a client that never joined
	// any room is nacked, not silently dropped.
	#[test]
	fn submit_signal_from_unknown_client_is_nacked() {
		let ctx = test_context();
		let state: GatewaySessionState = SessionState::new();

		let outcome = submit_signal(&ctx, &state, "no-such-client", vec![]);

		assert!(matches!(outcome, RoomActionOutcome::Nack(_)));
	}

	// Invariant (room fan-out): a successful connect announces a room join to
	// every subscriber already listening on that room.
	#[tokio::test]
	async fn connect_announces_room_join_to_existing_subscribers() {
		let ctx = test_context();
		let room = RoomId::new("tenant-a", "doc-1");
		let mut subscriber = ctx.rooms.subscribe(&room);
		let mut state: GatewaySessionState = SessionState::new();
		let token = token_for("tenant-a", "doc-1", scope_set(&[Scope::DocRead]), epoch_sec_from_now(10_000));
		let connect = connect_request("tenant-a", "doc-1", token, ConnectMode::Read);

		connect_document(&ctx, &mut state, connect).await.unwrap();

		let event = subscriber.recv().await.unwrap();
		match event.0.as_ref() {
			ServerEvent::SignalRoomJoin(_) => {}
			other => panic!("expected SignalRoomJoin, got {other:?}"),
		}
	}

	// Invariant (join/leave parity): disconnect frees the registry slot and
	// announces a room leave for every client it drains.
	#[tokio::test]
	async fn disconnect_announces_room_leave_and_frees_the_client_registry_slot() {
		let ctx = test_context();
		let mut state: GatewaySessionState = SessionState::new();
		let token = token_for("tenant-a", "doc-1", scope_set(&[Scope::DocWrite]), epoch_sec_from_now(10_000));
		let connect = connect_request("tenant-a", "doc-1", token, ConnectMode::Write);
		let success = connect_document(&ctx, &mut state, connect).await.unwrap();
		let mut subscriber = ctx.rooms.subscribe(&success.room);

		disconnect(&ctx, &mut state).await;

		assert!(state.is_empty());
		let clients = ctx.client_registry.get_clients("tenant-a", "doc-1").await.unwrap();
		assert!(clients.is_empty());

		let event = subscriber.recv().await.unwrap();
		match event.0.as_ref() {
			ServerEvent::SignalRoomLeave(_) => {}
			other => panic!("expected SignalRoomLeave, got {other:?}"),
		}
	}
}
