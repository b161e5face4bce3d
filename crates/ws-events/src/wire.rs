use crate::claims::Claims;
use crate::frame::{FrameError, InboundFrame, OutboundFrame};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// An inbound operation before sanitization: an opaque JSON object whose only
/// structural guarantee is that it is an object, not a string, number, etc.
pub type Op = serde_json::Value;

/// A single batch element: either one op or an array of ops, flattened by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OpOrBatch {
	One(Op),
	Many(Vec<Op>),
}

impl OpOrBatch {
	#[must_use]
	pub fn into_vec(self) -> Vec<Op> {
		match self {
			OpOrBatch::One(op) => vec![op],
			OpOrBatch::Many(ops) => ops,
		}
	}
}

/// Canonical whitelisted shape the sanitizer projects an inbound op onto before
/// handing it to the orderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedOp {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub client_sequence_number: Option<i64>,
	pub contents: serde_json::Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub metadata: Option<serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reference_sequence_number: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub traces: Option<Vec<serde_json::Value>>,
	#[serde(rename = "type", skip_serializing_if = "Option::is_none")]
	pub op_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectMode {
	Read,
	Write,
}

impl Default for ConnectMode {
	fn default() -> Self {
		ConnectMode::Read
	}
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClientDetails {
	#[serde(default, rename = "type")]
	pub client_type: Option<String>,
}

impl ClientDetails {
	#[must_use]
	pub fn is_summarizer(&self) -> bool {
		self.client_type.as_deref() == Some("summarizer")
	}
}

/// Caller-supplied client descriptor. The server never trusts `scopes` from this
/// struct; it is always overwritten with the scopes on the verified claims.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDescriptor {
	#[serde(default)]
	pub user: Option<serde_json::Value>,
	#[serde(default)]
	pub details: Option<ClientDetails>,
	#[serde(default)]
	pub mode: Option<ConnectMode>,
	#[serde(default)]
	pub timestamp: Option<i64>,
}

/// `connect_document` request payload. The three identity fields are
/// `#[serde(default)]` rather than required so that a client omitting one
/// deserializes into an empty string instead of failing the whole frame —
/// the emptiness is then rejected by `connect_document`'s own step-2 check,
/// producing a `connect_document_error` instead of a dropped frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IConnect {
	#[serde(default)]
	pub tenant_id: String,
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub token: String,
	#[serde(default)]
	pub client: Option<ClientDescriptor>,
	#[serde(default)]
	pub versions: Vec<String>,
	#[serde(default)]
	pub mode: ConnectMode,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryConfiguration {
	pub idle_time_ms: u64,
	pub max_ops: u64,
	pub max_time_ms: u64,
}

impl Default for SummaryConfiguration {
	fn default() -> Self {
		Self {
			idle_time_ms: 5_000,
			max_ops: 1_000,
			max_time_ms: 60_000,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfiguration {
	pub block_size: u64,
	pub max_message_size: u64,
	pub summary: SummaryConfiguration,
}

impl ServiceConfiguration {
	#[must_use]
	pub fn platform_default() -> Self {
		Self {
			block_size: 64_436,
			max_message_size: 1024,
			summary: SummaryConfiguration::default(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ISignalClient {
	pub client_id: String,
	pub client: ClientDescriptor,
}

/// `connect_document_success` response payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IConnected {
	pub claims: Claims,
	pub client_id: String,
	pub existing: bool,
	pub mode: ConnectMode,
	pub max_message_size: u64,
	pub service_configuration: ServiceConfiguration,
	pub initial_clients: Vec<ISignalClient>,
	pub initial_messages: Vec<serde_json::Value>,
	pub initial_signals: Vec<serde_json::Value>,
	pub supported_versions: Vec<&'static str>,
	pub version: &'static str,
	pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum NackType {
	BadRequestError,
	InvalidScopeError,
	ThrottlingError,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NackMessage {
	pub code: u16,
	#[serde(rename = "type")]
	pub nack_type: NackType,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectDocumentError {
	pub code: u16,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoin {
	pub client_id: String,
	pub details: Option<ClientDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomLeave {
	pub client_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
	pub client_id: String,
	pub content: serde_json::Value,
}

/// Every inbound transport event the gateway understands (`spec.md` §6).
#[derive(Debug, Clone)]
pub enum ClientEvent {
	ConnectDocument(IConnect),
	SubmitOp { client_id: String, batches: Vec<OpOrBatch> },
	SubmitSignal { client_id: String, batches: Vec<OpOrBatch> },
	GetClients { client_id: String },
	Ping { client_id: String },
	Disconnect,
}

impl ClientEvent {
	pub fn from_frame(frame: InboundFrame) -> Result<Self, FrameError> {
		match frame.event.as_str() {
			"connect_document" => Ok(ClientEvent::ConnectDocument(serde_json::from_value(frame.data)?)),
			"submitOp" => {
				let (client_id, batches) = parse_client_batches(frame.data)?;
				Ok(ClientEvent::SubmitOp { client_id, batches })
			}
			"submitSignal" => {
				let (client_id, batches) = parse_client_batches(frame.data)?;
				Ok(ClientEvent::SubmitSignal { client_id, batches })
			}
			"get_clients" => Ok(ClientEvent::GetClients {
				client_id: parse_client_id(frame.data)?,
			}),
			"ping" => Ok(ClientEvent::Ping {
				client_id: parse_client_id(frame.data)?,
			}),
			"disconnect" => Ok(ClientEvent::Disconnect),
			other => Err(FrameError::UnknownEvent(other.to_string())),
		}
	}
}

fn parse_client_id(data: serde_json::Value) -> Result<String, FrameError> {
	#[derive(Deserialize)]
	struct ClientIdOnly {
		#[serde(rename = "clientId")]
		client_id: String,
	}
	Ok(serde_json::from_value::<ClientIdOnly>(data)?.client_id)
}

fn parse_client_batches(data: serde_json::Value) -> Result<(String, Vec<OpOrBatch>), FrameError> {
	#[derive(Deserialize)]
	struct ClientBatches {
		#[serde(rename = "clientId")]
		client_id: String,
		#[serde(default)]
		batches: Vec<OpOrBatch>,
	}
	let parsed: ClientBatches = serde_json::from_value(data)?;
	Ok((parsed.client_id, parsed.batches))
}

/// Every outbound transport event the gateway may emit (`spec.md` §6).
#[derive(Debug, Clone)]
pub enum ServerEvent {
	ConnectDocumentSuccess(Box<IConnected>),
	ConnectDocumentError(ConnectDocumentError),
	Nack(Vec<NackMessage>),
	SignalRoomJoin(RoomJoin),
	SignalRoomLeave(RoomLeave),
	Signal(SignalMessage),
	ConnectedClients(Vec<ISignalClient>),
	Pong { client_id: String },
}

impl ServerEvent {
	#[must_use]
	pub fn into_frame(self) -> OutboundFrame {
		match self {
			ServerEvent::ConnectDocumentSuccess(payload) => OutboundFrame::new("connect_document_success", payload),
			ServerEvent::ConnectDocumentError(payload) => OutboundFrame::new("connect_document_error", payload),
			// Wire placeholder matches spec.md §6: `nack("", [NackMessage])`.
			ServerEvent::Nack(messages) => OutboundFrame::new("nack", json!(["", messages])),
			ServerEvent::SignalRoomJoin(payload) => OutboundFrame::new("signal", payload),
			ServerEvent::SignalRoomLeave(payload) => OutboundFrame::new("signal", payload),
			ServerEvent::Signal(payload) => OutboundFrame::new("signal", payload),
			ServerEvent::ConnectedClients(payload) => OutboundFrame::new("connected_clients", payload),
			ServerEvent::Pong { client_id } => OutboundFrame::new("pong", client_id),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn op_or_batch_flattens_single_and_array() {
		let one: OpOrBatch = serde_json::from_value(json!({"a": 1})).unwrap();
		assert_eq!(one.into_vec().len(), 1);

		let many: OpOrBatch = serde_json::from_value(json!([{"a": 1}, {"b": 2}])).unwrap();
		assert_eq!(many.into_vec().len(), 2);
	}

	#[test]
	fn connect_document_frame_parses_into_client_event() {
		let frame = InboundFrame {
			event: "connect_document".to_string(),
			data: json!({
				"tenantId": "tenant-a",
				"id": "doc-1",
				"token": "abc",
				"versions": ["^0.4.0"],
				"mode": "write",
			}),
		};
		match ClientEvent::from_frame(frame).unwrap() {
			ClientEvent::ConnectDocument(connect) => {
				assert_eq!(connect.tenant_id, "tenant-a");
				assert_eq!(connect.mode, ConnectMode::Write);
			}
			_ => panic!("expected ConnectDocument"),
		}
	}

	#[test]
	fn unknown_event_name_is_rejected() {
		let frame = InboundFrame {
			event: "not_a_real_event".to_string(),
			data: json!({}),
		};
		assert!(matches!(ClientEvent::from_frame(frame), Err(FrameError::UnknownEvent(_))));
	}
}
