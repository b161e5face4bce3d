use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw shape a transport message is decoded into before being matched against a
/// known event name. Keeping this separate from `ClientEvent` means the wire
/// framing (event name + JSON payload) can be swapped without touching the
/// enum the rest of the gateway matches on.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
	pub event: String,
	#[serde(default)]
	pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
	pub event: &'static str,
	pub data: serde_json::Value,
}

impl OutboundFrame {
	pub fn new<T: Serialize>(event: &'static str, data: T) -> Self {
		Self {
			event,
			data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
		}
	}
}

#[derive(Debug, Error)]
pub enum FrameError {
	#[error("unknown transport event: {0}")]
	UnknownEvent(String),
	#[error("malformed event payload: {0}")]
	Malformed(#[from] serde_json::Error),
}
