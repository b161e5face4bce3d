use rand::Rng;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use ws_events::{Op, SanitizedOp};

const ROUND_TRIP_TYPE: &str = "RoundTrip";
const TRACE_SAMPLE_DENOMINATOR: u32 = 100;

/// Result of running an inbound op through the sanitizer (`spec.md` §4.4).
pub enum SanitizeOutcome {
	/// Survived projection; hand this to the orderer.
	Forward(SanitizedOp),
	/// A `RoundTrip` message: never forwarded. Its traces, if any, go to the
	/// metric sink as a latency sample instead.
	RoundTrip { traces: Option<Vec<Value>> },
	/// Not a JSON object; nothing to project.
	Drop,
}

/// Projects an inbound op onto the canonical whitelisted shape, dropping any
/// field not in `{clientSequenceNumber, contents, metadata,
/// referenceSequenceNumber, traces, type}`, and applies the 1/100 trace
/// sampling rule.
pub fn sanitize(op: &Op) -> SanitizeOutcome {
	let Some(obj) = op.as_object() else {
		return SanitizeOutcome::Drop;
	};

	let op_type = obj.get("type").and_then(Value::as_str).map(str::to_string);
	if op_type.as_deref() == Some(ROUND_TRIP_TYPE) {
		let traces = obj.get("traces").and_then(Value::as_array).cloned();
		return SanitizeOutcome::RoundTrip { traces };
	}

	let mut sanitized = SanitizedOp {
		client_sequence_number: obj.get("clientSequenceNumber").and_then(Value::as_i64),
		contents: obj.get("contents").cloned().unwrap_or(Value::Null),
		metadata: obj.get("metadata").cloned(),
		reference_sequence_number: obj.get("referenceSequenceNumber").and_then(Value::as_i64),
		traces: obj.get("traces").and_then(Value::as_array).cloned(),
		op_type,
	};
	maybe_inject_trace(&mut sanitized);
	SanitizeOutcome::Forward(sanitized)
}

fn maybe_inject_trace(op: &mut SanitizedOp) {
	let Some(traces) = &mut op.traces else {
		return;
	};
	if rand::rng().random_range(0..TRACE_SAMPLE_DENOMINATOR) != 0 {
		return;
	}
	traces.push(json!({
		"action": "start",
		"service": "alfred",
		"timestamp": now_ms(),
	}));
}

fn now_ms() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn projects_only_whitelisted_fields() {
		let op = json!({
			"clientSequenceNumber": 1,
			"contents": {"x": 1},
			"metadata": {"m": true},
			"referenceSequenceNumber": 0,
			"type": "op",
			"secretInternalField": "should not survive",
		});
		match sanitize(&op) {
			SanitizeOutcome::Forward(sanitized) => {
				assert_eq!(sanitized.client_sequence_number, Some(1));
				assert_eq!(sanitized.op_type.as_deref(), Some("op"));
				assert!(sanitized.traces.is_none());
			}
			_ => panic!("expected Forward"),
		}
		let reserialized = serde_json::to_value(match sanitize(&op) {
			SanitizeOutcome::Forward(s) => s,
			_ => unreachable!(),
		})
		.unwrap();
		assert!(reserialized.get("secretInternalField").is_none());
	}

	#[test]
	fn round_trip_messages_are_never_forwarded() {
		let op = json!({"type": "RoundTrip", "traces": [{"a": 1}]});
		match sanitize(&op) {
			SanitizeOutcome::RoundTrip { traces } => assert_eq!(traces.unwrap().len(), 1),
			_ => panic!("expected RoundTrip"),
		}
	}

	#[test]
	fn round_trip_without_traces_carries_none() {
		let op = json!({"type": "RoundTrip"});
		match sanitize(&op) {
			SanitizeOutcome::RoundTrip { traces } => assert!(traces.is_none()),
			_ => panic!("expected RoundTrip"),
		}
	}

	#[test]
	fn non_object_payloads_are_dropped() {
		assert!(matches!(sanitize(&json!("not an object")), SanitizeOutcome::Drop));
	}
}
