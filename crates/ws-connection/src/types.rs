use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Server-minted identifier for one successful `connect_document`. Distinct
/// from tenant/user identity; unique within the process for the lifetime of
/// the connection. A single socket may hold several of these at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(Arc<str>);

impl ClientId {
	#[must_use]
	pub fn new() -> Self {
		Self(Arc::from(Uuid::new_v4().to_string()))
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for ClientId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ClientId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Lets the per-socket maps be looked up by the wire-level client id string a
/// client echoes back in `submitOp`/`submitSignal`/etc. without allocating a
/// throwaway `ClientId` first.
impl Borrow<str> for ClientId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

/// A tenant-scoped document broadcast group, keyed by `tenantId/documentId`.
/// Rooms are implicit: there is no standalone room object, only the canonical
/// string used to address the transport's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId {
	pub tenant_id: Arc<str>,
	pub document_id: Arc<str>,
}

impl RoomId {
	pub fn new(tenant_id: impl Into<Arc<str>>, document_id: impl Into<Arc<str>>) -> Self {
		Self {
			tenant_id: tenant_id.into(),
			document_id: document_id.into(),
		}
	}

	/// Canonical `tenantId/documentId` room key (`spec.md` §4.1).
	#[must_use]
	pub fn room_id(&self) -> String {
		format!("{}/{}", self.tenant_id, self.document_id)
	}
}

impl fmt::Display for RoomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.room_id())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn room_id_is_tenant_slash_document() {
		let room = RoomId::new("tenant-a", "doc-1");
		assert_eq!(room.room_id(), "tenant-a/doc-1");
	}

	#[test]
	fn client_ids_are_unique() {
		assert_ne!(ClientId::new(), ClientId::new());
	}
}
