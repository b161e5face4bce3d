use crate::errors::SessionError;
use crate::types::{ClientId, RoomId};
use std::collections::{HashMap, HashSet};
use ws_events::Scope;

/// The per-socket state described in `spec.md` §3: three parallel maps keyed
/// by `ClientId`, mutated only by that socket's own event handlers.
///
/// `C` is the orderer connection handle type, opaque to this crate — it is
/// supplied by whatever collaborator implementation the caller wires in.
/// Unlike the actor-per-connection pattern used elsewhere in this codebase,
/// this struct is a plain owned value with no internal channel or lock: the
/// handlers that touch it never run concurrently with each other (one task
/// per socket, events processed in arrival order), so there is nothing to
/// guard.
#[derive(Debug)]
pub struct SessionState<C> {
	connections: HashMap<ClientId, C>,
	rooms: HashMap<ClientId, RoomId>,
	scopes: HashMap<ClientId, HashSet<Scope>>,
}

impl<C> Default for SessionState<C> {
	fn default() -> Self {
		Self {
			connections: HashMap::new(),
			rooms: HashMap::new(),
			scopes: HashMap::new(),
		}
	}
}

impl<C> SessionState<C> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a newly connected client as a room member. Corresponds to
	/// connect-pipeline step 13 (`scopeMap`/`roomMap` population).
	pub fn join_room(&mut self, client_id: ClientId, room: RoomId, scopes: HashSet<Scope>) {
		self.rooms.insert(client_id.clone(), room);
		self.scopes.insert(client_id, scopes);
	}

	/// Attaches an orderer connection handle for a writer. Requires the client
	/// to already be a room member, preserving the `connectionsMap ⊆ roomMap`
	/// invariant by construction.
	pub fn attach_connection(&mut self, client_id: ClientId, connection: C) -> Result<(), SessionError> {
		if !self.rooms.contains_key(&client_id) {
			return Err(SessionError::NotRoomMember(client_id));
		}
		if self.connections.contains_key(&client_id) {
			return Err(SessionError::AlreadyAttached(client_id));
		}
		self.connections.insert(client_id, connection);
		Ok(())
	}

	#[must_use]
	pub fn connection(&self, client_id: &str) -> Option<&C> {
		self.connections.get(client_id)
	}

	#[must_use]
	pub fn room(&self, client_id: &str) -> Option<&RoomId> {
		self.rooms.get(client_id)
	}

	#[must_use]
	pub fn scopes(&self, client_id: &str) -> Option<&HashSet<Scope>> {
		self.scopes.get(client_id)
	}

	#[must_use]
	pub fn is_room_member(&self, client_id: &str) -> bool {
		self.rooms.contains_key(client_id)
	}

	#[must_use]
	pub fn is_writer(&self, client_id: &str) -> bool {
		self.connections.contains_key(client_id)
	}

	/// True if the client is a room member whose scopes grant write access —
	/// used to pick the `nack` code when a non-writer calls `submitOp`
	/// (`spec.md` §4.6 step 1).
	#[must_use]
	pub fn has_write_scope(&self, client_id: &str) -> bool {
		self.scopes.get(client_id).is_some_and(ws_events::can_write)
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.rooms.is_empty()
	}

	pub fn room_members(&self) -> impl Iterator<Item = (&ClientId, &RoomId)> {
		self.rooms.iter()
	}

	/// Drains every per-socket map entirely, handing ownership of each
	/// client's room and (if any) its orderer connection back to the caller
	/// so the disconnect handler can tear them down. Used exactly once, at
	/// disconnect.
	pub fn drain(&mut self) -> Vec<(ClientId, RoomId, Option<C>)> {
		let rooms = std::mem::take(&mut self.rooms);
		self.scopes.clear();
		rooms
			.into_iter()
			.map(|(client_id, room)| {
				let connection = self.connections.remove(&client_id);
				(client_id, room, connection)
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scopes_with(scope: Scope) -> HashSet<Scope> {
		let mut s = HashSet::new();
		s.insert(scope);
		s
	}

	#[test]
	fn attach_connection_requires_room_membership() {
		let mut state: SessionState<u32> = SessionState::new();
		let client = ClientId::new();
		let err = state.attach_connection(client, 1).unwrap_err();
		assert!(matches!(err, SessionError::NotRoomMember(_)));
	}

	#[test]
	fn attach_connection_succeeds_after_join() {
		let mut state: SessionState<u32> = SessionState::new();
		let client = ClientId::new();
		state.join_room(client.clone(), RoomId::new("t", "d"), scopes_with(Scope::DocWrite));
		assert!(state.attach_connection(client.clone(), 42).is_ok());
		assert!(state.is_writer(client.as_str()));
	}

	#[test]
	fn has_write_scope_reflects_join_time_scopes() {
		let mut state: SessionState<u32> = SessionState::new();
		let client = ClientId::new();
		state.join_room(client.clone(), RoomId::new("t", "d"), scopes_with(Scope::DocRead));
		assert!(!state.has_write_scope(client.as_str()));
	}

	#[test]
	fn drain_empties_all_three_maps_and_returns_connections() {
		let mut state: SessionState<u32> = SessionState::new();
		let client = ClientId::new();
		state.join_room(client.clone(), RoomId::new("t", "d"), scopes_with(Scope::DocWrite));
		state.attach_connection(client.clone(), 7).unwrap();

		let drained = state.drain();
		assert_eq!(drained.len(), 1);
		assert_eq!(drained[0].2, Some(7));
		assert!(state.is_empty());
		assert!(state.scopes(client.as_str()).is_none());
	}
}
