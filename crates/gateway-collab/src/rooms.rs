use async_broadcast::{broadcast, Receiver, Sender};
use dashmap::DashMap;
use std::sync::Arc;
use ws_connection::RoomId;
use ws_events::ServerEvent;

/// Fan-out capacity per room before the broadcast channel starts dropping the
/// oldest unread signal rather than applying backpressure — signals are
/// explicitly non-durable (`spec.md` §4.7), so dropping beats blocking.
const ROOM_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct RoomEvent(pub Arc<ServerEvent>);

/// In-process room broadcast hub. Replaces this codebase's NATS-backed
/// cross-process transport with a single-process `async_broadcast` channel
/// per room, since nothing in this gateway's contract requires fan-out to
/// cross a process boundary — every socket lives in this one server.
pub struct RoomRegistry {
	rooms: DashMap<String, Sender<RoomEvent>>,
}

impl Default for RoomRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl RoomRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self { rooms: DashMap::new() }
	}

	/// Subscribes a socket's task to a room's broadcast channel, creating the
	/// channel on first use.
	pub fn subscribe(&self, room: &RoomId) -> Receiver<RoomEvent> {
		let key = room.room_id();
		let sender = self.rooms.entry(key).or_insert_with(|| {
			let (mut tx, _rx) = broadcast(ROOM_CHANNEL_CAPACITY);
			tx.set_overflow(true);
			tx
		});
		sender.new_receiver()
	}

	/// Broadcasts a server event to every socket currently subscribed to the
	/// room. A room with no current subscribers (or that has never been
	/// joined) silently has nothing delivered.
	pub fn broadcast(&self, room: &RoomId, event: ServerEvent) {
		let key = room.room_id();
		if let Some(sender) = self.rooms.get(&key) {
			let _ = sender.try_broadcast(RoomEvent(Arc::new(event)));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ws_events::RoomLeave;

	#[tokio::test]
	async fn broadcast_reaches_every_current_subscriber() {
		let registry = RoomRegistry::new();
		let room = RoomId::new("tenant-a", "doc-1");
		let mut sub_a = registry.subscribe(&room);
		let mut sub_b = registry.subscribe(&room);

		registry.broadcast(&room, ServerEvent::SignalRoomLeave(RoomLeave { client_id: "c1".to_string() }));

		assert!(sub_a.recv().await.is_ok());
		assert!(sub_b.recv().await.is_ok());
	}

	#[tokio::test]
	async fn broadcast_to_unjoined_room_is_a_no_op() {
		let registry = RoomRegistry::new();
		let room = RoomId::new("tenant-a", "doc-1");
		registry.broadcast(&room, ServerEvent::SignalRoomLeave(RoomLeave { client_id: "c1".to_string() }));
	}
}
