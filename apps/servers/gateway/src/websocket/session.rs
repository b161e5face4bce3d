use crate::AppState;
use async_broadcast::{Receiver, RecvError};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use gateway_collab::rooms::RoomEvent;
use gateway_collab::{pipeline, GatewayContext, GatewaySessionState, RoomActionOutcome, SubmitOpOutcome};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use ws_connection::SessionState;
use ws_events::{ClientEvent, ConnectDocumentError, FrameError, InboundFrame, NackMessage, NackType, ServerEvent};

/// Runs one socket's lifecycle end to end: decode frames, drive the
/// connect/submit/presence pipeline against a private `SessionState`, forward
/// room broadcasts back onto the wire, and tear everything down on close
/// (`spec.md` §5 — one task per socket, handlers never interleave).
pub async fn run(socket: WebSocket, state: AppState, addr: SocketAddr) {
	let ctx = state.ctx;
	let shutdown = state.shutdown;
	let (mut sink, mut stream) = socket.split();

	let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
	let writer_task = tokio::spawn(async move {
		while let Some(msg) = outbound_rx.recv().await {
			if sink.send(msg).await.is_err() {
				break;
			}
		}
	});

	let mut session: GatewaySessionState = SessionState::new();
	let mut joined_rooms: HashSet<String> = HashSet::new();
	let mut room_forwarders: Vec<JoinHandle<()>> = Vec::new();
	let (orderer_err_tx, mut orderer_err_rx) = mpsc::unbounded_channel::<String>();

	// A single expiration timer per socket (`spec.md` §9): rearming on a
	// second `connect_document` replaces this deadline rather than tracking
	// one per clientId, as the source this is modeled on does.
	let far_future = tokio::time::Instant::now() + Duration::from_secs(365 * 24 * 3600);
	let sleep = tokio::time::sleep_until(far_future);
	tokio::pin!(sleep);
	let mut expiration_armed = false;

	loop {
		tokio::select! {
			biased;

			() = shutdown.cancelled() => {
				tracing::info!(%addr, "shutdown signalled; closing socket");
				break;
			}

			Some(message) = orderer_err_rx.recv() => {
				tracing::error!(%addr, error = %message, "orderer reported an error; forcing transport close");
				break;
			}

			() = &mut sleep, if expiration_armed => {
				tracing::info!(%addr, "token expiration timer fired; forcing transport close");
				break;
			}

			frame = stream.next() => {
				match frame {
					Some(Ok(Message::Text(text))) => {
						let should_close = handle_text(
							&ctx,
							&mut session,
							&text,
							&outbound_tx,
							&orderer_err_tx,
							&mut joined_rooms,
							&mut room_forwarders,
							sleep.as_mut(),
							&mut expiration_armed,
						)
						.await;
						if should_close {
							break;
						}
					}
					Some(Ok(Message::Close(_))) | None => break,
					Some(Ok(_)) => {}
					Some(Err(err)) => {
						tracing::warn!(%addr, error = %err, "websocket read error");
						break;
					}
				}
			}
		}
	}

	for handle in room_forwarders {
		handle.abort();
	}
	drop(outbound_tx);
	let _ = writer_task.await;

	pipeline::disconnect(&ctx, &mut session).await;
}

#[allow(clippy::too_many_arguments)]
async fn handle_text(
	ctx: &Arc<GatewayContext>,
	session: &mut GatewaySessionState,
	text: &str,
	outbound_tx: &UnboundedSender<Message>,
	orderer_err_tx: &UnboundedSender<String>,
	joined_rooms: &mut HashSet<String>,
	room_forwarders: &mut Vec<JoinHandle<()>>,
	mut sleep: std::pin::Pin<&mut tokio::time::Sleep>,
	expiration_armed: &mut bool,
) -> bool {
	let frame: InboundFrame = match serde_json::from_str(text) {
		Ok(frame) => frame,
		Err(err) => {
			tracing::warn!(error = %err, "malformed transport frame, dropping");
			return false;
		}
	};

	let event_name = frame.event.clone();
	let event = match ClientEvent::from_frame(frame) {
		Ok(event) => event,
		Err(FrameError::UnknownEvent(name)) => {
			tracing::warn!(event = name, "unknown transport event, dropping");
			return false;
		}
		// A frame whose payload fails to deserialize still gets a reply: a
		// silently dropped frame leaves the caller waiting forever for
		// something that is never coming (spec.md §4.5/§7 class 1).
		Err(FrameError::Malformed(err)) => {
			tracing::warn!(event = event_name, error = %err, "malformed event payload");
			match event_name.as_str() {
				"connect_document" => send_frame(
					outbound_tx,
					ServerEvent::ConnectDocumentError(ConnectDocumentError {
						code: 400,
						message: "Malformed connect_document payload".to_string(),
						retry_after: None,
					}),
				),
				"submitOp" | "submitSignal" | "get_clients" | "ping" => send_frame(
					outbound_tx,
					ServerEvent::Nack(vec![NackMessage {
						code: 400,
						nack_type: NackType::BadRequestError,
						message: "Malformed request payload".to_string(),
						retry_after: None,
					}]),
				),
				_ => {}
			}
			return false;
		}
	};

	match event {
		ClientEvent::ConnectDocument(connect) => {
			match pipeline::connect_document(ctx, session, connect).await {
				Ok(success) => {
					let room_key = success.room.room_id();
					// Reuse the receiver connect_document already subscribed at
					// its step 6, rather than subscribing again here: a second,
					// later subscribe would miss anything broadcast to this room
					// during the steps connect_document ran in between.
					if joined_rooms.insert(room_key) {
						room_forwarders.push(spawn_room_forwarder(success.receiver, outbound_tx.clone()));
					}

					if let Some(orderer) = success.orderer.clone() {
						let err_tx = orderer_err_tx.clone();
						orderer.on_error(Box::new(move |message| {
							let _ = err_tx.send(message);
						}));
					}

					if let Some(expires_in_ms) = success.expires_in_ms {
						let deadline = tokio::time::Instant::now() + Duration::from_millis(u64::try_from(expires_in_ms.max(0)).unwrap_or(0));
						sleep.as_mut().reset(deadline);
						*expiration_armed = true;
					}

					send_frame(outbound_tx, ServerEvent::ConnectDocumentSuccess(Box::new(success.response)));
				}
				Err(err) => {
					tracing::info!(code = err.code, message = %err.message, "connect_document rejected");
					send_frame(outbound_tx, ServerEvent::ConnectDocumentError(err));
				}
			}
			false
		}

		ClientEvent::SubmitOp { client_id, batches } => {
			if let SubmitOpOutcome::Nack(messages) = pipeline::submit_op(ctx, session, &client_id, batches).await {
				send_frame(outbound_tx, ServerEvent::Nack(messages));
			}
			false
		}

		ClientEvent::SubmitSignal { client_id, batches } => {
			if let RoomActionOutcome::Nack(messages) = pipeline::submit_signal(ctx, session, &client_id, batches) {
				send_frame(outbound_tx, ServerEvent::Nack(messages));
			}
			false
		}

		ClientEvent::GetClients { client_id } => {
			if let RoomActionOutcome::Nack(messages) = pipeline::get_clients(ctx, session, &client_id).await {
				send_frame(outbound_tx, ServerEvent::Nack(messages));
			}
			false
		}

		ClientEvent::Ping { client_id } => {
			if let RoomActionOutcome::Nack(messages) = pipeline::ping(ctx, session, &client_id) {
				send_frame(outbound_tx, ServerEvent::Nack(messages));
			}
			false
		}

		ClientEvent::Disconnect => true,
	}
}

fn send_frame(outbound_tx: &UnboundedSender<Message>, event: ServerEvent) {
	let frame = event.into_frame();
	match serde_json::to_string(&frame) {
		Ok(text) => {
			let _ = outbound_tx.send(Message::Text(text));
		}
		Err(err) => {
			tracing::error!(error = %err, "failed to serialize outbound frame");
		}
	}
}

/// Forwards one room's broadcast channel onto this socket's outbound queue
/// for as long as the socket lives; aborted from `run`'s cleanup, never
/// exits on its own except when the room channel itself closes.
fn spawn_room_forwarder(mut receiver: Receiver<RoomEvent>, outbound_tx: UnboundedSender<Message>) -> JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			match receiver.recv().await {
				Ok(RoomEvent(event)) => send_frame(&outbound_tx, (*event).clone()),
				Err(RecvError::Overflowed(_)) => {}
				Err(RecvError::Closed) => break,
			}
		}
	})
}
