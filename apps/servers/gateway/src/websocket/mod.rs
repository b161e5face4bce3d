mod session;

use crate::AppState;
use axum::{
	extract::{ws::WebSocketUpgrade, ConnectInfo, State},
	response::IntoResponse,
	routing::get,
	Router,
};
use std::net::SocketAddr;

/// Mounts the single upgrade route, mirroring the teacher's `WebSocketFsm::router`.
pub fn router() -> Router<AppState> {
	Router::new().route("/ws", get(websocket_handler))
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>) -> impl IntoResponse {
	tracing::info!(%addr, "incoming websocket upgrade request");
	ws.on_upgrade(move |socket| session::run(socket, state, addr))
}
