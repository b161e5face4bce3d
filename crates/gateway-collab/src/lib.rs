pub mod collaborators;
pub mod context;
pub mod memory;
pub mod pipeline;
pub mod rooms;
pub mod sanitize;
pub mod throttle;

pub use context::GatewayContext;
pub use pipeline::{ConnectSuccess, GatewaySessionState, OrdererHandle, RoomActionOutcome, SubmitOpOutcome};
pub use rooms::RoomRegistry;
