pub mod errors;
pub mod session;
pub mod types;

pub use errors::SessionError;
pub use session::SessionState;
pub use types::{ClientId, RoomId};
