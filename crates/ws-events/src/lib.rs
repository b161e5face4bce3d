pub mod claims;
pub mod frame;
pub mod version;
pub mod wire;

pub use claims::{can_summarize, can_write, Claims, Scope};
pub use frame::{FrameError, InboundFrame, OutboundFrame};
pub use wire::{
	ClientDescriptor, ClientDetails, ClientEvent, ConnectDocumentError, ConnectMode, IConnect, IConnected, ISignalClient, NackMessage, NackType, Op, OpOrBatch,
	RoomJoin, RoomLeave, SanitizedOp, ServerEvent, ServiceConfiguration, SignalMessage, SummaryConfiguration,
};
