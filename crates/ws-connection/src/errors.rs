use crate::types::ClientId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
	#[error("client {0} is not a registered room member on this socket")]
	NotRoomMember(ClientId),

	#[error("client {0} already has an orderer connection attached")]
	AlreadyAttached(ClientId),
}
