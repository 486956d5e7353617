//! Unified error type for Gatehouse.

use gatehouse_protocol::ProtocolError;
use gatehouse_session::SessionError;
use gatehouse_store::StoreError;
use gatehouse_transport::TransportError;

use crate::BrokerError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GatehouseError {
    /// A transport-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A control frame was refused.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The cache or durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The broker refused a forwarded frame.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}
