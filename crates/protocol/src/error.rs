//! Protocol error types.

use thiserror::Error;

/// Errors that can occur during datagram parsing and building.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Datagram too short: {0} bytes")]
    ShortDatagram(usize),

    #[error("Subpacket {kind:#04x} truncated: wanted {wanted} bytes, {available} available")]
    TruncatedSubpacket {
        kind: u8,
        wanted: usize,
        available: usize,
    },

    #[error("Subpacket payload too long: {0} bytes")]
    PayloadTooLong(usize),

    #[error("Vehicle state too short: {0} bytes")]
    ShortVehicleState(usize),
}
