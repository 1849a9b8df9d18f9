//! Wire protocol for the freeroam relay.
//!
//! This crate contains:
//! - Byte and bit level reading/writing utilities
//! - The vehicle-state payload codec
//! - Datagram parsing and outbound packet builders

mod binary;
pub mod bitstream;
pub mod carstate;
mod error;
pub mod packets;

pub use binary::{BinaryReader, BinaryWriter};
pub use bitstream::{BitCursor, BitWriter, EscapeBit, QuantizedFloat};
pub use carstate::{DecodeOptions, Orientation, OrientationEncoding, Profile, VehicleState};
pub use error::ProtocolError;

/// 2D world position used for proximity (X/Y plane).
pub type Position = glam::DVec2;
