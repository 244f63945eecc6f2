//! Driver error types
//!
//! One enum covers the whole driver so `?` composes across the transport,
//! session and texture layers. Framing corruption is deliberately NOT an
//! error: a corrupt inbound frame is absorbed at the framer boundary and
//! surfaces as a missing response (`Ok(None)`), which the caller may retry
//! at its own level. Everything here is fatal to the attempted call.

use glint_protocol::framer::FramerError;
use glint_protocol::operations::EncodeError;
use glint_protocol::responses::DecodeError;

/// Errors surfaced by the transports and the device session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpuError {
    /// Operation could not be framed (too large for the wire)
    Framer(FramerError),
    /// Operation refused to serialize
    Encode(EncodeError),
    /// Response payload did not decode (wrong tag, truncated fields)
    Decode(DecodeError),
    /// The underlying bus or socket failed
    Communication,
    /// TCP transport used before `reset()` established a connection
    NotConnected,
    /// SPI handshake line did not go ready within the 5 second deadline
    ///
    /// Treated as a hard link failure; the driver never retries this
    /// transparently.
    HandshakeTimeout,
    /// Device still reported uninitialized after an initialize request
    NotInitialized,
    /// Device speaks a different wire API revision than this driver
    ApiVersionMismatch { device: u16, supported: u16 },
}

impl From<FramerError> for GpuError {
    fn from(e: FramerError) -> Self {
        GpuError::Framer(e)
    }
}

impl From<EncodeError> for GpuError {
    fn from(e: EncodeError) -> Self {
        GpuError::Encode(e)
    }
}

impl From<DecodeError> for GpuError {
    fn from(e: DecodeError) -> Self {
        GpuError::Decode(e)
    }
}
