//! Responses the GPU sends back to the host
//!
//! A response payload starts with a one-byte type tag that the decoder
//! validates before reading any fields; a tag mismatch is a decode error,
//! never a crash. Only two operations elicit responses, so the set is
//! small.

use crate::color::ColorMode;
use crate::framer::MAX_OPERATION_SIZE;

// Response type tags, byte 0 of every response payload
pub const RESPONSE_STATUS: u8 = 1;
pub const RESPONSE_LAST_MESSAGE: u8 = 2;

/// Errors that can occur while decoding a response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Payload was not the response type the caller asked for
    UnexpectedTag { expected: u8, actual: u8 },
    /// Payload ended before the fixed fields did
    Truncated,
}

/// A message the GPU can answer with
///
/// Implementations populate themselves from a decoded frame payload.
pub trait Response: Sized {
    /// The type tag this response validates against
    const TYPE_TAG: u8;

    /// Decode from a frame payload (tag byte included)
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError>;
}

fn check_tag<R: Response>(bytes: &[u8]) -> Result<(), DecodeError> {
    let actual = *bytes.first().ok_or(DecodeError::Truncated)?;
    if actual != R::TYPE_TAG {
        return Err(DecodeError::UnexpectedTag {
            expected: R::TYPE_TAG,
            actual,
        });
    }
    Ok(())
}

/// Device capability and state snapshot
///
/// The payload has grown over firmware revisions: the oldest is 11 bytes
/// (through `color_mode`), later firmware appends the operation byte limit
/// and then the API version. Absent fields decode to 0 / None.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusResponse {
    pub is_initialized: bool,
    pub display_width: u16,
    pub display_height: u16,
    pub frame_buffer_width: u16,
    pub frame_buffer_height: u16,
    pub color_mode: ColorMode,
    /// Largest operation payload the device accepts; 0 when unreported
    pub max_op_bytes: u16,
    /// Wire API revision; None on legacy firmware that predates versioning
    pub api_version_id: Option<u16>,
}

impl Response for StatusResponse {
    const TYPE_TAG: u8 = RESPONSE_STATUS;

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        check_tag::<Self>(bytes)?;
        if bytes.len() < 11 {
            return Err(DecodeError::Truncated);
        }

        let read_u16 = |index: usize| u16::from_be_bytes([bytes[index], bytes[index + 1]]);

        let max_op_bytes = if bytes.len() >= 13 { read_u16(11) } else { 0 };
        let api_version_id = if bytes.len() >= 15 {
            Some(read_u16(13))
        } else {
            None
        };

        Ok(Self {
            is_initialized: bytes[1] != 0,
            display_width: read_u16(2),
            display_height: read_u16(4),
            frame_buffer_width: read_u16(6),
            frame_buffer_height: read_u16(8),
            color_mode: ColorMode::from_byte(bytes[10]),
            max_op_bytes,
            api_version_id,
        })
    }
}

/// The device's most recent diagnostic message
///
/// Usually describes why the last operation was ignored. ASCII; anything
/// else arrives as `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LastMessageResponse {
    pub message: heapless::String<MAX_OPERATION_SIZE>,
}

impl Response for LastMessageResponse {
    const TYPE_TAG: u8 = RESPONSE_LAST_MESSAGE;

    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        check_tag::<Self>(bytes)?;

        let mut message = heapless::String::new();
        for &byte in &bytes[1..] {
            let ch = if byte.is_ascii() { byte as char } else { '?' };
            if message.push(ch).is_err() {
                break;
            }
        }

        Ok(Self { message })
    }
}
