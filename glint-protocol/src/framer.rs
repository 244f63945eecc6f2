//! Packet framing and unframing
//!
//! Wraps an encoded operation in the COBS-with-checksum frame described in
//! the crate docs, and recovers payloads from raw inbound bytes. Framing is
//! shared by every transport so corruption handling is uniform regardless
//! of the physical medium.
//!
//! Decoding never fails loudly: a corrupted frame is consumed and reported
//! with an empty payload so the caller can skip past it and resynchronize
//! on the next zero terminator.

use crate::color::ColorFormat;
use crate::operations::{EncodeError, Operation};

/// Maximum size of a serialized operation before framing overhead
pub const MAX_OPERATION_SIZE: usize = 250;

/// Leading offset byte + 2 checksum bytes + zero terminator
pub const FRAME_OVERHEAD: usize = 4;

/// Largest possible complete frame
pub const MAX_FRAME_SIZE: usize = MAX_OPERATION_SIZE + FRAME_OVERHEAD;

/// Capacity of the unstuffing buffer; frames at least this long have lost
/// their terminator to corruption
const DECODE_CAPACITY: usize = 255;

/// Errors that can occur while encoding a frame
///
/// There is no decode counterpart: decode failures are data, not errors
/// (see [`PacketDecodeResult`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramerError {
    /// Operation serializes to more than [`MAX_OPERATION_SIZE`] bytes
    OperationTooLarge,
    /// Output buffer cannot hold the operation plus framing overhead
    BufferTooSmall,
    /// The operation itself refused to serialize
    Encode(EncodeError),
}

impl From<EncodeError> for FramerError {
    fn from(e: EncodeError) -> Self {
        FramerError::Encode(e)
    }
}

/// The outcome of one decode attempt
///
/// `bytes_consumed == 0` means no complete frame was found and the caller
/// should read more input. A consumed frame with `payload == None` was
/// corrupt (bad checksum, bad stuffing offsets, or too short/long to be
/// valid); the caller skips the consumed bytes and tries again.
#[derive(Debug, PartialEq, Eq)]
pub struct PacketDecodeResult<'a> {
    /// The recovered payload, or None if the frame was corrupt/incomplete
    pub payload: Option<&'a [u8]>,
    /// How many input bytes made up the attempted frame
    pub bytes_consumed: usize,
}

impl<'a> PacketDecodeResult<'a> {
    /// True when more input is needed before anything can be decoded
    pub fn is_incomplete(&self) -> bool {
        self.bytes_consumed == 0
    }

    fn incomplete() -> Self {
        Self {
            payload: None,
            bytes_consumed: 0,
        }
    }

    fn corrupt(bytes_consumed: usize) -> Self {
        Self {
            payload: None,
            bytes_consumed,
        }
    }
}

/// Frames operations for the wire and recovers payloads from raw bytes
///
/// Owns the unstuffing buffer, so decoded payloads borrow from the framer
/// and live until the next [`decode`](Self::decode) call.
#[derive(Debug)]
pub struct PacketFramer {
    decode_buffer: [u8; DECODE_CAPACITY],
}

impl Default for PacketFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketFramer {
    pub fn new() -> Self {
        Self {
            decode_buffer: [0; DECODE_CAPACITY],
        }
    }

    /// Number of output bytes [`encode`](Self::encode) needs for `op`
    pub fn buffer_size_required<C: ColorFormat>(op: &Operation<'_, C>) -> usize {
        op.encoded_len() + FRAME_OVERHEAD
    }

    /// Serialize `op` and frame it into `out`
    ///
    /// Returns the total number of bytes written.
    pub fn encode<C: ColorFormat>(
        op: &Operation<'_, C>,
        out: &mut [u8],
    ) -> Result<usize, FramerError> {
        let size = op.encoded_len();
        if size > MAX_OPERATION_SIZE {
            return Err(FramerError::OperationTooLarge);
        }
        if out.len() < size + FRAME_OVERHEAD {
            return Err(FramerError::BufferTooSmall);
        }

        let written = op.encode(&mut out[1..size + 1])?;
        Ok(finish_frame(out, written))
    }

    /// Frame an already-serialized payload into `out`
    ///
    /// Used when the payload was produced elsewhere, e.g. by the batch
    /// packer. Returns the total number of bytes written.
    pub fn encode_raw(payload: &[u8], out: &mut [u8]) -> Result<usize, FramerError> {
        if payload.len() > MAX_OPERATION_SIZE {
            return Err(FramerError::OperationTooLarge);
        }
        if out.len() < payload.len() + FRAME_OVERHEAD {
            return Err(FramerError::BufferTooSmall);
        }

        out[1..payload.len() + 1].copy_from_slice(payload);
        Ok(finish_frame(out, payload.len()))
    }

    /// Attempt to decode one frame from the front of `input`
    pub fn decode(&mut self, input: &[u8]) -> PacketDecodeResult<'_> {
        let zero_index = match input.iter().position(|&b| b == 0) {
            Some(index) => index,
            // No terminator yet; not a complete frame
            None => return PacketDecodeResult::incomplete(),
        };

        if zero_index <= 3 {
            // Complete frame but too short to hold offset + checksum
            return PacketDecodeResult::corrupt(zero_index + 1);
        }

        if zero_index >= DECODE_CAPACITY {
            // Too many bytes before the terminator; a terminator was
            // probably lost to corruption
            return PacketDecodeResult::corrupt(zero_index + 1);
        }

        let frame_len = zero_index + 1;
        self.decode_buffer[..frame_len].copy_from_slice(&input[..frame_len]);

        // Walk the stuffing offsets, restoring zeros as we go. Every jump
        // must land inside the frame and the chain must end exactly on the
        // terminator.
        let mut index = 0;
        loop {
            let next_zero = index + self.decode_buffer[index] as usize;
            if next_zero >= frame_len {
                return PacketDecodeResult::corrupt(frame_len);
            }

            self.decode_buffer[index] = 0;
            if next_zero == frame_len - 1 {
                break;
            }

            index = next_zero;
        }

        let expected = u16::from_be_bytes([
            self.decode_buffer[frame_len - 3],
            self.decode_buffer[frame_len - 2],
        ]);
        let calculated = additive_checksum(&self.decode_buffer[1..frame_len - 3]);
        if expected != calculated {
            return PacketDecodeResult::corrupt(frame_len);
        }

        PacketDecodeResult {
            payload: Some(&self.decode_buffer[1..frame_len - 3]),
            bytes_consumed: frame_len,
        }
    }
}

/// Append checksum and terminator after the payload at `out[1..]`, then
/// apply the byte-stuffing pass in place. Returns the frame length.
fn finish_frame(out: &mut [u8], payload_len: usize) -> usize {
    let checksum = additive_checksum(&out[1..payload_len + 1]);
    out[payload_len + 1] = (checksum >> 8) as u8;
    out[payload_len + 2] = (checksum & 0xFF) as u8;
    out[payload_len + 3] = 0;

    // Replace each zero with the distance to the next one; the terminator
    // stays as the only zero on the wire
    let mut last_zero = 0;
    for index in 1..payload_len + FRAME_OVERHEAD {
        if out[index] == 0 {
            out[last_zero] = (index - last_zero) as u8;
            last_zero = index;
        }
    }

    payload_len + FRAME_OVERHEAD
}

/// 16-bit additive checksum: wrapping sum of all bytes, no carry spreading
///
/// Deliberately cheap; this is an integrity check against line noise, not
/// a CRC.
fn additive_checksum(bytes: &[u8]) -> u16 {
    let mut checksum: u16 = 0;
    for &byte in bytes {
        checksum = checksum.wrapping_add(u16::from(byte));
    }
    checksum
}
