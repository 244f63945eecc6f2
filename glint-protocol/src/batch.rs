//! Batch packing
//!
//! Many drawing operations are only a dozen bytes, and every frame has
//! fixed overhead (and on SPI, a handshake wait). The batch packer
//! concatenates several already-encoded operations into one Batch
//! operation so they share a single frame:
//!
//! ```text
//! ┌────────┬─────────┬───────────────────────────────┐
//! │ OP 7   │ LEN u16 │ [sub_len u16, sub_bytes] ...  │
//! └────────┴─────────┴───────────────────────────────┘
//! ```
//!
//! The device unpacks and executes sub-operations in order, so batching
//! never reorders work.

use crate::color::ColorFormat;
use crate::framer::MAX_OPERATION_SIZE;
use crate::operations::{EncodeError, Operation, OP_BATCH};

/// Fixed capacity of the packing buffer
pub const BATCH_BUFFER_SIZE: usize = 1020;

/// Opcode byte plus u16 payload length
pub const BATCH_HEADER_SIZE: usize = 3;

/// Length prefix in front of each packed sub-operation
const SUB_OP_PREFIX_SIZE: usize = 2;

/// Default packing budget: the largest batch that still fits a single
/// wire frame after the batch header is added
pub const DEFAULT_BATCH_BUDGET: usize = MAX_OPERATION_SIZE - BATCH_HEADER_SIZE;

/// Packs encoded operations for a single Batch frame
///
/// A packer is single-use per flush: encoding the batch resets it.
#[derive(Debug)]
pub struct BatchPacker {
    buffer: [u8; BATCH_BUFFER_SIZE],
    offset: usize,
    budget: usize,
    op_count: usize,
}

impl Default for BatchPacker {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchPacker {
    pub fn new() -> Self {
        Self {
            buffer: [0; BATCH_BUFFER_SIZE],
            offset: 0,
            budget: DEFAULT_BATCH_BUDGET,
            op_count: 0,
        }
    }

    /// Set how many packed bytes a batch may hold
    ///
    /// Clamped to the buffer capacity. Transports set this from the
    /// device's negotiated operation byte limit; it can never exceed what
    /// a single wire frame carries.
    pub fn set_budget(&mut self, budget: usize) {
        self.budget = budget.min(BATCH_BUFFER_SIZE);
    }

    /// Number of packed payload bytes currently held
    pub fn len(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// Number of operations currently packed
    pub fn op_count(&self) -> usize {
        self.op_count
    }

    /// Total bytes [`encode_into`](Self::encode_into) would emit right now
    pub fn encoded_len(&self) -> usize {
        self.offset + BATCH_HEADER_SIZE
    }

    /// Try to pack `op`
    ///
    /// Returns `Ok(false)` without touching the buffer when the operation
    /// plus its length prefix would exceed the budget; the caller should
    /// flush and retry.
    pub fn add<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<bool, EncodeError> {
        let size = op.encoded_len();
        if self.offset + size + SUB_OP_PREFIX_SIZE > self.budget {
            return Ok(false);
        }

        let start = self.offset + SUB_OP_PREFIX_SIZE;
        let written = op.encode(&mut self.buffer[start..start + size])?;
        self.buffer[self.offset..start].copy_from_slice(&(written as u16).to_be_bytes());
        self.offset += written + SUB_OP_PREFIX_SIZE;
        self.op_count += 1;

        Ok(true)
    }

    /// When exactly one operation is packed, its bare encoded bytes
    ///
    /// Lets a transport skip the batch wrapper for a lone operation.
    pub fn single_op(&self) -> Option<&[u8]> {
        if self.op_count == 1 {
            Some(&self.buffer[SUB_OP_PREFIX_SIZE..self.offset])
        } else {
            None
        }
    }

    /// Emit the complete Batch operation payload and reset the packer
    pub fn encode_into(&mut self, out: &mut [u8]) -> Result<usize, EncodeError> {
        let total = self.encoded_len();
        if out.len() < total {
            return Err(EncodeError::BufferTooSmall);
        }

        out[0] = OP_BATCH;
        out[1..3].copy_from_slice(&(self.offset as u16).to_be_bytes());
        out[BATCH_HEADER_SIZE..total].copy_from_slice(&self.buffer[..self.offset]);

        self.clear();
        Ok(total)
    }

    /// Drop everything packed so far
    pub fn clear(&mut self) {
        self.offset = 0;
        self.op_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb565;

    fn rectangle(x: u16) -> Operation<'static> {
        Operation::DrawRectangle {
            texture_id: 0,
            x,
            y: 0,
            width: 4,
            height: 4,
            color: Rgb565::from_rgb565(31, 0, 0),
        }
    }

    #[test]
    fn test_add_packs_length_prefixed() {
        let mut packer = BatchPacker::new();
        assert!(packer.add(&rectangle(7)).unwrap());
        assert_eq!(packer.op_count(), 1);

        // 12-byte rectangle behind a 2-byte prefix
        assert_eq!(packer.len(), 14);
        let single = packer.single_op().unwrap();
        assert_eq!(single.len(), 12);
        assert_eq!(single[0], 2);
    }

    #[test]
    fn test_add_refuses_when_budget_exhausted() {
        let mut packer = BatchPacker::new();
        packer.set_budget(30);

        assert!(packer.add(&rectangle(1)).unwrap()); // 14 bytes
        assert!(packer.add(&rectangle(2)).unwrap()); // 28 bytes
        let len_before = packer.len();

        assert!(!packer.add(&rectangle(3)).unwrap());
        assert_eq!(packer.len(), len_before);
        assert_eq!(packer.op_count(), 2);
    }

    #[test]
    fn test_encode_into_emits_header_and_resets() {
        let mut packer = BatchPacker::new();
        packer.add(&rectangle(1)).unwrap();
        packer.add(&rectangle(2)).unwrap();

        let mut out = [0u8; 64];
        let len = packer.encode_into(&mut out).unwrap();
        assert_eq!(len, 3 + 28);
        assert_eq!(out[0], OP_BATCH);
        assert_eq!(u16::from_be_bytes([out[1], out[2]]), 28);
        // First sub-op: length prefix then opcode
        assert_eq!(u16::from_be_bytes([out[3], out[4]]), 12);
        assert_eq!(out[5], 2);

        // Packer is single-use per flush
        assert!(packer.is_empty());
        assert_eq!(packer.op_count(), 0);
        let len = packer.encode_into(&mut out).unwrap();
        assert_eq!(len, BATCH_HEADER_SIZE);
    }

    #[test]
    fn test_single_op_only_for_exactly_one() {
        let mut packer = BatchPacker::new();
        assert!(packer.single_op().is_none());
        packer.add(&rectangle(1)).unwrap();
        assert!(packer.single_op().is_some());
        packer.add(&rectangle(2)).unwrap();
        assert!(packer.single_op().is_none());
    }

    #[test]
    fn test_default_budget_fits_one_frame() {
        let mut packer = BatchPacker::new();
        let mut added = 0;
        while packer.add(&rectangle(added)).unwrap() {
            added += 1;
        }
        assert!(packer.encoded_len() <= MAX_OPERATION_SIZE);
        assert!(added > 10);
    }
}
