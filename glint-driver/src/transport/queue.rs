//! Shared outbound operation queue
//!
//! Every backend owns one of these so batching behaves identically on all
//! media. Operations are encoded at enqueue time into the batch packer;
//! a flush turns the packed set into at most one wire frame: a lone
//! operation ships bare, two or more ship wrapped in a Batch operation.

use glint_protocol::batch::{BatchPacker, BATCH_BUFFER_SIZE, BATCH_HEADER_SIZE};
use glint_protocol::color::ColorFormat;
use glint_protocol::framer::{PacketFramer, MAX_OPERATION_SIZE};
use glint_protocol::operations::Operation;

use crate::error::GpuError;

/// Outbound queue and batch assembly, shared by all backends
#[derive(Debug)]
pub struct OpQueue {
    packer: BatchPacker,
    scratch: [u8; BATCH_BUFFER_SIZE + BATCH_HEADER_SIZE],
}

impl Default for OpQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OpQueue {
    pub fn new() -> Self {
        Self {
            packer: BatchPacker::new(),
            scratch: [0; BATCH_BUFFER_SIZE + BATCH_HEADER_SIZE],
        }
    }

    /// Adopt the device's negotiated operation byte limit
    ///
    /// The packing budget is the negotiated limit less the batch header,
    /// but never more than a single wire frame can carry.
    pub fn set_op_byte_limit(&mut self, limit: u16) {
        let limit = usize::from(limit);
        let budget = limit
            .saturating_sub(BATCH_HEADER_SIZE)
            .min(MAX_OPERATION_SIZE - BATCH_HEADER_SIZE);
        self.packer.set_budget(budget);
    }

    /// Try to pack `op` for the next flush
    ///
    /// Returns false when the pending batch is full; the caller flushes
    /// and retries (and falls back to an immediate send for an operation
    /// that can never fit a batch).
    pub fn try_add<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<bool, GpuError> {
        Ok(self.packer.add(op)?)
    }

    pub fn is_empty(&self) -> bool {
        self.packer.is_empty()
    }

    /// Frame everything queued into `out`, emptying the queue
    ///
    /// Returns `Ok(None)` when nothing is queued, otherwise the frame
    /// length.
    pub fn take_frame(&mut self, out: &mut [u8]) -> Result<Option<usize>, GpuError> {
        if self.packer.is_empty() {
            return Ok(None);
        }

        let len = if self.packer.op_count() == 1 {
            // A lone operation ships bare, no batch wrapper
            let single = self.packer.single_op().unwrap_or(&[]);
            PacketFramer::encode_raw(single, out)?
        } else {
            let op_len = self.packer.encode_into(&mut self.scratch)?;
            PacketFramer::encode_raw(&self.scratch[..op_len], out)?
        };

        self.packer.clear();
        Ok(Some(len))
    }
}
