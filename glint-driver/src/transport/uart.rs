//! UART transport backend
//!
//! A plain byte pipe: outbound frames are written as-is (the frame's zero
//! terminator delimits them on the wire), inbound bytes accumulate until a
//! terminator closes a frame. There is no reset line on this medium, so
//! [`reset`](GpuTransport::reset) is a no-op.

use glint_hal::time::{Clock, Delay};
use glint_hal::uart::{UartRx, UartTx};
use glint_protocol::color::ColorFormat;
use glint_protocol::framer::{PacketFramer, MAX_FRAME_SIZE};
use glint_protocol::operations::Operation;
use glint_protocol::responses::Response;

use super::{GpuTransport, OpQueue, LINK_TIMEOUT_MS};
use crate::error::GpuError;

/// Inbound accumulator size; two max-size frames of headroom
const RX_ACCUMULATOR_SIZE: usize = 512;

/// Receive poll granularity
const RX_POLL_MS: u32 = 1;

/// UART backend for [`GpuTransport`]
pub struct UartGpuTransport<TX, RX, T>
where
    TX: UartTx,
    RX: UartRx,
    T: Clock + Delay,
{
    tx: TX,
    rx: RX,
    timer: T,
    framer: PacketFramer,
    queue: OpQueue,
    tx_buffer: [u8; MAX_FRAME_SIZE],
    accumulator: heapless::Vec<u8, RX_ACCUMULATOR_SIZE>,
}

impl<TX, RX, T> UartGpuTransport<TX, RX, T>
where
    TX: UartTx,
    RX: UartRx,
    T: Clock + Delay,
{
    pub fn new(tx: TX, rx: RX, timer: T) -> Self {
        Self {
            tx,
            rx,
            timer,
            framer: PacketFramer::new(),
            queue: OpQueue::new(),
            tx_buffer: [0; MAX_FRAME_SIZE],
            accumulator: heapless::Vec::new(),
        }
    }

    fn write_frame(&mut self, len: usize) -> Result<(), GpuError> {
        self.tx
            .write_all(&self.tx_buffer[..len])
            .map_err(|_| GpuError::Communication)?;
        self.tx.flush().map_err(|_| GpuError::Communication)
    }

    /// Pull whatever the UART has into the accumulator
    fn drain_rx(&mut self) -> Result<(), GpuError> {
        let mut chunk = [0u8; 64];
        loop {
            let count = self
                .rx
                .read(&mut chunk)
                .map_err(|_| GpuError::Communication)?;
            if count == 0 {
                return Ok(());
            }

            for &byte in &chunk[..count] {
                if self.accumulator.push(byte).is_err() {
                    // Full with no terminator in sight: the terminator was
                    // lost, drop everything and resynchronize
                    self.accumulator.clear();
                    let _ = self.accumulator.push(byte);
                }
            }
        }
    }

    /// Decode one frame out of the accumulator if a boundary is there
    ///
    /// `Ok(Some(None))` means a frame was consumed but was corrupt.
    #[allow(clippy::type_complexity)]
    fn try_decode<R: Response>(&mut self) -> Result<Option<Option<R>>, GpuError> {
        let result = self.framer.decode(&self.accumulator);
        let consumed = result.bytes_consumed;
        if consumed == 0 {
            return Ok(None);
        }

        let decoded = match result.payload {
            Some(payload) => Some(R::decode(payload)?),
            None => None,
        };

        let remaining = self.accumulator.len() - consumed;
        self.accumulator.copy_within(consumed.., 0);
        self.accumulator.truncate(remaining);

        Ok(Some(decoded))
    }
}

impl<TX, RX, T> GpuTransport for UartGpuTransport<TX, RX, T>
where
    TX: UartTx,
    RX: UartRx,
    T: Clock + Delay,
{
    /// No reset line exists over this medium
    fn reset(&mut self) -> Result<(), GpuError> {
        Ok(())
    }

    fn enqueue<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<(), GpuError> {
        if self.queue.try_add(op)? {
            return Ok(());
        }
        self.flush_queued()?;
        if self.queue.try_add(op)? {
            return Ok(());
        }
        self.send_immediate(op)
    }

    fn flush_queued(&mut self) -> Result<(), GpuError> {
        while let Some(len) = self.queue.take_frame(&mut self.tx_buffer)? {
            self.write_frame(len)?;
        }
        Ok(())
    }

    fn send_immediate<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<(), GpuError> {
        self.flush_queued()?;

        let len = PacketFramer::encode(op, &mut self.tx_buffer)?;
        self.write_frame(len)
    }

    fn receive_response<R: Response>(&mut self) -> Result<Option<R>, GpuError> {
        let deadline = self.timer.now_ms() + LINK_TIMEOUT_MS;

        loop {
            self.drain_rx()?;

            // Corrupt frames are consumed and skipped; keep looking for a
            // good one until the window closes
            while let Some(outcome) = self.try_decode::<R>()? {
                if let Some(response) = outcome {
                    return Ok(Some(response));
                }
            }

            if self.timer.now_ms() > deadline {
                return Ok(None);
            }
            self.timer.delay_ms(RX_POLL_MS);
        }
    }

    fn set_op_byte_limit(&mut self, limit: u16) {
        self.queue.set_op_byte_limit(limit);
    }
}
