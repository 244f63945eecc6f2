//! Transport backends
//!
//! Three interchangeable ways to move frames to the GPU: SPI with a
//! handshake pin, UART, and (for development against the simulator) TCP.
//! All three share the framer and the outbound batching queue; only the
//! physical I/O differs.

use glint_protocol::color::ColorFormat;
use glint_protocol::operations::Operation;
use glint_protocol::responses::Response;

use crate::error::GpuError;

mod queue;
pub mod spi;
pub mod uart;

#[cfg(feature = "std")]
pub mod tcp;

pub use queue::OpQueue;
pub use spi::SpiGpuTransport;
pub use uart::UartGpuTransport;

#[cfg(feature = "std")]
pub use tcp::TcpGpuTransport;

/// How long any cooperative wait on the device may last before the link is
/// declared dead
pub const LINK_TIMEOUT_MS: u64 = 5_000;

/// A physical link to the GPU
///
/// One transport carries one logical session. Fire-and-forget operations
/// may be queued and batched; responsive operations must go through
/// [`send_immediate`](Self::send_immediate) so the next inbound frame is
/// unambiguously their reply.
pub trait GpuTransport {
    /// Reset the device as far as this medium allows
    ///
    /// SPI pulses the reset line, TCP (re)connects, UART has nothing to
    /// drive and is a no-op.
    fn reset(&mut self) -> Result<(), GpuError>;

    /// Queue a fire-and-forget operation for the next flush
    ///
    /// Queued operations are delivered in enqueue order, packed into Batch
    /// frames where they fit. An operation too large for any batch is sent
    /// in its own frame, still in order.
    fn enqueue<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<(), GpuError>;

    /// Send everything queued
    fn flush_queued(&mut self) -> Result<(), GpuError>;

    /// Send one operation now, bypassing the queue
    fn send_immediate<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<(), GpuError>;

    /// Read the next response if the device has one
    ///
    /// Returns `Ok(None)` when no (valid) response arrived within the
    /// transport's polling window; corrupted frames are absorbed and count
    /// as no response. A frame that decodes but carries the wrong type tag
    /// is a protocol error.
    fn receive_response<R: Response>(&mut self) -> Result<Option<R>, GpuError>;

    /// Adopt the device's negotiated operation byte limit
    ///
    /// Called by the session once after status exchange; resizes the
    /// batching budget, never per-send.
    fn set_op_byte_limit(&mut self, limit: u16);
}
