//! SPI transport backend
//!
//! The GPU is an SPI peripheral with three side-band signals: an
//! active-low reset line, a chip-select the driver asserts for the length
//! of each transfer, and a handshake input the device raises when it can
//! accept (or has) data. Every transfer waits for handshake first, bounded
//! by the 5 second link deadline.
//!
//! Response reads are two-phase: a 2-byte big-endian length prefix is read
//! while chip-select stays low (releasing it would end the transaction),
//! then exactly that many frame bytes. A prefix of all-ones means no data:
//! with nothing driving the line, a read returns 0xFF bytes.

use glint_hal::gpio::{InputPin, OutputPin};
use glint_hal::spi::SpiBus;
use glint_hal::time::{Clock, Delay};
use glint_protocol::color::ColorFormat;
use glint_protocol::framer::{PacketFramer, MAX_FRAME_SIZE};
use glint_protocol::operations::Operation;
use glint_protocol::responses::Response;

use super::{GpuTransport, OpQueue, LINK_TIMEOUT_MS};
use crate::error::GpuError;

/// How long the reset line is held low
const RESET_HOLD_MS: u32 = 1_000;

/// Handshake poll granularity; each poll is a cooperative yield
const HANDSHAKE_POLL_MS: u32 = 1;

/// Length prefix read from an undriven line
const NO_DATA_LENGTH: u16 = 0xFFFF;

/// Inbound frame buffer size
const RX_BUFFER_SIZE: usize = 1024;

/// SPI backend for [`GpuTransport`]
pub struct SpiGpuTransport<S, HS, RST, CS, T>
where
    S: SpiBus,
    HS: InputPin,
    RST: OutputPin,
    CS: OutputPin,
    T: Clock + Delay,
{
    spi: S,
    handshake: HS,
    reset_pin: RST,
    chip_select: CS,
    timer: T,
    framer: PacketFramer,
    queue: OpQueue,
    tx_buffer: [u8; MAX_FRAME_SIZE],
    rx_buffer: [u8; RX_BUFFER_SIZE],
}

impl<S, HS, RST, CS, T> SpiGpuTransport<S, HS, RST, CS, T>
where
    S: SpiBus,
    HS: InputPin,
    RST: OutputPin,
    CS: OutputPin,
    T: Clock + Delay,
{
    /// Take ownership of the bus and pins
    ///
    /// Leaves reset and chip-select in their inactive (high) states; the
    /// device is not touched until [`reset`](GpuTransport::reset).
    pub fn new(spi: S, handshake: HS, mut reset_pin: RST, mut chip_select: CS, timer: T) -> Self {
        reset_pin.set_high();
        chip_select.set_high();

        Self {
            spi,
            handshake,
            reset_pin,
            chip_select,
            timer,
            framer: PacketFramer::new(),
            queue: OpQueue::new(),
            tx_buffer: [0; MAX_FRAME_SIZE],
            rx_buffer: [0; RX_BUFFER_SIZE],
        }
    }

    /// Poll the handshake line until the device is ready
    fn wait_for_handshake(&mut self) -> Result<(), GpuError> {
        let deadline = self.timer.now_ms() + LINK_TIMEOUT_MS;
        while self.handshake.is_low() {
            if self.timer.now_ms() > deadline {
                return Err(GpuError::HandshakeTimeout);
            }
            self.timer.delay_ms(HANDSHAKE_POLL_MS);
        }
        Ok(())
    }

    /// Write `len` bytes of `tx_buffer` under chip-select
    fn write_frame(&mut self, len: usize) -> Result<(), GpuError> {
        self.chip_select.set_low();
        let result = self.spi.write(&self.tx_buffer[..len]);
        self.chip_select.set_high();
        result.map_err(|_| GpuError::Communication)
    }

    /// Read one length-prefixed frame into `rx_buffer`
    ///
    /// Caller holds chip-select low around this. Returns the frame length,
    /// or None when the device had nothing (or an impossible length, which
    /// is absorbed as corruption).
    fn read_frame(&mut self) -> Result<Option<usize>, GpuError> {
        let mut prefix = [0u8; 2];
        self.spi
            .read(&mut prefix)
            .map_err(|_| GpuError::Communication)?;

        let length = u16::from_be_bytes(prefix);
        if length == NO_DATA_LENGTH {
            return Ok(None);
        }

        let length = usize::from(length);
        if length > self.rx_buffer.len() {
            return Ok(None);
        }

        self.spi
            .read(&mut self.rx_buffer[..length])
            .map_err(|_| GpuError::Communication)?;
        Ok(Some(length))
    }
}

impl<S, HS, RST, CS, T> GpuTransport for SpiGpuTransport<S, HS, RST, CS, T>
where
    S: SpiBus,
    HS: InputPin,
    RST: OutputPin,
    CS: OutputPin,
    T: Clock + Delay,
{
    fn reset(&mut self) -> Result<(), GpuError> {
        // Ensure chip select starts high/inactive
        self.chip_select.set_high();

        self.reset_pin.set_low();
        self.timer.delay_ms(RESET_HOLD_MS);
        self.reset_pin.set_high();

        // Wait for the device to signal it's ready
        self.wait_for_handshake()
    }

    fn enqueue<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<(), GpuError> {
        if self.queue.try_add(op)? {
            return Ok(());
        }
        self.flush_queued()?;
        if self.queue.try_add(op)? {
            return Ok(());
        }
        // Larger than any batch; ship it in its own frame, still in order
        self.send_immediate(op)
    }

    fn flush_queued(&mut self) -> Result<(), GpuError> {
        while let Some(len) = self.queue.take_frame(&mut self.tx_buffer)? {
            self.wait_for_handshake()?;
            self.write_frame(len)?;
        }
        Ok(())
    }

    fn send_immediate<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<(), GpuError> {
        // Anything already queued was requested earlier and goes first
        self.flush_queued()?;

        let len = PacketFramer::encode(op, &mut self.tx_buffer)?;
        self.wait_for_handshake()?;
        self.write_frame(len)
    }

    fn receive_response<R: Response>(&mut self) -> Result<Option<R>, GpuError> {
        self.wait_for_handshake()?;

        self.chip_select.set_low();
        let read = self.read_frame();
        self.chip_select.set_high();

        let frame_len = match read? {
            Some(len) => len,
            None => return Ok(None),
        };

        let decoded = self.framer.decode(&self.rx_buffer[..frame_len]);
        match decoded.payload {
            Some(payload) => Ok(Some(R::decode(payload)?)),
            None => Ok(None),
        }
    }

    fn set_op_byte_limit(&mut self, limit: u16) {
        self.queue.set_op_byte_limit(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use glint_protocol::responses::StatusResponse;
    use std::rc::Rc;
    use std::vec::Vec;

    /// Shared handle so tests can inspect mock state after the transport
    /// takes ownership
    struct Shared<I>(Rc<RefCell<I>>);

    impl<I> Shared<I> {
        fn new(inner: I) -> Self {
            Self(Rc::new(RefCell::new(inner)))
        }

        fn clone(&self) -> Self {
            Self(Rc::clone(&self.0))
        }
    }

    #[derive(Default)]
    struct ScriptedSpi {
        writes: Vec<Vec<u8>>,
        reads: Vec<Vec<u8>>,
        read_index: usize,
    }

    impl SpiBus for Shared<ScriptedSpi> {
        type Error = ();

        fn write(&mut self, data: &[u8]) -> Result<(), ()> {
            self.0.borrow_mut().writes.push(data.to_vec());
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<(), ()> {
            let mut inner = self.0.borrow_mut();
            let index = inner.read_index;
            let chunk = inner.reads.get(index).ok_or(())?.clone();
            buf.copy_from_slice(&chunk[..buf.len()]);
            inner.read_index += 1;
            Ok(())
        }

        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), ()> {
            self.write(write)?;
            self.read(read)
        }
    }

    struct Level(bool);

    impl InputPin for Shared<Level> {
        fn is_high(&self) -> bool {
            self.0.borrow().0
        }
    }

    #[derive(Default)]
    struct RecordedPin {
        high: bool,
        transitions: Vec<bool>,
    }

    impl OutputPin for Shared<RecordedPin> {
        fn set_high(&mut self) {
            let mut inner = self.0.borrow_mut();
            inner.high = true;
            inner.transitions.push(true);
        }

        fn set_low(&mut self) {
            let mut inner = self.0.borrow_mut();
            inner.high = false;
            inner.transitions.push(false);
        }

        fn is_set_high(&self) -> bool {
            self.0.borrow().high
        }
    }

    /// Clock that only advances when something delays on it
    struct FakeTimer(u64);

    impl Clock for Shared<FakeTimer> {
        fn now_ms(&self) -> u64 {
            self.0.borrow().0
        }
    }

    impl Delay for Shared<FakeTimer> {
        fn delay_ms(&mut self, ms: u32) {
            self.0.borrow_mut().0 += u64::from(ms);
        }
    }

    type TestTransport = SpiGpuTransport<
        Shared<ScriptedSpi>,
        Shared<Level>,
        Shared<RecordedPin>,
        Shared<RecordedPin>,
        Shared<FakeTimer>,
    >;

    struct Rig {
        spi: Shared<ScriptedSpi>,
        handshake: Shared<Level>,
        reset: Shared<RecordedPin>,
        chip_select: Shared<RecordedPin>,
        transport: TestTransport,
    }

    fn rig(handshake_high: bool) -> Rig {
        let spi = Shared::new(ScriptedSpi::default());
        let handshake = Shared::new(Level(handshake_high));
        let reset = Shared::new(RecordedPin::default());
        let chip_select = Shared::new(RecordedPin::default());
        let timer = Shared::new(FakeTimer(0));

        let transport = SpiGpuTransport::new(
            spi.clone(),
            handshake.clone(),
            reset.clone(),
            chip_select.clone(),
            timer,
        );

        Rig {
            spi,
            handshake,
            reset,
            chip_select,
            transport,
        }
    }

    #[test]
    fn test_reset_pulses_line_and_waits_for_handshake() {
        let mut rig = rig(true);
        rig.transport.reset().unwrap();

        // new() leaves it high, reset() drives low then high
        let reset = rig.reset.0.borrow();
        assert_eq!(reset.transitions.as_slice(), &[true, false, true]);
    }

    #[test]
    fn test_handshake_timeout_is_fatal() {
        let mut rig = rig(false);
        let present: Operation = Operation::PresentFramebuffer;
        assert_eq!(
            rig.transport.send_immediate(&present),
            Err(GpuError::HandshakeTimeout)
        );
    }

    #[test]
    fn test_send_immediate_writes_one_frame_under_chip_select() {
        let mut rig = rig(true);
        let status: Operation = Operation::GetStatus;
        rig.transport.send_immediate(&status).unwrap();

        let spi = rig.spi.0.borrow();
        assert_eq!(spi.writes.len(), 1);
        assert_eq!(spi.writes[0], [2, 4, 2, 4, 0]);

        // Chip select dropped low for the write, then released
        let chip_select = rig.chip_select.0.borrow();
        assert_eq!(chip_select.transitions.as_slice(), &[true, false, true]);
    }

    #[test]
    fn test_flush_batches_queued_operations() {
        let mut rig = rig(true);
        let rect: Operation = Operation::DrawRectangle {
            texture_id: 0,
            x: 1,
            y: 2,
            width: 3,
            height: 4,
            color: glint_protocol::color::Rgb565::from_rgb565(1, 2, 3),
        };
        let present: Operation = Operation::PresentFramebuffer;
        rig.transport.enqueue(&rect).unwrap();
        rig.transport.enqueue(&present).unwrap();
        rig.transport.flush_queued().unwrap();

        let spi = rig.spi.0.borrow();
        assert_eq!(spi.writes.len(), 1);

        let mut framer = PacketFramer::new();
        let result = framer.decode(&spi.writes[0]);
        let payload = result.payload.unwrap();
        assert_eq!(payload[0], glint_protocol::operations::OP_BATCH);
    }

    #[test]
    fn test_receive_reads_length_prefixed_frame() {
        let mut rig = rig(true);

        // Device will answer with a framed legacy status payload
        let status_payload = [1u8, 1, 0x01, 0x40, 0x00, 0xF0, 0, 160, 0, 120, 1];
        let mut frame = [0u8; 32];
        let frame_len = PacketFramer::encode_raw(&status_payload, &mut frame).unwrap();

        {
            let mut spi = rig.spi.0.borrow_mut();
            spi.reads.push((frame_len as u16).to_be_bytes().to_vec());
            spi.reads.push(frame[..frame_len].to_vec());
        }

        let response = rig
            .transport
            .receive_response::<StatusResponse>()
            .unwrap()
            .unwrap();
        assert!(response.is_initialized);
        assert_eq!(response.display_width, 320);
        assert_eq!(response.frame_buffer_height, 120);

        // Chip select held low across prefix and body
        let chip_select = rig.chip_select.0.borrow();
        assert_eq!(chip_select.transitions.as_slice(), &[true, false, true]);
    }

    #[test]
    fn test_receive_treats_all_ones_prefix_as_no_data() {
        let mut rig = rig(true);
        rig.spi.0.borrow_mut().reads.push(std::vec![0xFF, 0xFF]);

        let response = rig.transport.receive_response::<StatusResponse>().unwrap();
        assert!(response.is_none());
    }

    #[test]
    fn test_receive_absorbs_corrupt_frame() {
        let mut rig = rig(true);
        {
            let mut spi = rig.spi.0.borrow_mut();
            spi.reads.push(std::vec![0, 5]);
            spi.reads.push(std::vec![2, 1, 2, 2, 0]); // bad checksum
        }

        let response = rig.transport.receive_response::<StatusResponse>().unwrap();
        assert!(response.is_none());
    }

    #[test]
    fn test_handshake_allows_waiting_within_deadline() {
        let mut rig = rig(true);
        // Handshake goes low; nothing can be sent and the deadline trips
        rig.handshake.0.borrow_mut().0 = false;
        let present: Operation = Operation::PresentFramebuffer;
        assert_eq!(
            rig.transport.send_immediate(&present),
            Err(GpuError::HandshakeTimeout)
        );

        // Once the line is high again the same transport recovers
        rig.handshake.0.borrow_mut().0 = true;
        rig.transport.send_immediate(&present).unwrap();
    }
}
