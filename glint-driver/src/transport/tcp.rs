//! TCP transport backend (development/simulation)
//!
//! Talks to the GPU simulator over a persistent stream socket. The wire
//! format is identical to the hardware transports: one COBS frame per
//! send, no extra length prefix. The stream has no frame boundaries of its
//! own, so receives accumulate into a growing buffer and decode until a
//! frame falls out.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::string::String;
use std::time::{Duration, Instant};
use std::vec::Vec;

use glint_protocol::color::ColorFormat;
use glint_protocol::framer::{PacketFramer, MAX_FRAME_SIZE};
use glint_protocol::operations::Operation;
use glint_protocol::responses::Response;

use super::{GpuTransport, OpQueue, LINK_TIMEOUT_MS};
use crate::error::GpuError;

/// Socket read timeout so receive polling stays cooperative
const READ_POLL_MS: u64 = 20;

/// TCP backend for [`GpuTransport`]
pub struct TcpGpuTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
    framer: PacketFramer,
    queue: OpQueue,
    tx_buffer: [u8; MAX_FRAME_SIZE],
    accumulator: Vec<u8>,
}

impl TcpGpuTransport {
    /// Remember the simulator's address; nothing connects until
    /// [`reset`](GpuTransport::reset)
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: String::from(host),
            port,
            stream: None,
            framer: PacketFramer::new(),
            queue: OpQueue::new(),
            tx_buffer: [0; MAX_FRAME_SIZE],
            accumulator: Vec::new(),
        }
    }

    fn write_frame(&mut self, len: usize) -> Result<(), GpuError> {
        let stream = self.stream.as_mut().ok_or(GpuError::NotConnected)?;
        stream
            .write_all(&self.tx_buffer[..len])
            .map_err(|_| GpuError::Communication)
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

        self.accumulator.drain(..consumed);
        Ok(Some(decoded))
    }
}

impl GpuTransport for TcpGpuTransport {
    /// Lazily (re)connect
    ///
    /// The simulator treats a fresh connection as a reset, so no reset
    /// operation goes over the wire.
    fn reset(&mut self) -> Result<(), GpuError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|_| GpuError::Communication)?;
        stream
            .set_read_timeout(Some(Duration::from_millis(READ_POLL_MS)))
            .map_err(|_| GpuError::Communication)?;
        let _ = stream.set_nodelay(true);

        self.stream = Some(stream);
        self.accumulator.clear();
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
        let deadline = Instant::now() + Duration::from_millis(LINK_TIMEOUT_MS);

        loop {
            while let Some(outcome) = self.try_decode::<R>()? {
                if let Some(response) = outcome {
                    return Ok(Some(response));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let stream = self.stream.as_mut().ok_or(GpuError::NotConnected)?;
            let mut chunk = [0u8; 256];
            match stream.read(&mut chunk) {
                // Peer hung up; nothing more is coming
                Ok(0) => return Ok(None),
                Ok(count) => self.accumulator.extend_from_slice(&chunk[..count]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(_) => return Err(GpuError::Communication),
            }
        }
    }

    fn set_op_byte_limit(&mut self, limit: u16) {
        self.queue.set_op_byte_limit(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_protocol::responses::StatusResponse;
    use std::net::TcpListener;
    use std::thread;
    use std::vec::Vec;

    /// A one-shot simulator: accepts a connection, reads one frame, and
    /// answers with the canned response frame.
    fn spawn_simulator(response_payload: Vec<u8>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();

            // Read until the request frame's terminator
            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                if socket.read_exact(&mut byte).is_err() {
                    return;
                }
                request.push(byte[0]);
                if byte[0] == 0 {
                    break;
                }
            }

            let mut frame = [0u8; MAX_FRAME_SIZE];
            let len = PacketFramer::encode_raw(&response_payload, &mut frame).unwrap();
            socket.write_all(&frame[..len]).unwrap();
        });

        port
    }

    #[test]
    fn test_send_unconnected_fails() {
        let mut transport = TcpGpuTransport::new("127.0.0.1", 1);
        let present: Operation = Operation::PresentFramebuffer;
        assert_eq!(
            transport.send_immediate(&present),
            Err(GpuError::NotConnected)
        );
    }

    #[test]
    fn test_status_exchange_over_loopback() {
        let status_payload = std::vec![
            1u8, 1, // tag, initialized
            0x01, 0x40, 0x00, 0xF0, // display 320x240
            0x00, 0xA0, 0x00, 0x78, // frame buffer 160x120
            1, // RGB565
            0x00, 0xFA, // 250 byte op limit
            0x00, 0x01, // API version 1
        ];
        let port = spawn_simulator(status_payload);

        let mut transport = TcpGpuTransport::new("127.0.0.1", port);
        transport.reset().unwrap();

        let status: Operation = Operation::GetStatus;
        transport.send_immediate(&status).unwrap();

        let response = transport
            .receive_response::<StatusResponse>()
            .unwrap()
            .unwrap();
        assert!(response.is_initialized);
        assert_eq!(response.display_width, 320);
        assert_eq!(response.max_op_bytes, 250);
        assert_eq!(response.api_version_id, Some(1));
    }

    #[test]
    fn test_reset_connects_once() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpGpuTransport::new("127.0.0.1", port);
        transport.reset().unwrap();
        transport.reset().unwrap(); // second reset reuses the connection

        let (mut socket, _) = listener.accept().unwrap();
        let present: Operation = Operation::PresentFramebuffer;
        transport.send_immediate(&present).unwrap();

        let mut received = [0u8; 5];
        socket.read_exact(&mut received).unwrap();
        assert_eq!(received, [2, 6, 2, 6, 0]);
    }
}
