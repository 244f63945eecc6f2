//! Scriptable transport for session and texture manager tests

use std::collections::VecDeque;
use std::vec::Vec;

use glint_protocol::color::ColorFormat;
use glint_protocol::operations::Operation;
use glint_protocol::responses::{Response, RESPONSE_STATUS};

use crate::error::GpuError;
use crate::transport::GpuTransport;

/// Everything a test wants to assert on afterwards
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub reset_calls: usize,
    /// Encoded operations sent on the immediate path
    pub sent: Vec<Vec<u8>>,
    /// Encoded operations that went through the queue
    pub queued: Vec<Vec<u8>>,
    pub flushes: usize,
    pub op_byte_limit: Option<u16>,
}

/// Transport double: records outbound traffic, replays scripted responses
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    state: MockState,
    responses: VecDeque<Option<Vec<u8>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next response payload (None = device stays silent)
    pub fn push_response(&mut self, payload: Option<Vec<u8>>) {
        self.responses.push_back(payload);
    }

    pub fn state(&self) -> &MockState {
        &self.state
    }

    fn encode<C: ColorFormat>(op: &Operation<'_, C>) -> Result<Vec<u8>, GpuError> {
        let mut buffer = [0u8; 1024];
        let len = op.encode(&mut buffer)?;
        Ok(buffer[..len].to_vec())
    }
}

impl GpuTransport for MockTransport {
    fn reset(&mut self) -> Result<(), GpuError> {
        self.state.reset_calls += 1;
        Ok(())
    }

    fn enqueue<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<(), GpuError> {
        let bytes = Self::encode(op)?;
        self.state.queued.push(bytes);
        Ok(())
    }

    fn flush_queued(&mut self) -> Result<(), GpuError> {
        self.state.flushes += 1;
        Ok(())
    }

    fn send_immediate<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<(), GpuError> {
        let bytes = Self::encode(op)?;
        self.state.sent.push(bytes);
        Ok(())
    }

    fn receive_response<R: Response>(&mut self) -> Result<Option<R>, GpuError> {
        match self.responses.pop_front().flatten() {
            Some(bytes) => Ok(Some(R::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_op_byte_limit(&mut self, limit: u16) {
        self.state.op_byte_limit = Some(limit);
    }
}

/// Build a status response payload the way firmware serializes one
///
/// Legacy layouts fall out naturally: with no version and a zero byte
/// limit the payload stops after the color mode.
pub(crate) fn status_payload(
    is_initialized: bool,
    display_width: u16,
    display_height: u16,
    frame_buffer_width: u16,
    frame_buffer_height: u16,
    max_op_bytes: u16,
    api_version_id: Option<u16>,
) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.push(RESPONSE_STATUS);
    payload.push(u8::from(is_initialized));
    payload.extend_from_slice(&display_width.to_be_bytes());
    payload.extend_from_slice(&display_height.to_be_bytes());
    payload.extend_from_slice(&frame_buffer_width.to_be_bytes());
    payload.extend_from_slice(&frame_buffer_height.to_be_bytes());
    payload.push(1); // RGB565

    if max_op_bytes > 0 || api_version_id.is_some() {
        payload.extend_from_slice(&max_op_bytes.to_be_bytes());
    }
    if let Some(version) = api_version_id {
        payload.extend_from_slice(&version.to_be_bytes());
    }

    payload
}
