//! Device session
//!
//! Owns a transport and tracks what the device told us about itself. The
//! session moves through three states:
//!
//! ```text
//! Created ──reset──▶ StatusKnown ──initialize──▶ Initialized
//! ```
//!
//! Most drawing operations are silently ignored by an uninitialized
//! device, so callers should [`initialize`](Gpu::initialize) before
//! drawing. A device whose reported API version differs from
//! [`SUPPORTED_API_VERSION`] is refused outright rather than risk a
//! misread wire format.

use glint_protocol::color::{ColorFormat, ColorMode};
use glint_protocol::operations::Operation;
use glint_protocol::responses::{LastMessageResponse, Response, StatusResponse};

use crate::error::GpuError;
use crate::transport::GpuTransport;

/// The wire API revision this driver speaks
///
/// Initialization fails unless the device reports exactly this version
/// (legacy firmware that predates version reporting is tolerated).
pub const SUPPORTED_API_VERSION: u16 = 1;

/// A width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Resolution {
    pub width: u16,
    pub height: u16,
}

/// A session with the GPU over some transport
#[derive(Debug)]
pub struct Gpu<T: GpuTransport> {
    pub(crate) transport: T,
    is_initialized: bool,
    color_mode: ColorMode,
    display_resolution: Resolution,
    frame_buffer_resolution: Option<Resolution>,
    max_op_bytes: u16,
    api_version_id: Option<u16>,
}

impl<T: GpuTransport> Gpu<T> {
    /// Reset the device and learn its capabilities
    ///
    /// A freshly reset device may have no status ready yet; that is
    /// tolerated (with a warning) rather than failed, and the snapshot
    /// stays at its defaults until the next status exchange.
    pub fn create(mut transport: T) -> Result<Self, GpuError> {
        transport.reset()?;

        let mut gpu = Self {
            transport,
            is_initialized: false,
            color_mode: ColorMode::Unspecified,
            display_resolution: Resolution {
                width: 0,
                height: 0,
            },
            frame_buffer_resolution: None,
            max_op_bytes: 0,
            api_version_id: None,
        };
        gpu.refresh_status()?;

        Ok(gpu)
    }

    /// Initialize the device if it has not already been done
    ///
    /// `frame_buffer_scale` divides the display resolution for the
    /// internal frame buffer; the device upscales on present.
    pub fn initialize(&mut self, frame_buffer_scale: u8) -> Result<(), GpuError> {
        if self.is_initialized {
            return Ok(());
        }

        let op: Operation = Operation::Initialize { frame_buffer_scale };
        self.transport.send_immediate(&op)?;
        self.refresh_status()?;

        if !self.is_initialized {
            return Err(GpuError::NotInitialized);
        }
        Ok(())
    }

    /// Request a fresh status snapshot and apply it to this session
    pub fn refresh_status(&mut self) -> Result<(), GpuError> {
        let op: Operation = Operation::GetStatus;
        let status: Option<StatusResponse> = self.send_responsive(&op)?;

        match status {
            Some(status) => self.apply_status(&status),
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("status requested but the device returned none");
                Ok(())
            }
        }
    }

    /// Fetch the device's most recent diagnostic message
    pub fn last_message(&mut self) -> Result<Option<LastMessageResponse>, GpuError> {
        let op: Operation = Operation::GetLastMessage;
        self.send_responsive(&op)
    }

    /// Send a fire-and-forget operation now
    pub fn send_fire_and_forget<C: ColorFormat>(
        &mut self,
        op: &Operation<'_, C>,
    ) -> Result<(), GpuError> {
        debug_assert!(!op.expects_response());
        self.transport.send_immediate(op)
    }

    /// Queue a fire-and-forget operation for the next flush
    pub fn enqueue<C: ColorFormat>(&mut self, op: &Operation<'_, C>) -> Result<(), GpuError> {
        debug_assert!(!op.expects_response());
        self.transport.enqueue(op)
    }

    /// Send everything queued
    pub fn flush_queued(&mut self) -> Result<(), GpuError> {
        self.transport.flush_queued()
    }

    /// Send an operation and wait for its typed reply
    pub fn send_responsive<C: ColorFormat, R: Response>(
        &mut self,
        op: &Operation<'_, C>,
    ) -> Result<Option<R>, GpuError> {
        self.transport.send_immediate(op)?;
        self.transport.receive_response::<R>()
    }

    /// Whether the device has a frame buffer and will accept drawing
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Pixel format the device expects colors in
    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    /// Physical display resolution
    pub fn display_resolution(&self) -> Resolution {
        self.display_resolution
    }

    /// Frame buffer resolution; None until initialized
    pub fn frame_buffer_resolution(&self) -> Option<Resolution> {
        self.frame_buffer_resolution
    }

    /// Largest operation payload the device accepts (0 if unreported)
    pub fn max_op_bytes(&self) -> u16 {
        self.max_op_bytes
    }

    /// The device's reported API revision, if it reports one
    pub fn api_version_id(&self) -> Option<u16> {
        self.api_version_id
    }

    fn apply_status(&mut self, status: &StatusResponse) -> Result<(), GpuError> {
        self.color_mode = status.color_mode;
        self.is_initialized = status.is_initialized;
        self.display_resolution = Resolution {
            width: status.display_width,
            height: status.display_height,
        };

        // Only meaningful once the frame buffer exists
        self.frame_buffer_resolution = if status.is_initialized {
            Some(Resolution {
                width: status.frame_buffer_width,
                height: status.frame_buffer_height,
            })
        } else {
            None
        };

        if status.max_op_bytes > 0 {
            self.max_op_bytes = status.max_op_bytes;
            self.transport.set_op_byte_limit(status.max_op_bytes);
        }

        self.api_version_id = status.api_version_id;
        if let Some(device) = status.api_version_id {
            if device != SUPPORTED_API_VERSION {
                return Err(GpuError::ApiVersionMismatch {
                    device,
                    supported: SUPPORTED_API_VERSION,
                });
            }
        }

        Ok(())
    }
}
