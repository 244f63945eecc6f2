//! Glint GPU driver
//!
//! Drives the Glint graphics coprocessor over one of three transports and
//! owns the device session: handshake, capability negotiation, and the
//! fire-and-forget / request-response send paths.
//!
//! # Layers
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  TextureManager   (which images are resident)│
//! ├──────────────────────────────────────────────┤
//! │  Gpu              (session state, send paths)│
//! ├──────────────────────────────────────────────┤
//! │  GpuTransport     (SPI / UART / TCP backends)│
//! ├──────────────────────────────────────────────┤
//! │  glint-protocol   (framing, codec, batching) │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! One logical session owns one physical link. Nothing here is safe to
//! share between threads; the render loop drives everything, and every
//! wait is a cooperative poll with a deadline rather than a blocking park.

#![no_std]
#![deny(unsafe_code)]

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod error;
pub mod gpu;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(feature = "alloc")]
pub mod texture;

pub use error::GpuError;
pub use gpu::{Gpu, Resolution, SUPPORTED_API_VERSION};
pub use transport::GpuTransport;

#[cfg(feature = "alloc")]
pub use texture::{PixelSource, TextureBuffer, TextureError, TextureFrame, TextureInfo, TextureManager};
