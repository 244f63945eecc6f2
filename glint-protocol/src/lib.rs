//! Glint GPU wire protocol
//!
//! This crate defines the binary protocol a host uses to drive the Glint
//! graphics coprocessor over a byte-oriented link (SPI, UART, or TCP while
//! developing against the simulator). It is transport-agnostic: everything
//! here works on byte slices.
//!
//! # Frame format
//!
//! Every operation travels in a self-delimiting frame. The payload is
//! protected by a 16-bit additive checksum and the whole frame is run
//! through a COBS-style byte-stuffing pass so the only zero byte on the
//! wire is the terminator:
//!
//! ```text
//! ┌────────┬─────────────┬───────┬───────┬──────┐
//! │ OFFSET │ PAYLOAD     │ CK HI │ CK LO │ 0x00 │
//! │ 1B     │ 1–250B      │ 1B    │ 1B    │ 1B   │
//! └────────┴─────────────┴───────┴───────┴──────┘
//! ```
//!
//! The payload's first byte is the operation opcode; the rest is the
//! operation's fixed big-endian field layout (see [`operations`]).
//! Responses use the same frame format with a leading type tag byte.

#![no_std]
#![deny(unsafe_code)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod batch;
pub mod color;
pub mod framer;
pub mod operations;
pub mod responses;

pub use batch::BatchPacker;
pub use color::{ColorFormat, ColorMode, Rgb565};
pub use framer::{FramerError, PacketDecodeResult, PacketFramer, MAX_OPERATION_SIZE};
pub use operations::{EncodeError, Font, Operation};
pub use responses::{DecodeError, LastMessageResponse, Response, StatusResponse};
