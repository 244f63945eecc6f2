//! Glint Hardware Abstraction Layer
//!
//! This crate defines the hardware traits the Glint GPU driver is generic
//! over. Platform crates (RP2040, STM32, a Linux SBC, ...) implement these
//! traits for their own pins and buses; the driver itself never touches a
//! register.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application / render loop              │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  glint-driver (transports, session)     │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  glint-hal (this crate - traits)        │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//!          platform-specific pin/bus crates
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`], [`gpio::InputPin`] - reset, chip-select and
//!   handshake lines
//! - [`spi::SpiBus`] - SPI transfers to the GPU
//! - [`uart::UartTx`], [`uart::UartRx`] - serial link to the GPU
//! - [`time::Clock`], [`time::Delay`] - deadlines and cooperative waits

#![no_std]
#![deny(unsafe_code)]

#[cfg(feature = "std")]
extern crate std;

pub mod gpio;
pub mod spi;
pub mod time;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use gpio::{InputPin, OutputPin};
pub use spi::SpiBus;
pub use time::{Clock, Delay};
pub use uart::{UartRx, UartTx};

#[cfg(feature = "std")]
pub use time::StdClock;
