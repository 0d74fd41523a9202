#![no_std]
#![deny(missing_docs)]
//! # embedded-onewire
//! A no-std implementation of the 1-Wire protocol.
//!
//! This crate provides a trait-based interface for 1-Wire communication, allowing you to implement the protocol on various platforms.
//! [OneWire] trait defines the basic operations required for 1-Wire communication, such as resetting the bus, writing and reading bytes, and writing and reading bits.
//! Bus masters with several channels (such as the DS2482-800) expose them through [`OneWire::set_channel`].
//!
//! The crate also provides the ROM search algorithm for discovering devices on the 1-Wire bus, implemented in [SearchState]
//! (a resumable state, detached from the bus) and [OneWireSearch] (a borrowing iterator-like wrapper),
//! as well as the 1-Wire CRC-8 in [OneWireCrc] and the validated [RomCode] type.
//!
//! With the `sim` feature, a simulated multi-device bus is available in [`sim`] for host-side tests.

#[cfg(any(test, feature = "sim"))]
extern crate std;

mod address;
pub mod consts;
mod error;
mod search;
mod traits;
mod utils;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use address::RomCode;
pub use consts::*;
pub use error::OneWireError;
pub use search::{OneWireSearch, OneWireSearchKind, SearchState};
pub use traits::{OneWire, OneWireStatus, Presence};
pub use utils::OneWireCrc;

/// Error type for 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;
