#![no_std]
#![deny(missing_docs)]

/*! # DS2482
 *
 * Driver for the Analog Devices DS2482-100 (one channel) and DS2482-800
 * (eight channels) I2C to 1-Wire bridges. The bridge implements the
 * [`OneWire`] trait from `embedded-onewire`, so the ROM search and every
 * device driver built on that trait run on top of it.
 *
 * Use [`Ds2482Builder`] to reset and configure the bridge.
 */

#[cfg(test)]
extern crate std;

pub use embedded_onewire::{OneWire, OneWireError, OneWireResult};
mod error;
mod onewire;
mod registers;
mod traits;

pub use error::Ds2482Error;
pub use registers::{ChannelSelection, DeviceConfiguration, DeviceStatus, Ds2482Builder};
pub use traits::{Addressing, Interact};

/// Results of DS2482-specific function calls.
pub type Ds2482Result<T, E> = Result<T, Ds2482Error<E>>;

/// A DS2482 I2C to 1-Wire bridge device.
///
/// Takes ownership of an I2C bus (implementing [`I2c`](embedded_hal::i2c::I2c) trait)
/// and a timer object implementing the [`DelayNs`](embedded_hal::delay::DelayNs) trait.
/// Created through [`Ds2482Builder`].
pub struct Ds2482<I, D> {
    pub(crate) i2c: I,
    pub(crate) addr: u8,
    pub(crate) delay: D,
    pub(crate) retries: u16,
    pub(crate) channels: u8,
    pub(crate) channel: u8,
    pub(crate) config: DeviceConfiguration,
}

impl<I, D> Ds2482<I, D> {
    /// 7-bit I2C address of the bridge.
    pub fn address(&self) -> u8 {
        self.addr
    }

    /// Last configuration acknowledged by the bridge.
    pub fn config(&self) -> DeviceConfiguration {
        self.config
    }

    /// Releases the I2C bus and the timer.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }
}
