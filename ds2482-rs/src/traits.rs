use crate::{Ds2482, Ds2482Result};
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};

/// Addresses of registers in the DS2482.
pub trait Addressing {
    /// Command byte that writes the register.
    const WRITE_ADDR: u8;
    /// Pointer code used with Set Read Pointer to read the register.
    const READ_PTR: u8;
}

/// Trait for interacting with the DS2482 I2C 1-Wire master.
pub trait Interact: Addressing {
    /// Read the register value from the DS2482.
    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error>;
    /// Write the register value to the DS2482.
    ///
    /// On return `self` holds the value the bridge reported back.
    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error>;
}
