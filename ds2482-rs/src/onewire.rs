use crate::{
    DeviceConfiguration, Ds2482, Ds2482Error, Interact,
    registers::{DeviceStatus, READ_PTR_CMD},
};
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use embedded_onewire::{OneWire, OneWireResult};

pub(crate) const ONEWIRE_RESET_CMD: u8 = 0xb4;
pub(crate) const ONEWIRE_WRITE_BYTE: u8 = 0xa5;
pub(crate) const ONEWIRE_READ_BYTE: u8 = 0x96;
pub(crate) const ONEWIRE_READ_DATA_PTR: u8 = 0xe1;
pub(crate) const ONEWIRE_SINGLE_BIT: u8 = 0x87;
pub(crate) const ONEWIRE_TRIPLET: u8 = 0x78;

impl<I2C: I2c<SevenBitAddress>, D: DelayNs> Ds2482<I2C, D> {
    fn wait(&mut self) -> OneWireResult<DeviceStatus, Ds2482Error<I2C::Error>> {
        self.onewire_wait().map_err(Ds2482Error::into_onewire)
    }

    fn command(&mut self, bytes: &[u8]) -> OneWireResult<(), Ds2482Error<I2C::Error>> {
        self.wait()?;
        self.i2c
            .write(self.addr, bytes)
            .map_err(Ds2482Error::from)?;
        Ok(())
    }
}

impl<I2C: I2c<SevenBitAddress>, D: DelayNs> OneWire for Ds2482<I2C, D> {
    type Status = DeviceStatus;

    type BusError = Ds2482Error<I2C::Error>;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        self.command(&[ONEWIRE_RESET_CMD])?;
        // A reset ends any strong pullup.
        self.config.set_strong_pullup(false);
        self.wait()
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.command(&[ONEWIRE_WRITE_BYTE, byte])?;
        self.config.set_strong_pullup(false);
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        self.command(&[ONEWIRE_READ_BYTE])?;
        self.wait()?;
        let mut val = [0; 1];
        self.i2c
            .write_read(self.addr, &[READ_PTR_CMD, ONEWIRE_READ_DATA_PTR], &mut val)
            .map_err(Ds2482Error::from)?;
        Ok(val[0])
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.command(&[ONEWIRE_SINGLE_BIT, if bit { 0x80 } else { 0x0 }])?;
        self.config.set_strong_pullup(false);
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        self.write_bit(true)?;
        Ok(self.wait()?.single_bit_result())
    }

    fn read_triplet(
        &mut self,
        direction: bool,
    ) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        self.command(&[ONEWIRE_TRIPLET, if direction { 0x80 } else { 0x0 }])?;
        let status = self.wait()?;
        Ok((
            status.single_bit_result(),
            status.triplet_second_bit(),
            status.branch_dir_taken(),
        ))
    }

    fn channels(&self) -> u8 {
        self.channels
    }

    fn channel(&self) -> u8 {
        self.channel
    }

    fn set_channel(&mut self, channel: u8) -> OneWireResult<(), Self::BusError> {
        self.select_channel(channel)
    }

    fn set_strong_pullup(&mut self, enable: bool) -> OneWireResult<(), Self::BusError> {
        // The bridge drops SPU by itself once the pullup has ended.
        let mut live = DeviceConfiguration::new();
        live.read(self).map_err(Ds2482Error::into_onewire)?;
        if live.strong_pullup() == enable {
            self.config = live;
            return Ok(());
        }
        self.set_config(live.with_strong_pullup(enable))
    }
}
