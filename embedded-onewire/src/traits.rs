use crate::{
    OneWireCrc, OneWireError, OneWireResult, RomCode,
    consts::{ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_ROM_CMD, ONEWIRE_SKIP_ROM_CMD},
};

/// Status reported by a bus master after a reset.
pub trait OneWireStatus {
    /// A presence pulse was detected.
    fn presence(&self) -> bool;
    /// The bus was held low during the presence-detect cycle.
    fn shortcircuit(&self) -> bool;
}

/// Classification of a bus reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// At least one device answered with a presence pulse.
    DevicePresent,
    /// Nobody answered.
    NoDevice,
    /// The line is held low.
    ShortCircuit,
}

/// Trait for 1-Wire communication.
/// This trait defines the basic operations required for 1-Wire communication, such as resetting the bus,
/// writing and reading bytes, and writing and reading bits.
///
/// Implementations are expected to bound every busy wait and report
/// an exhausted bound as [`OneWireError::Timeout`].
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// # Returns
    /// A result containing the status of the bus after the reset operation.
    ///
    /// # Errors
    /// This method returns an error if the reset operation fails.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus.
    /// # Arguments
    /// * `byte` - The byte to write to the bus.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus.
    /// # Returns
    /// Byte read from the bus.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Writes a single bit to the 1-Wire bus.
    /// # Arguments
    ///
    /// * `bit` - The bit to write.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads a single bit from the 1-Wire bus.
    /// # Returns
    /// The bit read from the bus.
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// # Note: Not intended for public API use.
    /// ## This method is internally used by the [search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html).
    ///
    /// Generates three time slots: two read time slots and one write time slot at the 1-Wire line.
    /// If the read time slots are 0 and 1, they are followed by a write-zero time slot.
    /// If the read time slots are 1 and 0, they are followed by a write-one time slot.
    /// If the read time slots are both 0, `direction` selects the written bit.
    /// If the read time slots are both 1 (error case), the subsequent write time slot is a write-one.
    ///
    /// The default implementation emulates the triplet with [`OneWire::read_bit`] and
    /// [`OneWire::write_bit`]; bus masters with a hardware triplet should override it.
    ///
    /// # Returns
    /// A tuple of the id bit, the complement bit and the direction actually written.
    fn read_triplet(
        &mut self,
        direction: bool,
    ) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        let id_bit = self.read_bit()?;
        let complement_bit = self.read_bit()?;
        let taken = if id_bit != complement_bit {
            id_bit
        } else {
            id_bit || direction
        };
        self.write_bit(taken)?;
        Ok((id_bit, complement_bit, taken))
    }

    /// Number of independent 1-Wire channels behind this bus master.
    fn channels(&self) -> u8 {
        1
    }

    /// Currently selected channel.
    fn channel(&self) -> u8 {
        0
    }

    /// Selects the active channel. Subsequent operations act on that channel only.
    fn set_channel(&mut self, channel: u8) -> OneWireResult<(), Self::BusError> {
        if channel == 0 {
            Ok(())
        } else {
            Err(OneWireError::InvalidChannel(channel))
        }
    }

    /// Arms (or releases) the strong pull-up used to feed parasitically powered
    /// devices during temperature conversions and EEPROM writes.
    ///
    /// When armed, the pull-up engages after the next byte written to the bus.
    fn set_strong_pullup(&mut self, _enable: bool) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Resets the bus and classifies the presence-detect cycle.
    fn presence(&mut self) -> OneWireResult<Presence, Self::BusError> {
        let status = self.reset()?;
        Ok(if status.shortcircuit() {
            Presence::ShortCircuit
        } else if status.presence() {
            Presence::DevicePresent
        } else {
            Presence::NoDevice
        })
    }

    /// Addresses devices on the 1-Wire bus.
    /// The first [`OneWire::read_byte`], [`OneWire::read_bit`], [`OneWire::write_byte`], [`OneWire::write_bit`] operation should be preceded by this method to address devices on the bus.
    /// Note: A [`OneWire::read_byte`] or [`OneWire::read_bit`] call will return garbage data if this method is called without specifying a ROM address on a bus with multiple devices.
    /// # Arguments
    /// * `rom` - The ROM address of the device to address. Pass [`None`] to skip ROM addressing and address all devices on the bus.
    ///
    /// # Errors
    /// Nothing is written to the bus if the reset finds no device
    /// ([`OneWireError::NoDevicePresent`]) or a shorted line ([`OneWireError::ShortCircuit`]).
    fn address(&mut self, rom: Option<&RomCode>) -> OneWireResult<(), Self::BusError> {
        match self.presence()? {
            Presence::DevicePresent => {}
            Presence::NoDevice => return Err(OneWireError::NoDevicePresent),
            Presence::ShortCircuit => return Err(OneWireError::ShortCircuit),
        }
        match rom {
            Some(rom) => {
                self.write_byte(ONEWIRE_MATCH_ROM_CMD)?;
                for &b in rom.as_bytes().iter() {
                    self.write_byte(b)?; // Write each byte of the ROM address
                }
            }
            None => self.write_byte(ONEWIRE_SKIP_ROM_CMD)?,
        }
        Ok(())
    }

    /// Selects exactly one device for the following commands.
    fn match_rom(&mut self, rom: &RomCode) -> OneWireResult<(), Self::BusError> {
        self.address(Some(rom))
    }

    /// Selects every device on the bus for the following commands.
    fn skip_rom(&mut self) -> OneWireResult<(), Self::BusError> {
        self.address(None)
    }

    /// Reads the ROM code of the only device on a single-drop bus.
    fn read_rom(&mut self) -> OneWireResult<RomCode, Self::BusError> {
        match self.presence()? {
            Presence::DevicePresent => {}
            Presence::NoDevice => return Err(OneWireError::NoDevicePresent),
            Presence::ShortCircuit => return Err(OneWireError::ShortCircuit),
        }
        self.write_byte(ONEWIRE_READ_ROM_CMD)?;
        let mut rom = [0; 8];
        let mut crc = OneWireCrc::default();
        for b in rom.iter_mut() {
            *b = self.read_byte()?;
            crc.update(*b);
        }
        if crc.value() != 0 {
            return Err(OneWireError::InvalidCrc);
        }
        RomCode::from_bytes(rom).ok_or(OneWireError::InvalidCrc)
    }
}

impl<T: OneWire + ?Sized> OneWire for &mut T {
    type Status = T::Status;
    type BusError = T::BusError;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        T::reset(self)
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        T::write_byte(self, byte)
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        T::read_byte(self)
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        T::write_bit(self, bit)
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        T::read_bit(self)
    }

    fn read_triplet(
        &mut self,
        direction: bool,
    ) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        T::read_triplet(self, direction)
    }

    fn channels(&self) -> u8 {
        T::channels(self)
    }

    fn channel(&self) -> u8 {
        T::channel(self)
    }

    fn set_channel(&mut self, channel: u8) -> OneWireResult<(), Self::BusError> {
        T::set_channel(self, channel)
    }

    fn set_strong_pullup(&mut self, enable: bool) -> OneWireResult<(), Self::BusError> {
        T::set_strong_pullup(self, enable)
    }
}
