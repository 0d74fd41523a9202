use crate::{Addressing, Ds2482, Ds2482Error, Ds2482Result, traits::Interact};
use bitfield_struct::bitfield;
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use embedded_onewire::{OneWireError, OneWireResult, OneWireStatus};

pub(crate) const READ_PTR_CMD: u8 = 0xe1; // Set the read pointer
pub(crate) const DEVICE_STATUS_PTR: u8 = 0xf0; // Device status register
pub(crate) const DEVICE_RST_CMD: u8 = 0xf0; // Reset the device
const DEFAULT_ADDR: u8 = 0x18;
const POLL_INTERVAL_US: u32 = 20;

/// Builder for creating a [`Ds2482`] instance with custom configuration.
pub struct Ds2482Builder {
    retries: u16,
    addr: u8,
    channels: u8,
    config: DeviceConfiguration,
}

impl Default for Ds2482Builder {
    fn default() -> Self {
        Ds2482Builder {
            retries: 1000,
            addr: DEFAULT_ADDR,
            channels: 1,
            config: DeviceConfiguration::new(),
        }
    }
}

impl Ds2482Builder {
    /// Sets the number of status polls before a busy wait gives up.
    ///
    /// Polls are 20 µs apart, so the default of 1000 bounds every
    /// wait to roughly 20 ms.
    pub fn with_retries(mut self, retries: u16) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Sets the 7-bit I2C address (0x18 to 0x1f, depending on the AD pins).
    pub fn with_address(mut self, addr: u8) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the number of 1-Wire channels: 1 for the DS2482-100, 8 for the DS2482-800.
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels.clamp(1, 8);
        self
    }

    /// Sets the device configuration.
    pub fn with_config(mut self, config: DeviceConfiguration) -> Self {
        self.config = config;
        self
    }

    /// Resets the bridge, writes the configuration and checks that it was accepted.
    ///
    /// # Errors
    /// [`OneWireError::Timeout`] if the bridge never reports its reset,
    /// [`OneWireError::Config`] if the configuration does not read back or,
    /// with more than one channel, the bridge does not report channel 0.
    pub fn build<I: I2c<SevenBitAddress>, D: DelayNs>(
        self,
        i2c: I,
        delay: D,
    ) -> OneWireResult<Ds2482<I, D>, Ds2482Error<I::Error>> {
        let mut dev = Ds2482 {
            i2c,
            addr: self.addr,
            delay,
            retries: self.retries,
            channels: self.channels,
            channel: 0,
            config: DeviceConfiguration::new(),
        };
        dev.device_reset().map_err(Ds2482Error::into_onewire)?;
        dev.set_config(self.config)?;
        if dev.channels > 1 {
            // A DS2482-100 has no channel register to report channel 0.
            let mut sel = ChannelSelection(0);
            sel.read(&mut dev).map_err(Ds2482Error::into_onewire)?;
            if sel.channel() != Some(0) {
                return Err(OneWireError::Config);
            }
        }
        Ok(dev)
    }
}

impl<I: I2c<SevenBitAddress>, D: DelayNs> Ds2482<I, D> {
    /// Get the status of the device.
    pub fn get_status(&mut self) -> Ds2482Result<DeviceStatus, I::Error> {
        let mut stat = DeviceStatus::new();
        stat.read(self)?;
        Ok(stat)
    }

    /// Reset the device.
    ///
    /// Performs a global reset of device state machine logic. Terminates any ongoing 1-Wire
    /// communication, selects channel 0 and clears the configuration.
    pub fn device_reset(&mut self) -> Ds2482Result<DeviceStatus, I::Error> {
        let mut stat = DeviceStatus::new();
        stat.write(self)?;
        Ok(stat)
    }

    /// Writes the device configuration and checks the read-back value.
    pub fn set_config(
        &mut self,
        config: DeviceConfiguration,
    ) -> OneWireResult<(), Ds2482Error<I::Error>> {
        let mut readback = config;
        readback.write(self).map_err(Ds2482Error::into_onewire)?;
        if readback.into_bits() != config.into_bits() & 0x0f {
            return Err(OneWireError::Config);
        }
        self.config = readback;
        Ok(())
    }

    pub(crate) fn select_channel(
        &mut self,
        channel: u8,
    ) -> OneWireResult<(), Ds2482Error<I::Error>> {
        if channel >= self.channels {
            return Err(OneWireError::InvalidChannel(channel));
        }
        if self.channels == 1 {
            return Ok(()); // DS2482-100 has no channel register
        }
        let mut sel =
            ChannelSelection::for_channel(channel).ok_or(OneWireError::InvalidChannel(channel))?;
        sel.write(self).map_err(Ds2482Error::into_onewire)?;
        if sel.channel() != Some(channel) {
            return Err(OneWireError::Config);
        }
        self.channel = channel;
        Ok(())
    }

    pub(crate) fn onewire_wait(&mut self) -> Ds2482Result<DeviceStatus, I::Error> {
        self.i2c
            .write(self.addr, &[READ_PTR_CMD, DEVICE_STATUS_PTR])?;
        self.poll(|status| !status.onewire_busy())
    }

    fn poll(
        &mut self,
        ready: impl Fn(&DeviceStatus) -> bool,
    ) -> Ds2482Result<DeviceStatus, I::Error> {
        let mut buf = [0];
        for _ in 0..self.retries {
            self.i2c.read(self.addr, &mut buf)?;
            let status = DeviceStatus::from_bits(buf[0]);
            if ready(&status) {
                return Ok(status);
            }
            self.delay.delay_us(POLL_INTERVAL_US);
        }
        Err(Ds2482Error::RetriesExceeded)
    }
}

/// Status register of the DS2482.
///
/// Reports the 1-Wire side to the host: busy flag, presence and short
/// detection, line level, device reset and the results of the single
/// bit and triplet commands. Every 1-Wire command and the Device Reset
/// command leave the read pointer on this register. See the
/// [data sheet](https://www.analog.com/media/en/technical-documentation/data-sheets/DS2482-800.pdf).
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct DeviceStatus {
    /// 1WB: a 1-Wire command is still executing.
    pub(crate) onewire_busy: bool,
    /// PPD: a presence pulse was seen during the last 1-Wire Reset.
    pub(crate) present_pulse_detect: bool,
    /// SD: the line was low at the short-detect sample of the last 1-Wire Reset.
    /// A shorted line also sets PPD.
    pub(crate) short_detect: bool,
    /// LL: logic level of the selected 1-Wire line, sampled on every status read.
    pub logic_level: bool,
    /// RST: the bridge went through an internal reset. Cleared by writing
    /// the configuration.
    pub device_reset: bool,
    /// SBR: line level sampled by a Single Bit command, or the first bit of a triplet.
    pub(crate) single_bit_result: bool,
    /// TSB: second bit of a triplet.
    pub(crate) triplet_second_bit: bool,
    /// DIR: direction written by the third slot of a triplet.
    pub(crate) branch_dir_taken: bool,
}

impl OneWireStatus for DeviceStatus {
    fn presence(&self) -> bool {
        self.present_pulse_detect()
    }

    fn shortcircuit(&self) -> bool {
        self.short_detect()
    }

}

impl Addressing for DeviceStatus {
    // Read-only; Device Reset is the only command that acts on it.
    const WRITE_ADDR: u8 = DEVICE_RST_CMD;
    const READ_PTR: u8 = DEVICE_STATUS_PTR;
}

impl Interact for DeviceStatus {
    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        let mut buf = [0];
        dev.i2c
            .write_read(dev.addr, &[READ_PTR_CMD, Self::READ_PTR], &mut buf)?;
        *self = Self::from_bits(buf[0]);
        Ok(())
    }

    /// Issues Device Reset and waits for the RST flag.
    ///
    /// The bridge comes back on channel 0 with a cleared configuration.
    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        dev.i2c.write(dev.addr, &[Self::WRITE_ADDR])?;
        dev.channel = 0;
        dev.config = DeviceConfiguration::new();
        // The read pointer is left on the status register.
        *self = dev.poll(DeviceStatus::device_reset)?;
        Ok(())
    }
}

#[bitfield(u8)]
#[derive(PartialEq, Eq)]
/// # Device configuration register
///
/// Four 1-Wire features, selectable in any combination:
/// - Active Pullup (APU)
/// - Presence Pulse Masking (PPM)
/// - Strong Pullup (SPU)
/// - 1-Wire Speed (1WS)
///
/// The register is written with the upper nibble holding the one's
/// complement of the lower nibble; a write that violates this is
/// ignored by the bridge. Reads return the lower nibble with the upper
/// nibble cleared. After a device reset the register reads 00h.
pub struct DeviceConfiguration {
    /// APU: drive rising edges with the low impedance pullup instead of
    /// the resistor. Recommended whenever more than one device is on the bus.
    pub active_pullup: bool,
    /// PPM: do not report presence pulses (PPD always 0).
    pub presence_pulse_masking: bool,
    /// SPU: engage the strong pullup after the next Write Byte or Single
    /// Bit command. Needed by parasitically powered devices during
    /// temperature conversions and EEPROM writes. The bridge clears the
    /// bit when the strong pullup ends.
    pub strong_pullup: bool,
    /// 1WS: overdrive speed.
    pub onewire_speed: bool,
    #[bits(4)]
    __: u8,
}

impl DeviceConfiguration {
    /// Byte written to the bridge: configuration in the lower nibble, its
    /// complement in the upper nibble.
    pub const fn encoded(&self) -> u8 {
        let cfg = self.into_bits() & 0x0f;
        cfg | (!cfg << 4)
    }
}

impl Addressing for DeviceConfiguration {
    const WRITE_ADDR: u8 = 0xd2;
    const READ_PTR: u8 = 0xc3;
}

impl Interact for DeviceConfiguration {
    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        let mut buf = [0];
        dev.i2c
            .write_read(dev.addr, &[READ_PTR_CMD, Self::READ_PTR], &mut buf)?;
        *self = Self::from_bits(buf[0]);
        Ok(())
    }

    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        dev.onewire_wait()?;
        let mut buf = [0];
        dev.i2c
            .write_read(dev.addr, &[Self::WRITE_ADDR, self.encoded()], &mut buf)?;
        *self = Self::from_bits(buf[0]);
        Ok(())
    }
}

// (write code, read-back code) per channel.
const CHANNEL_CODES: [(u8, u8); 8] = [
    (0xf0, 0xb8),
    (0xe1, 0xb1),
    (0xd2, 0xaa),
    (0xc3, 0xa3),
    (0xb4, 0x9c),
    (0xa5, 0x95),
    (0x96, 0x8e),
    (0x87, 0x87),
];

/// Channel selection register of the DS2482-800.
///
/// The bridge reports the selected channel with a code that differs
/// from the one written, see [`channel`](ChannelSelection::channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSelection(u8);

impl ChannelSelection {
    /// Selection code for `channel` (0-7).
    pub fn for_channel(channel: u8) -> Option<Self> {
        CHANNEL_CODES
            .get(channel as usize)
            .map(|&(code, _)| Self(code))
    }

    /// Raw register value.
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// Channel reported by the bridge after a read or a write.
    pub fn channel(&self) -> Option<u8> {
        CHANNEL_CODES
            .iter()
            .position(|&(_, readback)| readback == self.0)
            .map(|ch| ch as u8)
    }
}

impl Addressing for ChannelSelection {
    const WRITE_ADDR: u8 = 0xc3;
    const READ_PTR: u8 = 0xd2;
}

impl Interact for ChannelSelection {
    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        let mut buf = [0];
        dev.i2c
            .write_read(dev.addr, &[READ_PTR_CMD, Self::READ_PTR], &mut buf)?;
        self.0 = buf[0];
        Ok(())
    }

    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        dev.onewire_wait()?;
        let mut buf = [0];
        // Channel Select leaves the read pointer on the channel register.
        dev.i2c
            .write_read(dev.addr, &[Self::WRITE_ADDR, self.0], &mut buf)?;
        self.0 = buf[0];
        Ok(())
    }
}
