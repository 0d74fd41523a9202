use crate::DeviceRecord;
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireCrc, OneWireError, OneWireResult};
use fixed::types::I12F4;

/// Family code of the DS18B20.
pub const DS18B20_FAMILY: u8 = 0x28;

const DS18B20_START_CONV: u8 = 0x44;
const DS18B20_WRITE_SCRATCH: u8 = 0x4e;
const DS18B20_READ_SCRATCH: u8 = 0xbe;
const DS18B20_COPY_SCRATCH: u8 = 0x48;
const DS18B20_RECALL_EEPROM: u8 = 0xb8;
const DS18B20_READ_POWERMODE: u8 = 0xb4;

const POLL_INTERVAL_US: u32 = 20;
const COPY_SCRATCH_MS: u32 = 10;

/// Temperature in degrees, 1/16 degree resolution.
pub type Temperature = I12F4;

/// Conversion resolution, bits 5-6 of the configuration register.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 0.5 degree, 94 ms.
    Nine = 0,
    /// 0.25 degree, 188 ms.
    Ten = 1,
    /// 0.125 degree, 375 ms.
    Eleven = 2,
    /// 0.0625 degree, 750 ms.
    #[default]
    Twelve = 3,
}

impl Resolution {
    /// Decodes the two resolution bits.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Nine,
            1 => Self::Ten,
            2 => Self::Eleven,
            _ => Self::Twelve,
        }
    }

    /// The two resolution bits.
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    /// Resolution encoded in a configuration register value.
    pub const fn from_config(config: u8) -> Self {
        Self::from_bits(config >> 5)
    }

    /// Configuration register value selecting this resolution.
    pub const fn config_byte(self) -> u8 {
        0x1f | (self as u8) << 5
    }

    /// Worst-case conversion time.
    pub const fn conversion_time_ms(self) -> u32 {
        94 << self as u32
    }
}

/// Validated scratchpad contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad {
    bytes: [u8; 9],
}

impl Scratchpad {
    /// Accepts the nine bytes read from the device if their CRC checks out.
    pub fn from_bytes(bytes: [u8; 9]) -> Option<Self> {
        OneWireCrc::validate(&bytes).then_some(Self { bytes })
    }

    /// Raw temperature register, with the bits undefined at the
    /// configured resolution cleared.
    pub fn raw(&self) -> i16 {
        let raw = i16::from_le_bytes([self.bytes[0], self.bytes[1]]);
        let undefined = 3 - self.resolution().into_bits();
        raw & !((1 << undefined) - 1)
    }

    /// Temperature in degrees Celsius.
    pub fn celsius(&self) -> Temperature {
        Temperature::from_bits(self.raw())
    }

    /// Temperature in degrees Fahrenheit.
    pub fn fahrenheit(&self) -> Temperature {
        // 512 = 32 degrees in 1/16 steps
        let raw = self.raw() as i32 * 9 / 5 + 512;
        Temperature::from_bits(raw as i16)
    }

    /// Upper alarm threshold (TH).
    pub fn alarm_high(&self) -> i8 {
        self.bytes[2] as i8
    }

    /// Lower alarm threshold (TL).
    pub fn alarm_low(&self) -> i8 {
        self.bytes[3] as i8
    }

    /// Configuration register.
    pub fn config(&self) -> u8 {
        self.bytes[4]
    }

    /// Resolution selected by the configuration register.
    pub fn resolution(&self) -> Resolution {
        Resolution::from_config(self.bytes[4])
    }

    /// The nine bytes as read, CRC last.
    pub fn as_bytes(&self) -> &[u8; 9] {
        &self.bytes
    }
}

/// Sensors addressed by a command.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// One registered sensor (Match ROM).
    Device(&'a DeviceRecord),
    /// Every sensor on a channel (Skip ROM).
    All {
        /// Bridge channel.
        channel: u8,
        /// Resolution used to time a parasitic conversion.
        resolution: Resolution,
    },
}

fn use_channel<T: OneWire + ?Sized>(bus: &mut T, channel: u8) -> OneWireResult<(), T::BusError> {
    if bus.channels() > 1 && bus.channel() != channel {
        bus.set_channel(channel)?;
    }
    Ok(())
}

fn open<T: OneWire + ?Sized>(bus: &mut T, rec: &DeviceRecord) -> OneWireResult<(), T::BusError> {
    if rec.rom.family() != DS18B20_FAMILY {
        return Err(OneWireError::InvalidFamily(rec.rom.family()));
    }
    use_channel(bus, rec.config.channel())?;
    bus.match_rom(&rec.rom)
}

fn select<T: OneWire + ?Sized>(bus: &mut T, target: Target<'_>) -> OneWireResult<(), T::BusError> {
    match target {
        Target::Device(rec) => open(bus, rec),
        Target::All { channel, .. } => {
            use_channel(bus, channel)?;
            bus.skip_rom()
        }
    }
}

// Powered devices answer read slots with 0 until they are done.
fn wait_ready<T: OneWire + ?Sized, D: DelayNs>(
    bus: &mut T,
    delay: &mut D,
    timeout_ms: u32,
) -> OneWireResult<(), T::BusError> {
    for _ in 0..timeout_ms * (1000 / POLL_INTERVAL_US) {
        if bus.read_bit()? {
            return Ok(());
        }
        delay.delay_us(POLL_INTERVAL_US);
    }
    Err(OneWireError::Timeout)
}

/// Starts a temperature conversion.
///
/// Parasitic sensors get the strong pullup for the duration of the
/// conversion. With `wait`, returns once the conversion is done: powered
/// sensors are polled (giving up after twice the worst-case time),
/// parasitic ones are given the worst-case time and the strong pullup is
/// released. Without `wait`, the caller must give parasitic sensors that
/// time and release the pullup with [`OneWire::set_strong_pullup`].
///
/// For [`Target::All`], the channel counts as parasitic if any sensor on
/// it is.
pub fn start_conversion<T: OneWire + ?Sized, D: DelayNs>(
    bus: &mut T,
    delay: &mut D,
    target: Target<'_>,
    wait: bool,
) -> OneWireResult<(), T::BusError> {
    let (parasitic, resolution) = match target {
        Target::Device(rec) => (!rec.config.powered(), rec.config.resolution()),
        Target::All { resolution, .. } => (!power_mode(bus, target)?, resolution),
    };
    select(bus, target)?;
    if parasitic {
        bus.set_strong_pullup(true)?;
    }
    bus.write_byte(DS18B20_START_CONV)?;
    if !wait {
        return Ok(());
    }
    if parasitic {
        delay.delay_ms(resolution.conversion_time_ms());
        bus.set_strong_pullup(false)
    } else {
        wait_ready(bus, delay, 2 * resolution.conversion_time_ms())
    }
}

/// Reads and validates the scratchpad of a sensor.
///
/// # Errors
/// [`OneWireError::InvalidCrc`] if the nine bytes do not check out; the
/// data is discarded.
pub fn read_scratchpad<T: OneWire + ?Sized>(
    bus: &mut T,
    rec: &DeviceRecord,
) -> OneWireResult<Scratchpad, T::BusError> {
    open(bus, rec)?;
    bus.write_byte(DS18B20_READ_SCRATCH)?;
    let mut buf = [0; 9];
    for b in buf.iter_mut() {
        *b = bus.read_byte()?;
    }
    Scratchpad::from_bytes(buf).ok_or(OneWireError::InvalidCrc)
}

/// Writes the alarm thresholds and resolution, then copies them to EEPROM.
pub fn write_scratchpad<T: OneWire + ?Sized, D: DelayNs>(
    bus: &mut T,
    delay: &mut D,
    rec: &DeviceRecord,
    alarm_high: i8,
    alarm_low: i8,
    resolution: Resolution,
) -> OneWireResult<(), T::BusError> {
    open(bus, rec)?;
    bus.write_byte(DS18B20_WRITE_SCRATCH)?;
    bus.write_byte(alarm_high as u8)?;
    bus.write_byte(alarm_low as u8)?;
    bus.write_byte(resolution.config_byte())?;
    copy_scratchpad(bus, delay, rec)
}

/// Copies TH, TL and the configuration register to EEPROM.
pub fn copy_scratchpad<T: OneWire + ?Sized, D: DelayNs>(
    bus: &mut T,
    delay: &mut D,
    rec: &DeviceRecord,
) -> OneWireResult<(), T::BusError> {
    open(bus, rec)?;
    let parasitic = !rec.config.powered();
    if parasitic {
        bus.set_strong_pullup(true)?;
    }
    bus.write_byte(DS18B20_COPY_SCRATCH)?;
    if parasitic {
        delay.delay_ms(COPY_SCRATCH_MS);
        bus.set_strong_pullup(false)
    } else {
        wait_ready(bus, delay, 2 * COPY_SCRATCH_MS)
    }
}

/// Reloads TH, TL and the configuration register from EEPROM.
pub fn recall_eeprom<T: OneWire + ?Sized, D: DelayNs>(
    bus: &mut T,
    delay: &mut D,
    rec: &DeviceRecord,
) -> OneWireResult<(), T::BusError> {
    open(bus, rec)?;
    bus.write_byte(DS18B20_RECALL_EEPROM)?;
    if rec.config.powered() {
        wait_ready(bus, delay, COPY_SCRATCH_MS)
    } else {
        Ok(())
    }
}

/// Reads the power supply mode: `true` for external supply, `false` if
/// the sensor (any sensor, for [`Target::All`]) is parasitic.
pub fn power_mode<T: OneWire + ?Sized>(
    bus: &mut T,
    target: Target<'_>,
) -> OneWireResult<bool, T::BusError> {
    select(bus, target)?;
    bus.write_byte(DS18B20_READ_POWERMODE)?;
    bus.read_bit()
}
