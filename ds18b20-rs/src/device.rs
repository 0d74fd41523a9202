use crate::Resolution;
use bitfield_struct::bitfield;
use embedded_onewire::RomCode;

/// Per-sensor settings kept next to the ROM code in the registry.
///
/// Stored as one byte: bit 0 power mode, bits 1-3 channel, bits 4-5
/// resolution, bits 6-7 reserved (written as 0).
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct DeviceConfig {
    /// The sensor has its own supply (not parasitic).
    pub powered: bool,
    /// Bridge channel the sensor is attached to.
    #[bits(3)]
    pub channel: u8,
    /// Conversion resolution.
    #[bits(2)]
    pub resolution: Resolution,
    #[bits(2)]
    __: u8,
}

/// A registered sensor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRecord {
    /// ROM code of the sensor.
    pub rom: RomCode,
    /// Power mode, channel and resolution.
    pub config: DeviceConfig,
}

impl DeviceRecord {
    /// Size of a record in the store: 8 ROM bytes, then the configuration byte.
    pub const SIZE: usize = 9;

    /// Creates a record.
    pub fn new(rom: RomCode, config: DeviceConfig) -> Self {
        Self { rom, config }
    }

    /// Serializes the record in store layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0; Self::SIZE];
        bytes[..8].copy_from_slice(self.rom.as_bytes());
        bytes[8] = self.config.into_bits() & 0x3f;
        bytes
    }

    /// Parses a stored record. `None` if the ROM code fails its CRC.
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Option<Self> {
        let mut rom = [0; 8];
        rom.copy_from_slice(&bytes[..8]);
        Some(Self {
            rom: RomCode::from_bytes(rom)?,
            config: DeviceConfig::from_bits(bytes[8] & 0x3f),
        })
    }
}
