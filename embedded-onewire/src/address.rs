use crate::OneWireCrc;
use core::fmt;

/// A validated 64-bit 1-Wire ROM code.
///
/// | Byte | Description |
/// |------|-------------|
/// | 0    | Family code (e.g., 0x28 for DS18B20) |
/// | 1-6  | Serial number, least significant byte first |
/// | 7    | CRC-8 (`0b1_0001_1001` poly) of bytes 0-6 |
///
/// A `RomCode` can only be obtained from bytes that pass the CRC check,
/// from a bus search or from a Read ROM transaction. The [`Default`]
/// value is an all-zero placeholder that never matches a device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RomCode([u8; 8]);

impl RomCode {
    /// Validates the bytes and wraps them.
    ///
    /// Returns `None` if the CRC of all eight bytes is not zero, or
    /// if the family code is zero (which is what a bus held low reads as).
    pub fn from_bytes(bytes: [u8; 8]) -> Option<Self> {
        if bytes[0] != 0 && OneWireCrc::validate(&bytes) {
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Family code of the device.
    #[inline]
    pub const fn family(&self) -> u8 {
        self.0[0]
    }

    /// 48-bit serial number, least significant byte first.
    pub fn serial(&self) -> [u8; 6] {
        let mut serial = [0; 6];
        serial.copy_from_slice(&self.0[1..7]);
        serial
    }

    /// CRC byte.
    #[inline]
    pub const fn crc(&self) -> u8 {
        self.0[7]
    }

    /// Raw ROM bytes in bus order.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl From<RomCode> for u64 {
    fn from(rom: RomCode) -> Self {
        u64::from_le_bytes(rom.0)
    }
}

impl TryFrom<u64> for RomCode {
    type Error = u64;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::from_bytes(value.to_le_bytes()).ok_or(value)
    }
}

impl TryFrom<[u8; 8]> for RomCode {
    type Error = [u8; 8];

    fn try_from(value: [u8; 8]) -> Result<Self, Self::Error> {
        Self::from_bytes(value).ok_or(value)
    }
}

impl fmt::Display for RomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RomCode({})", self)
    }
}
