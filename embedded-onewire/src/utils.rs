#[derive(Debug, Default, Clone, Copy)]
/// Calculate CRC-8 used in 1-Wire communications.
///
/// This is the Dallas/Maxim "iButton" CRC: polynomial
/// x^8 + x^5 + x^4 + 1, processed LSB first (reflected
/// form `0x8c`), initial value 0 and no final XOR.
pub struct OneWireCrc(u8);

#[cfg(feature = "crc-table")]
const CRC_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = step_bitwise(0, i as u8);
        i += 1;
    }
    table
};

const fn step_bitwise(crc: u8, byte: u8) -> u8 {
    let mut crc = crc ^ byte; // XOR the byte with the current CRC value
    let mut i = 0;
    while i < 8 {
        if crc & 0x1 == 0x1 {
            crc = (crc >> 1) ^ 0x8c; // Polynomial for CRC-8
        } else {
            crc >>= 1;
        }
        i += 1;
    }
    crc
}

impl OneWireCrc {
    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Fold one byte into a running CRC value.
    #[inline]
    pub const fn step(crc: u8, byte: u8) -> u8 {
        #[cfg(feature = "crc-table")]
        {
            CRC_TABLE[(crc ^ byte) as usize]
        }
        #[cfg(not(feature = "crc-table"))]
        {
            step_bitwise(crc, byte)
        }
    }

    /// Update the CRC with the incoming byte.
    pub fn update(&mut self, byte: u8) {
        self.0 = Self::step(self.0, byte);
    }

    /// Compute the CRC of a sequence of bytes.
    pub fn compute(sequence: &[u8]) -> u8 {
        sequence.iter().fold(0, |crc, &byte| Self::step(crc, byte))
    }

    /// Validate a sequence of bytes where the last byte is the 1-Wire CRC of
    /// the previous bytes.
    pub fn validate(sequence: &[u8]) -> bool {
        Self::compute(sequence) == 0x0 // If the last byte is the CRC, the result should be 0
    }
}
