//! Simulated DS18B20 for the [`SimulatedBus`](embedded_onewire::sim::SimulatedBus).

use embedded_onewire::{
    OneWireCrc,
    sim::{SimDevice, rom_with_crc},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmd {
    Idle,
    WriteScratch(usize),
    ReadScratch(usize),
    Busy(u32),
    PowerSupply,
}

#[derive(Debug, Clone)]
pub(crate) struct SimSensor {
    rom: [u8; 8],
    /// Scratchpad bytes 0-7, the CRC is computed on read.
    pub scratchpad: [u8; 8],
    /// TH, TL, configuration.
    pub eeprom: [u8; 3],
    pub powered: bool,
    /// Read slots answered with 0 after a command that takes time.
    pub busy_polls: u32,
    pub temperature: i16,
    pub corrupt: bool,
    pub conversions: usize,
    pub copies: usize,
    cmd: Cmd,
}

impl SimSensor {
    pub fn new(serial: u8) -> Self {
        let eeprom = [0x4b, 0x46, 0x7f];
        Self {
            rom: rom_with_crc(0x28, [serial, 0x5a, 0xc3, 0x01, 0x00, 0x00]),
            scratchpad: [0x50, 0x05, eeprom[0], eeprom[1], eeprom[2], 0xff, 0x0c, 0x10],
            eeprom,
            powered: true,
            busy_polls: 3,
            temperature: 0x0191,
            corrupt: false,
            conversions: 0,
            copies: 0,
            cmd: Cmd::Idle,
        }
    }

    pub fn parasitic(mut self) -> Self {
        self.powered = false;
        self
    }

    pub fn with_config(mut self, config: u8) -> Self {
        self.eeprom[2] = config;
        self.scratchpad[4] = config;
        self
    }

    pub fn rom_bytes(&self) -> [u8; 8] {
        self.rom
    }

    fn image(&self) -> [u8; 9] {
        let mut bytes = [0; 9];
        bytes[..8].copy_from_slice(&self.scratchpad);
        bytes[8] = OneWireCrc::compute(&self.scratchpad);
        if self.corrupt {
            bytes[8] ^= 0x5a;
        }
        bytes
    }
}

impl SimDevice for SimSensor {
    fn rom(&self) -> [u8; 8] {
        self.rom
    }

    fn reset(&mut self) {
        self.cmd = Cmd::Idle;
    }

    fn write_byte(&mut self, byte: u8) {
        self.cmd = match self.cmd {
            Cmd::Idle => match byte {
                0x44 => {
                    self.conversions += 1;
                    let unused = 3 - ((self.scratchpad[4] >> 5) & 0x3);
                    let raw = self.temperature & !((1 << unused) - 1);
                    self.scratchpad[..2].copy_from_slice(&raw.to_le_bytes());
                    Cmd::Busy(self.busy_polls)
                }
                0x4e => Cmd::WriteScratch(0),
                0xbe => Cmd::ReadScratch(0),
                0x48 => {
                    self.copies += 1;
                    self.eeprom.copy_from_slice(&self.scratchpad[2..5]);
                    Cmd::Busy(self.busy_polls)
                }
                0xb8 => {
                    self.scratchpad[2..5].copy_from_slice(&self.eeprom);
                    Cmd::Busy(1)
                }
                0xb4 => Cmd::PowerSupply,
                _ => Cmd::Idle,
            },
            Cmd::WriteScratch(i) => {
                self.scratchpad[2 + i] = if i == 2 { (byte & 0x60) | 0x1f } else { byte };
                if i == 2 { Cmd::Idle } else { Cmd::WriteScratch(i + 1) }
            }
            cmd => cmd,
        };
    }

    fn read_byte(&mut self) -> u8 {
        match self.cmd {
            Cmd::ReadScratch(i) if i < 9 => {
                self.cmd = Cmd::ReadScratch(i + 1);
                self.image()[i]
            }
            _ => 0xff,
        }
    }

    fn read_bit(&mut self) -> bool {
        match self.cmd {
            Cmd::Busy(0) => {
                self.cmd = Cmd::Idle;
                true
            }
            Cmd::Busy(n) => {
                self.cmd = Cmd::Busy(n - 1);
                false
            }
            Cmd::PowerSupply => self.powered,
            _ => true,
        }
    }
}
