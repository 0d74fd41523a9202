//! A simulated 1-Wire bus for host-side testing.
//!
//! [`SimulatedBus`] models the ROM layer of a multidrop bus, including
//! wired-AND reads, the search tree and multiple channels. Everything
//! after ROM selection is forwarded to the selected [`SimDevice`]s, so a
//! device model only has to implement its function commands.

use crate::{
    OneWire, OneWireCrc, OneWireError, OneWireResult, OneWireStatus,
    consts::{
        ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_ROM_CMD,
        ONEWIRE_SEARCH_CMD, ONEWIRE_SKIP_ROM_CMD,
    },
};
use core::convert::Infallible;
use std::{vec, vec::Vec};

/// A device attached to a [`SimulatedBus`].
pub trait SimDevice {
    /// ROM code the device answers to.
    fn rom(&self) -> [u8; 8];
    /// Whether the device takes part in a conditional (alarm) search.
    fn alarmed(&self) -> bool {
        false
    }
    /// Called on every bus reset.
    fn reset(&mut self) {}
    /// Function command or data byte written after ROM selection.
    fn write_byte(&mut self, _byte: u8) {}
    /// Byte the device drives while selected. The bus ANDs all selected devices.
    fn read_byte(&mut self) -> u8 {
        0xff
    }
    /// Read time slot while selected.
    fn read_bit(&mut self) -> bool {
        true
    }
    /// Write time slot while selected.
    fn write_bit(&mut self, _bit: bool) {}
}

/// Device that only implements the ROM layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomDevice {
    /// ROM code.
    pub rom: [u8; 8],
    /// Answers conditional searches.
    pub alarmed: bool,
}

impl RomDevice {
    /// Creates a device without alarm.
    pub fn new(rom: [u8; 8]) -> Self {
        Self {
            rom,
            alarmed: false,
        }
    }
}

impl SimDevice for RomDevice {
    fn rom(&self) -> [u8; 8] {
        self.rom
    }

    fn alarmed(&self) -> bool {
        self.alarmed
    }
}

/// Builds a ROM code with a correct CRC byte.
pub fn rom_with_crc(family: u8, serial: [u8; 6]) -> [u8; 8] {
    let mut rom = [family, 0, 0, 0, 0, 0, 0, 0];
    rom[1..7].copy_from_slice(&serial);
    rom[7] = OneWireCrc::compute(&rom[..7]);
    rom
}

/// Reset status of a [`SimulatedBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimStatus {
    presence: bool,
    short: bool,
}

impl OneWireStatus for SimStatus {
    fn presence(&self) -> bool {
        self.presence
    }

    fn shortcircuit(&self) -> bool {
        self.short
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchStep {
    IdBit,
    ComplementBit,
    Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    RomCommand,
    Match(usize),
    ReadRom(usize),
    Search(u8, SearchStep),
    Function,
}

/// Simulated bus master with one or more channels of devices.
pub struct SimulatedBus<D> {
    channels: Vec<Vec<D>>,
    channel: usize,
    selected: Vec<bool>,
    phase: Phase,
    short: bool,
    timeout: bool,
    drop_after: Option<u8>,
    strong_pullup: bool,
    strong_pullup_count: usize,
    resets: usize,
}

impl<D: SimDevice> SimulatedBus<D> {
    /// Single channel bus.
    pub fn new(devices: Vec<D>) -> Self {
        Self::with_channels(vec![devices])
    }

    /// Multi-channel bus, one device list per channel.
    pub fn with_channels(channels: Vec<Vec<D>>) -> Self {
        Self {
            channels,
            channel: 0,
            selected: Vec::new(),
            phase: Phase::Idle,
            short: false,
            timeout: false,
            drop_after: None,
            strong_pullup: false,
            strong_pullup_count: 0,
            resets: 0,
        }
    }

    /// Devices on a channel.
    pub fn devices(&self, channel: u8) -> &[D] {
        &self.channels[channel as usize]
    }

    /// Mutable access to the devices on a channel.
    pub fn devices_mut(&mut self, channel: u8) -> &mut Vec<D> {
        self.phase = Phase::Idle;
        &mut self.channels[channel as usize]
    }

    /// Finds a device by ROM on a channel.
    pub fn device_mut(&mut self, channel: u8, rom: &[u8; 8]) -> Option<&mut D> {
        self.channels[channel as usize]
            .iter_mut()
            .find(|d| &d.rom() == rom)
    }

    /// Attaches a device.
    pub fn push(&mut self, channel: u8, device: D) {
        self.devices_mut(channel).push(device);
    }

    /// Detaches a device.
    pub fn remove(&mut self, channel: u8, rom: &[u8; 8]) -> Option<D> {
        let devices = self.devices_mut(channel);
        let pos = devices.iter().position(|d| &d.rom() == rom)?;
        Some(devices.remove(pos))
    }

    /// Holds the line low: every reset reports a short.
    pub fn set_short(&mut self, short: bool) {
        self.short = short;
    }

    /// Makes every operation fail with [`OneWireError::Timeout`].
    pub fn set_timeout(&mut self, timeout: bool) {
        self.timeout = timeout;
    }

    /// All devices stop answering search slots from bit `bits` on.
    pub fn drop_after_bits(&mut self, bits: u8) {
        self.drop_after = Some(bits);
    }

    /// Whether the strong pull-up is currently armed.
    pub fn strong_pullup(&self) -> bool {
        self.strong_pullup
    }

    /// How many times the strong pull-up was armed.
    pub fn strong_pullup_count(&self) -> usize {
        self.strong_pullup_count
    }

    /// Number of bus resets issued.
    pub fn resets(&self) -> usize {
        self.resets
    }

    fn check(&self) -> OneWireResult<(), Infallible> {
        if self.timeout {
            Err(OneWireError::Timeout)
        } else {
            Ok(())
        }
    }

    fn rom_bit(rom: &[u8; 8], bit: u8) -> bool {
        rom[(bit >> 3) as usize] & (1 << (bit & 7)) != 0
    }

    fn search_slots(&self, bit: u8) -> (bool, bool) {
        if self.drop_after.is_some_and(|n| bit >= n) {
            return (true, true);
        }
        let mut id_bit = true;
        let mut complement_bit = true;
        for (dev, _) in self.channels[self.channel]
            .iter()
            .zip(self.selected.iter())
            .filter(|(_, sel)| **sel)
        {
            let b = Self::rom_bit(&dev.rom(), bit);
            id_bit &= b;
            complement_bit &= !b;
        }
        (id_bit, complement_bit)
    }

    fn search_select(&mut self, bit: u8, taken: bool) {
        for (dev, sel) in self.channels[self.channel]
            .iter()
            .zip(self.selected.iter_mut())
        {
            *sel &= Self::rom_bit(&dev.rom(), bit) == taken;
        }
    }
}

impl<D: SimDevice> OneWire for SimulatedBus<D> {
    type Status = SimStatus;
    type BusError = Infallible;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        self.check()?;
        self.resets += 1;
        let devices = &mut self.channels[self.channel];
        devices.iter_mut().for_each(|d| d.reset());
        self.selected = vec![true; devices.len()];
        self.phase = if self.short {
            Phase::Idle
        } else {
            Phase::RomCommand
        };
        Ok(SimStatus {
            presence: self.short || !devices.is_empty(),
            short: self.short,
        })
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.check()?;
        let devices = &mut self.channels[self.channel];
        self.phase = match self.phase {
            Phase::RomCommand => match byte {
                ONEWIRE_MATCH_ROM_CMD => Phase::Match(0),
                ONEWIRE_SKIP_ROM_CMD => Phase::Function,
                ONEWIRE_READ_ROM_CMD => Phase::ReadRom(0),
                ONEWIRE_SEARCH_CMD => Phase::Search(0, SearchStep::IdBit),
                ONEWIRE_CONDITIONAL_SEARCH_CMD => {
                    for (dev, sel) in devices.iter().zip(self.selected.iter_mut()) {
                        *sel &= dev.alarmed();
                    }
                    Phase::Search(0, SearchStep::IdBit)
                }
                _ => Phase::Idle,
            },
            Phase::Match(index) => {
                for (dev, sel) in devices.iter().zip(self.selected.iter_mut()) {
                    *sel &= dev.rom()[index] == byte;
                }
                if index == 7 {
                    Phase::Function
                } else {
                    Phase::Match(index + 1)
                }
            }
            Phase::Function => {
                for (dev, _) in devices
                    .iter_mut()
                    .zip(self.selected.iter())
                    .filter(|(_, sel)| **sel)
                {
                    dev.write_byte(byte);
                }
                Phase::Function
            }
            phase => phase,
        };
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        self.check()?;
        let devices = &mut self.channels[self.channel];
        let selected = devices
            .iter_mut()
            .zip(self.selected.iter())
            .filter(|(_, sel)| **sel);
        Ok(match self.phase {
            Phase::ReadRom(index) => {
                self.phase = if index == 7 {
                    Phase::Idle
                } else {
                    Phase::ReadRom(index + 1)
                };
                selected.fold(0xff, |acc, (dev, _)| acc & dev.rom()[index])
            }
            Phase::Function => selected.fold(0xff, |acc, (dev, _)| acc & dev.read_byte()),
            _ => 0xff,
        })
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.check()?;
        match self.phase {
            Phase::Search(n, SearchStep::Direction) => {
                self.search_select(n, bit);
                self.phase = if n == 63 {
                    Phase::Function
                } else {
                    Phase::Search(n + 1, SearchStep::IdBit)
                };
            }
            Phase::Function => {
                for (dev, _) in self.channels[self.channel]
                    .iter_mut()
                    .zip(self.selected.iter())
                    .filter(|(_, sel)| **sel)
                {
                    dev.write_bit(bit);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        self.check()?;
        Ok(match self.phase {
            Phase::Search(n, SearchStep::IdBit) => {
                self.phase = Phase::Search(n, SearchStep::ComplementBit);
                self.search_slots(n).0
            }
            Phase::Search(n, SearchStep::ComplementBit) => {
                self.phase = Phase::Search(n, SearchStep::Direction);
                self.search_slots(n).1
            }
            Phase::Function => self.channels[self.channel]
                .iter_mut()
                .zip(self.selected.iter())
                .filter(|(_, sel)| **sel)
                .fold(true, |acc, (dev, _)| acc & dev.read_bit()),
            _ => true,
        })
    }

    fn channels(&self) -> u8 {
        self.channels.len() as u8
    }

    fn channel(&self) -> u8 {
        self.channel as u8
    }

    fn set_channel(&mut self, channel: u8) -> OneWireResult<(), Self::BusError> {
        self.check()?;
        if channel as usize >= self.channels.len() {
            return Err(OneWireError::InvalidChannel(channel));
        }
        self.channel = channel as usize;
        self.phase = Phase::Idle;
        Ok(())
    }

    fn set_strong_pullup(&mut self, enable: bool) -> OneWireResult<(), Self::BusError> {
        self.check()?;
        if enable {
            self.strong_pullup_count += 1;
        }
        self.strong_pullup = enable;
        Ok(())
    }
}
