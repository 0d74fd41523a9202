use crate::{
    ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_SEARCH_CMD, OneWire, OneWireResult,
    Presence, RomCode, error::OneWireError,
};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Type of search performed using [`SearchState`] or [`OneWireSearch`].
pub enum OneWireSearchKind {
    /// Normal search
    Normal = ONEWIRE_SEARCH_CMD,
    /// Search only for devices with alarm
    Alarmed = ONEWIRE_CONDITIONAL_SEARCH_CMD,
}

/// Iteration state of the [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html).
///
/// The state is detached from the bus so it can be carried across other
/// transactions (reading a scratchpad between two search calls, switching
/// channels). A fresh state is `done`; the next call to
/// [`next`](SearchState::next) starts a new enumeration pass.
#[derive(Debug, Clone)]
pub struct SearchState {
    kind: OneWireSearchKind,
    family: Option<u8>,
    rom: [u8; 8],
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    done: bool,
}

impl SearchState {
    /// Creates a new [`SearchState`] that enumerates every device.
    ///
    /// # Arguments
    /// * `kind` - Normal search, or search for devices in alarm state.
    pub fn new(kind: OneWireSearchKind) -> Self {
        Self {
            kind,
            family: None,
            rom: [0; 8],
            last_discrepancy: 0,
            last_family_discrepancy: 0,
            done: true,
        }
    }

    /// Creates a new [`SearchState`] that only reports devices of one family.
    ///
    /// The first pass is steered straight to the family's subtree, so
    /// the family's devices come out before the search is given up.
    pub fn with_family(kind: OneWireSearchKind, family: u8) -> Self {
        Self {
            family: Some(family),
            ..Self::new(kind)
        }
    }

    /// True once the last pass found no unexplored branch, or failed.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Bit position (1-64) of the branch the next pass will explore, 0 if none.
    #[inline]
    pub fn last_discrepancy(&self) -> u8 {
        self.last_discrepancy
    }

    /// Forces the next call to start a new enumeration pass.
    pub fn reset(&mut self) {
        self.done = true;
    }

    fn restart(&mut self) {
        self.rom = [0; 8];
        self.last_family_discrepancy = 0;
        match self.family {
            Some(family) => {
                self.rom[0] = family;
                // Replay the family byte, force a 1 at the last bit.
                self.last_discrepancy = 64;
            }
            None => self.last_discrepancy = 0,
        }
        self.done = false;
    }

    /// Skips the remaining devices of the family found last.
    ///
    /// The next call continues with the first device of another family.
    pub fn skip_family(&mut self) {
        self.last_discrepancy = self.last_family_discrepancy;
        self.last_family_discrepancy = 0;
        if self.last_discrepancy == 0 {
            self.done = true;
        }
    }

    /// Runs one search pass and returns the next ROM code.
    ///
    /// Callers loop until [`is_done`](SearchState::is_done) is true. If the
    /// state is already done, a new enumeration pass is started.
    ///
    /// # Returns
    /// * `Ok(Some(rom))` - next device, CRC checked.
    /// * `Ok(None)` - nobody took part in the search, or the device found
    ///   belongs to another family than the filter. The state is done.
    ///
    /// # Errors
    /// Any error marks the state done. [`OneWireError::InvalidCrc`] and
    /// [`OneWireError::SearchError`] mean the bits collected in this pass
    /// were corrupted and have been discarded.
    pub fn next<T: OneWire + ?Sized>(
        &mut self,
        onewire: &mut T,
    ) -> OneWireResult<Option<RomCode>, T::BusError> {
        if self.done {
            self.restart();
        }
        let res = self.search_pass(onewire);
        if !matches!(res, Ok(Some(_))) {
            self.done = true;
        }
        res
    }

    fn search_pass<T: OneWire + ?Sized>(
        &mut self,
        onewire: &mut T,
    ) -> OneWireResult<Option<RomCode>, T::BusError> {
        match onewire.presence()? {
            Presence::DevicePresent => {}
            Presence::NoDevice => return Err(OneWireError::NoDevicePresent),
            Presence::ShortCircuit => return Err(OneWireError::ShortCircuit),
        }
        onewire.write_byte(self.kind as u8)?; // Search ROM command
        let mut last_zero: u8 = 0;
        for id_bit_num in 1..=64u8 {
            let idx = ((id_bit_num - 1) >> 3) as usize; // Index in the ROM array
            let rom_mask = 1u8 << ((id_bit_num - 1) & 7); // Mask for the current bit in the ROM byte
            // Determine the direction of the search
            let dir = if id_bit_num < self.last_discrepancy {
                self.rom[idx] & rom_mask > 0
            } else {
                id_bit_num == self.last_discrepancy
            };
            let (id_bit, complement_bit, taken) = onewire.read_triplet(dir)?;
            if id_bit && complement_bit {
                // Nobody drove the line low for either value
                return if id_bit_num == 1 {
                    Ok(None)
                } else {
                    Err(OneWireError::SearchError)
                };
            }
            if !id_bit && !complement_bit && !taken {
                last_zero = id_bit_num;
                if last_zero < 9 {
                    self.last_family_discrepancy = last_zero;
                }
            }
            if taken {
                self.rom[idx] |= rom_mask;
            } else {
                self.rom[idx] &= !rom_mask;
            }
        }
        let Some(rom) = RomCode::from_bytes(self.rom) else {
            return Err(OneWireError::InvalidCrc);
        };
        if self.family.is_some_and(|family| family != rom.family()) {
            return Ok(None);
        }
        self.last_discrepancy = last_zero;
        self.done = self.last_discrepancy == 0;
        Ok(Some(rom))
    }

    /// Verifies if the device with the given ROM code is present on the 1-Wire bus.
    ///
    /// Runs a single pass steered along `rom`. The state is left done, so
    /// the next call to [`next`](SearchState::next) starts a new enumeration.
    pub fn verify<T: OneWire + ?Sized>(
        &mut self,
        onewire: &mut T,
        rom: &RomCode,
    ) -> OneWireResult<bool, T::BusError> {
        self.rom = *rom.as_bytes(); // Set the ROM to verify
        self.last_discrepancy = 64;
        self.last_family_discrepancy = 0;
        self.done = false;
        let res = self.search_pass(onewire);
        self.done = true;
        Ok(res? == Some(*rom))
    }
}

/// A structure for searching devices on a 1-Wire bus.
///
/// Borrows the bus for the duration of one enumeration and, unlike a bare
/// [`SearchState`], returns `None` at the end instead of starting over.
pub struct OneWireSearch<'a, T: ?Sized> {
    onewire: &'a mut T,
    state: SearchState,
    started: bool,
}

impl<'a, T: ?Sized> OneWireSearch<'a, T> {
    /// Creates a new [`OneWireSearch`] instance.
    ///
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    /// * `cmd` - The kind of search to perform.
    pub fn new(onewire: &'a mut T, cmd: OneWireSearchKind) -> Self {
        Self {
            onewire,
            state: SearchState::new(cmd),
            started: false,
        }
    }

    /// Creates a new [`OneWireSearch`] instance with a specific family code.
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    /// * `cmd` - The kind of search to perform.
    /// * `family` - The family code of the devices to search for.
    pub fn with_family(onewire: &'a mut T, cmd: OneWireSearchKind, family: u8) -> Self {
        Self {
            onewire,
            state: SearchState::with_family(cmd, family),
            started: false,
        }
    }
}

impl<T: OneWire + ?Sized> OneWireSearch<'_, T> {
    /// Returns the next device, or `None` once every device has been reported.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> OneWireResult<Option<RomCode>, T::BusError> {
        if self.started && self.state.is_done() {
            return Ok(None);
        }
        self.started = true;
        self.state.next(&mut *self.onewire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RomDevice, SimulatedBus, rom_with_crc};
    use rand::Rng;
    use std::vec::Vec;

    fn random_roms(count: usize, families: &[u8]) -> Vec<[u8; 8]> {
        let mut rng = rand::rng();
        let mut roms: Vec<[u8; 8]> = Vec::new();
        while roms.len() < count {
            let family = families[rng.random_range(0..families.len())];
            let mut serial = [0u8; 6];
            rng.fill(&mut serial);
            let rom = rom_with_crc(family, serial);
            if !roms.contains(&rom) {
                roms.push(rom);
            }
        }
        roms
    }

    fn bus_with(roms: &[[u8; 8]]) -> SimulatedBus<RomDevice> {
        SimulatedBus::new(roms.iter().map(|&rom| RomDevice::new(rom)).collect())
    }

    fn enumerate(
        bus: &mut SimulatedBus<RomDevice>,
        state: &mut SearchState,
    ) -> Vec<[u8; 8]> {
        let mut found = Vec::new();
        loop {
            if let Some(rom) = state.next(bus).unwrap() {
                found.push(*rom.as_bytes());
            }
            if state.is_done() {
                break;
            }
            assert!(found.len() <= 64, "search does not terminate");
        }
        found
    }

    #[test]
    fn enumerates_every_device_once() {
        for count in [1, 2, 3, 7, 20] {
            let roms = random_roms(count, &[0x28, 0x10, 0x42, 0x01]);
            let mut bus = bus_with(&roms);
            let mut state = SearchState::new(OneWireSearchKind::Normal);
            let mut found = enumerate(&mut bus, &mut state);
            assert_eq!(found.len(), count);
            found.sort();
            found.dedup();
            assert_eq!(found.len(), count);
            for rom in roms.iter() {
                assert!(found.contains(rom));
            }
        }
    }

    #[test]
    fn family_filter_only_reports_family() {
        let mut roms = random_roms(6, &[0x28]);
        roms.extend(random_roms(6, &[0x10, 0x3b, 0x42]));
        let mut bus = bus_with(&roms);
        let mut state = SearchState::with_family(OneWireSearchKind::Normal, 0x28);
        let found = enumerate(&mut bus, &mut state);
        assert_eq!(found.len(), 6);
        for rom in roms.iter().filter(|r| r[0] == 0x28) {
            assert!(found.contains(rom));
        }
    }

    #[test]
    fn family_filter_without_match_finds_nothing() {
        let roms = random_roms(4, &[0x10]);
        let mut bus = bus_with(&roms);
        let mut state = SearchState::with_family(OneWireSearchKind::Normal, 0x28);
        assert_eq!(state.next(&mut bus).unwrap(), None);
        assert!(state.is_done());
    }

    #[test]
    fn restarts_after_done() {
        let roms = random_roms(3, &[0x28]);
        let mut bus = bus_with(&roms);
        let mut state = SearchState::new(OneWireSearchKind::Normal);
        let first = enumerate(&mut bus, &mut state);
        let second = enumerate(&mut bus, &mut state);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_bus_reports_no_device() {
        let mut bus = bus_with(&[]);
        let mut state = SearchState::new(OneWireSearchKind::Normal);
        assert_eq!(state.next(&mut bus), Err(OneWireError::NoDevicePresent));
        assert!(state.is_done());
    }

    #[test]
    fn shorted_bus_aborts() {
        let roms = random_roms(2, &[0x28]);
        let mut bus = bus_with(&roms);
        bus.set_short(true);
        let mut state = SearchState::new(OneWireSearchKind::Normal);
        assert_eq!(state.next(&mut bus), Err(OneWireError::ShortCircuit));
        assert!(state.is_done());
    }

    #[test]
    fn timeout_marks_done() {
        let roms = random_roms(2, &[0x28]);
        let mut bus = bus_with(&roms);
        let mut state = SearchState::new(OneWireSearchKind::Normal);
        bus.set_timeout(true);
        assert_eq!(state.next(&mut bus), Err(OneWireError::Timeout));
        assert!(state.is_done());
    }

    #[test]
    fn lost_device_is_never_reported() {
        let roms = random_roms(8, &[0x28]);
        let mut bus = bus_with(&roms);
        let mut state = SearchState::new(OneWireSearchKind::Normal);
        let first = state.next(&mut bus).unwrap().unwrap();
        // Pull the device that the next pass would report.
        let mut probe = state.clone();
        let victim = *probe.next(&mut bus).unwrap().unwrap().as_bytes();
        assert!(bus.remove(0, &victim).is_some());

        let mut found = Vec::from([*first.as_bytes()]);
        let mut passes = 0;
        while !state.is_done() {
            passes += 1;
            assert!(passes <= 64, "search does not terminate");
            match state.next(&mut bus) {
                Ok(Some(rom)) => found.push(*rom.as_bytes()),
                Ok(None) => {}
                Err(e) => assert_eq!(e, OneWireError::SearchError),
            }
        }
        assert!(!found.contains(&victim));
    }

    #[test]
    fn vanishing_mid_pass_is_a_search_error() {
        let roms = random_roms(1, &[0x28]);
        let mut bus = bus_with(&roms);
        bus.drop_after_bits(10);
        let mut state = SearchState::new(OneWireSearchKind::Normal);
        assert_eq!(state.next(&mut bus), Err(OneWireError::SearchError));
        assert!(state.is_done());
    }

    #[test]
    fn alarm_search_only_reports_alarmed_devices() {
        let roms = random_roms(5, &[0x28]);
        let mut devices: Vec<RomDevice> = roms.iter().map(|&r| RomDevice::new(r)).collect();
        devices[1].alarmed = true;
        devices[3].alarmed = true;
        let mut bus = SimulatedBus::new(devices);
        let mut state = SearchState::new(OneWireSearchKind::Alarmed);
        let mut found = enumerate(&mut bus, &mut state);
        found.sort();
        let mut expected = Vec::from([roms[1], roms[3]]);
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn skip_family_jumps_to_next_family() {
        let mut roms = random_roms(3, &[0x10]);
        roms.extend(random_roms(3, &[0x28]));
        let mut bus = bus_with(&roms);
        let mut state = SearchState::new(OneWireSearchKind::Normal);
        let first = state.next(&mut bus).unwrap().unwrap();
        state.skip_family();
        let mut rest = Vec::new();
        while !state.is_done() {
            if let Some(rom) = state.next(&mut bus).unwrap() {
                rest.push(rom);
            }
        }
        assert!(rest.iter().all(|rom| rom.family() != first.family()));
        assert_eq!(rest.len(), 3);
    }

    #[test]
    fn verify_finds_present_device_only() {
        let roms = random_roms(4, &[0x28]);
        let mut bus = bus_with(&roms);
        let mut state = SearchState::new(OneWireSearchKind::Normal);
        let present = RomCode::from_bytes(roms[2]).unwrap();
        assert!(state.verify(&mut bus, &present).unwrap());
        let absent = RomCode::from_bytes(rom_with_crc(0x28, [9, 9, 9, 9, 9, 9])).unwrap();
        if !roms.contains(absent.as_bytes()) {
            assert!(!state.verify(&mut bus, &absent).unwrap());
        }
        assert!(state.is_done());
    }

    #[test]
    fn borrowing_search_stops_at_the_end() {
        let roms = random_roms(5, &[0x28, 0x10]);
        let mut bus = bus_with(&roms);
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        let mut count = 0;
        while let Some(_rom) = search.next().unwrap() {
            count += 1;
        }
        assert_eq!(count, 5);
        assert_eq!(search.next().unwrap(), None);
    }
}
