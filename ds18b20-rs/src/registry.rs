use crate::{
    DS18B20_FAMILY, DeviceConfig, DeviceRecord, NonVolatileStore, RegistryError, StoreError,
    Target, power_mode, read_scratchpad,
};
use embedded_onewire::{OneWire, OneWireError, OneWireResult, OneWireSearchKind, RomCode, SearchState};
use log::{debug, info, warn};

/// Progress of a [`DeviceScan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Not started.
    Idle,
    /// Enumerating a channel.
    Searching(u8),
    /// A device was just reported on a channel.
    Found(u8, RomCode),
    /// Every channel has been enumerated.
    Exhausted,
    /// The bus failed; the scan is over.
    Error,
}

/// One enumeration pass over every channel of a bus.
///
/// Empty channels are skipped. A pass that is corrupted by noise or by a
/// device leaving the bus ends that channel's enumeration; any other bus
/// error ends the scan.
pub struct DeviceScan<'a, T: ?Sized> {
    bus: &'a mut T,
    search: SearchState,
    state: ScanState,
}

impl<'a, T: OneWire + ?Sized> DeviceScan<'a, T> {
    /// Prepares a scan, optionally restricted to one family.
    pub fn new(bus: &'a mut T, family: Option<u8>) -> Self {
        let search = match family {
            Some(family) => SearchState::with_family(OneWireSearchKind::Normal, family),
            None => SearchState::new(OneWireSearchKind::Normal),
        };
        Self {
            bus,
            search,
            state: ScanState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// The scanned bus. Other transactions may be run between calls to
    /// [`next`](DeviceScan::next) as long as the channel is left alone.
    pub fn bus(&mut self) -> &mut T {
        &mut *self.bus
    }

    /// Next device and the channel it sits on, `None` once exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> OneWireResult<Option<(u8, RomCode)>, T::BusError> {
        loop {
            let state = self.state;
            let channel = match state {
                ScanState::Idle => {
                    self.enter(0)?;
                    0
                }
                ScanState::Searching(ch) => ch,
                ScanState::Found(ch, _) if self.search.is_done() => {
                    self.advance(ch)?;
                    continue;
                }
                ScanState::Found(ch, _) => ch,
                ScanState::Exhausted | ScanState::Error => return Ok(None),
            };
            match self.search.next(&mut *self.bus) {
                Ok(Some(rom)) => {
                    self.state = ScanState::Found(channel, rom);
                    return Ok(Some((channel, rom)));
                }
                Ok(None) => self.advance(channel)?,
                Err(OneWireError::NoDevicePresent) => {
                    debug!("channel {channel}: no devices");
                    self.advance(channel)?;
                }
                Err(OneWireError::InvalidCrc) => {
                    warn!("channel {channel}: CRC error, rest of the pass discarded");
                    self.advance(channel)?;
                }
                Err(OneWireError::SearchError) => {
                    warn!("channel {channel}: device lost during search, rest of the pass discarded");
                    self.advance(channel)?;
                }
                Err(e) => {
                    self.state = ScanState::Error;
                    return Err(e);
                }
            }
        }
    }

    fn enter(&mut self, channel: u8) -> OneWireResult<(), T::BusError> {
        if let Err(e) = self.bus.set_channel(channel) {
            self.state = ScanState::Error;
            return Err(e);
        }
        self.search.reset();
        self.state = ScanState::Searching(channel);
        Ok(())
    }

    fn advance(&mut self, channel: u8) -> OneWireResult<(), T::BusError> {
        if channel + 1 < self.bus.channels() {
            self.enter(channel + 1)
        } else {
            self.state = ScanState::Exhausted;
            Ok(())
        }
    }
}

/// Result of [`Registry::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The sensor did not answer on any channel. The record is left as is.
    Missing,
    /// The sensor answered and matches its record.
    Unchanged,
    /// The sensor answered with a different channel, power mode or
    /// resolution; the record has been rewritten.
    Updated(DeviceRecord),
}

/// Sensor registry persisted in a [`NonVolatileStore`].
///
/// The last byte of the store holds the number of records. Record `n`
/// (1-based) occupies the nine bytes at `capacity - 1 - 9 * n`, so
/// the registry grows downwards from the end of the memory. Records
/// may use at most `max_alloc` bytes, half of the memory by default.
pub struct Registry<S> {
    store: S,
    total: u8,
    max_alloc: usize,
}

impl<S: NonVolatileStore> Registry<S> {
    /// Opens the registry kept in `store`.
    ///
    /// A count that cannot fit the allocation (an erased memory reads
    /// 0xFF) is taken as an empty registry.
    pub fn new(store: S) -> Result<Self, StoreError<S::Error>> {
        let e2end = store.capacity().saturating_sub(1);
        let mut reg = Self {
            store,
            total: 0,
            max_alloc: e2end >> 1,
        };
        let mut count = [0];
        reg.store.read(e2end, &mut count)?;
        reg.total = count[0];
        reg.clamp_total();
        Ok(reg)
    }

    /// Sets the number of bytes records may use.
    pub fn with_max_alloc(mut self, max_alloc: usize) -> Self {
        self.max_alloc = max_alloc.min(self.e2end());
        self.clamp_total();
        self
    }

    fn clamp_total(&mut self) {
        if self.total as usize * DeviceRecord::SIZE > self.max_alloc {
            warn!("registry count {} does not fit, starting empty", self.total);
            self.total = 0;
        }
    }

    fn e2end(&self) -> usize {
        self.store.capacity().saturating_sub(1)
    }

    fn offset(&self, n: u8) -> usize {
        self.e2end() - n as usize * DeviceRecord::SIZE
    }

    /// Number of registered sensors.
    pub fn total(&self) -> u8 {
        self.total
    }

    /// Number of records the allocation can hold.
    pub fn capacity(&self) -> usize {
        (self.max_alloc / DeviceRecord::SIZE).min(u8::MAX as usize)
    }

    /// Backing store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Releases the backing store.
    pub fn into_inner(self) -> S {
        self.store
    }

    /// Forgets every record. Only the count is rewritten.
    pub fn reset(&mut self) -> Result<(), StoreError<S::Error>> {
        let e2end = self.e2end();
        self.store.write(e2end, &[0])?;
        self.total = 0;
        Ok(())
    }

    /// Loads record `n` (1-based).
    pub fn load(&mut self, n: u8) -> Result<DeviceRecord, StoreError<S::Error>> {
        if n == 0 || n > self.total {
            return Err(StoreError::InvalidIndex(n));
        }
        let mut bytes = [0; DeviceRecord::SIZE];
        let offset = self.offset(n);
        self.store.read(offset, &mut bytes)?;
        DeviceRecord::from_bytes(&bytes).ok_or(StoreError::InvalidCrc)
    }

    /// Writes record `n` (1-based). `n = total + 1` appends a record.
    ///
    /// # Errors
    /// [`StoreError::EepromFull`] if the record does not fit the
    /// allocation, [`StoreError::InvalidCrc`] if its ROM code is the
    /// placeholder default. Nothing is written in either case.
    pub fn store(&mut self, n: u8, rec: &DeviceRecord) -> Result<(), StoreError<S::Error>> {
        if n == 0 || n as usize > self.total as usize + 1 {
            return Err(StoreError::InvalidIndex(n));
        }
        if RomCode::from_bytes(*rec.rom.as_bytes()).is_none() {
            return Err(StoreError::InvalidCrc);
        }
        if n as usize * DeviceRecord::SIZE > self.max_alloc {
            return Err(StoreError::EepromFull);
        }
        let offset = self.offset(n);
        self.store.write(offset, &rec.to_bytes())?;
        if n > self.total {
            let e2end = self.e2end();
            self.store.write(e2end, &[n])?;
            self.total = n;
        }
        Ok(())
    }

    /// Appends a record and returns its index.
    pub fn push(&mut self, rec: &DeviceRecord) -> Result<u8, StoreError<S::Error>> {
        let n = self.total.checked_add(1).ok_or(StoreError::EepromFull)?;
        self.store(n, rec)?;
        Ok(n)
    }

    /// Index of the record holding `rom`.
    pub fn find(&mut self, rom: &RomCode) -> Result<Option<u8>, StoreError<S::Error>> {
        let mut stored = [0; 8];
        for n in 1..=self.total {
            let offset = self.offset(n);
            self.store.read(offset, &mut stored)?;
            if stored.iter().zip(rom.as_bytes()).all(|(a, b)| a == b) {
                return Ok(Some(n));
            }
        }
        Ok(None)
    }

    /// Starts a scan for DS18B20 sensors over every channel of `bus`.
    pub fn scan<'b, T: OneWire + ?Sized>(&self, bus: &'b mut T) -> DeviceScan<'b, T> {
        DeviceScan::new(bus, Some(DS18B20_FAMILY))
    }

    /// Collects the sensors on `bus` that are not registered yet.
    ///
    /// Each new sensor's power mode and resolution are read to build its
    /// record; sensors whose scratchpad fails its CRC, or that leave the
    /// bus before they are read, are skipped. The
    /// registry itself is not modified. Returns the number of records
    /// written to `out`.
    pub fn discover_new<T: OneWire + ?Sized>(
        &mut self,
        bus: &mut T,
        out: &mut [DeviceRecord],
    ) -> Result<usize, RegistryError<T::BusError, S::Error>> {
        let mut found = 0;
        if out.is_empty() {
            return Ok(0);
        }
        let mut scan = self.scan(bus);
        while let Some((channel, rom)) = scan.next()? {
            if self.find(&rom)?.is_some() || out[..found].iter().any(|rec| rec.rom == rom) {
                continue;
            }
            let rec = DeviceRecord::new(rom, DeviceConfig::new().with_channel(channel));
            let rec = match probe(scan.bus(), rec) {
                Ok(rec) => rec,
                Err(OneWireError::InvalidCrc) => {
                    warn!("sensor {rom}: scratchpad CRC error, skipped");
                    continue;
                }
                Err(OneWireError::NoDevicePresent) => {
                    warn!("sensor {rom}: gone before it could be read, skipped");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            info!(
                "new sensor {rom} on channel {channel} ({}, {:?})",
                if rec.config.powered() { "powered" } else { "parasitic" },
                rec.config.resolution()
            );
            out[found] = rec;
            found += 1;
            if found == out.len() {
                break;
            }
        }
        Ok(found)
    }

    /// Checks that sensor `n` is still reachable and its record up to date.
    ///
    /// Starting from the stored channel, every channel is tried once.
    pub fn verify<T: OneWire + ?Sized>(
        &mut self,
        bus: &mut T,
        n: u8,
    ) -> Result<VerifyOutcome, RegistryError<T::BusError, S::Error>> {
        let stored = self.load(n)?;
        let channels = bus.channels().max(1);
        let start = stored.config.channel() % channels;
        for i in 0..channels {
            let channel = (start + i) % channels;
            let mut rec = stored;
            rec.config.set_channel(channel);
            let live = match probe(bus, rec) {
                Ok(live) => live,
                Err(OneWireError::NoDevicePresent | OneWireError::InvalidCrc) => continue,
                Err(e) => return Err(e.into()),
            };
            if live == stored {
                debug!("sensor {n} ({}) unchanged", stored.rom);
                return Ok(VerifyOutcome::Unchanged);
            }
            self.store(n, &live)?;
            info!(
                "sensor {n} ({}) updated: {:?} -> {:?}",
                stored.rom, stored.config, live.config
            );
            return Ok(VerifyOutcome::Updated(live));
        }
        warn!("sensor {n} ({}) missing", stored.rom);
        Ok(VerifyOutcome::Missing)
    }
}

// Reads the live configuration of the sensor addressed by `rec`.
fn probe<T: OneWire + ?Sized>(
    bus: &mut T,
    mut rec: DeviceRecord,
) -> OneWireResult<DeviceRecord, T::BusError> {
    let scratchpad = read_scratchpad(bus, &rec)?;
    rec.config.set_resolution(scratchpad.resolution());
    rec.config.set_powered(power_mode(bus, Target::Device(&rec))?);
    Ok(rec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStore, Resolution, sim::SimSensor};
    use core::convert::Infallible;
    use embedded_onewire::sim::{RomDevice, SimStatus, SimulatedBus, rom_with_crc};
    use std::{vec, vec::Vec};

    fn rom(serial: u8) -> RomCode {
        RomCode::from_bytes(rom_with_crc(0x28, [serial, 1, 2, 3, 4, 5])).unwrap()
    }

    fn rec(serial: u8, channel: u8) -> DeviceRecord {
        DeviceRecord::new(
            rom(serial),
            DeviceConfig::new()
                .with_powered(true)
                .with_channel(channel)
                .with_resolution(Resolution::Twelve),
        )
    }

    fn sensor_rom(sensor: &SimSensor) -> RomCode {
        RomCode::from_bytes(sensor.rom_bytes()).unwrap()
    }

    #[test]
    fn blank_store_is_empty() {
        let reg = Registry::new(MemoryStore::<1024>::new()).unwrap();
        assert_eq!(reg.total(), 0);
        assert_eq!(reg.capacity(), 56);
    }

    #[test]
    fn layout_matches_eeprom_image() {
        let mut reg = Registry::new(MemoryStore::<64>::new()).unwrap();
        let first = rec(1, 3);
        assert_eq!(reg.push(&first), Ok(1));
        let image = reg.inner().as_bytes();
        assert_eq!(image[63], 1);
        assert_eq!(&image[54..62], first.rom.as_bytes());
        assert_eq!(image[62], first.config.into_bits());
    }

    #[test]
    fn round_trip_any_index() {
        let mut reg = Registry::new(MemoryStore::<256>::new()).unwrap();
        let records: Vec<DeviceRecord> = (1..=10).map(|i| rec(i, i % 8)).collect();
        for (i, r) in records.iter().enumerate() {
            reg.store(i as u8 + 1, r).unwrap();
        }
        assert_eq!(reg.total(), 10);
        for (i, r) in records.iter().enumerate() {
            assert_eq!(reg.load(i as u8 + 1), Ok(*r));
        }
        // Overwrite in place.
        let replaced = rec(99, 0);
        reg.store(4, &replaced).unwrap();
        assert_eq!(reg.total(), 10);
        assert_eq!(reg.load(4), Ok(replaced));
        assert_eq!(reg.load(5), Ok(records[4]));
        // Reopen from the same memory.
        let mut reg = Registry::new(reg.into_inner()).unwrap();
        assert_eq!(reg.total(), 10);
        assert_eq!(reg.load(10), Ok(records[9]));
    }

    #[test]
    fn placeholder_record_is_never_stored() {
        let mut reg = Registry::new(MemoryStore::<64>::new()).unwrap();
        let blank = reg.inner().clone();
        assert_eq!(reg.push(&DeviceRecord::default()), Err(StoreError::InvalidCrc));
        assert_eq!(reg.total(), 0);
        assert_eq!(reg.inner(), &blank);
        reg.push(&rec(1, 0)).unwrap();
        assert_eq!(reg.store(1, &DeviceRecord::default()), Err(StoreError::InvalidCrc));
        assert_eq!(reg.load(1), Ok(rec(1, 0)));
    }

    #[test]
    fn rejects_bad_indices() {
        let mut reg = Registry::new(MemoryStore::<256>::new()).unwrap();
        reg.push(&rec(1, 0)).unwrap();
        assert_eq!(reg.load(0), Err(StoreError::InvalidIndex(0)));
        assert_eq!(reg.load(2), Err(StoreError::InvalidIndex(2)));
        assert_eq!(reg.store(0, &rec(2, 0)), Err(StoreError::InvalidIndex(0)));
        assert_eq!(reg.store(3, &rec(2, 0)), Err(StoreError::InvalidIndex(3)));
    }

    #[test]
    fn full_allocation_leaves_store_untouched() {
        // 64 bytes: E2END = 63, allocation 31 bytes, three records.
        let mut reg = Registry::new(MemoryStore::<64>::new()).unwrap();
        assert_eq!(reg.capacity(), 3);
        for i in 1..=3 {
            assert_eq!(reg.push(&rec(i, 0)), Ok(i));
        }
        let before = reg.inner().clone();
        assert_eq!(reg.push(&rec(4, 0)), Err(StoreError::EepromFull));
        assert_eq!(reg.store(4, &rec(4, 0)), Err(StoreError::EepromFull));
        assert_eq!(reg.inner(), &before);
        assert_eq!(reg.total(), 3);
    }

    #[test]
    fn custom_allocation() {
        let mut reg = Registry::new(MemoryStore::<64>::new())
            .unwrap()
            .with_max_alloc(18);
        reg.push(&rec(1, 0)).unwrap();
        reg.push(&rec(2, 0)).unwrap();
        assert_eq!(reg.push(&rec(3, 0)), Err(StoreError::EepromFull));
    }

    #[test]
    fn oversized_count_reads_as_empty() {
        let mut image = [0xff; 64];
        image[63] = 4;
        let reg = Registry::new(MemoryStore::from_bytes(image)).unwrap();
        assert_eq!(reg.total(), 0);
    }

    #[test]
    fn corrupted_rom_is_reported() {
        let mut reg = Registry::new(MemoryStore::<64>::new()).unwrap();
        reg.push(&rec(1, 0)).unwrap();
        let mut image = *reg.inner().as_bytes();
        image[56] ^= 0x01;
        let mut reg = Registry::new(MemoryStore::from_bytes(image)).unwrap();
        assert_eq!(reg.load(1), Err(StoreError::InvalidCrc));
    }

    #[test]
    fn find_and_reset() {
        let mut reg = Registry::new(MemoryStore::<128>::new()).unwrap();
        for i in 1..=4 {
            reg.push(&rec(i, 0)).unwrap();
        }
        assert_eq!(reg.find(&rom(3)), Ok(Some(3)));
        assert_eq!(reg.find(&rom(7)), Ok(None));
        reg.reset().unwrap();
        assert_eq!(reg.total(), 0);
        assert_eq!(reg.find(&rom(3)), Ok(None));
        let reg = Registry::new(reg.into_inner()).unwrap();
        assert_eq!(reg.total(), 0);
    }

    #[test]
    fn scan_walks_every_channel() {
        let mut bus = SimulatedBus::with_channels(vec![
            vec![SimSensor::new(1), SimSensor::new(2)],
            Vec::new(),
            vec![SimSensor::new(3)],
        ]);
        let reg = Registry::new(MemoryStore::<64>::new()).unwrap();
        let mut scan = reg.scan(&mut bus);
        let mut found = Vec::new();
        while let Some((channel, rom)) = scan.next().unwrap() {
            found.push((channel, rom));
        }
        assert_eq!(scan.state(), ScanState::Exhausted);
        assert_eq!(found.len(), 3);
        assert_eq!(found.iter().filter(|(ch, _)| *ch == 0).count(), 2);
        assert!(found.contains(&(2, sensor_rom(&SimSensor::new(3)))));
        assert_eq!(scan.next(), Ok(None));
    }

    #[test]
    fn scan_skips_other_families() {
        let other = RomDevice::new(rom_with_crc(0x10, [7; 6]));
        let ds = RomDevice::new(*rom(1).as_bytes());
        let mut bus = SimulatedBus::new(vec![other, ds]);
        let mut scan = DeviceScan::new(&mut bus, Some(DS18B20_FAMILY));
        assert_eq!(scan.next(), Ok(Some((0, rom(1)))));
        assert_eq!(scan.next(), Ok(None));
        let mut scan = DeviceScan::new(&mut bus, None);
        let mut count = 0;
        while scan.next().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn scan_stops_on_bus_failure() {
        let mut bus = SimulatedBus::new(vec![SimSensor::new(1)]);
        bus.set_timeout(true);
        let mut scan = DeviceScan::new(&mut bus, None);
        assert_eq!(scan.next(), Err(OneWireError::Timeout));
        assert_eq!(scan.state(), ScanState::Error);
        assert_eq!(scan.next(), Ok(None));
    }

    #[test]
    fn discover_reports_only_new_sensors() {
        let parasitic = SimSensor::new(2)
            .parasitic()
            .with_config(Resolution::Ten.config_byte());
        let mut bus = SimulatedBus::with_channels(vec![
            vec![SimSensor::new(1), parasitic],
            vec![SimSensor::new(3)],
        ]);
        let mut reg = Registry::new(MemoryStore::<1024>::new()).unwrap();
        let mut out = [DeviceRecord::default(); 8];
        let n = reg.discover_new(&mut bus, &mut out).unwrap();
        assert_eq!(n, 3);
        let new = &out[..n];
        let p = new
            .iter()
            .find(|r| r.rom == sensor_rom(&SimSensor::new(2)))
            .unwrap();
        assert!(!p.config.powered());
        assert_eq!(p.config.channel(), 0);
        assert_eq!(p.config.resolution(), Resolution::Ten);
        let c = new
            .iter()
            .find(|r| r.rom == sensor_rom(&SimSensor::new(3)))
            .unwrap();
        assert!(c.config.powered());
        assert_eq!(c.config.channel(), 1);
        assert_eq!(reg.total(), 0);

        for rec in new.iter() {
            reg.push(rec).unwrap();
        }
        assert_eq!(reg.discover_new(&mut bus, &mut out), Ok(0));

        bus.push(1, SimSensor::new(4));
        assert_eq!(reg.discover_new(&mut bus, &mut out), Ok(1));
        assert_eq!(out[0].rom, sensor_rom(&SimSensor::new(4)));
        assert_eq!(out[0].config.channel(), 1);
    }

    #[test]
    fn discover_stops_when_out_is_full() {
        let mut bus = SimulatedBus::new((1..=5).map(SimSensor::new).collect());
        let mut reg = Registry::new(MemoryStore::<1024>::new()).unwrap();
        let mut out = [DeviceRecord::default(); 2];
        assert_eq!(reg.discover_new(&mut bus, &mut out), Ok(2));
        assert_ne!(out[0].rom, out[1].rom);
    }

    #[test]
    fn discover_skips_corrupt_sensor() {
        let mut bad = SimSensor::new(2);
        bad.corrupt = true;
        let mut bus = SimulatedBus::new(vec![SimSensor::new(1), bad]);
        let mut reg = Registry::new(MemoryStore::<1024>::new()).unwrap();
        let mut out = [DeviceRecord::default(); 4];
        assert_eq!(reg.discover_new(&mut bus, &mut out), Ok(1));
        assert_eq!(out[0].rom, sensor_rom(&SimSensor::new(1)));
    }

    // Drops one sensor from the bus as soon as its search pass completes.
    struct LeavingBus {
        bus: SimulatedBus<SimSensor>,
        channel: u8,
        rom: [u8; 8],
        triplets: u8,
    }

    impl OneWire for LeavingBus {
        type Status = SimStatus;
        type BusError = Infallible;

        fn reset(&mut self) -> OneWireResult<SimStatus, Infallible> {
            self.bus.reset()
        }

        fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Infallible> {
            self.bus.write_byte(byte)
        }

        fn read_byte(&mut self) -> OneWireResult<u8, Infallible> {
            self.bus.read_byte()
        }

        fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Infallible> {
            self.bus.write_bit(bit)
        }

        fn read_bit(&mut self) -> OneWireResult<bool, Infallible> {
            self.bus.read_bit()
        }

        fn read_triplet(
            &mut self,
            direction: bool,
        ) -> OneWireResult<(bool, bool, bool), Infallible> {
            let res = self.bus.read_triplet(direction)?;
            if self.bus.channel() == self.channel {
                self.triplets += 1;
                if self.triplets == 64 {
                    self.bus.remove(self.channel, &self.rom);
                }
            }
            Ok(res)
        }

        fn channels(&self) -> u8 {
            self.bus.channels()
        }

        fn channel(&self) -> u8 {
            self.bus.channel()
        }

        fn set_channel(&mut self, channel: u8) -> OneWireResult<(), Infallible> {
            self.bus.set_channel(channel)
        }

        fn set_strong_pullup(&mut self, enable: bool) -> OneWireResult<(), Infallible> {
            self.bus.set_strong_pullup(enable)
        }
    }

    #[test]
    fn discover_skips_sensor_that_leaves_mid_scan() {
        let leaving = SimSensor::new(2);
        let rom = leaving.rom_bytes();
        let mut bus = LeavingBus {
            bus: SimulatedBus::with_channels(vec![vec![SimSensor::new(1)], vec![leaving]]),
            channel: 1,
            rom,
            triplets: 0,
        };
        let mut reg = Registry::new(MemoryStore::<1024>::new()).unwrap();
        let mut out = [DeviceRecord::default(); 4];
        assert_eq!(reg.discover_new(&mut bus, &mut out), Ok(1));
        assert_eq!(out[0].rom, sensor_rom(&SimSensor::new(1)));
        assert_eq!(out[0].config.channel(), 0);
        assert!(bus.bus.devices(1).is_empty());
    }

    fn registered(bus: &mut SimulatedBus<SimSensor>) -> Registry<MemoryStore<1024>> {
        let mut reg = Registry::new(MemoryStore::<1024>::new()).unwrap();
        let mut out = [DeviceRecord::default(); 8];
        let n = reg.discover_new(bus, &mut out).unwrap();
        for rec in out[..n].iter() {
            reg.push(rec).unwrap();
        }
        reg
    }

    #[test]
    fn verify_unchanged() {
        let mut bus = SimulatedBus::new(vec![SimSensor::new(1)]);
        let mut reg = registered(&mut bus);
        assert_eq!(reg.verify(&mut bus, 1), Ok(VerifyOutcome::Unchanged));
    }

    #[test]
    fn verify_persists_new_resolution() {
        let mut bus = SimulatedBus::new(vec![SimSensor::new(1)]);
        let mut reg = registered(&mut bus);
        let rom = sensor_rom(&SimSensor::new(1));
        let sensor = bus.device_mut(0, rom.as_bytes()).unwrap();
        sensor.scratchpad[4] = Resolution::Nine.config_byte();
        let outcome = reg.verify(&mut bus, 1).unwrap();
        let VerifyOutcome::Updated(live) = outcome else {
            panic!("expected an update, got {outcome:?}");
        };
        assert_eq!(live.config.resolution(), Resolution::Nine);
        assert_eq!(reg.load(1), Ok(live));
    }

    #[test]
    fn verify_follows_channel_move() {
        let mut bus = SimulatedBus::with_channels(vec![
            vec![SimSensor::new(1)],
            Vec::new(),
            vec![SimSensor::new(2)],
        ]);
        let mut reg = registered(&mut bus);
        let rom = sensor_rom(&SimSensor::new(1));
        let n = reg.find(&rom).unwrap().unwrap();
        let moved = bus.remove(0, rom.as_bytes()).unwrap();
        bus.push(2, moved);
        let outcome = reg.verify(&mut bus, n).unwrap();
        assert!(matches!(outcome, VerifyOutcome::Updated(r) if r.config.channel() == 2));
        assert_eq!(reg.load(n).unwrap().config.channel(), 2);
    }

    #[test]
    fn verify_missing_keeps_record() {
        let mut bus = SimulatedBus::with_channels(vec![
            vec![SimSensor::new(1), SimSensor::new(2)],
            vec![SimSensor::new(3)],
        ]);
        let mut reg = registered(&mut bus);
        let rom = sensor_rom(&SimSensor::new(2));
        let n = reg.find(&rom).unwrap().unwrap();
        bus.remove(0, rom.as_bytes()).unwrap();
        let before = reg.inner().clone();
        assert_eq!(reg.verify(&mut bus, n), Ok(VerifyOutcome::Missing));
        assert_eq!(reg.inner(), &before);
    }

    #[test]
    fn verify_propagates_bus_failures() {
        let mut bus = SimulatedBus::new(vec![SimSensor::new(1)]);
        let mut reg = registered(&mut bus);
        bus.set_timeout(true);
        assert_eq!(
            reg.verify(&mut bus, 1),
            Err(RegistryError::Bus(OneWireError::Timeout))
        );
    }
}
