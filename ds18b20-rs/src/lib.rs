#![no_std]
#![deny(missing_docs)]
//! # DS18B20
//!
//! Driver for the DS18B20 digital thermometer on any bus implementing
//! [`OneWire`](embedded_onewire::OneWire), and a sensor [`Registry`] that keeps
//! stable sensor numbers across power cycles in a small non-volatile memory.
//!
//! Sensor functions take the bus and a [`DeviceRecord`] (ROM code, channel,
//! power mode and resolution) instead of owning either, so one bus serves
//! every sensor and the registry stays the single source of sensor settings.

#[cfg(test)]
extern crate std;

mod device;
mod error;
mod registry;
mod sensor;
#[cfg(test)]
mod sim;
mod store;

pub use device::{DeviceConfig, DeviceRecord};
pub use error::{RegistryError, StoreError};
pub use registry::{DeviceScan, Registry, ScanState, VerifyOutcome};
pub use sensor::{
    DS18B20_FAMILY, Resolution, Scratchpad, Target, Temperature, copy_scratchpad, power_mode,
    read_scratchpad, recall_eeprom, start_conversion, write_scratchpad,
};
pub use store::{MemoryStore, NonVolatileStore, OutOfBounds};
