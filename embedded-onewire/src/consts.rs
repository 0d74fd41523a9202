//! Command constants for 1-Wire communication.

/// Command to read the ROM of the only device on the bus.
///
/// Only valid on a single-drop bus: with several devices
/// present, their responses are wired-AND'ed together and
/// the CRC check of the result fails.
pub const ONEWIRE_READ_ROM_CMD: u8 = 0x33;

/// Command to match a specific ROM address in 1-Wire communication (non-overdrive mode)
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Command to skip ROM address in 1-Wire communication (non-overdrive mode)
///
/// On a multidrop bus this addresses every device at once. It is only
/// useful for commands that need no per-device reply, such as starting
/// a temperature conversion on all sensors simultaneously.
pub const ONEWIRE_SKIP_ROM_CMD: u8 = 0xcc;

/// Command to search for devices on the 1-Wire bus
pub const ONEWIRE_SEARCH_CMD: u8 = 0xf0;

/// Command to search for devices in alarm state on the 1-Wire bus
pub const ONEWIRE_CONDITIONAL_SEARCH_CMD: u8 = 0xec;
