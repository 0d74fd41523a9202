#[allow(unused_imports)]
use crate::SearchState;

/// One wire communication error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying hardware.
    Other(E),
    /// Indicates that no device answered the reset pulse with a presence pulse.
    NoDevicePresent,
    /// Indicates that a short circuit was detected on the bus.
    ShortCircuit,
    /// The bridge stayed busy beyond the configured number of polls.
    Timeout,
    /// Computed CRC of a ROM code or a scratchpad is invalid.
    InvalidCrc,
    /// A device stopped answering in the middle of a [`SearchState`] pass.
    SearchError,
    /// A bridge configuration write was not acknowledged.
    Config,
    /// The requested channel does not exist on this bus.
    InvalidChannel(u8),
    /// The addressed ROM belongs to an unexpected device family.
    InvalidFamily(u8),
    /// Indicates that the operation is not implemented by the bus master.
    Unimplemented,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}
