use embedded_onewire::OneWireError;

/// Errors of the registry storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError<S> {
    /// Encapsulates the error type of the non-volatile memory.
    Store(S),
    /// The record would exceed the memory set aside for the registry.
    EepromFull,
    /// Index 0, or past the end of the registry.
    InvalidIndex(u8),
    /// The stored ROM code fails its CRC.
    InvalidCrc,
}

impl<S> From<S> for StoreError<S> {
    fn from(other: S) -> Self {
        Self::Store(other)
    }
}

/// Errors of registry operations that touch both the bus and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError<B, S> {
    /// 1-Wire failure.
    Bus(OneWireError<B>),
    /// Storage failure.
    Store(StoreError<S>),
}

impl<B, S> From<OneWireError<B>> for RegistryError<B, S> {
    fn from(err: OneWireError<B>) -> Self {
        Self::Bus(err)
    }
}

impl<B, S> From<StoreError<S>> for RegistryError<B, S> {
    fn from(err: StoreError<S>) -> Self {
        Self::Store(err)
    }
}
