use embedded_onewire::OneWireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// DS2482 Hardware Errors
pub enum Ds2482Error<E> {
    /// I2C bus errors.
    I2c(E),
    /// Busy wait retries exceeded.
    RetriesExceeded,
}

impl<E> From<E> for Ds2482Error<E> {
    fn from(value: E) -> Self {
        Self::I2c(value)
    }
}

impl<E> Ds2482Error<E> {
    /// Lifts a bridge error into the 1-Wire error space.
    ///
    /// An exhausted busy wait is a bus [`Timeout`](OneWireError::Timeout);
    /// I2C failures stay wrapped in [`OneWireError::Other`].
    pub fn into_onewire(self) -> OneWireError<Self> {
        match self {
            Self::RetriesExceeded => OneWireError::Timeout,
            other => OneWireError::Other(other),
        }
    }
}
