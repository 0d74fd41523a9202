/// Byte addressable non-volatile memory backing a [`Registry`](crate::Registry).
///
/// Offsets are absolute; the last byte (`capacity() - 1`) holds the
/// device count.
pub trait NonVolatileStore {
    /// Error type of the underlying memory.
    type Error;

    /// Size of the memory in bytes.
    fn capacity(&self) -> usize;

    /// Fills `buf` with the bytes starting at `offset`.
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes `data` starting at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error>;
}

/// Access outside of a [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
    /// First byte of the access.
    pub offset: usize,
    /// Length of the access.
    pub len: usize,
}

/// In-RAM store of `N` bytes, erased to 0xFF like a fresh EEPROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStore<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Default for MemoryStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MemoryStore<N> {
    /// Erased store.
    pub const fn new() -> Self {
        Self { bytes: [0xff; N] }
    }

    /// Store holding an existing image.
    pub const fn from_bytes(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// Memory contents.
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    fn range(&self, offset: usize, len: usize) -> Result<core::ops::Range<usize>, OutOfBounds> {
        match offset.checked_add(len) {
            Some(end) if end <= N => Ok(offset..end),
            _ => Err(OutOfBounds { offset, len }),
        }
    }
}

impl<const N: usize> NonVolatileStore for MemoryStore<N> {
    type Error = OutOfBounds;

    fn capacity(&self) -> usize {
        N
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }
}

impl<S: NonVolatileStore + ?Sized> NonVolatileStore for &mut S {
    type Error = S::Error;

    fn capacity(&self) -> usize {
        S::capacity(self)
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        S::read(self, offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), Self::Error> {
        S::write(self, offset, data)
    }
}
