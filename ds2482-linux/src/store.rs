use ds18b20::NonVolatileStore;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Registry image kept in a file, standing in for the AVR's EEPROM.
///
/// The whole image is held in memory and rewritten on every write; the
/// in-memory copy only changes once the file has been written.
/// A missing file reads as erased memory.
pub struct FileStore {
    path: PathBuf,
    image: Vec<u8>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut image = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        if !image.is_empty() && image.len() != capacity {
            log::warn!(
                "{}: image is {} bytes, expected {capacity}; the registry will read as empty",
                path.display(),
                image.len()
            );
        }
        image.resize(capacity, 0xff);
        Ok(Self { path, image })
    }

    fn range(&self, offset: usize, len: usize) -> io::Result<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.image.len() => Ok(offset..end),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("access of {len} bytes at {offset} is outside the registry image"),
            )),
        }
    }
}

impl NonVolatileStore for FileStore {
    type Error = io::Error;

    fn capacity(&self) -> usize {
        self.image.len()
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> io::Result<()> {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.image[range]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> io::Result<()> {
        let range = self.range(offset, data.len())?;
        let mut image = self.image.clone();
        image[range].copy_from_slice(data);
        fs::write(&self.path, &image)?;
        self.image = image;
        Ok(())
    }
}
