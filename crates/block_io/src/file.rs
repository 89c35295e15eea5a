//! Block device backed by a host file (disk image).

use std::{
    fs::File,
    io::{self, Read as _, Seek as _, SeekFrom, Write as _},
    path::Path,
};

use crate::{BlockDevice, OutOfRange};

#[derive(Debug)]
pub struct FileDevice<const BLOCK_SIZE: usize> {
    file: File,
    num_blocks: usize,
}

impl<const BLOCK_SIZE: usize> FileDevice<BLOCK_SIZE> {
    /// Creates (or truncates) an image file of `num_blocks` zeroed blocks.
    pub fn create<P>(path: P, num_blocks: usize) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(Self::byte_offset(num_blocks)?)?;
        Ok(Self { file, num_blocks })
    }

    /// Opens an existing image file.
    ///
    /// The number of blocks is derived from the file length; a trailing
    /// partial block is not addressable.
    pub fn open<P>(path: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = File::options().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let block_size = u64::try_from(BLOCK_SIZE).map_err(io::Error::other)?;
        let num_blocks = usize::try_from(len / block_size).map_err(io::Error::other)?;
        Ok(Self { file, num_blocks })
    }

    fn byte_offset(index: usize) -> io::Result<u64> {
        index
            .checked_mul(BLOCK_SIZE)
            .and_then(|off| u64::try_from(off).ok())
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))
    }

    fn seek_block(&mut self, index: usize) -> io::Result<()> {
        if index >= self.num_blocks {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                OutOfRange {
                    index,
                    num_blocks: self.num_blocks,
                },
            ));
        }
        self.file.seek(SeekFrom::Start(Self::byte_offset(index)?))?;
        Ok(())
    }
}

impl<const BLOCK_SIZE: usize> BlockDevice<BLOCK_SIZE> for FileDevice<BLOCK_SIZE> {
    type Error = io::Error;

    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read(&mut self, index: usize, data: &mut [u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        self.seek_block(index)?;
        self.file.read_exact(data)
    }

    fn write(&mut self, index: usize, data: &[u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        self.seek_block(index)?;
        self.file.write_all(data)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env, fs,
        path::PathBuf,
        process,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    const BLOCK_SIZE: usize = 512;

    type FileDevice = super::FileDevice<BLOCK_SIZE>;

    fn image_path(name: &str) -> PathBuf {
        static ID: AtomicUsize = AtomicUsize::new(0);
        let id = ID.fetch_add(1, Ordering::Relaxed);
        env::temp_dir().join(format!("block_io.{}.{id}.{name}.img", process::id()))
    }

    #[test]
    fn test_file_device_create_reopen() {
        let path = image_path("reopen");

        let mut device = FileDevice::create(&path, 8).unwrap();
        assert_eq!(device.num_blocks(), 8);
        assert_eq!(fs::metadata(&path).unwrap().len(), 8 * 512);
        device.write(3, &[0x5A; BLOCK_SIZE]).unwrap();
        device.flush().unwrap();

        let mut device = FileDevice::open(&path).unwrap();
        assert_eq!(device.num_blocks(), 8);
        let mut buf = [0; BLOCK_SIZE];
        device.read(3, &mut buf).unwrap();
        assert_eq!(buf, [0x5A; BLOCK_SIZE]);
        device.read(2, &mut buf).unwrap();
        assert_eq!(buf, [0; BLOCK_SIZE]);
        device.flush().unwrap();

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_device_out_of_range() {
        let path = image_path("range");

        let mut device = FileDevice::create(&path, 2).unwrap();
        let mut buf = [0; BLOCK_SIZE];
        let err = device.read(2, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        device.flush().unwrap();

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_device_open_missing() {
        let path = image_path("missing");
        let err = FileDevice::open(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
