//! Block I/O devices.
//!
//! A block device is a flat array of fixed-size blocks, addressed by a
//! zero-based block index. Data is always transferred one whole block at a
//! time.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

use alloc::{boxed::Box, vec, vec::Vec};
use core::fmt;

#[cfg(feature = "std")]
pub use self::file::FileDevice;

#[cfg(feature = "std")]
mod file;

pub trait BlockDevice<const BLOCK_SIZE: usize> {
    type Error;

    /// Returns the number of addressable blocks.
    fn num_blocks(&self) -> usize;

    fn read(&mut self, index: usize, data: &mut [u8; BLOCK_SIZE]) -> Result<(), Self::Error>;
    fn write(&mut self, index: usize, data: &[u8; BLOCK_SIZE]) -> Result<(), Self::Error>;

    /// Makes every completed write durable.
    ///
    /// The device itself is closed by dropping it.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Access to a block index past the end of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("block index out of range: index={index}, num_blocks={num_blocks}")]
pub struct OutOfRange {
    pub index: usize,
    pub num_blocks: usize,
}

/// A block device backed by memory.
///
/// Blocks that have never been written read as zero and are not allocated.
#[derive(Clone)]
pub struct MemoryDevice<const BLOCK_SIZE: usize> {
    blocks: Vec<Option<Box<[u8; BLOCK_SIZE]>>>,
    reads: usize,
    writes: usize,
}

impl<const BLOCK_SIZE: usize> fmt::Debug for MemoryDevice<BLOCK_SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDevice")
            .field("num_blocks", &self.blocks.len())
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

impl<const BLOCK_SIZE: usize> MemoryDevice<BLOCK_SIZE> {
    /// Creates a zero-filled device with `num_blocks` blocks.
    #[must_use]
    pub fn new(num_blocks: usize) -> Self {
        Self {
            blocks: vec![None; num_blocks],
            reads: 0,
            writes: 0,
        }
    }

    /// Returns the contents of the block, or `None` if it was never written
    /// (or `index` is out of range).
    #[must_use]
    pub fn contents(&self, index: usize) -> Option<&[u8; BLOCK_SIZE]> {
        self.blocks.get(index)?.as_deref()
    }

    /// Returns `true` if every byte of the block is zero.
    #[must_use]
    pub fn is_zeroed(&self, index: usize) -> bool {
        self.contents(index)
            .is_none_or(|data| data.iter().all(|&b| b == 0))
    }

    /// Number of block reads served so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Number of block writes served so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn check_index(&self, index: usize) -> Result<(), OutOfRange> {
        if index >= self.blocks.len() {
            return Err(OutOfRange {
                index,
                num_blocks: self.blocks.len(),
            });
        }
        Ok(())
    }
}

impl<const BLOCK_SIZE: usize> BlockDevice<BLOCK_SIZE> for MemoryDevice<BLOCK_SIZE> {
    type Error = OutOfRange;

    fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    fn read(&mut self, index: usize, data: &mut [u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        self.check_index(index)?;
        self.reads += 1;
        match &self.blocks[index] {
            Some(block) => data.copy_from_slice(&block[..]),
            None => data.fill(0),
        }
        Ok(())
    }

    fn write(&mut self, index: usize, data: &[u8; BLOCK_SIZE]) -> Result<(), Self::Error> {
        self.check_index(index)?;
        self.writes += 1;
        match &mut self.blocks[index] {
            Some(block) => block.copy_from_slice(data),
            slot @ None => *slot = Some(Box::new(*data)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_SIZE: usize = 512;

    type MemoryDevice = super::MemoryDevice<BLOCK_SIZE>;

    #[test]
    fn test_memory_device_unwritten_is_zero() {
        let mut device = MemoryDevice::new(4);
        let mut buf = [0xAA; BLOCK_SIZE];
        device.read(3, &mut buf).unwrap();
        assert_eq!(buf, [0; BLOCK_SIZE]);
        assert!(device.contents(3).is_none());
        assert!(device.is_zeroed(3));
        assert_eq!(device.reads(), 1);
    }

    #[test]
    fn test_memory_device_read_write() {
        let mut device = MemoryDevice::new(4);
        device.write(1, &[7; BLOCK_SIZE]).unwrap();
        device.write(1, &[9; BLOCK_SIZE]).unwrap();

        let mut buf = [0; BLOCK_SIZE];
        device.read(1, &mut buf).unwrap();
        assert_eq!(buf, [9; BLOCK_SIZE]);
        assert!(!device.is_zeroed(1));
        assert!(device.is_zeroed(0));
        assert_eq!(device.writes(), 2);
    }

    #[test]
    fn test_memory_device_out_of_range() {
        let mut device = MemoryDevice::new(2);
        let mut buf = [0; BLOCK_SIZE];
        assert_eq!(
            device.read(2, &mut buf),
            Err(OutOfRange {
                index: 2,
                num_blocks: 2
            })
        );
        assert!(device.write(5, &buf).is_err());
        assert_eq!(device.reads(), 0);
        assert_eq!(device.writes(), 0);
    }

    #[test]
    fn test_memory_device_flush() {
        let mut device = MemoryDevice::new(1);
        device.write(0, &[1; BLOCK_SIZE]).unwrap();
        assert_eq!(device.num_blocks(), 1);
        device.flush().unwrap();
        assert!(!device.is_zeroed(0));
    }
}
