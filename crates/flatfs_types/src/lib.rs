//! Data types for the flatfs on-disk format.
//!
//! The data layout:
//!
//! | block no.         | # of blocks       | content          | type                          |
//! |-------------------|-------------------|------------------|-------------------------------|
//! | 0                 | 1                 | Super Block      | [`SuperBlock`]                |
//! | `sb.fat_start`    | `sb.fat_len`      | allocation table | [`FatBlock`]                  |
//! | `sb.dir_start`    | `sb.dir_len`      | directory        | [`DirBlock`]                  |
//! | `sb.data_start`   | `NUM_DATA_BLOCKS` | data blocks      | `[u8; BLOCK_SIZE]` (data)     |
//!
//! The data region starts at the fixed block [`DATA_START`], not right after
//! the directory. All integers are stored little-endian.

#![cfg_attr(not(test), no_std)]

use core::{fmt, mem};

use bitflags::bitflags;
use dataview::{Pod, PodMethods as _};

pub use flatfs_params::{
    BLOCK_SIZE, DATA_START, MAX_FILE_NAME, MAX_FILES, NUM_BLOCKS, NUM_DATA_BLOCKS,
};

/// Longest file name in bytes.
pub const MAX_NAME_LEN: usize = MAX_FILE_NAME - 1;

/// Allocation table entries per block.
pub const FAT_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / size_of::<u32>();

/// Directory entries per block.
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / size_of::<DirEntry>();

/// First block of the allocation table.
pub const FAT_START: usize = 1;

/// Number of allocation table blocks.
pub const FAT_BLOCKS: usize = (NUM_DATA_BLOCKS * size_of::<u32>()).div_ceil(BLOCK_SIZE);

/// First block of the directory.
pub const DIR_START: usize = FAT_START + FAT_BLOCKS;

/// Number of directory blocks.
pub const DIR_BLOCKS: usize = (MAX_FILES * size_of::<DirEntry>()).div_ceil(BLOCK_SIZE);

const _: () = const {
    assert!(BLOCK_SIZE % size_of::<DirEntry>() == 0);
    assert!(DIR_START + DIR_BLOCKS <= DATA_START, "metadata overlaps data region");
    assert!(DATA_START + NUM_DATA_BLOCKS <= NUM_BLOCKS);
    assert!(NUM_DATA_BLOCKS < u32::MAX as usize);
    assert!(size_of::<SuperBlock>() <= BLOCK_SIZE);
};

/// Index of a block in the data region (and of its allocation table entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DataBlockNo(usize);

impl fmt::Display for DataBlockNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl DataBlockNo {
    /// # Panics
    ///
    /// Panics if `n` is not less than [`NUM_DATA_BLOCKS`].
    #[must_use]
    pub const fn new(n: usize) -> Self {
        assert!(n < NUM_DATA_BLOCKS);
        Self(n)
    }

    #[must_use]
    pub const fn try_new(n: usize) -> Option<Self> {
        if n < NUM_DATA_BLOCKS {
            Some(Self(n))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn as_index(&self) -> usize {
        self.0
    }

    /// Block number on the device.
    #[must_use]
    pub const fn device_index(&self) -> usize {
        DATA_START + self.0
    }

    /// Encodes `Option<Self>` as stored on disk: `0` is none, `n + 1` is block `n`.
    #[must_use]
    pub fn encode(bn: Option<Self>) -> u32 {
        bn.map_or(0, |bn| u32::try_from(bn.0 + 1).unwrap())
    }

    /// Decodes a value written by [`Self::encode`].
    pub fn decode(raw: u32) -> Result<Option<Self>, InvalidBlockNo> {
        if raw == 0 {
            return Ok(None);
        }
        usize::try_from(raw - 1)
            .ok()
            .and_then(Self::try_new)
            .map(Some)
            .ok_or(InvalidBlockNo(raw))
    }
}

/// A stored block reference that names a block past the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidBlockNo(pub u32);

impl fmt::Display for InvalidBlockNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid block reference: {:#x}", self.0)
    }
}

/// A `Pod` value occupying exactly one block.
pub trait BlockRepr: Pod + Sized {
    fn block(&self) -> &[u8; BLOCK_SIZE] {
        self.as_bytes().try_into().unwrap()
    }

    fn block_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        self.as_bytes_mut().try_into().unwrap()
    }
}

/// Super block of the file system.
#[derive(Debug, Clone, PartialEq, Eq, Pod)]
#[repr(C)]
pub struct SuperBlock {
    /// Magic number. Must be [`SuperBlock::FS_MAGIC`].
    magic: u32,
    /// Block number of the first allocation table block.
    fat_start: u32,
    /// Number of allocation table blocks.
    fat_len: u32,
    /// Block number of the first directory block.
    dir_start: u32,
    /// Number of directory blocks.
    dir_len: u32,
    /// Block number of the first data block.
    data_start: u32,
    /// Number of data blocks.
    num_data_blocks: u32,
    /// Number of directory entries.
    num_files: u32,
}

impl SuperBlock {
    pub const FS_MAGIC: u32 = 0x5446_4c46;

    pub const SUPER_BLOCK_NO: usize = 0;

    /// Returns the super block describing the compiled-in layout.
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub const fn new() -> Self {
        Self {
            magic: Self::FS_MAGIC.to_le(),
            fat_start: (FAT_START as u32).to_le(),
            fat_len: (FAT_BLOCKS as u32).to_le(),
            dir_start: (DIR_START as u32).to_le(),
            dir_len: (DIR_BLOCKS as u32).to_le(),
            data_start: (DATA_START as u32).to_le(),
            num_data_blocks: (NUM_DATA_BLOCKS as u32).to_le(),
            num_files: (MAX_FILES as u32).to_le(),
        }
    }

    /// Decodes the super block from the first bytes of block 0.
    #[must_use]
    pub fn from_block(block: &[u8; BLOCK_SIZE]) -> Self {
        let mut sb = Self::zeroed();
        let len = mem::size_of::<Self>();
        sb.as_bytes_mut().copy_from_slice(&block[..len]);
        sb
    }

    /// Encodes the super block into a zero-padded block.
    #[must_use]
    pub fn to_block(&self) -> [u8; BLOCK_SIZE] {
        let mut block = [0; BLOCK_SIZE];
        let bytes = self.as_bytes();
        block[..bytes.len()].copy_from_slice(bytes);
        block
    }

    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_le(self.magic)
    }

    /// Returns `true` if the super block describes the compiled-in layout.
    #[must_use]
    pub fn matches_layout(&self) -> bool {
        *self == Self::new()
    }

    /// Returns the block number of the `i`th allocation table block.
    #[must_use]
    pub fn fat_block(&self, i: usize) -> usize {
        usize::try_from(u32::from_le(self.fat_start)).unwrap() + i
    }

    #[must_use]
    pub fn fat_len(&self) -> usize {
        usize::try_from(u32::from_le(self.fat_len)).unwrap()
    }

    /// Returns the block number of the `i`th directory block.
    #[must_use]
    pub fn dir_block(&self, i: usize) -> usize {
        usize::try_from(u32::from_le(self.dir_start)).unwrap() + i
    }

    #[must_use]
    pub fn dir_len(&self) -> usize {
        usize::try_from(u32::from_le(self.dir_len)).unwrap()
    }

    #[must_use]
    pub fn data_start(&self) -> usize {
        usize::try_from(u32::from_le(self.data_start)).unwrap()
    }
}

impl Default for SuperBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocation table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    /// Unused block.
    Free,
    /// Last block of a chain.
    End,
    /// Interior block of a chain; holds the following block.
    Next(DataBlockNo),
}

impl FatEntry {
    const RAW_FREE: u32 = 0;
    const RAW_END: u32 = u32::MAX;

    /// Decodes a raw entry. Returns `None` if it names a block past the data region.
    #[must_use]
    pub fn decode(raw: u32) -> Option<Self> {
        match raw {
            Self::RAW_FREE => Some(Self::Free),
            Self::RAW_END => Some(Self::End),
            n => DataBlockNo::decode(n).ok().flatten().map(Self::Next),
        }
    }

    #[must_use]
    pub fn encode(self) -> u32 {
        match self {
            Self::Free => Self::RAW_FREE,
            Self::End => Self::RAW_END,
            Self::Next(bn) => DataBlockNo::encode(Some(bn)),
        }
    }

    #[must_use]
    pub fn is_free(self) -> bool {
        self == Self::Free
    }
}

/// One block of the allocation table.
#[derive(Pod)]
#[repr(transparent)]
pub struct FatBlock([u32; FAT_ENTRIES_PER_BLOCK]);
const _: () = const { assert!(size_of::<FatBlock>() == BLOCK_SIZE) };

impl BlockRepr for FatBlock {}

impl FatBlock {
    #[must_use]
    pub fn get(&self, i: usize) -> Option<FatEntry> {
        FatEntry::decode(u32::from_le(self.0[i]))
    }

    pub fn set(&mut self, i: usize, entry: FatEntry) {
        self.0[i] = entry.encode().to_le();
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        /// The directory slot holds a file.
        const USED = 1 << 0;
    }
}

/// On-disk directory entry.
#[derive(Debug, Pod)]
#[repr(C)]
pub struct DirEntry {
    /// NUL-padded file name.
    name: [u8; MAX_FILE_NAME],
    /// File size in bytes.
    size: u32,
    /// First data block, encoded by [`DataBlockNo::encode`].
    head: u32,
    /// [`EntryFlags`].
    flags: u32,
    reserved: u32,
}

impl DirEntry {
    #[must_use]
    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_truncate(u32::from_le(self.flags))
    }

    pub fn set_flags(&mut self, flags: EntryFlags) {
        self.flags = flags.bits().to_le();
    }

    #[must_use]
    pub fn is_used(&self) -> bool {
        self.flags().contains(EntryFlags::USED)
    }

    #[must_use]
    pub fn name(&self) -> &[u8] {
        let len = memchr::memchr(0, &self.name).unwrap_or(self.name.len());
        &self.name[..len]
    }

    /// # Panics
    ///
    /// Panics if `name` is longer than [`MAX_NAME_LEN`].
    pub fn set_name(&mut self, name: &[u8]) {
        assert!(name.len() <= MAX_NAME_LEN);
        self.name[..name.len()].copy_from_slice(name);
        self.name[name.len()..].fill(0);
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        u32::from_le(self.size)
    }

    pub fn set_size(&mut self, size: u32) {
        self.size = size.to_le();
    }

    /// Returns the first data block.
    pub fn head(&self) -> Result<Option<DataBlockNo>, InvalidBlockNo> {
        DataBlockNo::decode(u32::from_le(self.head))
    }

    pub fn set_head(&mut self, head: Option<DataBlockNo>) {
        self.head = DataBlockNo::encode(head).to_le();
    }
}

/// One block of the directory.
#[derive(Pod)]
#[repr(transparent)]
pub struct DirBlock([DirEntry; DIR_ENTRIES_PER_BLOCK]);
const _: () = const { assert!(size_of::<DirBlock>() == BLOCK_SIZE) };

impl BlockRepr for DirBlock {}

impl DirBlock {
    #[must_use]
    pub fn entry(&self, i: usize) -> &DirEntry {
        &self.0[i % DIR_ENTRIES_PER_BLOCK]
    }

    #[must_use]
    pub fn entry_mut(&mut self, i: usize) -> &mut DirEntry {
        &mut self.0[i % DIR_ENTRIES_PER_BLOCK]
    }
}
