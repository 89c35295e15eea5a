//! The directory: a fixed number of slots, each holding at most one file.

use alloc::vec::Vec;
use core::str;

use arrayvec::ArrayString;
use block_io::BlockDevice;
use dataview::PodMethods as _;
use flatfs_types::{
    BLOCK_SIZE, DIR_ENTRIES_PER_BLOCK, DataBlockNo, DirBlock, EntryFlags, InvalidBlockNo,
    MAX_FILES, MAX_NAME_LEN, SuperBlock,
};

use crate::{FsError, device};

pub(crate) type FileName = ArrayString<MAX_NAME_LEN>;

/// Validates a file name.
///
/// Names are 1 to [`MAX_NAME_LEN`] bytes long and contain no NUL byte.
pub(crate) fn parse_name(name: &str) -> Result<FileName, FsError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('\0') {
        return Err(FsError::InvalidArgument);
    }
    FileName::from(name).ok().ok_or(FsError::InvalidArgument)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileEntry {
    pub(crate) name: FileName,
    /// File size in bytes.
    pub(crate) size: usize,
    /// First block of the file's chain.
    pub(crate) head: Option<DataBlockNo>,
    /// Number of descriptors referring to this entry.
    pub(crate) open_count: usize,
}

impl FileEntry {
    fn new(name: FileName) -> Self {
        Self {
            name,
            size: 0,
            head: None,
            open_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Directory {
    slots: Vec<Option<FileEntry>>,
}

impl Directory {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..MAX_FILES).map(|_| None).collect(),
        }
    }

    pub(crate) fn load<D>(device: &mut D, sb: &SuperBlock) -> Result<Self, FsError>
    where
        D: BlockDevice<BLOCK_SIZE>,
        D::Error: core::error::Error + Send + Sync + 'static,
    {
        let mut dir = Self::new();
        let mut block = DirBlock::zeroed();
        for slot in 0..MAX_FILES {
            if slot % DIR_ENTRIES_PER_BLOCK == 0 {
                device::read(device, sb.dir_block(slot / DIR_ENTRIES_PER_BLOCK), &mut block)?;
            }
            let de = block.entry(slot);
            if !de.is_used() {
                continue;
            }
            let name = str::from_utf8(de.name()).ok().ok_or(FsError::Corrupted)?;
            let name = parse_name(name).ok().ok_or(FsError::Corrupted)?;
            if dir.lookup(&name).is_some() {
                return Err(FsError::Corrupted);
            }
            let mut entry = FileEntry::new(name);
            entry.size = usize::try_from(de.size()).unwrap();
            entry.head = de
                .head()
                .map_err(|InvalidBlockNo(_)| FsError::Corrupted)?;
            dir.slots[slot] = Some(entry);
        }
        Ok(dir)
    }

    pub(crate) fn store<D>(&self, device: &mut D, sb: &SuperBlock) -> Result<(), FsError>
    where
        D: BlockDevice<BLOCK_SIZE>,
        D::Error: core::error::Error + Send + Sync + 'static,
    {
        let mut block = DirBlock::zeroed();
        for (i, chunk) in self.slots.chunks(DIR_ENTRIES_PER_BLOCK).enumerate() {
            block.as_bytes_mut().fill(0);
            for (j, entry) in chunk.iter().enumerate() {
                let Some(entry) = entry else {
                    continue;
                };
                let de = block.entry_mut(j);
                de.set_name(entry.name.as_bytes());
                de.set_size(u32::try_from(entry.size).unwrap());
                de.set_head(entry.head);
                de.set_flags(EntryFlags::USED);
            }
            device::write(device, sb.dir_block(i), &block)?;
        }
        Ok(())
    }

    /// Returns the slot holding the file named `name`.
    pub(crate) fn lookup(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|e| e.as_ref().is_some_and(|e| e.name.as_str() == name))
    }

    /// Adds an empty file in the first unused slot and returns the slot.
    pub(crate) fn create(&mut self, name: &str) -> Result<usize, FsError> {
        let name = parse_name(name)?;
        if self.lookup(&name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::ResourceExhausted)?;
        self.slots[slot] = Some(FileEntry::new(name));
        Ok(slot)
    }

    /// Marks the slot unused, returning the entry it held.
    pub(crate) fn remove(&mut self, slot: usize) -> Option<FileEntry> {
        self.slots.get_mut(slot)?.take()
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&FileEntry> {
        self.slots.get(slot)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut FileEntry> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Iterates over the used entries in slot order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.slots.iter().flatten()
    }

    /// Total size of all files.
    pub(crate) fn used_bytes(&self) -> usize {
        self.entries().map(|e| e.size).sum()
    }
}
