//! Open-file descriptors.

use alloc::vec::Vec;
use core::fmt;

use flatfs_params::MAX_OPEN_FILES;

use crate::FsError;

/// Handle to an open file, returned by [`Volume::open`](crate::Volume::open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FileDescriptor(usize);

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FileDescriptor {
    #[must_use]
    pub const fn new(fd: usize) -> Self {
        Self(fd)
    }

    #[must_use]
    pub const fn value(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpenFile {
    /// Directory slot of the file.
    pub(crate) slot: usize,
    /// Byte offset of the next read or write.
    pub(crate) offset: usize,
}

#[derive(Debug)]
pub(crate) struct DescriptorTable {
    files: Vec<Option<OpenFile>>,
}

impl DescriptorTable {
    pub(crate) fn new() -> Self {
        Self {
            files: alloc::vec![None; MAX_OPEN_FILES],
        }
    }

    /// Binds the lowest free descriptor to `slot` with offset 0.
    pub(crate) fn alloc(&mut self, slot: usize) -> Result<FileDescriptor, FsError> {
        let fd = self
            .files
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::ResourceExhausted)?;
        self.files[fd] = Some(OpenFile { slot, offset: 0 });
        Ok(FileDescriptor(fd))
    }

    pub(crate) fn get(&self, fd: FileDescriptor) -> Result<OpenFile, FsError> {
        self.files
            .get(fd.0)
            .copied()
            .flatten()
            .ok_or(FsError::NotFound)
    }

    pub(crate) fn get_mut(&mut self, fd: FileDescriptor) -> Result<&mut OpenFile, FsError> {
        self.files
            .get_mut(fd.0)
            .and_then(Option::as_mut)
            .ok_or(FsError::NotFound)
    }

    /// Frees the descriptor, returning what it referred to.
    pub(crate) fn release(&mut self, fd: FileDescriptor) -> Result<OpenFile, FsError> {
        self.files
            .get_mut(fd.0)
            .and_then(Option::take)
            .ok_or(FsError::NotFound)
    }

    /// Iterates over the descriptors open on `slot`.
    pub(crate) fn open_on(&mut self, slot: usize) -> impl Iterator<Item = &mut OpenFile> {
        self.files.iter_mut().flatten().filter(move |f| f.slot == slot)
    }
}
