//! Volume management: formatting, mounting and the directory-level file
//! operations of a mounted volume.

use alloc::vec;
use core::fmt;

use block_io::BlockDevice;
use flatfs_params::MAX_VOLUME_BYTES;
use flatfs_types::{BLOCK_SIZE, NUM_BLOCKS, NUM_DATA_BLOCKS, SuperBlock};
use log::{debug, info, warn};

use crate::{
    FileDescriptor, FsError,
    alloc_table::AllocTable,
    descriptor::{DescriptorTable, OpenFile},
    device,
    directory::{Directory, FileEntry},
};

/// Writes an empty file system to `device`.
///
/// The super block is written last, so an interrupted format does not
/// leave a device that mounts.
pub fn format<D>(device: &mut D) -> Result<(), FsError>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    if device.num_blocks() < NUM_BLOCKS {
        warn!(
            "device too small to format: {} < {NUM_BLOCKS} blocks",
            device.num_blocks()
        );
        return Err(FsError::InvalidArgument);
    }

    let sb = SuperBlock::new();
    AllocTable::new().store(device, &sb)?;
    Directory::new().store(device, &sb)?;
    device
        .write(SuperBlock::SUPER_BLOCK_NO, &sb.to_block())
        .map_err(FsError::device)?;
    device.flush().map_err(FsError::device)?;

    info!(
        "formatted volume: {NUM_BLOCKS} blocks, {NUM_DATA_BLOCKS} data blocks from block {}",
        sb.data_start()
    );
    Ok(())
}

fn write_back<D>(
    device: &mut D,
    sb: &SuperBlock,
    fat: &AllocTable,
    dir: &Directory,
) -> Result<(), FsError>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    device
        .write(SuperBlock::SUPER_BLOCK_NO, &sb.to_block())
        .map_err(FsError::device)?;
    fat.store(device, sb)?;
    dir.store(device, sb)?;
    device.flush().map_err(FsError::device)
}

/// A mounted volume.
///
/// All file operations are methods of this type. The metadata is written
/// back to the device by [`Volume::unmount`], or when the volume is dropped.
pub struct Volume<D>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    /// `None` only after `unmount` has taken the device.
    device: Option<D>,
    sb: SuperBlock,
    pub(crate) fat: AllocTable,
    pub(crate) dir: Directory,
    pub(crate) files: DescriptorTable,
}

impl<D> Volume<D>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    /// Loads the file system on `device`.
    ///
    /// Fails with [`FsError::Corrupted`] if the device does not hold a
    /// consistent volume of the compiled-in layout.
    pub fn mount(mut device: D) -> Result<Self, FsError> {
        if device.num_blocks() < NUM_BLOCKS {
            warn!(
                "device too small to mount: {} < {NUM_BLOCKS} blocks",
                device.num_blocks()
            );
            return Err(FsError::Corrupted);
        }

        let mut block = [0; BLOCK_SIZE];
        device
            .read(SuperBlock::SUPER_BLOCK_NO, &mut block)
            .map_err(FsError::device)?;
        let sb = SuperBlock::from_block(&block);
        if sb.magic() != SuperBlock::FS_MAGIC {
            warn!("bad magic number: {:#x}", sb.magic());
            return Err(FsError::Corrupted);
        }
        if !sb.matches_layout() {
            warn!("super block does not match the volume layout: {sb:?}");
            return Err(FsError::Corrupted);
        }

        let fat = AllocTable::load(&mut device, &sb)?;
        let dir = Directory::load(&mut device, &sb)?;
        check_consistency(&fat, &dir)?;

        info!(
            "mounted volume: {} files, {} bytes used, {} free blocks",
            dir.entries().count(),
            dir.used_bytes(),
            fat.free_count()
        );
        Ok(Self {
            device: Some(device),
            sb,
            fat,
            dir,
            files: DescriptorTable::new(),
        })
    }

    /// Writes the metadata back and returns the device.
    ///
    /// Open descriptors are discarded. If the write-back fails, the volume
    /// is handed back untouched inside the error.
    pub fn unmount(mut self) -> Result<D, UnmountError<D>> {
        let device = self.device.as_mut().unwrap();
        if let Err(error) = write_back(device, &self.sb, &self.fat, &self.dir) {
            warn!("failed to unmount volume: {error}");
            return Err(UnmountError {
                volume: self,
                error,
            });
        }
        info!("unmounted volume");
        Ok(self.device.take().unwrap())
    }

    /// Writes the metadata back without unmounting.
    pub fn sync(&mut self) -> Result<(), FsError> {
        let device = self.device.as_mut().unwrap();
        write_back(device, &self.sb, &self.fat, &self.dir)?;
        debug!("synced volume metadata");
        Ok(())
    }

    pub(crate) fn device(&mut self) -> &mut D {
        self.device.as_mut().unwrap()
    }

    /// Creates an empty file.
    pub fn create(&mut self, name: &str) -> Result<(), FsError> {
        let slot = self.dir.create(name)?;
        debug!("create {name:?}: slot {slot}");
        Ok(())
    }

    /// Deletes a file and frees its blocks.
    ///
    /// Fails with [`FsError::Busy`] while the file is open.
    pub fn delete(&mut self, name: &str) -> Result<(), FsError> {
        let slot = self.dir.lookup(name).ok_or(FsError::NotFound)?;
        let entry = self.dir.get(slot).ok_or(FsError::NotFound)?;
        if entry.open_count > 0 {
            debug!("delete {name:?}: {} descriptors open", entry.open_count);
            return Err(FsError::Busy);
        }

        let chain = self.fat.chain(entry.head)?;
        for bn in &chain {
            device::zero_data(self.device(), *bn)?;
        }
        self.fat.cut(&chain, 0);
        self.dir.remove(slot);
        debug!("delete {name:?}: freed {} blocks", chain.len());
        Ok(())
    }

    /// Opens a file, with the offset at its beginning.
    pub fn open(&mut self, name: &str) -> Result<FileDescriptor, FsError> {
        let slot = self.dir.lookup(name).ok_or(FsError::NotFound)?;
        let fd = self.files.alloc(slot)?;
        let entry = self.dir.get_mut(slot).ok_or(FsError::NotFound)?;
        entry.open_count += 1;
        debug!("open {name:?}: fd {fd}");
        Ok(fd)
    }

    pub fn close(&mut self, fd: FileDescriptor) -> Result<(), FsError> {
        let file = self.files.release(fd)?;
        let entry = self.dir.get_mut(file.slot).ok_or(FsError::NotFound)?;
        entry.open_count -= 1;
        debug!("close fd {fd}: {:?}", entry.name);
        Ok(())
    }

    /// Iterates over the names of all files.
    pub fn list(&self) -> impl Iterator<Item = &str> {
        self.dir.entries().map(|e| e.name.as_str())
    }

    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.dir.lookup(name).is_some()
    }

    /// Returns the size of an open file in bytes.
    pub fn get_size(&self, fd: FileDescriptor) -> Result<usize, FsError> {
        let file = self.files.get(fd)?;
        Ok(self.entry(file)?.size)
    }

    /// Returns the current offset of a descriptor.
    pub fn tell(&self, fd: FileDescriptor) -> Result<usize, FsError> {
        Ok(self.files.get(fd)?.offset)
    }

    /// Total size of all files, which is bounded by [`MAX_VOLUME_BYTES`].
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.dir.used_bytes()
    }

    #[must_use]
    pub fn free_blocks(&self) -> usize {
        self.fat.free_count()
    }

    pub(crate) fn entry(&self, file: OpenFile) -> Result<&FileEntry, FsError> {
        self.dir.get(file.slot).ok_or(FsError::NotFound)
    }

    pub(crate) fn entry_mut(&mut self, file: OpenFile) -> Result<&mut FileEntry, FsError> {
        self.dir.get_mut(file.slot).ok_or(FsError::NotFound)
    }
}

/// Failure of [`Volume::unmount`], holding the still mounted volume.
#[derive(thiserror::Error)]
#[error("failed to unmount volume")]
pub struct UnmountError<D>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    volume: Volume<D>,
    #[source]
    error: FsError,
}

impl<D> fmt::Debug for UnmountError<D>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnmountError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<D> UnmountError<D>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    #[must_use]
    pub fn error(&self) -> &FsError {
        &self.error
    }

    /// Returns the volume, so the unmount can be retried.
    #[must_use]
    pub fn into_parts(self) -> (Volume<D>, FsError) {
        (self.volume, self.error)
    }
}

/// Drops the volume, which tries the write-back once more.
impl<D> From<UnmountError<D>> for FsError
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    fn from(error: UnmountError<D>) -> Self {
        error.error
    }
}

impl<D> Drop for Volume<D>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let Some(device) = self.device.as_mut() else {
            return;
        };
        match write_back(device, &self.sb, &self.fat, &self.dir) {
            Ok(()) => info!("volume dropped without unmount; metadata written back"),
            Err(e) => warn!("failed to write back volume metadata: {e}"),
        }
    }
}

/// Checks that every file's chain is intact, covers the file size and
/// shares no block with another file.
fn check_consistency(fat: &AllocTable, dir: &Directory) -> Result<(), FsError> {
    let mut owned = vec![false; NUM_DATA_BLOCKS];
    let mut used_bytes = 0_usize;
    for entry in dir.entries() {
        let chain = fat.chain(entry.head)?;
        if chain.len() < entry.size.div_ceil(BLOCK_SIZE) {
            warn!(
                "file {:?} has {} bytes but only {} blocks",
                entry.name,
                entry.size,
                chain.len()
            );
            return Err(FsError::Corrupted);
        }
        for bn in chain {
            if owned[bn.as_index()] {
                warn!("block {bn} belongs to more than one file");
                return Err(FsError::Corrupted);
            }
            owned[bn.as_index()] = true;
        }
        used_bytes += entry.size;
    }
    if used_bytes > MAX_VOLUME_BYTES {
        warn!("files hold {used_bytes} bytes, more than {MAX_VOLUME_BYTES}");
        return Err(FsError::Corrupted);
    }
    Ok(())
}
