//! Volumes stored in host image files.

use std::path::Path;

use block_io::FileDevice;
use flatfs_types::{BLOCK_SIZE, NUM_BLOCKS};

use crate::{FsError, Volume, format};

/// A volume stored in a host image file.
pub type ImageVolume = Volume<FileDevice<BLOCK_SIZE>>;

impl ImageVolume {
    /// Creates (or overwrites) the image file at `path` and formats it.
    pub fn format_image<P>(path: P) -> Result<(), FsError>
    where
        P: AsRef<Path>,
    {
        let mut device = FileDevice::create(path, NUM_BLOCKS).map_err(FsError::device)?;
        format(&mut device)
    }

    /// Mounts the volume stored in the image file at `path`.
    pub fn mount_image<P>(path: P) -> Result<Self, FsError>
    where
        P: AsRef<Path>,
    {
        let device = FileDevice::open(path).map_err(FsError::device)?;
        Self::mount(device)
    }
}
