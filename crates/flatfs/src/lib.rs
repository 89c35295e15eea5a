//! A flat-namespace file system with chained block allocation.
//!
//! A volume is a [`BlockDevice`](block_io::BlockDevice) of
//! [`BLOCK_SIZE`]-byte blocks holding a super block, a block allocation
//! table, a single directory and a data region. Each file is a chain of data
//! blocks linked through the allocation table.
//!
//! ```
//! use block_io::MemoryDevice;
//! use flatfs::{BLOCK_SIZE, NUM_BLOCKS, SeekFrom, Volume};
//!
//! let mut device = MemoryDevice::<BLOCK_SIZE>::new(NUM_BLOCKS);
//! flatfs::format(&mut device)?;
//!
//! let mut vol = Volume::mount(device)?;
//! vol.create("hello")?;
//! let fd = vol.open("hello")?;
//! assert_eq!(vol.write(fd, b"hello, world")?, 12);
//! vol.seek(fd, SeekFrom::Start(7))?;
//! let mut buf = [0; 5];
//! assert_eq!(vol.read(fd, &mut buf)?, 5);
//! assert_eq!(&buf, b"world");
//! vol.close(fd)?;
//! let _device = vol.unmount()?;
//! # Ok::<(), flatfs::FsError>(())
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub use flatfs_params::{MAX_FILES, MAX_OPEN_FILES, MAX_VOLUME_BYTES};
pub use flatfs_types::{BLOCK_SIZE, MAX_NAME_LEN, NUM_BLOCKS};

pub use self::{
    content::SeekFrom,
    descriptor::FileDescriptor,
    error::FsError,
    volume::{UnmountError, Volume, format},
};

#[cfg(feature = "std")]
pub use self::image::ImageVolume;

mod alloc_table;
mod content;
mod descriptor;
mod device;
mod directory;
mod error;
#[cfg(feature = "std")]
mod image;
mod volume;
