#![no_std]

/// Block size in bytes.
pub const BLOCK_SIZE: usize = 4096;

/// Number of data blocks, i.e. entries of the allocation table.
pub const NUM_DATA_BLOCKS: usize = 4096;

/// First block of the data region.
pub const DATA_START: usize = 4096;

/// Size of a complete volume in blocks.
pub const NUM_BLOCKS: usize = DATA_START + NUM_DATA_BLOCKS;

/// Maximum number of files (directory slots).
pub const MAX_FILES: usize = 64;

/// Maximum number of simultaneously open file descriptors.
pub const MAX_OPEN_FILES: usize = 32;

/// Size of the on-disk name field, including the terminating NUL.
pub const MAX_FILE_NAME: usize = 16;

/// Maximum aggregate bytes stored across all files of a volume.
pub const MAX_VOLUME_BYTES: usize = 16 * 1024 * 1024;
