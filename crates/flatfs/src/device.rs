//! Block transfers with device errors mapped to [`FsError`].

use block_io::BlockDevice;
use flatfs_types::{BLOCK_SIZE, BlockRepr, DataBlockNo};

use crate::FsError;

pub(crate) fn read<D, T>(device: &mut D, index: usize, block: &mut T) -> Result<(), FsError>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
    T: BlockRepr,
{
    device
        .read(index, block.block_mut())
        .map_err(FsError::device)
}

pub(crate) fn write<D, T>(device: &mut D, index: usize, block: &T) -> Result<(), FsError>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
    T: BlockRepr,
{
    device.write(index, block.block()).map_err(FsError::device)
}

pub(crate) fn read_data<D>(
    device: &mut D,
    bn: DataBlockNo,
    data: &mut [u8; BLOCK_SIZE],
) -> Result<(), FsError>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    device
        .read(bn.device_index(), data)
        .map_err(FsError::device)
}

pub(crate) fn write_data<D>(
    device: &mut D,
    bn: DataBlockNo,
    data: &[u8; BLOCK_SIZE],
) -> Result<(), FsError>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    device
        .write(bn.device_index(), data)
        .map_err(FsError::device)
}

/// Zeros a data block.
pub(crate) fn zero_data<D>(device: &mut D, bn: DataBlockNo) -> Result<(), FsError>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    write_data(device, bn, &[0; BLOCK_SIZE])
}
