use alloc::boxed::Box;
use core::error::Error;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// A file name or file descriptor does not resolve.
    #[error("no such file or file descriptor")]
    NotFound,
    #[error("file exists")]
    AlreadyExists,
    /// Bad file name, seek target out of range, or an attempt to grow a
    /// file by truncation.
    #[error("invalid argument")]
    InvalidArgument,
    /// Directory full, descriptor table full, or out of data blocks.
    #[error("resource exhausted")]
    ResourceExhausted,
    /// The file still has open descriptors.
    #[error("file is busy")]
    Busy,
    #[error("block device failure")]
    DeviceFailure(#[source] Box<dyn Error + Send + Sync>),
    /// The device does not hold a consistent volume.
    #[error("corrupted volume")]
    Corrupted,
}

impl FsError {
    pub(crate) fn device<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::DeviceFailure(Box::new(error))
    }
}
