//! Reading and writing file contents through descriptors.

use core::cmp;

use block_io::BlockDevice;
use flatfs_params::MAX_VOLUME_BYTES;
use flatfs_types::{BLOCK_SIZE, DataBlockNo};
use log::{debug, trace, warn};

use crate::{FileDescriptor, FsError, Volume, device};

/// Target of [`Volume::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    /// Offset from the beginning of the file.
    Start(u64),
    /// Offset from the current position.
    Current(i64),
    /// Offset from the end of the file.
    End(i64),
}

impl<D> Volume<D>
where
    D: BlockDevice<BLOCK_SIZE>,
    D::Error: core::error::Error + Send + Sync + 'static,
{
    /// Reads from the descriptor's offset into `buf`.
    ///
    /// Returns the number of bytes read, which is 0 at the end of the file.
    pub fn read(&mut self, fd: FileDescriptor, buf: &mut [u8]) -> Result<usize, FsError> {
        let file = self.files.get(fd)?;
        let entry = self.entry(file)?;
        let len = cmp::min(buf.len(), entry.size - file.offset);
        if len == 0 {
            return Ok(0);
        }

        let chain = self.fat.chain(entry.head)?;
        let start = file.offset;
        let end = start + len;
        let mut block = [0; BLOCK_SIZE];
        let mut pos = start;
        while pos < end {
            let off = pos % BLOCK_SIZE;
            let n = cmp::min(BLOCK_SIZE - off, end - pos);
            let bn = *chain.get(pos / BLOCK_SIZE).ok_or(FsError::Corrupted)?;
            device::read_data(self.device(), bn, &mut block)?;
            buf[pos - start..][..n].copy_from_slice(&block[off..][..n]);
            pos += n;
        }

        self.files.get_mut(fd)?.offset = end;
        trace!("read fd {fd}: {len} bytes at {start}");
        Ok(len)
    }

    /// Writes `data` at the descriptor's offset, growing the file as needed.
    ///
    /// The total size of all files never exceeds [`MAX_VOLUME_BYTES`], and a
    /// file only grows into blocks that are free; a write that would pass
    /// either limit is shortened. Returns the number of bytes written, which
    /// is 0 when nothing fits.
    pub fn write(&mut self, fd: FileDescriptor, data: &[u8]) -> Result<usize, FsError> {
        let file = self.files.get(fd)?;
        let used = self.dir.used_bytes();
        if data.is_empty() {
            return Ok(0);
        }
        if used >= MAX_VOLUME_BYTES {
            warn!("write fd {fd}: volume quota of {MAX_VOLUME_BYTES} bytes reached");
            return Ok(0);
        }

        let entry = self.entry(file)?;
        let (size, head) = (entry.size, entry.head);
        let mut chain = self.fat.chain(head)?;
        let fresh = chain.len();

        let start = file.offset;
        let quota_end = size + (MAX_VOLUME_BYTES - used);
        let space_end = (fresh + self.fat.free_count()) * BLOCK_SIZE;
        let end = cmp::min(start + data.len(), cmp::min(quota_end, space_end));
        if end <= start {
            warn!("write fd {fd}: no free blocks");
            return Ok(0);
        }
        if end < start + data.len() {
            warn!(
                "write fd {fd}: shortened to {} of {} bytes",
                end - start,
                data.len()
            );
        }
        let data = &data[..end - start];
        let new_size = cmp::max(size, end);

        let needed = new_size.div_ceil(BLOCK_SIZE);
        if needed > fresh {
            let blocks = self.fat.allocate(needed - fresh, chain.last().copied())?;
            debug!(
                "write fd {fd}: allocated {} blocks from {}",
                blocks.len(),
                blocks[0]
            );
            chain.extend(blocks);
        }

        if let Err(e) = self.write_blocks(&chain, fresh, start, data) {
            if chain.len() > fresh {
                self.fat.cut(&chain, fresh);
            }
            return Err(e);
        }

        let entry = self.entry_mut(file)?;
        if entry.head.is_none() {
            entry.head = chain.first().copied();
        }
        entry.size = new_size;
        self.files.get_mut(fd)?.offset = end;
        trace!("write fd {fd}: {} bytes at {start}", data.len());
        Ok(data.len())
    }

    /// Copies `data` into the file at byte `start`.
    ///
    /// Blocks of `chain` from index `fresh` on were just allocated and are
    /// written from a zeroed buffer.
    fn write_blocks(
        &mut self,
        chain: &[DataBlockNo],
        fresh: usize,
        start: usize,
        data: &[u8],
    ) -> Result<(), FsError> {
        let end = start + data.len();
        let mut block = [0; BLOCK_SIZE];
        let mut pos = start;
        while pos < end {
            let index = pos / BLOCK_SIZE;
            let off = pos % BLOCK_SIZE;
            let n = cmp::min(BLOCK_SIZE - off, end - pos);
            let bn = *chain.get(index).ok_or(FsError::Corrupted)?;
            if index >= fresh {
                block.fill(0);
            } else if n < BLOCK_SIZE {
                device::read_data(self.device(), bn, &mut block)?;
            }
            block[off..][..n].copy_from_slice(&data[pos - start..][..n]);
            device::write_data(self.device(), bn, &block)?;
            pos += n;
        }
        Ok(())
    }

    /// Moves the descriptor's offset and returns the new offset.
    ///
    /// The offset cannot be moved before the beginning or past the end of
    /// the file.
    pub fn seek(&mut self, fd: FileDescriptor, pos: SeekFrom) -> Result<usize, FsError> {
        let file = self.files.get(fd)?;
        let size = self.entry(file)?.size;
        let offset = match pos {
            SeekFrom::Start(n) => usize::try_from(n).ok(),
            SeekFrom::Current(n) => isize::try_from(n)
                .ok()
                .and_then(|n| file.offset.checked_add_signed(n)),
            SeekFrom::End(n) => isize::try_from(n)
                .ok()
                .and_then(|n| size.checked_add_signed(n)),
        };
        let offset = offset
            .filter(|offset| *offset <= size)
            .ok_or(FsError::InvalidArgument)?;
        self.files.get_mut(fd)?.offset = offset;
        Ok(offset)
    }

    /// Shrinks a file to `len` bytes.
    ///
    /// Blocks past the new end are zeroed and freed. Every descriptor of the
    /// file whose offset lies past the new end is moved to it.
    pub fn truncate(&mut self, fd: FileDescriptor, len: usize) -> Result<(), FsError> {
        let file = self.files.get(fd)?;
        let entry = self.entry(file)?;
        let (size, head) = (entry.size, entry.head);
        if len == size {
            return Ok(());
        }
        if len > size {
            return Err(FsError::InvalidArgument);
        }

        let chain = self.fat.chain(head)?;
        let keep = len.div_ceil(BLOCK_SIZE);
        for bn in chain.iter().skip(keep) {
            device::zero_data(self.device(), *bn)?;
        }
        let tail = len % BLOCK_SIZE;
        if tail != 0 {
            let bn = *chain.get(keep - 1).ok_or(FsError::Corrupted)?;
            let mut block = [0; BLOCK_SIZE];
            device::read_data(self.device(), bn, &mut block)?;
            block[tail..].fill(0);
            device::write_data(self.device(), bn, &block)?;
        }
        self.fat.cut(&chain, keep);

        let entry = self.entry_mut(file)?;
        entry.size = len;
        if keep == 0 {
            entry.head = None;
        }
        for file in self.files.open_on(file.slot) {
            file.offset = cmp::min(file.offset, len);
        }
        debug!(
            "truncate fd {fd}: {size} -> {len} bytes, freed {} blocks",
            chain.len().saturating_sub(keep)
        );
        Ok(())
    }
}
