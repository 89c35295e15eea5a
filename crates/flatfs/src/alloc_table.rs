//! In-memory copy of the block allocation table.
//!
//! The table is the only record of which data blocks are in use and how
//! they are chained. Every chain is walked on this copy; the device only
//! sees the table when it is stored back.

use alloc::{vec, vec::Vec};

use block_io::BlockDevice;
use dataview::PodMethods as _;
use flatfs_types::{
    BLOCK_SIZE, DataBlockNo, FAT_ENTRIES_PER_BLOCK, FatBlock, FatEntry, NUM_DATA_BLOCKS,
    SuperBlock,
};

use crate::{FsError, device};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AllocTable {
    entries: Vec<FatEntry>,
}

impl AllocTable {
    /// Creates a table with every block free.
    pub(crate) fn new() -> Self {
        Self {
            entries: vec![FatEntry::Free; NUM_DATA_BLOCKS],
        }
    }

    pub(crate) fn load<D>(device: &mut D, sb: &SuperBlock) -> Result<Self, FsError>
    where
        D: BlockDevice<BLOCK_SIZE>,
        D::Error: core::error::Error + Send + Sync + 'static,
    {
        let mut entries = Vec::with_capacity(NUM_DATA_BLOCKS);
        let mut block = FatBlock::zeroed();
        for i in 0..sb.fat_len() {
            device::read(device, sb.fat_block(i), &mut block)?;
            for j in 0..FAT_ENTRIES_PER_BLOCK {
                if entries.len() == NUM_DATA_BLOCKS {
                    break;
                }
                let entry = block.get(j).ok_or(FsError::Corrupted)?;
                entries.push(entry);
            }
        }
        if entries.len() != NUM_DATA_BLOCKS {
            return Err(FsError::Corrupted);
        }
        Ok(Self { entries })
    }

    pub(crate) fn store<D>(&self, device: &mut D, sb: &SuperBlock) -> Result<(), FsError>
    where
        D: BlockDevice<BLOCK_SIZE>,
        D::Error: core::error::Error + Send + Sync + 'static,
    {
        let mut block = FatBlock::zeroed();
        for (i, chunk) in self.entries.chunks(FAT_ENTRIES_PER_BLOCK).enumerate() {
            block.as_bytes_mut().fill(0);
            for (j, entry) in chunk.iter().enumerate() {
                block.set(j, *entry);
            }
            device::write(device, sb.fat_block(i), &block)?;
        }
        Ok(())
    }

    pub(crate) fn get(&self, bn: DataBlockNo) -> FatEntry {
        self.entries[bn.as_index()]
    }

    pub(crate) fn free_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_free()).count()
    }

    /// Returns the blocks of the chain starting at `head`, in order.
    ///
    /// A chain that reaches a free block or is longer than the data region
    /// (that is, it loops) is reported as [`FsError::Corrupted`].
    pub(crate) fn chain(&self, head: Option<DataBlockNo>) -> Result<Vec<DataBlockNo>, FsError> {
        let mut blocks = vec![];
        let Some(mut bn) = head else {
            return Ok(blocks);
        };
        loop {
            if blocks.len() == NUM_DATA_BLOCKS {
                return Err(FsError::Corrupted);
            }
            blocks.push(bn);
            match self.get(bn) {
                FatEntry::End => return Ok(blocks),
                FatEntry::Next(next) => bn = next,
                FatEntry::Free => return Err(FsError::Corrupted),
            }
        }
    }

    /// Allocates `count` free blocks, lowest index first, and links them
    /// after `tail`.
    ///
    /// The new blocks form a chain terminated by `End`. Nothing is changed
    /// if fewer than `count` blocks are free.
    pub(crate) fn allocate(
        &mut self,
        count: usize,
        tail: Option<DataBlockNo>,
    ) -> Result<Vec<DataBlockNo>, FsError> {
        let blocks = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_free())
            .map(|(i, _)| DataBlockNo::new(i))
            .take(count)
            .collect::<Vec<_>>();
        if blocks.len() < count {
            return Err(FsError::ResourceExhausted);
        }

        for pair in blocks.windows(2) {
            self.entries[pair[0].as_index()] = FatEntry::Next(pair[1]);
        }
        if let (Some(last), Some(first)) = (blocks.last(), blocks.first()) {
            self.entries[last.as_index()] = FatEntry::End;
            if let Some(tail) = tail {
                self.entries[tail.as_index()] = FatEntry::Next(*first);
            }
        }
        Ok(blocks)
    }

    /// Keeps the first `keep` blocks of `chain` and frees the rest.
    ///
    /// `chain` must be a whole chain as returned by [`Self::chain`].
    pub(crate) fn cut(&mut self, chain: &[DataBlockNo], keep: usize) {
        if let Some(last) = keep.checked_sub(1).and_then(|i| chain.get(i)) {
            self.entries[last.as_index()] = FatEntry::End;
        }
        for bn in chain.iter().skip(keep) {
            self.entries[bn.as_index()] = FatEntry::Free;
        }
    }
}

#[cfg(test)]
mod tests {
    use block_io::MemoryDevice;
    use flatfs_types::NUM_BLOCKS;

    use super::*;

    fn bn(n: usize) -> DataBlockNo {
        DataBlockNo::new(n)
    }

    #[test]
    fn test_allocate_first_fit() {
        let mut table = AllocTable::new();
        assert_eq!(table.free_count(), NUM_DATA_BLOCKS);

        let a = table.allocate(3, None).unwrap();
        assert_eq!(a, [bn(0), bn(1), bn(2)]);
        assert_eq!(table.get(bn(0)), FatEntry::Next(bn(1)));
        assert_eq!(table.get(bn(2)), FatEntry::End);

        let b = table.allocate(1, None).unwrap();
        assert_eq!(b, [bn(3)]);

        // grow the first chain; the hole left by freeing is reused
        table.cut(&b, 0);
        let c = table.allocate(2, Some(bn(2))).unwrap();
        assert_eq!(c, [bn(3), bn(4)]);
        assert_eq!(table.chain(Some(bn(0))).unwrap(), [
            bn(0),
            bn(1),
            bn(2),
            bn(3),
            bn(4)
        ]);
        assert_eq!(table.free_count(), NUM_DATA_BLOCKS - 5);
    }

    #[test]
    fn test_allocate_exhausted() {
        let mut table = AllocTable::new();
        table.allocate(NUM_DATA_BLOCKS - 1, None).unwrap();
        let before = table.clone();
        assert!(matches!(
            table.allocate(2, None),
            Err(FsError::ResourceExhausted)
        ));
        assert_eq!(table, before);
        assert_eq!(table.allocate(1, None).unwrap(), [bn(NUM_DATA_BLOCKS - 1)]);
        assert_eq!(table.free_count(), 0);
    }

    #[test]
    fn test_allocate_zero() {
        let mut table = AllocTable::new();
        assert!(table.allocate(0, Some(bn(9))).unwrap().is_empty());
        assert_eq!(table.get(bn(9)), FatEntry::Free);
    }

    #[test]
    fn test_cut() {
        let mut table = AllocTable::new();
        let chain = table.allocate(4, None).unwrap();

        table.cut(&chain, 2);
        assert_eq!(table.chain(Some(bn(0))).unwrap(), [bn(0), bn(1)]);
        assert_eq!(table.get(bn(2)), FatEntry::Free);
        assert_eq!(table.get(bn(3)), FatEntry::Free);

        let chain = table.chain(Some(bn(0))).unwrap();
        table.cut(&chain, 0);
        assert_eq!(table.free_count(), NUM_DATA_BLOCKS);
    }

    #[test]
    fn test_chain_corrupted() {
        let mut table = AllocTable::new();
        assert!(table.chain(None).unwrap().is_empty());
        assert!(matches!(
            table.chain(Some(bn(5))),
            Err(FsError::Corrupted)
        ));

        // a loop
        table.entries[0] = FatEntry::Next(bn(1));
        table.entries[1] = FatEntry::Next(bn(0));
        assert!(matches!(
            table.chain(Some(bn(0))),
            Err(FsError::Corrupted)
        ));
    }

    #[test]
    fn test_store_load() {
        let mut device = MemoryDevice::<BLOCK_SIZE>::new(NUM_BLOCKS);
        let sb = SuperBlock::new();

        let mut table = AllocTable::new();
        table.allocate(3, None).unwrap();
        table.allocate(1, None).unwrap();
        table.allocate(2, Some(bn(2))).unwrap();
        table.store(&mut device, &sb).unwrap();

        let loaded = AllocTable::load(&mut device, &sb).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.chain(Some(bn(0))).unwrap(), [
            bn(0),
            bn(1),
            bn(2),
            bn(4),
            bn(5)
        ]);
    }

    #[test]
    fn test_load_invalid_entry() {
        let mut device = MemoryDevice::<BLOCK_SIZE>::new(NUM_BLOCKS);
        let sb = SuperBlock::new();
        let mut block = [0; BLOCK_SIZE];
        block[..4].copy_from_slice(&0x7fff_0000_u32.to_le_bytes());
        device.write(sb.fat_block(1), &block).unwrap();

        assert!(matches!(
            AllocTable::load(&mut device, &sb),
            Err(FsError::Corrupted)
        ));
    }
}
