use super::{
    BlockBuf, BlockDevice, FsError, Result, SuperBlock, FAT_ENTRIES_PER_BLOCK, FAT_EOC, FAT_FREE,
};
use alloc::collections::BTreeSet;
use alloc::sync::Arc;
use alloc::vec::Vec;

// FAT 在内存中就是一个 u16 数组，下标即数据块编号，链表的“指针”就是数组下标。
// 表项 0 保留（格式化时写成 FAT_EOC），分配时从 1 开始线性扫描，取第一个空闲项。
// 每次修改表项之后只需要把它所在的那一个 FAT 块写回磁盘。
/// The in-memory allocation table
pub struct Fat {
    entries: Vec<u16>,
    start_block_id: usize,
}

impl Fat {
    /// Load `sb.data_blocks` entries from the FAT blocks following the super block
    pub fn load(sb: &SuperBlock, block_device: &Arc<dyn BlockDevice>) -> Result<Self> {
        let count = sb.data_blocks as usize;
        let mut entries = Vec::with_capacity(count);
        for block in 0..sb.fat_blocks as usize {
            if entries.len() == count {
                break;
            }
            BlockBuf::load(1 + block, Arc::clone(block_device))?.read(|raw| {
                for pair in raw.chunks_exact(2) {
                    if entries.len() == count {
                        break;
                    }
                    entries.push(u16::from_le_bytes([pair[0], pair[1]]));
                }
            });
        }
        Ok(Self {
            entries,
            start_block_id: 1,
        })
    }

    /// A fresh table: everything free except the reserved entry 0
    pub fn fresh(data_blocks: usize) -> Self {
        let mut entries = alloc::vec![FAT_FREE; data_blocks];
        entries[0] = FAT_EOC;
        Self {
            entries,
            start_block_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn free_count(&self) -> usize {
        self.entries
            .iter()
            .skip(1)
            .filter(|entry| **entry == FAT_FREE)
            .count()
    }

    /// Entry following `index` in its chain
    pub fn next(&self, index: u16) -> Result<u16> {
        match self.entries.get(index as usize) {
            Some(&FAT_FREE) | None => {
                error!("fat-fs: chain runs into bad entry {}", index);
                Err(FsError::CorruptChain { index })
            }
            Some(&next) => Ok(next),
        }
    }

    /// Walk `steps` links from `first`, `Ok(None)` if the chain ends earlier
    pub fn nth(&self, first: u16, steps: usize) -> Result<Option<u16>> {
        let mut current = first;
        for _ in 0..steps {
            if current == FAT_EOC {
                return Ok(None);
            }
            current = self.next(current)?;
        }
        Ok(if current == FAT_EOC { None } else { Some(current) })
    }

    /// Every block of the chain starting at `first`, in order
    pub fn chain(&self, first: u16) -> Result<Vec<u16>> {
        let mut blocks = Vec::new();
        let mut current = first;
        while current != FAT_EOC {
            if current == 0 || blocks.len() >= self.entries.len() {
                return Err(FsError::CorruptChain { index: current });
            }
            blocks.push(current);
            current = self.next(current)?;
        }
        Ok(blocks)
    }

    /// Take the first free entry, link it after `tail` and persist the change.
    ///
    /// `tail == FAT_EOC` starts a new chain.
    pub fn alloc_after(&mut self, tail: u16, block_device: &Arc<dyn BlockDevice>) -> Result<u16> {
        let index = self
            .entries
            .iter()
            .skip(1)
            .position(|entry| *entry == FAT_FREE)
            .map(|pos| pos + 1)
            .ok_or(FsError::VolumeFull)? as u16;
        self.entries[index as usize] = FAT_EOC;
        let mut dirty = BTreeSet::new();
        dirty.insert(self.block_of(index));
        if tail != FAT_EOC {
            self.entries[tail as usize] = index;
            dirty.insert(self.block_of(tail));
        }
        self.store(&dirty, block_device)?;
        trace!("fat-fs: allocated data block {} after {}", index, tail);
        Ok(index)
    }

    /// Free every entry of the chain starting at `first`, returning how many were freed
    pub fn free_chain(&mut self, first: u16, block_device: &Arc<dyn BlockDevice>) -> Result<usize> {
        let blocks = self.chain(first)?;
        let mut dirty = BTreeSet::new();
        for index in blocks.iter() {
            self.entries[*index as usize] = FAT_FREE;
            dirty.insert(self.block_of(*index));
        }
        self.store(&dirty, block_device)?;
        Ok(blocks.len())
    }

    /// Write every FAT block to disk
    pub fn store_all(&self, fat_blocks: usize, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        let all: BTreeSet<usize> = (0..fat_blocks).collect();
        self.store(&all, block_device)
    }

    /// FAT block (relative to the start of the FAT) that holds `index`
    fn block_of(&self, index: u16) -> usize {
        index as usize / FAT_ENTRIES_PER_BLOCK
    }

    fn store(&self, blocks: &BTreeSet<usize>, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        for block in blocks.iter() {
            let mut buf = BlockBuf::zeroed(self.start_block_id + block, Arc::clone(block_device));
            let first = block * FAT_ENTRIES_PER_BLOCK;
            buf.modify(|raw| {
                for (pair, entry) in raw
                    .chunks_exact_mut(2)
                    .zip(self.entries.iter().skip(first))
                {
                    pair.copy_from_slice(&entry.to_le_bytes());
                }
            });
            buf.store()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemBlockDevice;

    fn device() -> Arc<dyn BlockDevice> {
        Arc::new(MemBlockDevice::new(4))
    }

    #[test]
    fn first_fit_skips_reserved_entry() {
        let dev = device();
        let mut fat = Fat::fresh(10);
        assert_eq!(fat.free_count(), 9);
        let a = fat.alloc_after(FAT_EOC, &dev).unwrap();
        let b = fat.alloc_after(a, &dev).unwrap();
        let c = fat.alloc_after(FAT_EOC, &dev).unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(fat.chain(a).unwrap(), alloc::vec![1, 2]);
        assert_eq!(fat.free_count(), 6);
        assert_eq!(fat.free_chain(a, &dev).unwrap(), 2);
        assert_eq!(fat.alloc_after(c, &dev).unwrap(), 1);
        assert_eq!(fat.chain(c).unwrap(), alloc::vec![3, 1]);
    }

    #[test]
    fn nth_walks_links() {
        let dev = device();
        let mut fat = Fat::fresh(10);
        let mut tail = fat.alloc_after(FAT_EOC, &dev).unwrap();
        let first = tail;
        for _ in 0..3 {
            tail = fat.alloc_after(tail, &dev).unwrap();
        }
        assert_eq!(fat.nth(first, 0).unwrap(), Some(1));
        assert_eq!(fat.nth(first, 3).unwrap(), Some(4));
        assert_eq!(fat.nth(first, 4).unwrap(), None);
        assert_eq!(fat.nth(FAT_EOC, 0).unwrap(), None);
    }

    #[test]
    fn full_table_reports_volume_full() {
        let dev = device();
        let mut fat = Fat::fresh(3);
        fat.alloc_after(FAT_EOC, &dev).unwrap();
        fat.alloc_after(FAT_EOC, &dev).unwrap();
        assert_eq!(fat.alloc_after(FAT_EOC, &dev), Err(FsError::VolumeFull));
    }

    #[test]
    fn cycles_and_free_links_are_corrupt() {
        let mut fat = Fat::fresh(4);
        fat.entries[1] = 2;
        fat.entries[2] = 1;
        assert!(matches!(fat.chain(1), Err(FsError::CorruptChain { .. })));
        fat.entries[2] = 3;
        assert_eq!(fat.chain(1), Err(FsError::CorruptChain { index: 3 }));
    }

    #[test]
    fn store_and_load_round_trip() {
        let dev: Arc<dyn BlockDevice> = Arc::new(MemBlockDevice::new(8));
        let sb = SuperBlock::new(300, 2);
        let mut fat = Fat::fresh(300);
        fat.store_all(2, &dev).unwrap();
        fat.entries[299] = 5;
        let dirty: BTreeSet<usize> = [fat.block_of(299)].into_iter().collect();
        fat.store(&dirty, &dev).unwrap();
        let loaded = Fat::load(&sb, &dev).unwrap();
        assert_eq!(loaded.entries, fat.entries);
        assert_eq!(loaded.len(), 300);
    }
}
