use super::{BlockDevice, Result, BLOCK_SZ};
use alloc::sync::Arc;

/// One data block worth of bytes
pub type DataBlock = [u8; BLOCK_SZ];

// BlockBuf 是一个块大小的回弹缓冲区（bounce buffer）：设备只能整块读写，
// 所以任何只覆盖一部分块的修改都要先把整块读进来，在内存中修改，再整块写回。
// 这里没有全局的缓存管理器，也不在 Drop 时回写：
// 所有修改都是 write-through 的，调用者必须显式 store，设备错误才能被传回给调用者。
/// A whole block staged in memory
pub struct BlockBuf {
    buf: DataBlock,
    block_id: usize,
    block_device: Arc<dyn BlockDevice>,
    modified: bool,
}

impl BlockBuf {
    /// Load a block from disk
    pub fn load(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut buf = [0u8; BLOCK_SZ];
        block_device.read_block(block_id, &mut buf)?;
        trace!("fat-fs: read block {}", block_id);
        Ok(Self {
            buf,
            block_id,
            block_device,
            modified: false,
        })
    }

    /// A zero-filled buffer for `block_id`, nothing is read
    pub fn zeroed(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            buf: [0u8; BLOCK_SZ],
            block_id,
            block_device,
            modified: true,
        }
    }

    pub fn read<V>(&self, f: impl FnOnce(&DataBlock) -> V) -> V {
        f(&self.buf)
    }

    pub fn modify<V>(&mut self, f: impl FnOnce(&mut DataBlock) -> V) -> V {
        self.modified = true;
        f(&mut self.buf)
    }

    /// Write the block back if it was modified
    pub fn store(&mut self) -> Result<()> {
        if self.modified {
            self.block_device.write_block(self.block_id, &self.buf)?;
            trace!("fat-fs: wrote block {}", self.block_id);
            self.modified = false;
        }
        Ok(())
    }
}

/// Overlay `bytes` onto a copy of `old` starting at `offset`.
///
/// This is the pure half of a read-modify-write: bytes outside
/// `offset..offset + bytes.len()` keep their old value.
pub fn merge_block(old: &DataBlock, offset: usize, bytes: &[u8]) -> DataBlock {
    assert!(offset + bytes.len() <= BLOCK_SZ);
    let mut new = *old;
    new[offset..offset + bytes.len()].copy_from_slice(bytes);
    new
}
