use super::volume::Volume;
use super::{merge_block, BlockBuf, FileDescriptor, FsError, Result, BLOCK_SZ, FAT_EOC};
use alloc::sync::Arc;
use alloc::vec::Vec;

// 读写都把 (offset, len) 拆成若干个块内的片段：
// 偏移 offset 所在的块是链上第 offset / BLOCK_SZ 个块，块内位置是 offset % BLOCK_SZ。
// 起始块只从链头走一次，之后沿着 FAT 逐块前进。
impl Volume {
    /// Read up to `len` bytes at the descriptor's offset.
    ///
    /// Never reads past the recorded file size; the result is shorter than
    /// `len` when the end of file comes first.
    pub fn read(&mut self, fd: FileDescriptor, len: usize) -> Result<Vec<u8>> {
        let file = self.open_file(fd)?;
        let entry = self.root[file.slot];
        let mut start = file.offset;
        let end = start.saturating_add(len).min(entry.size as usize);
        if start >= end {
            return Ok(Vec::new());
        }
        let mut buf = Vec::with_capacity(end - start);
        let mut block = self.fat.nth(entry.first_block, start / BLOCK_SZ)?;
        while start < end {
            let Some(index) = block else {
                break;
            };
            let inner = start % BLOCK_SZ;
            let block_read_size = (end - start).min(BLOCK_SZ - inner);
            BlockBuf::load(self.data_block_id(index), Arc::clone(&self.block_device))?.read(
                |data_block| buf.extend_from_slice(&data_block[inner..inner + block_read_size]),
            );
            start += block_read_size;
            self.set_offset(fd, start);
            if start < end {
                block = match self.fat.next(index)? {
                    FAT_EOC => None,
                    next => Some(next),
                };
            }
        }
        Ok(buf)
    }

    /// Write `data` at the descriptor's offset, growing the file as needed.
    ///
    /// Returns the number of bytes written, which is short (possibly zero)
    /// when the volume runs out of free blocks.
    pub fn write(&mut self, fd: FileDescriptor, data: &[u8]) -> Result<usize> {
        let file = self.open_file(fd)?;
        if data.is_empty() {
            return Ok(0);
        }
        let slot = file.slot;
        let mut start = file.offset;
        // prev 是 current 在链上的前驱，链需要延长时新块就接在 prev 后面
        let mut prev = FAT_EOC;
        let mut current = self.root[slot].first_block;
        for _ in 0..start / BLOCK_SZ {
            if current == FAT_EOC {
                break;
            }
            prev = current;
            current = self.fat.next(current)?;
        }
        let mut write_size = 0usize;
        while write_size < data.len() {
            if current == FAT_EOC {
                current = match self.fat.alloc_after(prev, &self.block_device) {
                    Ok(index) => index,
                    Err(FsError::VolumeFull) => {
                        warn!(
                            "fat-fs: volume full, wrote {} of {} bytes",
                            write_size,
                            data.len()
                        );
                        break;
                    }
                    Err(err) => return Err(err),
                };
                if prev == FAT_EOC {
                    self.root[slot].first_block = current;
                }
            }
            let inner = start % BLOCK_SZ;
            let block_write_size = (data.len() - write_size).min(BLOCK_SZ - inner);
            let src = &data[write_size..write_size + block_write_size];
            let block_id = self.data_block_id(current);
            // 整块覆盖时不需要先读出旧内容
            let mut block = if block_write_size == BLOCK_SZ {
                BlockBuf::zeroed(block_id, Arc::clone(&self.block_device))
            } else {
                BlockBuf::load(block_id, Arc::clone(&self.block_device))?
            };
            block.modify(|data_block| *data_block = merge_block(data_block, inner, src));
            block.store()?;
            write_size += block_write_size;
            start += block_write_size;
            self.set_offset(fd, start);
            if start > self.root[slot].size as usize {
                self.root[slot].size = start as u32;
                self.store_root()?;
            }
            if start % BLOCK_SZ == 0 {
                prev = current;
                current = self.fat.next(current)?;
            }
        }
        Ok(write_size)
    }
}
