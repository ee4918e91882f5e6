use super::{DataBlock, BLOCK_SZ, FILENAME_LEN};
use core::fmt::{Debug, Formatter, Result};

/// Signature for sanity check
const FS_SIGNATURE: [u8; 8] = *b"ECS150FS";
/// FAT value of a free data block
pub const FAT_FREE: u16 = 0;
/// FAT value of the last block of a chain
pub const FAT_EOC: u16 = 0xFFFF;
/// Number of FAT entries packed in one block
pub const FAT_ENTRIES_PER_BLOCK: usize = BLOCK_SZ / 2;
/// Size of one on-disk directory entry
pub const DIRENT_SZ: usize = 32;

// 超级块在磁盘上的字节布局（小端、紧凑排列），其余字节填 0 直到一个块：
// signature[8] | total_blocks u16 | root_dir_block u16 | data_start u16 | data_blocks u16 | fat_blocks u8
const SB_TOTAL: usize = 8;
const SB_ROOT: usize = 10;
const SB_DATA_START: usize = 12;
const SB_DATA_BLOCKS: usize = 14;
const SB_FAT_BLOCKS: usize = 16;

/// Super block of a filesystem
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    signature: [u8; 8],
    pub total_blocks: u16,
    pub root_dir_block: u16,
    pub data_start: u16,
    pub data_blocks: u16,
    pub fat_blocks: u8,
}

impl Debug for SuperBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("SuperBlock")
            .field("total_blocks", &self.total_blocks)
            .field("root_dir_block", &self.root_dir_block)
            .field("data_start", &self.data_start)
            .field("data_blocks", &self.data_blocks)
            .field("fat_blocks", &self.fat_blocks)
            .finish()
    }
}

impl SuperBlock {
    /// Geometry of a fresh volume with `data_blocks` data blocks
    pub fn new(data_blocks: u16, fat_blocks: u8) -> Self {
        let root_dir_block = fat_blocks as u16 + 1;
        Self {
            signature: FS_SIGNATURE,
            total_blocks: root_dir_block + 1 + data_blocks,
            root_dir_block,
            data_start: root_dir_block + 1,
            data_blocks,
            fat_blocks,
        }
    }

    pub fn decode(block: &DataBlock) -> Self {
        let u16_at = |pos: usize| u16::from_le_bytes([block[pos], block[pos + 1]]);
        let mut signature = [0u8; 8];
        signature.copy_from_slice(&block[..8]);
        Self {
            signature,
            total_blocks: u16_at(SB_TOTAL),
            root_dir_block: u16_at(SB_ROOT),
            data_start: u16_at(SB_DATA_START),
            data_blocks: u16_at(SB_DATA_BLOCKS),
            fat_blocks: block[SB_FAT_BLOCKS],
        }
    }

    pub fn encode(&self, block: &mut DataBlock) {
        block.fill(0);
        block[..8].copy_from_slice(&self.signature);
        block[SB_TOTAL..SB_TOTAL + 2].copy_from_slice(&self.total_blocks.to_le_bytes());
        block[SB_ROOT..SB_ROOT + 2].copy_from_slice(&self.root_dir_block.to_le_bytes());
        block[SB_DATA_START..SB_DATA_START + 2].copy_from_slice(&self.data_start.to_le_bytes());
        block[SB_DATA_BLOCKS..SB_DATA_BLOCKS + 2]
            .copy_from_slice(&self.data_blocks.to_le_bytes());
        block[SB_FAT_BLOCKS] = self.fat_blocks;
    }

    pub fn is_valid(&self) -> bool {
        self.signature == FS_SIGNATURE
    }

    /// Check the regions tile the volume, returning what is wrong otherwise
    pub fn check_geometry(&self) -> core::result::Result<(), &'static str> {
        if self.fat_blocks == 0 {
            return Err("no FAT blocks");
        }
        if self.root_dir_block != self.fat_blocks as u16 + 1 {
            return Err("root directory does not follow the FAT");
        }
        if self.data_start as u32 != self.root_dir_block as u32 + 1 {
            return Err("data area does not follow the root directory");
        }
        if self.data_blocks == 0 {
            return Err("no data blocks");
        }
        if self.data_start as u32 + self.data_blocks as u32 != self.total_blocks as u32 {
            return Err("data area does not end at the last block");
        }
        if (self.fat_blocks as usize) * FAT_ENTRIES_PER_BLOCK < self.data_blocks as usize {
            return Err("FAT too small for the data area");
        }
        Ok(())
    }
}

// 目录项：name[16] | size u32 | first_block u16 | 10 字节保留，共 32 字节
const DE_SIZE: usize = FILENAME_LEN;
const DE_FIRST: usize = FILENAME_LEN + 4;

/// A root directory slot. An empty name marks the slot free.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DirEntry {
    name: [u8; FILENAME_LEN],
    pub size: u32,
    pub first_block: u16,
}

impl DirEntry {
    pub fn empty() -> Self {
        Self {
            name: [0u8; FILENAME_LEN],
            size: 0,
            first_block: 0,
        }
    }

    /// A fresh, empty file; `name` must already be validated
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; FILENAME_LEN];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Self {
            name: bytes,
            size: 0,
            first_block: FAT_EOC,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(FILENAME_LEN);
        &self.name[..len]
    }

    pub fn name_matches(&self, name: &str) -> bool {
        !self.is_empty() && self.name_bytes() == name.as_bytes()
    }

    pub fn decode(raw: &[u8]) -> Self {
        let mut name = [0u8; FILENAME_LEN];
        name.copy_from_slice(&raw[..FILENAME_LEN]);
        Self {
            name,
            size: u32::from_le_bytes([
                raw[DE_SIZE],
                raw[DE_SIZE + 1],
                raw[DE_SIZE + 2],
                raw[DE_SIZE + 3],
            ]),
            first_block: u16::from_le_bytes([raw[DE_FIRST], raw[DE_FIRST + 1]]),
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[..DIRENT_SZ].fill(0);
        raw[..FILENAME_LEN].copy_from_slice(&self.name);
        raw[DE_SIZE..DE_SIZE + 4].copy_from_slice(&self.size.to_le_bytes());
        raw[DE_FIRST..DE_FIRST + 2].copy_from_slice(&self.first_block.to_le_bytes());
    }
}

/// Check a file name fits a directory entry
pub fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() < FILENAME_LEN && !name.as_bytes().contains(&0)
}
