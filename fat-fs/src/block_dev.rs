use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt::{self, Display, Formatter};
use spin::Mutex;

use crate::BLOCK_SZ;

/// API provided for File System
///
/// Buffers passed in are always exactly `BLOCK_SZ` bytes long.
pub trait BlockDevice: Send + Sync + Any {
    /// read from block data to `buf`
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError>;
    /// write data back to block
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError>;
    /// number of blocks the device holds
    fn num_blocks(&self) -> usize;
    /// release the device, called once on unmount
    fn close(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// What kind of transfer failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// reading the block failed
    Read,
    /// writing the block failed
    Write,
    /// block index past the end of the device
    OutOfRange,
    /// the device transferred less than a whole block
    Short,
}

/// A failed block transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError {
    /// block being transferred
    pub block: usize,
    /// what went wrong
    pub kind: DeviceErrorKind,
}

impl DeviceError {
    /// Build an error for `block`
    pub fn new(block: usize, kind: DeviceErrorKind) -> Self {
        Self { block, kind }
    }
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            DeviceErrorKind::Read => "read failed",
            DeviceErrorKind::Write => "write failed",
            DeviceErrorKind::OutOfRange => "out of range",
            DeviceErrorKind::Short => "short transfer",
        };
        write!(f, "block {}: {}", self.block, what)
    }
}

impl core::error::Error for DeviceError {}

/// A block device kept entirely in memory
pub struct MemBlockDevice {
    data: Mutex<Vec<u8>>,
}

impl MemBlockDevice {
    /// A zero-filled device of `blocks` blocks
    pub fn new(blocks: usize) -> Self {
        Self {
            data: Mutex::new(vec![0u8; blocks * BLOCK_SZ]),
        }
    }

    /// Wrap an existing image; trailing bytes beyond the last whole block are ignored
    pub fn from_image(mut image: Vec<u8>) -> Self {
        image.truncate(image.len() / BLOCK_SZ * BLOCK_SZ);
        Self {
            data: Mutex::new(image),
        }
    }

    /// Copy of the whole image
    pub fn image(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn range(&self, block_id: usize, len: usize) -> Result<core::ops::Range<usize>, DeviceError> {
        if len != BLOCK_SZ {
            return Err(DeviceError::new(block_id, DeviceErrorKind::Short));
        }
        if block_id >= self.num_blocks() {
            return Err(DeviceError::new(block_id, DeviceErrorKind::OutOfRange));
        }
        Ok(block_id * BLOCK_SZ..(block_id + 1) * BLOCK_SZ)
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        let range = self.range(block_id, buf.len())?;
        buf.copy_from_slice(&self.data.lock()[range]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        let range = self.range(block_id, buf.len())?;
        self.data.lock()[range].copy_from_slice(buf);
        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.data.lock().len() / BLOCK_SZ
    }
}
