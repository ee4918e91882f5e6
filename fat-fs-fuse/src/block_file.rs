use fat_fs::{BlockDevice, DeviceError, DeviceErrorKind, BLOCK_SZ};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// A disk image file used as a block device
pub struct BlockFile {
    file: Mutex<File>,
    blocks: usize,
}

impl BlockFile {
    /// Open an existing image; its length must be a whole number of blocks
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len % BLOCK_SZ != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("image size {} is not a multiple of {}", len, BLOCK_SZ),
            ));
        }
        Ok(Self {
            file: Mutex::new(file),
            blocks: len / BLOCK_SZ,
        })
    }

    /// Create (or truncate) an image of `blocks` zeroed blocks
    pub fn create(path: impl AsRef<Path>, blocks: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((blocks * BLOCK_SZ) as u64)?;
        Ok(Self {
            file: Mutex::new(file),
            blocks,
        })
    }

    fn transfer(
        &self,
        block_id: usize,
        kind: DeviceErrorKind,
        f: impl FnOnce(&mut File) -> io::Result<()>,
    ) -> Result<(), DeviceError> {
        if block_id >= self.blocks {
            return Err(DeviceError::new(block_id, DeviceErrorKind::OutOfRange));
        }
        let mut file = self
            .file
            .lock()
            .map_err(|_| DeviceError::new(block_id, kind))?;
        file.seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
            .and_then(|_| f(&mut file))
            .map_err(|err| {
                log::error!("block {}: {}", block_id, err);
                match err.kind() {
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => {
                        DeviceError::new(block_id, DeviceErrorKind::Short)
                    }
                    _ => DeviceError::new(block_id, kind),
                }
            })
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.transfer(block_id, DeviceErrorKind::Read, |file| file.read_exact(buf))
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        self.transfer(block_id, DeviceErrorKind::Write, |file| file.write_all(buf))
    }

    fn num_blocks(&self) -> usize {
        self.blocks
    }

    fn close(&self) -> Result<(), DeviceError> {
        self.file
            .lock()
            .map_err(|_| DeviceError::new(0, DeviceErrorKind::Write))?
            .sync_all()
            .map_err(|_| DeviceError::new(0, DeviceErrorKind::Write))
    }
}
