use super::volume::Volume;
use super::{BlockDevice, DirEntryView, FsError, Result, VolumeInfo};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};
use spin::RwLock;

// 文件系统的使用者通过 FatFileSystem 完成所有操作：先 mount 一个块设备，
// 之后用文件名 create/delete/open，用 open 返回的描述符 read/write/seek/stat，
// 所有描述符都 close 之后才能 unmount。
// 同一时刻最多挂载一个卷；未挂载时除 mount 以外的操作都返回 NotMounted。

/// Handle returned by `open`, valid until `close`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDescriptor(pub usize);

impl Display for FileDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file system shared between concurrent callers: readers (`info`, `list`,
/// `stat`, `tell`) take the read lock, everything else the write lock
pub type SharedFileSystem = Arc<RwLock<FatFileSystem>>;

///A FAT file system on a block device
#[derive(Default)]
pub struct FatFileSystem {
    volume: Option<Volume>,
}

impl FatFileSystem {
    /// An unmounted file system
    pub const fn new() -> Self {
        Self { volume: None }
    }

    /// Write an empty volume with `data_blocks` data blocks onto the device.
    ///
    /// The device must hold exactly `geometry_for(data_blocks)` blocks.
    pub fn format(block_device: Arc<dyn BlockDevice>, data_blocks: usize) -> Result<()> {
        Volume::format(block_device, data_blocks)
    }

    /// Wrap for use from several callers
    pub fn into_shared(self) -> SharedFileSystem {
        Arc::new(RwLock::new(self))
    }

    fn volume(&self) -> Result<&Volume> {
        self.volume.as_ref().ok_or(FsError::NotMounted)
    }

    fn volume_mut(&mut self) -> Result<&mut Volume> {
        self.volume.as_mut().ok_or(FsError::NotMounted)
    }

    /// Mount the volume on `block_device`
    pub fn mount(&mut self, block_device: Arc<dyn BlockDevice>) -> Result<()> {
        if self.volume.is_some() {
            return Err(FsError::AlreadyMounted);
        }
        self.volume = Some(Volume::mount(block_device)?);
        Ok(())
    }

    /// Unmount, failing with `FilesOpen` while any descriptor is open
    pub fn unmount(&mut self) -> Result<()> {
        if self.volume()?.open_count() > 0 {
            return Err(FsError::FilesOpen);
        }
        match self.volume.take() {
            Some(volume) => volume.release(),
            None => Err(FsError::NotMounted),
        }
    }

    /// Whether a volume is mounted
    pub fn is_mounted(&self) -> bool {
        self.volume.is_some()
    }

    /// Geometry and free space
    pub fn info(&self) -> Result<VolumeInfo> {
        Ok(self.volume()?.info())
    }

    /// Create an empty file
    pub fn create(&mut self, name: &str) -> Result<()> {
        self.volume_mut()?.create(name)
    }

    /// Delete a closed file and free its blocks
    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.volume_mut()?.delete(name)
    }

    /// Every file, in directory slot order
    pub fn list(&self) -> Result<Vec<DirEntryView>> {
        Ok(self.volume()?.list())
    }

    /// Open a file with its offset at 0
    pub fn open(&mut self, name: &str) -> Result<FileDescriptor> {
        self.volume_mut()?.open(name)
    }

    /// Close a descriptor
    pub fn close(&mut self, fd: FileDescriptor) -> Result<()> {
        self.volume_mut()?.close(fd)
    }

    /// Size in bytes of the file behind `fd`
    pub fn stat(&self, fd: FileDescriptor) -> Result<u32> {
        self.volume()?.stat(fd)
    }

    /// Current offset of `fd`
    pub fn tell(&self, fd: FileDescriptor) -> Result<usize> {
        self.volume()?.tell(fd)
    }

    /// Move the offset of `fd`; `offset` may equal the file size
    pub fn seek(&mut self, fd: FileDescriptor, offset: usize) -> Result<()> {
        self.volume_mut()?.seek(fd, offset)
    }

    /// Read up to `len` bytes, fewer at end of file
    pub fn read(&mut self, fd: FileDescriptor, len: usize) -> Result<Vec<u8>> {
        self.volume_mut()?.read(fd, len)
    }

    /// Write `data`, returning how many bytes fit on the volume
    pub fn write(&mut self, fd: FileDescriptor, data: &[u8]) -> Result<usize> {
        self.volume_mut()?.write(fd, data)
    }
}
