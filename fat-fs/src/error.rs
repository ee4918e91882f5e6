//! Errors returned by every fallible file system operation.

use crate::DeviceError;
use thiserror::Error;

/// Result alias used throughout fat-fs
pub type Result<T> = core::result::Result<T, FsError>;

/// Everything that can go wrong in a file system call.
///
/// Short reads and short writes are not errors: running out of file data or
/// out of free blocks is reported through the transferred count instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No volume is mounted
    #[error("no volume is mounted")]
    NotMounted,
    /// A volume is already mounted
    #[error("a volume is already mounted")]
    AlreadyMounted,
    /// The device does not hold a valid volume
    #[error("invalid volume: {0}")]
    InvalidVolume(&'static str),
    /// The block device failed
    #[error("device error: {0}")]
    DeviceIo(#[from] DeviceError),
    /// Name is empty, too long or contains a NUL byte
    #[error("invalid file name")]
    InvalidName,
    /// A file with this name already exists
    #[error("file already exists")]
    NameExists,
    /// The root directory has no free slot
    #[error("root directory is full")]
    DirectoryFull,
    /// No file with this name
    #[error("no such file")]
    NotFound,
    /// The file still has open descriptors
    #[error("file is open")]
    FileOpen,
    /// Descriptor out of range or not open
    #[error("bad file descriptor")]
    BadDescriptor,
    /// Seek beyond the end of file
    #[error("offset out of range")]
    OffsetOutOfRange,
    /// The open-file table is full
    #[error("too many open files")]
    TooManyOpen,
    /// No free data block is left
    #[error("no free data block")]
    VolumeFull,
    /// Unmount while descriptors are still open
    #[error("files are still open")]
    FilesOpen,
    /// A FAT chain leaves the data area or loops
    #[error("corrupt FAT chain at entry {index}")]
    CorruptChain {
        /// the offending FAT entry
        index: u16,
    },
}
