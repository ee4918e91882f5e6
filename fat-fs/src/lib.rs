//!A FAT file system isolated from the host
#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

// fat-fs 与底层设备之间只通过抽象接口 BlockDevice 来连接，不依赖任何宿主操作系统的功能，
// 所以可以独立于内核开发、在用户态测试。
//
// 磁盘按照块编号从小到大分成 4 个连续区域：
// 1. 超级块（block 0），记录其余区域的位置，用签名检查文件系统的合法性
// 2. FAT 区域，若干个块，每个数据块对应一个 u16 表项：0 = 空闲，0xFFFF = 链尾，其它 = 链上的下一个块
// 3. 根目录，恰好一个块，FILE_MAX_COUNT 个定长目录项
// 4. 数据块区域，按 FAT 下标寻址；0 号数据块保留，永远不会被分配

extern crate alloc;
#[macro_use]
extern crate log;

mod block_buf;
mod block_dev;
mod error;
mod fat;
mod io;
mod layout;
mod vfs;
mod volume;

/// Use a block size of 512 bytes
pub const BLOCK_SZ: usize = 512;
/// Max number of files in the root directory
pub const FILE_MAX_COUNT: usize = BLOCK_SZ / DIRENT_SZ;
/// Max number of simultaneously open descriptors
pub const OPEN_MAX_COUNT: usize = 32;
/// Length of the on-disk name field, NUL terminator included
pub const FILENAME_LEN: usize = 16;
/// Max number of data blocks `format` accepts
pub const MAX_DATA_BLOCKS: usize = 8192;

use block_buf::{merge_block, BlockBuf, DataBlock};
pub use block_dev::{BlockDevice, DeviceError, DeviceErrorKind, MemBlockDevice};
pub use error::{FsError, Result};
use fat::Fat;
use layout::*;
pub use layout::{FAT_EOC, FAT_FREE};
pub use vfs::{FatFileSystem, FileDescriptor, SharedFileSystem};
pub use volume::{geometry_for, DirEntryView, VolumeInfo};
