use super::{
    valid_name, BlockBuf, BlockDevice, DirEntry, Fat, FileDescriptor, FsError, Result, SuperBlock,
    DIRENT_SZ, FAT_ENTRIES_PER_BLOCK, FILE_MAX_COUNT, MAX_DATA_BLOCKS, OPEN_MAX_COUNT,
};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::{self, Display, Formatter};

/// Geometry and free space of a mounted volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    /// blocks on the device
    pub total_blocks: usize,
    /// blocks holding the FAT
    pub fat_blocks: usize,
    /// block holding the root directory
    pub root_dir_block: usize,
    /// first data block
    pub data_start: usize,
    /// number of data blocks
    pub data_blocks: usize,
    /// free FAT entries
    pub free_data_blocks: usize,
    /// free root directory slots
    pub free_dir_slots: usize,
}

impl Display for VolumeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "FS Info:")?;
        writeln!(f, "total_blk_count={}", self.total_blocks)?;
        writeln!(f, "fat_blk_count={}", self.fat_blocks)?;
        writeln!(f, "rdir_blk={}", self.root_dir_block)?;
        writeln!(f, "data_blk={}", self.data_start)?;
        writeln!(f, "data_blk_count={}", self.data_blocks)?;
        writeln!(
            f,
            "fat_free_ratio={}/{}",
            self.free_data_blocks, self.data_blocks
        )?;
        write!(f, "rdir_free_ratio={}/{}", self.free_dir_slots, FILE_MAX_COUNT)
    }
}

/// One occupied root directory slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryView {
    /// file name
    pub name: String,
    /// size in bytes
    pub size: u32,
    /// first data block, `FAT_EOC` for an empty file
    pub first_block: u16,
}

impl Display for DirEntryView {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file: {}, size: {}, data_blk: {}",
            self.name, self.size, self.first_block
        )
    }
}

/// Total device blocks needed by a volume with `data_blocks` data blocks
pub fn geometry_for(data_blocks: usize) -> Result<usize> {
    fat_blocks_for(data_blocks).map(|fat_blocks| 1 + fat_blocks + 1 + data_blocks)
}

fn fat_blocks_for(data_blocks: usize) -> Result<usize> {
    if data_blocks == 0 || data_blocks > MAX_DATA_BLOCKS {
        return Err(FsError::InvalidVolume("data block count out of range"));
    }
    Ok((data_blocks + FAT_ENTRIES_PER_BLOCK - 1) / FAT_ENTRIES_PER_BLOCK)
}

/// Per-descriptor state, never persisted
#[derive(Debug, Clone, Copy)]
pub struct OpenFile {
    /// root directory slot the descriptor is bound to
    pub slot: usize,
    /// current byte offset
    pub offset: usize,
}

// Volume 就是一次挂载的全部上下文：超级块、FAT、根目录和打开文件表都是它的字段，
// 卸载时随它一起释放，不存在全局可变状态。
// 所有修改都是 write-through 的：调用返回之前，受影响的 FAT 块、根目录块和数据块都已经写回设备。
/// A mounted volume
pub struct Volume {
    pub(crate) block_device: Arc<dyn BlockDevice>,
    pub(crate) sb: SuperBlock,
    pub(crate) fat: Fat,
    pub(crate) root: [DirEntry; FILE_MAX_COUNT],
    pub(crate) open_files: [Option<OpenFile>; OPEN_MAX_COUNT],
}

impl Volume {
    /// Write an empty volume with `data_blocks` data blocks onto the device
    pub fn format(block_device: Arc<dyn BlockDevice>, data_blocks: usize) -> Result<()> {
        let fat_blocks = fat_blocks_for(data_blocks)?;
        let total_blocks = 1 + fat_blocks + 1 + data_blocks;
        if block_device.num_blocks() != total_blocks {
            return Err(FsError::InvalidVolume(
                "device size does not match the volume geometry",
            ));
        }
        let sb = SuperBlock::new(data_blocks as u16, fat_blocks as u8);
        let mut super_block = BlockBuf::zeroed(0, Arc::clone(&block_device));
        super_block.modify(|block| sb.encode(block));
        super_block.store()?;
        Fat::fresh(data_blocks).store_all(fat_blocks, &block_device)?;
        BlockBuf::zeroed(sb.root_dir_block as usize, Arc::clone(&block_device)).store()?;
        debug!("fat-fs: formatted {:?}", sb);
        Ok(())
    }

    /// Open a block device as a filesystem
    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let device_blocks = block_device.num_blocks();
        if device_blocks == 0 {
            return Err(FsError::InvalidVolume("empty device"));
        }
        let sb = BlockBuf::load(0, Arc::clone(&block_device))?.read(SuperBlock::decode);
        if !sb.is_valid() {
            return Err(FsError::InvalidVolume("bad signature"));
        }
        if sb.total_blocks as usize != device_blocks {
            return Err(FsError::InvalidVolume(
                "block count does not match the device",
            ));
        }
        sb.check_geometry().map_err(FsError::InvalidVolume)?;
        let fat = Fat::load(&sb, &block_device)?;
        let mut root = [DirEntry::empty(); FILE_MAX_COUNT];
        BlockBuf::load(sb.root_dir_block as usize, Arc::clone(&block_device))?.read(|block| {
            for (entry, raw) in root.iter_mut().zip(block.chunks_exact(DIRENT_SZ)) {
                *entry = DirEntry::decode(raw);
            }
        });
        debug!("fat-fs: mounted {:?}", sb);
        Ok(Self {
            block_device,
            sb,
            fat,
            root,
            open_files: [None; OPEN_MAX_COUNT],
        })
    }

    /// Release the device; the caller has checked no file is open
    pub fn release(self) -> Result<()> {
        self.block_device.close()?;
        debug!("fat-fs: unmounted");
        Ok(())
    }

    pub fn info(&self) -> VolumeInfo {
        VolumeInfo {
            total_blocks: self.sb.total_blocks as usize,
            fat_blocks: self.sb.fat_blocks as usize,
            root_dir_block: self.sb.root_dir_block as usize,
            data_start: self.sb.data_start as usize,
            data_blocks: self.sb.data_blocks as usize,
            free_data_blocks: self.fat.free_count(),
            free_dir_slots: self.root.iter().filter(|entry| entry.is_empty()).count(),
        }
    }

    /// Device block of data block `index`
    pub(crate) fn data_block_id(&self, index: u16) -> usize {
        self.sb.data_start as usize + index as usize
    }

    /// Persist the whole root directory block
    pub(crate) fn store_root(&self) -> Result<()> {
        let mut buf = BlockBuf::zeroed(
            self.sb.root_dir_block as usize,
            Arc::clone(&self.block_device),
        );
        buf.modify(|block| {
            for (entry, raw) in self.root.iter().zip(block.chunks_exact_mut(DIRENT_SZ)) {
                entry.encode(raw);
            }
        });
        buf.store()
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.root.iter().position(|entry| entry.name_matches(name))
    }

    fn is_open(&self, slot: usize) -> bool {
        self.open_files
            .iter()
            .flatten()
            .any(|file| file.slot == slot)
    }

    pub fn open_count(&self) -> usize {
        self.open_files.iter().flatten().count()
    }

    pub fn create(&mut self, name: &str) -> Result<()> {
        if !valid_name(name) {
            return Err(FsError::InvalidName);
        }
        if self.find(name).is_some() {
            return Err(FsError::NameExists);
        }
        let slot = self
            .root
            .iter()
            .position(|entry| entry.is_empty())
            .ok_or(FsError::DirectoryFull)?;
        self.root[slot] = DirEntry::new(name);
        if let Err(err) = self.store_root() {
            self.root[slot] = DirEntry::empty();
            return Err(err);
        }
        debug!("fat-fs: created {} in slot {}", name, slot);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        let slot = self.find(name).ok_or(FsError::NotFound)?;
        if self.is_open(slot) {
            return Err(FsError::FileOpen);
        }
        let entry = self.root[slot];
        // 先清目录项再释放链：中途出错最多泄漏几个块，不会留下指向空闲块的目录项
        self.root[slot] = DirEntry::empty();
        if let Err(err) = self.store_root() {
            self.root[slot] = entry;
            return Err(err);
        }
        let freed = self.fat.free_chain(entry.first_block, &self.block_device)?;
        debug!("fat-fs: deleted {}, freed {} blocks", name, freed);
        Ok(())
    }

    pub fn list(&self) -> Vec<DirEntryView> {
        self.root
            .iter()
            .filter(|entry| !entry.is_empty())
            .map(|entry| DirEntryView {
                name: String::from_utf8_lossy(entry.name_bytes()).into_owned(),
                size: entry.size,
                first_block: entry.first_block,
            })
            .collect()
    }

    /// Data blocks of `name`, in chain order
    #[allow(unused)]
    pub(crate) fn chain_of(&self, name: &str) -> Result<Vec<u16>> {
        let slot = self.find(name).ok_or(FsError::NotFound)?;
        self.fat.chain(self.root[slot].first_block)
    }

    pub fn open(&mut self, name: &str) -> Result<FileDescriptor> {
        let slot = self.find(name).ok_or(FsError::NotFound)?;
        let fd = self
            .open_files
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpen)?;
        self.open_files[fd] = Some(OpenFile { slot, offset: 0 });
        debug!("fat-fs: opened {} as fd {}", name, fd);
        Ok(FileDescriptor(fd))
    }

    pub(crate) fn open_file(&self, fd: FileDescriptor) -> Result<OpenFile> {
        self.open_files
            .get(fd.0)
            .copied()
            .flatten()
            .ok_or(FsError::BadDescriptor)
    }

    /// Move the cursor of an already validated descriptor
    pub(crate) fn set_offset(&mut self, fd: FileDescriptor, offset: usize) {
        if let Some(Some(file)) = self.open_files.get_mut(fd.0) {
            file.offset = offset;
        }
    }

    pub fn close(&mut self, fd: FileDescriptor) -> Result<()> {
        self.open_file(fd)?;
        self.open_files[fd.0] = None;
        debug!("fat-fs: closed fd {}", fd.0);
        Ok(())
    }

    pub fn stat(&self, fd: FileDescriptor) -> Result<u32> {
        let file = self.open_file(fd)?;
        Ok(self.root[file.slot].size)
    }

    pub fn tell(&self, fd: FileDescriptor) -> Result<usize> {
        Ok(self.open_file(fd)?.offset)
    }

    pub fn seek(&mut self, fd: FileDescriptor, offset: usize) -> Result<()> {
        let file = self.open_file(fd)?;
        if offset > self.root[file.slot].size as usize {
            return Err(FsError::OffsetOutOfRange);
        }
        self.set_offset(fd, offset);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{DeviceError, DeviceErrorKind, MemBlockDevice, BLOCK_SZ, FAT_EOC};
    use core::sync::atomic::{AtomicBool, Ordering};

    pub(crate) fn formatted(data_blocks: usize) -> Arc<dyn BlockDevice> {
        let dev: Arc<dyn BlockDevice> =
            Arc::new(MemBlockDevice::new(geometry_for(data_blocks).unwrap()));
        Volume::format(Arc::clone(&dev), data_blocks).unwrap();
        dev
    }

    /// Fails every write once armed
    struct FlakyDevice {
        inner: MemBlockDevice,
        fail_writes: AtomicBool,
    }

    impl BlockDevice for FlakyDevice {
        fn read_block(&self, block_id: usize, buf: &mut [u8]) -> core::result::Result<(), DeviceError> {
            self.inner.read_block(block_id, buf)
        }
        fn write_block(&self, block_id: usize, buf: &[u8]) -> core::result::Result<(), DeviceError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(DeviceError::new(block_id, DeviceErrorKind::Write));
            }
            self.inner.write_block(block_id, buf)
        }
        fn num_blocks(&self) -> usize {
            self.inner.num_blocks()
        }
    }

    #[test]
    fn format_then_mount_reports_geometry() {
        let volume = Volume::mount(formatted(10)).unwrap();
        let info = volume.info();
        assert_eq!(
            info,
            VolumeInfo {
                total_blocks: 13,
                fat_blocks: 1,
                root_dir_block: 2,
                data_start: 3,
                data_blocks: 10,
                free_data_blocks: 9,
                free_dir_slots: FILE_MAX_COUNT,
            }
        );
        let text = alloc::format!("{}", info);
        assert!(text.starts_with("FS Info:\ntotal_blk_count=13\n"));
        assert!(text.ends_with("fat_free_ratio=9/10\nrdir_free_ratio=16/16"));
    }

    #[test]
    fn geometry_limits() {
        assert_eq!(geometry_for(10), Ok(13));
        assert_eq!(geometry_for(256), Ok(259));
        assert_eq!(geometry_for(257), Ok(261));
        assert_eq!(geometry_for(MAX_DATA_BLOCKS), Ok(2 + 32 + MAX_DATA_BLOCKS));
        assert!(geometry_for(0).is_err());
        assert!(geometry_for(MAX_DATA_BLOCKS + 1).is_err());
    }

    #[test]
    fn format_rejects_wrong_device_size() {
        let dev: Arc<dyn BlockDevice> = Arc::new(MemBlockDevice::new(12));
        assert!(matches!(
            Volume::format(dev, 10),
            Err(FsError::InvalidVolume(_))
        ));
    }

    #[test]
    fn mount_rejects_bad_volumes() {
        let blank: Arc<dyn BlockDevice> = Arc::new(MemBlockDevice::new(13));
        assert_eq!(
            Volume::mount(blank).err(),
            Some(FsError::InvalidVolume("bad signature"))
        );
        let empty: Arc<dyn BlockDevice> = Arc::new(MemBlockDevice::new(0));
        assert_eq!(
            Volume::mount(empty).err(),
            Some(FsError::InvalidVolume("empty device"))
        );

        let dev = MemBlockDevice::new(geometry_for(10).unwrap());
        let dev: Arc<dyn BlockDevice> = Arc::new(dev);
        Volume::format(Arc::clone(&dev), 10).unwrap();
        let mut image = [0u8; BLOCK_SZ];
        dev.read_block(0, &mut image).unwrap();
        let mut grown = alloc::vec![0u8; 14 * BLOCK_SZ];
        grown[..BLOCK_SZ].copy_from_slice(&image);
        let grown: Arc<dyn BlockDevice> = Arc::new(MemBlockDevice::from_image(grown));
        assert_eq!(
            Volume::mount(grown).err(),
            Some(FsError::InvalidVolume("block count does not match the device"))
        );
    }

    #[test]
    fn create_list_delete() {
        let mut volume = Volume::mount(formatted(10)).unwrap();
        volume.create("a").unwrap();
        volume.create("b").unwrap();
        assert_eq!(volume.create("a"), Err(FsError::NameExists));
        assert_eq!(volume.create(""), Err(FsError::InvalidName));
        assert_eq!(volume.create("0123456789abcdef"), Err(FsError::InvalidName));
        let names: Vec<String> = volume.list().into_iter().map(|view| view.name).collect();
        assert_eq!(names, ["a", "b"]);
        let view = &volume.list()[0];
        assert_eq!((view.size, view.first_block), (0, FAT_EOC));
        assert_eq!(alloc::format!("{}", view), "file: a, size: 0, data_blk: 65535");

        volume.delete("a").unwrap();
        assert_eq!(volume.delete("a"), Err(FsError::NotFound));
        assert_eq!(volume.list().len(), 1);
        volume.create("a").unwrap();
        // slot order, the freed first slot is reused
        assert_eq!(volume.list()[0].name, "a");
    }

    #[test]
    fn directory_changes_survive_remount() {
        let dev = formatted(10);
        let mut volume = Volume::mount(Arc::clone(&dev)).unwrap();
        volume.create("kept").unwrap();
        volume.create("gone").unwrap();
        volume.delete("gone").unwrap();
        let volume = Volume::mount(dev).unwrap();
        let names: Vec<String> = volume.list().into_iter().map(|view| view.name).collect();
        assert_eq!(names, ["kept"]);
    }

    #[test]
    fn directory_full() {
        let mut volume = Volume::mount(formatted(10)).unwrap();
        for i in 0..FILE_MAX_COUNT {
            volume.create(&alloc::format!("f{}", i)).unwrap();
        }
        assert_eq!(volume.create("extra"), Err(FsError::DirectoryFull));
        assert_eq!(volume.info().free_dir_slots, 0);
    }

    #[test]
    fn descriptors() {
        let mut volume = Volume::mount(formatted(10)).unwrap();
        volume.create("a").unwrap();
        assert_eq!(volume.open("b"), Err(FsError::NotFound));
        let first = volume.open("a").unwrap();
        let second = volume.open("a").unwrap();
        assert_eq!((first.0, second.0), (0, 1));
        assert_eq!(volume.stat(first), Ok(0));
        assert_eq!(volume.seek(first, 0), Ok(()));
        assert_eq!(volume.seek(first, 1), Err(FsError::OffsetOutOfRange));
        assert_eq!(volume.delete("a"), Err(FsError::FileOpen));
        volume.close(first).unwrap();
        assert_eq!(volume.close(first), Err(FsError::BadDescriptor));
        assert_eq!(volume.stat(FileDescriptor(OPEN_MAX_COUNT)), Err(FsError::BadDescriptor));
        assert_eq!(volume.open_count(), 1);
        volume.close(second).unwrap();
        volume.delete("a").unwrap();
    }

    #[test]
    fn open_table_fills_up() {
        let mut volume = Volume::mount(formatted(10)).unwrap();
        volume.create("a").unwrap();
        for _ in 0..OPEN_MAX_COUNT {
            volume.open("a").unwrap();
        }
        assert_eq!(volume.open("a"), Err(FsError::TooManyOpen));
        volume.close(FileDescriptor(5)).unwrap();
        assert_eq!(volume.open("a"), Ok(FileDescriptor(5)));
    }

    #[test]
    fn failed_directory_write_leaves_tables_unchanged() {
        let flaky = Arc::new(FlakyDevice {
            inner: MemBlockDevice::new(geometry_for(10).unwrap()),
            fail_writes: AtomicBool::new(false),
        });
        let dev: Arc<dyn BlockDevice> = flaky.clone();
        Volume::format(Arc::clone(&dev), 10).unwrap();
        let mut volume = Volume::mount(dev).unwrap();
        volume.create("a").unwrap();
        flaky.fail_writes.store(true, Ordering::SeqCst);
        assert_eq!(
            volume.create("b"),
            Err(FsError::DeviceIo(DeviceError::new(2, DeviceErrorKind::Write)))
        );
        assert!(matches!(volume.delete("a"), Err(FsError::DeviceIo(_))));
        assert_eq!(volume.list().len(), 1);
    }
}
