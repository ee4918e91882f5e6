use crate::block_file::BlockFile;
use fat_fs::{geometry_for, BlockDevice, FatFileSystem, FsError};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

pub fn fs_error(err: FsError) -> io::Error {
    let kind = match err {
        FsError::NotFound => io::ErrorKind::NotFound,
        FsError::NameExists => io::ErrorKind::AlreadyExists,
        FsError::InvalidName | FsError::OffsetOutOfRange => io::ErrorKind::InvalidInput,
        FsError::InvalidVolume(_) | FsError::CorruptChain { .. } => io::ErrorKind::InvalidData,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

/// Mount `image`, run `f`, and unmount again
fn with_fs<T>(image: &Path, f: impl FnOnce(&mut FatFileSystem) -> fat_fs::Result<T>) -> io::Result<T> {
    let device: Arc<dyn BlockDevice> = Arc::new(BlockFile::open(image)?);
    let mut fs = FatFileSystem::new();
    fs.mount(device).map_err(fs_error)?;
    let result = f(&mut fs);
    fs.unmount().map_err(fs_error)?;
    result.map_err(fs_error)
}

/// Create `image` holding an empty volume of `data_blocks` data blocks
pub fn make(image: &Path, data_blocks: usize, out: &mut dyn Write) -> io::Result<()> {
    let total_blocks = geometry_for(data_blocks).map_err(fs_error)?;
    let device: Arc<dyn BlockDevice> = Arc::new(BlockFile::create(image, total_blocks)?);
    FatFileSystem::format(Arc::clone(&device), data_blocks).map_err(fs_error)?;
    device.close().map_err(|err| fs_error(err.into()))?;
    writeln!(
        out,
        "Created virtual disk '{}' with '{}' data blocks",
        image.display(),
        data_blocks
    )
}

pub fn info(image: &Path, out: &mut dyn Write) -> io::Result<()> {
    let info = with_fs(image, |fs| fs.info())?;
    writeln!(out, "{}", info)
}

pub fn ls(image: &Path, out: &mut dyn Write) -> io::Result<()> {
    let files = with_fs(image, |fs| fs.list())?;
    writeln!(out, "FS Ls:")?;
    for file in files {
        writeln!(out, "{}", file)?;
    }
    Ok(())
}

/// Copy `data` into a new file `name`; fails if the volume cannot hold all of it
pub fn add(image: &Path, name: &str, data: &[u8], out: &mut dyn Write) -> io::Result<()> {
    let written = with_fs(image, |fs| {
        fs.create(name)?;
        let fd = fs.open(name)?;
        let written = fs.write(fd, data);
        fs.close(fd)?;
        written
    })?;
    if written < data.len() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "{}: only {} of {} bytes written",
                FsError::VolumeFull,
                written,
                data.len()
            ),
        ));
    }
    writeln!(out, "Wrote file '{}' ({}/{} bytes)", name, written, data.len())
}

pub fn cat(image: &Path, name: &str, out: &mut dyn Write) -> io::Result<()> {
    let data = with_fs(image, |fs| {
        let fd = fs.open(name)?;
        let size = fs.stat(fd)? as usize;
        let data = fs.read(fd, size);
        fs.close(fd)?;
        data
    })?;
    out.write_all(&data)
}

pub fn stat(image: &Path, name: &str, out: &mut dyn Write) -> io::Result<()> {
    let size = with_fs(image, |fs| {
        let fd = fs.open(name)?;
        let size = fs.stat(fd);
        fs.close(fd)?;
        size
    })?;
    writeln!(out, "Size of file '{}' is {} bytes", name, size)
}

pub fn rm(image: &Path, name: &str, out: &mut dyn Write) -> io::Result<()> {
    with_fs(image, |fs| fs.delete(name))?;
    writeln!(out, "Removed file '{}'", name)
}
