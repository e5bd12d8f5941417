//! `Vfs` backed directly by `std::fs`.
//!
//! `std::fs::File` never does newline/encoding translation on any target
//! (unlike C's `fopen` in text mode on Windows), so the "force binary
//! semantics" concern `original_source`'s Windows-compatibility tests
//! raise doesn't need an explicit `O_BINARY`-equivalent flag here — it's
//! the default.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::{FileHandleOps, Metadata, OpenFlags, Result, Vfs, VfsError, Whence};

pub struct NativeFs;

impl NativeFs {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeFs {
    fn default() -> Self {
        Self::new()
    }
}

fn map_io_error(e: &std::io::Error) -> VfsError {
    match e.kind() {
        std::io::ErrorKind::NotFound => return VfsError::NotFound,
        std::io::ErrorKind::PermissionDenied => return VfsError::PermissionDenied,
        std::io::ErrorKind::AlreadyExists => return VfsError::Exists,
        _ => {}
    }
    #[cfg(unix)]
    if let Some(code) = e.raw_os_error() {
        match code {
            c if c == libc::ENOTDIR => return VfsError::NotDirectory,
            c if c == libc::EISDIR => return VfsError::IsDirectory,
            c if c == libc::ENOTEMPTY => return VfsError::NotEmpty,
            c if c == libc::EINVAL => return VfsError::InvalidArgument,
            _ => {}
        }
    }
    VfsError::Io
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(unix)]
fn metadata_from_std(hidden: bool, meta: &fs::Metadata) -> Metadata {
    use std::os::unix::fs::MetadataExt;
    Metadata {
        is_dir: meta.is_dir(),
        is_hidden: hidden,
        size: meta.len(),
        mode: meta.mode(),
        uid: meta.uid(),
        gid: meta.gid(),
        atime: meta.atime().max(0) as u32,
        mtime: meta.mtime().max(0) as u32,
        ctime: meta.ctime().max(0) as u32,
    }
}

#[cfg(not(unix))]
fn metadata_from_std(hidden: bool, meta: &fs::Metadata) -> Metadata {
    use std::time::UNIX_EPOCH;
    let to_secs = |t: std::io::Result<std::time::SystemTime>| -> u32 {
        t.ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    };
    Metadata {
        is_dir: meta.is_dir(),
        is_hidden: hidden,
        size: meta.len(),
        mode: if meta.permissions().readonly() {
            0o444
        } else {
            0o644
        },
        uid: 0,
        gid: 0,
        atime: to_secs(meta.accessed()),
        mtime: to_secs(meta.modified()),
        ctime: to_secs(meta.created()),
    }
}

impl Vfs for NativeFs {
    fn open(&self, path: &Path, flags: OpenFlags, mode: u32) -> Result<Box<dyn FileHandleOps>> {
        let mut opts = OpenOptions::new();
        opts.read(flags.read).write(flags.write || flags.append);
        if flags.append {
            opts.append(true);
        }
        if flags.create {
            opts.create(true);
        }
        if flags.truncate {
            opts.truncate(true);
        }
        if flags.exclusive {
            opts.create_new(true);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let file = opts.open(path).map_err(|e| map_io_error(&e))?;
        Ok(Box::new(NativeFile { file }))
    }

    fn stat(&self, path: &Path) -> Result<Metadata> {
        let meta = fs::symlink_metadata(path).map_err(|e| map_io_error(&e))?;
        Ok(metadata_from_std(is_hidden(path), &meta))
    }

    fn list(&self, path: &Path) -> Result<Vec<(String, Metadata)>> {
        let entries = fs::read_dir(path).map_err(|e| map_io_error(&e))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| map_io_error(&e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().map_err(|e| map_io_error(&e))?;
            out.push((name.clone(), metadata_from_std(name.starts_with('.'), &meta)));
        }
        Ok(out)
    }

    fn mkdir(&self, path: &Path) -> Result<()> {
        fs::create_dir(path).map_err(|e| map_io_error(&e))
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        fs::remove_dir(path).map_err(|e| map_io_error(&e))
    }

    fn unlink(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(|e| map_io_error(&e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).map_err(|e| map_io_error(&e))
    }
}

struct NativeFile {
    file: File,
}

impl FileHandleOps for NativeFile {
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max_len];
        let n = self.file.read(&mut buf).map_err(|e| map_io_error(&e))?;
        buf.truncate(n);
        Ok(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<u32> {
        let n = self.file.write(data).map_err(|e| map_io_error(&e))?;
        Ok(n as u32)
    }

    fn seek(&mut self, whence: Whence, offset: i64) -> Result<u32> {
        let from = match whence {
            Whence::Set => SeekFrom::Start(offset.max(0) as u64),
            Whence::Cur => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        let pos = self.file.seek(from).map_err(|e| map_io_error(&e))?;
        Ok(pos as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new();
        let path = dir.path().join("f.txt");
        let mut handle = fs
            .open(
                &path,
                OpenFlags {
                    write: true,
                    create: true,
                    ..Default::default()
                },
                0o644,
            )
            .unwrap();
        assert_eq!(handle.write(b"hello").unwrap(), 5);
        drop(handle);

        let mut handle = fs
            .open(
                &path,
                OpenFlags {
                    read: true,
                    ..Default::default()
                },
                0,
            )
            .unwrap();
        assert_eq!(handle.read(5).unwrap(), b"hello");
        assert_eq!(handle.read(5).unwrap(), b"");
    }

    #[test]
    fn stat_reports_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new();
        let file_path = dir.path().join("a.txt");
        fs::write(&file_path, b"x").unwrap();

        let file_meta = fs.stat(&file_path).unwrap();
        assert!(!file_meta.is_dir);
        assert_eq!(file_meta.size, 1);

        let dir_meta = fs.stat(dir.path()).unwrap();
        assert!(dir_meta.is_dir);
    }

    #[test]
    fn mkdir_rmdir_on_nonempty_fails() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new();
        let sub = dir.path().join("sub");
        fs.mkdir(&sub).unwrap();
        fs::write(sub.join("x"), b"1").unwrap();
        assert_eq!(fs.rmdir(&sub), Err(VfsError::NotEmpty));
    }

    #[test]
    fn unlink_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let fs = NativeFs::new();
        assert_eq!(
            fs.unlink(&dir.path().join("missing")),
            Err(VfsError::NotFound)
        );
    }
}
