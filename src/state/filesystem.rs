//! POSIX-like file descriptors over symbolic file contents.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::arch::Endianness;
use crate::consts::{FD_STDERR, FD_STDIN, FD_STDOUT};
use crate::error::{ExecError, ExecResult};
use crate::expr::{ExprBuilder, ExprRef};
use crate::state::memory::{MapMemory, UninitReadPolicy};

/// A file: symbolic contents plus a logical size.
///
/// File contents are an ordered byte stream: multi-byte reads and writes are
/// big-endian regardless of the CPU's byte order.
#[derive(Clone)]
pub struct File {
    name: String,
    content: MapMemory,
    size: u64,
}

impl File {
    fn new(name: &str, builder: Arc<ExprBuilder>) -> Self {
        Self {
            name: name.to_string(),
            content: MapMemory::new(name, UninitReadPolicy::Symbol, builder),
            size: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical size: the highest offset ever read, written or seeked to.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The byte expression at `offset`, materializing a fresh symbol for
    /// bytes never touched.
    pub fn byte_at(&mut self, offset: u64) -> ExprRef {
        self.content
            .read_byte(offset)
            .expect("file contents use the symbol policy")
    }

    fn read(&mut self, offset: u64, size: usize) -> ExprRef {
        let res = self
            .content
            .read(offset, size, Endianness::Big)
            .expect("file contents use the symbol policy");
        self.size = self.size.max(offset + size as u64);
        res
    }

    fn write(&mut self, offset: u64, data: &ExprRef) {
        self.content.write(offset, data, Endianness::Big);
        self.size = self.size.max(offset + (data.width() / 8) as u64);
    }
}

/// An open descriptor: the file it refers to and the current offset.
#[derive(Clone)]
struct Handle {
    path: String,
    offset: u64,
}

/// Per-state file system: `path -> File`, `fd -> Handle`.
///
/// Descriptors 0, 1 and 2 (stdin, stdout, stderr) exist from construction.
/// Descriptors count up monotonically; a closed descriptor is only reused
/// when it was the most recently allocated one.
#[derive(Clone)]
pub struct FileSystem {
    builder: Arc<ExprBuilder>,
    files: BTreeMap<String, File>,
    handles: BTreeMap<i32, Handle>,
    next_fd: i32,
}

impl FileSystem {
    pub fn new(builder: Arc<ExprBuilder>) -> Self {
        let mut fs = Self {
            builder,
            files: BTreeMap::new(),
            handles: BTreeMap::new(),
            next_fd: 0,
        };

        let stdin = fs.open("stdin");
        let stdout = fs.open("stdout");
        let stderr = fs.open("stderr");
        debug_assert!(stdin == FD_STDIN && stdout == FD_STDOUT && stderr == FD_STDERR);
        fs
    }

    /// Open `path`, creating the file if it does not exist.
    pub fn open(&mut self, path: &str) -> i32 {
        if !self.files.contains_key(path) {
            self.files
                .insert(path.to_string(), File::new(path, self.builder.clone()));
        }

        let fd = self.next_fd;
        self.next_fd += 1;
        self.handles.insert(
            fd,
            Handle {
                path: path.to_string(),
                offset: 0,
            },
        );
        fd
    }

    pub fn close(&mut self, fd: i32) -> ExecResult<()> {
        self.handles
            .remove(&fd)
            .ok_or(ExecError::BadFileDescriptor(fd))?;
        if fd == self.next_fd - 1 {
            self.next_fd -= 1;
        }
        Ok(())
    }

    pub fn seek(&mut self, fd: i32, offset: u64) -> ExecResult<()> {
        let handle = self
            .handles
            .get_mut(&fd)
            .ok_or(ExecError::BadFileDescriptor(fd))?;
        handle.offset = offset;

        let file = self.files.get_mut(&handle.path).expect("handle is open");
        file.size = file.size.max(offset);
        Ok(())
    }

    /// Read `size` bytes as one big-endian expression; reading past the end
    /// grows the file with fresh symbolic bytes.
    pub fn read(&mut self, fd: i32, size: usize) -> ExecResult<ExprRef> {
        let handle = self
            .handles
            .get_mut(&fd)
            .ok_or(ExecError::BadFileDescriptor(fd))?;
        let file = self.files.get_mut(&handle.path).expect("handle is open");

        let res = file.read(handle.offset, size);
        handle.offset += size as u64;
        Ok(res)
    }

    pub fn write(&mut self, fd: i32, data: &ExprRef) -> ExecResult<()> {
        let handle = self
            .handles
            .get_mut(&fd)
            .ok_or(ExecError::BadFileDescriptor(fd))?;
        let file = self.files.get_mut(&handle.path).expect("handle is open");

        file.write(handle.offset, data);
        handle.offset += (data.width() / 8) as u64;
        Ok(())
    }

    pub fn files_mut(&mut self) -> impl Iterator<Item = &mut File> {
        self.files.values_mut()
    }

    pub fn file(&self, path: &str) -> Option<&File> {
        self.files.get(path)
    }
}
