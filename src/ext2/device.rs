//! Block device interface for random-access byte stores.

use std::cell::RefCell;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::rc::Rc;

/// Interface for random-access block data.
///
/// Operations are stateless - offsets are provided explicitly, and every
/// transfer is synchronous and complete (a short transfer is an error).
pub trait BlockDevice {
    /// Read exactly `buf.len()` bytes at the given offset.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write exactly `buf.len()` bytes at the given offset.
    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// Size of the device in bytes.
    fn len(&self) -> io::Result<u64>;
}

/// A block device backed by an image file on the host.
pub struct FileDevice {
    file: File,
}

impl FileDevice {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl BlockDevice for FileDevice {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.file.write_all_at(buf, offset)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// A block device backed by an in-memory buffer.
///
/// Clones share the same buffer, so a test can keep a handle to an image
/// it has handed to the filesystem. The buffer has a fixed size; reads and
/// writes past the end fail instead of growing it.
#[derive(Clone)]
pub struct MemDevice {
    data: Rc<RefCell<Vec<u8>>>,
}

impl MemDevice {
    /// Create a zero-filled device of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: Rc::new(RefCell::new(vec![0u8; size])),
        }
    }

    /// Copy out the byte range `[offset, offset + len)`.
    pub fn snapshot(&self, offset: usize, len: usize) -> Vec<u8> {
        self.data.borrow()[offset..offset + len].to_vec()
    }
}

impl BlockDevice for MemDevice {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let data = self.data.borrow();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of image",
            ));
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let mut data = self.data.borrow_mut();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write past end of image",
            ));
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.data.borrow().len() as u64)
    }
}
