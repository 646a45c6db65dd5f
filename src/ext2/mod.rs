//! Ext2 filesystem engine.
//!
//! [`Ext2Fs`] owns the backing block device together with mutable in-memory
//! copies of the superblock and the group descriptor table. Every mutation
//! path updates the in-memory copies and flushes the affected superblock,
//! group descriptor and bitmap block(s) back to the image before returning.
//!
//! Inode records are handed out by value: callers read a snapshot, mutate
//! it and pass it back to [`Ext2Fs::write_inode`]. No long-lived references
//! into on-disk structures exist.

mod bitmap;
mod device;
mod dir;
mod error;
mod ops;
mod path;
mod structs;
mod walker;

pub use bitmap::{clear_bit, find_first_clear_bit, set_bit, test_bit};
pub use device::{BlockDevice, FileDevice, MemDevice};
pub use error::FsError;
pub use path::split_parent_leaf;
pub use structs::*;

/// An ext2 filesystem instance over a block device.
pub struct Ext2Fs {
    /// The underlying block device.
    device: Box<dyn BlockDevice>,
    /// In-memory superblock copy, flushed on counter changes.
    superblock: Superblock,
    /// In-memory group descriptor table copy.
    groups: Vec<GroupDescriptor>,
    /// Block size in bytes.
    block_size: u32,
    /// Inode record size in bytes.
    inode_size: u32,
}

impl Ext2Fs {
    /// Mount an ext2 filesystem from a block device.
    ///
    /// Reads and validates the superblock, then loads the full group
    /// descriptor table. Fails with a format error on anything that does
    /// not look like a healthy ext2 image.
    pub fn mount(device: Box<dyn BlockDevice>) -> Result<Self, FsError> {
        let mut sb_buf = [0u8; 1024];
        device.read_at(SUPERBLOCK_OFFSET, &mut sb_buf)?;

        let superblock = Superblock::from_bytes(&sb_buf);
        superblock.validate()?;

        // validate() already bounds-checked these.
        let block_size = superblock
            .block_size()
            .ok_or(FsError::Format("block size out of range"))?;
        let inode_size = superblock.inode_size();
        let group_count = superblock
            .group_count()
            .ok_or(FsError::Format("blocks_per_group is zero"))?;

        // The descriptor table starts in the block after the superblock:
        // block 2 for 1 KiB blocks, block 1 otherwise.
        let gdt_offset = (superblock.first_data_block as u64 + 1) * block_size as u64;
        let desc_size = core::mem::size_of::<GroupDescriptor>();
        let mut gdt_buf = vec![0u8; group_count as usize * desc_size];
        device.read_at(gdt_offset, &mut gdt_buf)?;

        let groups: Vec<GroupDescriptor> = (0..group_count as usize)
            .map(|i| {
                let mut raw = [0u8; 32];
                raw.copy_from_slice(&gdt_buf[i * desc_size..(i + 1) * desc_size]);
                GroupDescriptor::from_bytes(&raw)
            })
            .collect();

        log::debug!(
            "ext2: mounted {} blocks / {} inodes in {} group(s), block size {}",
            superblock.blocks_count,
            superblock.inodes_count,
            group_count,
            block_size
        );

        Ok(Self {
            device,
            superblock,
            groups,
            block_size,
            inode_size,
        })
    }

    /// The in-memory superblock copy.
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// The in-memory group descriptor table copy.
    pub fn groups(&self) -> &[GroupDescriptor] {
        &self.groups
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Inode record size in bytes.
    pub fn inode_size(&self) -> u32 {
        self.inode_size
    }

    /// Number of block groups.
    pub fn group_count(&self) -> u32 {
        self.groups.len() as u32
    }

    /// Byte offset of the group descriptor table.
    fn gdt_offset(&self) -> u64 {
        (self.superblock.first_data_block as u64 + 1) * self.block_size as u64
    }

    // =========================================================================
    // Block IO
    // =========================================================================

    /// Read one full block into `buf` (which must be one block long).
    pub fn read_block(&self, block: u32, buf: &mut [u8]) -> Result<(), FsError> {
        debug_assert_eq!(buf.len(), self.block_size as usize);
        if block >= self.superblock.blocks_count {
            log::warn!(
                "ext2: read of block {} out of range (total {})",
                block,
                self.superblock.blocks_count
            );
            return Err(FsError::BlockOutOfRange(block));
        }
        let offset = block as u64 * self.block_size as u64;
        self.device
            .read_at(offset, buf)
            .map_err(|e| short_or_io(e, block))
    }

    /// Write one full block from `buf`.
    ///
    /// Block 0 is refused: it holds the boot area and nothing in the
    /// filesystem may ever address it.
    pub fn write_block(&mut self, block: u32, buf: &[u8]) -> Result<(), FsError> {
        debug_assert_eq!(buf.len(), self.block_size as usize);
        if block == 0 || block >= self.superblock.blocks_count {
            log::warn!(
                "ext2: write to invalid block {} (total {})",
                block,
                self.superblock.blocks_count
            );
            return Err(FsError::BlockOutOfRange(block));
        }
        let offset = block as u64 * self.block_size as u64;
        self.device
            .write_at(offset, buf)
            .map_err(|e| short_or_io(e, block))
    }

    /// Allocate a block-sized scratch buffer.
    pub(crate) fn block_buf(&self) -> Vec<u8> {
        vec![0u8; self.block_size as usize]
    }

    // =========================================================================
    // Inode IO
    // =========================================================================

    /// Byte offset of an inode record inside its group's inode table.
    fn inode_offset(&self, ino: u32) -> Result<u64, FsError> {
        if ino == 0 || ino > self.superblock.inodes_count {
            return Err(FsError::InodeOutOfRange(ino));
        }
        let group = ((ino - 1) / self.superblock.inodes_per_group) as usize;
        let index = ((ino - 1) % self.superblock.inodes_per_group) as u64;
        let Some(desc) = self.groups.get(group) else {
            log::warn!("ext2: inode {} references out-of-bounds group {}", ino, group);
            return Err(FsError::InodeOutOfRange(ino));
        };
        Ok(desc.inode_table as u64 * self.block_size as u64 + index * self.inode_size as u64)
    }

    /// Read an inode by number (1-indexed).
    ///
    /// Only the first 128 bytes of the record are decoded; dynamic-revision
    /// images with larger records keep their extra bytes untouched.
    pub fn read_inode(&self, ino: u32) -> Result<Inode, FsError> {
        let offset = self.inode_offset(ino)?;
        let mut buf = [0u8; 128];
        self.device.read_at(offset, &mut buf)?;
        Ok(Inode::from_bytes(&buf))
    }

    /// Write an inode record back to its table slot.
    pub fn write_inode(&mut self, ino: u32, inode: &Inode) -> Result<(), FsError> {
        let offset = self.inode_offset(ino)?;
        self.device.write_at(offset, &inode.to_bytes())?;
        Ok(())
    }

    // =========================================================================
    // Metadata flush
    // =========================================================================

    /// Rewrite the superblock from the in-memory copy.
    pub fn flush_superblock(&mut self) -> Result<(), FsError> {
        self.device
            .write_at(SUPERBLOCK_OFFSET, &self.superblock.to_bytes())?;
        Ok(())
    }

    /// Rewrite one group descriptor in place inside the table.
    pub fn flush_group_descriptor(&mut self, group: u32) -> Result<(), FsError> {
        let Some(desc) = self.groups.get(group as usize) else {
            return Err(FsError::Corrupted("group index out of range"));
        };
        let offset =
            self.gdt_offset() + group as u64 * core::mem::size_of::<GroupDescriptor>() as u64;
        self.device.write_at(offset, &desc.to_bytes())?;
        Ok(())
    }
}

/// Map a short transfer onto `ShortIo`; pass other IO failures through.
fn short_or_io(err: std::io::Error, block: u32) -> FsError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::WriteZero => {
            FsError::ShortIo(block)
        }
        _ => FsError::Io(err),
    }
}
