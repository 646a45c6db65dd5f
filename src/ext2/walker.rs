//! Traversal of direct and indirect block pointer chains.
//!
//! An inode carries 15 block pointers: slots 0-11 address data blocks
//! directly, slot 12 is single-indirect, slot 13 double-indirect and
//! slot 14 triple-indirect. A zero pointer at any level ends that
//! subtree - it is treated as end-of-data, not an error.
//!
//! Everything that needs to walk a file's blocks (listing, searching,
//! reading, freeing, growing) goes through the single visitor-based
//! traversal here rather than repeating the chain arithmetic.

use super::{Ext2Fs, FsError, Inode};

impl Ext2Fs {
    /// Invoke `visit` for each allocated data block of `inode`, in logical
    /// order. The visitor returns `false` to stop the walk early.
    pub fn for_each_data_block<F>(&self, inode: &Inode, mut visit: F) -> Result<(), FsError>
    where
        F: FnMut(u32) -> Result<bool, FsError>,
    {
        for i in 0..12 {
            let block = inode.block[i];
            if block == 0 {
                break;
            }
            if !visit(block)? {
                return Ok(());
            }
        }

        if !self.visit_indirect(inode.block[12], 1, &mut visit)? {
            return Ok(());
        }
        if !self.visit_indirect(inode.block[13], 2, &mut visit)? {
            return Ok(());
        }
        self.visit_indirect(inode.block[14], 3, &mut visit)?;
        Ok(())
    }

    /// Walk one pointer block at the given indirection level.
    ///
    /// Returns `Ok(false)` when the visitor asked to stop. A zero entry
    /// ends the scan of this block; the caller's siblings still run.
    fn visit_indirect<F>(&self, block: u32, level: u8, visit: &mut F) -> Result<bool, FsError>
    where
        F: FnMut(u32) -> Result<bool, FsError>,
    {
        if block == 0 {
            return Ok(true);
        }

        let ptrs = self.read_ptr_block(block)?;
        for ptr in ptrs {
            if ptr == 0 {
                break;
            }
            let keep_going = if level == 1 {
                visit(ptr)?
            } else {
                self.visit_indirect(ptr, level - 1, visit)?
            };
            if !keep_going {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read a pointer block and decode its `block_size / 4` entries.
    pub(crate) fn read_ptr_block(&self, block: u32) -> Result<Vec<u32>, FsError> {
        let mut buf = self.block_buf();
        self.read_block(block, &mut buf)?;
        Ok(buf
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Read the logical content of a file into memory.
    ///
    /// Collects the first `size` bytes across the pointer chain. The walk
    /// stops at the first zero pointer, so a truncated chain yields fewer
    /// bytes than the recorded size.
    pub fn read_file(&self, inode: &Inode) -> Result<Vec<u8>, FsError> {
        let size = inode.size() as usize;
        let block_size = self.block_size() as usize;
        let mut out = Vec::with_capacity(size);
        let mut buf = self.block_buf();

        self.for_each_data_block(inode, |block| {
            if out.len() >= size {
                return Ok(false);
            }
            self.read_block(block, &mut buf)?;
            let take = (size - out.len()).min(block_size);
            out.extend_from_slice(&buf[..take]);
            Ok(out.len() < size)
        })?;

        Ok(out)
    }

    /// Free every data block and every pointer block of `inode`,
    /// leaves first.
    ///
    /// Unlike the enumeration walk, this does not stop at a zero pointer
    /// inside a pointer block: deletion must release every block a
    /// damaged or sparse chain still references. The triple-indirect
    /// level is traversed so that large files free completely.
    pub fn free_file_blocks(&mut self, inode: &Inode) -> Result<(), FsError> {
        for i in 0..12 {
            if inode.block[i] != 0 {
                self.free_block(inode.block[i])?;
            }
        }
        self.free_indirect(inode.block[12], 1)?;
        self.free_indirect(inode.block[13], 2)?;
        self.free_indirect(inode.block[14], 3)?;
        Ok(())
    }

    /// Free the subtree rooted at one pointer block, then the block itself.
    fn free_indirect(&mut self, block: u32, level: u8) -> Result<(), FsError> {
        if block == 0 {
            return Ok(());
        }

        let ptrs = self.read_ptr_block(block)?;
        for ptr in ptrs {
            if ptr == 0 {
                continue;
            }
            if level == 1 {
                self.free_block(ptr)?;
            } else {
                self.free_indirect(ptr, level - 1)?;
            }
        }
        self.free_block(block)
    }

    /// Link `new_block` into the first free pointer slot of a directory
    /// inode, allocating pointer blocks as needed.
    ///
    /// Preference order: a zero slot among `block[0..12]`, then the
    /// single-indirect chain, then the double-indirect chain. Directories
    /// never grow into the triple-indirect level; when the double level is
    /// exhausted the result is `NoSpace`.
    ///
    /// Returns the number of pointer blocks that had to be allocated so
    /// the caller can maintain the inode's 512-byte block count. Pointer
    /// blocks acquired by a failed attach are freed before the error
    /// returns.
    pub fn attach_block(
        &mut self,
        dir_inode: &mut Inode,
        dir_ino: u32,
        new_block: u32,
    ) -> Result<u32, FsError> {
        let mut acquired: Vec<u32> = Vec::new();
        match self.attach_block_inner(dir_inode, dir_ino, new_block, &mut acquired) {
            Ok(meta) => Ok(meta),
            Err(err) => {
                for block in acquired.into_iter().rev() {
                    let _ = self.free_block(block);
                }
                Err(err)
            }
        }
    }

    fn attach_block_inner(
        &mut self,
        dir_inode: &mut Inode,
        dir_ino: u32,
        new_block: u32,
        acquired: &mut Vec<u32>,
    ) -> Result<u32, FsError> {
        // Direct slots.
        for i in 0..12 {
            if dir_inode.block[i] == 0 {
                dir_inode.block[i] = new_block;
                return Ok(0);
            }
        }

        let ptrs_per_block = (self.block_size() / 4) as usize;

        // Single-indirect chain.
        if dir_inode.block[12] == 0 {
            let l1 = self.alloc_block(dir_ino)?;
            acquired.push(l1);
            self.write_ptr_block(l1, &[new_block])?;
            dir_inode.block[12] = l1;
            return Ok(1);
        }
        let l1_block = dir_inode.block[12];
        let mut l1 = self.read_ptr_block(l1_block)?;
        if let Some(slot) = l1.iter().position(|&p| p == 0) {
            l1[slot] = new_block;
            self.write_ptr_block(l1_block, &l1)?;
            return Ok(0);
        }

        // Double-indirect chain.
        if dir_inode.block[13] == 0 {
            let l1 = self.alloc_block(dir_ino)?;
            acquired.push(l1);
            let l2 = self.alloc_block(dir_ino)?;
            acquired.push(l2);
            self.write_ptr_block(l2, &[new_block])?;
            self.write_ptr_block(l1, &[l2])?;
            dir_inode.block[13] = l1;
            return Ok(2);
        }
        let l1_block = dir_inode.block[13];
        let mut l1 = self.read_ptr_block(l1_block)?;
        for slot in 0..ptrs_per_block {
            if l1[slot] == 0 {
                let l2 = self.alloc_block(dir_ino)?;
                acquired.push(l2);
                self.write_ptr_block(l2, &[new_block])?;
                l1[slot] = l2;
                self.write_ptr_block(l1_block, &l1)?;
                return Ok(1);
            }
            let l2_block = l1[slot];
            let mut l2 = self.read_ptr_block(l2_block)?;
            if let Some(inner) = l2.iter().position(|&p| p == 0) {
                l2[inner] = new_block;
                self.write_ptr_block(l2_block, &l2)?;
                return Ok(0);
            }
        }

        Err(FsError::NoSpace)
    }

    /// Encode `ptrs` at the start of a pointer block, zero-filling the rest.
    fn write_ptr_block(&mut self, block: u32, ptrs: &[u32]) -> Result<(), FsError> {
        let mut buf = self.block_buf();
        for (i, ptr) in ptrs.iter().enumerate() {
            buf[i * 4..(i + 1) * 4].copy_from_slice(&ptr.to_le_bytes());
        }
        self.write_block(block, &buf)
    }
}
