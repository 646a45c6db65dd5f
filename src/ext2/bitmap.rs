//! Bitmap-based block and inode allocation.
//!
//! Each block group has a block bitmap and an inode bitmap, one block
//! each; a set bit means "in use" and bit `k` lives in byte `k/8` at
//! position `k%8` (LSB-first, as written by the standard formatter).
//! Free counts are tracked in both the group descriptor and the
//! superblock.
//!
//! Allocation is first-fit: groups are scanned in index order, groups
//! whose free count is zero are skipped, and the lowest clear bit in the
//! first eligible bitmap wins. Block allocation first tries the group of
//! the owning inode so that a file's metadata and data cluster together.
//!
//! Bitmaps are re-read from the image on every call - they are never
//! cached - so changes made to the image between operations are picked up
//! rather than clobbered.

use super::{Ext2Fs, FsError};

impl Ext2Fs {
    /// Number of usable bits in a group's block bitmap.
    ///
    /// The last group usually covers fewer blocks than `blocks_per_group`.
    fn blocks_in_group(&self, group: usize) -> u32 {
        let sb = self.superblock();
        let covered = sb.blocks_count - sb.first_data_block;
        let before = group as u32 * sb.blocks_per_group;
        (covered - before).min(sb.blocks_per_group)
    }

    /// Number of usable bits in a group's inode bitmap.
    fn inodes_in_group(&self, group: usize) -> u32 {
        let sb = self.superblock();
        let before = group as u32 * sb.inodes_per_group;
        (sb.inodes_count - before).min(sb.inodes_per_group)
    }

    /// Allocate a free inode.
    ///
    /// Returns the allocated inode number (1-indexed). The bitmap is
    /// rewritten and the free counts in the group descriptor and the
    /// superblock are decremented and flushed before returning.
    pub fn alloc_inode(&mut self) -> Result<u32, FsError> {
        if self.superblock().free_inodes_count == 0 {
            return Err(FsError::NoFreeInodes);
        }

        let inodes_per_group = self.superblock().inodes_per_group;
        for group in 0..self.groups().len() {
            if self.groups()[group].free_inodes_count == 0 {
                continue;
            }

            let bitmap_block = self.groups()[group].inode_bitmap;
            let mut bitmap = self.block_buf();
            self.read_block(bitmap_block, &mut bitmap)?;

            let max_bits = self.inodes_in_group(group) as usize;
            let Some(bit) = find_first_clear_bit(&bitmap, max_bits) else {
                continue;
            };

            set_bit(&mut bitmap, bit);
            self.write_block(bitmap_block, &bitmap)?;

            self.groups[group].free_inodes_count -= 1;
            self.superblock.free_inodes_count -= 1;
            self.flush_group_descriptor(group as u32)?;
            self.flush_superblock()?;

            return Ok(group as u32 * inodes_per_group + bit as u32 + 1);
        }

        // The superblock promised a free inode but no bitmap had one.
        log::warn!("ext2: free inode count is nonzero but every inode bitmap is full");
        Err(FsError::NoFreeInodes)
    }

    /// Free a previously allocated inode.
    ///
    /// Freeing an inode whose bit is already clear logs a warning and
    /// succeeds, so that rollback paths cannot cascade into new failures.
    pub fn free_inode(&mut self, ino: u32) -> Result<(), FsError> {
        if ino == 0 || ino > self.superblock().inodes_count {
            return Err(FsError::InodeOutOfRange(ino));
        }

        let inodes_per_group = self.superblock().inodes_per_group;
        let group = ((ino - 1) / inodes_per_group) as usize;
        let bit = ((ino - 1) % inodes_per_group) as usize;

        let bitmap_block = self.groups()[group].inode_bitmap;
        let mut bitmap = self.block_buf();
        self.read_block(bitmap_block, &mut bitmap)?;

        if !test_bit(&bitmap, bit) {
            log::warn!("ext2: inode {} was already free", ino);
            return Ok(());
        }

        clear_bit(&mut bitmap, bit);
        self.write_block(bitmap_block, &bitmap)?;

        self.groups[group].free_inodes_count += 1;
        self.superblock.free_inodes_count += 1;
        self.flush_group_descriptor(group as u32)?;
        self.flush_superblock()?;
        Ok(())
    }

    /// Allocate a free data block.
    ///
    /// `hint_inode` names the inode that will own the block; its group is
    /// tried first, then every group in index order. Returns the absolute
    /// block number.
    pub fn alloc_block(&mut self, hint_inode: u32) -> Result<u32, FsError> {
        let inodes_per_group = self.superblock().inodes_per_group;
        let group_count = self.groups().len();

        if hint_inode != 0 {
            let preferred = ((hint_inode - 1) / inodes_per_group) as usize;
            if preferred < group_count {
                if let Some(block) = self.try_alloc_block_in_group(preferred)? {
                    return Ok(block);
                }
            }
        }

        for group in 0..group_count {
            if let Some(block) = self.try_alloc_block_in_group(group)? {
                return Ok(block);
            }
        }

        Err(FsError::NoSpace)
    }

    /// First-fit scan of one group's block bitmap.
    fn try_alloc_block_in_group(&mut self, group: usize) -> Result<Option<u32>, FsError> {
        if self.groups()[group].free_blocks_count == 0 {
            return Ok(None);
        }

        let bitmap_block = self.groups()[group].block_bitmap;
        let mut bitmap = self.block_buf();
        self.read_block(bitmap_block, &mut bitmap)?;

        let max_bits = self.blocks_in_group(group) as usize;
        let Some(bit) = find_first_clear_bit(&bitmap, max_bits) else {
            return Ok(None);
        };

        set_bit(&mut bitmap, bit);
        self.write_block(bitmap_block, &bitmap)?;

        self.groups[group].free_blocks_count -= 1;
        self.superblock.free_blocks_count -= 1;
        self.flush_group_descriptor(group as u32)?;
        self.flush_superblock()?;

        let sb = self.superblock();
        Ok(Some(
            group as u32 * sb.blocks_per_group + sb.first_data_block + bit as u32,
        ))
    }

    /// Free a previously allocated data block.
    ///
    /// Blocks below `first_data_block` or at/past `blocks_count` are
    /// rejected. An already-clear bit logs a warning and succeeds.
    pub fn free_block(&mut self, block: u32) -> Result<(), FsError> {
        let sb = self.superblock();
        if block < sb.first_data_block || block >= sb.blocks_count {
            log::warn!("ext2: free of block {} out of range", block);
            return Err(FsError::BlockOutOfRange(block));
        }

        let adjusted = block - sb.first_data_block;
        let group = (adjusted / sb.blocks_per_group) as usize;
        let bit = (adjusted % sb.blocks_per_group) as usize;

        let bitmap_block = self.groups()[group].block_bitmap;
        let mut bitmap = self.block_buf();
        self.read_block(bitmap_block, &mut bitmap)?;

        if !test_bit(&bitmap, bit) {
            log::warn!("ext2: block {} was already free", block);
            return Ok(());
        }

        clear_bit(&mut bitmap, bit);
        self.write_block(bitmap_block, &bitmap)?;

        self.groups[group].free_blocks_count += 1;
        self.superblock.free_blocks_count += 1;
        self.flush_group_descriptor(group as u32)?;
        self.flush_superblock()?;
        Ok(())
    }
}

// =============================================================================
// Bit manipulation helpers
// =============================================================================

/// Test whether bit `index` is set (LSB-first within each byte).
pub fn test_bit(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (1 << (index % 8)) != 0
}

/// Set bit `index`.
pub fn set_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 1 << (index % 8);
}

/// Clear bit `index`.
pub fn clear_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] &= !(1 << (index % 8));
}

/// Find the first clear (0) bit, scanning up to `max_bits` bits.
///
/// Returns `Some(index)` of the first clear bit, or `None` if all are set.
pub fn find_first_clear_bit(bitmap: &[u8], max_bits: usize) -> Option<usize> {
    for (byte_idx, &byte) in bitmap.iter().enumerate() {
        if byte == 0xFF {
            // All bits set, skip this byte
            continue;
        }
        for bit in 0..8 {
            let index = byte_idx * 8 + bit;
            if index >= max_bits {
                return None;
            }
            if byte & (1 << bit) == 0 {
                return Some(index);
            }
        }
    }
    None
}
