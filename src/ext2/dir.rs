//! Directory entry manipulation.
//!
//! Directory data blocks hold a stream of variable-length records:
//!
//! ```text
//! +--------+--------+--------+-----+--------+
//! | entry0 | entry1 | entry2 | ... | entryN |
//! +--------+--------+--------+-----+--------+
//! ```
//!
//! Each entry has a fixed 8-byte header ([`DirEntryRaw`]) followed by the
//! name. There is no terminator: the record lengths sum to exactly one
//! block, and the last entry's `rec_len` runs to the end of the block.
//! That trailing slack is where new entries are carved out.
//!
//! Insertion splits the final entry of a block when its record has enough
//! slack, and otherwise allocates a fresh block for the directory.
//! Removal extends the predecessor's `rec_len` over the removed record,
//! or - for the first entry of a block - zeroes the inode field, leaving
//! a tombstone whose `rec_len` still counts toward the block total.

use super::{DirEntry, DirEntryRaw, Ext2Fs, FsError, Inode, FT_DIR, EXT2_NAME_LEN};

/// Fixed directory entry header size (bytes before the name).
const DIR_ENTRY_HEADER_SIZE: usize = 8;

/// Align a value up to a 4-byte boundary.
fn align4(val: usize) -> usize {
    (val + 3) & !3
}

/// On-disk size occupied by an entry with the given name length.
fn entry_size(name_len: usize) -> usize {
    align4(DIR_ENTRY_HEADER_SIZE + name_len)
}

/// Iterate the entries of one directory block, calling `f(pos, entry)`
/// for each record until it returns `false`.
///
/// Stops on a zero or past-end `rec_len` (corruption guard).
fn scan_block<F>(buf: &[u8], mut f: F)
where
    F: FnMut(usize, &DirEntryRaw) -> bool,
{
    let block_size = buf.len();
    let mut pos = 0usize;
    while pos + DIR_ENTRY_HEADER_SIZE <= block_size {
        let entry = DirEntryRaw::from_bytes(&buf[pos..]);
        if (entry.rec_len as usize) < DIR_ENTRY_HEADER_SIZE
            || pos + entry.rec_len as usize > block_size
        {
            log::warn!(
                "ext2: invalid dir entry rec_len {} at offset {}",
                entry.rec_len,
                pos
            );
            break;
        }
        if !f(pos, &entry) {
            break;
        }
        pos += entry.rec_len as usize;
    }
}

/// Check that the record lengths of a block sum to exactly the block size.
fn rec_lens_fill_block(buf: &[u8]) -> bool {
    let mut total = 0usize;
    scan_block(buf, |_, entry| {
        total += entry.rec_len as usize;
        true
    });
    total == buf.len()
}

/// Search one block for a live entry with the given name.
fn find_in_block(buf: &[u8], name: &[u8]) -> Option<(usize, DirEntryRaw)> {
    let mut found = None;
    scan_block(buf, |pos, entry| {
        if entry.inode != 0
            && entry.name_len as usize == name.len()
            && name_of(buf, pos, entry) == name
        {
            found = Some((pos, *entry));
            return false;
        }
        true
    });
    found
}

/// The name bytes of the entry at `pos`.
fn name_of<'a>(buf: &'a [u8], pos: usize, entry: &DirEntryRaw) -> &'a [u8] {
    let start = pos + DIR_ENTRY_HEADER_SIZE;
    let len = (entry.name_len as usize).min(entry.rec_len as usize - DIR_ENTRY_HEADER_SIZE);
    &buf[start..start + len]
}

/// Write a directory entry into a block buffer at the given position.
///
/// Serialises the header followed by the name bytes and zero-fills the
/// padding up to the next 4-byte boundary.
fn write_dir_entry(
    buf: &mut [u8],
    pos: usize,
    inode: u32,
    rec_len: u16,
    name: &[u8],
    file_type: u8,
) {
    buf[pos..pos + 4].copy_from_slice(&inode.to_le_bytes());
    buf[pos + 4..pos + 6].copy_from_slice(&rec_len.to_le_bytes());
    buf[pos + 6] = name.len() as u8;
    buf[pos + 7] = file_type;

    let name_start = pos + DIR_ENTRY_HEADER_SIZE;
    buf[name_start..name_start + name.len()].copy_from_slice(name);

    let name_end = name_start + name.len();
    let padded_end = pos + entry_size(name.len());
    if padded_end > name_end && padded_end <= pos + rec_len as usize {
        buf[name_end..padded_end].fill(0);
    }
}

impl Ext2Fs {
    /// The allocated data blocks of a directory, in traversal order.
    fn dir_blocks(&self, dir: &Inode) -> Result<Vec<u32>, FsError> {
        let mut blocks = Vec::new();
        self.for_each_data_block(dir, |block| {
            blocks.push(block);
            Ok(true)
        })?;
        Ok(blocks)
    }

    /// Look up a name in a directory, returning the child inode number.
    ///
    /// Matches are exact: same length, same bytes.
    pub fn find_entry(&self, dir: &Inode, name: &str) -> Result<u32, FsError> {
        let name_bytes = name.as_bytes();
        let mut buf = self.block_buf();
        let mut found = None;

        self.for_each_data_block(dir, |block| {
            self.read_block(block, &mut buf)?;
            if let Some((_, entry)) = find_in_block(&buf, name_bytes) {
                found = Some(entry.inode);
                return Ok(false);
            }
            Ok(true)
        })?;

        found.ok_or(FsError::NotFound)
    }

    /// List every live entry of a directory in on-disk traversal order,
    /// `.` and `..` included.
    pub fn list_dir(&self, dir: &Inode) -> Result<Vec<DirEntry>, FsError> {
        let mut entries = Vec::new();
        let mut buf = self.block_buf();

        self.for_each_data_block(dir, |block| {
            self.read_block(block, &mut buf)?;
            scan_block(&buf, |pos, entry| {
                if entry.inode != 0 {
                    entries.push(DirEntry {
                        inode: entry.inode,
                        name: String::from_utf8_lossy(name_of(&buf, pos, entry)).into_owned(),
                        file_type: entry.file_type,
                    });
                }
                true
            });
            Ok(true)
        })?;

        Ok(entries)
    }

    /// Add a directory entry for `child_ino` under `name`.
    ///
    /// First pass: in each allocated block, the final entry's slack
    /// (`rec_len` beyond its actual occupancy) is split off for the new
    /// record. If no block has room, a fresh data block is allocated,
    /// laid out as a single whole-block entry and linked into the first
    /// free pointer slot; the directory inode's size and block count grow
    /// accordingly (the caller persists the inode).
    pub fn add_dir_entry(
        &mut self,
        dir_ino: u32,
        dir_inode: &mut Inode,
        name: &str,
        child_ino: u32,
        file_type: u8,
    ) -> Result<(), FsError> {
        let name_bytes = name.as_bytes();
        if name_bytes.is_empty() {
            return Err(FsError::InvalidName);
        }
        if name_bytes.len() > EXT2_NAME_LEN {
            return Err(FsError::NameTooLong);
        }

        let needed = entry_size(name_bytes.len());
        let block_size = self.block_size() as usize;
        let mut buf = self.block_buf();

        for block in self.dir_blocks(dir_inode)? {
            self.read_block(block, &mut buf)?;

            if find_in_block(&buf, name_bytes).is_some() {
                return Err(FsError::AlreadyExists);
            }

            // Locate the final entry of this block.
            let mut last: Option<(usize, DirEntryRaw)> = None;
            scan_block(&buf, |pos, entry| {
                last = Some((pos, *entry));
                true
            });
            let Some((pos, entry)) = last else {
                continue;
            };

            let actual = entry_size(entry.name_len as usize);
            let slack = (entry.rec_len as usize).saturating_sub(actual);
            if slack < needed {
                continue;
            }

            // Split: trim the final entry to its occupancy, put the new
            // record in the freed tail.
            buf[pos + 4..pos + 6].copy_from_slice(&(actual as u16).to_le_bytes());
            write_dir_entry(
                &mut buf,
                pos + actual,
                child_ino,
                slack as u16,
                name_bytes,
                file_type,
            );

            if !rec_lens_fill_block(&buf) {
                return Err(FsError::Corrupted("directory block does not sum to block size"));
            }
            return self.write_block(block, &buf);
        }

        // No room anywhere - grow the directory by one block.
        let new_block = self.alloc_block(dir_ino)?;
        let mut new_buf = self.block_buf();
        write_dir_entry(
            &mut new_buf,
            0,
            child_ino,
            block_size as u16,
            name_bytes,
            file_type,
        );
        if let Err(err) = self.write_block(new_block, &new_buf) {
            let _ = self.free_block(new_block);
            return Err(err);
        }

        let meta_blocks = match self.attach_block(dir_inode, dir_ino, new_block) {
            Ok(meta) => meta,
            Err(err) => {
                let _ = self.free_block(new_block);
                return Err(err);
            }
        };

        dir_inode.set_size(dir_inode.size() + block_size as u64);
        dir_inode.blocks += (1 + meta_blocks) * (self.block_size() / 512);
        Ok(())
    }

    /// Remove the entry named `name`, returning the inode it referred to.
    ///
    /// The record is merged into its predecessor, or tombstoned if it is
    /// the first entry of its block. Directory data blocks are never
    /// freed here - only directory deletion releases them.
    pub fn remove_dir_entry(
        &mut self,
        dir_inode: &Inode,
        name: &str,
    ) -> Result<u32, FsError> {
        let name_bytes = name.as_bytes();
        let mut buf = self.block_buf();

        for block in self.dir_blocks(dir_inode)? {
            self.read_block(block, &mut buf)?;

            let Some((pos, entry)) = find_in_block(&buf, name_bytes) else {
                continue;
            };

            // Find the predecessor within this block, if any.
            let mut prev: Option<(usize, DirEntryRaw)> = None;
            scan_block(&buf, |p, e| {
                if p == pos {
                    return false;
                }
                prev = Some((p, *e));
                true
            });

            if let Some((prev_pos, prev_entry)) = prev {
                let merged = prev_entry.rec_len as u32 + entry.rec_len as u32;
                buf[prev_pos + 4..prev_pos + 6].copy_from_slice(&(merged as u16).to_le_bytes());
            } else {
                // First entry of the block: tombstone.
                buf[pos..pos + 4].copy_from_slice(&0u32.to_le_bytes());
            }

            if !rec_lens_fill_block(&buf) {
                return Err(FsError::Corrupted("directory block does not sum to block size"));
            }
            self.write_block(block, &buf)?;
            return Ok(entry.inode);
        }

        Err(FsError::NotFound)
    }

    /// Rename an entry in place, returning the inode it refers to.
    ///
    /// The new name must fit the existing record (`align4(8 + len)` within
    /// `rec_len`); entries never move between records or blocks. Bytes
    /// between the new name and the end of the record are zeroed.
    pub fn rename_dir_entry(
        &mut self,
        dir_inode: &Inode,
        old_name: &str,
        new_name: &str,
    ) -> Result<u32, FsError> {
        let old_bytes = old_name.as_bytes();
        let new_bytes = new_name.as_bytes();
        if new_bytes.is_empty() {
            return Err(FsError::InvalidName);
        }
        if new_bytes.len() > EXT2_NAME_LEN {
            return Err(FsError::NameTooLong);
        }

        let mut buf = self.block_buf();

        for block in self.dir_blocks(dir_inode)? {
            self.read_block(block, &mut buf)?;

            let Some((pos, entry)) = find_in_block(&buf, old_bytes) else {
                continue;
            };

            if entry_size(new_bytes.len()) > entry.rec_len as usize {
                return Err(FsError::NameTooLong);
            }

            buf[pos + 6] = new_bytes.len() as u8;
            let name_start = pos + DIR_ENTRY_HEADER_SIZE;
            buf[name_start..name_start + new_bytes.len()].copy_from_slice(new_bytes);
            buf[name_start + new_bytes.len()..pos + entry.rec_len as usize].fill(0);

            if !rec_lens_fill_block(&buf) {
                return Err(FsError::Corrupted("directory block does not sum to block size"));
            }
            self.write_block(block, &buf)?;
            return Ok(entry.inode);
        }

        Err(FsError::NotFound)
    }

    /// Build the initial contents of a new directory block.
    ///
    /// `.` points at the directory itself with `rec_len` 12; `..` points
    /// at the parent and its `rec_len` runs to the end of the block so
    /// later entries can be split out of it.
    pub fn init_dir_block(&self, self_ino: u32, parent_ino: u32) -> Vec<u8> {
        let block_size = self.block_size() as usize;
        let mut buf = vec![0u8; block_size];

        write_dir_entry(&mut buf, 0, self_ino, 12, b".", FT_DIR);
        write_dir_entry(&mut buf, 12, parent_ino, (block_size - 12) as u16, b"..", FT_DIR);

        buf
    }

    /// Check whether a directory holds only `.` and `..`.
    pub fn is_dir_empty(&self, dir: &Inode) -> Result<bool, FsError> {
        let mut buf = self.block_buf();
        let mut empty = true;

        self.for_each_data_block(dir, |block| {
            self.read_block(block, &mut buf)?;
            scan_block(&buf, |pos, entry| {
                if entry.inode != 0 {
                    let name = name_of(&buf, pos, entry);
                    if name != b"." && name != b".." {
                        empty = false;
                        return false;
                    }
                }
                true
            });
            Ok(empty)
        })?;

        Ok(empty)
    }
}
