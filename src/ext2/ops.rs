//! Shell-facing filesystem operations.
//!
//! Every mutating operation leaves the superblock, group descriptors,
//! bitmaps, target inode, parent inode and the affected directory blocks
//! consistent on disk before returning successfully. Operations that
//! acquire several resources release them in reverse order when a later
//! step fails.
//!
//! On-disk writes within one operation follow a fixed order: bitmap
//! updates for fresh allocations first (the allocators flush these
//! themselves), then new content blocks, then the inode records that
//! reference them, then parent directory inodes, then group descriptors
//! and the superblock. The ordering is advisory for crash-safety only -
//! there is no fsync discipline.

use std::time::{SystemTime, UNIX_EPOCH};

use super::path::split_parent_leaf;
use super::{
    Ext2Fs, FsError, Inode, EXT2_NAME_LEN, EXT2_ROOT_INO, FT_DIR, FT_REG_FILE, S_IFDIR, S_IFREG,
};

/// Current time as 32-bit unix seconds.
fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

impl Ext2Fs {
    /// Resolve a path and read its inode.
    pub fn stat_path(&self, cwd: u32, path: &str) -> Result<(u32, Inode), FsError> {
        let ino = self.resolve_path(cwd, path)?;
        let inode = self.read_inode(ino)?;
        Ok((ino, inode))
    }

    /// Resolve the parent directory of `path` and return it together with
    /// the leaf name.
    fn resolve_parent<'a>(
        &self,
        cwd: u32,
        path: &'a str,
    ) -> Result<(u32, Inode, &'a str), FsError> {
        let (parent_path, leaf) = split_parent_leaf(path);
        if leaf.is_empty() {
            return Err(FsError::InvalidName);
        }
        if leaf.len() > EXT2_NAME_LEN {
            return Err(FsError::NameTooLong);
        }

        let parent_ino = self.resolve_path(cwd, parent_path)?;
        let parent = self.read_inode(parent_ino)?;
        if !parent.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok((parent_ino, parent, leaf))
    }

    /// Create an empty regular file.
    ///
    /// Fails with `AlreadyExists` if the leaf name is taken. The freshly
    /// allocated inode is released again if the directory entry cannot be
    /// added.
    pub fn create_file(&mut self, cwd: u32, path: &str) -> Result<u32, FsError> {
        let (parent_ino, mut parent, leaf) = self.resolve_parent(cwd, path)?;

        match self.find_entry(&parent, leaf) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(err) => return Err(err),
        }

        let ino = self.alloc_inode()?;

        let now = unix_now();
        let mut node = Inode::zeroed();
        node.mode = S_IFREG | 0o644;
        node.links_count = 1;
        node.atime = now;
        node.ctime = now;
        node.mtime = now;

        if let Err(err) = self.write_inode(ino, &node) {
            let _ = self.free_inode(ino);
            return Err(err);
        }

        if let Err(err) = self.add_dir_entry(parent_ino, &mut parent, leaf, ino, FT_REG_FILE) {
            let _ = self.free_inode(ino);
            return Err(err);
        }

        parent.mtime = now;
        self.write_inode(parent_ino, &parent)?;

        Ok(ino)
    }

    /// Create a file, or refresh the timestamps of an existing one.
    pub fn touch(&mut self, cwd: u32, path: &str) -> Result<u32, FsError> {
        match self.resolve_path(cwd, path) {
            Ok(ino) => {
                let mut node = self.read_inode(ino)?;
                let now = unix_now();
                node.atime = now;
                node.mtime = now;
                self.write_inode(ino, &node)?;
                Ok(ino)
            }
            Err(FsError::NotFound) => self.create_file(cwd, path),
            Err(err) => Err(err),
        }
    }

    /// Delete a regular file (or other non-directory).
    ///
    /// The directory entry is removed and the link count decremented; at
    /// zero links every data and pointer block is released, the inode is
    /// freed, and its record is written back zeroed except for the
    /// deletion time.
    pub fn delete_file(&mut self, cwd: u32, path: &str) -> Result<(), FsError> {
        let ino = self.resolve_path(cwd, path)?;
        let mut node = self.read_inode(ino)?;
        if node.is_dir() {
            return Err(FsError::IsADirectory);
        }

        let (parent_ino, mut parent, leaf) = self.resolve_parent(cwd, path)?;
        self.remove_dir_entry(&parent, leaf)?;

        let now = unix_now();
        node.links_count = node.links_count.saturating_sub(1);
        if node.links_count == 0 {
            self.free_file_blocks(&node)?;
            self.free_inode(ino)?;
            node = Inode::zeroed();
            node.dtime = now;
        }
        self.write_inode(ino, &node)?;

        parent.mtime = now;
        parent.atime = now;
        self.write_inode(parent_ino, &parent)?;

        Ok(())
    }

    /// Create a directory.
    ///
    /// Allocates an inode and one data block, writes the `.`/`..` block,
    /// links the entry into the parent and bumps the parent's link count
    /// for the new `..` back-reference. Both allocations are rolled back
    /// if any later step fails.
    pub fn make_directory(&mut self, cwd: u32, path: &str) -> Result<u32, FsError> {
        let (parent_ino, mut parent, leaf) = self.resolve_parent(cwd, path)?;

        match self.find_entry(&parent, leaf) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(err) => return Err(err),
        }

        let ino = self.alloc_inode()?;
        let block = match self.alloc_block(ino) {
            Ok(block) => block,
            Err(err) => {
                let _ = self.free_inode(ino);
                return Err(err);
            }
        };

        let result = self.make_directory_inner(parent_ino, &mut parent, leaf, ino, block);
        if let Err(err) = result {
            let _ = self.free_block(block);
            let _ = self.free_inode(ino);
            return Err(err);
        }

        let group = ((ino - 1) / self.superblock.inodes_per_group) as usize;
        self.groups[group].used_dirs_count += 1;
        self.flush_group_descriptor(group as u32)?;

        Ok(ino)
    }

    fn make_directory_inner(
        &mut self,
        parent_ino: u32,
        parent: &mut Inode,
        leaf: &str,
        ino: u32,
        block: u32,
    ) -> Result<(), FsError> {
        let block_size = self.block_size();
        let dir_block = self.init_dir_block(ino, parent_ino);
        self.write_block(block, &dir_block)?;

        let now = unix_now();
        let mut node = Inode::zeroed();
        node.mode = S_IFDIR | 0o755;
        node.links_count = 2; // "." plus the parent's entry
        node.set_size(block_size as u64);
        node.blocks = block_size / 512;
        node.block[0] = block;
        node.atime = now;
        node.ctime = now;
        node.mtime = now;
        self.write_inode(ino, &node)?;

        self.add_dir_entry(parent_ino, parent, leaf, ino, FT_DIR)?;

        parent.links_count += 1; // the new directory's ".."
        parent.mtime = now;
        self.write_inode(parent_ino, parent)?;
        Ok(())
    }

    /// Remove an empty directory.
    ///
    /// `/`, `.` and `..` are refused. Every data block the directory still
    /// owns is released - a directory that grew and was later emptied may
    /// hold several blocks full of tombstones.
    pub fn remove_directory(&mut self, cwd: u32, path: &str) -> Result<(), FsError> {
        let (_, leaf) = split_parent_leaf(path);
        if path == "/" || leaf == "." || leaf == ".." || leaf.is_empty() {
            return Err(FsError::RemoveProtected);
        }

        let ino = self.resolve_path(cwd, path)?;
        if ino == EXT2_ROOT_INO {
            return Err(FsError::RemoveProtected);
        }

        let node = self.read_inode(ino)?;
        if !node.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !self.is_dir_empty(&node)? {
            return Err(FsError::NotEmpty);
        }

        let (parent_ino, mut parent, leaf) = self.resolve_parent(cwd, path)?;
        self.remove_dir_entry(&parent, leaf)?;

        self.free_file_blocks(&node)?;

        // Unlike file deletion, the cleared record (dtime set, zero links)
        // goes to disk before the inode's bitmap bit is released.
        let now = unix_now();
        let mut cleared = Inode::zeroed();
        cleared.dtime = now;
        self.write_inode(ino, &cleared)?;
        self.free_inode(ino)?;

        parent.links_count = parent.links_count.saturating_sub(1);
        parent.mtime = now;
        self.write_inode(parent_ino, &parent)?;

        let group = ((ino - 1) / self.superblock.inodes_per_group) as usize;
        self.groups[group].used_dirs_count = self.groups[group].used_dirs_count.saturating_sub(1);
        self.flush_group_descriptor(group as u32)?;

        Ok(())
    }

    /// Rename an entry of the working directory in place.
    ///
    /// The new name may not contain `/`, must be at most 255 bytes, and
    /// must not already exist. Renames never move an entry to a different
    /// record or block; a name that does not fit fails with
    /// `NameTooLong`.
    pub fn rename_in_cwd(&mut self, cwd: u32, old_name: &str, new_name: &str) -> Result<(), FsError> {
        if new_name.contains('/') || new_name.is_empty() || old_name.is_empty() {
            return Err(FsError::InvalidName);
        }
        if new_name.len() > EXT2_NAME_LEN {
            return Err(FsError::NameTooLong);
        }

        let mut cwd_inode = self.read_inode(cwd)?;
        if !cwd_inode.is_dir() {
            return Err(FsError::NotADirectory);
        }

        match self.find_entry(&cwd_inode, new_name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(err) => return Err(err),
        }

        let child = self.rename_dir_entry(&cwd_inode, old_name, new_name)?;

        let now = unix_now();
        let mut node = self.read_inode(child)?;
        node.ctime = now;
        self.write_inode(child, &node)?;

        cwd_inode.mtime = now;
        self.write_inode(cwd, &cwd_inode)?;

        Ok(())
    }

    /// Read the full logical content of a regular file.
    pub fn read_file_content(&self, cwd: u32, path: &str) -> Result<Vec<u8>, FsError> {
        let (_, node) = self.stat_path(cwd, path)?;
        if !node.is_file() {
            return Err(FsError::NotRegular);
        }
        self.read_file(&node)
    }
}
