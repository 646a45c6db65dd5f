//! Path to inode resolution.

use super::{Ext2Fs, FsError, EXT2_ROOT_INO};

impl Ext2Fs {
    /// Resolve a slash-separated path to an inode number.
    ///
    /// Absolute paths walk from the root inode; relative paths walk from
    /// `cwd`. Empty segments are skipped, so `"/"` is the root and
    /// `"a//b"` equals `"a/b"`. `.` and `..` are resolved like any other
    /// name - they are real directory entries.
    pub fn resolve_path(&self, cwd: u32, path: &str) -> Result<u32, FsError> {
        let mut current = if path.starts_with('/') {
            EXT2_ROOT_INO
        } else {
            cwd
        };

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let inode = self.read_inode(current)?;
            if !inode.is_dir() {
                return Err(FsError::NotADirectory);
            }
            current = self.find_entry(&inode, segment)?;
        }

        Ok(current)
    }
}

/// Split a path into its parent directory and final component.
///
/// Trailing slashes are stripped first. A bare name has parent `"."`;
/// a top-level absolute path has parent `"/"`.
///
/// ```
/// use ext2_shell::ext2::split_parent_leaf;
///
/// assert_eq!(split_parent_leaf("a/b/c"), ("a/b", "c"));
/// assert_eq!(split_parent_leaf("/top"), ("/", "top"));
/// assert_eq!(split_parent_leaf("name"), (".", "name"));
/// assert_eq!(split_parent_leaf("dir/"), (".", "dir"));
/// ```
pub fn split_parent_leaf(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        None => (".", trimmed),
        Some(0) => ("/", &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
    }
}
