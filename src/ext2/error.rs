//! Filesystem errors.

use thiserror::Error;

/// Errors reported by the ext2 engine.
///
/// Format errors are fatal at mount time and reported (not fatal) when they
/// surface later; every other kind aborts the current operation only. The
/// shell driver prints the error and keeps running.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path or directory entry does not exist.
    #[error("no such file or directory")]
    NotFound,
    /// An entry with the target name already exists.
    #[error("file exists")]
    AlreadyExists,
    /// A path component or operation target is not a directory.
    #[error("not a directory")]
    NotADirectory,
    /// The operation target is a directory.
    #[error("is a directory")]
    IsADirectory,
    /// The operation target is not a regular file.
    #[error("not a regular file")]
    NotRegular,
    /// Directory still contains entries other than `.` and `..`.
    #[error("directory not empty")]
    NotEmpty,
    /// Removal of `/`, `.` or `..` was requested.
    #[error("refusing to remove '.', '..' or '/'")]
    RemoveProtected,
    /// Name longer than 255 bytes, or does not fit its directory record.
    #[error("name too long")]
    NameTooLong,
    /// Empty name, or a name containing `/` where one is not allowed.
    #[error("invalid name")]
    InvalidName,
    /// No free data block anywhere, or a directory has exhausted every
    /// pointer level it is allowed to grow into.
    #[error("no space left on image")]
    NoSpace,
    /// Every inode bitmap is full.
    #[error("no free inodes")]
    NoFreeInodes,
    /// Block number outside `[first_data_block, blocks_count)`, or a write
    /// aimed at block 0.
    #[error("block {0} out of range")]
    BlockOutOfRange(u32),
    /// Inode number 0 or greater than `inodes_count`.
    #[error("inode {0} out of range")]
    InodeOutOfRange(u32),
    /// The image failed superblock validation.
    #[error("invalid filesystem: {0}")]
    Format(&'static str),
    /// An on-disk structure violates its own invariants.
    #[error("corrupted filesystem structure: {0}")]
    Corrupted(&'static str),
    /// Fewer bytes than one block transferred.
    #[error("short transfer on block {0}")]
    ShortIo(u32),
    /// Underlying read or write failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
