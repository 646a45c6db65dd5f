//! Ext2 on-disk structures.
//!
//! These structures match the ext2 specification for little-endian images
//! at revisions 0 and 1. Layouts are binding: the superblock occupies the
//! 1024 bytes at byte offset 1024, group descriptors are 32 bytes, inodes
//! are decoded from the first 128 bytes of their table record, and
//! directory entries carry an 8-byte header followed by the name.

/// Ext2 magic number in the superblock.
pub const EXT2_SUPER_MAGIC: u16 = 0xEF53;

/// Root directory inode number (always 2 in ext2).
pub const EXT2_ROOT_INO: u32 = 2;

/// Superblock offset from start of device (in bytes).
pub const SUPERBLOCK_OFFSET: u64 = 1024;

/// Maximum file name length in bytes.
pub const EXT2_NAME_LEN: usize = 255;

/// Number of block pointers in an inode (12 direct + 3 indirect).
pub const EXT2_N_BLOCKS: usize = 15;

/// Smallest legal block size.
pub const EXT2_MIN_BLOCK_SIZE: u32 = 1024;

/// Largest legal block size (`log_block_size` = 6).
pub const EXT2_MAX_BLOCK_SIZE: u32 = 65536;

/// Inode size for revision-0 filesystems.
pub const EXT2_GOOD_OLD_INODE_SIZE: u16 = 128;

/// Revision level with variable inode size and feature flags.
pub const EXT2_DYNAMIC_REV: u32 = 1;

// Inode mode type mask
pub const S_IFMT: u16 = 0xF000;
/// Regular file
pub const S_IFREG: u16 = 0x8000;
/// Directory
pub const S_IFDIR: u16 = 0x4000;
/// Symbolic link
pub const S_IFLNK: u16 = 0xA000;

// Directory entry file types
/// Unknown
pub const FT_UNKNOWN: u8 = 0;
/// Regular file
pub const FT_REG_FILE: u8 = 1;
/// Directory
pub const FT_DIR: u8 = 2;
/// Symbolic link
pub const FT_SYMLINK: u8 = 7;

/// Ext2 superblock structure.
///
/// Located at byte offset 1024 from the start of the device.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    /// Total number of inodes in the filesystem
    pub inodes_count: u32,
    /// Total number of blocks in the filesystem
    pub blocks_count: u32,
    /// Number of blocks reserved for the superuser
    pub reserved_blocks_count: u32,
    /// Number of free blocks
    pub free_blocks_count: u32,
    /// Number of free inodes
    pub free_inodes_count: u32,
    /// Block number of the first data block (0 or 1 depending on block size)
    pub first_data_block: u32,
    /// Block size = 1024 << log_block_size
    pub log_block_size: u32,
    /// Fragment size (read but not honored)
    pub log_frag_size: u32,
    /// Number of blocks per block group
    pub blocks_per_group: u32,
    /// Number of fragments per block group (obsolete)
    pub frags_per_group: u32,
    /// Number of inodes per block group
    pub inodes_per_group: u32,
    /// Last mount time
    pub mtime: u32,
    /// Last write time
    pub wtime: u32,
    /// Mount count since last fsck
    pub mnt_count: u16,
    /// Maximum mount count before fsck
    pub max_mnt_count: u16,
    /// Magic number (0xEF53)
    pub magic: u16,
    /// Filesystem state
    pub state: u16,
    /// What to do on error
    pub errors: u16,
    /// Minor revision level
    pub minor_rev_level: u16,
    /// Last fsck time
    pub lastcheck: u32,
    /// Maximum time between fscks
    pub checkinterval: u32,
    /// Creator OS
    pub creator_os: u32,
    /// Revision level (0 = original, 1 = dynamic)
    pub rev_level: u32,
    /// Default UID for reserved blocks
    pub def_resuid: u16,
    /// Default GID for reserved blocks
    pub def_resgid: u16,
    // --- EXT2_DYNAMIC_REV (rev_level >= 1) fields ---
    /// First non-reserved inode
    pub first_ino: u32,
    /// Inode structure size
    pub inode_size: u16,
    /// Block group number of this superblock
    pub block_group_nr: u16,
    /// Compatible feature set
    pub feature_compat: u32,
    /// Incompatible feature set
    pub feature_incompat: u32,
    /// Read-only compatible feature set
    pub feature_ro_compat: u32,
    /// 128-bit UUID (read but not validated)
    pub uuid: [u8; 16],
    /// Volume name
    pub volume_name: [u8; 16],
    /// Last mounted path
    pub last_mounted: [u8; 64],
    /// Compression algorithm bitmap
    pub algo_bitmap: u32,
    // Padding to 1024 bytes
    pub _padding: [u8; 820],
}

const _: () = assert!(core::mem::size_of::<Superblock>() == 1024);

impl Superblock {
    /// Maximum valid log_block_size (6 = 64KB blocks).
    const MAX_LOG_BLOCK_SIZE: u32 = 6;

    /// Decode a superblock from the 1024 bytes at offset 1024.
    pub fn from_bytes(bytes: &[u8; 1024]) -> Self {
        // Safety: Superblock is repr(C) with size 1024 and every bit
        // pattern is a valid value. Fields are validated before use.
        unsafe { core::ptr::read(bytes.as_ptr() as *const Self) }
    }

    /// Serialise back to the on-disk byte layout.
    pub fn to_bytes(&self) -> [u8; 1024] {
        // Safety: same layout argument as `from_bytes`.
        unsafe { core::ptr::read(self as *const Self as *const [u8; 1024]) }
    }

    /// Calculate block size from log_block_size.
    ///
    /// Returns `None` if `log_block_size` is out of the valid range [0, 6].
    pub fn block_size(&self) -> Option<u32> {
        if self.log_block_size > Self::MAX_LOG_BLOCK_SIZE {
            return None;
        }
        Some(EXT2_MIN_BLOCK_SIZE << self.log_block_size)
    }

    /// Get inode size (128 for rev0, taken from the superblock for rev1+).
    pub fn inode_size(&self) -> u32 {
        if self.rev_level >= EXT2_DYNAMIC_REV && self.inode_size > 0 {
            self.inode_size as u32
        } else {
            EXT2_GOOD_OLD_INODE_SIZE as u32
        }
    }

    /// Calculate number of block groups.
    ///
    /// Returns `None` if `blocks_per_group` is zero.
    pub fn group_count(&self) -> Option<u32> {
        if self.blocks_per_group == 0 {
            return None;
        }
        Some(self.blocks_count.div_ceil(self.blocks_per_group))
    }

    /// Validate the superblock.
    ///
    /// Checks the magic signature, counter consistency, group geometry,
    /// block size range and (for dynamic-revision images) the inode size.
    pub fn validate(&self) -> Result<(), crate::ext2::FsError> {
        use crate::ext2::FsError;

        if self.magic != EXT2_SUPER_MAGIC {
            log::warn!(
                "ext2: bad magic {:#06x} (expected {:#06x})",
                self.magic,
                EXT2_SUPER_MAGIC
            );
            return Err(FsError::Format("bad magic signature"));
        }

        if self.blocks_count == 0 {
            return Err(FsError::Format("blocks_count is zero"));
        }
        if self.inodes_count == 0 {
            return Err(FsError::Format("inodes_count is zero"));
        }

        if self.free_blocks_count > self.blocks_count {
            return Err(FsError::Format("free block count exceeds total"));
        }
        if self.free_inodes_count > self.inodes_count {
            return Err(FsError::Format("free inode count exceeds total"));
        }

        if self.blocks_per_group == 0 {
            return Err(FsError::Format("blocks_per_group is zero"));
        }
        if self.inodes_per_group == 0 {
            return Err(FsError::Format("inodes_per_group is zero"));
        }

        // Group count computed from blocks must agree with the count
        // computed from inodes.
        let groups_by_blocks = self.blocks_count.div_ceil(self.blocks_per_group);
        let groups_by_inodes = self.inodes_count.div_ceil(self.inodes_per_group);
        if groups_by_blocks != groups_by_inodes {
            log::warn!(
                "ext2: group count mismatch (by blocks: {}, by inodes: {})",
                groups_by_blocks,
                groups_by_inodes
            );
            return Err(FsError::Format("inconsistent group count"));
        }

        if self.log_block_size > Self::MAX_LOG_BLOCK_SIZE {
            return Err(FsError::Format("block size out of range"));
        }

        // Dynamic revision: inode size must be >= 128 and a power of two.
        if self.rev_level >= EXT2_DYNAMIC_REV {
            let isize = self.inode_size;
            if isize < EXT2_GOOD_OLD_INODE_SIZE || !isize.is_power_of_two() {
                log::warn!("ext2: invalid inode_size {} for rev {}", isize, self.rev_level);
                return Err(FsError::Format("invalid inode size for dynamic revision"));
            }
        }

        Ok(())
    }
}

/// Block group descriptor.
///
/// Located in the group descriptor table, in the block after the superblock.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GroupDescriptor {
    /// Block number of block bitmap
    pub block_bitmap: u32,
    /// Block number of inode bitmap
    pub inode_bitmap: u32,
    /// Block number of first inode table block
    pub inode_table: u32,
    /// Number of free blocks in this group
    pub free_blocks_count: u16,
    /// Number of free inodes in this group
    pub free_inodes_count: u16,
    /// Number of directories in this group
    pub used_dirs_count: u16,
    /// Padding
    pub pad: u16,
    /// Reserved
    pub reserved: [u32; 3],
}

const _: () = assert!(core::mem::size_of::<GroupDescriptor>() == 32);

impl GroupDescriptor {
    /// Decode one descriptor from its 32-byte on-disk record.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        // Safety: repr(C), size 32, all bit patterns valid.
        unsafe { core::ptr::read(bytes.as_ptr() as *const Self) }
    }

    /// Serialise back to the on-disk byte layout.
    pub fn to_bytes(&self) -> [u8; 32] {
        // Safety: same layout argument as `from_bytes`.
        unsafe { core::ptr::read(self as *const Self as *const [u8; 32]) }
    }
}

/// Inode structure.
///
/// Describes one file, directory or other filesystem object. Only the
/// first 128 bytes of the on-disk record are decoded; larger dynamic
/// inode records keep their trailing bytes untouched on write-back.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Inode {
    /// File mode (type and permissions)
    pub mode: u16,
    /// Owner user ID
    pub uid: u16,
    /// File size in bytes (lower 32 bits)
    pub size: u32,
    /// Last access time
    pub atime: u32,
    /// Creation time
    pub ctime: u32,
    /// Last modification time
    pub mtime: u32,
    /// Deletion time
    pub dtime: u32,
    /// Owner group ID
    pub gid: u16,
    /// Number of hard links
    pub links_count: u16,
    /// Number of 512-byte blocks allocated
    pub blocks: u32,
    /// File flags
    pub flags: u32,
    /// OS-specific value 1
    pub osd1: u32,
    /// Block pointers: 0-11 direct, 12 indirect, 13 double, 14 triple
    pub block: [u32; EXT2_N_BLOCKS],
    /// File generation (for NFS)
    pub generation: u32,
    /// File ACL (extended attributes)
    pub file_acl: u32,
    /// Directory ACL / high 32 bits of size (regular files in rev1)
    pub size_high: u32,
    /// Fragment address (obsolete)
    pub faddr: u32,
    /// OS-specific value 2
    pub osd2: [u8; 12],
}

const _: () = assert!(core::mem::size_of::<Inode>() == 128);

impl Inode {
    /// An all-zero inode record.
    pub fn zeroed() -> Self {
        // Safety: repr(C), all-zeros is a valid bit pattern.
        unsafe { core::mem::zeroed() }
    }

    /// Decode an inode from the first 128 bytes of its table record.
    pub fn from_bytes(bytes: &[u8; 128]) -> Self {
        // Safety: repr(C), size 128, all bit patterns valid.
        unsafe { core::ptr::read(bytes.as_ptr() as *const Self) }
    }

    /// Serialise back to the on-disk byte layout.
    pub fn to_bytes(&self) -> [u8; 128] {
        // Safety: same layout argument as `from_bytes`.
        unsafe { core::ptr::read(self as *const Self as *const [u8; 128]) }
    }

    /// Get the 64-bit file size.
    ///
    /// The `size_high` field doubles as the directory ACL; it is combined
    /// unconditionally to preserve the read behaviour of standard images.
    pub fn size(&self) -> u64 {
        self.size as u64 | ((self.size_high as u64) << 32)
    }

    /// Set the 64-bit file size.
    pub fn set_size(&mut self, size: u64) {
        self.size = size as u32;
        self.size_high = (size >> 32) as u32;
    }

    /// Check if this inode is a directory.
    pub fn is_dir(&self) -> bool {
        (self.mode & S_IFMT) == S_IFDIR
    }

    /// Check if this inode is a regular file.
    pub fn is_file(&self) -> bool {
        (self.mode & S_IFMT) == S_IFREG
    }

    /// Check if this inode is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        (self.mode & S_IFMT) == S_IFLNK
    }
}

/// Directory entry header (on-disk format).
///
/// A variable-length record inside a directory data block: this 8-byte
/// header is followed by `name_len` name bytes, padded so that `rec_len`
/// is a multiple of 4. The last entry's `rec_len` extends to the end of
/// the block. `inode == 0` marks a deleted entry whose `rec_len` still
/// contributes to the block total.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DirEntryRaw {
    /// Inode number (0 = deleted entry)
    pub inode: u32,
    /// Record length (distance to next entry, 4-byte aligned)
    pub rec_len: u16,
    /// Name length
    pub name_len: u8,
    /// File type (FT_* constant)
    pub file_type: u8,
    // Name follows (up to 255 bytes, not null-terminated)
}

const _: () = assert!(core::mem::size_of::<DirEntryRaw>() == 8);

impl DirEntryRaw {
    /// Decode an entry header from the 8 bytes at the start of `bytes`.
    ///
    /// Explicit little-endian field reads: record offsets inside a
    /// corrupted block need not be aligned.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            inode: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            rec_len: u16::from_le_bytes([bytes[4], bytes[5]]),
            name_len: bytes[6],
            file_type: bytes[7],
        }
    }
}

/// A decoded directory entry, as returned by directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Inode the entry refers to.
    pub inode: u32,
    /// Entry name (lossy-decoded for display).
    pub name: String,
    /// File type (FT_* constant).
    pub file_type: u8,
}
