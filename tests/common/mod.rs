//! Shared test support: synthetic ext2 images and invariant checkers.
//!
//! Tests build their disk images in memory instead of shipping binary
//! fixtures. The single-group image is the default playground; the
//! two-group image exercises allocator group preference.

#![allow(dead_code)]

use ext2_shell::ext2::{
    set_bit, test_bit, BlockDevice, Ext2Fs, GroupDescriptor, Inode, MemDevice, Superblock,
    EXT2_ROOT_INO, EXT2_SUPER_MAGIC, FT_DIR, S_IFDIR, S_IFREG,
};

/// Block size used by every test image.
pub const B: u32 = 1024;

/// Fixed build timestamp baked into test images.
pub const EPOCH: u32 = 1_700_000_000;

// Single-group image geometry: block 0 boot, 1 superblock, 2 descriptor
// table, 3 block bitmap, 4 inode bitmap, 5..=12 inode table (64 inodes of
// 128 bytes), 13 root directory.
pub const IMG_BLOCKS: u32 = 256;
pub const IMG_INODES: u32 = 64;
pub const BLOCK_BITMAP: u32 = 3;
pub const INODE_BITMAP: u32 = 4;
pub const INODE_TABLE: u32 = 5;
pub const ROOT_BLOCK: u32 = 13;
/// Blocks 1..=13 are in use when the image is fresh.
pub const IMG_FREE_BLOCKS: u16 = 242;
/// Inodes 1..=10 are reserved; the root is inode 2.
pub const IMG_FREE_INODES: u16 = 54;
/// First inode the allocator will hand out.
pub const FIRST_FREE_INO: u32 = 11;
/// First block the allocator will hand out.
pub const FIRST_FREE_BLOCK: u32 = 14;

/// Write `bytes` at an absolute block position of the image.
fn put(dev: &MemDevice, block: u32, offset: usize, bytes: &[u8]) {
    dev.write_at(block as u64 * B as u64 + offset as u64, bytes)
        .expect("image write");
}

/// Encode a directory entry into `buf` at `pos`.
pub fn raw_dir_entry(buf: &mut [u8], pos: usize, inode: u32, rec_len: u16, name: &[u8], ft: u8) {
    buf[pos..pos + 4].copy_from_slice(&inode.to_le_bytes());
    buf[pos + 4..pos + 6].copy_from_slice(&rec_len.to_le_bytes());
    buf[pos + 6] = name.len() as u8;
    buf[pos + 7] = ft;
    buf[pos + 8..pos + 8 + name.len()].copy_from_slice(name);
}

/// A root directory block holding only `.` and `..`.
fn root_dir_block() -> Vec<u8> {
    let mut buf = vec![0u8; B as usize];
    raw_dir_entry(&mut buf, 0, EXT2_ROOT_INO, 12, b".", FT_DIR);
    raw_dir_entry(&mut buf, 12, EXT2_ROOT_INO, (B - 12) as u16, b"..", FT_DIR);
    buf
}

/// The root inode record for a fresh image.
fn root_inode(first_block: u32) -> Inode {
    let mut root = Inode::zeroed();
    root.mode = S_IFDIR | 0o755;
    root.set_size(B as u64);
    root.links_count = 2;
    root.blocks = B / 512;
    root.block[0] = first_block;
    root.atime = EPOCH;
    root.ctime = EPOCH;
    root.mtime = EPOCH;
    root
}

/// Build the default single-group image.
pub fn build_image() -> MemDevice {
    let dev = MemDevice::new((IMG_BLOCKS * B) as usize);

    let mut sb = Superblock::from_bytes(&[0u8; 1024]);
    sb.inodes_count = IMG_INODES;
    sb.blocks_count = IMG_BLOCKS;
    sb.free_blocks_count = IMG_FREE_BLOCKS as u32;
    sb.free_inodes_count = IMG_FREE_INODES as u32;
    sb.first_data_block = 1;
    sb.log_block_size = 0;
    sb.log_frag_size = 0;
    sb.blocks_per_group = 8192;
    sb.frags_per_group = 8192;
    sb.inodes_per_group = IMG_INODES;
    sb.magic = EXT2_SUPER_MAGIC;
    sb.rev_level = 1;
    sb.first_ino = FIRST_FREE_INO;
    sb.inode_size = 128;
    sb.volume_name[..4].copy_from_slice(b"test");
    put(&dev, 1, 0, &sb.to_bytes());

    let mut desc = GroupDescriptor::from_bytes(&[0u8; 32]);
    desc.block_bitmap = BLOCK_BITMAP;
    desc.inode_bitmap = INODE_BITMAP;
    desc.inode_table = INODE_TABLE;
    desc.free_blocks_count = IMG_FREE_BLOCKS;
    desc.free_inodes_count = IMG_FREE_INODES;
    desc.used_dirs_count = 1;
    put(&dev, 2, 0, &desc.to_bytes());

    // Block bitmap: blocks 1..=13 used, bits past the image marked used.
    let mut bbm = vec![0u8; B as usize];
    for bit in 0..13 {
        set_bit(&mut bbm, bit);
    }
    for bit in (IMG_BLOCKS - 1) as usize..(B as usize * 8) {
        set_bit(&mut bbm, bit);
    }
    put(&dev, BLOCK_BITMAP, 0, &bbm);

    // Inode bitmap: inodes 1..=10 reserved, bits past inodes_count used.
    let mut ibm = vec![0u8; B as usize];
    for bit in 0..10 {
        set_bit(&mut ibm, bit);
    }
    for bit in IMG_INODES as usize..(B as usize * 8) {
        set_bit(&mut ibm, bit);
    }
    put(&dev, INODE_BITMAP, 0, &ibm);

    // Root inode record (inode 2, table index 1).
    put(&dev, INODE_TABLE, 128, &root_inode(ROOT_BLOCK).to_bytes());

    put(&dev, ROOT_BLOCK, 0, &root_dir_block());

    dev
}

/// Mount the default single-group image.
pub fn mount_fresh() -> Ext2Fs {
    Ext2Fs::mount(Box::new(build_image())).expect("fresh image mounts")
}

// Two-group image geometry: 128 blocks and 32 inodes per group.
// Group 0: block bitmap 3, inode bitmap 4, inode table 5..=8, root dir 9.
// Group 1: block bitmap 129, inode bitmap 130, inode table 131..=134.
pub const TG_FREE_BLOCKS_G0: u16 = 119;
pub const TG_FREE_BLOCKS_G1: u16 = 121;
/// First free block in group 1.
pub const TG_G1_FIRST_FREE_BLOCK: u32 = 135;

/// Build a two-group image for allocator locality tests.
pub fn build_two_group_image() -> MemDevice {
    let dev = MemDevice::new((256 * B) as usize);

    let mut sb = Superblock::from_bytes(&[0u8; 1024]);
    sb.inodes_count = 64;
    sb.blocks_count = 256;
    sb.free_blocks_count = (TG_FREE_BLOCKS_G0 + TG_FREE_BLOCKS_G1) as u32;
    sb.free_inodes_count = 54;
    sb.first_data_block = 1;
    sb.log_block_size = 0;
    sb.blocks_per_group = 128;
    sb.frags_per_group = 128;
    sb.inodes_per_group = 32;
    sb.magic = EXT2_SUPER_MAGIC;
    sb.rev_level = 1;
    sb.first_ino = 11;
    sb.inode_size = 128;
    put(&dev, 1, 0, &sb.to_bytes());

    let mut desc0 = GroupDescriptor::from_bytes(&[0u8; 32]);
    desc0.block_bitmap = 3;
    desc0.inode_bitmap = 4;
    desc0.inode_table = 5;
    desc0.free_blocks_count = TG_FREE_BLOCKS_G0;
    desc0.free_inodes_count = 22;
    desc0.used_dirs_count = 1;
    put(&dev, 2, 0, &desc0.to_bytes());

    let mut desc1 = GroupDescriptor::from_bytes(&[0u8; 32]);
    desc1.block_bitmap = 129;
    desc1.inode_bitmap = 130;
    desc1.inode_table = 131;
    desc1.free_blocks_count = TG_FREE_BLOCKS_G1;
    desc1.free_inodes_count = 32;
    put(&dev, 2, 32, &desc1.to_bytes());

    // Group 0 block bitmap: blocks 1..=9 used (bits 0..=8).
    let mut bbm0 = vec![0u8; B as usize];
    for bit in 0..9 {
        set_bit(&mut bbm0, bit);
    }
    for bit in 128..(B as usize * 8) {
        set_bit(&mut bbm0, bit);
    }
    put(&dev, 3, 0, &bbm0);

    // Group 1 block bitmap: blocks 129..=134 used (bits 0..=5); the group
    // only covers 127 real blocks, so bit 127 on are marked used.
    let mut bbm1 = vec![0u8; B as usize];
    for bit in 0..6 {
        set_bit(&mut bbm1, bit);
    }
    for bit in 127..(B as usize * 8) {
        set_bit(&mut bbm1, bit);
    }
    put(&dev, 129, 0, &bbm1);

    // Inode bitmaps: group 0 reserves inodes 1..=10.
    let mut ibm0 = vec![0u8; B as usize];
    for bit in 0..10 {
        set_bit(&mut ibm0, bit);
    }
    for bit in 32..(B as usize * 8) {
        set_bit(&mut ibm0, bit);
    }
    put(&dev, 4, 0, &ibm0);

    let mut ibm1 = vec![0u8; B as usize];
    for bit in 32..(B as usize * 8) {
        set_bit(&mut ibm1, bit);
    }
    put(&dev, 130, 0, &ibm1);

    put(&dev, 5, 128, &root_inode(9).to_bytes());
    put(&dev, 9, 0, &root_dir_block());

    dev
}

/// Inode used for the synthetic regular file in [`build_image_with_big_file`].
pub const BIG_FILE_INO: u32 = 11;
/// Single-indirect pointer block of the synthetic file.
pub const BIG_FILE_L1_BLOCK: u32 = 26;

/// Extend the fresh single-group image with a regular file `big` whose
/// content spills past the 12 direct pointers into a single-indirect
/// chain. Content byte `i` is `i % 251`.
pub fn build_image_with_big_file(len: usize) -> MemDevice {
    let dev = build_image();
    let n_data = len.div_ceil(B as usize);
    assert!(
        n_data > 12 && n_data <= 12 + (B as usize / 4),
        "length must spill into the single-indirect range"
    );
    let total_blocks = n_data + 1; // data plus the L1 pointer block

    // Mark the file's blocks used: data 14..=25 and 27.., pointer block 26.
    let mut bbm = dev.snapshot((BLOCK_BITMAP * B) as usize, B as usize);
    for bit in 13..13 + total_blocks {
        set_bit(&mut bbm, bit);
    }
    put(&dev, BLOCK_BITMAP, 0, &bbm);

    // Inode 11 becomes the file.
    let mut ibm = dev.snapshot((INODE_BITMAP * B) as usize, B as usize);
    set_bit(&mut ibm, (BIG_FILE_INO - 1) as usize);
    put(&dev, INODE_BITMAP, 0, &ibm);

    // Adjust the free counters in the superblock and the descriptor.
    let sb_raw: [u8; 1024] = dev.snapshot(1024, 1024).try_into().unwrap();
    let mut sb = Superblock::from_bytes(&sb_raw);
    sb.free_blocks_count -= total_blocks as u32;
    sb.free_inodes_count -= 1;
    put(&dev, 1, 0, &sb.to_bytes());

    let gd_raw: [u8; 32] = dev.snapshot(2048, 32).try_into().unwrap();
    let mut desc = GroupDescriptor::from_bytes(&gd_raw);
    desc.free_blocks_count -= total_blocks as u16;
    desc.free_inodes_count -= 1;
    put(&dev, 2, 0, &desc.to_bytes());

    // The inode record: 12 direct pointers, then the L1 chain.
    let mut node = Inode::zeroed();
    node.mode = S_IFREG | 0o644;
    node.set_size(len as u64);
    node.links_count = 1;
    node.blocks = (total_blocks as u32) * (B / 512);
    node.atime = EPOCH;
    node.ctime = EPOCH;
    node.mtime = EPOCH;
    for i in 0..12 {
        node.block[i] = 14 + i as u32;
    }
    node.block[12] = BIG_FILE_L1_BLOCK;
    put(
        &dev,
        INODE_TABLE,
        (BIG_FILE_INO as usize - 1) * 128,
        &node.to_bytes(),
    );

    // Pointer block: data blocks 27.. for logical blocks 12..
    let mut l1 = vec![0u8; B as usize];
    for slot in 0..(n_data - 12) {
        let data_block = 27 + slot as u32;
        l1[slot * 4..slot * 4 + 4].copy_from_slice(&data_block.to_le_bytes());
    }
    put(&dev, BIG_FILE_L1_BLOCK, 0, &l1);

    // Content.
    for logical in 0..n_data {
        let block = if logical < 12 {
            14 + logical as u32
        } else {
            27 + (logical - 12) as u32
        };
        let mut data = vec![0u8; B as usize];
        for k in 0..B as usize {
            let idx = logical * B as usize + k;
            if idx >= len {
                break;
            }
            data[k] = (idx % 251) as u8;
        }
        put(&dev, block, 0, &data);
    }

    // Root gains the "big" entry, split out of "..".
    let mut root_blk = dev.snapshot((ROOT_BLOCK * B) as usize, B as usize);
    root_blk[16..18].copy_from_slice(&12u16.to_le_bytes());
    raw_dir_entry(&mut root_blk, 24, BIG_FILE_INO, (B - 24) as u16, b"big", 1);
    put(&dev, ROOT_BLOCK, 0, &root_blk);

    dev
}

/// Read one raw block out of a mounted filesystem.
pub fn read_block_raw(fs: &Ext2Fs, block: u32) -> Vec<u8> {
    let mut buf = vec![0u8; fs.block_size() as usize];
    fs.read_block(block, &mut buf).expect("block read");
    buf
}

/// Walk a directory block and return `(inode, rec_len, name)` per record.
pub fn parse_dir_block(buf: &[u8]) -> Vec<(u32, u16, Vec<u8>)> {
    let mut entries = Vec::new();
    let mut pos = 0usize;
    while pos + 8 <= buf.len() {
        let inode = u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
        let rec_len = u16::from_le_bytes([buf[pos + 4], buf[pos + 5]]);
        let name_len = buf[pos + 6] as usize;
        if rec_len < 8 || pos + rec_len as usize > buf.len() {
            break;
        }
        entries.push((
            inode,
            rec_len,
            buf[pos + 8..pos + 8 + name_len.min(rec_len as usize - 8)].to_vec(),
        ));
        pos += rec_len as usize;
    }
    entries
}

/// Sum of `rec_len` across one directory block.
pub fn rec_len_sum(buf: &[u8]) -> usize {
    parse_dir_block(buf).iter().map(|(_, rec, _)| *rec as usize).sum()
}

fn bits_in_group(total: u32, first: u32, per_group: u32, group: usize) -> u32 {
    ((total - first) - group as u32 * per_group).min(per_group)
}

/// Assert the bitmap/counter invariant: for every group, the free count in
/// the descriptor equals the clear bits of its bitmap, and the per-group
/// counts sum to the superblock counters.
pub fn assert_counters_consistent(fs: &Ext2Fs) {
    let sb = fs.superblock();
    let mut free_blocks = 0u32;
    let mut free_inodes = 0u32;

    for (group, desc) in fs.groups().iter().enumerate() {
        let bbm = read_block_raw(fs, desc.block_bitmap);
        let block_bits = bits_in_group(sb.blocks_count, sb.first_data_block, sb.blocks_per_group, group);
        let clear = (0..block_bits as usize).filter(|&k| !test_bit(&bbm, k)).count() as u32;
        assert_eq!(
            clear, desc.free_blocks_count as u32,
            "group {group} block bitmap disagrees with its descriptor"
        );
        free_blocks += clear;

        let ibm = read_block_raw(fs, desc.inode_bitmap);
        let inode_bits = bits_in_group(sb.inodes_count, 0, sb.inodes_per_group, group);
        let clear = (0..inode_bits as usize).filter(|&k| !test_bit(&ibm, k)).count() as u32;
        assert_eq!(
            clear, desc.free_inodes_count as u32,
            "group {group} inode bitmap disagrees with its descriptor"
        );
        free_inodes += clear;
    }

    assert_eq!(free_blocks, sb.free_blocks_count, "superblock free block count");
    assert_eq!(free_inodes, sb.free_inodes_count, "superblock free inode count");
}

/// Assert that every directory block of `dir` sums its record lengths to
/// exactly one block.
pub fn assert_dir_blocks_fill(fs: &Ext2Fs, dir: &Inode) {
    fs.for_each_data_block(dir, |block| {
        let buf = read_block_raw(fs, block);
        assert_eq!(rec_len_sum(&buf), fs.block_size() as usize, "block {block}");
        Ok(true)
    })
    .expect("directory walk");
}

/// Names of all live entries of `dir`, in traversal order.
pub fn entry_names(fs: &Ext2Fs, dir: &Inode) -> Vec<String> {
    fs.list_dir(dir)
        .expect("list_dir")
        .into_iter()
        .map(|e| e.name)
        .collect()
}
