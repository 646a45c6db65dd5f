//! Command handlers.
//!
//! Each handler validates its arguments, calls into the engine and prints
//! the outcome. Engine errors never terminate the shell.

use std::io::Write;

use super::format::{fixed_str, format_time, human_size, permissions_string};
use super::Shell;
use crate::ext2::split_parent_leaf;

impl Shell {
    pub(super) fn cmd_ls(&mut self, args: &[&str]) {
        if args.len() > 1 {
            println!("ls: too many arguments");
            return;
        }

        let target = args.first().copied().unwrap_or(".");
        let (ino, inode) = match self.fs.stat_path(self.cwd_ino, target) {
            Ok(found) => found,
            Err(err) => {
                println!("ls: cannot access '{}': {}", target, err);
                return;
            }
        };

        if !inode.is_dir() {
            // A file lists as itself.
            println!("{}", target);
            return;
        }

        match self.fs.list_dir(&inode) {
            Ok(entries) => {
                for entry in entries {
                    println!("{}", entry.name);
                }
            }
            Err(err) => println!("ls: cannot read directory inode {}: {}", ino, err),
        }
    }

    pub(super) fn cmd_cd(&mut self, args: &[&str]) {
        let Some(&path) = args.first() else {
            // cd without arguments is a no-op; there is no home directory.
            return;
        };
        if args.len() > 1 {
            println!("cd: too many arguments");
            return;
        }

        let (ino, inode) = match self.fs.stat_path(self.cwd_ino, path) {
            Ok(found) => found,
            Err(err) => {
                println!("cd: {}: {}", path, err);
                return;
            }
        };
        if !inode.is_dir() {
            println!("cd: {}: not a directory", path);
            return;
        }

        self.cwd_ino = ino;
        self.update_cwd_path(path);
    }

    /// Keep the textual working directory in step with a `cd`.
    fn update_cwd_path(&mut self, path: &str) {
        if path == ".." {
            let current = self.cwd_path.clone();
            let (parent, _) = split_parent_leaf(&current);
            self.cwd_path = if parent.is_empty() { "/".into() } else { parent.into() };
        } else if path != "." {
            if path.starts_with('/') {
                self.cwd_path = path.to_string();
            } else {
                if self.cwd_path != "/" {
                    self.cwd_path.push('/');
                }
                self.cwd_path.push_str(path);
            }
        }

        while self.cwd_path.len() > 1 && self.cwd_path.ends_with('/') {
            self.cwd_path.pop();
        }
        if self.cwd_path.is_empty() {
            self.cwd_path = "/".into();
        }
    }

    pub(super) fn cmd_pwd(&mut self, args: &[&str]) {
        if !args.is_empty() {
            println!("pwd: takes no arguments");
            return;
        }
        println!("{}", self.cwd_path);
    }

    pub(super) fn cmd_cat(&mut self, args: &[&str]) {
        let Some(&path) = args.first() else {
            println!("usage: cat <file>");
            return;
        };
        if args.len() > 1 {
            println!("cat: too many arguments");
            return;
        }

        match self.fs.read_file_content(self.cwd_ino, path) {
            Ok(content) => {
                let mut stdout = std::io::stdout();
                let _ = stdout.write_all(&content);
                let _ = stdout.flush();
            }
            Err(err) => println!("cat: {}: {}", path, err),
        }
    }

    pub(super) fn cmd_attr(&mut self, args: &[&str]) {
        let Some(&path) = args.first() else {
            println!("usage: attr <file|directory>");
            return;
        };
        if args.len() > 1 {
            println!("attr: too many arguments");
            return;
        }

        match self.fs.stat_path(self.cwd_ino, path) {
            Ok((_, inode)) => {
                println!(
                    "{:<12} {:>5} {:>5} {:>12}  {}",
                    "permissions", "uid", "gid", "size", "modified on"
                );
                println!(
                    "{:<12} {:>5} {:>5} {:>12}  {}",
                    permissions_string(inode.mode),
                    inode.uid,
                    inode.gid,
                    human_size(inode.size()),
                    format_time(inode.mtime)
                );
            }
            Err(err) => println!("attr: {}: {}", path, err),
        }
    }

    pub(super) fn cmd_info(&mut self, args: &[&str]) {
        if !args.is_empty() {
            println!("info: takes no arguments");
            return;
        }

        let sb = self.fs.superblock();
        let block_size = self.fs.block_size() as u64;

        // Free counts summed from the group descriptors, not the
        // superblock, so drift between the two is visible here.
        let free_blocks: u64 = self
            .fs
            .groups()
            .iter()
            .map(|g| g.free_blocks_count as u64)
            .sum();
        let free_inodes: u64 = self
            .fs
            .groups()
            .iter()
            .map(|g| g.free_inodes_count as u64)
            .sum();

        println!("Volume name.....: {}", fixed_str(&sb.volume_name));
        println!(
            "Image size......: {}",
            human_size(sb.blocks_count as u64 * block_size)
        );
        println!("Free space......: {}", human_size(free_blocks * block_size));
        println!("Free inodes.....: {} / {}", free_inodes, sb.inodes_count);
        println!("Free blocks.....: {} / {}", free_blocks, sb.blocks_count);
        println!("Block size......: {} bytes", block_size);
        println!("Inode size......: {} bytes", self.fs.inode_size());
        println!("Groups count....: {}", self.fs.group_count());
        println!("Groups size.....: {} blocks", sb.blocks_per_group);
        println!("Groups inodes...: {} inodes", sb.inodes_per_group);
    }

    pub(super) fn cmd_touch(&mut self, args: &[&str]) {
        let Some(&path) = args.first() else {
            println!("touch: missing file operand");
            return;
        };
        if args.len() > 1 {
            println!("touch: too many arguments");
            return;
        }

        match self.fs.touch(self.cwd_ino, path) {
            Ok(_) => {}
            Err(err) => println!("touch: {}: {}", path, err),
        }
    }

    pub(super) fn cmd_rm(&mut self, args: &[&str]) {
        let Some(&path) = args.first() else {
            println!("rm: missing operand");
            return;
        };
        if args.len() > 1 {
            println!("rm: too many arguments");
            return;
        }

        match self.fs.delete_file(self.cwd_ino, path) {
            Ok(()) => println!("removed '{}'", path),
            Err(err) => println!("rm: cannot remove '{}': {}", path, err),
        }
    }

    pub(super) fn cmd_mkdir(&mut self, args: &[&str]) {
        let Some(&path) = args.first() else {
            println!("mkdir: missing operand");
            return;
        };
        if args.len() > 1 {
            println!("mkdir: too many arguments");
            return;
        }

        match self.fs.make_directory(self.cwd_ino, path) {
            Ok(_) => {}
            Err(err) => println!("mkdir: cannot create directory '{}': {}", path, err),
        }
    }

    pub(super) fn cmd_rmdir(&mut self, args: &[&str]) {
        let Some(&path) = args.first() else {
            println!("rmdir: missing operand");
            return;
        };
        if args.len() > 1 {
            println!("rmdir: too many arguments");
            return;
        }

        match self.fs.remove_directory(self.cwd_ino, path) {
            Ok(()) => {}
            Err(err) => println!("rmdir: failed to remove '{}': {}", path, err),
        }
    }

    pub(super) fn cmd_rename(&mut self, args: &[&str]) {
        let &[old_name, new_name] = args else {
            // Old names with embedded spaces are not accepted; the line is
            // tokenised on whitespace.
            println!("usage: rename <old> <new>");
            return;
        };

        match self.fs.rename_in_cwd(self.cwd_ino, old_name, new_name) {
            Ok(()) => {}
            Err(err) => println!("rename: cannot rename '{}': {}", old_name, err),
        }
    }

    pub(super) fn cmd_cp(&mut self, args: &[&str]) {
        let &[src, dest] = args else {
            println!("usage: cp <source-in-image> <absolute-host-destination>");
            return;
        };

        if !dest.starts_with('/') {
            println!("cp: destination must be an absolute host path");
            return;
        }

        let content = match self.fs.read_file_content(self.cwd_ino, src) {
            Ok(content) => content,
            Err(err) => {
                println!("cp: {}: {}", src, err);
                return;
            }
        };

        match std::fs::write(dest, &content) {
            Ok(()) => println!("copied '{}' to '{}' ({} bytes)", src, dest, content.len()),
            Err(err) => println!("cp: cannot write '{}': {}", dest, err),
        }
    }

    pub(super) fn cmd_print(&mut self, args: &[&str]) {
        match args {
            ["superblock"] => self.print_superblock(),
            ["groups"] => self.print_groups(),
            ["inode", number] => match number.parse::<u32>() {
                Ok(ino) if ino > 0 => self.print_inode(ino),
                _ => println!("print: invalid inode number '{}'", number),
            },
            [] => println!("usage: print superblock | print inode <n> | print groups"),
            _ => println!("print: unknown arguments; try 'help'"),
        }
    }

    fn print_superblock(&self) {
        let sb = self.fs.superblock();

        println!("inodes count: {}", sb.inodes_count);
        println!("blocks count: {}", sb.blocks_count);
        println!("reserved blocks count: {}", sb.reserved_blocks_count);
        println!("free blocks count: {}", sb.free_blocks_count);
        println!("free inodes count: {}", sb.free_inodes_count);
        println!("first data block: {}", sb.first_data_block);
        println!("block size: {}", self.fs.block_size());
        println!("fragment size: {}", 1024u64 << sb.log_frag_size);
        println!("blocks per group: {}", sb.blocks_per_group);
        println!("fragments per group: {}", sb.frags_per_group);
        println!("inodes per group: {}", sb.inodes_per_group);
        println!("mount time: {}", sb.mtime);
        println!("write time: {}", sb.wtime);
        println!("mount count: {}", sb.mnt_count);
        println!("max mount count: {}", sb.max_mnt_count);
        println!("magic signature: {:#x}", sb.magic);
        println!("file system state: {}", sb.state);
        println!("errors: {}", sb.errors);
        println!("minor revision level: {}", sb.minor_rev_level);
        if sb.lastcheck > 0 {
            println!("time of last check: {}", format_time(sb.lastcheck));
        } else {
            println!("time of last check: 0");
        }
        println!("max check interval: {}", sb.checkinterval);
        println!("creator OS: {}", sb.creator_os);
        println!("revision level: {}", sb.rev_level);

        if sb.rev_level >= 1 {
            println!("first non-reserved inode: {}", sb.first_ino);
            println!("inode size: {}", sb.inode_size);
            println!("block group number: {}", sb.block_group_nr);
            println!("compatible feature set: {}", sb.feature_compat);
            println!("incompatible feature set: {}", sb.feature_incompat);
            println!("read only comp feature set: {}", sb.feature_ro_compat);

            print!("volume UUID: ");
            for byte in sb.uuid {
                print!("{:02x}", byte);
            }
            println!();

            println!("volume name: {}", fixed_str(&sb.volume_name));
            println!("volume last mounted: {}", fixed_str(&sb.last_mounted));
            println!("algorithm usage bitmap: {}", sb.algo_bitmap);
        }
    }

    fn print_inode(&self, ino: u32) {
        let inode = match self.fs.read_inode(ino) {
            Ok(inode) => inode,
            Err(err) => {
                println!("print: inode {}: {}", ino, err);
                return;
            }
        };

        println!("file format and access rights: {:#x}", inode.mode);
        println!("user id: {}", inode.uid);
        println!("lower 32-bit file size: {}", inode.size);
        println!("access time: {}", inode.atime);
        println!("creation time: {}", inode.ctime);
        println!("modification time: {}", inode.mtime);
        println!("deletion time: {}", inode.dtime);
        println!("group id: {}", inode.gid);
        println!("link count inode: {}", inode.links_count);
        println!("512-bytes blocks: {}", inode.blocks);
        println!("ext2 flags: {:#x}", inode.flags);
        println!("reserved (Linux): {}", inode.osd1);
        for (i, pointer) in inode.block.iter().enumerate() {
            println!("pointer[{}]: {}", i, pointer);
        }
        println!("file version (nfs): {}", inode.generation);
        println!("block number extended attributes: {}", inode.file_acl);
        // The field doubles as a directory's ACL block pointer; only label
        // it as a size when the combined 64-bit size actually needs it.
        if inode.size() > 0xFFFF_FFFF {
            println!("higher 32-bit file size: {}", inode.size_high);
        } else {
            println!("higher 32-bit file size: 0");
        }
        println!("location file fragment: {}", inode.faddr);
    }

    fn print_groups(&self) {
        let groups = self.fs.groups();
        for (i, desc) in groups.iter().enumerate() {
            println!("Block Group Descriptor {}:", i);
            println!("block bitmap: {}", desc.block_bitmap);
            println!("inode bitmap: {}", desc.inode_bitmap);
            println!("inode table: {}", desc.inode_table);
            println!("free blocks count: {}", desc.free_blocks_count);
            println!("free inodes count: {}", desc.free_inodes_count);
            println!("used dirs count: {}", desc.used_dirs_count);
            if i + 1 < groups.len() {
                println!("...");
            }
        }
    }
}
