//! Interactive driver around the ext2 engine.
//!
//! The shell owns the mounted filesystem, the current directory inode and
//! the textual working-directory path. Each input line is tokenised on
//! whitespace and dispatched to a command handler; engine errors are
//! printed and the loop keeps running.

mod commands;
mod format;

use std::io::{self, BufRead, Write};

use crate::ext2::{Ext2Fs, EXT2_ROOT_INO};

/// Interactive shell state.
pub struct Shell {
    fs: Ext2Fs,
    /// Inode of the current working directory.
    cwd_ino: u32,
    /// Textual path of the current working directory.
    cwd_path: String,
}

impl Shell {
    /// Create a shell positioned at the root directory.
    pub fn new(fs: Ext2Fs) -> Self {
        Self {
            fs,
            cwd_ino: EXT2_ROOT_INO,
            cwd_path: String::from("/"),
        }
    }

    /// Run the command loop until `exit`, `quit` or end of input.
    pub fn run(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut line = String::new();

        loop {
            print!("\n[{}]> ", self.cwd_path);
            io::stdout().flush()?;

            line.clear();
            if stdin.lock().read_line(&mut line)? == 0 {
                println!("\nexiting (end of input)");
                break;
            }

            let args: Vec<&str> = line.split_whitespace().collect();
            let Some((&command, args)) = args.split_first() else {
                continue;
            };

            match command {
                "ls" => self.cmd_ls(args),
                "cd" => self.cmd_cd(args),
                "pwd" => self.cmd_pwd(args),
                "cat" => self.cmd_cat(args),
                "attr" => self.cmd_attr(args),
                "info" => self.cmd_info(args),
                "touch" => self.cmd_touch(args),
                "rm" => self.cmd_rm(args),
                "mkdir" => self.cmd_mkdir(args),
                "rmdir" => self.cmd_rmdir(args),
                "rename" => self.cmd_rename(args),
                "cp" => self.cmd_cp(args),
                "print" => self.cmd_print(args),
                "help" => print_help(),
                "exit" | "quit" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command '{}'; type 'help' for the command list", other)
                }
            }
        }

        Ok(())
    }
}

fn print_help() {
    println!();
    println!("Available commands:");
    println!();
    println!("  Navigation and inspection");
    println!("    ls [path]                 list the current directory or [path]");
    println!("    cd <path>                 change the working directory");
    println!("    pwd                       show the working directory path");
    println!("    cat <file>                print the content of a file");
    println!("    attr <file|dir>           show formatted attributes");
    println!("    info                      show a filesystem summary");
    println!();
    println!("  Creation and modification");
    println!("    touch <file>              create a file or refresh its timestamps");
    println!("    mkdir <dir>               create a directory");
    println!("    rename <old> <new>        rename an entry of the working directory");
    println!("    cp <src> <host-dest>      copy a file out of the image to the host");
    println!();
    println!("  Removal");
    println!("    rm <file>                 remove a file");
    println!("    rmdir <dir>               remove an empty directory");
    println!();
    println!("  Debugging");
    println!("    print superblock          raw superblock dump");
    println!("    print inode <n>           raw dump of inode n");
    println!("    print groups              raw group descriptor dump");
    println!();
    println!("  Shell");
    println!("    help                      this message");
    println!("    exit | quit               leave the shell");
    println!();
}
