//! Shell entry point: open the image, mount it, run the command loop.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use ext2_shell::ext2::{Ext2Fs, FileDevice};
use ext2_shell::shell::Shell;

/// Interactive shell over an ext2 disk image.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the ext2 image file
    image: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("opening disk image: {}", args.image.display());

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&args.image)
        .with_context(|| format!("cannot open image '{}'", args.image.display()))?;

    let fs = Ext2Fs::mount(Box::new(FileDevice::new(file)))
        .with_context(|| format!("'{}' is not a mountable ext2 image", args.image.display()))?;

    println!(
        "superblock validated: {} blocks, {} inodes, {} group(s)",
        fs.superblock().blocks_count,
        fs.superblock().inodes_count,
        fs.group_count()
    );

    let mut shell = Shell::new(fs);
    shell.run().context("shell terminated abnormally")?;

    Ok(())
}
