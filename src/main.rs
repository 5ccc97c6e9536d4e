//! eagledb - page file maintenance tool

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use eagledb::storage::page::FreePageStack;
use eagledb::storage::{PageBuf, PageFile, PageId, PAGE_SIZE};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// eagledb - format and inspect slotted page files
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create (or overwrite) a page file with empty pages
    Format {
        /// Page file path
        file: PathBuf,

        /// Total number of pages, including the four reserved ones
        #[arg(short, long, default_value = "64")]
        pages: u16,
    },
    /// Print every page and its records
    Dump {
        /// Page file path
        file: PathBuf,
    },
    /// Print page count and free page count
    Stat {
        /// Page file path
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Format { file, pages } => {
            PageFile::format(&file, pages)
                .with_context(|| format!("Failed to format {}", file.display()))?;
            println!("Formatted {} with {} pages", file.display(), pages);
        }
        Command::Dump { file } => {
            let mut page_file = open(&file)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            page_file.dump(&mut out).context("Failed to dump page file")?;
            out.flush()?;
        }
        Command::Stat { file } => {
            let mut page_file = open(&file)?;
            let mut buf: Box<PageBuf> = Box::new([0u8; PAGE_SIZE]);
            page_file
                .read_page(PageId::FREE_LIST, &mut buf)
                .context("Failed to read free-page stack")?;
            let free_pages = FreePageStack::from_data(&mut buf).len();

            println!("File:       {}", file.display());
            println!("Page size:  {}", PAGE_SIZE);
            println!("Pages:      {}", page_file.page_count());
            println!("Free pages: {}", free_pages);
        }
    }

    Ok(())
}

fn open(file: &Path) -> Result<PageFile> {
    PageFile::open(file).with_context(|| format!("Failed to open {}", file.display()))
}
