//! tuplestore CLI
//!
//! Bulk-load, dump and verify storage files from the command line.

use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use tuplestore::storage::inspect;
use tuplestore::{Engine, StoreConfig};

/// tuplestore CLI
#[derive(Parser, Debug)]
#[command(name = "tuplestore")]
#[command(about = "Append-only compressed record store")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append one record per line read from stdin
    Insert {
        /// Storage file (created if missing)
        file: PathBuf,

        /// LZ4 acceleration, higher is faster with a worse ratio
        #[arg(short, long, default_value = "1")]
        acceleration: i32,
    },

    /// Print every record, one per line
    Scan {
        /// Storage file
        file: PathBuf,

        /// Read through a memory mapping
        #[arg(long)]
        mmap: bool,

        /// Print records as hex instead of lossy UTF-8
        #[arg(long)]
        hex: bool,
    },

    /// Check every block's checksum and print a per-block report
    Verify {
        /// Storage file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    // Logs go to stderr so scan output stays clean
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tuplestore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let outcome = match args.command {
        Commands::Insert { file, acceleration } => insert(file, acceleration),
        Commands::Scan { file, mmap, hex } => scan(file, mmap, hex),
        Commands::Verify { file } => verify(file),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn insert(file: PathBuf, acceleration: i32) -> tuplestore::Result<()> {
    let config = StoreConfig::builder()
        .path(&file)
        .acceleration(acceleration)
        .build();
    let mut engine = Engine::open(config)?;

    let mut count = 0u64;
    let mut skipped = 0u64;
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.is_empty() {
            skipped += 1;
            continue;
        }
        engine.insert(line.as_bytes())?;
        count += 1;
    }
    engine.close()?;

    tracing::info!(count, skipped, "inserted records into {}", file.display());
    Ok(())
}

fn scan(file: PathBuf, mmap: bool, hex: bool) -> tuplestore::Result<()> {
    let mut engine = Engine::open_path(&file, true, mmap)?;
    let mut out = BufWriter::new(io::stdout().lock());

    let mut count = 0u64;
    while let Some(record) = engine.read_next()? {
        if hex {
            for byte in record.iter() {
                write!(out, "{:02x}", byte)?;
            }
            writeln!(out)?;
        } else {
            writeln!(out, "{}", String::from_utf8_lossy(&record))?;
        }
        count += 1;
    }
    out.flush()?;

    tracing::info!(count, "scanned {}", file.display());
    Ok(())
}

fn verify(file: PathBuf) -> tuplestore::Result<()> {
    let summary = inspect(&file)?;

    println!("file:        {}", file.display());
    println!("size:        {} bytes", summary.file_size);
    println!("tail block:  {}", summary.header.last_block_offset);
    println!("blocks:      {}", summary.blocks.len());
    println!("records:     {}", summary.record_count);
    println!();
    println!(
        "{:>12} {:>12} {:>10} {:>10} {:>10}",
        "offset", "compressed", "checksum", "records", "used"
    );
    for block in &summary.blocks {
        println!(
            "{:>12} {:>12} {:>#10x} {:>10} {:>10}",
            block.offset, block.compressed_size, block.checksum, block.record_count, block.used_bytes
        );
    }
    Ok(())
}
