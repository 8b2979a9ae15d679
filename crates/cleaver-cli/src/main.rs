//! cleaver - split files into content-defined chunks and put them back
//! together
//!
//! Subcommands:
//! - `cleaver split --file <path> --chunk-dir <dir>` - chunk a file and
//!   write a manifest named after the file's digest
//! - `cleaver assemble --manifest <path> --output <path>` - rebuild the
//!   original file from a manifest and its chunk directory

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use cleaver::{Hasher, Splitter};

#[derive(Parser)]
#[command(name = "cleaver")]
#[command(about = "Content-defined chunking with a deduplicating chunk store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a file into chunks and write a manifest
    Split {
        /// File to split
        #[arg(short, long)]
        file: PathBuf,

        /// Directory to write chunks and the manifest into
        #[arg(short, long)]
        chunk_dir: PathBuf,

        /// Create the chunk directory if it does not exist
        #[arg(long)]
        create_chunk_dir: bool,

        /// Hash and write chunks on a worker pool
        #[arg(short, long)]
        parallel: bool,

        /// Hash algorithm for chunk addresses (blake3 or sha256)
        #[arg(long, default_value = "blake3")]
        hasher: String,

        /// Suppress the progress bar and status output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Reassemble a file from a manifest
    Assemble {
        /// Manifest to assemble from
        #[arg(short, long)]
        manifest: PathBuf,

        /// Where to write the reassembled file
        #[arg(short, long)]
        output: PathBuf,

        /// Suppress the progress bar and status output
        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Split {
            file,
            chunk_dir,
            create_chunk_dir,
            parallel,
            hasher,
            quiet,
        } => split(file, chunk_dir, create_chunk_dir, parallel, &hasher, quiet),
        Commands::Assemble {
            manifest,
            output,
            quiet,
        } => assemble(manifest, output, quiet),
    }
}

fn split(
    file: PathBuf,
    chunk_dir: PathBuf,
    create_chunk_dir: bool,
    parallel: bool,
    hasher: &str,
    quiet: bool,
) -> Result<()> {
    let hasher: Hasher = hasher.parse()?;
    if create_chunk_dir {
        fs::create_dir_all(&chunk_dir)
            .with_context(|| format!("creating chunk directory {}", chunk_dir.display()))?;
    }

    let source = File::open(&file).with_context(|| format!("opening {}", file.display()))?;
    let len = source.metadata()?.len();

    let pb = byte_progress(len, quiet);
    let reader = pb.wrap_read(source);

    let splitter = Splitter::new().with_hasher(hasher);
    let manifest = if parallel {
        splitter.split_parallel(reader, &chunk_dir)
    } else {
        splitter.split(reader, &chunk_dir)
    }
    .with_context(|| format!("splitting {}", file.display()))?;
    pb.finish_and_clear();

    if !quiet {
        println!(
            "{} chunks, {} bytes, polynomial {}",
            manifest.chunks.len(),
            manifest.total_size,
            manifest.polynomial
        );
        println!("{}", manifest.path.display());
    }
    Ok(())
}

fn assemble(manifest: PathBuf, output: PathBuf, quiet: bool) -> Result<()> {
    let manifest = Splitter::read_manifest(&manifest)
        .with_context(|| format!("reading manifest {}", manifest.display()))?;

    let dst = File::create(&output).with_context(|| format!("creating {}", output.display()))?;
    let pb = byte_progress(manifest.total_size, quiet);
    let writer = pb.wrap_write(BufWriter::new(dst));

    Splitter::new()
        .assemble(&manifest, writer)
        .with_context(|| format!("assembling {}", output.display()))?;
    pb.finish_and_clear();

    if !quiet {
        println!("{} bytes -> {}", manifest.total_size, output.display());
    }
    Ok(())
}

fn byte_progress(len: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.green/dim}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .unwrap()
            .progress_chars("█▓▒░ "),
    );
    pb
}
