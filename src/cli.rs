//! Command-line surface for the `cache-sim` binary.

use std::path::PathBuf;

use clap::Parser;

/// Runs a command trace against a memory image through the cache/TLB
/// hierarchy simulator.
#[derive(Debug, Parser)]
#[command(name = "cache-sim", about = "Memory hierarchy simulator", version)]
pub struct Args {
    /// Path to the memory-description file (capacity, page tables, pages).
    pub memory_description: PathBuf,

    /// Path to the command trace file (`R/W D/I W/B 0x… @0x…`).
    pub trace: PathBuf,

    /// Flush every cache and TLB before running the trace.
    #[arg(long)]
    pub flush_caches: bool,

    /// Print cache/TLB content after the trace finishes.
    #[arg(long)]
    pub dump_state: bool,
}
