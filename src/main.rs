#[macro_use]
extern crate log;

use anyhow::{Context, Result};
use clap::Parser;

use cache_sim::cache::{Cache, CacheKind, L1DKind, L1IKind, L2Kind};
use cache_sim::cli::Args;
use cache_sim::loader::load_memory;
use cache_sim::tlb::{DirectMappedTlb, TlbKind};
use cache_sim::trace::Program;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (_mem, mut sim) = load_memory(&args.memory_description).with_context(|| {
        format!(
            "loading memory description {}",
            args.memory_description.display()
        )
    })?;

    if args.flush_caches {
        sim.flush_caches();
        sim.flush_tlbs();
    }

    let program = Program::read(&args.trace)
        .with_context(|| format!("reading trace {}", args.trace.display()))?;
    info!(
        "loaded {} commands from {}",
        program.commands.len(),
        args.trace.display()
    );

    let results = sim.execute(&program)?;
    for result in &results {
        let tlb_status = if result.tlb_hit { "HIT" } else { "MISS" };
        let cache_status = if result.cache_hit { "HIT" } else { "MISS" };
        match result.value {
            Some(value) => println!(
                "{} tlb={tlb_status} cache={cache_status} -> 0x{value:08x}",
                result.command
            ),
            None => println!("{} tlb={tlb_status} cache={cache_status}", result.command),
        }
    }

    if args.dump_state {
        dump_cache::<L1IKind>("L1-I", sim.l1i());
        dump_cache::<L1DKind>("L1-D", sim.l1d());
        dump_cache::<L2Kind>("L2", sim.l2());
        dump_tlb("L1-ITLB", &sim.tlbs().l1i);
        dump_tlb("L1-DTLB", &sim.tlbs().l1d);
        dump_tlb("L2-TLB", &sim.tlbs().l2);
    }

    Ok(())
}

fn dump_cache<K: CacheKind>(name: &str, cache: &Cache<K>) {
    println!("-- {name} cache --");
    for index in 0..K::LINES {
        for way in 0..K::WAYS {
            let e = cache.entry(index, way);
            if e.valid {
                println!(
                    "  set={index} way={way} age={} tag=0x{:x} line={:08x?}",
                    e.age, e.tag, e.line
                );
            }
        }
    }
}

fn dump_tlb<K: TlbKind>(name: &str, tlb: &DirectMappedTlb<K>) {
    println!("-- {name} --");
    for index in 0..K::LINES {
        let e = tlb.entry(index);
        if e.valid {
            println!("  index={index} tag=0x{:x} ppn=0x{:x}", e.tag, e.phy_page_num);
        }
    }
}
