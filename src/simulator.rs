//! The simulator facade: owns the memory image, the cache hierarchy, and the
//! TLB hierarchy, and exposes the read/write/translate operations a trace
//! driver needs.

use crate::addr::{PhyAddr, VirtAddr};
use crate::cache::{Cache, CacheKind, CacheLookup, L1DKind, L1IKind, L2Kind, LINE_BYTES, WORDS_PER_LINE};
use crate::error::{Result, SimError};
use crate::memory::Memory;
use crate::tlb::lru::LruTlb;
use crate::tlb::TlbHierarchy;
use crate::trace::{AccessKind, Command, DataSize, Order, Program};

/// Capacity of the standalone fully-associative LRU TLB that `Simulator`
/// keeps alongside the direct-mapped hierarchy, exercised independently
/// (see [`Simulator::lru_translate`]) rather than on the default read/write
/// path.
pub const LRU_TLB_CAPACITY: usize = 64;

/// Reads the line containing `paddr` out of `l1`, falling through to `l2`
/// and then to memory, applying the promotion/eviction protocol described
/// for the cache hierarchy. `K` is the L1 geometry (I or D); `l2` is always
/// the shared, unified L2.
fn read_line_word<K: CacheKind>(
    l1: &mut Cache<K>,
    l2: &mut Cache<L2Kind>,
    mem: &Memory,
    paddr: u32,
) -> Result<(u32, bool)> {
    let word_index = ((paddr >> 2) as usize) % WORDS_PER_LINE;
    match l1.probe(paddr) {
        CacheLookup::Hit { index, way } => {
            let entry = l1.entry(index, way);
            Ok((entry.line[word_index], true))
        }
        CacheLookup::Miss => match l2.probe(paddr) {
            CacheLookup::Hit { index, way } => {
                let entry = l2.entry(index, way);
                l2.invalidate(index, way);
                if let Some(evicted) = l1.insert_line(paddr, entry.line) {
                    l2.insert_line(evicted.paddr, evicted.line);
                }
                Ok((entry.line[word_index], true))
            }
            CacheLookup::Miss => {
                let line_base = paddr & !(LINE_BYTES as u32 - 1);
                let line = mem.read_line(line_base as usize)?;
                if let Some(evicted) = l1.insert_line(paddr, line) {
                    l2.insert_line(evicted.paddr, evicted.line);
                }
                Ok((line[word_index], false))
            }
        },
    }
}

/// Writes `word` into the line containing `paddr`, mirroring it to `mem` and
/// maintaining exclusivity between `l1` and `l2` exactly as [`read_line_word`]
/// does for reads: an L2 hit is invalidated and promoted into `l1`, never
/// left updated in place.
fn write_line_word<K: CacheKind>(
    l1: &mut Cache<K>,
    l2: &mut Cache<L2Kind>,
    mem: &mut Memory,
    paddr: u32,
    word: u32,
) -> Result<bool> {
    let word_index = ((paddr >> 2) as usize) % WORDS_PER_LINE;
    match l1.probe(paddr) {
        CacheLookup::Hit { index, way } => {
            let mut entry = l1.entry(index, way);
            entry.line[word_index] = word;
            l1.insert(index, way, entry)?;
            mem.write_u32(paddr as usize, word)?;
            Ok(true)
        }
        CacheLookup::Miss => match l2.probe(paddr) {
            CacheLookup::Hit { index, way } => {
                let mut entry = l2.entry(index, way);
                entry.line[word_index] = word;
                mem.write_u32(paddr as usize, word)?;
                l2.invalidate(index, way);
                if let Some(evicted) = l1.insert_line(paddr, entry.line) {
                    l2.insert_line(evicted.paddr, evicted.line);
                }
                Ok(true)
            }
            CacheLookup::Miss => {
                let line_base = paddr & !(LINE_BYTES as u32 - 1);
                let mut line = mem.read_line(line_base as usize)?;
                line[word_index] = word;
                mem.write_line(line_base as usize, &line)?;
                if let Some(evicted) = l1.insert_line(paddr, line) {
                    l2.insert_line(evicted.paddr, evicted.line);
                }
                Ok(false)
            }
        },
    }
}

fn align_down_to_word(vaddr: &VirtAddr) -> Result<VirtAddr> {
    let aligned = vaddr.page_offset() & !0b11;
    VirtAddr::new(vaddr.pgd(), vaddr.pud(), vaddr.pmd(), vaddr.pte(), aligned)
}

/// Owns the memory image, the three set-associative caches, the two-level
/// TLB hierarchy, and a standalone fully-associative LRU TLB kept for
/// demonstration rather than wired into the default translation path.
pub struct Simulator {
    mem: Memory,
    l1i: Cache<L1IKind>,
    l1d: Cache<L1DKind>,
    l2: Cache<L2Kind>,
    tlbs: TlbHierarchy,
    lru_tlb: LruTlb,
}

/// One command's outcome against the simulator: the TLB/cache hit
/// classification the CLI reports, and the value read, if any.
#[derive(Clone, Copy, Debug)]
pub struct ExecResult {
    pub command: Command,
    pub tlb_hit: bool,
    pub cache_hit: bool,
    pub value: Option<u32>,
}

impl Simulator {
    pub fn new(mem: Memory) -> Self {
        Simulator {
            mem,
            l1i: Cache::new(),
            l1d: Cache::new(),
            l2: Cache::new(),
            tlbs: TlbHierarchy::new(),
            lru_tlb: LruTlb::new(LRU_TLB_CAPACITY),
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    fn translate_with_hit(&mut self, vaddr: &VirtAddr, access: AccessKind) -> Result<(PhyAddr, bool)> {
        let (paddr, hit) = self.tlbs.search(&self.mem, vaddr, access)?;
        trace!(
            "translate {access:?} vpn=0x{:x} tlb={} -> {paddr}",
            vaddr.vpn(),
            if hit { "hit" } else { "miss" }
        );
        Ok((paddr, hit))
    }

    /// Resolves `vaddr` to a physical address via the two-level TLB
    /// hierarchy, falling back to a page walk on a full miss.
    pub fn translate(&mut self, vaddr: &VirtAddr, access: AccessKind) -> Result<PhyAddr> {
        Ok(self.translate_with_hit(vaddr, access)?.0)
    }

    /// Exercises the standalone fully-associative LRU TLB directly, bypassing
    /// the default direct-mapped hierarchy entirely.
    pub fn lru_translate(&mut self, vaddr: &VirtAddr) -> Result<(PhyAddr, bool)> {
        self.lru_tlb.search(&self.mem, vaddr)
    }

    fn read_word_detailed(&mut self, vaddr: &VirtAddr, access: AccessKind) -> Result<(u32, bool, bool)> {
        if vaddr.page_offset() % 4 != 0 {
            return Err(SimError::bad_parameter("word access must be 4-byte aligned"));
        }
        let (paddr, tlb_hit) = self.translate_with_hit(vaddr, access)?;
        let (word, cache_hit) = match access {
            AccessKind::Instruction => read_line_word(&mut self.l1i, &mut self.l2, &self.mem, paddr.to_u32())?,
            AccessKind::Data => read_line_word(&mut self.l1d, &mut self.l2, &self.mem, paddr.to_u32())?,
        };
        trace!(
            "read {access:?} {paddr} cache={} -> 0x{word:08x}",
            if cache_hit { "hit" } else { "miss" }
        );
        Ok((word, tlb_hit, cache_hit))
    }

    /// Reads the 32-bit word at `vaddr`, classified by `access` (instruction
    /// fetches and data reads go through distinct L1 caches and TLBs).
    pub fn read_word(&mut self, vaddr: &VirtAddr, access: AccessKind) -> Result<u32> {
        Ok(self.read_word_detailed(vaddr, access)?.0)
    }

    fn write_word_detailed(&mut self, vaddr: &VirtAddr, word: u32) -> Result<(bool, bool)> {
        if vaddr.page_offset() % 4 != 0 {
            return Err(SimError::bad_parameter("word access must be 4-byte aligned"));
        }
        let (paddr, tlb_hit) = self.translate_with_hit(vaddr, AccessKind::Data)?;
        let cache_hit = write_line_word(&mut self.l1d, &mut self.l2, &mut self.mem, paddr.to_u32(), word)?;
        trace!(
            "write {paddr} cache={} <- 0x{word:08x}",
            if cache_hit { "hit" } else { "miss" }
        );
        Ok((tlb_hit, cache_hit))
    }

    /// Writes a 32-bit data word at `vaddr`. A hit in L1-D updates in place;
    /// a hit in L2 is invalidated and the written line promoted into L1-D;
    /// a full miss reads the line from memory, merges, and writes it back.
    pub fn write_word(&mut self, vaddr: &VirtAddr, word: u32) -> Result<()> {
        self.write_word_detailed(vaddr, word)?;
        Ok(())
    }

    fn read_byte_detailed(&mut self, vaddr: &VirtAddr, access: AccessKind) -> Result<(u8, bool, bool)> {
        let word_vaddr = align_down_to_word(vaddr)?;
        let (word, tlb_hit, cache_hit) = self.read_word_detailed(&word_vaddr, access)?;
        let shift = (vaddr.page_offset() % 4) * 8;
        let byte = ((word >> shift) & 0xFF) as u8;
        Ok((byte, tlb_hit, cache_hit))
    }

    pub fn read_byte(&mut self, vaddr: &VirtAddr, access: AccessKind) -> Result<u8> {
        Ok(self.read_byte_detailed(vaddr, access)?.0)
    }

    fn write_byte_detailed(&mut self, vaddr: &VirtAddr, value: u8) -> Result<(bool, bool)> {
        let word_vaddr = align_down_to_word(vaddr)?;
        let (old_word, tlb_hit, _cache_hit) = self.read_word_detailed(&word_vaddr, AccessKind::Data)?;
        let shift = (vaddr.page_offset() % 4) * 8;
        let mask = !(0xFFu32 << shift);
        let new_word = (old_word & mask) | ((value as u32) << shift);
        let (_tlb_hit2, cache_hit) = self.write_word_detailed(&word_vaddr, new_word)?;
        Ok((tlb_hit, cache_hit))
    }

    /// Writes a single byte at `vaddr`: aligns down to the containing word,
    /// reads it through the cache, merges in the new byte (little-endian),
    /// then writes the whole word back through [`Simulator::write_word`].
    pub fn write_byte(&mut self, vaddr: &VirtAddr, value: u8) -> Result<()> {
        self.write_byte_detailed(vaddr, value)?;
        Ok(())
    }

    pub fn flush_caches(&mut self) {
        debug!("flushing L1-I, L1-D, and L2 caches");
        self.l1i.flush();
        self.l1d.flush();
        self.l2.flush();
    }

    pub fn flush_tlbs(&mut self) {
        debug!("flushing L1-I, L1-D, and L2 TLBs");
        self.tlbs.flush_all();
    }

    pub fn l1i(&self) -> &Cache<L1IKind> {
        &self.l1i
    }

    pub fn l1d(&self) -> &Cache<L1DKind> {
        &self.l1d
    }

    pub fn l2(&self) -> &Cache<L2Kind> {
        &self.l2
    }

    pub fn tlbs(&self) -> &TlbHierarchy {
        &self.tlbs
    }

    /// Runs every command in `program` in order, returning one [`ExecResult`]
    /// per command for the CLI to report.
    pub fn execute(&mut self, program: &Program) -> Result<Vec<ExecResult>> {
        let mut results = Vec::with_capacity(program.commands.len());
        for &command in &program.commands {
            let result = match (command.order, command.kind, command.size) {
                (Order::Read, AccessKind::Instruction, _) => {
                    let (word, tlb_hit, cache_hit) =
                        self.read_word_detailed(&command.vaddr, AccessKind::Instruction)?;
                    ExecResult { command, tlb_hit, cache_hit, value: Some(word) }
                }
                (Order::Read, AccessKind::Data, DataSize::Word) => {
                    let (word, tlb_hit, cache_hit) =
                        self.read_word_detailed(&command.vaddr, AccessKind::Data)?;
                    ExecResult { command, tlb_hit, cache_hit, value: Some(word) }
                }
                (Order::Read, AccessKind::Data, DataSize::Byte) => {
                    let (byte, tlb_hit, cache_hit) =
                        self.read_byte_detailed(&command.vaddr, AccessKind::Data)?;
                    ExecResult { command, tlb_hit, cache_hit, value: Some(byte as u32) }
                }
                (Order::Write, _, DataSize::Word) => {
                    let (tlb_hit, cache_hit) =
                        self.write_word_detailed(&command.vaddr, command.write_data)?;
                    ExecResult { command, tlb_hit, cache_hit, value: None }
                }
                (Order::Write, _, DataSize::Byte) => {
                    let (tlb_hit, cache_hit) =
                        self.write_byte_detailed(&command.vaddr, command.write_data as u8)?;
                    ExecResult { command, tlb_hit, cache_hit, value: None }
                }
            };
            results.push(result);
        }
        Ok(results)
    }
}
