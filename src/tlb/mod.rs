//! Two-level, direct-mapped TLB hierarchy (L1-I, L1-D, L2) with
//! cross-invalidation, plus ([`lru`]) a fully-associative LRU-managed
//! alternative that demonstrates the translation core stays orthogonal to
//! replacement policy.

pub mod lru;

use crate::addr::{PhyAddr, VirtAddr};
use crate::error::{Result, SimError};
use crate::page_walk::page_walk;
use crate::trace::AccessKind;
use crate::Memory;

/// The compile-time geometry of one direct-mapped TLB level.
pub trait TlbKind {
    const LINES: usize;
    const NAME: &'static str;
}

#[derive(Clone, Copy)]
pub struct L1ITlbKind;
impl TlbKind for L1ITlbKind {
    const LINES: usize = 16;
    const NAME: &'static str = "L1-ITLB";
}

#[derive(Clone, Copy)]
pub struct L1DTlbKind;
impl TlbKind for L1DTlbKind {
    const LINES: usize = 16;
    const NAME: &'static str = "L1-DTLB";
}

#[derive(Clone, Copy)]
pub struct L2TlbKind;
impl TlbKind for L2TlbKind {
    const LINES: usize = 64;
    const NAME: &'static str = "L2-TLB";
}

/// `{ valid, tag, phy_page_num }`; the direct-mapped tag is the VPN with the
/// index bits shifted out (`VPN >> log2(LINES)`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TlbEntry {
    pub valid: bool,
    pub tag: u64,
    pub phy_page_num: u32,
}

impl TlbEntry {
    pub const INVALID: TlbEntry = TlbEntry {
        valid: false,
        tag: 0,
        phy_page_num: 0,
    };

    pub fn new<K: TlbKind>(vaddr: &VirtAddr, paddr: &PhyAddr) -> Self {
        TlbEntry {
            valid: true,
            tag: vaddr.vpn() >> K::LINES.trailing_zeros(),
            phy_page_num: paddr.phy_page_num(),
        }
    }
}

#[derive(Clone)]
pub struct DirectMappedTlb<K: TlbKind> {
    entries: Vec<TlbEntry>,
    _kind: std::marker::PhantomData<K>,
}

impl<K: TlbKind> DirectMappedTlb<K> {
    pub fn new() -> Self {
        DirectMappedTlb {
            entries: vec![TlbEntry::INVALID; K::LINES],
            _kind: std::marker::PhantomData,
        }
    }

    pub fn flush(&mut self) {
        self.entries.fill(TlbEntry::INVALID);
    }

    pub fn index_of(vpn: u64) -> usize {
        (vpn as usize) % K::LINES
    }

    pub fn entry(&self, index: usize) -> TlbEntry {
        self.entries[index]
    }

    pub fn insert(&mut self, index: usize, entry: TlbEntry) -> Result<()> {
        if index >= K::LINES {
            return Err(SimError::bad_parameter(format!(
                "{} insert index {index} out of range",
                K::NAME
            )));
        }
        self.entries[index] = entry;
        Ok(())
    }

    pub fn invalidate(&mut self, index: usize) {
        self.entries[index] = TlbEntry::INVALID;
    }

    /// `Some(paddr)` iff `tlb[VPN mod LINES]` is valid and its tag matches
    /// `VPN >> log2(LINES)`.
    pub fn hit(&self, vaddr: &VirtAddr) -> Option<PhyAddr> {
        let vpn = vaddr.vpn();
        let idx = Self::index_of(vpn);
        let e = self.entries[idx];
        if e.valid && e.tag == vpn >> K::LINES.trailing_zeros() {
            PhyAddr::from_page_num(e.phy_page_num, vaddr.page_offset() as u32).ok()
        } else {
            None
        }
    }
}

impl<K: TlbKind> Default for DirectMappedTlb<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the three direct-mapped TLB levels and drives the lookup/install/
/// cross-invalidation protocol between them.
#[derive(Clone, Default)]
pub struct TlbHierarchy {
    pub l1i: DirectMappedTlb<L1ITlbKind>,
    pub l1d: DirectMappedTlb<L1DTlbKind>,
    pub l2: DirectMappedTlb<L2TlbKind>,
}

impl TlbHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush_all(&mut self) {
        self.l1i.flush();
        self.l1d.flush();
        self.l2.flush();
    }

    /// Looks up `vaddr` in the L1 of `access`'s kind, then L2, then falls
    /// back to a page walk, installing the result into L2 and the
    /// appropriate L1, cross-invalidating a stale sibling L1 entry where
    /// it would otherwise alias the freshly-installed L2 set.
    pub fn search(
        &mut self,
        mem: &Memory,
        vaddr: &VirtAddr,
        access: AccessKind,
    ) -> Result<(PhyAddr, bool)> {
        let l1_hit = match access {
            AccessKind::Instruction => self.l1i.hit(vaddr),
            AccessKind::Data => self.l1d.hit(vaddr),
        };
        if let Some(paddr) = l1_hit {
            return Ok((paddr, true));
        }

        if let Some(paddr) = self.l2.hit(vaddr) {
            self.install_l1(vaddr, &paddr, access);
            return Ok((paddr, true));
        }

        let paddr = page_walk(mem, vaddr)?;
        self.install_l2(vaddr, &paddr);
        self.install_l1(vaddr, &paddr, access);
        self.cross_invalidate(vaddr, access);
        Ok((paddr, false))
    }

    fn install_l1(&mut self, vaddr: &VirtAddr, paddr: &PhyAddr, access: AccessKind) {
        let vpn = vaddr.vpn();
        match access {
            AccessKind::Instruction => {
                let index = DirectMappedTlb::<L1ITlbKind>::index_of(vpn);
                let _ = self.l1i.insert(index, TlbEntry::new::<L1ITlbKind>(vaddr, paddr));
            }
            AccessKind::Data => {
                let index = DirectMappedTlb::<L1DTlbKind>::index_of(vpn);
                let _ = self.l1d.insert(index, TlbEntry::new::<L1DTlbKind>(vaddr, paddr));
            }
        }
    }

    fn install_l2(&mut self, vaddr: &VirtAddr, paddr: &PhyAddr) {
        let vpn = vaddr.vpn();
        let index = DirectMappedTlb::<L2TlbKind>::index_of(vpn);
        let _ = self.l2.insert(index, TlbEntry::new::<L2TlbKind>(vaddr, paddr));
    }

    /// L1 has 4 bits of index, L2 has 6; the L2 index encodes the 4 L1
    /// index bits plus 2 bits that were part of the L1 tag. A sibling L1
    /// entry aliases this L2 set iff its tag's low 2 bits equal the L2
    /// index's high 2 bits.
    fn cross_invalidate(&mut self, vaddr: &VirtAddr, access: AccessKind) {
        let vpn = vaddr.vpn();
        let l1_index = DirectMappedTlb::<L1ITlbKind>::index_of(vpn);
        let l2_index = DirectMappedTlb::<L2TlbKind>::index_of(vpn) as u64;
        let l2_high_bits = l2_index >> 4;

        match access {
            AccessKind::Instruction => {
                let sibling = self.l1d.entry(l1_index);
                if sibling.valid && (sibling.tag & 0b11) == l2_high_bits {
                    self.l1d.invalidate(l1_index);
                }
            }
            AccessKind::Data => {
                let sibling = self.l1i.entry(l1_index);
                if sibling.valid && (sibling.tag & 0b11) == l2_high_bits {
                    self.l1i.invalidate(l1_index);
                }
            }
        }
    }
}
