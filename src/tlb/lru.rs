//! Fully-associative, LRU-managed TLB — an alternative to the direct-mapped
//! hierarchy in [`super`], demonstrating that the translation core is
//! orthogonal to replacement policy. Not wired into [`crate::Simulator`] by
//! default.

use crate::addr::{PhyAddr, VirtAddr};
use crate::error::Result;
use crate::page_walk::page_walk;
use crate::Memory;

/// An arena-backed doubly-linked list over the fixed index range
/// `0..capacity`, ordered by recency: front is least-recently-used, back is
/// most-recently-used. Every index is always present in the list; `move_back`
/// reorders rather than inserts/removes. Using a `Vec`-addressed arena (two
/// `u32` pointers per node) avoids per-operation allocation and the
/// cyclic-reference concerns of a pointer-based list.
#[derive(Clone)]
pub struct IndexList {
    prev: Vec<Option<u32>>,
    next: Vec<Option<u32>>,
    front: u32,
    back: u32,
}

impl IndexList {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "IndexList capacity must be positive");
        let mut prev = vec![None; capacity];
        let mut next = vec![None; capacity];
        for i in 0..capacity {
            prev[i] = (i > 0).then(|| (i - 1) as u32);
            next[i] = (i + 1 < capacity).then(|| (i + 1) as u32);
        }
        IndexList {
            prev,
            next,
            front: 0,
            back: (capacity - 1) as u32,
        }
    }

    pub fn front(&self) -> u32 {
        self.front
    }

    /// Moves `node` to the back (most-recently-used) position.
    pub fn move_back(&mut self, node: u32) {
        if node == self.back {
            return;
        }
        let p = self.prev[node as usize];
        let n = self.next[node as usize];
        match p {
            Some(pp) => self.next[pp as usize] = n,
            None => self.front = n.expect("node was neither front nor back but has no prev"),
        }
        if let Some(nn) = n {
            self.prev[nn as usize] = p;
        }

        self.prev[node as usize] = Some(self.back);
        self.next[node as usize] = None;
        self.next[self.back as usize] = Some(node);
        self.back = node;
    }

    /// Iterates back-to-front, i.e. most-recently-used first.
    pub fn iter_mru_first(&self) -> impl Iterator<Item = u32> + '_ {
        let mut cur = Some(self.back);
        std::iter::from_fn(move || {
            let node = cur?;
            cur = self.prev[node as usize];
            Some(node)
        })
    }
}

/// A fully-associative TLB entry: `{ valid, tag (full VPN), phy_page_num }`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LruTlbEntry {
    pub valid: bool,
    pub tag: u64,
    pub phy_page_num: u32,
}

impl LruTlbEntry {
    pub const INVALID: LruTlbEntry = LruTlbEntry {
        valid: false,
        tag: 0,
        phy_page_num: 0,
    };
}

pub struct LruTlb {
    entries: Vec<LruTlbEntry>,
    order: IndexList,
}

impl LruTlb {
    pub fn new(capacity: usize) -> Self {
        LruTlb {
            entries: vec![LruTlbEntry::INVALID; capacity],
            order: IndexList::new(capacity),
        }
    }

    pub fn flush(&mut self) {
        self.entries.fill(LruTlbEntry::INVALID);
    }

    /// Scans from most- to least-recently-used, matching the full VPN. On
    /// match, promotes that entry to most-recently-used.
    pub fn hit(&mut self, vaddr: &VirtAddr) -> Option<PhyAddr> {
        let vpn = vaddr.vpn();
        let found = self.order.iter_mru_first().find(|&node| {
            let e = self.entries[node as usize];
            e.valid && e.tag == vpn
        })?;
        self.order.move_back(found);
        let e = self.entries[found as usize];
        PhyAddr::from_page_num(e.phy_page_num, vaddr.page_offset() as u32).ok()
    }

    /// On miss, walks the page tables and overwrites the current
    /// least-recently-used slot, then promotes it.
    pub fn search(&mut self, mem: &Memory, vaddr: &VirtAddr) -> Result<(PhyAddr, bool)> {
        if let Some(paddr) = self.hit(vaddr) {
            return Ok((paddr, true));
        }
        let paddr = page_walk(mem, vaddr)?;
        let victim = self.order.front();
        self.entries[victim as usize] = LruTlbEntry {
            valid: true,
            tag: vaddr.vpn(),
            phy_page_num: paddr.phy_page_num(),
        };
        self.order.move_back(victim);
        Ok((paddr, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chained_identity_map(mem: &mut Memory, vpn: u64, ppn: u32) {
        let pte_index = vpn & 0x1FF;
        mem.write_u32(0, 0x1000).unwrap();
        mem.write_u32(0x1000, 0x2000).unwrap();
        mem.write_u32(0x2000, 0x3000).unwrap();
        mem.write_u32(0x3000 + (pte_index as usize) * 4, ppn << 12)
            .unwrap();
    }

    #[test]
    fn index_list_move_back_reorders_front() {
        let mut list = IndexList::new(4);
        assert_eq!(list.front(), 0);
        list.move_back(0);
        assert_eq!(list.front(), 1);
        let mru: Vec<u32> = list.iter_mru_first().collect();
        assert_eq!(mru, vec![0, 3, 2, 1]);
    }

    #[test]
    fn lru_tlb_misses_then_hits() {
        let mut mem = Memory::new(0x4000);
        chained_identity_map(&mut mem, 5, 3);
        let mut tlb = LruTlb::new(4);
        let vaddr = VirtAddr::new(0, 0, 0, 5, 0x20).unwrap();

        let (paddr, hit) = tlb.search(&mem, &vaddr).unwrap();
        assert!(!hit);
        assert_eq!(paddr.phy_page_num(), 3);

        let (_paddr, hit2) = tlb.search(&mem, &vaddr).unwrap();
        assert!(hit2);
    }

    #[test]
    fn lru_tlb_evicts_the_least_recently_used_slot() {
        let mut mem = Memory::new(0x4000);
        for vpn in 0..5u64 {
            chained_identity_map(&mut mem, vpn, vpn as u32);
        }
        let mut tlb = LruTlb::new(4);
        for vpn in 0..4u64 {
            let v = VirtAddr::new(0, 0, 0, vpn as u16, 0).unwrap();
            tlb.search(&mem, &v).unwrap();
        }
        // vpn 0 is now LRU; a 5th distinct mapping evicts it.
        let v4 = VirtAddr::new(0, 0, 0, 4, 0).unwrap();
        tlb.search(&mem, &v4).unwrap();

        let v0 = VirtAddr::new(0, 0, 0, 0, 0).unwrap();
        assert!(tlb.hit(&v0).is_none(), "vpn 0 should have been evicted");
    }
}
