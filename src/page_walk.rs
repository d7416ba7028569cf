//! The four-level page walker: virtual address to physical address.

use crate::addr::{PhyAddr, VirtAddr};
use crate::error::Result;
use crate::memory::Memory;

const PTE_SIZE: usize = 4;

fn read_entry(mem: &Memory, table_base: u32, index: u16) -> Result<u32> {
    mem.read_u32(table_base as usize + index as usize * PTE_SIZE)
}

/// Walks the four on-memory page-table levels (PGD, PUD, PMD, PTE) rooted at
/// byte offset 0, producing the physical address the given virtual address
/// maps to. Presence bits are not modelled: a zero entry still produces a
/// deterministic (if meaningless) physical address.
pub fn page_walk(mem: &Memory, vaddr: &VirtAddr) -> Result<PhyAddr> {
    let mut base = 0u32;
    base = read_entry(mem, base, vaddr.pgd())?;
    base = read_entry(mem, base, vaddr.pud())?;
    base = read_entry(mem, base, vaddr.pmd())?;
    base = read_entry(mem, base, vaddr.pte())?;
    PhyAddr::new(base, vaddr.page_offset() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a memory image with four chained page tables at offsets
    /// 0, 0x1000, 0x2000, 0x3000, mapping VPN 0 to physical page `ppn`
    /// (i.e. every index-0 entry of each level) and returns it.
    fn identity_map_vpn0(ppn: u32) -> Memory {
        let mut mem = Memory::new(0x4000 + 0x1000);
        mem.write_u32(0, 0x1000).unwrap(); // pgd[0] -> pud table
        mem.write_u32(0x1000, 0x2000).unwrap(); // pud[0] -> pmd table
        mem.write_u32(0x2000, 0x3000).unwrap(); // pmd[0] -> pte table
        mem.write_u32(0x3000, ppn << 12).unwrap(); // pte[0] -> physical page base
        mem
    }

    #[test]
    fn walks_four_levels_to_a_physical_page() {
        let mem = identity_map_vpn0(7);
        let vaddr = VirtAddr::new(0, 0, 0, 0, 0x123).unwrap();
        let paddr = page_walk(&mem, &vaddr).unwrap();
        assert_eq!(paddr.phy_page_num(), 7);
        assert_eq!(paddr.page_offset(), 0x123);
    }

    #[test]
    fn zero_entries_still_produce_a_deterministic_address() {
        let mem = Memory::new(0x10);
        let vaddr = VirtAddr::new(1, 0, 0, 0, 0).unwrap();
        // pgd[1] is out of the tiny image, so this should fail as a Mem error
        // rather than silently succeeding; demonstrates bounds are enforced
        // even though presence bits are not.
        assert!(page_walk(&mem, &vaddr).is_err());
    }

    #[test]
    fn walk_against_all_zero_tables_lands_on_page_zero() {
        let mem = Memory::new(0x4000);
        let vaddr = VirtAddr::new(0, 0, 0, 0, 0x10).unwrap();
        let paddr = page_walk(&mem, &vaddr).unwrap();
        assert_eq!(paddr.phy_page_num(), 0);
        assert_eq!(paddr.page_offset(), 0x10);
    }
}
