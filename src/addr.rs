//! Virtual and physical address types and their bit-exact codec.
//!
//! A virtual address is five fields packed into the low 48 bits of a `u64`:
//! `PGD(9) | PUD(9) | PMD(9) | PTE(9) | offset(12)`, upper 16 bits reserved-zero.
//! A physical address is a 20-bit page number and a 12-bit offset packed into
//! a `u32`.

use bitfield::bitfield;

use crate::error::{Result, SimError};

pub const PGD_BITS: u32 = 9;
pub const PUD_BITS: u32 = 9;
pub const PMD_BITS: u32 = 9;
pub const PTE_BITS: u32 = 9;
pub const PAGE_OFFSET_BITS: u32 = 12;
pub const PHY_PAGE_NUM_BITS: u32 = 20;

const MAX_9: u16 = (1 << PGD_BITS) - 1;
const MAX_12: u16 = (1 << PAGE_OFFSET_BITS) - 1;

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    struct VirtAddrBits(u64);
    impl Debug;
    u16, page_offset, set_page_offset: 11, 0;
    u16, pte_entry, set_pte_entry: 20, 12;
    u16, pmd_entry, set_pmd_entry: 29, 21;
    u16, pud_entry, set_pud_entry: 38, 30;
    u16, pgd_entry, set_pgd_entry: 47, 39;
    u16, reserved, set_reserved: 63, 48;
}

/// A validated 64-bit virtual address, decomposed into its four page-table
/// fields and a page offset.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VirtAddr {
    bits: VirtAddrBits,
}

impl std::fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtAddr")
            .field("pgd", &self.pgd())
            .field("pud", &self.pud())
            .field("pmd", &self.pmd())
            .field("pte", &self.pte())
            .field("offset", &self.page_offset())
            .finish()
    }
}

impl std::fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PGD=0x{:x}; PUD=0x{:x}; PMD=0x{:x}; PTE=0x{:x}; offset=0x{:x}",
            self.pgd(),
            self.pud(),
            self.pmd(),
            self.pte(),
            self.page_offset()
        )
    }
}

impl VirtAddr {
    /// Builds a virtual address from its five component fields, each checked
    /// against its declared width.
    pub fn new(pgd: u16, pud: u16, pmd: u16, pte: u16, page_offset: u16) -> Result<Self> {
        if pgd > MAX_9 {
            return Err(SimError::bad_parameter("PGD exceeds 9 bits"));
        }
        if pud > MAX_9 {
            return Err(SimError::bad_parameter("PUD exceeds 9 bits"));
        }
        if pmd > MAX_9 {
            return Err(SimError::bad_parameter("PMD exceeds 9 bits"));
        }
        if pte > MAX_9 {
            return Err(SimError::bad_parameter("PTE exceeds 9 bits"));
        }
        if page_offset > MAX_12 {
            return Err(SimError::bad_parameter("page offset exceeds 12 bits"));
        }

        let mut bits = VirtAddrBits(0);
        bits.set_pgd_entry(pgd);
        bits.set_pud_entry(pud);
        bits.set_pmd_entry(pmd);
        bits.set_pte_entry(pte);
        bits.set_page_offset(page_offset);
        bits.set_reserved(0);
        Ok(VirtAddr { bits })
    }

    /// Decomposes a raw 64-bit word into a virtual address. Rejects
    /// non-zero reserved bits (63:48) rather than silently masking them.
    pub fn from_u64(raw: u64) -> Result<Self> {
        if raw >> 48 != 0 {
            return Err(SimError::bad_parameter(
                "reserved bits 63:48 of virtual address must be zero",
            ));
        }
        let bits = VirtAddrBits(raw);
        Self::new(
            bits.pgd_entry(),
            bits.pud_entry(),
            bits.pmd_entry(),
            bits.pte_entry(),
            bits.page_offset(),
        )
    }

    pub fn pgd(&self) -> u16 {
        self.bits.pgd_entry()
    }

    pub fn pud(&self) -> u16 {
        self.bits.pud_entry()
    }

    pub fn pmd(&self) -> u16 {
        self.bits.pmd_entry()
    }

    pub fn pte(&self) -> u16 {
        self.bits.pte_entry()
    }

    pub fn page_offset(&self) -> u16 {
        self.bits.page_offset()
    }

    /// Recomposes the 48-bit raw address: `(pgd<<39)|(pud<<30)|(pmd<<21)|(pte<<12)|offset`.
    pub fn to_u64(&self) -> u64 {
        self.bits.0
    }

    /// The 36-bit virtual page number: `(pgd<<27)|(pud<<18)|(pmd<<9)|pte`.
    pub fn vpn(&self) -> u64 {
        self.to_u64() >> PAGE_OFFSET_BITS
    }
}

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    struct PhyAddrBits(u32);
    impl Debug;
    u32, page_offset, set_page_offset: 11, 0;
    u32, phy_page_num, set_phy_page_num: 31, 12;
}

/// A validated physical address: a 20-bit page number and a 12-bit offset.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PhyAddr {
    bits: PhyAddrBits,
}

impl std::fmt::Debug for PhyAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhyAddr")
            .field("phy_page_num", &self.phy_page_num())
            .field("page_offset", &self.page_offset())
            .finish()
    }
}

impl std::fmt::Display for PhyAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "page num=0x{:x}; offset=0x{:x}",
            self.phy_page_num(),
            self.page_offset()
        )
    }
}

impl PhyAddr {
    /// `page_base` is a byte offset (typically the value read out of a page
    /// table entry); only its upper bits (beyond the 12-bit offset) are
    /// significant and are masked to 20 bits as the physical page number.
    pub fn new(page_base: u32, page_offset: u32) -> Result<Self> {
        if page_offset > MAX_12 as u32 {
            return Err(SimError::bad_parameter("page offset exceeds 12 bits"));
        }
        let mut bits = PhyAddrBits(0);
        bits.set_phy_page_num((page_base >> PAGE_OFFSET_BITS) & ((1 << PHY_PAGE_NUM_BITS) - 1));
        bits.set_page_offset(page_offset);
        Ok(PhyAddr { bits })
    }

    /// Builds directly from an already-resolved page number and offset.
    pub fn from_page_num(phy_page_num: u32, page_offset: u32) -> Result<Self> {
        if page_offset > MAX_12 as u32 {
            return Err(SimError::bad_parameter("page offset exceeds 12 bits"));
        }
        if phy_page_num >= (1 << PHY_PAGE_NUM_BITS) {
            return Err(SimError::bad_parameter("physical page number exceeds 20 bits"));
        }
        let mut bits = PhyAddrBits(0);
        bits.set_phy_page_num(phy_page_num);
        bits.set_page_offset(page_offset);
        Ok(PhyAddr { bits })
    }

    pub fn phy_page_num(&self) -> u32 {
        self.bits.phy_page_num()
    }

    pub fn page_offset(&self) -> u32 {
        self.bits.page_offset()
    }

    /// `(page_num << 12) | offset`.
    pub fn to_u32(&self) -> u32 {
        self.bits.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virt_addr_round_trips_every_48_bit_value_sampled() {
        // Exhaustive over all 2^48 values is infeasible; sample densely across
        // the field boundaries instead.
        let samples: &[u64] = &[
            0,
            1,
            0x0000_FFFF_FFFF_FFFF,
            0x1248_1248_1248,
            0x0001_0000_0001,
            (1u64 << 39) - 1,
            1u64 << 39,
        ];
        for &x in samples {
            let v = VirtAddr::from_u64(x).unwrap();
            assert_eq!(v.to_u64(), x);
        }
    }

    #[test]
    fn virt_addr_fields_round_trip() {
        let v = VirtAddr::new(0x1A2, 0x0B3, 0x1C4, 0x0D5, 0xFA6).unwrap();
        assert_eq!(v.pgd(), 0x1A2);
        assert_eq!(v.pud(), 0x0B3);
        assert_eq!(v.pmd(), 0x1C4);
        assert_eq!(v.pte(), 0x0D5);
        assert_eq!(v.page_offset(), 0xFA6);
    }

    #[test]
    fn virt_addr_rejects_reserved_bits() {
        assert!(VirtAddr::from_u64(1u64 << 48).is_err());
        assert!(VirtAddr::from_u64(u64::MAX).is_err());
    }

    #[test]
    fn virt_addr_rejects_overflowing_fields() {
        assert!(VirtAddr::new(512, 0, 0, 0, 0).is_err());
        assert!(VirtAddr::new(0, 0, 0, 0, 4096).is_err());
    }

    #[test]
    fn vpn_concatenates_the_four_table_fields() {
        let v = VirtAddr::new(1, 0, 0, 0, 0).unwrap();
        assert_eq!(v.vpn(), 1u64 << 27);
        let v = VirtAddr::new(0, 0, 0, 1, 0).unwrap();
        assert_eq!(v.vpn(), 1);
    }

    #[test]
    fn phy_addr_masks_page_base_to_its_page_number() {
        let p = PhyAddr::new(0x0001_2345, 0x006).unwrap();
        assert_eq!(p.phy_page_num(), 0x0001_2345 >> 12);
        assert_eq!(p.page_offset(), 0x006);
    }

    #[test]
    fn phy_addr_rejects_overflowing_offset() {
        assert!(PhyAddr::new(0, 4096).is_err());
    }
}
