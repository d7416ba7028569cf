//! Bootstraps a [`Memory`] image (and a ready-to-use [`Simulator`] over it)
//! from the memory-description file format: a capacity, a page-directory
//! dump, a block of physically-addressed pages, then virtually-addressed
//! pages resolved via page walk.

use std::path::Path;

use crate::error::{Result, SimError};
use crate::memory::Memory;
use crate::page_walk::page_walk;
use crate::simulator::Simulator;
use crate::addr::VirtAddr;

const PAGE_BYTES: usize = 4096;
const PAGE_TABLE_LEVEL_BYTES: usize = 512 * 4;

fn next_line<'a, I: Iterator<Item = &'a str>>(lines: &mut I) -> Result<&'a str> {
    lines
        .next()
        .ok_or_else(|| SimError::bad_parameter("unexpected end of memory description file"))
}

fn split_addr_path(line: &str) -> Result<(&str, &str)> {
    let mut parts = line.split_whitespace();
    let addr = parts
        .next()
        .ok_or_else(|| SimError::bad_parameter("missing address field"))?;
    let path = parts
        .next()
        .ok_or_else(|| SimError::bad_parameter("missing path field"))?;
    if parts.next().is_some() {
        return Err(SimError::bad_parameter(format!("too many fields in `{line}`")));
    }
    Ok((addr, path))
}

fn parse_hex_u64(token: &str) -> Result<u64> {
    let digits = token
        .strip_prefix("0x")
        .ok_or_else(|| SimError::bad_parameter(format!("expected `0x`-prefixed address in `{token}`")))?;
    u64::from_str_radix(digits, 16).map_err(|_| SimError::bad_parameter(format!("`{token}` is not valid hex")))
}

/// Loads a raw binary blob at `offset`. Valid blobs are exactly one page
/// (4 KiB) or one page-table level (512 little-endian `u32` entries); any
/// other size is treated the way the original bootstrapper treats a file
/// that "finishes too soon" — an I/O error.
fn load_blob(mem: &mut Memory, offset: usize, path: &Path) -> Result<()> {
    let data = std::fs::read(path)?;
    if data.len() != PAGE_BYTES && data.len() != PAGE_TABLE_LEVEL_BYTES {
        return Err(SimError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "{} is {} bytes, expected {PAGE_TABLE_LEVEL_BYTES} (page table level) or {PAGE_BYTES} (page)",
                path.display(),
                data.len()
            ),
        )));
    }
    let end = offset
        .checked_add(data.len())
        .ok_or_else(|| SimError::mem("blob offset overflows memory capacity"))?;
    let dest = mem
        .as_mut_slice()
        .get_mut(offset..end)
        .ok_or_else(|| SimError::mem(format!("blob at 0x{offset:x} does not fit in memory image")))?;
    dest.copy_from_slice(&data);
    Ok(())
}

/// Parses a memory-description file and builds the `Memory` it describes,
/// returning both that `Memory` and a fresh [`Simulator`] over a copy of it.
///
/// Format (one record per line, fields whitespace-separated):
/// ```text
/// <capacity_in_bytes>
/// <path_to_page_directory_dump>
/// <n_physical_pages>
/// <phys_addr_hex> <path>            (repeated n_physical_pages times)
/// <virt_addr_hex> <path>            (repeated until EOF)
/// ```
pub fn load_memory(description_path: &Path) -> Result<(Memory, Simulator)> {
    let text = std::fs::read_to_string(description_path)?;
    let base_dir = description_path.parent().unwrap_or_else(|| Path::new("."));
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let capacity: usize = next_line(&mut lines)?
        .parse()
        .map_err(|_| SimError::bad_parameter("invalid capacity in memory description"))?;
    let mut mem = Memory::new(capacity);

    let pgd_path = next_line(&mut lines)?;
    load_blob(&mut mem, 0, &base_dir.join(pgd_path))?;

    let n_physical: usize = next_line(&mut lines)?
        .parse()
        .map_err(|_| SimError::bad_parameter("invalid physical page count"))?;
    for _ in 0..n_physical {
        let line = next_line(&mut lines)?;
        let (addr_token, path_token) = split_addr_path(line)?;
        let offset = parse_hex_u64(addr_token)? as usize;
        load_blob(&mut mem, offset, &base_dir.join(path_token))?;
    }

    for line in lines {
        let (addr_token, path_token) = split_addr_path(line)?;
        let raw = parse_hex_u64(addr_token)?;
        let vaddr = VirtAddr::from_u64(raw)?;
        let paddr = page_walk(&mem, &vaddr)?;
        load_blob(&mut mem, paddr.to_u32() as usize, &base_dir.join(path_token))?;
    }

    let sim = Simulator::new(mem.clone());
    Ok((mem, sim))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn loads_a_minimal_two_page_description() {
        let dir = tempfile::tempdir().unwrap();

        let mut pgd = vec![0u8; PAGE_TABLE_LEVEL_BYTES];
        pgd[0..4].copy_from_slice(&0x2000u32.to_le_bytes());
        write_file(dir.path(), "pgd.bin", &pgd);

        let mut pud = vec![0u8; PAGE_TABLE_LEVEL_BYTES];
        pud[0..4].copy_from_slice(&0x3000u32.to_le_bytes());
        write_file(dir.path(), "pud.bin", &pud);

        let mut pmd = vec![0u8; PAGE_TABLE_LEVEL_BYTES];
        pmd[0..4].copy_from_slice(&0x4000u32.to_le_bytes());
        write_file(dir.path(), "pmd.bin", &pmd);

        let mut pte = vec![0u8; PAGE_TABLE_LEVEL_BYTES];
        pte[0..4].copy_from_slice(&0x5000u32.to_le_bytes()); // VPN 0 -> physical page at 0x5000
        write_file(dir.path(), "pte.bin", &pte);

        let mut data_page = vec![0u8; PAGE_BYTES];
        data_page[0..4].copy_from_slice(&0xAABBCCDDu32.to_le_bytes());
        write_file(dir.path(), "page0.bin", &data_page);

        let description =
            "65536\npgd.bin\n3\n0x2000 pud.bin\n0x3000 pmd.bin\n0x4000 pte.bin\n0x0000000000000000 page0.bin\n";
        let desc_path = write_file(dir.path(), "mem.desc", description.as_bytes());

        let (mem, _sim) = load_memory(&desc_path).unwrap();
        assert_eq!(mem.read_u32(0).unwrap(), 0x2000);
        assert_eq!(mem.read_u32(0x2000).unwrap(), 0x3000);
        assert_eq!(mem.read_u32(0x3000).unwrap(), 0x4000);
        assert_eq!(mem.read_u32(0x4000).unwrap(), 0x5000);
        assert_eq!(mem.read_u32(0x5000).unwrap(), 0xAABB_CCDD);
    }

    #[test]
    fn rejects_wrong_sized_blob() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "pgd.bin", &[0u8; 10]);
        let description = "65536\npgd.bin\n0\n";
        let desc_path = write_file(dir.path(), "mem.desc", description.as_bytes());

        assert!(load_memory(&desc_path).is_err());
    }
}
