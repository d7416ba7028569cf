//! A memory hierarchy simulator: four-level page walking, a two-level
//! set-associative cache hierarchy with exclusive inclusion, and a
//! two-level TLB hierarchy with cross-invalidation, over a flat memory
//! image.

#[macro_use]
extern crate log;

pub mod addr;
pub mod cache;
pub mod cli;
pub mod error;
pub mod loader;
pub mod memory;
pub mod page_walk;
pub mod simulator;
pub mod tlb;
pub mod trace;

pub use crate::addr::{PhyAddr, VirtAddr};
pub use crate::error::{Result, SimError};
pub use crate::memory::Memory;
pub use crate::page_walk::page_walk;
pub use crate::simulator::{ExecResult, Simulator};
