//! Breakpoint table with copy-on-write snapshot reads.
//!
//! Grounded in decaf-emu's `cpu::BreakpointList` (`cpu_breakpoints.h`):
//! a `std::shared_ptr<BreakpointList>` snapshot that readers clone once and
//! writers replace wholesale under a lock. The direct Rust shape of that
//! pattern is `Arc<Vec<Breakpoint>>` behind a `Mutex`, needing no crate
//! outside `std`.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    SingleFire,
    MultiFire,
}

#[derive(Debug, Clone, Copy)]
pub struct Breakpoint {
    pub kind: BreakpointKind,
    pub address: u32,
    /// The original instruction word at `address`, saved before a `tw`
    /// trap instruction was patched in.
    pub saved_code: u32,
}

/// Copy-on-write breakpoint table.
pub struct BreakpointTable {
    inner: Mutex<Arc<Vec<Breakpoint>>>,
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Arc::new(Vec::new())) }
    }

    pub fn add(&self, address: u32, kind: BreakpointKind, saved_code: u32) {
        let mut guard = self.inner.lock().unwrap();
        let mut next = (**guard).clone();
        if let Some(existing) = next.iter_mut().find(|bp| bp.address == address) {
            existing.kind = kind;
            existing.saved_code = saved_code;
        } else {
            next.push(Breakpoint { kind, address, saved_code });
        }
        *guard = Arc::new(next);
    }

    pub fn remove(&self, address: u32) {
        let mut guard = self.inner.lock().unwrap();
        let mut next = (**guard).clone();
        next.retain(|bp| bp.address != address);
        *guard = Arc::new(next);
    }

    /// A single cheap `Arc` clone — callers iterate over a consistent
    /// snapshot without holding the writer lock.
    pub fn get_breakpoints(&self) -> Arc<Vec<Breakpoint>> {
        Arc::clone(&self.inner.lock().unwrap())
    }

    pub fn has_breakpoints(&self) -> bool {
        !self.get_breakpoints().is_empty()
    }

    pub fn has_breakpoint(&self, address: u32) -> bool {
        self.get_breakpoints().iter().any(|bp| bp.address == address)
    }

    pub fn test(&self, address: u32) -> Option<Breakpoint> {
        let snapshot = self.get_breakpoints();
        let idx = snapshot.iter().position(|bp| bp.address == address)?;
        let bp = snapshot[idx];
        if bp.kind == BreakpointKind::SingleFire {
            self.remove(address);
        }
        Some(bp)
    }

    pub fn saved_code(&self, address: u32) -> Option<u32> {
        self.get_breakpoints().iter().find(|bp| bp.address == address).map(|bp| bp.saved_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fire_removed_after_test() {
        let table = BreakpointTable::new();
        table.add(0x1000, BreakpointKind::SingleFire, 0xdead_beef);
        assert!(table.has_breakpoint(0x1000));
        let hit = table.test(0x1000).unwrap();
        assert_eq!(hit.saved_code, 0xdead_beef);
        assert!(!table.has_breakpoint(0x1000));
    }

    #[test]
    fn multi_fire_persists() {
        let table = BreakpointTable::new();
        table.add(0x2000, BreakpointKind::MultiFire, 0);
        table.test(0x2000).unwrap();
        assert!(table.has_breakpoint(0x2000));
    }

    #[test]
    fn snapshot_is_stable_across_concurrent_write() {
        let table = BreakpointTable::new();
        table.add(0x3000, BreakpointKind::MultiFire, 0);
        let snapshot = table.get_breakpoints();
        table.add(0x4000, BreakpointKind::MultiFire, 0);
        assert_eq!(snapshot.len(), 1);
    }
}
