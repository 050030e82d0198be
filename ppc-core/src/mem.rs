//! `mmap`-backed guest address space with big-endian typed accessors.
//!
//! Adapted from the teacher's `GuestSpace` (`linux-user/src/guest_space.rs`):
//! same single-reservation `mmap` strategy and `g2h`/`h2g` translation, but
//! every multi-byte accessor byte-swaps, since the guest here is PowerPC
//! (big-endian) rather than RV64 (little-endian, host-native on x86_64).
//! This is the one deliberate behavioral divergence from the teacher's
//! memory model.

use std::io;
use std::ptr;
use thiserror::Error;

/// Guest address space size: 1 GiB, matching the teacher's reservation.
const GUEST_SPACE_SIZE: usize = 1 << 30;

#[derive(Debug, Error)]
pub enum GuestMemoryError {
    #[error("failed to reserve guest address space: {0}")]
    Reserve(#[source] io::Error),
    #[error("guest address {addr:#x} out of range (size {size:#x})")]
    OutOfRange { addr: u64, size: usize },
    #[error("mmap_fixed at {addr:#x} size {size:#x} failed: {source}")]
    MmapFixed { addr: u64, size: usize, #[source] source: io::Error },
    #[error("mprotect at {addr:#x} size {size:#x} failed: {source}")]
    Mprotect { addr: u64, size: usize, #[source] source: io::Error },
}

/// `mmap`-based guest address space with big-endian accessors.
pub struct GuestMemory {
    base: *mut u8,
    size: usize,
    brk: u64,
}

// SAFETY: GuestMemory owns its mmap'd memory exclusively; cores only ever
// read/write through `translate`, never mutate `base`/`size` concurrently.
unsafe impl Send for GuestMemory {}
unsafe impl Sync for GuestMemory {}

impl GuestMemory {
    pub fn new() -> Result<Self, GuestMemoryError> {
        // SAFETY: PROT_NONE reservation, no file backing.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                GUEST_SPACE_SIZE,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(GuestMemoryError::Reserve(io::Error::last_os_error()));
        }
        Ok(Self { base: ptr as *mut u8, size: GUEST_SPACE_SIZE, brk: 0 })
    }

    /// Translate a guest address into a host pointer.
    #[inline]
    pub fn translate(&self, guest_addr: u32) -> Result<*mut u8, GuestMemoryError> {
        if (guest_addr as usize) >= self.size {
            return Err(GuestMemoryError::OutOfRange { addr: guest_addr as u64, size: self.size });
        }
        Ok(unsafe { self.base.add(guest_addr as usize) })
    }

    #[inline]
    pub fn g2h(&self, guest_addr: u32) -> *mut u8 {
        self.translate(guest_addr).expect("guest address out of range")
    }

    #[inline]
    pub fn h2g(&self, host_ptr: *const u8) -> u32 {
        let off = host_ptr as usize - self.base as usize;
        assert!(off < self.size, "host pointer not in guest space");
        off as u32
    }

    #[inline]
    pub fn guest_base(&self) -> *const u8 {
        self.base as *const u8
    }

    #[inline]
    pub fn brk(&self) -> u64 {
        self.brk
    }

    #[inline]
    pub fn set_brk(&mut self, brk: u64) {
        self.brk = brk;
    }

    pub fn mmap_fixed(&self, guest_addr: u32, size: usize, prot: i32) -> Result<(), GuestMemoryError> {
        let host = self.g2h(guest_addr);
        let ret = unsafe {
            libc::mmap(
                host as *mut libc::c_void,
                size,
                prot,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED,
                -1,
                0,
            )
        };
        if ret == libc::MAP_FAILED {
            Err(GuestMemoryError::MmapFixed { addr: guest_addr as u64, size, source: io::Error::last_os_error() })
        } else {
            Ok(())
        }
    }

    pub fn mprotect(&self, guest_addr: u32, size: usize, prot: i32) -> Result<(), GuestMemoryError> {
        let host = self.g2h(guest_addr);
        let ret = unsafe { libc::mprotect(host as *mut libc::c_void, size, prot) };
        if ret != 0 {
            Err(GuestMemoryError::Mprotect { addr: guest_addr as u64, size, source: io::Error::last_os_error() })
        } else {
            Ok(())
        }
    }

    /// # Safety
    /// The guest region must be mapped writable.
    pub unsafe fn write_bytes(&self, guest_addr: u32, data: &[u8]) {
        let dst = self.g2h(guest_addr);
        ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
    }

    /// # Safety
    /// The guest region must be mapped readable.
    pub unsafe fn read_u8(&self, guest_addr: u32) -> u8 {
        self.g2h(guest_addr).read()
    }

    /// # Safety
    /// The guest region must be mapped writable.
    pub unsafe fn write_u8(&self, guest_addr: u32, val: u8) {
        self.g2h(guest_addr).write(val)
    }

    /// # Safety
    /// The guest region must be mapped readable. Big-endian.
    pub unsafe fn read_u16(&self, guest_addr: u32) -> u16 {
        let raw = (self.g2h(guest_addr) as *const u16).read_unaligned();
        u16::from_be(raw)
    }

    /// # Safety
    /// The guest region must be mapped writable. Big-endian.
    pub unsafe fn write_u16(&self, guest_addr: u32, val: u16) {
        (self.g2h(guest_addr) as *mut u16).write_unaligned(val.to_be());
    }

    /// # Safety
    /// The guest region must be mapped readable. Big-endian.
    pub unsafe fn read_u32(&self, guest_addr: u32) -> u32 {
        let raw = (self.g2h(guest_addr) as *const u32).read_unaligned();
        u32::from_be(raw)
    }

    /// # Safety
    /// The guest region must be mapped writable. Big-endian.
    pub unsafe fn write_u32(&self, guest_addr: u32, val: u32) {
        (self.g2h(guest_addr) as *mut u32).write_unaligned(val.to_be());
    }

    /// # Safety
    /// The guest region must be mapped readable. Big-endian.
    pub unsafe fn read_u64(&self, guest_addr: u32) -> u64 {
        let raw = (self.g2h(guest_addr) as *const u64).read_unaligned();
        u64::from_be(raw)
    }

    /// # Safety
    /// The guest region must be mapped writable. Big-endian.
    pub unsafe fn write_u64(&self, guest_addr: u32, val: u64) {
        (self.g2h(guest_addr) as *mut u64).write_unaligned(val.to_be());
    }
}

impl Drop for GuestMemory {
    fn drop(&mut self) {
        if !self.base.is_null() {
            unsafe {
                libc::munmap(self.base as *mut libc::c_void, self.size);
            }
        }
    }
}

pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

pub fn page_align_up(addr: u64) -> u64 {
    let ps = page_size() as u64;
    (addr + ps - 1) & !(ps - 1)
}

pub fn page_align_down(addr: u64) -> u64 {
    let ps = page_size() as u64;
    addr & !(ps - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_drop() {
        let mem = GuestMemory::new().unwrap();
        assert!(!mem.base.is_null());
        drop(mem);
    }

    #[test]
    fn g2h_h2g_roundtrip() {
        let mem = GuestMemory::new().unwrap();
        let addr: u32 = 0x1000;
        let host = mem.g2h(addr);
        assert_eq!(mem.h2g(host), addr);
    }

    #[test]
    fn big_endian_roundtrip() {
        let mem = GuestMemory::new().unwrap();
        let addr: u32 = 0x10000;
        mem.mmap_fixed(addr, page_size(), libc::PROT_READ | libc::PROT_WRITE).unwrap();
        unsafe {
            mem.write_u32(addr, 0x1122_3344);
            let raw = std::slice::from_raw_parts(mem.g2h(addr), 4);
            assert_eq!(raw, &[0x11, 0x22, 0x33, 0x44]);
            assert_eq!(mem.read_u32(addr), 0x1122_3344);
        }
    }

    #[test]
    fn page_align() {
        assert_eq!(page_align_up(0), 0);
        assert_eq!(page_align_up(1), 4096);
        assert_eq!(page_align_up(4096), 4096);
        assert_eq!(page_align_up(4097), 8192);
        assert_eq!(page_align_down(4095), 0);
    }
}
