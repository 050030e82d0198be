//! PT_LOAD segment loading into guest memory, plus the single initial
//! guest stack.
//!
//! There is no guest OS personality here (no Linux ABI, no argv/envp/
//! auxv) — the scoped system is a bare-metal tri-core image with one
//! entry point and a scheduler-managed thread, not a process loader.

use std::fmt;
use std::fs;
use std::path::Path;

use ppc_core::mem::{page_align_down, page_align_up, page_size};
use ppc_core::{GuestMemory, GuestMemoryError};

use crate::elf::{ElfError, Elf32Ehdr, PF_R, PF_W, PF_X, PT_LOAD};

const GUEST_STACK_SIZE: u32 = 1 << 20;
/// Stack grows down from just below the 256 MiB mark, leaving PT_LOAD
/// segments (expected to sit low in guest address space) room to grow.
const GUEST_STACK_TOP: u32 = 0x1000_0000;

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Elf(ElfError),
    Memory(GuestMemoryError),
    NoLoadSegment,
    SegmentOutOfRange,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O: {e}"),
            Self::Elf(e) => write!(f, "ELF: {e}"),
            Self::Memory(e) => write!(f, "guest memory: {e}"),
            Self::NoLoadSegment => write!(f, "no PT_LOAD segment"),
            Self::SegmentOutOfRange => write!(f, "segment out of range"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ElfError> for LoadError {
    fn from(e: ElfError) -> Self {
        Self::Elf(e)
    }
}

impl From<GuestMemoryError> for LoadError {
    fn from(e: GuestMemoryError) -> Self {
        Self::Memory(e)
    }
}

/// Result of loading a guest image: where to start the first thread.
pub struct ImageInfo {
    pub entry: u32,
    pub stack_bottom: u32,
    pub stack_top: u32,
}

fn elf_to_prot(flags: u32) -> i32 {
    let mut prot = 0;
    if flags & PF_R != 0 {
        prot |= libc::PROT_READ;
    }
    if flags & PF_W != 0 {
        prot |= libc::PROT_WRITE;
    }
    if flags & PF_X != 0 {
        prot |= libc::PROT_EXEC;
    }
    prot
}

/// Load a static PowerPC ELF32 executable's PT_LOAD segments into
/// `mem`, then reserve and map the initial guest stack.
pub fn load_image(path: &Path, mem: &GuestMemory) -> Result<ImageInfo, LoadError> {
    let data = fs::read(path)?;
    let ehdr = Elf32Ehdr::parse(&data)?;
    let phdrs = ehdr.program_headers(&data)?;

    let mut has_load = false;

    for ph in &phdrs {
        if ph.p_type != PT_LOAD {
            continue;
        }
        has_load = true;

        let aligned_start = page_align_down(ph.p_vaddr as u64) as u32;
        let aligned_end = page_align_up((ph.p_vaddr as u64) + (ph.p_memsz as u64)) as u32;
        let aligned_size = (aligned_end - aligned_start) as usize;

        if aligned_end >= GUEST_STACK_TOP {
            return Err(LoadError::SegmentOutOfRange);
        }

        mem.mmap_fixed(aligned_start, aligned_size, libc::PROT_READ | libc::PROT_WRITE)?;

        if ph.p_filesz > 0 {
            let src_off = ph.p_offset as usize;
            let src_end = src_off + ph.p_filesz as usize;
            if src_end > data.len() {
                return Err(LoadError::Elf(ElfError::InvalidPhdr));
            }
            // SAFETY: just mapped read-write above.
            unsafe { mem.write_bytes(ph.p_vaddr, &data[src_off..src_end]) };
        }

        let prot = elf_to_prot(ph.p_flags);
        if prot != libc::PROT_READ | libc::PROT_WRITE {
            mem.mprotect(aligned_start, aligned_size, prot)?;
        }
    }

    if !has_load {
        return Err(LoadError::NoLoadSegment);
    }

    let stack_bottom = GUEST_STACK_TOP - GUEST_STACK_SIZE;
    mem.mmap_fixed(stack_bottom, GUEST_STACK_SIZE as usize, libc::PROT_READ | libc::PROT_WRITE)?;

    let _ = page_size();
    Ok(ImageInfo { entry: ehdr.e_entry, stack_bottom, stack_top: GUEST_STACK_TOP })
}
