//! Code cache: host code arena, block records, and the two-level sparse
//! index mapping guest instruction addresses to compiled blocks.
//!
//! Grounded in decaf-emu's `jit_codecache.cpp`/`.h` (`FrameAllocator`,
//! fast index), reshaped to the exact two-level 256×256 table: the
//! guest address's word index (`addr >> 2`, since every PowerPC
//! instruction is 4-byte aligned) splits into an 8-bit level-1 selector
//! and an 8-bit level-2 selector, with level-2 pages allocated lazily
//! via compare-and-swap so concurrent translators never block on an
//! uncontended region.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::Mutex;

use ppc_backend::code_buffer::CodeBuffer;
use ppc_backend::HostCodeGen;
use ppc_core::tb::TranslationBlock;

const LEVEL1_SIZE: usize = 0x100;
const LEVEL2_SIZE: usize = 0x100;

const SLOT_UNCOMPILED: u32 = 0;
const SLOT_COMPILING: u32 = 1;
const SLOT_ERROR: u32 = 2;
const SLOT_VALID_BASE: u32 = 3;

/// State of a single address slot in the [`BlockIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Uncompiled,
    Compiling,
    Error,
    Valid(usize),
}

fn decode_slot(v: u32) -> SlotState {
    match v {
        SLOT_UNCOMPILED => SlotState::Uncompiled,
        SLOT_COMPILING => SlotState::Compiling,
        SLOT_ERROR => SlotState::Error,
        n => SlotState::Valid((n - SLOT_VALID_BASE) as usize),
    }
}

struct Level2Page {
    slots: [AtomicU32; LEVEL2_SIZE],
}

impl Level2Page {
    fn new_boxed() -> Box<Self> {
        Box::new(Self { slots: std::array::from_fn(|_| AtomicU32::new(SLOT_UNCOMPILED)) })
    }
}

/// Two-level sparse address → slot-state index.
pub struct BlockIndex {
    level1: Vec<AtomicPtr<Level2Page>>,
}

impl BlockIndex {
    pub fn new() -> Self {
        let mut level1 = Vec::with_capacity(LEVEL1_SIZE);
        level1.resize_with(LEVEL1_SIZE, || AtomicPtr::new(ptr::null_mut()));
        Self { level1 }
    }

    fn split(address: u32) -> (usize, usize) {
        let word = address >> 2;
        (((word >> 8) & 0xff) as usize, (word & 0xff) as usize)
    }

    fn slot(&self, address: u32) -> &AtomicU32 {
        let (hi, lo) = Self::split(address);
        let cell = &self.level1[hi];
        let mut page = cell.load(Ordering::Acquire);
        if page.is_null() {
            let new_page = Box::into_raw(Level2Page::new_boxed());
            match cell.compare_exchange(ptr::null_mut(), new_page, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => page = new_page,
                Err(existing) => {
                    // Lost the race: drop our speculative page, use the winner's.
                    unsafe { drop(Box::from_raw(new_page)) };
                    page = existing;
                }
            }
        }
        // SAFETY: page is non-null and was published via Release/AcqRel
        // and is never freed while any BlockIndex reference is live.
        unsafe { &(*page).slots[lo] }
    }

    pub fn state(&self, address: u32) -> SlotState {
        decode_slot(self.slot(address).load(Ordering::Acquire))
    }

    /// CAS `Uncompiled -> Compiling`. `false` means another translator
    /// already owns this slot (or it is already valid/error) — the
    /// caller spin-waits on [`Self::state`] until it leaves `Compiling`.
    pub fn try_begin_compile(&self, address: u32) -> bool {
        self.slot(address)
            .compare_exchange(SLOT_UNCOMPILED, SLOT_COMPILING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn mark_error(&self, address: u32) {
        self.slot(address).store(SLOT_ERROR, Ordering::Release);
    }

    pub fn publish_valid(&self, address: u32, block_idx: usize) {
        self.slot(address).store(SLOT_VALID_BASE + block_idx as u32, Ordering::Release);
    }

    /// Reset a slot back to `Uncompiled`. The backing block record is
    /// left in the data arena (leaked until the next full [`CodeCache::clear`]).
    pub fn invalidate(&self, address: u32) {
        self.slot(address).store(SLOT_UNCOMPILED, Ordering::Release);
    }

    pub fn clear(&self) {
        for cell in &self.level1 {
            let page = cell.swap(ptr::null_mut(), Ordering::AcqRel);
            if !page.is_null() {
                unsafe { drop(Box::from_raw(page)) };
            }
        }
    }
}

impl Drop for BlockIndex {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Default for BlockIndex {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: level-2 pages are only ever read through an Acquire-loaded
// pointer published with Release, and freed only from `clear`/`Drop`
// which requires `&mut self` (no concurrent readers).
unsafe impl Send for BlockIndex {}
unsafe impl Sync for BlockIndex {}

/// Code cache: an executable host-code arena, a record arena holding
/// one [`TranslationBlock`] per compiled block, and the [`BlockIndex`]
/// mapping addresses to record indices.
///
/// Unlike the teacher's `TbStore`, blocks here are addressed by guest
/// instruction address directly rather than a `(pc, flags)` hash
/// bucket — the PowerPC frontend has no `flags`-dependent translation
/// modes in its scoped opcode subset, so the index can be a flat
/// address map.
pub struct CodeCache {
    code: Mutex<CodeBuffer>,
    blocks: Mutex<Vec<TranslationBlock>>,
    index: BlockIndex,
}

/// Error returned when the code cache cannot satisfy a request.
#[derive(Debug, thiserror::Error)]
pub enum CodeCacheError {
    #[error("failed to reserve code cache memory: {0}")]
    Alloc(#[from] io::Error),
}

impl CodeCache {
    pub fn new(code_size: usize) -> Result<Self, CodeCacheError> {
        Ok(Self {
            code: Mutex::new(CodeBuffer::new(code_size)?),
            blocks: Mutex::new(Vec::new()),
            index: BlockIndex::new(),
        })
    }

    /// Build the cache and seed offset 0 of its arena with the backend's
    /// prologue/epilogue trampoline, matching the teacher's
    /// `ExecEnv::new`: [`crate::exec_loop::run_block`] always enters
    /// through `code_base_ptr()`, so the trampoline must exist before
    /// any block is ever registered.
    pub fn new_with_prologue<B: HostCodeGen>(code_size: usize, backend: &mut B) -> Result<Self, CodeCacheError> {
        let mut code = CodeBuffer::new(code_size)?;
        backend.emit_prologue(&mut code);
        backend.emit_epilogue(&mut code);
        Ok(Self {
            code: Mutex::new(code),
            blocks: Mutex::new(Vec::new()),
            index: BlockIndex::new(),
        })
    }

    pub fn state(&self, address: u32) -> SlotState {
        self.index.state(address)
    }

    pub fn try_begin_compile(&self, address: u32) -> bool {
        self.index.try_begin_compile(address)
    }

    pub fn mark_error(&self, address: u32) {
        self.index.mark_error(address);
    }

    /// Alias `address`'s slot directly to an already-registered block's
    /// index, without registering a new block. Used to settle a
    /// trampoline stub's own slot onto its resolved target's block.
    pub fn publish_valid(&self, address: u32, block_idx: usize) {
        self.index.publish_valid(address, block_idx);
    }

    /// Run `emit` against the shared code buffer (switched writable for
    /// the duration) and register the resulting block, publishing the
    /// index slot as `Valid` last so concurrent readers never observe a
    /// partially-initialized block.
    pub fn register_block(
        &self,
        address: u32,
        tb: TranslationBlock,
        emit: impl FnOnce(&mut CodeBuffer) -> (usize, usize),
    ) -> usize {
        let mut code = self.code.lock().unwrap();
        code.set_writable().expect("set_writable failed");
        let (host_offset, host_size) = emit(&mut code);
        code.set_executable().expect("set_executable failed");
        drop(code);

        let mut tb = tb;
        tb.host_offset = host_offset;
        tb.host_size = host_size;

        let idx = {
            let mut blocks = self.blocks.lock().unwrap();
            blocks.push(tb);
            blocks.len() - 1
        };
        self.index.publish_valid(address, idx);
        idx
    }

    /// Host code pointer for a previously-registered block.
    pub fn block_code_ptr(&self, idx: usize) -> *const u8 {
        let blocks = self.blocks.lock().unwrap();
        let tb = &blocks[idx];
        let code = self.code.lock().unwrap();
        code.ptr_at(tb.host_offset)
    }

    pub fn block_guest_size(&self, idx: usize) -> u32 {
        self.blocks.lock().unwrap()[idx].size
    }

    pub fn code_base_ptr(&self) -> *const u8 {
        self.code.lock().unwrap().base_ptr()
    }

    pub fn code_remaining(&self) -> usize {
        self.code.lock().unwrap().remaining()
    }

    /// Invalidate the block covering `address`, if any. The block
    /// record itself is left in the arena (per spec: leaked until the
    /// next full [`Self::clear`]).
    pub fn invalidate(&self, address: u32) {
        self.index.invalidate(address);
    }

    /// Drop every compiled block and reset the code arena to empty.
    /// Caller must ensure no core is currently executing cached code.
    pub fn clear(&self) {
        self.index.clear();
        self.blocks.lock().unwrap().clear();
        self.code.lock().unwrap().set_offset(0);
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_slot_is_uncompiled() {
        let idx = BlockIndex::new();
        assert_eq!(idx.state(0x1000), SlotState::Uncompiled);
    }

    #[test]
    fn compile_cas_then_publish() {
        let idx = BlockIndex::new();
        assert!(idx.try_begin_compile(0x2000));
        assert!(!idx.try_begin_compile(0x2000));
        assert_eq!(idx.state(0x2000), SlotState::Compiling);
        idx.publish_valid(0x2000, 7);
        assert_eq!(idx.state(0x2000), SlotState::Valid(7));
    }

    #[test]
    fn invalidate_resets_to_uncompiled() {
        let idx = BlockIndex::new();
        idx.publish_valid(0x3000, 1);
        idx.invalidate(0x3000);
        assert_eq!(idx.state(0x3000), SlotState::Uncompiled);
    }

    #[test]
    fn distinct_pages_do_not_alias() {
        let idx = BlockIndex::new();
        idx.publish_valid(0x0000_0000, 1);
        idx.publish_valid(0x0004_0000, 2);
        assert_eq!(idx.state(0x0000_0000), SlotState::Valid(1));
        assert_eq!(idx.state(0x0004_0000), SlotState::Valid(2));
    }

    #[test]
    fn register_and_fetch_block() {
        let cache = CodeCache::new(64 * 1024).unwrap();
        let tb = TranslationBlock::new(0x1000, 0, 0);
        let idx = cache.register_block(0x1000, tb, |buf| {
            let off = buf.offset();
            (off, 0)
        });
        assert_eq!(cache.state(0x1000), SlotState::Valid(0));
        assert_eq!(idx, 0);
        assert_eq!(cache.len(), 1);
    }
}
