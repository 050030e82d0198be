//! Guest thread (`OSThread`) data model.
//!
//! Fields mirror decaf-emu's `OSThread`/`cpu::Tracer` observable surface as
//! distilled into spec.md §3; the fiber itself is owned by `ppc_sched`
//! (this crate only models the fields the core and scheduler both read).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Waiting,
    Moribund,
}

/// Per-core affinity bitmask; bit `i` set means the thread may run on core `i`.
pub type AffinityMask = u32;

/// Saved full register set, used when a thread is not currently bound to a
/// live fiber's host stack (e.g. freshly created, or resumed after an
/// interrupt that did not keep it running).
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedContext {
    pub gpr: [u32; 32],
    pub cr: u32,
    pub xer: u32,
    pub lr: u32,
    pub ctr: u32,
    pub nia: u32,
}

/// An opaque handle to a `ppc_sched::fiber::Fiber`, represented here as an
/// index into the scheduler's fiber table to avoid a dependency cycle
/// between `ppc-core` and `ppc-sched`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiberHandle(pub u32);

pub struct OSThread {
    pub id: u32,
    pub name: Option<String>,
    /// 0 = highest priority, 31 = lowest.
    pub base_priority: u8,
    pub suspend_counter: i32,
    pub state: ThreadState,
    pub affinity_mask: AffinityMask,
    pub entry_point: u32,
    pub stack_bottom: u32,
    pub stack_top: u32,
    pub saved_context: SavedContext,
    /// Created lazily the first time the thread is made runnable, dropped
    /// lazily after it exits (see ppc-sched's dead-context handshake).
    pub fiber: Option<FiberHandle>,
}

impl OSThread {
    pub fn new(id: u32, entry_point: u32, stack_bottom: u32, stack_top: u32) -> Self {
        Self {
            id,
            name: None,
            base_priority: 16,
            suspend_counter: 0,
            state: ThreadState::Ready,
            affinity_mask: u32::MAX,
            entry_point,
            stack_bottom,
            stack_top,
            saved_context: SavedContext::default(),
            fiber: None,
        }
    }

    pub fn is_runnable(&self, core: usize) -> bool {
        self.state == ThreadState::Ready
            && self.suspend_counter <= 0
            && self.affinity_mask & (1 << core) != 0
    }
}
