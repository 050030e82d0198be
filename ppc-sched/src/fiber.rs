//! Stackful fiber built on POSIX `ucontext_t`.
//!
//! The teacher's dependency graph already takes `libc` everywhere; rather
//! than pull in an unrelated stackful-coroutine crate, this uses
//! `getcontext`/`makecontext`/`swapcontext` directly, matching how the
//! teacher treats `libc` as the one low-level escape hatch (see
//! `x86_64/emitter.rs`'s raw syscall/mmap use). Guest threads need a real
//! host stack because their call stack holds PowerPC return addresses
//! across cooperative switches, including migration to a different host
//! OS thread — a futures/async model cannot host that.

use std::mem::MaybeUninit;

const STACK_SIZE: usize = 1024 * 1024;

/// A suspended or running host-stack continuation bound to one guest
/// thread. Matches decaf-emu's `platform::Fiber` (`kernel_fibers.cpp`).
pub struct Fiber {
    context: Box<libc::ucontext_t>,
    _stack: Vec<u8>,
    entry: Option<Box<dyn FnOnce() + Send + 'static>>,
}

// SAFETY: `ucontext_t` carries raw pointers into `_stack`, which `Fiber`
// owns outright, and into no other thread's memory. The scheduler lock
// guarantees only one host thread ever touches a given `Fiber` (via
// `swap_to`) at a time, so moving the whole struct to the thread that
// will next swap into it is sound. `entry` is constrained to `Send`
// above so this doesn't smuggle non-Send data across the move.
unsafe impl Send for Fiber {}

thread_local! {
    static CURRENT_ENTRY: std::cell::RefCell<Option<Box<dyn FnOnce() + Send>>> = std::cell::RefCell::new(None);
}

extern "C" fn trampoline() {
    let f = CURRENT_ENTRY.with(|cell| cell.borrow_mut().take());
    if let Some(f) = f {
        f();
    }
}

impl Fiber {
    /// Create a fiber whose stack is not yet initialized as a runnable
    /// context — used for the "idle fiber" that simply records the host
    /// thread's own execution context (see `Scheduler::init_core_fiber`).
    pub fn current_thread_context() -> Self {
        let mut ctx = Box::new(unsafe { MaybeUninit::<libc::ucontext_t>::zeroed().assume_init() });
        unsafe {
            libc::getcontext(ctx.as_mut());
        }
        Self { context: ctx, _stack: Vec::new(), entry: None }
    }

    /// Create a fiber that will run `entry` the first time it is swapped
    /// into, via `makecontext`.
    pub fn new(entry: impl FnOnce() + Send + 'static) -> Self {
        let mut stack = vec![0u8; STACK_SIZE];
        let mut ctx = Box::new(unsafe { MaybeUninit::<libc::ucontext_t>::zeroed().assume_init() });
        unsafe {
            libc::getcontext(ctx.as_mut());
            ctx.uc_stack.ss_sp = stack.as_mut_ptr() as *mut libc::c_void;
            ctx.uc_stack.ss_size = stack.len();
            // Patched to the real caller's context on every `swap_to`
            // below — left null here only because no caller exists yet.
            ctx.uc_link = std::ptr::null_mut();
            libc::makecontext(ctx.as_mut(), trampoline, 0);
        }
        Self { context: ctx, _stack: stack, entry: Some(Box::new(entry)) }
    }

    /// Swap from `from` into `self`. On the very first switch into a
    /// freshly-created fiber, installs its entry closure into the
    /// thread-local the trampoline reads.
    ///
    /// Every swap repoints `self`'s `uc_link` at `from`'s context first:
    /// an entry closure that returns normally (rather than diverging
    /// through the scheduler) falls off the end of `trampoline`, and
    /// glibc resumes whatever `uc_link` names — `from` is the only
    /// context guaranteed to still be valid and waiting at that point,
    /// since it's the one that swapped into `self` in the first place.
    ///
    /// # Safety
    /// `from` must be the context of the currently running fiber/thread;
    /// both contexts must remain alive until the swap returns.
    pub unsafe fn swap_to(&mut self, from: &mut Fiber) {
        if let Some(entry) = self.entry.take() {
            CURRENT_ENTRY.with(|cell| *cell.borrow_mut() = Some(entry));
        }
        self.context.uc_link = from.context.as_mut() as *mut libc::ucontext_t;
        libc::swapcontext(from.context.as_mut(), self.context.as_ref());
    }
}
