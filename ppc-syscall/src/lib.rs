//! System-call ("kernel-call") bridge.
//!
//! `sc` traps into the interpreter/JIT, which saves `gpr[1]` as the guest
//! "syscall stack head" and calls the registered handler for the carried
//! kernel-call number. Returning a different core index means the call
//! blocked and the scheduler picked a different runnable thread — ported
//! from decaf-emu's `kernel::initialise`/`OSExitThread` surface
//! (`kernel.cpp`), scoped here to the two demonstration handlers spec.md
//! needs to make S1 and S3 runnable end-to-end.

use std::collections::HashMap;
use std::sync::Arc;

use ppc_core::CoreState;
use ppc_sched::Scheduler;

pub mod handlers;

/// Kernel-call numbers used by the demonstration handlers.
pub mod kc {
    pub const EXIT: u32 = 1;
    pub const YIELD: u32 = 2;
}

/// What a handler wants to happen to the calling guest thread/core after
/// it returns.
pub enum Disposition {
    /// Continue executing on the same core.
    Continue,
    /// The calling thread terminated (reads the exit code from `gpr[3]`).
    ThreadExited { exit_code: i32 },
    /// The thread yielded; the scheduler may have switched in another
    /// runnable thread on this core.
    Yielded,
}

pub type Handler = fn(core: usize, state: &mut CoreState, scheduler: &Scheduler) -> Disposition;

/// Registry of kernel-call handlers, keyed by kernel-call number.
pub struct HandlerRegistry {
    handlers: HashMap<u32, Handler>,
    scheduler: Arc<Scheduler>,
}

impl HandlerRegistry {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        let mut registry = Self { handlers: HashMap::new(), scheduler };
        registry.register(kc::EXIT, handlers::exit_handler);
        registry.register(kc::YIELD, handlers::yield_handler);
        registry
    }

    pub fn register(&mut self, kc_num: u32, handler: Handler) {
        self.handlers.insert(kc_num, handler);
    }

    /// Dispatch an `sc` trap. The caller has already saved `gpr[1]` as the
    /// syscall stack head into `state.syscall_stack_head` before calling
    /// this (both the interpreter's `sc` handler and the JIT trampoline do
    /// this uniformly).
    pub fn dispatch(&self, core: usize, state: &mut CoreState, kc_num: u32) -> Disposition {
        match self.handlers.get(&kc_num) {
            Some(handler) => handler(core, state, &self.scheduler),
            None => {
                tracing::warn!(kc_num, "unhandled kernel-call number");
                Disposition::Continue
            }
        }
    }
}
