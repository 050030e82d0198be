//! Demonstration kernel-call handlers.
//!
//! Grounded in decaf-emu's `kernel::initialise`/`OSExitThread` pair
//! (`kernel.cpp`): enough observable kernel surface to run a single
//! thread to completion (`exit_handler`) or hand control to another
//! ready thread on the same core (`yield_handler`), without modeling
//! any further HLE surface.

use ppc_core::CoreState;
use ppc_sched::Scheduler;

use crate::Disposition;

/// `kc::EXIT`: reads the exit code from `gpr[3]` and terminates the
/// calling guest thread. The scheduler removes it from the ready queue
/// and switches in whatever is runnable next (or the core's idle fiber).
pub fn exit_handler(core: usize, state: &mut CoreState, scheduler: &Scheduler) -> Disposition {
    let exit_code = state.gpr[3] as i32;
    tracing::info!(core, exit_code, "guest thread exited");
    scheduler.exit_thread_no_lock(core);
    Disposition::ThreadExited { exit_code }
}

/// `kc::YIELD`: voluntarily gives up the core to an equal-or-higher
/// priority ready thread, per `reschedule(yielding = true)`'s transfer
/// rule. Returns once this thread is resumed.
pub fn yield_handler(core: usize, _state: &mut CoreState, scheduler: &Scheduler) -> Disposition {
    scheduler.reschedule(core, true);
    Disposition::Yielded
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppc_core::OSThread;
    use std::sync::{Arc, Mutex};

    #[test]
    fn exit_handler_reads_gpr3_and_clears_core() {
        // `exit_handler` calls `scheduler.exit_thread_no_lock`, which
        // diverges via `swapcontext` and never returns to its caller —
        // matching how it behaves at runtime, this entry closure must
        // call it from inside the fiber and never fall off the end, not
        // call it from the test's own stack after the fact.
        let scheduler = Arc::new(Scheduler::new());
        scheduler.init_core_fiber(0);

        let thread = OSThread::new(1, 0, 0, 0);
        let thread = Arc::new(Mutex::new(thread));

        let captured_exit: Arc<Mutex<Option<i32>>> = Arc::new(Mutex::new(None));
        let entry_scheduler = Arc::clone(&scheduler);
        let entry_captured = Arc::clone(&captured_exit);
        scheduler.queue_thread(
            Arc::clone(&thread),
            move || {
                let mut state = CoreState::new(0);
                state.gpr[3] = 42;
                *entry_captured.lock().unwrap() = Some(state.gpr[3] as i32);
                let _ = exit_handler(0, &mut state, &entry_scheduler);
                unreachable!("exit_thread_no_lock never returns control here");
            },
            |_| {},
        );
        scheduler.reschedule(0, false);

        assert_eq!(*captured_exit.lock().unwrap(), Some(42));
        assert!(scheduler.current_thread(0).is_none());
    }
}
