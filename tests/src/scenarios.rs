//! End-to-end scenario tests (S1-S6): the scheduler, JIT, breakpoints
//! and alarm service wired up together the way `ppc-emu`'s `main.rs`
//! wires them, rather than unit-tested in isolation.
//!
//! Each guest code sequence is hand-assembled the same way
//! `ppc-frontend`'s own `interp` tests do (see `add_then_halt`):
//! raw big-endian words poked straight into a `GuestMemory` mapping.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ppc_backend::X86_64CodeGen;
use ppc_core::{BreakpointKind, BreakpointTable, CoreState, GuestMemory, OSThread};
use ppc_exec::{resume_execution, ExecExit, PerCoreExec, SharedExec, TranslateLock};
use ppc_frontend::ppc::interp::{self, StepResult};
use ppc_sched::{AlarmService, Scheduler};
use ppc_syscall::{kc, Disposition, HandlerRegistry};

const CODE_CACHE_SIZE: usize = 1024 * 1024;

fn mem_with(code: &[u32]) -> GuestMemory {
    let mem = GuestMemory::new().unwrap();
    mem.mmap_fixed(0, 4096, libc::PROT_READ | libc::PROT_WRITE).unwrap();
    for (i, w) in code.iter().enumerate() {
        unsafe { mem.write_u32((i * 4) as u32, *w) };
    }
    mem
}

/// `tw 31,0,0`: unconditional trap, used the same way `ppc-emu --verify`
/// patches it in over a real instruction.
const TRAP_ALWAYS_INSN: u32 = 0x7FE0_0008;

/// Drives a core's `reschedule` the way `ppc-emu`'s per-core thread loop
/// does: each call returns once the whole chain of nested swaps it
/// triggers has unwound back to this, the idle level, which may be
/// before every queued thread has actually finished running (a
/// preempted or yielding thread stays parked on its own fiber stack
/// until a later call from here dispatches it again). Looping stands in
/// for that driver thread's `while running { ... }`; extra iterations
/// once both the ready queue and `current_thread` are empty are no-ops.
fn drain_core(scheduler: &Scheduler, core: usize, iterations: usize) {
    for _ in 0..iterations {
        scheduler.reschedule(core, false);
    }
}

/// S1: `li r3,2; li r4,3; add r3,r3,r4; sc` run through the real JIT
/// pipeline, dispatched through the syscall bridge, should exit the
/// guest thread with code 5 and leave the core idle.
#[test]
fn s1_add_then_exit_runs_to_completion() {
    let code = [
        0x3860_0002, // addi r3,r0,2
        0x3880_0003, // addi r4,r0,3
        0x7C63_2214, // add r3,r3,r4
        0x4400_0000, // sc
    ];
    let mem = Arc::new(mem_with(&code));
    let breakpoints = Arc::new(BreakpointTable::new());

    let backend = X86_64CodeGen::new();
    let shared = SharedExec::new(backend, CODE_CACHE_SIZE).expect("code cache reservation failed");
    let lock = Arc::new(TranslateLock::new(&shared.backend));

    let scheduler = Arc::new(Scheduler::new());
    scheduler.init_core_fiber(0);
    let registry = Arc::new(HandlerRegistry::new(Arc::clone(&scheduler)));

    let thread = Arc::new(Mutex::new(OSThread::new(1, 0, 0, 0)));
    let exit_code: Arc<Mutex<Option<i32>>> = Arc::new(Mutex::new(None));

    let entry_mem = Arc::clone(&mem);
    let entry_breakpoints = Arc::clone(&breakpoints);
    let entry_shared = Arc::clone(&shared);
    let entry_lock = Arc::clone(&lock);
    let entry_scheduler = Arc::clone(&scheduler);
    let entry_registry = Arc::clone(&registry);
    let entry_exit_code = Arc::clone(&exit_code);

    scheduler.queue_thread(
        Arc::clone(&thread),
        move || {
            let mut state = CoreState::new(0);
            state.guest_base = entry_mem.guest_base() as u64;
            let mut per_core = PerCoreExec::default();

            loop {
                // SAFETY: this fiber owns `state` exclusively; no other
                // fiber runs concurrently with it on this core.
                let exit = unsafe {
                    resume_execution(&entry_shared, &entry_lock, &entry_mem, &entry_breakpoints, &mut state, &mut per_core)
                };
                match exit {
                    ExecExit::Continue => continue,
                    ExecExit::FatalTrap(addr) => panic!("unexpected fatal trap at {addr:#010x}"),
                    ExecExit::Syscall => {
                        let kc_num = state.gpr[0];
                        if kc_num == kc::EXIT {
                            *entry_exit_code.lock().unwrap() = Some(state.gpr[3] as i32);
                        }
                        match entry_registry.dispatch(0, &mut state, kc_num) {
                            Disposition::ThreadExited { .. } => {
                                unreachable!("exit_thread_no_lock never returns control here")
                            }
                            Disposition::Continue | Disposition::Yielded => {}
                        }
                    }
                }
            }
        },
        |_| {},
    );

    scheduler.reschedule(0, false);

    assert_eq!(*exit_code.lock().unwrap(), Some(5));
    assert!(scheduler.current_thread(0).is_none());
}

/// S2: a higher-priority thread queued while the current one is
/// running preempts it at the next `reschedule` boundary; the displaced
/// thread stays `Ready` and observably back in the queue.
#[test]
fn s2_higher_priority_thread_preempts_and_requeues_current() {
    let scheduler = Arc::new(Scheduler::new());
    scheduler.init_core_fiber(0);

    let low = Arc::new(Mutex::new(OSThread::new(1, 0, 0, 0)));
    low.lock().unwrap().base_priority = 20;
    let high = Arc::new(Mutex::new(OSThread::new(2, 0, 0, 0)));
    high.lock().unwrap().base_priority = 5;

    let high_ran = Arc::new(AtomicU32::new(0));
    let low_resumed = Arc::new(AtomicU32::new(0));

    let entry_scheduler = Arc::clone(&scheduler);
    let entry_high_ran = Arc::clone(&high_ran);
    let make_high = move || {
        entry_high_ran.store(1, Ordering::SeqCst);
        entry_scheduler.exit_thread_no_lock(0);
        unreachable!("exit_thread_no_lock never returns control here");
    };

    let entry_scheduler = Arc::clone(&scheduler);
    let entry_high_thread = Arc::clone(&high);
    let entry_low_resumed = Arc::clone(&low_resumed);
    let make_low = move || {
        // Simulate the low-priority thread being interrupted mid-run:
        // queue the higher-priority thread, then hit a reschedule
        // boundary exactly as a timer interrupt would.
        entry_scheduler.queue_thread(Arc::clone(&entry_high_thread), make_high, |_| {});
        entry_scheduler.reschedule(0, false);
        // Control returns here once `high` has exited and nothing else
        // outranks `low`.
        entry_low_resumed.store(1, Ordering::SeqCst);
        entry_scheduler.exit_thread_no_lock(0);
        unreachable!("exit_thread_no_lock never returns control here");
    };

    scheduler.queue_thread(Arc::clone(&low), make_low, |_| {});
    // First call dispatches `low`, which preempts to `high` mid-run and
    // parks itself back in the ready queue; the second call is what
    // actually resumes `low` after `high` has exited.
    drain_core(&scheduler, 0, 3);

    assert_eq!(high_ran.load(Ordering::SeqCst), 1);
    assert_eq!(low_resumed.load(Ordering::SeqCst), 1);
    assert!(scheduler.current_thread(0).is_none());
}

/// S3: two equal-priority threads; a voluntary yield hands the core to
/// the other ready thread and the yielding thread goes back onto the
/// tail of the ready queue (FIFO among equal priorities).
#[test]
fn s3_yield_transfers_to_equal_priority_thread() {
    let scheduler = Arc::new(Scheduler::new());
    scheduler.init_core_fiber(0);

    let a = Arc::new(Mutex::new(OSThread::new(1, 0, 0, 0)));
    let b = Arc::new(Mutex::new(OSThread::new(2, 0, 0, 0)));

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let entry_scheduler = Arc::clone(&scheduler);
    let entry_order = Arc::clone(&order);
    let make_b = move || {
        entry_order.lock().unwrap().push("b");
        entry_scheduler.exit_thread_no_lock(0);
        unreachable!("exit_thread_no_lock never returns control here");
    };

    let entry_scheduler = Arc::clone(&scheduler);
    let entry_b_thread = Arc::clone(&b);
    let entry_order = Arc::clone(&order);
    let make_a = move || {
        entry_order.lock().unwrap().push("a-before-yield");
        entry_scheduler.queue_thread(Arc::clone(&entry_b_thread), make_b, |_| {});
        entry_scheduler.reschedule(0, true);
        entry_order.lock().unwrap().push("a-after-yield");
        entry_scheduler.exit_thread_no_lock(0);
        unreachable!("exit_thread_no_lock never returns control here");
    };

    scheduler.queue_thread(Arc::clone(&a), make_a, |_| {});
    // First call dispatches `a`, which yields to `b` mid-run and parks
    // itself back at the tail of the ready queue; the second call is
    // what resumes `a` after `b` has exited.
    drain_core(&scheduler, 0, 3);

    assert_eq!(*order.lock().unwrap(), vec!["a-before-yield", "b", "a-after-yield"]);
}

/// S4: the alarm service raises the per-core ALARM interrupt once the
/// deadline set with `set_next_alarm` has passed.
#[test]
fn s4_alarm_fires_after_deadline() {
    let svc = Arc::new(AlarmService::new());
    let fired = Arc::new(AtomicU32::new(0));
    let fired2 = Arc::clone(&fired);
    let handle = svc.spawn(move |core| {
        assert_eq!(core, 0);
        fired2.fetch_add(1, Ordering::SeqCst);
    });

    svc.set_next_alarm(0, Instant::now() + Duration::from_millis(10));
    std::thread::sleep(Duration::from_millis(100));
    assert!(fired.load(Ordering::SeqCst) >= 1);

    svc.stop();
    handle.join().unwrap();
}

/// S5: a breakpoint patched over a `nop` traps into the interpreter,
/// which restores and re-executes the original instruction before
/// handing back a `Trap` the driving loop advances past exactly like a
/// normal step.
#[test]
fn s5_breakpoint_then_continue_executes_original_instruction() {
    let nop = 0x6000_0000; // ori r0,r0,0
    let code = [nop, nop, nop];
    let mem = mem_with(&code);
    let breakpoints = BreakpointTable::new();

    let bp_addr = 4u32;
    unsafe { mem.write_u32(bp_addr, TRAP_ALWAYS_INSN) };
    breakpoints.add(bp_addr, BreakpointKind::SingleFire, nop);

    let mut state = CoreState::new(0);
    let mut hit_breakpoint = false;

    for _ in 0..3 {
        match interp::step(&mut state, &mem, &breakpoints) {
            StepResult::Continue => {}
            StepResult::Trap => {
                hit_breakpoint = true;
                state.cia = state.nia;
            }
            other => panic!("unexpected step result: {other:?}"),
        }
    }

    assert!(hit_breakpoint, "breakpoint at {bp_addr:#010x} never fired");
    assert_eq!(state.cia, 12);
}

/// S6: a `b` trampoline installed over a previously-compiled block
/// aliases the target's block index instead of triggering a second
/// compile.
#[test]
fn s6_trampoline_aliases_existing_block_without_recompiling() {
    // G: addi r3,r0,7 ; tw 31,0,0 (forces a fatal trap so the block's
    // extent is bounded and deterministic).
    let target = 64u32;
    let mem = Arc::new(GuestMemory::new().unwrap());
    mem.mmap_fixed(0, 4096, libc::PROT_READ | libc::PROT_WRITE).unwrap();
    unsafe {
        mem.write_u32(target, 0x3860_0007); // addi r3,r0,7
        mem.write_u32(target + 4, TRAP_ALWAYS_INSN);
    }
    let breakpoints = Arc::new(BreakpointTable::new());

    let backend = X86_64CodeGen::new();
    let shared = SharedExec::new(backend, CODE_CACHE_SIZE).expect("code cache reservation failed");
    let lock = TranslateLock::new(&shared.backend);

    let mut state = CoreState::new(0);
    state.guest_base = mem.guest_base() as u64;
    state.nia = target;
    let mut per_core = PerCoreExec::default();

    let exit = unsafe { resume_execution(&shared, &lock, &mem, &breakpoints, &mut state, &mut per_core) };
    assert_eq!(exit, ExecExit::FatalTrap(target + 4));
    assert_eq!(shared.code_cache.len(), 1);
    let target_idx = match shared.code_cache.state(target) {
        ppc_exec::SlotState::Valid(idx) => idx,
        other => panic!("expected target block to be valid, got {other:?}"),
    };

    // F: an unconditional branch stub to `target`.
    let stub = 256u32;
    let li_field = target.wrapping_sub(stub) & 0x03FF_FFFC;
    let branch = 0x4800_0000 | li_field;
    unsafe { mem.write_u32(stub, branch) };

    state.cia = stub;
    state.nia = stub;
    let exit = unsafe { resume_execution(&shared, &lock, &mem, &breakpoints, &mut state, &mut per_core) };
    assert_eq!(exit, ExecExit::FatalTrap(target + 4));
    assert_eq!(shared.code_cache.len(), 1, "trampoline must alias, not recompile");
    match shared.code_cache.state(stub) {
        ppc_exec::SlotState::Valid(idx) => assert_eq!(idx, target_idx),
        other => panic!("expected stub to alias target's block, got {other:?}"),
    }
}
