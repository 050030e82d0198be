//! `ppc-emu`: thin CLI wrapper around the tri-core Espresso execution
//! core. Loads a bare-metal PowerPC image, runs it to completion or a
//! fatal trap, and exits.
//!
//! Grounded in the teacher's `linux-user/src/main.rs`: same
//! load-image → set-up-state → run-to-exit shape, generalized from a
//! single RV64 `LinuxCpu` wrapper into three cores driven by
//! `ppc_sched`'s fiber scheduler.

use std::cell::Cell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicPtr, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::Parser;

use ppc_backend::X86_64CodeGen;
use ppc_core::thread::SavedContext;
use ppc_core::{interrupt_bits, BreakpointKind, BreakpointTable, CoreState, GuestMemory, OSThread};
use ppc_exec::{resume_execution, ExecExit, ExecStats, PerCoreExec, SharedExec, TranslateLock};
use ppc_sched::{AlarmService, Scheduler, NUM_CORES};
use ppc_syscall::{kc, Disposition, HandlerRegistry};

const CODE_CACHE_SIZE: usize = 16 * 1024 * 1024;

/// Unconditional PowerPC trap: `tw 31, r0, r0` (opcode 31, TO field 31
/// means "always trap", xo 4). Patched into guest memory for
/// `--verify`; the word it replaces is kept in the `Breakpoint` so the
/// interpreter can restore and re-execute it once the breakpoint fires.
const TRAP_ALWAYS_INSN: u32 = 0x7FE0_0008;

const PROFILE_SYSCALL: u32 = 1 << 1;
const PROFILE_INTERRUPT: u32 = 1 << 2;

thread_local! {
    /// Which core this *native* thread is currently driving. A guest
    /// thread's closure reads this instead of capturing a core index,
    /// since the scheduler's ready queue is shared across cores: the
    /// same queued fiber may be picked up by a different core's driver
    /// than the one that originally created it. The thread local
    /// reflects whichever host thread is actually running the fiber's
    /// code at the moment it's read, which a captured value cannot.
    static CURRENT_CORE: Cell<usize> = Cell::new(0);
}

#[derive(Parser, Debug)]
#[command(name = "ppc-emu", about = "Tri-core PowerPC (Espresso) JIT emulation core")]
struct Args {
    /// Path to a bare-metal PowerPC ELF32 big-endian image.
    image: PathBuf,

    /// Print per-core execution stats on exit.
    #[arg(long)]
    stats: bool,

    /// Hex bitmask selecting which diagnostic categories (syscall
    /// dispatch, interrupt delivery) emit trace-level logs, independent
    /// of `RUST_LOG`'s level filter.
    #[arg(long, value_name = "HEX")]
    profile_mask: Option<String>,

    /// Patch a trap instruction at the given guest address (hex,
    /// `0x`-prefixed) so every hit forces an interpreter step there.
    /// With no address, registers the flag but arms nothing.
    #[arg(long, value_name = "ADDR", num_args = 0..=1, default_missing_value = "")]
    verify: Option<String>,

    /// Increase log verbosity (equivalent to `RUST_LOG=debug`).
    #[arg(short, long)]
    verbose: bool,
}

fn parse_hex(s: &str) -> u32 {
    u32::from_str_radix(s.trim_start_matches("0x"), 16).expect("invalid hex value")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Raw pointer to a core's live [`CoreState`], published by whichever
/// guest thread is currently running there so the alarm thread can
/// raise interrupts into it. Null while the core is idle.
struct ActiveCoreStates([AtomicPtr<CoreState>; NUM_CORES]);

impl ActiveCoreStates {
    fn new() -> Self {
        Self(std::array::from_fn(|_| AtomicPtr::new(std::ptr::null_mut())))
    }

    fn publish(&self, core: usize, state: *mut CoreState) {
        self.0[core].store(state, Ordering::Release);
    }

    fn raise(&self, core: usize) {
        let ptr = self.0[core].load(Ordering::Acquire);
        if let Some(state) = unsafe { ptr.as_ref() } {
            state.pending_interrupts.fetch_or(interrupt_bits::ALARM, Ordering::Release);
        }
    }
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let profile_mask = args.profile_mask.as_deref().map(parse_hex).unwrap_or(0);
    tracing::debug!(profile_mask, "profiling mask");

    let mem = Arc::new(GuestMemory::new().expect("failed to reserve guest address space"));
    let image = ppc_emu::load_image(&args.image, &mem).unwrap_or_else(|e| {
        eprintln!("failed to load {}: {e}", args.image.display());
        std::process::exit(1);
    });

    let backend = X86_64CodeGen::new();
    let shared = SharedExec::new(backend, CODE_CACHE_SIZE).expect("failed to reserve code cache");
    let lock = Arc::new(TranslateLock::new(&shared.backend));
    let breakpoints = Arc::new(BreakpointTable::new());

    if let Some(addr) = args.verify.as_deref() {
        if addr.is_empty() {
            tracing::info!("--verify given with no address; no breakpoint armed");
        } else {
            let addr = parse_hex(addr);
            // SAFETY: the loader mapped every PT_LOAD segment readable
            // and writable before this point.
            let original = unsafe { mem.read_u32(addr) };
            unsafe { mem.write_u32(addr, TRAP_ALWAYS_INSN) };
            breakpoints.add(addr, BreakpointKind::MultiFire, original);
            ppc_exec::invalidate_range(&shared, addr, 4);
            tracing::info!(addr = format!("{addr:#010x}"), "breakpoint armed");
        }
    }

    let scheduler = Arc::new(Scheduler::new());
    let alarm = Arc::new(AlarmService::new());
    let registry = Arc::new(HandlerRegistry::new(Arc::clone(&scheduler)));
    let active_states = Arc::new(ActiveCoreStates::new());
    let running = Arc::new(AtomicBool::new(true));
    let exit_code = Arc::new(AtomicI32::new(0));
    let stats_slots: Arc<Mutex<Vec<Option<ExecStats>>>> =
        Arc::new(Mutex::new((0..NUM_CORES).map(|_| None).collect()));

    {
        let raise_states = Arc::clone(&active_states);
        alarm.spawn(move |core| raise_states.raise(core));
    }

    let entry_thread = {
        let mut t = OSThread::new(1, image.entry, image.stack_bottom, image.stack_top);
        t.saved_context = SavedContext { nia: image.entry, ..SavedContext::default() };
        t.saved_context.gpr[1] = image.stack_top;
        Arc::new(Mutex::new(t))
    };

    let make_entry = {
        let shared = Arc::clone(&shared);
        let lock = Arc::clone(&lock);
        let mem = Arc::clone(&mem);
        let breakpoints = Arc::clone(&breakpoints);
        let scheduler = Arc::clone(&scheduler);
        let registry = Arc::clone(&registry);
        let active_states = Arc::clone(&active_states);
        let running = Arc::clone(&running);
        let exit_code = Arc::clone(&exit_code);
        let stats_slots = Arc::clone(&stats_slots);
        let entry_thread = Arc::clone(&entry_thread);

        move || {
            let mut state = CoreState::new(0);
            {
                let t = entry_thread.lock().unwrap();
                state.gpr = t.saved_context.gpr;
                state.cr = t.saved_context.cr;
                state.xer = t.saved_context.xer;
                state.lr = t.saved_context.lr;
                state.ctr = t.saved_context.ctr;
                state.nia = t.saved_context.nia;
            }
            state.guest_base = mem.guest_base() as u64;

            let mut per_core = PerCoreExec::default();
            let core = CURRENT_CORE.with(|c| c.get());
            active_states.publish(core, &mut state as *mut CoreState);

            loop {
                let core = CURRENT_CORE.with(|c| c.get());

                let pending = state.pending_interrupts.swap(0, Ordering::Acquire);
                if pending != 0 && profile_mask & PROFILE_INTERRUPT != 0 {
                    tracing::trace!(core, pending, "interrupt delivered");
                }

                // SAFETY: `state` is this fiber's own architectural
                // state, not shared with any other concurrently-running
                // fiber; this core's driver thread is the only one that
                // can be executing this closure at a time.
                let exit = unsafe { resume_execution(&shared, &lock, &mem, &breakpoints, &mut state, &mut per_core) };

                match exit {
                    ExecExit::Continue => {
                        // Give a higher-priority ready thread (if any
                        // was queued onto this core meanwhile) a chance
                        // to preempt; with nothing else ready this is a
                        // cheap no-op per `reschedule`'s early return.
                        scheduler.reschedule(core, false);
                    }
                    ExecExit::Syscall => {
                        let kc_num = state.gpr[0];
                        if profile_mask & PROFILE_SYSCALL != 0 {
                            tracing::trace!(core, kc_num, "syscall dispatch");
                        }
                        if kc_num == kc::EXIT {
                            exit_code.store(state.gpr[3] as i32, Ordering::Release);
                            stats_slots.lock().unwrap()[core] = Some(std::mem::take(&mut per_core.stats));
                            running.store(false, Ordering::Release);
                        }
                        match registry.dispatch(core, &mut state, kc_num) {
                            Disposition::Continue | Disposition::Yielded => {}
                            Disposition::ThreadExited { .. } => {
                                unreachable!("exit_thread_no_lock never returns control here")
                            }
                        }
                    }
                    ExecExit::FatalTrap(addr) => {
                        tracing::error!(core, addr = format!("{addr:#010x}"), "fatal trap");
                        exit_code.store(101, Ordering::Release);
                        stats_slots.lock().unwrap()[core] = Some(std::mem::take(&mut per_core.stats));
                        running.store(false, Ordering::Release);
                        scheduler.exit_thread_no_lock(core);
                        unreachable!("exit_thread_no_lock never returns control here");
                    }
                }
            }
        }
    };

    scheduler.queue_thread(Arc::clone(&entry_thread), make_entry, |_core| {});

    let mut handles = Vec::with_capacity(NUM_CORES);
    for core in 0..NUM_CORES {
        let scheduler = Arc::clone(&scheduler);
        let running = Arc::clone(&running);
        handles.push(
            thread::Builder::new()
                .name(format!("ppc-core-{core}"))
                .spawn(move || {
                    CURRENT_CORE.with(|c| c.set(core));
                    scheduler.init_core_fiber(core);
                    while running.load(Ordering::Acquire) {
                        scheduler.reschedule(core, false);
                        thread::sleep(Duration::from_millis(1));
                    }
                })
                .expect("failed to spawn core driver thread"),
        );
    }

    for h in handles {
        let _ = h.join();
    }
    alarm.stop();

    if args.stats {
        let slots = stats_slots.lock().unwrap();
        for (core, stats) in slots.iter().enumerate() {
            if let Some(stats) = stats {
                eprintln!("-- core {core} --");
                eprint!("{stats}");
            }
        }
    }

    std::process::exit(exit_code.load(Ordering::Acquire));
}
