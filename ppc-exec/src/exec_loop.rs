//! Lookup → translate → execute cycle for one core, plus the
//! authoritative-interpreter fallback.
//!
//! Grounded in decaf-emu's `jit_binrec.cpp` (`getCodeBlock`,
//! `resumeExecution`): the seven-step translation protocol (state
//! check, breakpoint gate, trampoline following, shrinking translation
//! limit, publish) and the per-iteration profiling/interrupt wrap.

use std::sync::Mutex;

use ppc_backend::translate::translate;
use ppc_backend::HostCodeGen;
use ppc_core::tb::TranslationBlock;
use ppc_core::{BreakpointTable, Context, CoreState, GuestMemory};
use ppc_frontend::ppc::{interp, register_globals, PpcDisasContext, PpcGlobals, PpcTranslator};
use ppc_frontend::translator_loop;
use thiserror::Error;

use crate::code_cache::SlotState;
use crate::{PerCoreExec, SharedExec};

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("code arena exhausted while translating block at {address:#010x}")]
    ArenaExhausted { address: u32 },
}

const INITIAL_LIMIT_BYTES: u32 = 4096;
const MIN_LIMIT_BYTES: u32 = 256;
const MAX_TRAMPOLINE_HOPS: u32 = 10;

/// Translation context shared by every core's compiler, serializing
/// code generation the same way the teacher's `translate_lock` does
/// (IR construction and code emission are not reentrant).
pub struct TranslateLock {
    ir: Mutex<Context>,
    globals: PpcGlobals,
}

impl TranslateLock {
    pub fn new(backend: &impl HostCodeGen) -> Self {
        let mut ir = Context::new();
        backend.init_context(&mut ir);
        let globals = register_globals(&mut ir);
        Self { ir: Mutex::new(ir), globals }
    }
}

/// Why [`resume_execution`] returned control to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecExit {
    /// `sc` was hit; `gpr[0]` holds the kernel-call number and
    /// `syscall_stack_head` has already been saved. The caller must
    /// dispatch through the syscall registry and call
    /// [`resume_execution`] again.
    Syscall,
    /// The interpreter hit an unrecoverable trap at this guest address.
    FatalTrap(u32),
    /// One iteration completed normally; the caller should check
    /// pending interrupts / scheduler state before calling again.
    Continue,
}

/// Follow up to [`MAX_TRAMPOLINE_HOPS`] unconditional-branch stubs
/// before settling on the address to translate or interpret.
fn follow_trampolines(mem: &GuestMemory, mut address: u32) -> u32 {
    for _ in 0..MAX_TRAMPOLINE_HOPS {
        let word = unsafe { mem.read_u32(address) };
        if word & 0xFC00_0003 != 0x4800_0000 {
            break;
        }
        let li = ((word & 0x03FF_FFFC) as i32) << 6 >> 6;
        address = address.wrapping_add(li as u32);
    }
    address
}

/// Resolve the block for `address`: valid → return it; compiling →
/// spin until resolved; error or breakpointed → `None` (interpret this
/// address instead); uncompiled → attempt translation.
///
/// The CAS/breakpoint-check/compile protocol always runs against
/// `address` itself, not whatever a trampoline at `address` resolves to:
/// `address`'s own slot must end up either holding a real compiled block
/// or aliasing the resolved target's block index, never left untouched
/// while the protocol operates on a different address entirely.
fn get_block<B: HostCodeGen>(
    shared: &SharedExec<B>,
    lock: &TranslateLock,
    mem: &GuestMemory,
    breakpoints: &BreakpointTable,
    address: u32,
) -> Option<usize> {
    loop {
        match shared.code_cache.state(address) {
            SlotState::Valid(idx) => return Some(idx),
            SlotState::Error => return None,
            SlotState::Compiling => {
                std::hint::spin_loop();
                continue;
            }
            SlotState::Uncompiled => {
                if breakpoints.has_breakpoint(address) {
                    return None;
                }
                if !shared.code_cache.try_begin_compile(address) {
                    continue;
                }

                let target = follow_trampolines(mem, address);
                if target == address {
                    return match translate_block(shared, lock, mem, address) {
                        Ok(idx) => Some(idx),
                        Err(_) => {
                            shared.code_cache.mark_error(address);
                            None
                        }
                    };
                }

                // `address` is a pure trampoline stub. Resolve the real
                // target through the same protocol, then alias
                // `address`'s own slot to whatever block index that
                // settles on — never registering a block under `address`
                // itself.
                return match get_block(shared, lock, mem, breakpoints, target) {
                    Some(target_idx) => {
                        shared.code_cache.publish_valid(address, target_idx);
                        Some(target_idx)
                    }
                    None => {
                        shared.code_cache.mark_error(address);
                        None
                    }
                };
            }
        }
    }
}

/// Rough upper bound on host bytes a single translated guest
/// instruction can expand to, used to decide whether a block fits the
/// remaining code arena before committing to it.
const HOST_BYTES_PER_INSN_ESTIMATE: usize = 64;

/// Translate starting at `address` with a guest-instruction budget
/// derived from `limit`, starting at [`INITIAL_LIMIT_BYTES`] and
/// halving down to [`MIN_LIMIT_BYTES`] whenever the translated block
/// would not fit the remaining code arena.
fn translate_block<B: HostCodeGen>(
    shared: &SharedExec<B>,
    lock: &TranslateLock,
    mem: &GuestMemory,
    address: u32,
) -> Result<usize, TranslateError> {
    let mut limit = INITIAL_LIMIT_BYTES;
    loop {
        let mut ir = lock.ir.lock().unwrap();
        ir.reset();

        let mut ctx = PpcDisasContext::new(address as u64, mem.guest_base(), lock.globals);
        ctx.base.max_insns = (limit / 4).max(1);
        translator_loop::<PpcTranslator>(&mut ctx, &mut ir);
        let icount = ctx.base.num_insns;
        let guest_size = (ctx.base.pc_next - ctx.base.pc_first) as u32;

        let needed = icount as usize * HOST_BYTES_PER_INSN_ESTIMATE;
        if shared.code_cache.code_remaining() < needed {
            drop(ir);
            if limit <= MIN_LIMIT_BYTES {
                return Err(TranslateError::ArenaExhausted { address });
            }
            limit = (limit / 2).max(MIN_LIMIT_BYTES);
            continue;
        }

        let mut tb = TranslationBlock::new(address as u64, 0, 0);
        tb.size = guest_size;
        tb.icount = icount as u16;

        let idx = shared.code_cache.register_block(address, tb, |buf| {
            let tb_start = translate(&mut *ir, &shared.backend, buf);
            let host_size = buf.offset() - tb_start;
            (tb_start, host_size)
        });

        // This implementation's scoped opcode subset never compiles a
        // floating-point op (paired-single stays interpreter-only), so
        // host FPU exception flags are never touched by generated code
        // and there is nothing to clear here.

        return Ok(idx);
    }
}

/// Run compiled code for `idx`, returning the `exit_tb` value.
///
/// # Safety
/// `env_ptr` must point to a valid `CoreState` matching the globals
/// registered in the translation context.
unsafe fn run_block<B: HostCodeGen>(shared: &SharedExec<B>, idx: usize, env_ptr: *mut u8) -> u64 {
    let tb_ptr = shared.code_cache.block_code_ptr(idx);
    let prologue: unsafe extern "C" fn(*mut u8, *const u8) -> u64 =
        std::mem::transmute(shared.code_cache.code_base_ptr());
    prologue(env_ptr, tb_ptr)
}

/// Run one unit of guest execution for the core bound to `state`:
/// either a full compiled block or, when the JIT can't or shouldn't
/// handle the current address, a single interpreted instruction.
///
/// # Safety
/// `state` must be the `CoreState` this core's translated code and
/// interpreter both operate on; no other thread may mutate it
/// concurrently.
pub unsafe fn resume_execution<B: HostCodeGen>(
    shared: &SharedExec<B>,
    lock: &TranslateLock,
    mem: &GuestMemory,
    breakpoints: &BreakpointTable,
    state: &mut CoreState,
    per_core: &mut PerCoreExec,
) -> ExecExit {
    per_core.stats.loop_iters += 1;
    let pc = state.nia;

    match get_block(shared, lock, mem, breakpoints, pc) {
        Some(idx) => {
            per_core.stats.index_hit += 1;
            let env_ptr = state as *mut CoreState as *mut u8;
            let exit_val = run_block(shared, idx, env_ptr);
            match exit_val {
                ppc_frontend::ppc::trans::EXIT_SYSCALL => {
                    state.syscall_stack_head = state.gpr[1];
                    ExecExit::Syscall
                }
                ppc_frontend::ppc::trans::EXIT_INTERPRET => {
                    // `nia` now holds the address of the one instruction
                    // outside the JIT-compilable subset that stopped
                    // this TB; the surrounding block is otherwise valid
                    // and stays cached, so only this instruction steps
                    // through the interpreter before resuming the JIT.
                    per_core.stats.interpret_steps += 1;
                    match interp::step(state, mem, breakpoints) {
                        interp::StepResult::Continue => ExecExit::Continue,
                        interp::StepResult::SystemCall => {
                            state.syscall_stack_head = state.gpr[1];
                            ExecExit::Syscall
                        }
                        interp::StepResult::Trap => ExecExit::Continue,
                        interp::StepResult::FatalTrap { address } => {
                            ExecExit::FatalTrap(address)
                        }
                    }
                }
                _ => ExecExit::Continue,
            }
        }
        None => {
            per_core.stats.interpret_steps += 1;
            match interp::step(state, mem, breakpoints) {
                interp::StepResult::Continue => ExecExit::Continue,
                interp::StepResult::SystemCall => {
                    state.syscall_stack_head = state.gpr[1];
                    ExecExit::Syscall
                }
                interp::StepResult::Trap => ExecExit::Continue,
                interp::StepResult::FatalTrap { address } => ExecExit::FatalTrap(address),
            }
        }
    }
}

/// Invalidate every compiled block whose guest range overlaps
/// `[address, address + len)`. Used by self-modifying-code writes.
pub fn invalidate_range<B: HostCodeGen>(shared: &SharedExec<B>, address: u32, len: u32) {
    let mut a = address & !0x3;
    let end = address.wrapping_add(len);
    while a < end {
        shared.code_cache.invalidate(a);
        a = a.wrapping_add(4);
    }
}
