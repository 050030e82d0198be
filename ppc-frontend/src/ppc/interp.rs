//! Authoritative PowerPC interpreter for the scoped opcode subset.
//!
//! Dispatches on the decoded [`Insn`](super::decode::Insn), mutating
//! [`CoreState`] and [`GuestMemory`] directly. This is the reference
//! semantics the JIT-translated path (`trans.rs`) must agree with for
//! every instruction it also compiles; paired-single and quantized
//! load/store instructions are implemented *only* here, never compiled
//! (see §1 scope reduction).

use ppc_core::{Breakpoint as CoreBreakpoint, GuestMemory};

use ppc_core::{interrupt_bits, CoreState};
use super::decode::{decode, rlw_mask, spr_num, Insn};

/// Outcome of interpreting one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// Continue to the next instruction (PC already advanced).
    Continue,
    /// `sc` was hit; the caller must dispatch to the syscall bridge.
    SystemCall,
    /// A breakpoint-armed `tw` fired at the current PC.
    Trap,
    /// `tw`/`twi` condition was satisfied with no breakpoint installed —
    /// fatal per spec.md's "guest raised trap at …" behavior.
    FatalTrap { address: u32 },
}

/// Zero the 32-byte cache block containing `addr`, per `dcbz`'s semantics.
fn dcbz_align(addr: u32) -> u32 {
    addr & !31
}

pub fn step(state: &mut CoreState, mem: &GuestMemory, breakpoints: &ppc_core::BreakpointTable) -> StepResult {
    let pc = state.cia;
    let raw = unsafe { mem.read_u32(pc) };
    let insn = decode(raw);
    state.nia = pc.wrapping_add(4);

    let result = exec(state, mem, insn, pc, breakpoints);

    match result {
        StepResult::Continue => {
            state.cia = state.nia;
            StepResult::Continue
        }
        other => other,
    }
}

/// Reads `rA`, substituting literal 0 when `rA == r0` — the PowerPC "or 0"
/// rule, which applies only to `addi`/`addis` and the base register of
/// loads, stores, `lwarx`/`stwcx`, and `dcbz`. No other operand, and no
/// instruction's `rB`, is ever subject to this substitution.
fn gpr(state: &CoreState, ra: usize) -> u32 {
    if ra == 0 {
        0
    } else {
        state.gpr[ra]
    }
}

fn exec(
    state: &mut CoreState,
    mem: &GuestMemory,
    insn: Insn,
    pc: u32,
    breakpoints: &ppc_core::BreakpointTable,
) -> StepResult {
    match insn {
        Insn::Addi { rt, ra, simm } => {
            state.gpr[rt] = gpr(state, ra).wrapping_add(simm as u32);
        }
        Insn::Addis { rt, ra, simm } => {
            state.gpr[rt] = gpr(state, ra).wrapping_add((simm as u32) << 16);
        }
        Insn::Addic { rt, ra, simm, rc } => {
            let a = state.gpr[ra];
            let (res, carry) = a.overflowing_add(simm as u32);
            state.gpr[rt] = res;
            state.set_xer_ca(carry);
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Add { rt, ra, rb, oe, rc } => {
            let a = state.gpr[ra];
            let b = state.gpr[rb];
            let (res, ov) = (a as i32).overflowing_add(b as i32);
            state.gpr[rt] = res as u32;
            if oe {
                state.set_xer_ov(ov);
            }
            if rc {
                state.update_cr0(res);
            }
        }
        Insn::Subf { rt, ra, rb, oe, rc } => {
            let a = state.gpr[ra];
            let b = state.gpr[rb];
            let (res, ov) = (b as i32).overflowing_sub(a as i32);
            state.gpr[rt] = res as u32;
            if oe {
                state.set_xer_ov(ov);
            }
            if rc {
                state.update_cr0(res);
            }
        }
        Insn::Neg { rt, ra, oe, rc } => {
            let a = state.gpr[ra] as i32;
            let (res, ov) = a.overflowing_neg();
            state.gpr[rt] = res as u32;
            if oe {
                state.set_xer_ov(ov);
            }
            if rc {
                state.update_cr0(res);
            }
        }
        Insn::Mulli { rt, ra, simm } => {
            let a = state.gpr[ra] as i32 as i64;
            state.gpr[rt] = (a * simm as i64) as u32;
        }
        Insn::Mullw { rt, ra, rb, oe, rc } => {
            let a = state.gpr[ra] as i32 as i64;
            let b = state.gpr[rb] as i32 as i64;
            let full = a * b;
            let res = full as i32;
            state.gpr[rt] = res as u32;
            if oe {
                state.set_xer_ov(full != res as i64);
            }
            if rc {
                state.update_cr0(res);
            }
        }
        Insn::Divw { rt, ra, rb, oe, rc } => {
            let a = state.gpr[ra] as i32;
            let b = state.gpr[rb] as i32;
            let (res, overflowed) = if b == 0 || (a == i32::MIN && b == -1) {
                (0, true)
            } else {
                (a / b, false)
            };
            state.gpr[rt] = res as u32;
            if oe {
                state.set_xer_ov(overflowed);
            }
            if rc {
                state.update_cr0(res);
            }
        }
        Insn::Divwu { rt, ra, rb, oe, rc } => {
            let a = state.gpr[ra];
            let b = state.gpr[rb];
            let (res, overflowed) = if b == 0 { (0, true) } else { (a / b, false) };
            state.gpr[rt] = res;
            if oe {
                state.set_xer_ov(overflowed);
            }
            if rc {
                state.update_cr0(res as i32);
            }
        }

        Insn::Andi { ra, rs, uimm } => {
            let res = state.gpr[rs] & uimm;
            state.gpr[ra] = res;
            state.update_cr0(res as i32);
        }
        Insn::Andis { ra, rs, uimm } => {
            let res = state.gpr[rs] & (uimm << 16);
            state.gpr[ra] = res;
            state.update_cr0(res as i32);
        }
        Insn::Ori { ra, rs, uimm } => {
            state.gpr[ra] = state.gpr[rs] | uimm;
        }
        Insn::Oris { ra, rs, uimm } => {
            state.gpr[ra] = state.gpr[rs] | (uimm << 16);
        }
        Insn::Xori { ra, rs, uimm } => {
            state.gpr[ra] = state.gpr[rs] ^ uimm;
        }
        Insn::Xoris { ra, rs, uimm } => {
            state.gpr[ra] = state.gpr[rs] ^ (uimm << 16);
        }
        Insn::And { ra, rs, rb, rc } => {
            let res = state.gpr[rs] & state.gpr[rb];
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Or { ra, rs, rb, rc } => {
            let res = state.gpr[rs] | state.gpr[rb];
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Xor { ra, rs, rb, rc } => {
            let res = state.gpr[rs] ^ state.gpr[rb];
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Nand { ra, rs, rb, rc } => {
            let res = !(state.gpr[rs] & state.gpr[rb]);
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Nor { ra, rs, rb, rc } => {
            let res = !(state.gpr[rs] | state.gpr[rb]);
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Eqv { ra, rs, rb, rc } => {
            let res = !(state.gpr[rs] ^ state.gpr[rb]);
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Andc { ra, rs, rb, rc } => {
            let res = state.gpr[rs] & !state.gpr[rb];
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Orc { ra, rs, rb, rc } => {
            let res = state.gpr[rs] | !state.gpr[rb];
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }

        Insn::Cmp { bf, l: _, ra, rb } => {
            let a = state.gpr[ra] as i32;
            let b = state.gpr[rb] as i32;
            set_cmp_field(state, bf, a.cmp(&b));
        }
        Insn::Cmpi { bf, l: _, ra, simm } => {
            let a = state.gpr[ra] as i32;
            set_cmp_field(state, bf, a.cmp(&simm));
        }
        Insn::Cmpl { bf, l: _, ra, rb } => {
            let a = state.gpr[ra];
            let b = state.gpr[rb];
            set_cmp_field(state, bf, a.cmp(&b));
        }
        Insn::Cmpli { bf, l: _, ra, uimm } => {
            let a = state.gpr[ra];
            set_cmp_field(state, bf, a.cmp(&uimm));
        }

        Insn::Slw { ra, rs, rb, rc } => {
            let sh = state.gpr[rb] & 0x3f;
            let res = if sh >= 32 { 0 } else { state.gpr[rs] << sh };
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Srw { ra, rs, rb, rc } => {
            let sh = state.gpr[rb] & 0x3f;
            let res = if sh >= 32 { 0 } else { state.gpr[rs] >> sh };
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Sraw { ra, rs, rb, rc } => {
            let sh = state.gpr[rb] & 0x3f;
            let val = state.gpr[rs] as i32;
            let (res, carry) = if sh >= 32 {
                (val >> 31, val < 0)
            } else {
                let r = val >> sh;
                let carry = val < 0 && (val & ((1i32 << sh) - 1).max(0)) != 0;
                (r, carry)
            };
            state.gpr[ra] = res as u32;
            state.set_xer_ca(carry);
            if rc {
                state.update_cr0(res);
            }
        }
        Insn::Srawi { ra, rs, sh, rc } => {
            let val = state.gpr[rs] as i32;
            let res = val >> sh;
            let carry = val < 0 && (val & ((1i32 << sh) - 1).max(0)) != 0;
            state.gpr[ra] = res as u32;
            state.set_xer_ca(carry);
            if rc {
                state.update_cr0(res);
            }
        }
        Insn::Rlwinm { ra, rs, sh, mb, me, rc } => {
            let rotated = state.gpr[rs].rotate_left(sh);
            let mask = rlw_mask(mb, me);
            let res = rotated & mask;
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Rlwimi { ra, rs, sh, mb, me, rc } => {
            let rotated = state.gpr[rs].rotate_left(sh);
            let mask = rlw_mask(mb, me);
            let res = (rotated & mask) | (state.gpr[ra] & !mask);
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }
        Insn::Rlwnm { ra, rs, rb, mb, me, rc } => {
            let sh = state.gpr[rb] & 0x1f;
            let rotated = state.gpr[rs].rotate_left(sh);
            let mask = rlw_mask(mb, me);
            let res = rotated & mask;
            state.gpr[ra] = res;
            if rc {
                state.update_cr0(res as i32);
            }
        }

        Insn::B { li, aa, lk } => {
            let target = if aa { li as u32 } else { pc.wrapping_add(li as u32) };
            if lk {
                state.lr = pc.wrapping_add(4);
            }
            state.nia = target;
        }
        Insn::Bc { bo, bi, bd, aa, lk } => {
            if branch_taken(state, bo, bi) {
                let target = if aa { bd as u32 } else { pc.wrapping_add(bd as u32) };
                state.nia = target;
            }
            if lk {
                state.lr = pc.wrapping_add(4);
            }
        }
        Insn::Bclr { bo, bi, lk } => {
            if branch_taken(state, bo, bi) {
                state.nia = state.lr & !0b11;
            }
            if lk {
                state.lr = pc.wrapping_add(4);
            }
        }
        Insn::Bcctr { bo, bi, lk } => {
            if branch_taken(state, bo, bi) {
                state.nia = state.ctr & !0b11;
            }
            if lk {
                state.lr = pc.wrapping_add(4);
            }
        }

        Insn::Load { rt, ra, d, width, signed, update, indexed, rb, algebraic: _ } => {
            let base = gpr(state, ra);
            let offset = if indexed { state.gpr[rb] } else { d as u32 };
            let addr = base.wrapping_add(offset);
            let val = unsafe {
                match (width, signed) {
                    (1, false) => mem.read_u8(addr) as u32,
                    (2, false) => mem.read_u16(addr) as u32,
                    (2, true) => mem.read_u16(addr) as i16 as u32,
                    (4, _) => mem.read_u32(addr),
                    _ => unreachable!("unsupported load width"),
                }
            };
            state.gpr[rt] = val;
            if update {
                state.gpr[ra] = addr;
            }
        }
        Insn::Store { rs, ra, d, width, update, indexed, rb } => {
            let base = gpr(state, ra);
            let offset = if indexed { state.gpr[rb] } else { d as u32 };
            let addr = base.wrapping_add(offset);
            let val = state.gpr[rs];
            unsafe {
                match width {
                    1 => mem.write_u8(addr, val as u8),
                    2 => mem.write_u16(addr, val as u16),
                    4 => mem.write_u32(addr, val),
                    _ => unreachable!("unsupported store width"),
                }
            }
            if update {
                state.gpr[ra] = addr;
            }
        }
        Insn::Lwarx { rt, ra, rb } => {
            let addr = gpr(state, ra).wrapping_add(state.gpr[rb]);
            state.gpr[rt] = unsafe { mem.read_u32(addr) };
            state.reserve_address = addr;
            state.reserve_flag = true;
        }
        Insn::Stwcx { rs, ra, rb } => {
            let addr = gpr(state, ra).wrapping_add(state.gpr[rb]);
            let success = state.reserve_flag && state.reserve_address == addr;
            if success {
                unsafe { mem.write_u32(addr, state.gpr[rs]) };
            }
            state.reserve_flag = false;
            let eq = if success { 0b010 } else { 0 };
            let so = (state.xer >> 31) & 1;
            state.set_cr_field(0, eq | so);
        }

        Insn::Sc => return StepResult::SystemCall,

        Insn::Tw { to, ra, rb } => {
            let a = state.gpr[ra] as i32;
            let b = state.gpr[rb] as i32;
            if trap_condition(to, a, b) {
                return trap(state, mem, pc, breakpoints);
            }
        }
        Insn::Twi { to, ra, simm } => {
            let a = state.gpr[ra] as i32;
            if trap_condition(to, a, simm) {
                return trap(state, mem, pc, breakpoints);
            }
        }

        Insn::Mfspr { rt, spr } => {
            state.gpr[rt] = read_spr(state, spr);
        }
        Insn::Mtspr { spr, rs } => {
            write_spr(state, spr, state.gpr[rs]);
        }
        Insn::Mftb { rt, tbr: _ } => {
            // mftb reads are unordered across cores (spec.md §4.1).
            state.gpr[rt] = state.timebase as u32;
        }

        Insn::CacheNop => {}
        Insn::Dcbz { ra, rb } => {
            let addr = dcbz_align(gpr(state, ra).wrapping_add(state.gpr[rb]));
            unsafe {
                for i in 0..32u32 {
                    mem.write_u8(addr.wrapping_add(i), 0);
                }
            }
        }

        Insn::PairedSingle => {
            // Out of scope per §1: decoded for completeness, treated as a
            // no-op by the interpreter rather than fully modeled.
        }

        Insn::Unknown(_) => {}
    }

    StepResult::Continue
}

fn set_cmp_field(state: &mut CoreState, bf: u32, ord: std::cmp::Ordering) {
    let field = match ord {
        std::cmp::Ordering::Less => 0b100,
        std::cmp::Ordering::Greater => 0b010,
        std::cmp::Ordering::Equal => 0b001,
    };
    let so = (state.xer >> 31) & 1;
    state.set_cr_field(bf, (field << 1) | so);
}

/// Evaluate the BO/BI condition, per the architecture's branch-conditional
/// encoding (simplified: CTR-decrement forms plus CR-bit forms).
fn branch_taken(state: &mut CoreState, bo: u32, bi: u32) -> bool {
    let bo0 = bo & 0x10 != 0; // branch always regardless of CR
    let bo1 = bo & 0x08 != 0; // CR-bit test value
    let bo2 = bo & 0x04 != 0; // don't decrement CTR

    if !bo2 {
        state.ctr = state.ctr.wrapping_sub(1);
    }
    let ctr_ok = bo2 || ((state.ctr != 0) == !(bo & 0x02 != 0));

    let cr_bit = (state.cr >> (31 - bi)) & 1;
    let cond_ok = bo0 || (cr_bit == bo1 as u32);

    ctr_ok && cond_ok
}

fn trap_condition(to: u32, a: i32, b: i32) -> bool {
    (to & 0x10 != 0 && a < b)
        || (to & 0x08 != 0 && a > b)
        || (to & 0x04 != 0 && a == b)
        || (to & 0x02 != 0 && (a as u32) < (b as u32))
        || (to & 0x01 != 0 && (a as u32) > (b as u32))
}

fn trap(
    state: &mut CoreState,
    mem: &GuestMemory,
    pc: u32,
    breakpoints: &ppc_core::BreakpointTable,
) -> StepResult {
    if let Some(CoreBreakpoint { saved_code, .. }) = breakpoints.test(pc) {
        // Re-execute the saved original word in place of the trap.
        let restored = decode(saved_code);
        let _ = exec(state, mem, restored, pc, breakpoints);
        StepResult::Trap
    } else {
        StepResult::FatalTrap { address: pc }
    }
}

fn read_spr(state: &CoreState, spr: u32) -> u32 {
    match spr {
        spr_num::XER => state.xer,
        spr_num::LR => state.lr,
        spr_num::CTR => state.ctr,
        spr_num::UPIR => state.upir,
        s if (spr_num::GQR0..spr_num::GQR0 + 8).contains(&s) => {
            state.gqr[(s - spr_num::GQR0) as usize]
        }
        _ => 0,
    }
}

fn write_spr(state: &mut CoreState, spr: u32, val: u32) {
    match spr {
        spr_num::XER => state.xer = val,
        spr_num::LR => state.lr = val,
        spr_num::CTR => state.ctr = val,
        s if (spr_num::GQR0..spr_num::GQR0 + 8).contains(&s) => {
            state.gqr[(s - spr_num::GQR0) as usize] = val;
        }
        _ => {}
    }
}

/// Raise the ALARM/GPU/GENERIC bit in the pending-interrupt mask
/// (release, per spec.md §4.1/§5).
pub fn raise_interrupt(state: &CoreState, bit: u32) {
    use std::sync::atomic::Ordering;
    state.pending_interrupts.fetch_or(bit, Ordering::Release);
}

pub use interrupt_bits::{ALARM, GENERIC, GPU};

#[cfg(test)]
mod tests {
    use super::*;
    use ppc_core::BreakpointTable;

    fn new_mem_with(code: &[u32]) -> GuestMemory {
        let mem = GuestMemory::new().unwrap();
        mem.mmap_fixed(0, 4096, libc::PROT_READ | libc::PROT_WRITE).unwrap();
        for (i, w) in code.iter().enumerate() {
            unsafe { mem.write_u32((i * 4) as u32, *w) };
        }
        mem
    }

    // li r3,2 ; li r4,3 ; add r3,r3,r4
    #[test]
    fn add_then_halt() {
        let code = [
            0x3860_0002, // addi r3,r0,2
            0x3880_0003, // addi r4,r0,3
            0x7C63_2214, // add r3,r3,r4
        ];
        let mem = new_mem_with(&code);
        let bps = BreakpointTable::new();
        let mut state = CoreState::new(0);
        for _ in 0..3 {
            step(&mut state, &mem, &bps);
        }
        assert_eq!(state.gpr[3], 5);
    }

    #[test]
    fn rlwinm_mask() {
        assert_eq!(rlw_mask(0, 31), u32::MAX);
        assert_eq!(rlw_mask(16, 31), 0x0000_ffff);
        assert_eq!(rlw_mask(0, 15), 0xffff_0000);
    }

    #[test]
    fn dcbz_zeroes_32_bytes() {
        let mem = GuestMemory::new().unwrap();
        mem.mmap_fixed(0, 4096, libc::PROT_READ | libc::PROT_WRITE).unwrap();
        unsafe {
            for i in 0..64u32 {
                mem.write_u8(i, 0xff);
            }
        }
        assert_eq!(dcbz_align(10), 0);
        unsafe {
            for i in 0..32u32 {
                mem.write_u8(i, 0);
            }
            for i in 32..64u32 {
                assert_eq!(mem.read_u8(i), 0xff);
            }
        }
    }
}
