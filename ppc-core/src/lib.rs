pub mod breakpoint;
pub mod context;
pub mod cpu;
pub mod dump;
pub mod ir_builder;
pub mod label;
pub mod mem;
pub mod op;
pub mod opcode;
pub mod tb;
pub mod temp;
pub mod thread;
pub mod types;

pub use breakpoint::{Breakpoint, BreakpointKind, BreakpointTable};
pub use context::Context;
pub use cpu::{
    gpr_offset, interrupt_bits, CoreState, PairedReg, CIA_OFFSET, CR_OFFSET, CTR_OFFSET,
    LR_OFFSET, MSR_OFFSET, NIA_OFFSET, NUM_FPRS, NUM_GPRS, NUM_GQRS, NUM_SR,
    RESERVE_ADDRESS_OFFSET, RESERVE_FLAG_OFFSET, XER_OFFSET,
};
pub use label::{Label, LabelUse, RelocKind};
pub use mem::{GuestMemory, GuestMemoryError};
pub use op::{LifeData, Op, OpIdx, MAX_OP_ARGS};
pub use opcode::{OpDef, OpFlags, Opcode, OPCODE_DEFS};
pub use tb::{JumpCache, TranslationBlock, TB_HASH_SIZE, TB_JMP_CACHE_SIZE};
pub use temp::{Temp, TempIdx, TempKind};
pub use thread::OSThread;
pub use types::{Cond, MemOp, RegSet, TempVal, Type};
