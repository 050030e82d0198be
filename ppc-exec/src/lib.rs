//! Per-core execution engine: drives lookup → translate → execute
//! against the shared [`code_cache::CodeCache`], falling back to the
//! authoritative interpreter whenever the JIT can't (or shouldn't)
//! handle the current address.
//!
//! Reference: decaf-emu's `jit_binrec.cpp` (`getCodeBlock`,
//! `resumeExecution`); the teacher's `exec/src/lib.rs` contributes the
//! `ExecStats`/shared-vs-per-core split this module keeps.

pub mod code_cache;
pub mod exec_loop;

pub use code_cache::{CodeCache, CodeCacheError, SlotState};
pub use exec_loop::{resume_execution, ExecExit, TranslateError, TranslateLock};

use std::fmt;
use std::sync::Arc;

/// Execution statistics for profiling the lookup/translate pipeline,
/// printed by `ppc-emu --stats`.
#[derive(Default)]
pub struct ExecStats {
    pub loop_iters: u64,
    pub index_hit: u64,
    pub translate: u64,
    pub interpret_steps: u64,
    pub translate_failed: u64,
}

impl fmt::Display for ExecStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Execution Stats ===")?;
        writeln!(f, "loop iters:       {}", self.loop_iters)?;
        writeln!(f, "index hit:        {}", self.index_hit)?;
        writeln!(f, "translated:       {}", self.translate)?;
        writeln!(f, "interpret steps:  {}", self.interpret_steps)?;
        writeln!(f, "translate failed: {}", self.translate_failed)?;
        Ok(())
    }
}

/// Shared across all core threads: the code cache and the backend that
/// emits host machine code for it.
pub struct SharedExec<B: ppc_backend::HostCodeGen> {
    pub code_cache: CodeCache,
    pub backend: B,
}

impl<B: ppc_backend::HostCodeGen> SharedExec<B> {
    pub fn new(mut backend: B, code_size: usize) -> Result<Arc<Self>, CodeCacheError> {
        let code_cache = CodeCache::new_with_prologue(code_size, &mut backend)?;
        Ok(Arc::new(Self { code_cache, backend }))
    }
}

/// Per-core execution state (not shared across cores).
pub struct PerCoreExec {
    pub stats: ExecStats,
}

impl Default for PerCoreExec {
    fn default() -> Self {
        Self { stats: ExecStats::default() }
    }
}
