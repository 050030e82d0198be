//! Cross-crate integration tests: ISA-agnostic IR/codegen coverage
//! carried over from the teacher, plus end-to-end scenario tests
//! (`scenarios`) exercising the scheduler, JIT, breakpoints, and alarm
//! service together the way `ppc-emu` wires them up.

mod backend;
mod core;
mod scenarios;
