//! PowerPC "Espresso" frontend — decoder, authoritative interpreter, and
//! IR translator for the JIT-compilable opcode subset.

pub mod decode;
pub mod interp;
pub mod trans;

pub use trans::{register_globals, PpcDisasContext, PpcGlobals, PpcTranslator};
