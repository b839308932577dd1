//! Symbolic instruction sequences and the fluent builder that emits them
//!
//! Method bodies are linear [`Instruction`] sequences with [`Label`] marks for control flow;
//! nothing here deals in byte offsets or stack frames (that is the codec's concern, see
//! [`crate::codec`]). The [`InstructionBuilder`] is the only way transformation code appends
//! instructions: it selects width-correct opcode variants and packages the branching protocols
//! (conditionals, loops, switches, try/catch) behind callbacks.

mod builder;
mod insn;

pub use builder::*;
pub use insn::*;
