//! Method code and its control flow
//!
//! ### Structure
//!
//! A [`MethodBody`] is the ordered list of instructions of one method, together with its
//! exception table and its [`MethodSignature`]. We split up the [list of bytecode
//! instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions (the body of the basic blocks)
//!   - [`BranchInstruction`] for instructions that may branch (the end of the basic blocks)
//!
//! Every instruction is addressed by its position ([`InsnIndex`]) and also has a byte offset,
//! since instructions are stored in an [`crate::util::OffsetVec`].
//!
//! ### Control flow
//!
//! [`GraphBuilder`] cuts a body into [`BasicBlock`]s and finds the edges that are evident from the
//! instructions. `jsr`/`ret` subroutines are then handled by [`SubroutineResolver`], which works
//! out the activation contexts every block runs under and where each `ret` returns to. The
//! resulting [`ResolvedGraph`] is what the dataflow engines in [`crate::jvm::analysis`] consume.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod basic_block;
mod code_builder;
mod graph;
mod instructions;
mod method;
mod subroutines;

pub use basic_block::*;
pub use code_builder::*;
pub use graph::*;
pub use instructions::*;
pub use method::*;
pub use subroutines::*;
