//! Analyze JVM method bodies
//!
//! ### Simple example
//!
//! Consider the following method, where the `finally` block is compiled into a `jsr` subroutine
//! (as older Java compilers did):
//!
//! ```java,ignore,no_run
//! void run() {
//!     int i = 0;
//!     try {
//!         i++;
//!     } finally {
//!         i--;
//!     }
//! }
//! ```
//!
//! Its control flow graph and maximum sizes can be computed as follows:
//!
//! ```
//! use jvm_analysis::jvm::analysis::{Analyzer, BasicInterpreter, MaxSizes, SizeComputer};
//! use jvm_analysis::jvm::code::{BranchInstruction::*, CodeBuilder, Instruction::*};
//! use jvm_analysis::jvm::code::{ContextId, InsnIndex, MethodSignature, ResolvedGraph};
//! use jvm_analysis::jvm::*;
//!
//! # fn analyze_method() -> Result<(), Error> {
//! let signature = MethodSignature::parse("Example", "run", "()V", MethodAccessFlags::empty())?;
//! let mut code = CodeBuilder::new(signature);
//! let (start, end, handler, finally) = (
//!     code.fresh_label(),
//!     code.fresh_label(),
//!     code.fresh_label(),
//!     code.fresh_label(),
//! );
//!
//! code.push_instruction(IConst0);
//! code.push_instruction(IStore(1));
//! code.place_label(start)?;
//! code.push_instruction(IInc(1, 1));
//! code.place_label(end)?;
//! code.push_branch_instruction(Jsr(finally));
//! code.push_branch_instruction(Return);
//!
//! code.place_label(handler)?;
//! code.push_instruction(AStore(2));
//! code.push_branch_instruction(Jsr(finally));
//! code.push_instruction(ALoad(2));
//! code.push_branch_instruction(AThrow);
//!
//! code.place_label(finally)?;
//! code.push_instruction(AStore(3));
//! code.push_instruction(IInc(1, -1));
//! code.push_branch_instruction(Ret(3));
//! code.add_exception_handler(start, end, handler, None);
//! let body = code.result()?;
//!
//! // Resolve where the `ret` goes (both call sites)
//! let graph = ResolvedGraph::build(&body)?;
//! assert_eq!(graph.subroutines().len(), 1);
//!
//! // Compute `max_stack` and `max_locals`
//! let sizes = SizeComputer::new(&graph).compute()?;
//! assert_eq!(sizes, MaxSizes { max_stack: 1, max_locals: 4 });
//!
//! // Compute full frames
//! let frames = Analyzer::new(BasicInterpreter::new()).analyze(&graph)?;
//! let before_return = frames.frame(InsnIndex(4), ContextId::EMPTY).unwrap();
//! assert_eq!(before_return.to_string(), "LExample;I.A ");
//! # Ok(())
//! # }
//! # analyze_method().unwrap();
//! ```

mod access_flags;
pub mod analysis;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod names;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
