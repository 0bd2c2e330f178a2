//! Dataflow analyses over a [`ResolvedGraph`](crate::jvm::code::ResolvedGraph)
//!
//! ### Frames
//!
//! [`Analyzer`] computes the abstract [`Frame`] (locals and operand stack) before every reachable
//! instruction, for every subroutine context the instruction runs under. What a value is depends
//! on the [`Interpreter`] the analyzer is built with:
//!
//!   - [`BasicInterpreter`] tracks the size and kind of values ([`BasicValue`])
//!   - [`SourceInterpreter`] tracks which instructions could have produced them ([`SourceValue`])
//!
//! The engine decides where values go (from the [`Effect`](crate::jvm::code::Effect) of each
//! instruction), and the interpreter only decides what they are.
//!
//! ### Sizes
//!
//! When only `max_stack` and `max_locals` are needed, [`SizeComputer`] does the same propagation
//! over stack heights alone.

mod analyzer;
mod basic;
mod frame;
mod settings;
mod sizes;
mod source;
mod value;
mod worklist;

pub use analyzer::*;
pub use basic::*;
pub use frame::*;
pub use settings::*;
pub use sizes::*;
pub use source::*;
pub use value::*;
use worklist::Worklist;
