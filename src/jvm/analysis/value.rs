use crate::jvm::code::{ExceptionHandler, InsnIndex, Instruction};
use crate::jvm::{BinaryName, FieldType};
use crate::util::Width;
use std::fmt;

/// Abstract value tracked in frames
///
/// The width is the number of slots the value takes (2 for `long` and `double`).
pub trait Value: Clone + Eq + fmt::Debug + fmt::Display + Width {
    /// Is this the marker produced by merging values that have no sensible join?
    fn is_conflict(&self) -> bool {
        false
    }
}

/// Lattice-specific half of the dataflow analysis
///
/// The engine decides how many values an instruction pops and pushes (from its
/// [`crate::jvm::code::Effect`]) and where they go. The interpreter only decides what the pushed
/// values are, and how values merge.
///
/// `merge` must be commutative, associative, idempotent and monotone, and the lattice must have
/// finite height, or the analysis will not converge.
pub trait Interpreter {
    type Value: Value;

    /// Value of an argument (or `this`) on entry to the method
    fn new_parameter(&self, field_type: &FieldType<BinaryName>) -> Self::Value;

    /// Value of a local that has not been assigned (also fills the second slot of wide locals)
    fn new_uninitialized(&self) -> Self::Value;

    /// Value pushed by `jsr`
    fn new_return_address(&self, at: InsnIndex) -> Self::Value;

    /// Value on the stack on entry to an exception handler
    fn new_exception(
        &self,
        handler_index: usize,
        handler: &ExceptionHandler<InsnIndex>,
    ) -> Self::Value;

    /// Value pushed by an instruction that pops nothing (constants, `getstatic`, `new`)
    fn new_operation(&self, at: InsnIndex, insn: &Instruction) -> Self::Value;

    /// Copy of a value (loads, stores and the `dup` family)
    fn copy_operation(&self, at: InsnIndex, insn: &Instruction, value: &Self::Value)
        -> Self::Value;

    /// Result of an instruction with one operand (also `iinc`, which updates a local)
    fn unary_operation(
        &self,
        at: InsnIndex,
        insn: &Instruction,
        value: &Self::Value,
    ) -> Self::Value;

    /// Result of an instruction with two operands
    fn binary_operation(
        &self,
        at: InsnIndex,
        insn: &Instruction,
        value1: &Self::Value,
        value2: &Self::Value,
    ) -> Self::Value;

    /// Result of an invocation or `multianewarray` (arguments are bottom of the stack first)
    fn nary_operation(
        &self,
        at: InsnIndex,
        insn: &Instruction,
        values: &[Self::Value],
    ) -> Self::Value;

    /// Join of two values reaching the same point
    fn merge(&self, value1: &Self::Value, value2: &Self::Value) -> Self::Value;
}
