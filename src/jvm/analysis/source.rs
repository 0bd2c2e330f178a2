use super::{Interpreter, Value};
use crate::jvm::code::{ExceptionHandler, InsnIndex, Instruction};
use crate::jvm::{BinaryName, FieldType};
use crate::util::Width;
use std::collections::BTreeSet;
use std::fmt;

/// Where a value could have come from
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Origin {
    /// Argument (or `this`) on entry to the method
    Entry,

    /// Instruction that pushed or stored the value
    Instruction(InsnIndex),

    /// Exception caught by the handler at this position in the exception table
    Handler(usize),
}

/// Set of possible origins of a value, along with its size
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceValue {
    /// Number of slots (1 or 2)
    pub size: usize,
    pub origins: BTreeSet<Origin>,
}

impl SourceValue {
    pub fn new(size: usize, origin: Origin) -> SourceValue {
        SourceValue {
            size,
            origins: BTreeSet::from([origin]),
        }
    }

    /// Instructions among the origins
    pub fn instructions(&self) -> impl Iterator<Item = InsnIndex> + '_ {
        self.origins.iter().filter_map(|origin| match origin {
            Origin::Instruction(insn) => Some(*insn),
            _ => None,
        })
    }
}

impl Width for SourceValue {
    fn width(&self) -> usize {
        self.size
    }
}

impl fmt::Display for SourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.size)?;
        let mut first = true;
        for origin in &self.origins {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            match origin {
                Origin::Entry => f.write_str("entry")?,
                Origin::Instruction(insn) => write!(f, "{}", insn.0)?,
                Origin::Handler(idx) => write!(f, "h{}", idx)?,
            }
        }
        f.write_str("}")
    }
}

impl Value for SourceValue {}

/// Interpreter tracking which instructions produce each value
///
/// Copies (loads, stores, `dup`s) count as producing a new value, so a value loaded from a local
/// has the load as its origin rather than the store.
pub struct SourceInterpreter;

impl Interpreter for SourceInterpreter {
    type Value = SourceValue;

    fn new_parameter(&self, field_type: &FieldType<BinaryName>) -> SourceValue {
        SourceValue::new(field_type.width(), Origin::Entry)
    }

    fn new_uninitialized(&self) -> SourceValue {
        SourceValue {
            size: 1,
            origins: BTreeSet::new(),
        }
    }

    fn new_return_address(&self, at: InsnIndex) -> SourceValue {
        SourceValue::new(1, Origin::Instruction(at))
    }

    fn new_exception(&self, index: usize, _handler: &ExceptionHandler<InsnIndex>) -> SourceValue {
        SourceValue::new(1, Origin::Handler(index))
    }

    fn new_operation(&self, at: InsnIndex, insn: &Instruction) -> SourceValue {
        SourceValue::new(insn.pushed_width(), Origin::Instruction(at))
    }

    fn copy_operation(
        &self,
        at: InsnIndex,
        _insn: &Instruction,
        value: &SourceValue,
    ) -> SourceValue {
        SourceValue::new(value.size, Origin::Instruction(at))
    }

    fn unary_operation(
        &self,
        at: InsnIndex,
        insn: &Instruction,
        _value: &SourceValue,
    ) -> SourceValue {
        let size = match insn {
            Instruction::IInc(_, _) => 1,
            _ => insn.pushed_width(),
        };
        SourceValue::new(size, Origin::Instruction(at))
    }

    fn binary_operation(
        &self,
        at: InsnIndex,
        insn: &Instruction,
        _value1: &SourceValue,
        _value2: &SourceValue,
    ) -> SourceValue {
        SourceValue::new(insn.pushed_width(), Origin::Instruction(at))
    }

    fn nary_operation(
        &self,
        at: InsnIndex,
        insn: &Instruction,
        _values: &[SourceValue],
    ) -> SourceValue {
        SourceValue::new(insn.pushed_width(), Origin::Instruction(at))
    }

    fn merge(&self, value1: &SourceValue, value2: &SourceValue) -> SourceValue {
        if value1.size != value2.size {
            log::warn!(
                "Merging values of different sizes ({} and {})",
                value1,
                value2
            );
        }
        SourceValue {
            size: value1.size.min(value2.size),
            origins: value1.origins.union(&value2.origins).copied().collect(),
        }
    }
}
