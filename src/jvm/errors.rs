use super::code::{InsnIndex, SynLabel};

#[derive(Debug)]
pub enum Error {
    /// The method body can't be analyzed
    ///
    /// The instruction is where the problem was noticed: for subroutine errors that is the call
    /// or return involved, for handler errors it is the first instruction of the method.
    Malformed {
        instruction: InsnIndex,
        kind: MalformedInput,
    },

    /// The iteration budget ran out before reaching a fixed point
    ///
    /// This means the value lattice has an infinite ascending chain (or the budget is far too
    /// small for the method). It is never caused by the shape of the input alone.
    NonTerminating {
        budget: usize,

        /// First instruction of the block being processed when the budget ran out
        block: InsnIndex,
    },

    /// A type or method descriptor could not be parsed
    BadDescriptor(String),

    /// A class or method name is not valid
    MalformedName(String),

    /// A label is placed twice
    DuplicateLabel(SynLabel),

    /// Labels are referred to (by jumps or exception handlers) but never placed
    UnplacedLabels(Vec<SynLabel>),
}

/// Ways in which method code can be malformed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedInput {
    /// Method has no instructions
    EmptyCode,

    /// Jump target (byte offset or instruction index) is not the start of an instruction
    MisalignedJumpTarget(usize),

    /// Protected range or entry of this exception handler is not on instruction boundaries
    MisalignedHandler(usize),

    /// Execution can run past the last instruction
    FallsOffEnd,

    /// Subroutine (identified by its entry) calls itself, possibly through other subroutines
    RecursiveSubroutine(InsnIndex),

    /// Subroutine return with no call site to return to
    UnresolvableReturn,

    /// Instruction pops from an operand stack that does not have enough values
    StackUnderflow,

    /// Two paths reach the same point with operand stacks of different depths
    StackHeightMismatch { expected: usize, found: usize },

    /// Instruction refers to a local outside the frame
    LocalOutOfRange(u16),
}

impl Error {
    pub fn malformed(instruction: InsnIndex, kind: MalformedInput) -> Error {
        Error::Malformed { instruction, kind }
    }

    /// Is this error caused by invalid input code?
    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::Malformed { .. })
    }

    /// Is this error caused by the analysis failing to converge?
    pub fn is_non_terminating(&self) -> bool {
        matches!(self, Error::NonTerminating { .. })
    }

    /// Kind of malformed input, if that is what this error is
    pub fn malformed_kind(&self) -> Option<&MalformedInput> {
        match self {
            Error::Malformed { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
