use super::Insn;
use crate::jvm::{
    BinaryName, Error, FieldType, MalformedInput, MethodAccessFlags, MethodDescriptor, Name,
    ParseDescriptor, UnqualifiedName,
};
use crate::util::{Offset, OffsetResult, OffsetVec};
use std::fmt;

/// Position of an instruction in a method body (its ordinal, not its byte offset)
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct InsnIndex(pub usize);

impl fmt::Debug for InsnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Entry in the exception table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler<Lbl> {
    /// Start of the protected range (inclusive)
    pub start: Lbl,

    /// End of the protected range (exclusive)
    pub end: Lbl,

    /// Entry point of the handler
    pub handler: Lbl,

    /// Type of exception caught, or `None` for any exception (eg. `finally`)
    pub catch_type: Option<BinaryName>,
}

/// What the analysis needs to know about the method whose code it is looking at
#[derive(Clone, Debug)]
pub struct MethodSignature {
    /// Class declaring the method (the type of `this`)
    pub class: BinaryName,

    pub name: UnqualifiedName,

    pub descriptor: MethodDescriptor<BinaryName>,

    pub access_flags: MethodAccessFlags,
}

impl MethodSignature {
    /// Build a signature from the strings found in a class file
    pub fn parse(
        class: &str,
        name: &str,
        descriptor: &str,
        access_flags: MethodAccessFlags,
    ) -> Result<MethodSignature, Error> {
        Ok(MethodSignature {
            class: BinaryName::from_string(class.to_owned()).map_err(Error::MalformedName)?,
            name: UnqualifiedName::from_string(name.to_owned())
                .map_err(Error::MalformedName)?,
            descriptor: MethodDescriptor::parse(descriptor)
                .map_err(|err| Error::BadDescriptor(err.to_string()))?,
            access_flags,
        })
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Number of local slots occupied by arguments on entry (including `this`)
    pub fn argument_slots(&self) -> usize {
        self.descriptor.parameter_length(!self.is_static())
    }

    /// Types of the arguments in local slot order, starting with `this` for instance methods
    pub fn entry_locals(&self) -> Vec<FieldType<BinaryName>> {
        let mut locals = vec![];
        if !self.is_static() {
            locals.push(FieldType::object(self.class.clone()));
        }
        locals.extend(self.descriptor.parameters.iter().cloned());
        locals
    }
}

/// Code of a method, with every jump target resolved to an instruction index
#[derive(Debug)]
pub struct MethodBody {
    signature: MethodSignature,
    instructions: OffsetVec<Insn<InsnIndex>>,
    exception_table: Vec<ExceptionHandler<InsnIndex>>,
}

impl MethodBody {
    /// Build a body from index-resolved instructions
    ///
    /// Switch padding is recomputed from the position each instruction lands at.
    pub fn new(
        signature: MethodSignature,
        instructions: Vec<Insn<InsnIndex>>,
        exception_table: Vec<ExceptionHandler<InsnIndex>>,
    ) -> Result<MethodBody, Error> {
        let instructions = place_instructions(instructions);
        let len = instructions.len();

        for (_, idx, insn) in &instructions {
            if let Insn::Branch(branch) = insn {
                let targets = branch
                    .jump_targets()
                    .into_iter()
                    .chain(branch.subroutine_target());
                for target in targets {
                    if target.0 >= len {
                        let kind = MalformedInput::MisalignedJumpTarget(target.0);
                        return Err(Error::malformed(InsnIndex(idx), kind));
                    }
                }
            }
        }

        for (handler_idx, handler) in exception_table.iter().enumerate() {
            let ExceptionHandler {
                start,
                end,
                handler: entry,
                ..
            } = handler;
            if start >= end || end.0 > len || entry.0 >= len {
                let kind = MalformedInput::MisalignedHandler(handler_idx);
                return Err(Error::malformed(InsnIndex(0), kind));
            }
        }

        Ok(MethodBody {
            signature,
            instructions,
            exception_table,
        })
    }

    /// Build a body from instructions whose targets are byte offsets (as found in a class file)
    pub fn from_byte_offsets(
        signature: MethodSignature,
        instructions: Vec<Insn<Offset>>,
        exception_table: Vec<ExceptionHandler<Offset>>,
    ) -> Result<MethodBody, Error> {
        let placed = place_instructions(instructions);

        let mut resolved = Vec::with_capacity(placed.len());
        for (_, idx, insn) in &placed {
            let insn = match insn {
                Insn::Simple(insn) => Insn::Simple(insn.clone()),
                Insn::Branch(branch) => {
                    let branch = branch.map_labels(|offset| match placed.get_offset(*offset) {
                        OffsetResult::Ok(target, _) => Ok(InsnIndex(target)),
                        _ => Err(Error::malformed(
                            InsnIndex(idx),
                            MalformedInput::MisalignedJumpTarget(offset.0),
                        )),
                    })?;
                    Insn::Branch(branch)
                }
            };
            resolved.push(insn);
        }

        let mut handlers = Vec::with_capacity(exception_table.len());
        for (handler_idx, handler) in exception_table.into_iter().enumerate() {
            let misaligned =
                || Error::malformed(InsnIndex(0), MalformedInput::MisalignedHandler(handler_idx));
            let start = match placed.get_offset(handler.start) {
                OffsetResult::Ok(idx, _) => idx,
                _ => return Err(misaligned()),
            };
            let end = match placed.get_offset(handler.end) {
                OffsetResult::Ok(idx, _) | OffsetResult::End(idx) => idx,
                _ => return Err(misaligned()),
            };
            let entry = match placed.get_offset(handler.handler) {
                OffsetResult::Ok(idx, _) => idx,
                _ => return Err(misaligned()),
            };
            handlers.push(ExceptionHandler {
                start: InsnIndex(start),
                end: InsnIndex(end),
                handler: InsnIndex(entry),
                catch_type: handler.catch_type,
            });
        }

        MethodBody::new(signature, resolved, handlers)
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instructions, along with their byte offsets
    pub fn instructions(&self) -> &OffsetVec<Insn<InsnIndex>> {
        &self.instructions
    }

    /// Instruction at some index
    ///
    /// Panics if the index is out of bounds (indices handed out by the analysis never are).
    pub fn instruction(&self, index: InsnIndex) -> &Insn<InsnIndex> {
        &self.instructions[index.0]
    }

    /// Size of the code in bytes
    pub fn code_length(&self) -> usize {
        self.instructions.offset_len().0
    }

    /// Byte offset of an instruction (or of the end of the code)
    pub fn offset_of(&self, index: InsnIndex) -> Offset {
        self.instructions
            .offset_of(index.0)
            .unwrap_or_else(|| self.instructions.offset_len())
    }

    pub fn exception_table(&self) -> &[ExceptionHandler<InsnIndex>] {
        &self.exception_table
    }

    /// Number of local slots large enough for every argument and every local access
    pub fn locals_bound(&self) -> usize {
        self.instructions
            .iter()
            .filter_map(|(_, _, insn)| insn.local_access())
            .map(|access| access.end())
            .fold(self.signature.argument_slots(), usize::max)
    }
}

/// Lay out instructions one after another, fixing up switch padding along the way
fn place_instructions<Lbl: Copy>(instructions: Vec<Insn<Lbl>>) -> OffsetVec<Insn<Lbl>> {
    let mut placed = OffsetVec::new();
    for mut insn in instructions {
        if let Insn::Branch(branch) = &mut insn {
            let after_opcode = placed.offset_len().0 + 1;
            branch.set_padding(((4 - after_opcode % 4) % 4) as u8);
        }
        placed.push(insn);
    }
    placed
}
