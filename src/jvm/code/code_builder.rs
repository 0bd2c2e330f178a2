use super::{BranchInstruction, ExceptionHandler, Insn, InsnIndex, Instruction, MethodBody};
use super::MethodSignature;
use crate::jvm::{BinaryName, Error};
use std::collections::HashMap;
use std::fmt;

/// Opaque label handed out by a [`CodeBuilder`]
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SynLabel(usize);

impl fmt::Debug for SynLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "l{}", self.0)
    }
}

/// Assemble a method body from top to bottom, using labels for jump targets
///
/// Labels may be used before they are placed. Placing a label attaches it to the next
/// instruction pushed (or to the end of the code, which is only useful as the end of a protected
/// range). Everything is resolved to instruction indices in [`CodeBuilder::result`].
pub struct CodeBuilder {
    signature: MethodSignature,
    instructions: Vec<Insn<SynLabel>>,
    exception_table: Vec<ExceptionHandler<SynLabel>>,

    /// Labels placed so far, and the index of the instruction they point to
    placed: HashMap<SynLabel, usize>,

    next_label: usize,
}

impl CodeBuilder {
    pub fn new(signature: MethodSignature) -> CodeBuilder {
        CodeBuilder {
            signature,
            instructions: vec![],
            exception_table: vec![],
            placed: HashMap::new(),
            next_label: 0,
        }
    }

    /// Generate a label that has not yet been placed
    pub fn fresh_label(&mut self) -> SynLabel {
        let label = SynLabel(self.next_label);
        self.next_label += 1;
        label
    }

    /// Attach a label to the position of the next instruction
    pub fn place_label(&mut self, label: SynLabel) -> Result<(), Error> {
        if self.placed.insert(label, self.instructions.len()).is_some() {
            return Err(Error::DuplicateLabel(label));
        }
        Ok(())
    }

    pub fn push_instruction(&mut self, insn: Instruction) {
        self.instructions.push(Insn::Simple(insn));
    }

    pub fn push_branch_instruction(&mut self, insn: BranchInstruction<SynLabel>) {
        self.instructions.push(Insn::Branch(insn));
    }

    /// Protect the instructions from `start` (inclusive) to `end` (exclusive)
    pub fn add_exception_handler(
        &mut self,
        start: SynLabel,
        end: SynLabel,
        handler: SynLabel,
        catch_type: Option<BinaryName>,
    ) {
        self.exception_table.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type,
        });
    }

    /// Resolve all labels and produce the method body
    pub fn result(self) -> Result<MethodBody, Error> {
        let CodeBuilder {
            signature,
            instructions,
            exception_table,
            placed,
            ..
        } = self;

        let mut unplaced = vec![];
        let mut resolve = |label: &SynLabel| match placed.get(label) {
            Some(idx) => Ok(InsnIndex(*idx)),
            None => {
                unplaced.push(*label);
                Ok::<_, Error>(InsnIndex(usize::MAX))
            }
        };

        let mut resolved_instructions = Vec::with_capacity(instructions.len());
        for insn in &instructions {
            resolved_instructions.push(match insn {
                Insn::Simple(insn) => Insn::Simple(insn.clone()),
                Insn::Branch(branch) => Insn::Branch(branch.map_labels(&mut resolve)?),
            });
        }

        let mut resolved_handlers = Vec::with_capacity(exception_table.len());
        for handler in exception_table {
            resolved_handlers.push(ExceptionHandler {
                start: resolve(&handler.start)?,
                end: resolve(&handler.end)?,
                handler: resolve(&handler.handler)?,
                catch_type: handler.catch_type,
            });
        }

        if !unplaced.is_empty() {
            unplaced.sort();
            unplaced.dedup();
            return Err(Error::UnplacedLabels(unplaced));
        }

        MethodBody::new(signature, resolved_instructions, resolved_handlers)
    }
}
