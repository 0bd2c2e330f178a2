use super::{Interpreter, Value};
use crate::jvm::MalformedInput;
use std::fmt;

/// Abstract state at a point in the code: the operand stack and the local variables
///
/// Both are stored one value per entry (not per slot). A `long` on the stack is one entry. A
/// `long` in local `n` occupies entry `n`, and entry `n + 1` holds an uninitialized filler so that
/// locals can still be indexed by slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame<V> {
    pub locals: Vec<V>,

    /// Bottom of the stack first
    pub stack: Vec<V>,
}

/// Slot in a frame
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    Local(u16),

    /// Position counted from the bottom of the stack
    Stack(usize),
}

impl<V: Value> Frame<V> {
    pub fn new(locals: Vec<V>) -> Frame<V> {
        Frame {
            locals,
            stack: vec![],
        }
    }

    pub fn local(&self, slot: u16) -> Result<&V, MalformedInput> {
        self.locals
            .get(slot as usize)
            .ok_or(MalformedInput::LocalOutOfRange(slot))
    }

    /// Store a value into a local, invalidating any two-slot value it overlaps
    pub fn store_local(
        &mut self,
        slot: u16,
        value: V,
        uninitialized: impl Fn() -> V,
    ) -> Result<(), MalformedInput> {
        let idx = slot as usize;
        let width = value.width();
        if idx + width > self.locals.len() {
            return Err(MalformedInput::LocalOutOfRange(slot));
        }

        if idx > 0 && self.locals[idx - 1].width() == 2 {
            self.locals[idx - 1] = uninitialized();
        }
        self.locals[idx] = value;
        if width == 2 {
            self.locals[idx + 1] = uninitialized();
        }
        Ok(())
    }

    pub fn push(&mut self, value: V) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<V, MalformedInput> {
        self.stack.pop().ok_or(MalformedInput::StackUnderflow)
    }

    /// Pop several values, returning them bottom first
    pub fn pop_many(&mut self, count: usize) -> Result<Vec<V>, MalformedInput> {
        if count > self.stack.len() {
            return Err(MalformedInput::StackUnderflow);
        }
        let split_at = self.stack.len() - count;
        Ok(self.stack.split_off(split_at))
    }

    /// Height of the operand stack, in slots
    pub fn stack_size(&self) -> usize {
        self.stack.iter().map(|value| value.width()).sum()
    }

    /// Same locals, and a stack holding only the given value (the state on entry to a handler)
    pub fn with_only_on_stack(&self, value: V) -> Frame<V> {
        Frame {
            locals: self.locals.clone(),
            stack: vec![value],
        }
    }

    /// Merge another frame into this one, returning whether this frame changed
    pub fn merge<I: Interpreter<Value = V>>(
        &mut self,
        other: &Frame<V>,
        interpreter: &I,
    ) -> Result<bool, MalformedInput> {
        if self.stack.len() != other.stack.len() {
            return Err(MalformedInput::StackHeightMismatch {
                expected: self.stack.len(),
                found: other.stack.len(),
            });
        }

        let mut changed = false;
        let ours = self.locals.iter_mut().chain(self.stack.iter_mut());
        let theirs = other.locals.iter().chain(other.stack.iter());
        for (value, other_value) in ours.zip(theirs) {
            let merged = interpreter.merge(value, other_value);
            if merged != *value {
                *value = merged;
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Locations holding a conflict value
    pub fn conflicts(&self) -> impl Iterator<Item = Location> + '_ {
        let locals = self
            .locals
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_conflict())
            .map(|(idx, _)| Location::Local(idx as u16));
        let stack = self
            .stack
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_conflict())
            .map(|(idx, _)| Location::Stack(idx));
        locals.chain(stack)
    }
}

/// Locals, then a space, then the stack (bottom first)
impl<V: fmt::Display> fmt::Display for Frame<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for local in &self.locals {
            write!(f, "{}", local)?;
        }
        f.write_str(" ")?;
        for value in &self.stack {
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::analysis::{BasicInterpreter, BasicValue};

    #[test]
    fn stores_invalidate_overlapping_values() {
        let mut frame = Frame::new(vec![BasicValue::Uninitialized; 4]);
        frame
            .store_local(1, BasicValue::Long, || BasicValue::Uninitialized)
            .unwrap();
        assert_eq!(frame.to_string(), ".J.. ");

        frame
            .store_local(2, BasicValue::Int, || BasicValue::Uninitialized)
            .unwrap();
        assert_eq!(frame.to_string(), "..I. ");

        assert_eq!(
            frame.store_local(3, BasicValue::Double, || BasicValue::Uninitialized),
            Err(MalformedInput::LocalOutOfRange(3))
        );
    }

    #[test]
    fn stack_operations() {
        let mut frame: Frame<BasicValue> = Frame::new(vec![]);
        assert_eq!(frame.pop(), Err(MalformedInput::StackUnderflow));
        frame.push(BasicValue::Int);
        frame.push(BasicValue::Double);
        frame.push(BasicValue::Float);
        assert_eq!(frame.stack_size(), 4);
        assert_eq!(
            frame.pop_many(2).unwrap(),
            vec![BasicValue::Double, BasicValue::Float]
        );
        assert_eq!(frame.pop_many(2), Err(MalformedInput::StackUnderflow));
    }

    #[test]
    fn merging_frames() {
        let interpreter = BasicInterpreter::new();
        let mut frame = Frame {
            locals: vec![BasicValue::Int, BasicValue::Float],
            stack: vec![BasicValue::Int],
        };
        let same = frame.clone();
        assert_eq!(frame.merge(&same, &interpreter), Ok(false));

        let other = Frame {
            locals: vec![BasicValue::Int, BasicValue::Int],
            stack: vec![BasicValue::Int],
        };
        assert_eq!(frame.merge(&other, &interpreter), Ok(true));
        assert_eq!(frame.to_string(), "IX I");
        assert_eq!(
            frame.conflicts().collect::<Vec<_>>(),
            vec![Location::Local(1)]
        );

        let taller = Frame {
            locals: vec![BasicValue::Int, BasicValue::Int],
            stack: vec![BasicValue::Int, BasicValue::Int],
        };
        assert_eq!(
            frame.merge(&taller, &interpreter),
            Err(MalformedInput::StackHeightMismatch {
                expected: 1,
                found: 2
            })
        );
    }
}
