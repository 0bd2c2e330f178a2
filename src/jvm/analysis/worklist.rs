use crate::jvm::code::StateId;
use crate::util::BitSet;
use std::collections::VecDeque;

/// FIFO of states waiting to be processed, where each state is queued at most once
pub struct Worklist {
    queue: VecDeque<StateId>,
    queued: BitSet,
}

impl Worklist {
    pub fn new(state_count: usize) -> Worklist {
        Worklist {
            queue: VecDeque::new(),
            queued: BitSet::new(state_count),
        }
    }

    /// Queue a state, unless it is already waiting
    pub fn push(&mut self, state: StateId) {
        if self.queued.insert(state.0) {
            self.queue.push_back(state);
        }
    }

    pub fn pop(&mut self) -> Option<StateId> {
        let state = self.queue.pop_front()?;
        self.queued.remove(state.0);
        Some(state)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn queues_once() {
        let mut worklist = Worklist::new(4);
        worklist.push(StateId(2));
        worklist.push(StateId(0));
        worklist.push(StateId(2));
        assert_eq!(worklist.pop(), Some(StateId(2)));
        worklist.push(StateId(2));
        assert_eq!(worklist.pop(), Some(StateId(0)));
        assert_eq!(worklist.pop(), Some(StateId(2)));
        assert_eq!(worklist.pop(), None);
    }
}
