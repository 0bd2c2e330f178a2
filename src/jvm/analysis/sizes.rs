use super::{Settings, Worklist};
use crate::jvm::code::{EdgeKind, MethodBody, ResolvedGraph, StateId};
use crate::jvm::{Error, MalformedInput};

/// Largest operand stack and local variable array a method needs
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MaxSizes {
    /// Maximum operand stack depth, in slots
    pub max_stack: usize,

    /// Number of local slots, including the arguments
    pub max_locals: usize,
}

impl MaxSizes {
    /// Build the graph of a method body and compute its sizes with the default settings
    pub fn compute(body: &MethodBody) -> Result<MaxSizes, Error> {
        let graph = ResolvedGraph::build(body)?;
        SizeComputer::new(&graph).compute()
    }
}

/// Stack height propagation, without any values
///
/// This follows the same states and transitions as [`super::Analyzer`], but only tracks the
/// stack height on entry to each state (merging with `max`). A subroutine's net effect on the
/// stack is added to the height each call site had before its `jsr`, so call sites at different
/// depths don't affect each other's continuations.
pub struct SizeComputer<'a, 'm> {
    graph: &'a ResolvedGraph<'m>,
    settings: Settings,
}

impl<'a, 'm> SizeComputer<'a, 'm> {
    pub fn new(graph: &'a ResolvedGraph<'m>) -> SizeComputer<'a, 'm> {
        SizeComputer::with_settings(graph, Settings::default())
    }

    pub fn with_settings(graph: &'a ResolvedGraph<'m>, settings: Settings) -> SizeComputer<'a, 'm> {
        SizeComputer { graph, settings }
    }

    pub fn compute(&self) -> Result<MaxSizes, Error> {
        let graph = self.graph;
        let body = graph.body();

        let mut height: Vec<Option<usize>> = vec![None; graph.state_count()];
        let mut pre_call: Vec<Option<usize>> = vec![None; graph.state_count()];
        let mut worklist = Worklist::new(graph.state_count());

        let entry = graph.entry_state();
        height[entry.0] = Some(0);
        worklist.push(entry);

        let mut sizes = MaxSizes {
            max_stack: 0,
            max_locals: body.signature().argument_slots(),
        };
        let mut processed = 0;

        while let Some(state) = worklist.pop() {
            let (block_id, _) = graph.state_info(state);
            let block = graph.graph().block(block_id);

            processed += 1;
            if processed > self.settings.iteration_budget {
                return Err(Error::NonTerminating {
                    budget: self.settings.iteration_budget,
                    block: block.start,
                });
            }

            let mut current = match height[state.0] {
                Some(current) => current,
                None => continue,
            };
            sizes.max_stack = sizes.max_stack.max(current);

            let mut before_last = current;
            for at in block.instructions() {
                let insn = body.instruction(at);
                if let Some(access) = insn.local_access() {
                    sizes.max_locals = sizes.max_locals.max(access.end());
                }

                // Heights only grow, so one that is still too low will be raised later. Real
                // underflows are caught once everything has settled.
                before_last = current;
                let (pops, pushes) = insn.stack_slots();
                current = current.saturating_sub(pops) + pushes;
                sizes.max_stack = sizes.max_stack.max(current);
            }
            log::trace!("{:?} leaves the stack at {} slots", block.start, current);

            for transition in graph.transitions_from(state) {
                let candidate = match transition.kind {
                    EdgeKind::Exception { .. } => 1,
                    EdgeKind::FallThrough | EdgeKind::Jump => current,
                    EdgeKind::SubroutineCall => {
                        if pre_call[state.0] != Some(before_last) {
                            pre_call[state.0] = Some(before_last);
                            for ret_state in graph.returns_to(state) {
                                worklist.push(*ret_state);
                            }
                        }
                        current
                    }
                    EdgeKind::SubroutineReturn => {
                        let exit = match transition.exit {
                            Some(exit) => exit,
                            None => continue,
                        };
                        match (pre_call[exit.call_site.0], height[exit.activation.0]) {
                            // The entry height counts the return address, which is gone by now
                            (Some(caller), Some(entry)) => {
                                (caller + current + 1).saturating_sub(entry)
                            }
                            _ => continue,
                        }
                    }
                    EdgeKind::SubroutineContinuation => continue,
                };

                let target = transition.state;
                if height[target.0].map_or(true, |existing| existing < candidate) {
                    height[target.0] = Some(candidate);
                    worklist.push(target);
                }
            }
        }

        self.check_underflow(&height)?;
        log::debug!("Computed {:?} after processing {} states", sizes, processed);
        Ok(sizes)
    }

    /// Replay every reached block from its final entry height
    fn check_underflow(&self, height: &[Option<usize>]) -> Result<(), Error> {
        let graph = self.graph;
        for (state, entry) in height.iter().enumerate() {
            let mut current = match entry {
                Some(entry) => *entry,
                None => continue,
            };
            let (block_id, _) = graph.state_info(StateId(state));
            for at in graph.graph().block(block_id).instructions() {
                let (pops, pushes) = graph.body().instruction(at).stack_slots();
                current = current
                    .checked_sub(pops)
                    .ok_or_else(|| Error::malformed(at, MalformedInput::StackUnderflow))?
                    + pushes;
            }
        }
        Ok(())
    }
}
