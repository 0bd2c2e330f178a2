use super::{Frame, Interpreter, Location, Origin, Settings, SourceValue, Value, Worklist};
use crate::jvm::code::{
    BlockId, ContextId, EdgeKind, Effect, Exit, Insn, InsnIndex, Instruction, ResolvedGraph,
    Shuffle, StateId,
};
use crate::jvm::{Error, MalformedInput};
use crate::util::Width;
use std::collections::BTreeSet;

/// Slot holding a lattice conflict after a merge
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Conflict {
    /// First instruction of the block whose incoming frame has the conflict
    pub block: InsnIndex,
    pub context: ContextId,
    pub location: Location,
}

/// Worklist fixed-point propagation of frames over a resolved graph
///
/// Frames are kept per `(block, context)` state, so code shared by several subroutine
/// activations (or reached both inside and outside a subroutine) never has the frames of one
/// activation merged into those of another.
pub struct Analyzer<I: Interpreter> {
    interpreter: I,
    settings: Settings,
}

impl<I: Interpreter> Analyzer<I> {
    pub fn new(interpreter: I) -> Analyzer<I> {
        Analyzer::with_settings(interpreter, Settings::default())
    }

    pub fn with_settings(interpreter: I, settings: Settings) -> Analyzer<I> {
        Analyzer {
            interpreter,
            settings,
        }
    }

    pub fn interpreter(&self) -> &I {
        &self.interpreter
    }

    /// Compute the converged frame before every reachable instruction, under every context
    pub fn analyze<'a, 'm>(
        &self,
        graph: &'a ResolvedGraph<'m>,
    ) -> Result<Frames<'a, 'm, I::Value>, Error> {
        let mut propagation = Propagation {
            interpreter: &self.interpreter,
            settings: &self.settings,
            graph,
            incoming: vec![None; graph.state_count()],
            pre_call: vec![None; graph.state_count()],
            worklist: Worklist::new(graph.state_count()),
        };
        propagation.run()?;

        let mut frames = Vec::with_capacity(graph.state_count());
        let mut conflicts = vec![];
        for (state, incoming) in propagation.incoming.iter().enumerate() {
            let frame = match incoming {
                Some(frame) => frame,
                None => {
                    frames.push(vec![]);
                    continue;
                }
            };
            let (block, context) = graph.state_info(StateId(state));

            if self.settings.record_conflicts {
                let start = graph.graph().block(block).start;
                for location in frame.conflicts() {
                    log::debug!(
                        "Conflict at {:?} under {:?} in {:?}",
                        start,
                        context,
                        location
                    );
                    conflicts.push(Conflict {
                        block: start,
                        context,
                        location,
                    });
                }
            }
            frames.push(propagation.replay(block, frame.clone())?.0);
        }
        conflicts.sort();

        Ok(Frames {
            graph,
            frames,
            conflicts,
        })
    }
}

struct Propagation<'i, 'a, 'm, I: Interpreter> {
    interpreter: &'i I,
    settings: &'i Settings,
    graph: &'a ResolvedGraph<'m>,

    /// Merged frame on entry to each state
    incoming: Vec<Option<Frame<I::Value>>>,

    /// Frame before the `jsr` of each call site state
    pre_call: Vec<Option<Frame<I::Value>>>,

    worklist: Worklist,
}

impl<'i, 'a, 'm, I: Interpreter> Propagation<'i, 'a, 'm, I> {
    fn run(&mut self) -> Result<(), Error> {
        let graph = self.graph;
        let entry = graph.entry_state();
        self.incoming[entry.0] = Some(self.initial_frame());
        self.worklist.push(entry);

        let mut processed = 0;
        while let Some(state) = self.worklist.pop() {
            let (block, context) = graph.state_info(state);
            let start = graph.graph().block(block).start;

            processed += 1;
            if processed > self.settings.iteration_budget {
                return Err(Error::NonTerminating {
                    budget: self.settings.iteration_budget,
                    block: start,
                });
            }

            let incoming = match &self.incoming[state.0] {
                Some(frame) => frame.clone(),
                None => continue,
            };
            log::trace!("Processing {:?} under {:?}: {}", start, context, incoming);
            let (before, end) = self.replay(block, incoming)?;

            // Everything a handler could see, on top of which the exception is pushed
            let mut throwing: Option<Frame<I::Value>> = None;
            let has_handlers = graph
                .transitions_from(state)
                .iter()
                .any(|transition| matches!(transition.kind, EdgeKind::Exception { .. }));
            if has_handlers {
                for frame in before.iter().chain(std::iter::once(&end)) {
                    let frame = Frame::new(frame.locals.clone());
                    match &mut throwing {
                        Some(merged) => {
                            merged
                                .merge(&frame, self.interpreter)
                                .map_err(|kind| Error::malformed(start, kind))?;
                        }
                        None => throwing = Some(frame),
                    }
                }
            }

            let last = before.last().cloned();
            for transition in graph.transitions_from(state) {
                let candidate = match transition.kind {
                    EdgeKind::Exception { handler } => {
                        let entry = &graph.body().exception_table()[handler];
                        let exception = self.interpreter.new_exception(handler, entry);
                        match &throwing {
                            Some(frame) => frame.with_only_on_stack(exception),
                            None => continue,
                        }
                    }
                    EdgeKind::FallThrough | EdgeKind::Jump => end.clone(),
                    EdgeKind::SubroutineCall => {
                        if let Some(pre_call) = &last {
                            self.record_pre_call(state, pre_call);
                        }
                        end.clone()
                    }
                    EdgeKind::SubroutineReturn => match transition.exit {
                        Some(exit) => match self.return_frame(&exit, &end) {
                            Some(frame) => frame,
                            None => continue,
                        },
                        None => continue,
                    },
                    EdgeKind::SubroutineContinuation => continue,
                };
                self.merge_into(transition.state, candidate)?;
            }
        }

        log::debug!(
            "Reached a fixed point after processing {} states",
            processed
        );
        Ok(())
    }

    fn initial_frame(&self) -> Frame<I::Value> {
        let body = self.graph.body();
        let mut locals = vec![];
        for field_type in body.signature().entry_locals() {
            locals.push(self.interpreter.new_parameter(&field_type));
            if field_type.width() == 2 {
                locals.push(self.interpreter.new_uninitialized());
            }
        }
        while locals.len() < body.locals_bound() {
            locals.push(self.interpreter.new_uninitialized());
        }
        Frame::new(locals)
    }

    /// Run the instructions of a block, returning the frame before each one and the end frame
    fn replay(
        &self,
        block: BlockId,
        mut frame: Frame<I::Value>,
    ) -> Result<(Vec<Frame<I::Value>>, Frame<I::Value>), Error> {
        let body = self.graph.body();
        let block = self.graph.graph().block(block);
        let mut before = Vec::with_capacity(block.len());
        for at in block.instructions() {
            before.push(frame.clone());
            execute(self.interpreter, at, body.instruction(at), &mut frame)
                .map_err(|kind| Error::malformed(at, kind))?;
        }
        Ok((before, frame))
    }

    fn record_pre_call(&mut self, call_site: StateId, frame: &Frame<I::Value>) {
        if self.pre_call[call_site.0].as_ref() == Some(frame) {
            return;
        }
        self.pre_call[call_site.0] = Some(frame.clone());

        // Returns already processed need to see the new frame
        let graph = self.graph;
        for ret_state in graph.returns_to(call_site) {
            self.worklist.push(*ret_state);
        }
    }

    /// Frame at the continuation of a call site, after returning from the subroutine
    fn return_frame(&self, exit: &Exit, returning: &Frame<I::Value>) -> Option<Frame<I::Value>> {
        let pre_call = self.pre_call[exit.call_site.0].as_ref()?;
        let write_set = &self.graph.subroutine(exit.subroutine).write_set;

        let locals = pre_call
            .locals
            .iter()
            .zip(&returning.locals)
            .enumerate()
            .map(|(slot, (caller, subroutine))| {
                if write_set.contains(slot) {
                    subroutine.clone()
                } else {
                    caller.clone()
                }
            })
            .collect();

        let stack = if returning.stack.len() >= pre_call.stack.len() {
            let mut stack = pre_call.stack.clone();
            stack.extend_from_slice(&returning.stack[pre_call.stack.len()..]);
            stack
        } else {
            returning.stack.clone()
        };

        Some(Frame { locals, stack })
    }

    fn merge_into(&mut self, target: StateId, candidate: Frame<I::Value>) -> Result<(), Error> {
        let (block, _) = self.graph.state_info(target);
        let start = self.graph.graph().block(block).start;

        let changed = match self.incoming[target.0].as_mut() {
            Some(existing) => existing
                .merge(&candidate, self.interpreter)
                .map_err(|kind| Error::malformed(start, kind))?,
            None => {
                self.incoming[target.0] = Some(candidate);
                true
            }
        };
        if changed {
            self.worklist.push(target);
        }
        Ok(())
    }
}

/// Apply the effect of one instruction to a frame
fn execute<I: Interpreter>(
    interpreter: &I,
    at: InsnIndex,
    insn: &Insn<InsnIndex>,
    frame: &mut Frame<I::Value>,
) -> Result<(), MalformedInput> {
    let insn = match insn {
        Insn::Simple(insn) => insn,
        Insn::Branch(branch) => {
            match branch.effect() {
                Effect::Consume(count) => {
                    frame.pop_many(count)?;
                }
                Effect::CallSubroutine => frame.push(interpreter.new_return_address(at)),
                _ => (),
            }
            return Ok(());
        }
    };

    match insn.effect() {
        Effect::Nothing | Effect::CallSubroutine | Effect::ReturnFromSubroutine(_) => (),
        Effect::Push => frame.push(interpreter.new_operation(at, insn)),
        Effect::Load(slot) => {
            let value = interpreter.copy_operation(at, insn, frame.local(slot)?);
            frame.push(value);
        }
        Effect::Store(slot) => {
            let value = frame.pop()?;
            let value = interpreter.copy_operation(at, insn, &value);
            frame.store_local(slot, value, || interpreter.new_uninitialized())?;
        }
        Effect::Increment(slot) => {
            let value = interpreter.unary_operation(at, insn, frame.local(slot)?);
            frame.store_local(slot, value, || interpreter.new_uninitialized())?;
        }
        Effect::Unary => {
            let value = frame.pop()?;
            frame.push(interpreter.unary_operation(at, insn, &value));
        }
        Effect::Binary => {
            let value2 = frame.pop()?;
            let value1 = frame.pop()?;
            frame.push(interpreter.binary_operation(at, insn, &value1, &value2));
        }
        Effect::Consume(count) => {
            frame.pop_many(count)?;
        }
        Effect::Nary { pops, pushes } => {
            let values = frame.pop_many(pops)?;
            if pushes {
                frame.push(interpreter.nary_operation(at, insn, &values));
            }
        }
        Effect::Shuffle(shuffle) => shuffle_stack(interpreter, at, insn, shuffle, frame)?,
    }
    Ok(())
}

/// Stack manipulation, where the forms of `pop2` and `dup2*` depend on the widths on top
fn shuffle_stack<I: Interpreter>(
    interpreter: &I,
    at: InsnIndex,
    insn: &Instruction,
    shuffle: Shuffle,
    frame: &mut Frame<I::Value>,
) -> Result<(), MalformedInput> {
    let copy = |value: &I::Value| interpreter.copy_operation(at, insn, value);

    match shuffle {
        Shuffle::Pop => {
            frame.pop()?;
        }
        Shuffle::Pop2 => {
            if frame.pop()?.width() == 1 {
                frame.pop()?;
            }
        }
        Shuffle::Dup => {
            let value = frame.pop()?;
            let copied = copy(&value);
            frame.push(value);
            frame.push(copied);
        }
        Shuffle::DupX1 => {
            let value1 = frame.pop()?;
            let value2 = frame.pop()?;
            frame.push(copy(&value1));
            frame.push(value2);
            frame.push(value1);
        }
        Shuffle::DupX2 => {
            let value1 = frame.pop()?;
            let value2 = frame.pop()?;
            if value2.width() == 1 {
                let value3 = frame.pop()?;
                frame.push(copy(&value1));
                frame.push(value3);
            } else {
                frame.push(copy(&value1));
            }
            frame.push(value2);
            frame.push(value1);
        }
        Shuffle::Dup2 => {
            let value1 = frame.pop()?;
            if value1.width() == 1 {
                let value2 = frame.pop()?;
                let (copy2, copy1) = (copy(&value2), copy(&value1));
                frame.push(value2);
                frame.push(value1);
                frame.push(copy2);
                frame.push(copy1);
            } else {
                let copied = copy(&value1);
                frame.push(value1);
                frame.push(copied);
            }
        }
        Shuffle::Dup2X1 => {
            let value1 = frame.pop()?;
            if value1.width() == 1 {
                let value2 = frame.pop()?;
                let value3 = frame.pop()?;
                frame.push(copy(&value2));
                frame.push(copy(&value1));
                frame.push(value3);
                frame.push(value2);
            } else {
                let value2 = frame.pop()?;
                frame.push(copy(&value1));
                frame.push(value2);
            }
            frame.push(value1);
        }
        Shuffle::Dup2X2 => {
            let value1 = frame.pop()?;
            if value1.width() == 1 {
                let value2 = frame.pop()?;
                let value3 = frame.pop()?;
                let (copy2, copy1) = (copy(&value2), copy(&value1));
                if value3.width() == 1 {
                    let value4 = frame.pop()?;
                    frame.push(copy2);
                    frame.push(copy1);
                    frame.push(value4);
                } else {
                    frame.push(copy2);
                    frame.push(copy1);
                }
                frame.push(value3);
                frame.push(value2);
            } else {
                let value2 = frame.pop()?;
                if value2.width() == 1 {
                    let value3 = frame.pop()?;
                    frame.push(copy(&value1));
                    frame.push(value3);
                } else {
                    frame.push(copy(&value1));
                }
                frame.push(value2);
            }
            frame.push(value1);
        }
        Shuffle::Swap => {
            let value1 = frame.pop()?;
            let value2 = frame.pop()?;
            frame.push(copy(&value1));
            frame.push(copy(&value2));
        }
    }
    Ok(())
}

/// Converged frames of an analysis
///
/// There is one frame per reachable instruction and context it runs under. Unreachable
/// instructions have no frames at all.
pub struct Frames<'a, 'm, V> {
    graph: &'a ResolvedGraph<'m>,

    /// Frames before each instruction of the block, indexed by state
    frames: Vec<Vec<Frame<V>>>,
    conflicts: Vec<Conflict>,
}

impl<'a, 'm, V: Value> Frames<'a, 'm, V> {
    pub fn graph(&self) -> &'a ResolvedGraph<'m> {
        self.graph
    }

    /// Frame before an instruction runs under some context
    pub fn frame(&self, insn: InsnIndex, context: ContextId) -> Option<&Frame<V>> {
        if insn.0 >= self.graph.body().len() {
            return None;
        }
        let block_id = self.graph.graph().block_of(insn);
        let block = self.graph.graph().block(block_id);
        let state = self.graph.state(block_id, context)?;
        self.frames[state.0].get(insn.0 - block.start.0)
    }

    /// Contexts an instruction runs under
    pub fn contexts_at(&self, insn: InsnIndex) -> &'a [ContextId] {
        if insn.0 >= self.graph.body().len() {
            return &[];
        }
        self.graph.contexts_of(self.graph.graph().block_of(insn))
    }

    /// Frames before an instruction, one per context
    pub fn frames_at(&self, insn: InsnIndex) -> impl Iterator<Item = (ContextId, &Frame<V>)> + '_ {
        self.contexts_at(insn)
            .iter()
            .filter_map(move |context| Some((*context, self.frame(insn, *context)?)))
    }

    pub fn is_reachable(&self, insn: InsnIndex) -> bool {
        !self.contexts_at(insn).is_empty()
    }

    /// Slots of the converged incoming frames that hold a conflict, sorted by block then context
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Join of the frames before an instruction across every context it runs under
    ///
    /// This is only a summary for reporting: contexts are never merged during propagation. There
    /// is no summary if the contexts disagree on the stack height.
    pub fn merged_frame<I: Interpreter<Value = V>>(
        &self,
        insn: InsnIndex,
        interpreter: &I,
    ) -> Option<Frame<V>> {
        let mut frames = self.frames_at(insn).map(|(_, frame)| frame);
        let mut merged = frames.next()?.clone();
        for frame in frames {
            if let Err(kind) = merged.merge(frame, interpreter) {
                log::warn!("No merged frame at {:?}: {:?}", insn, kind);
                return None;
            }
        }
        Some(merged)
    }
}

impl<'a, 'm> Frames<'a, 'm, SourceValue> {
    /// Instructions (or entry and handlers) that could have produced a stack value
    ///
    /// The depth counts from the top of the stack before the instruction runs, so `0` is the
    /// last operand an instruction consumes.
    pub fn sources_of(
        &self,
        insn: InsnIndex,
        context: ContextId,
        depth: usize,
    ) -> Option<&BTreeSet<Origin>> {
        let stack = &self.frame(insn, context)?.stack;
        let idx = stack.len().checked_sub(depth + 1)?;
        Some(&stack[idx].origins)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::analysis::{BasicInterpreter, BasicValue, SourceInterpreter};
    use crate::jvm::code::BranchInstruction::*;
    use crate::jvm::code::Instruction::*;
    use crate::jvm::code::{CodeBuilder, MethodBody, MethodSignature, OrdComparison};
    use crate::jvm::{BinaryName, MethodAccessFlags};

    fn builder(descriptor: &str, access_flags: MethodAccessFlags) -> CodeBuilder {
        let signature = MethodSignature::parse("Test", "m", descriptor, access_flags).unwrap();
        CodeBuilder::new(signature)
    }

    fn basic_frames(body: &MethodBody) -> Vec<String> {
        let graph = ResolvedGraph::build(body).unwrap();
        let frames = Analyzer::new(BasicInterpreter::new())
            .analyze(&graph)
            .unwrap();
        (0..body.len())
            .map(|idx| match frames.frame(InsnIndex(idx), ContextId::EMPTY) {
                Some(frame) => frame.to_string(),
                None => String::from("-"),
            })
            .collect()
    }

    #[test]
    fn straight_line() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut code = builder("(JI)I", MethodAccessFlags::STATIC);
        code.push_instruction(LLoad(0));
        code.push_instruction(L2I);
        code.push_instruction(ILoad(2));
        code.push_instruction(IAdd);
        code.push_branch_instruction(IReturn);
        let body = code.result().unwrap();

        assert_eq!(
            basic_frames(&body),
            vec!["J.I ", "J.I J", "J.I I", "J.I II", "J.I I"]
        );
    }

    #[test]
    fn wide_shuffles() {
        let mut code = builder("()V", MethodAccessFlags::STATIC);
        code.push_instruction(IConst0);
        code.push_instruction(LConst0);
        code.push_instruction(Dup2X1);
        code.push_instruction(Pop2);
        code.push_instruction(FConst0);
        code.push_instruction(Swap);
        code.push_instruction(Pop2);
        code.push_instruction(Pop2);
        code.push_branch_instruction(Return);
        let body = code.result().unwrap();

        assert_eq!(
            basic_frames(&body),
            vec![" ", " I", " IJ", " JIJ", " JI", " JIF", " JFI", " J", " "]
        );
    }

    #[test]
    fn unreachable_code_has_no_frames() {
        let mut code = builder("()V", MethodAccessFlags::STATIC);
        code.push_branch_instruction(Return);
        code.push_instruction(IConst0);
        code.push_branch_instruction(IReturn);
        let body = code.result().unwrap();

        assert_eq!(basic_frames(&body), vec![" ", "-", "-"]);

        let graph = ResolvedGraph::build(&body).unwrap();
        let frames = Analyzer::new(BasicInterpreter::new()).analyze(&graph).unwrap();
        assert!(frames.is_reachable(InsnIndex(0)));
        assert!(!frames.is_reachable(InsnIndex(1)));
        assert!(frames.contexts_at(InsnIndex(2)).is_empty());
    }

    #[test]
    fn handlers_see_every_protected_frame() {
        let mut code = builder("()V", MethodAccessFlags::STATIC);
        let start = code.fresh_label();
        let end = code.fresh_label();
        let handler = code.fresh_label();
        code.push_instruction(IConst0);
        code.push_instruction(IStore(0));
        code.place_label(start).unwrap();
        code.push_instruction(FConst0);
        code.push_instruction(FStore(0));
        code.place_label(end).unwrap();
        code.push_branch_instruction(Return);
        code.place_label(handler).unwrap();
        code.push_instruction(AStore(1));
        code.push_branch_instruction(Return);
        code.add_exception_handler(start, end, handler, Some(BinaryName::EXCEPTION));
        let body = code.result().unwrap();

        let graph = ResolvedGraph::build(&body).unwrap();
        let frames = Analyzer::new(BasicInterpreter::new()).analyze(&graph).unwrap();
        let at_handler = frames.frame(InsnIndex(5), ContextId::EMPTY).unwrap();
        assert_eq!(at_handler.to_string(), "X. Ljava/lang/Exception;");
        assert_eq!(
            frames.conflicts(),
            &[Conflict {
                block: InsnIndex(5),
                context: ContextId::EMPTY,
                location: Location::Local(0),
            }]
        );

        let quiet = Settings {
            record_conflicts: false,
            ..Settings::default()
        };
        let frames = Analyzer::with_settings(BasicInterpreter::new(), quiet)
            .analyze(&graph)
            .unwrap();
        assert!(frames.conflicts().is_empty());
    }

    #[test]
    fn returns_restore_caller_locals() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut code = builder("()V", MethodAccessFlags::PUBLIC);
        let sub = code.fresh_label();
        code.push_instruction(IConst0);
        code.push_instruction(IStore(1));
        code.push_branch_instruction(Jsr(sub));
        code.push_instruction(FConst0);
        code.push_instruction(FStore(1));
        code.push_branch_instruction(Jsr(sub));
        code.push_branch_instruction(Return);
        code.place_label(sub).unwrap();
        code.push_instruction(AStore(2));
        code.push_instruction(IConst1);
        code.push_instruction(IStore(3));
        code.push_branch_instruction(Ret(2));
        let body = code.result().unwrap();

        let graph = ResolvedGraph::build(&body).unwrap();
        let frames = Analyzer::new(BasicInterpreter::new()).analyze(&graph).unwrap();
        let subroutine = ContextId(1);
        assert_eq!(frames.contexts_at(InsnIndex(10)), &[subroutine]);
        assert_eq!(
            frames.frame(InsnIndex(10), subroutine).unwrap().to_string(),
            "LTest;XAI "
        );
        assert_eq!(
            frames.frame(InsnIndex(3), ContextId::EMPTY).unwrap().to_string(),
            "LTest;IAI "
        );
        assert_eq!(
            frames.frame(InsnIndex(6), ContextId::EMPTY).unwrap().to_string(),
            "LTest;FAI "
        );

        // Slots 2 and 3 are only assigned by the first call, so they are merely unusable
        assert_eq!(
            frames.conflicts(),
            &[Conflict {
                block: InsnIndex(7),
                context: subroutine,
                location: Location::Local(1),
            }]
        );
    }

    #[test]
    fn provenance_through_branches() {
        let mut code = builder("(I)V", MethodAccessFlags::STATIC);
        let other = code.fresh_label();
        let join = code.fresh_label();
        code.push_instruction(ILoad(0));
        code.push_branch_instruction(If(OrdComparison::EQ, other));
        code.push_instruction(IConst1);
        code.push_branch_instruction(Goto(join));
        code.place_label(other).unwrap();
        code.push_instruction(IConst2);
        code.place_label(join).unwrap();
        code.push_instruction(IStore(0));
        code.push_branch_instruction(Return);
        let body = code.result().unwrap();

        let graph = ResolvedGraph::build(&body).unwrap();
        let frames = Analyzer::new(SourceInterpreter).analyze(&graph).unwrap();
        let ctx = ContextId::EMPTY;

        let stored: Vec<Origin> = frames
            .sources_of(InsnIndex(5), ctx, 0)
            .unwrap()
            .iter()
            .copied()
            .collect();
        assert_eq!(
            stored,
            vec![
                Origin::Instruction(InsnIndex(2)),
                Origin::Instruction(InsnIndex(4))
            ]
        );
        assert_eq!(frames.sources_of(InsnIndex(5), ctx, 1), None);
        let entry = frames.frame(InsnIndex(0), ctx).unwrap();
        assert_eq!(entry.to_string(), "1{entry} ");
        let reloaded = frames.frame(InsnIndex(6), ctx).unwrap();
        assert_eq!(reloaded.to_string(), "1{5} ");

        let merged = frames
            .merged_frame(InsnIndex(5), &SourceInterpreter)
            .unwrap();
        assert_eq!(merged.to_string(), "1{entry} 1{2,4}");
    }

    #[test]
    fn malformed_stacks() {
        let mut code = builder("()V", MethodAccessFlags::STATIC);
        code.push_instruction(Pop);
        code.push_branch_instruction(Return);
        let body = code.result().unwrap();
        let graph = ResolvedGraph::build(&body).unwrap();
        let err = Analyzer::new(BasicInterpreter::new())
            .analyze(&graph)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Malformed {
                instruction: InsnIndex(0),
                kind: MalformedInput::StackUnderflow
            }
        ));

        let mut code = builder("()V", MethodAccessFlags::STATIC);
        let head = code.fresh_label();
        code.place_label(head).unwrap();
        code.push_instruction(IConst0);
        code.push_branch_instruction(Goto(head));
        let body = code.result().unwrap();
        let graph = ResolvedGraph::build(&body).unwrap();
        let err = Analyzer::new(BasicInterpreter::new())
            .analyze(&graph)
            .err()
            .unwrap();
        assert_eq!(
            err.malformed_kind(),
            Some(&MalformedInput::StackHeightMismatch {
                expected: 0,
                found: 1
            })
        );
    }

    #[test]
    fn budget_is_enforced() {
        let mut code = builder("(I)V", MethodAccessFlags::STATIC);
        let done = code.fresh_label();
        code.push_instruction(ILoad(0));
        code.push_branch_instruction(If(OrdComparison::EQ, done));
        code.push_instruction(IInc(0, 1));
        code.place_label(done).unwrap();
        code.push_branch_instruction(Return);
        let body = code.result().unwrap();
        let graph = ResolvedGraph::build(&body).unwrap();

        let settings = Settings {
            iteration_budget: 2,
            ..Settings::default()
        };
        let err = Analyzer::with_settings(BasicInterpreter::new(), settings)
            .analyze(&graph)
            .err()
            .unwrap();
        assert!(err.is_non_terminating());
        assert!(matches!(err, Error::NonTerminating { budget: 2, .. }));

        let frames = Analyzer::new(BasicInterpreter::new()).analyze(&graph).unwrap();
        assert_eq!(
            frames.frame(InsnIndex(3), ContextId::EMPTY).unwrap().locals,
            vec![BasicValue::Int]
        );
    }
}
