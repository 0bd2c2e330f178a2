use super::{BlockId, ControlFlowGraph, EdgeKind, Insn, InsnIndex, Instruction, MethodBody};
use crate::jvm::{Error, MalformedInput};
use crate::util::BitSet;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

/// Subroutine, numbered in order of entry instruction
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubroutineId(pub usize);

impl fmt::Debug for SubroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Interned activation context (stack of active subroutines, innermost last)
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ContextId(pub usize);

impl ContextId {
    /// Context outside of any subroutine
    pub const EMPTY: ContextId = ContextId(0);
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// A reachable pair of a block and a context it executes under
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StateId(pub usize);

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A `jsr` block and the context it executes under
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct CallSite {
    pub block: BlockId,
    pub context: ContextId,
}

#[derive(Clone, Debug)]
pub struct Subroutine {
    /// Block targeted by the `jsr` instructions
    pub entry: BlockId,

    /// Local the return address is stored into, if the subroutine starts with an `astore`
    pub return_address_slot: Option<u16>,

    /// Blocks executed while this subroutine is the innermost active one
    pub blocks: BTreeSet<BlockId>,

    /// Reachable call sites
    pub call_sites: Vec<CallSite>,

    /// Subroutines called while this one is the innermost active one
    pub nested: BTreeSet<SubroutineId>,

    /// Blocks ending in a `ret` that leaves this subroutine
    pub returns: BTreeSet<BlockId>,

    /// Local slots assigned by this subroutine or anything it calls
    pub write_set: BitSet,
}

/// Details of a subroutine return edge
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Exit {
    /// Subroutine being left (nested subroutines inside it are left too)
    pub subroutine: SubroutineId,

    /// State of the `jsr` block being returned to
    pub call_site: StateId,

    /// State of the subroutine entry under the activation being left
    pub activation: StateId,
}

/// Edge between states, which is what the dataflow engines propagate along
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Transition {
    pub kind: EdgeKind,
    pub target: BlockId,
    pub context: ContextId,
    pub state: StateId,

    /// Only set on `SubroutineReturn` edges
    pub exit: Option<Exit>,
}

/// Control flow graph where every subroutine return has been resolved
///
/// Blocks are never duplicated: a block reachable under several activation contexts is
/// represented once, and the contexts it runs under are tracked on the side. The edges the
/// engines propagate along are between `(block, context)` states.
#[derive(Debug)]
pub struct ResolvedGraph<'m> {
    graph: ControlFlowGraph<'m>,
    subroutines: Vec<Subroutine>,
    subroutine_of_entry: HashMap<BlockId, SubroutineId>,
    contexts: Vec<Vec<SubroutineId>>,
    states: Vec<(BlockId, ContextId)>,
    state_ids: HashMap<(BlockId, ContextId), StateId>,
    transitions: Vec<Vec<Transition>>,
    returns_to: Vec<Vec<StateId>>,
    contexts_of: Vec<Vec<ContextId>>,
}

impl<'m> ResolvedGraph<'m> {
    /// Build the control flow graph of a method body and resolve its subroutines
    pub fn build(body: &'m MethodBody) -> Result<ResolvedGraph<'m>, Error> {
        SubroutineResolver::new(ControlFlowGraph::build(body)?).resolve()
    }

    pub fn graph(&self) -> &ControlFlowGraph<'m> {
        &self.graph
    }

    pub fn body(&self) -> &'m MethodBody {
        self.graph.body()
    }

    pub fn subroutines(&self) -> &[Subroutine] {
        &self.subroutines
    }

    pub fn subroutine(&self, id: SubroutineId) -> &Subroutine {
        &self.subroutines[id.0]
    }

    /// Subroutine whose entry is this block
    pub fn subroutine_at(&self, entry: BlockId) -> Option<SubroutineId> {
        self.subroutine_of_entry.get(&entry).copied()
    }

    /// Active subroutines of a context, innermost last
    pub fn context(&self, id: ContextId) -> &[SubroutineId] {
        &self.contexts[id.0]
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Contexts a block is reachable under (empty if the block is dead code)
    pub fn contexts_of(&self, block: BlockId) -> &[ContextId] {
        &self.contexts_of[block.0]
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        !self.contexts_of[block.0].is_empty()
    }

    /// State of the first block of the method
    pub fn entry_state(&self) -> StateId {
        StateId(0)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, block: BlockId, context: ContextId) -> Option<StateId> {
        self.state_ids.get(&(block, context)).copied()
    }

    pub fn state_info(&self, state: StateId) -> (BlockId, ContextId) {
        self.states[state.0]
    }

    /// Every reachable `(block, context)` pair, in discovery order
    pub fn reachable_states(&self) -> impl Iterator<Item = (BlockId, ContextId)> + '_ {
        self.states.iter().copied()
    }

    /// Edges out of a block when it runs under a given context
    pub fn transitions(&self, block: BlockId, context: ContextId) -> &[Transition] {
        match self.state(block, context) {
            Some(state) => &self.transitions[state.0],
            None => &[],
        }
    }

    pub fn transitions_from(&self, state: StateId) -> &[Transition] {
        &self.transitions[state.0]
    }

    /// States of the `ret` blocks that return to a call site state
    pub fn returns_to(&self, call_site: StateId) -> &[StateId] {
        &self.returns_to[call_site.0]
    }

    /// Successors of a block: the raw edges plus resolved returns, across all contexts
    pub fn successors(&self, block: BlockId) -> BTreeSet<BlockId> {
        let mut successors: BTreeSet<BlockId> = self
            .graph
            .block(block)
            .successors
            .iter()
            .map(|edge| edge.target)
            .collect();
        for context in self.contexts_of(block) {
            for transition in self.transitions(block, *context) {
                successors.insert(transition.target);
            }
        }
        successors
    }

    /// Render like [`ControlFlowGraph::render_shape`], but including resolved returns
    pub fn render_shape(&self) -> String {
        super::graph::render_adjacency(
            self.body(),
            self.graph.block_ids().map(|block| {
                let targets = self
                    .successors(block)
                    .into_iter()
                    .map(|target| self.graph.block(target).start)
                    .collect();
                (self.graph.block(block).start, targets)
            }),
        )
    }
}

/// Assign activation contexts to blocks, and resolve where every `ret` goes
///
/// The traversal is over `(block, context)` states, starting from the method entry under the
/// empty context. A `jsr` pushes the callee onto the context. A `ret r` under `[S1, ..., Sk]`
/// leaves the innermost `Si` whose return address slot is `r` (or `Sk` if none match), returning
/// to the continuations of the call sites of `Si` made under `[S1, ..., Si-1]`. Call sites and
/// returns are matched whenever either is discovered, so the result does not depend on the order
/// states are visited in.
pub struct SubroutineResolver<'m> {
    graph: ControlFlowGraph<'m>,
    subroutine_of_entry: HashMap<BlockId, SubroutineId>,
    entries: Vec<BlockId>,

    contexts: Vec<Vec<SubroutineId>>,
    context_ids: HashMap<Vec<SubroutineId>, ContextId>,

    states: Vec<(BlockId, ContextId)>,
    state_ids: HashMap<(BlockId, ContextId), StateId>,
    transitions: Vec<Vec<Transition>>,
    worklist: VecDeque<StateId>,

    /// Call site blocks of a subroutine, keyed by the subroutine and the caller context
    call_sites: HashMap<(SubroutineId, ContextId), Vec<BlockId>>,

    /// `ret` states leaving a subroutine, keyed like `call_sites`, with their activation state
    exits: HashMap<(SubroutineId, ContextId), Vec<(StateId, StateId)>>,

    ret_states: Vec<StateId>,
}

impl<'m> SubroutineResolver<'m> {
    pub fn new(graph: ControlFlowGraph<'m>) -> SubroutineResolver<'m> {
        let entries: Vec<BlockId> = graph.subroutine_entries().into_iter().collect();
        let subroutine_of_entry = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (*entry, SubroutineId(idx)))
            .collect();

        let mut context_ids = HashMap::new();
        context_ids.insert(vec![], ContextId::EMPTY);

        SubroutineResolver {
            graph,
            subroutine_of_entry,
            entries,
            contexts: vec![vec![]],
            context_ids,
            states: vec![],
            state_ids: HashMap::new(),
            transitions: vec![],
            worklist: VecDeque::new(),
            call_sites: HashMap::new(),
            exits: HashMap::new(),
            ret_states: vec![],
        }
    }

    pub fn resolve(mut self) -> Result<ResolvedGraph<'m>, Error> {
        let entry = self.graph.entry();
        self.add_state(entry, ContextId::EMPTY);

        while let Some(state) = self.worklist.pop_front() {
            self.visit(state)?;
        }

        for ret_state in &self.ret_states {
            let resolved = self.transitions[ret_state.0]
                .iter()
                .any(|transition| transition.exit.is_some());
            if !resolved {
                let (block, _) = self.states[ret_state.0];
                let ret = self.graph.block(block).last_instruction();
                return Err(Error::malformed(ret, MalformedInput::UnresolvableReturn));
            }
        }

        self.finish()
    }

    fn intern_context(&mut self, context: Vec<SubroutineId>) -> ContextId {
        if let Some(id) = self.context_ids.get(&context) {
            return *id;
        }
        let id = ContextId(self.contexts.len());
        self.contexts.push(context.clone());
        self.context_ids.insert(context, id);
        id
    }

    fn add_state(&mut self, block: BlockId, context: ContextId) -> StateId {
        if let Some(state) = self.state_ids.get(&(block, context)) {
            return *state;
        }
        let state = StateId(self.states.len());
        log::trace!("Reached {:?} under {:?}", block, self.contexts[context.0]);
        self.states.push((block, context));
        self.state_ids.insert((block, context), state);
        self.transitions.push(vec![]);
        self.worklist.push_back(state);
        state
    }

    fn add_transition(
        &mut self,
        from: StateId,
        kind: EdgeKind,
        target: BlockId,
        context: ContextId,
    ) {
        let state = self.add_state(target, context);
        self.transitions[from.0].push(Transition {
            kind,
            target,
            context,
            state,
            exit: None,
        });
    }

    fn visit(&mut self, state: StateId) -> Result<(), Error> {
        let (block_id, context) = self.states[state.0];
        let block = self.graph.block(block_id);
        let last = block.last_instruction();
        let edges = block.successors.clone();
        let continuation = block
            .edges_of_kind(EdgeKind::SubroutineContinuation)
            .next()
            .map(|edge| edge.target);

        for edge in edges {
            match edge.kind {
                EdgeKind::FallThrough | EdgeKind::Jump | EdgeKind::Exception { .. } => {
                    self.add_transition(state, edge.kind, edge.target, context);
                }
                EdgeKind::SubroutineCall => {
                    let subroutine = self.subroutine_of_entry[&edge.target];
                    let mut callee_context = self.contexts[context.0].clone();
                    if callee_context.contains(&subroutine) {
                        let entry = self.graph.block(edge.target).start;
                        let kind = MalformedInput::RecursiveSubroutine(entry);
                        return Err(Error::malformed(last, kind));
                    }
                    callee_context.push(subroutine);
                    let callee_context = self.intern_context(callee_context);
                    self.add_transition(state, edge.kind, edge.target, callee_context);

                    if let Some(continuation) = continuation {
                        self.add_call_site(subroutine, context, block_id, continuation);
                    }
                }
                EdgeKind::SubroutineContinuation | EdgeKind::SubroutineReturn => (),
            }
        }

        if let Insn::Branch(branch) = self.graph.body().instruction(last) {
            if let Some(slot) = branch.return_address_slot() {
                self.add_return(state, last, slot)?;
            }
        }

        Ok(())
    }

    /// Record a call site, and link it with the returns already found
    fn add_call_site(
        &mut self,
        subroutine: SubroutineId,
        caller: ContextId,
        block: BlockId,
        continuation: BlockId,
    ) {
        let sites = self.call_sites.entry((subroutine, caller)).or_default();
        if sites.contains(&block) {
            return;
        }
        sites.push(block);

        let pending = self
            .exits
            .get(&(subroutine, caller))
            .cloned()
            .unwrap_or_default();
        for (ret_state, activation) in pending {
            self.link_return(ret_state, subroutine, activation, block, continuation, caller);
        }
    }

    /// Decide which subroutine a `ret` leaves, and link it with the call sites already found
    fn add_return(&mut self, state: StateId, ret: InsnIndex, slot: u16) -> Result<(), Error> {
        let (_, context) = self.states[state.0];
        let active = self.contexts[context.0].clone();
        if active.is_empty() {
            return Err(Error::malformed(ret, MalformedInput::UnresolvableReturn));
        }

        let level = active
            .iter()
            .rposition(|subroutine| {
                self.return_address_slot(self.entries[subroutine.0]) == Some(slot)
            })
            .unwrap_or(active.len() - 1);
        let subroutine = active[level];
        let caller = self.intern_context(active[..level].to_vec());
        let activation_context = self.intern_context(active[..=level].to_vec());
        let entry = self.entries[subroutine.0];
        let activation = self.add_state(entry, activation_context);

        self.ret_states.push(state);
        self.exits
            .entry((subroutine, caller))
            .or_default()
            .push((state, activation));

        let sites = self
            .call_sites
            .get(&(subroutine, caller))
            .cloned()
            .unwrap_or_default();
        for call_block in sites {
            let continuation = self
                .graph
                .block(call_block)
                .edges_of_kind(EdgeKind::SubroutineContinuation)
                .next()
                .map(|edge| edge.target);
            if let Some(continuation) = continuation {
                self.link_return(state, subroutine, activation, call_block, continuation, caller);
            }
        }

        Ok(())
    }

    fn link_return(
        &mut self,
        ret_state: StateId,
        subroutine: SubroutineId,
        activation: StateId,
        call_block: BlockId,
        continuation: BlockId,
        caller: ContextId,
    ) {
        let call_site = self.add_state(call_block, caller);
        let target_state = self.add_state(continuation, caller);
        log::debug!(
            "Return from {:?} in {:?} goes to {:?} (called from {:?})",
            subroutine,
            self.states[ret_state.0].0,
            continuation,
            call_block
        );
        self.transitions[ret_state.0].push(Transition {
            kind: EdgeKind::SubroutineReturn,
            target: continuation,
            context: caller,
            state: target_state,
            exit: Some(Exit {
                subroutine,
                call_site,
                activation,
            }),
        });
    }

    fn return_address_slot(&self, entry: BlockId) -> Option<u16> {
        let first = self.graph.block(entry).start;
        match self.graph.body().instruction(first) {
            Insn::Simple(Instruction::AStore(slot)) => Some(*slot),
            _ => None,
        }
    }

    /// Gather per-subroutine and per-block summaries
    fn finish(mut self) -> Result<ResolvedGraph<'m>, Error> {
        let locals = self.graph.body().locals_bound();
        let mut subroutines: Vec<Subroutine> = self
            .entries
            .iter()
            .map(|entry| Subroutine {
                entry: *entry,
                return_address_slot: self.return_address_slot(*entry),
                blocks: BTreeSet::new(),
                call_sites: vec![],
                nested: BTreeSet::new(),
                returns: BTreeSet::new(),
                write_set: BitSet::new(locals),
            })
            .collect();

        let mut contexts_of: Vec<Vec<ContextId>> = vec![vec![]; self.graph.blocks().len()];
        for (block, context) in &self.states {
            contexts_of[block.0].push(*context);
            if let Some(innermost) = self.contexts[context.0].last() {
                subroutines[innermost.0].blocks.insert(*block);
            }
        }
        for contexts in &mut contexts_of {
            contexts.sort();
        }

        for ((subroutine, caller), blocks) in &self.call_sites {
            for block in blocks {
                subroutines[subroutine.0].call_sites.push(CallSite {
                    block: *block,
                    context: *caller,
                });
            }
            if let Some(innermost) = self.contexts[caller.0].last() {
                subroutines[innermost.0].nested.insert(*subroutine);
            }
        }
        for ((subroutine, _), rets) in &self.exits {
            for (ret_state, _) in rets {
                subroutines[subroutine.0].returns.insert(self.states[ret_state.0].0);
            }
        }
        for subroutine in &mut subroutines {
            subroutine.call_sites.sort();
        }

        let own_writes: Vec<BitSet> = subroutines
            .iter()
            .map(|subroutine| self.own_writes(subroutine, locals))
            .collect();
        let write_sets = compute_write_sets(&subroutines, own_writes, &self.graph)?;
        for (subroutine, write_set) in subroutines.iter_mut().zip(write_sets) {
            subroutine.write_set = write_set;
        }

        let mut returns_to: Vec<Vec<StateId>> = vec![vec![]; self.states.len()];
        for (state, transitions) in self.transitions.iter_mut().enumerate() {
            transitions.sort_by_key(|transition| {
                (transition.target, transition.context, transition.kind)
            });
            transitions.dedup();
            for transition in transitions.iter() {
                if let Some(exit) = transition.exit {
                    let returning = &mut returns_to[exit.call_site.0];
                    if !returning.contains(&StateId(state)) {
                        returning.push(StateId(state));
                    }
                }
            }
        }

        log::debug!(
            "Resolved {} subroutines, {} contexts, {} states",
            subroutines.len(),
            self.contexts.len(),
            self.states.len()
        );

        Ok(ResolvedGraph {
            graph: self.graph,
            subroutines,
            subroutine_of_entry: self.subroutine_of_entry,
            contexts: self.contexts,
            states: self.states,
            state_ids: self.state_ids,
            transitions: self.transitions,
            returns_to,
            contexts_of,
        })
    }

    /// Slots assigned by the blocks a subroutine runs as the innermost subroutine
    fn own_writes(&self, subroutine: &Subroutine, locals: usize) -> BitSet {
        let mut writes = BitSet::new(locals);
        let body = self.graph.body();
        for block in &subroutine.blocks {
            for insn in self.graph.block(*block).instructions() {
                if let Some(access) = body.instruction(insn).local_access() {
                    if access.write {
                        for slot in access.slot as usize..access.end() {
                            writes.insert(slot);
                        }
                    }
                }
            }
        }
        writes
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Colour {
    Unvisited,
    InProgress,
    Done,
}

/// Close write-sets over the nesting relation, rejecting cycles
fn compute_write_sets(
    subroutines: &[Subroutine],
    own_writes: Vec<BitSet>,
    graph: &ControlFlowGraph,
) -> Result<Vec<BitSet>, Error> {
    fn visit(
        subroutine: SubroutineId,
        subroutines: &[Subroutine],
        graph: &ControlFlowGraph,
        colours: &mut [Colour],
        write_sets: &mut [BitSet],
    ) -> Result<(), Error> {
        colours[subroutine.0] = Colour::InProgress;
        for nested in &subroutines[subroutine.0].nested {
            match colours[nested.0] {
                Colour::InProgress => {
                    let entry = graph.block(subroutines[nested.0].entry).start;
                    return Err(Error::malformed(
                        entry,
                        MalformedInput::RecursiveSubroutine(entry),
                    ));
                }
                Colour::Unvisited => visit(*nested, subroutines, graph, colours, write_sets)?,
                Colour::Done => (),
            }
            let nested_writes = write_sets[nested.0].clone();
            write_sets[subroutine.0].union_with(&nested_writes);
        }
        colours[subroutine.0] = Colour::Done;
        Ok(())
    }

    let mut colours = vec![Colour::Unvisited; subroutines.len()];
    let mut write_sets = own_writes;
    for idx in 0..subroutines.len() {
        if colours[idx] == Colour::Unvisited {
            visit(
                SubroutineId(idx),
                subroutines,
                graph,
                &mut colours,
                &mut write_sets,
            )?;
        }
    }
    Ok(write_sets)
}
