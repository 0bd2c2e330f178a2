use super::{BasicBlock, BlockId, Edge, EdgeKind, Insn, InsnIndex, MethodBody};
use crate::jvm::{Error, MalformedInput};
use crate::util::BitSet;
use std::collections::{BTreeMap, BTreeSet};

/// Basic blocks of a method body, along with the edges between them that are known statically
///
/// Subroutine returns have no edges here: see [`super::SubroutineResolver`].
#[derive(Debug)]
pub struct ControlFlowGraph<'m> {
    body: &'m MethodBody,

    /// Blocks, sorted by their first instruction
    blocks: Vec<BasicBlock>,

    /// Block containing each instruction
    block_of: Vec<BlockId>,
}

impl<'m> ControlFlowGraph<'m> {
    /// Shorthand for [`GraphBuilder::build`]
    pub fn build(body: &'m MethodBody) -> Result<ControlFlowGraph<'m>, Error> {
        GraphBuilder::new(body).build()
    }

    pub fn body(&self) -> &'m MethodBody {
        self.body
    }

    /// The block containing the first instruction of the method
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, block: BlockId) -> &BasicBlock {
        &self.blocks[block.0]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Block containing an instruction
    pub fn block_of(&self, insn: InsnIndex) -> BlockId {
        self.block_of[insn.0]
    }

    /// Block whose first instruction is `insn`, if there is one
    pub fn block_starting_at(&self, insn: InsnIndex) -> Option<BlockId> {
        let block = *self.block_of.get(insn.0)?;
        if self.blocks[block.0].start == insn {
            Some(block)
        } else {
            None
        }
    }

    /// Entries of every subroutine called somewhere in the code (reachable or not)
    pub fn subroutine_entries(&self) -> BTreeSet<BlockId> {
        self.blocks
            .iter()
            .flat_map(|block| block.edges_of_kind(EdgeKind::SubroutineCall))
            .map(|edge| edge.target)
            .collect()
    }

    /// Render the graph as `N<offset>=N<offset>,...` lines (one per block, successors sorted)
    pub fn render_shape(&self) -> String {
        render_adjacency(
            self.body,
            self.blocks.iter().map(|block| {
                let targets = block
                    .successors
                    .iter()
                    .map(|edge| self.blocks[edge.target.0].start)
                    .collect();
                (block.start, targets)
            }),
        )
    }
}

/// Shared textual rendering of raw and resolved graphs
pub(crate) fn render_adjacency(
    body: &MethodBody,
    blocks: impl Iterator<Item = (InsnIndex, BTreeSet<InsnIndex>)>,
) -> String {
    let mut lines = vec![];
    for (start, targets) in blocks {
        let targets: Vec<String> = targets
            .into_iter()
            .map(|target| format!("N{}", body.offset_of(target).0))
            .collect();
        lines.push(format!(
            "N{}={}",
            body.offset_of(start).0,
            targets.join(",")
        ));
    }
    lines.join("\n")
}

/// Partition a method body into basic blocks, and find the edges between them
///
/// Block boundaries are at: the first instruction, every jump and subroutine target, the
/// instruction after every branch (including returns, throws, `jsr` and `ret`), every handler
/// entry, and both ends of every protected range. Including the range ends means a block is
/// always either entirely inside or entirely outside a protected range.
pub struct GraphBuilder<'m> {
    body: &'m MethodBody,

    /// Instructions that start a block (capacity is one more than the code length, so that the
    /// end of the code can be marked too)
    leaders: BitSet,
}

impl<'m> GraphBuilder<'m> {
    pub fn new(body: &'m MethodBody) -> GraphBuilder<'m> {
        GraphBuilder {
            body,
            leaders: BitSet::new(body.len() + 1),
        }
    }

    pub fn build(mut self) -> Result<ControlFlowGraph<'m>, Error> {
        let len = self.body.len();
        if len == 0 {
            return Err(Error::malformed(InsnIndex(0), MalformedInput::EmptyCode));
        }

        let last = InsnIndex(len - 1);
        let falls_off = match self.body.instruction(last) {
            Insn::Simple(_) => true,
            Insn::Branch(branch) => branch.falls_through(),
        };
        if falls_off {
            return Err(Error::malformed(last, MalformedInput::FallsOffEnd));
        }

        self.find_leaders();
        let (mut blocks, block_of) = self.partition();

        for block_idx in 0..blocks.len() {
            let successors = self.successors(BlockId(block_idx), &blocks[block_idx], &block_of);
            blocks[block_idx].successors = successors;
        }
        for block_idx in 0..blocks.len() {
            for edge_idx in 0..blocks[block_idx].successors.len() {
                let Edge { source, target, .. } = blocks[block_idx].successors[edge_idx];
                let predecessors = &mut blocks[target.0].predecessors;
                if !predecessors.contains(&source) {
                    predecessors.push(source);
                }
            }
        }
        for block in &mut blocks {
            block.predecessors.sort();
        }

        log::trace!(
            "Found {} basic blocks in {} instructions",
            blocks.len(),
            len
        );

        Ok(ControlFlowGraph {
            body: self.body,
            blocks,
            block_of,
        })
    }

    fn find_leaders(&mut self) {
        self.leaders.insert(0);

        for (_, idx, insn) in self.body.instructions() {
            if let Insn::Branch(branch) = insn {
                self.leaders.insert(idx + 1);
                for target in branch.jump_targets() {
                    self.leaders.insert(target.0);
                }
                if let Some(target) = branch.subroutine_target() {
                    self.leaders.insert(target.0);
                }
            }
        }

        for handler in self.body.exception_table() {
            self.leaders.insert(handler.start.0);
            self.leaders.insert(handler.end.0);
            self.leaders.insert(handler.handler.0);
        }
    }

    /// Cut the code at every leader
    fn partition(&self) -> (Vec<BasicBlock>, Vec<BlockId>) {
        let len = self.body.len();
        let starts: Vec<usize> = self.leaders.iter().filter(|idx| *idx < len).collect();

        let mut blocks = Vec::with_capacity(starts.len());
        let mut block_of = Vec::with_capacity(len);
        for (block_idx, start) in starts.iter().enumerate() {
            let end = starts.get(block_idx + 1).copied().unwrap_or(len);
            blocks.push(BasicBlock {
                start: InsnIndex(*start),
                end: InsnIndex(end),
                successors: vec![],
                predecessors: vec![],
            });
            block_of.extend((*start..end).map(|_| BlockId(block_idx)));
        }

        (blocks, block_of)
    }

    /// Raw outgoing edges of a block
    fn successors(&self, id: BlockId, block: &BasicBlock, block_of: &[BlockId]) -> Vec<Edge> {
        let mut edges: Vec<Edge> = vec![];
        let mut add_edge = |target: InsnIndex, kind: EdgeKind| {
            let edge = Edge {
                source: id,
                target: block_of[target.0],
                kind,
            };
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        };

        let has_next = block.end.0 < self.body.len();
        match self.body.instruction(block.last_instruction()) {
            Insn::Simple(_) => add_edge(block.end, EdgeKind::FallThrough),
            Insn::Branch(branch) => {
                if branch.falls_through() {
                    add_edge(block.end, EdgeKind::FallThrough);
                }
                for target in branch.jump_targets() {
                    add_edge(target, EdgeKind::Jump);
                }
                if let Some(target) = branch.subroutine_target() {
                    add_edge(target, EdgeKind::SubroutineCall);
                    if has_next {
                        add_edge(block.end, EdgeKind::SubroutineContinuation);
                    }
                }
            }
        }

        for (handler_idx, handler) in self.body.exception_table().iter().enumerate() {
            if handler.start <= block.start && block.end <= handler.end {
                add_edge(
                    handler.handler,
                    EdgeKind::Exception {
                        handler: handler_idx,
                    },
                );
            }
        }

        edges
    }
}

/// Successor offsets of every block, keyed by block offset (handy for comparing shapes)
pub fn parse_shape(shape: &str) -> BTreeMap<String, BTreeSet<String>> {
    shape
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (node, targets) = line.trim().split_once('=').unwrap_or((line.trim(), ""));
            let targets = targets
                .split(',')
                .filter(|target| !target.is_empty())
                .map(String::from)
                .collect();
            (node.to_owned(), targets)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::BranchInstruction::*;
    use crate::jvm::code::Instruction::*;
    use crate::jvm::code::{CodeBuilder, EqComparison, MethodSignature, OrdComparison};
    use crate::jvm::MethodAccessFlags;

    fn builder() -> CodeBuilder {
        let signature =
            MethodSignature::parse("Test", "m", "()V", MethodAccessFlags::PUBLIC).unwrap();
        CodeBuilder::new(signature)
    }

    #[test]
    fn loop_with_condition() {
        let mut code = builder();
        let head = code.fresh_label();
        let exit = code.fresh_label();
        code.push_instruction(IConst0);
        code.push_instruction(IStore(1));
        code.place_label(head).unwrap();
        code.push_instruction(ILoad(1));
        code.push_branch_instruction(If(OrdComparison::NE, exit));
        code.push_instruction(IInc(1, 1));
        code.push_branch_instruction(Goto(head));
        code.place_label(exit).unwrap();
        code.push_branch_instruction(Return);
        let body = code.result().unwrap();

        let graph = ControlFlowGraph::build(&body).unwrap();
        assert_eq!(graph.blocks().len(), 4);
        assert_eq!(graph.render_shape(), "N0=N2\nN2=N6,N12\nN6=N2\nN12=");
        assert_eq!(
            graph.block(BlockId(1)).predecessors,
            vec![BlockId(0), BlockId(2)]
        );
        assert_eq!(graph.block_of(InsnIndex(3)), BlockId(1));
        assert_eq!(graph.block_starting_at(InsnIndex(3)), None);
        assert_eq!(graph.block_starting_at(InsnIndex(4)), Some(BlockId(2)));
    }

    #[test]
    fn protected_ranges_split_blocks() {
        let mut code = builder();
        let start = code.fresh_label();
        let end = code.fresh_label();
        let handler = code.fresh_label();
        code.push_instruction(IConst0);
        code.place_label(start).unwrap();
        code.push_instruction(IStore(1));
        code.push_instruction(AConstNull);
        code.place_label(end).unwrap();
        code.push_instruction(Pop);
        code.push_branch_instruction(Return);
        code.place_label(handler).unwrap();
        code.push_branch_instruction(AThrow);
        code.add_exception_handler(start, end, handler, None);
        let body = code.result().unwrap();

        let graph = ControlFlowGraph::build(&body).unwrap();
        let starts: Vec<InsnIndex> = graph.blocks().iter().map(|block| block.start).collect();
        assert_eq!(
            starts,
            vec![InsnIndex(0), InsnIndex(1), InsnIndex(3), InsnIndex(5)]
        );
        let protected = graph.block(BlockId(1));
        assert_eq!(
            protected.exception_edges().collect::<Vec<_>>(),
            vec![(0, BlockId(3))]
        );
        assert_eq!(graph.block(BlockId(2)).exception_edges().count(), 0);
    }

    #[test]
    fn subroutine_edges() {
        let mut code = builder();
        let sub = code.fresh_label();
        code.push_branch_instruction(Jsr(sub));
        code.push_branch_instruction(Return);
        code.place_label(sub).unwrap();
        code.push_instruction(AStore(1));
        code.push_branch_instruction(Ret(1));
        let body = code.result().unwrap();

        let graph = ControlFlowGraph::build(&body).unwrap();
        let kinds: Vec<EdgeKind> = graph
            .block(BlockId(0))
            .successors
            .iter()
            .map(|edge| edge.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![EdgeKind::SubroutineCall, EdgeKind::SubroutineContinuation]
        );
        assert!(graph.block(BlockId(2)).successors.is_empty());
        assert_eq!(
            graph.subroutine_entries().into_iter().collect::<Vec<_>>(),
            vec![BlockId(2)]
        );
    }

    #[test]
    fn malformed_bodies() {
        let code = builder();
        let err = ControlFlowGraph::build(&code.result().unwrap()).unwrap_err();
        assert_eq!(err.malformed_kind(), Some(&MalformedInput::EmptyCode));

        let mut code = builder();
        let lbl = code.fresh_label();
        code.place_label(lbl).unwrap();
        code.push_instruction(AConstNull);
        code.push_branch_instruction(IfNull(EqComparison::EQ, lbl));
        let err = ControlFlowGraph::build(&code.result().unwrap()).unwrap_err();
        assert_eq!(err.malformed_kind(), Some(&MalformedInput::FallsOffEnd));
    }

    #[test]
    fn shapes_parse_as_sets() {
        let parsed = parse_shape("N0=N5,N2\nN2=\n");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["N0"].len(), 2);
        assert!(parsed["N2"].is_empty());
    }
}
