use super::InsnIndex;
use std::fmt;
use std::ops::Range;

/// Position of a basic block in the graph's block arena
///
/// Blocks are stored in the order of their first instruction, so comparing block ids is the same
/// as comparing block starts.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlockId(pub usize);

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// How control gets from one block to another
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum EdgeKind {
    /// Execution continues with the next instruction
    FallThrough,

    /// Explicit jump (conditional or not, including switch targets)
    Jump,

    /// An instruction in the source block may throw and land in the handler with this index in
    /// the exception table
    Exception { handler: usize },

    /// `jsr` or `jsr_w` into the entry of a subroutine
    SubroutineCall,

    /// From a `jsr` block to the instruction after it
    ///
    /// Control only ever arrives here through a `ret`, so this edge is part of the shape of the
    /// graph but no data flows along it.
    SubroutineContinuation,

    /// From a `ret` to the instruction after one of the matching `jsr`
    SubroutineReturn,
}

/// Directed edge between two blocks
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Edge {
    pub source: BlockId,
    pub target: BlockId,
    pub kind: EdgeKind,
}

/// Maximal run of instructions with a single entry and no internal jump targets
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicBlock {
    /// First instruction (this is what identifies the block in output)
    pub start: InsnIndex,

    /// One past the last instruction
    pub end: InsnIndex,

    /// Outgoing edges known without resolving subroutine returns
    pub successors: Vec<Edge>,

    /// Blocks with a raw edge into this one
    pub predecessors: Vec<BlockId>,
}

impl BasicBlock {
    /// Indices of the instructions in the block
    pub fn instructions(&self) -> impl DoubleEndedIterator<Item = InsnIndex> {
        self.range().map(InsnIndex)
    }

    /// Last instruction in the block (the only one that can branch)
    pub fn last_instruction(&self) -> InsnIndex {
        InsnIndex(self.end.0 - 1)
    }

    pub fn len(&self) -> usize {
        self.end.0 - self.start.0
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, insn: InsnIndex) -> bool {
        self.range().contains(&insn.0)
    }

    fn range(&self) -> Range<usize> {
        self.start.0..self.end.0
    }

    /// Edges of a given kind
    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> + '_ {
        self.successors.iter().filter(move |edge| edge.kind == kind)
    }

    /// Exception edges, with the index of the handler in the exception table
    pub fn exception_edges(&self) -> impl Iterator<Item = (usize, BlockId)> + '_ {
        self.successors.iter().filter_map(|edge| match edge.kind {
            EdgeKind::Exception { handler } => Some((handler, edge.target)),
            _ => None,
        })
    }
}
