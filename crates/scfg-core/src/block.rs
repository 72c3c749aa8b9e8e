//! Basic block representation.
//!
//! Blocks are immutable values: every edit returns a new block record and
//! the graph container replaces the old one wholesale. A block is a name,
//! an ordered list of jump targets, a subset of those targets marked as
//! backedges, and a variant payload.

use std::collections::BTreeMap;

use crate::Scfg;

/// Type tags, shared between generated names and the serialized form.
pub const BASIC: &str = "basic";
pub const BYTECODE: &str = "bytecode";
pub const SYNTH_EXIT: &str = "synth_exit";
pub const SYNTH_RETURN: &str = "synth_return";
pub const SYNTH_TAIL: &str = "synth_tail";
pub const SYNTH_FILL: &str = "synth_fill";
pub const SYNTH_ASSIGN: &str = "synth_assign";
pub const SYNTH_HEAD: &str = "synth_head";
pub const SYNTH_EXITING_LATCH: &str = "synth_exiting_latch";
pub const SYNTH_EXIT_BRANCH: &str = "synth_exit_branch";
pub const REGION: &str = "region";

/// The kind of a region block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Loop,
    Branch,
    Meta,
}

impl RegionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionKind::Loop => "loop",
            RegionKind::Branch => "branch",
            RegionKind::Meta => "meta",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "loop" => Some(RegionKind::Loop),
            "branch" => Some(RegionKind::Branch),
            "meta" => Some(RegionKind::Meta),
            _ => None,
        }
    }
}

/// Dispatch table of a synthetic branch block.
///
/// The block reads `variable` from the control-variable environment and
/// jumps to the target associated with its value. Entries are kept in
/// assignment order (values are handed out counting up from zero).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BranchTable {
    pub variable: String,
    pub table: Vec<(i64, String)>,
}

impl BranchTable {
    /// The jump target selected by `value`.
    pub fn target_for(&self, value: i64) -> Option<&str> {
        self.table
            .iter()
            .find(|(v, _)| *v == value)
            .map(|(_, t)| t.as_str())
    }

    /// Reverse lookup: the value that selects `target`.
    pub fn value_for(&self, target: &str) -> Option<i64> {
        self.table.iter().find(|(_, t)| t == target).map(|(v, _)| *v)
    }
}

/// Payload of a region block: a nested subgraph plus its boundary names.
///
/// The region owns its subregion; subregion names do not appear in the
/// parent graph. The `exiting` block's external targets double as the
/// region's own jump targets in the parent.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionData {
    pub kind: RegionKind,
    pub header: String,
    pub subregion: Scfg,
    pub exiting: String,
}

/// Block variants, discriminated by tag.
///
/// The engine never inspects payloads; `Bytecode` carries an opaque
/// instruction range for front-ends that index into a side table.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Basic,
    Bytecode { begin: usize, end: usize },
    SyntheticExit,
    SyntheticReturn,
    SyntheticTail,
    SyntheticFill,
    SyntheticAssignment { assignments: BTreeMap<String, i64> },
    SyntheticHead(BranchTable),
    SyntheticExitingLatch(BranchTable),
    SyntheticExitBranch(BranchTable),
    Region(Box<RegionData>),
}

impl BlockKind {
    /// The serialized type tag for this variant.
    pub fn type_tag(&self) -> &'static str {
        match self {
            BlockKind::Basic => BASIC,
            BlockKind::Bytecode { .. } => BYTECODE,
            BlockKind::SyntheticExit => SYNTH_EXIT,
            BlockKind::SyntheticReturn => SYNTH_RETURN,
            BlockKind::SyntheticTail => SYNTH_TAIL,
            BlockKind::SyntheticFill => SYNTH_FILL,
            BlockKind::SyntheticAssignment { .. } => SYNTH_ASSIGN,
            BlockKind::SyntheticHead(_) => SYNTH_HEAD,
            BlockKind::SyntheticExitingLatch(_) => SYNTH_EXITING_LATCH,
            BlockKind::SyntheticExitBranch(_) => SYNTH_EXIT_BRANCH,
            BlockKind::Region(_) => REGION,
        }
    }

    /// The dispatch table, for the three synthetic branch variants.
    pub fn branch_table(&self) -> Option<&BranchTable> {
        match self {
            BlockKind::SyntheticHead(t)
            | BlockKind::SyntheticExitingLatch(t)
            | BlockKind::SyntheticExitBranch(t) => Some(t),
            _ => None,
        }
    }
}

/// Which dispatcher variant `insert_block_and_control_blocks` installs.
///
/// A `SyntheticHead` unifies entries in front of a region; a
/// `SyntheticExitBranch` unifies exits behind one. The tags are kept
/// distinct because downstream consumers key on the structural position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherKind {
    Head,
    ExitBranch,
}

impl DispatcherKind {
    pub(crate) fn into_block_kind(self, table: BranchTable) -> BlockKind {
        match self {
            DispatcherKind::Head => BlockKind::SyntheticHead(table),
            DispatcherKind::ExitBranch => BlockKind::SyntheticExitBranch(table),
        }
    }
}

/// A basic block of an SCFG.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    name: String,
    jump_targets: Vec<String>,
    backedges: Vec<String>,
    kind: BlockKind,
}

impl Block {
    /// Creates a block with the given ordered jump targets and no backedges.
    pub fn new(name: impl Into<String>, jump_targets: Vec<String>, kind: BlockKind) -> Self {
        Self {
            name: name.into(),
            jump_targets,
            backedges: Vec::new(),
            kind,
        }
    }

    /// Creates a payload-free basic block.
    pub fn basic(name: impl Into<String>, jump_targets: Vec<String>) -> Self {
        Self::new(name, jump_targets, BlockKind::Basic)
    }

    pub fn with_backedges(mut self, backedges: Vec<String>) -> Self {
        self.backedges = backedges;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    /// The full ordered jump target list, backedges included.
    pub fn jump_targets(&self) -> &[String] {
        &self.jump_targets
    }

    pub fn backedges(&self) -> &[String] {
        &self.backedges
    }

    /// Jump targets that are not backedges, in declared order. These are
    /// the edges traversed when computing forward structure.
    pub fn effective_jump_targets(&self) -> impl Iterator<Item = &str> {
        self.jump_targets
            .iter()
            .filter(|t| !self.backedges.contains(t))
            .map(String::as_str)
    }

    /// True when this block has no effective jump targets.
    pub fn is_exiting(&self) -> bool {
        self.effective_jump_targets().next().is_none()
    }

    /// True when this block has exactly one effective jump target.
    pub fn is_fallthrough(&self) -> bool {
        self.effective_jump_targets().count() == 1
    }

    pub fn is_region(&self) -> bool {
        matches!(self.kind, BlockKind::Region(_))
    }

    pub fn region(&self) -> Option<&RegionData> {
        match &self.kind {
            BlockKind::Region(data) => Some(data),
            _ => None,
        }
    }

    pub fn region_mut(&mut self) -> Option<&mut RegionData> {
        match &mut self.kind {
            BlockKind::Region(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the block with its jump targets replaced.
    ///
    /// The new list must be in the same order as the list it replaces.
    /// Backedges are not touched; a backedge whose target was replaced must
    /// be updated separately with [`Block::replace_backedges`]. On
    /// dispatcher blocks the branch value table follows the replacement:
    /// values that selected a dropped target select the added one instead.
    pub fn replace_jump_targets(mut self, jump_targets: Vec<String>) -> Self {
        if let Some(table) = match &mut self.kind {
            BlockKind::SyntheticHead(t)
            | BlockKind::SyntheticExitingLatch(t)
            | BlockKind::SyntheticExitBranch(t) => Some(t),
            _ => None,
        } {
            let added: Vec<&String> = jump_targets
                .iter()
                .filter(|t| !self.jump_targets.contains(t))
                .collect();
            for (_, target) in table.table.iter_mut() {
                if !jump_targets.contains(target) {
                    if let [new_target] = added.as_slice() {
                        *target = (*new_target).clone();
                    }
                }
            }
        }
        self.jump_targets = jump_targets;
        self
    }

    /// Returns the block with its backedge list replaced.
    pub fn replace_backedges(mut self, backedges: Vec<String>) -> Self {
        self.backedges = backedges;
        self
    }

    /// Marks `target` as a backedge of this block. A no-op when `target`
    /// is not currently an effective jump target.
    pub fn declare_backedge(mut self, target: &str) -> Self {
        if self.effective_jump_targets().any(|t| t == target) {
            debug_assert!(self.backedges.is_empty());
            self.backedges = vec![target.to_string()];
        }
        self
    }

    /// For a region block: rewrites `old` to `new` in the subregion's
    /// exiting block (recursively, when that block is itself a region).
    ///
    /// A region's external successors are those of its exiting block, so
    /// whenever an edit renames one of the region node's targets the
    /// interior edge must follow. A no-op on non-region blocks.
    pub fn retarget_through_exiting(&mut self, old: &str, new: &str) -> crate::Result<()> {
        let Some(data) = self.region_mut() else {
            return Ok(());
        };
        let exiting_name = data.exiting.clone();
        let block = data.subregion.take_block(&exiting_name)?;
        let jt = block
            .jump_targets()
            .iter()
            .map(|t| if t == old { new.to_string() } else { t.clone() })
            .collect();
        let be = block
            .backedges()
            .iter()
            .map(|t| if t == old { new.to_string() } else { t.clone() })
            .collect();
        let mut block = block.replace_jump_targets(jt).replace_backedges(be);
        block.retarget_through_exiting(old, new)?;
        data.subregion.add_block(block)
    }
}
