//! The SCFG graph container.
//!
//! An [`Scfg`] maps block names to blocks. The map preserves insertion
//! order, which together with the ordered jump target lists makes every
//! traversal and transformation deterministic. Structural edits go through
//! explicit insert/remove/replace operations; blocks themselves are
//! immutable values.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use indexmap::IndexMap;

use crate::block::{
    Block, BlockKind, BranchTable, DispatcherKind, SYNTH_ASSIGN, SYNTH_EXIT, SYNTH_RETURN,
    SYNTH_TAIL,
};
use crate::error::{Error, Result};
use crate::name_gen::NameGenerator;

/// A structured control flow graph: a name→block mapping plus the name
/// generator shared by the graph and all of its subregions.
#[derive(Debug, Clone, Default)]
pub struct Scfg {
    graph: IndexMap<String, Block>,
    name_gen: NameGenerator,
}

impl PartialEq for Scfg {
    /// Graph equality compares blocks only; the name generator and the
    /// map's insertion order are not observable.
    fn eq(&self, other: &Self) -> bool {
        self.graph == other.graph
    }
}

impl Scfg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty graph drawing names from an existing generator.
    /// Subregions are created this way so that name uniqueness spans the
    /// whole region hierarchy.
    pub fn with_name_gen(name_gen: NameGenerator) -> Self {
        Self {
            graph: IndexMap::new(),
            name_gen,
        }
    }

    pub fn name_gen(&self) -> &NameGenerator {
        &self.name_gen
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.graph.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Block> {
        self.graph.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Block> {
        self.graph.get_mut(name)
    }

    /// Block names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.graph.keys().map(String::as_str)
    }

    /// Blocks in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.graph.values()
    }

    /// Inserts a block. Fails when a block with the same name is present.
    pub fn add_block(&mut self, block: Block) -> Result<()> {
        if self.graph.contains_key(block.name()) {
            return Err(Error::DuplicateBlock(block.name().to_string()));
        }
        self.graph.insert(block.name().to_string(), block);
        Ok(())
    }

    /// Removes and returns a block for an edit-and-reinsert cycle.
    /// Preserves the relative order of the remaining blocks.
    pub fn take_block(&mut self, name: &str) -> Result<Block> {
        self.graph
            .shift_remove(name)
            .ok_or_else(|| Error::UnknownBlock(name.to_string()))
    }

    /// Deletes blocks. Callers must have retargeted incoming edges first;
    /// no automatic rewrite happens here.
    pub fn remove_blocks(&mut self, names: &BTreeSet<String>) {
        for name in names {
            self.graph.shift_remove(name);
        }
    }

    /// Breadth-first iteration from the head, following effective jump
    /// targets in declared order and descending into region subregions.
    /// Blocks not reachable from the head are not yielded.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Block)> {
        let mut out = Vec::new();
        self.collect_bfs(&mut out);
        out.into_iter()
    }

    fn collect_bfs<'a>(&'a self, out: &mut Vec<(&'a str, &'a Block)>) {
        let start = match self.find_head() {
            Ok(head) => head,
            // Mid-transformation graphs may briefly lack a unique head;
            // fall back to the first inserted block.
            Err(_) => match self.graph.keys().next() {
                Some(name) => name.clone(),
                None => return,
            },
        };
        let mut to_visit = VecDeque::from([start]);
        let mut seen: HashSet<String> = HashSet::new();
        while let Some(name) = to_visit.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            // Names outside this graph (a subregion's external successors)
            // are skipped.
            let Some((key, block)) = self.graph.get_key_value(&name) else {
                continue;
            };
            out.push((key.as_str(), block));
            if let Some(region) = block.region() {
                region.subregion.collect_bfs(out);
            }
            to_visit.extend(block.effective_jump_targets().map(str::to_string));
        }
    }

    /// A view that treats every region block as a single node, never
    /// descending into subregions.
    pub fn concealed_region_view(&self) -> ConcealedRegionView<'_> {
        ConcealedRegionView { scfg: self }
    }

    /// Inserts a synthetic block between `predecessors` and `successors`.
    ///
    /// The new block's targets are `successors` in the given order. Every
    /// predecessor edge into a successor is rerouted through the new block:
    /// the first occurrence of each successor in the predecessor's target
    /// list is replaced in place (or dropped when the new name is already
    /// present), and a predecessor backedge into a successor is updated to
    /// the new name. When `successors` is empty the new block is appended
    /// to each predecessor's targets.
    pub fn insert_block(
        &mut self,
        new_name: &str,
        predecessors: &[String],
        successors: &[String],
        kind: BlockKind,
    ) -> Result<()> {
        self.add_block(Block::new(new_name, successors.to_vec(), kind))?;
        for pred in predecessors {
            let block = self.take_block(pred)?;
            let mut jt: Vec<String> = block.jump_targets().to_vec();
            let mut replaced: Vec<String> = Vec::new();
            if successors.is_empty() {
                jt.push(new_name.to_string());
            } else {
                for succ in successors {
                    if let Some(pos) = jt.iter().position(|t| t == succ) {
                        if jt.iter().any(|t| t == new_name) {
                            jt.remove(pos);
                        } else {
                            jt[pos] = new_name.to_string();
                        }
                        replaced.push(succ.clone());
                    }
                }
            }
            let mut backedges: Vec<String> = block.backedges().to_vec();
            for be in backedges.iter_mut() {
                if successors.contains(be) {
                    *be = new_name.to_string();
                }
            }
            let mut block = block.replace_jump_targets(jt).replace_backedges(backedges);
            for old in &replaced {
                block.retarget_through_exiting(old, new_name)?;
            }
            self.add_block(block)?;
        }
        Ok(())
    }

    pub fn insert_synthetic_exit(
        &mut self,
        new_name: &str,
        predecessors: &[String],
        successors: &[String],
    ) -> Result<()> {
        self.insert_block(new_name, predecessors, successors, BlockKind::SyntheticExit)
    }

    pub fn insert_synthetic_tail(
        &mut self,
        new_name: &str,
        predecessors: &[String],
        successors: &[String],
    ) -> Result<()> {
        self.insert_block(new_name, predecessors, successors, BlockKind::SyntheticTail)
    }

    pub fn insert_synthetic_return(
        &mut self,
        new_name: &str,
        predecessors: &[String],
        successors: &[String],
    ) -> Result<()> {
        self.insert_block(new_name, predecessors, successors, BlockKind::SyntheticReturn)
    }

    pub fn insert_synthetic_fill(
        &mut self,
        new_name: &str,
        predecessors: &[String],
        successors: &[String],
    ) -> Result<()> {
        self.insert_block(new_name, predecessors, successors, BlockKind::SyntheticFill)
    }

    /// Inserts a dispatcher block between `predecessors` and `successors`,
    /// with one `SyntheticAssignment` per rerouted predecessor edge.
    ///
    /// Each assignment sets a fresh control variable to an integer tag
    /// identifying which successor that predecessor had chosen; the
    /// dispatcher holds the value table and jumps accordingly. The
    /// `dispatcher` parameter selects the variant for the structural
    /// position: `SyntheticHead` in front of a region, `SyntheticExitBranch`
    /// behind one.
    pub fn insert_block_and_control_blocks(
        &mut self,
        new_name: &str,
        predecessors: &[String],
        successors: &[String],
        dispatcher: DispatcherKind,
    ) -> Result<()> {
        let gen = self.name_gen.clone();
        let branch_variable = gen.new_var_name("control");
        let mut branch_value: i64 = 0;
        let mut branch_value_table: Vec<(i64, String)> = Vec::new();

        for pred in predecessors {
            let block = self.take_block(pred)?;
            let mut jt: Vec<String> = block.jump_targets().to_vec();
            // One assignment per rerouted arc, in sorted target order.
            let matched: BTreeSet<String> = jt
                .iter()
                .filter(|t| successors.contains(*t))
                .cloned()
                .collect();
            let mut replaced: Vec<(String, String)> = Vec::new();
            for succ in matched {
                let assign_name = gen.new_block_name(SYNTH_ASSIGN);
                let mut assignments = BTreeMap::new();
                assignments.insert(branch_variable.clone(), branch_value);
                self.add_block(Block::new(
                    assign_name.as_str(),
                    vec![new_name.to_string()],
                    BlockKind::SyntheticAssignment { assignments },
                ))?;
                branch_value_table.push((branch_value, succ.clone()));
                branch_value += 1;
                if let Some(pos) = jt.iter().position(|t| t == &succ) {
                    jt[pos] = assign_name.clone();
                }
                replaced.push((succ, assign_name));
            }
            let mut block = block.replace_jump_targets(jt);
            for (old, new) in &replaced {
                block.retarget_through_exiting(old, new)?;
            }
            self.add_block(block)?;
        }

        let table = BranchTable {
            variable: branch_variable,
            table: branch_value_table,
        };
        self.add_block(Block::new(
            new_name,
            successors.to_vec(),
            dispatcher.into_block_kind(table),
        ))
    }

    /// Closes the graph: after this, exactly one block has no effective
    /// successor.
    ///
    /// Requires a unique head (an input with several blocks lacking
    /// predecessors is malformed and reported as such). A `SyntheticReturn`
    /// is inserted over all exiting blocks when there is more than one, or
    /// when the single exiting block is also the head, so that even a
    /// one-block graph ends in an explicit return.
    pub fn join_returns(&mut self) -> Result<()> {
        let head = self.find_head()?;
        let return_nodes: Vec<String> = self
            .graph
            .values()
            .filter(|b| b.is_exiting())
            .map(|b| b.name().to_string())
            .collect();
        if return_nodes.len() > 1 || (return_nodes.len() == 1 && return_nodes[0] == head) {
            let gen = self.name_gen.clone();
            let name = gen.new_block_name(SYNTH_RETURN);
            self.insert_synthetic_return(&name, &return_nodes, &[])?;
        }
        Ok(())
    }

    /// Reduces a set of tail blocks and a set of exit targets to one of
    /// each, inserting `SyntheticTail`/`SyntheticExit` blocks as needed.
    /// Returns the names of the resulting unique tail and exit.
    pub fn join_tails_and_exits(
        &mut self,
        tails: &[String],
        exits: &[String],
    ) -> Result<(String, String)> {
        let gen = self.name_gen.clone();
        match (tails.len(), exits.len()) {
            (1, 1) => Ok((tails[0].clone(), exits[0].clone())),
            (1, _) if exits.len() >= 2 => {
                let solo_exit = gen.new_block_name(SYNTH_EXIT);
                self.insert_synthetic_exit(&solo_exit, tails, exits)?;
                Ok((tails[0].clone(), solo_exit))
            }
            (_, 1) if tails.len() >= 2 => {
                let solo_tail = gen.new_block_name(SYNTH_TAIL);
                self.insert_synthetic_tail(&solo_tail, tails, exits)?;
                Ok((solo_tail, exits[0].clone()))
            }
            (t, e) if t >= 2 && e >= 2 => {
                let solo_tail = gen.new_block_name(SYNTH_TAIL);
                let solo_exit = gen.new_block_name(SYNTH_EXIT);
                self.insert_synthetic_tail(&solo_tail, tails, exits)?;
                self.insert_synthetic_exit(&solo_exit, &[solo_tail.clone()], exits)?;
                Ok((solo_tail, solo_exit))
            }
            _ => Err(Error::InvariantViolation(format!(
                "join_tails_and_exits on empty boundary: {tails:?} / {exits:?}"
            ))),
        }
    }
}

/// A read-only view of an [`Scfg`] in which regions are concealed: the
/// iterator yields a region block as one node and continues with the
/// region's external successors.
pub struct ConcealedRegionView<'a> {
    scfg: &'a Scfg,
}

impl<'a> ConcealedRegionView<'a> {
    pub fn get(&self, name: &str) -> Option<&'a Block> {
        self.scfg.get(name)
    }

    pub fn len(&self) -> usize {
        self.scfg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scfg.is_empty()
    }

    /// Breadth-first iteration from the head. Region blocks are yielded as
    /// single nodes; traversal continues at their exiting block's external
    /// targets.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Block)> {
        let mut out = Vec::new();
        let Ok(head) = self.scfg.find_head() else {
            return out.into_iter();
        };
        let mut to_visit = VecDeque::from([head]);
        let mut seen: HashSet<String> = HashSet::new();
        while let Some(name) = to_visit.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some((key, block)) = self.scfg.graph.get_key_value(&name) else {
                continue;
            };
            out.push((key.as_str(), block));
            match block.region() {
                Some(region) => {
                    if let Some(exiting) = region.subregion.get(&region.exiting) {
                        to_visit.extend(exiting.effective_jump_targets().map(str::to_string));
                    }
                }
                None => to_visit.extend(block.effective_jump_targets().map(str::to_string)),
            }
        }
        out.into_iter()
    }
}
