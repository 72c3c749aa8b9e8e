//! Mock-asm front-end and SCFG executor.
//!
//! [`program_to_scfg`] compiles an instruction list into a graph of
//! `Bytecode` payload blocks; [`Simulator`] executes a (restructured)
//! graph against the VM, dispatching on control variables at synthetic
//! blocks. Running the same program directly and through the restructured
//! graph must produce identical output.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use scfg_core::block::BYTECODE;
use scfg_core::{Block, BlockKind, RegionData, Scfg};

use crate::mock_asm::{Inst, Vm};
use crate::SimError;

/// Instruction-offset targets of each payload block, positionally aligned
/// with the block's jump targets. Transformations preserve target order,
/// so the alignment survives restructuring.
pub type TargetTable = BTreeMap<String, Vec<usize>>;

/// Builds an SCFG of `Bytecode` blocks from a program.
///
/// Block boundaries are the jump targets and the instructions following a
/// branch (leaders). A jump to the end of the program carries no edge; the
/// simulator treats an unmatched exit offset as program termination. Code
/// unreachable from the entry is pruned before the graph is handed out.
pub fn program_to_scfg(program: &[Inst]) -> Result<(Scfg, TargetTable), SimError> {
    let mut leaders: BTreeSet<usize> = BTreeSet::from([0, program.len()]);
    for (pc, inst) in program.iter().enumerate() {
        match inst {
            Inst::Goto { target } => {
                leaders.insert(*target);
                if pc + 1 < program.len() {
                    leaders.insert(pc + 1);
                }
            }
            Inst::BrCtr {
                true_target,
                false_target,
            } => {
                leaders.insert(*true_target);
                leaders.insert(*false_target);
                if pc + 1 < program.len() {
                    leaders.insert(pc + 1);
                }
            }
            _ => {}
        }
    }

    let offsets: Vec<usize> = leaders.into_iter().collect();
    let mut scfg = Scfg::new();
    let gen = scfg.name_gen().clone();
    let mut names: BTreeMap<usize, String> = BTreeMap::new();
    for window in offsets.windows(2) {
        names.insert(window[0], gen.new_block_name(BYTECODE));
    }

    let mut targets = TargetTable::new();
    for window in offsets.windows(2) {
        let (begin, end) = (window[0], window[1]);
        let pc_targets: Vec<usize> = match &program[end - 1] {
            Inst::Goto { target } => vec![*target],
            Inst::BrCtr {
                true_target,
                false_target,
            } => vec![*true_target, *false_target],
            _ if end < program.len() => vec![end],
            _ => vec![],
        };
        // Offsets at the end of the program have no block; those arcs end
        // the program and carry no edge.
        let in_program: Vec<usize> = pc_targets
            .iter()
            .copied()
            .filter(|t| names.contains_key(t))
            .collect();
        let jump_targets: Vec<String> = in_program.iter().map(|t| names[t].clone()).collect();
        let name = names[&begin].clone();
        targets.insert(name.clone(), in_program);
        scfg.add_block(Block::new(
            name,
            jump_targets,
            BlockKind::Bytecode { begin, end },
        ))?;
    }

    // Prune code unreachable from the entry; dead blocks would register as
    // extra heads.
    let entry = names[&0].clone();
    let mut reachable: HashSet<String> = HashSet::new();
    let mut stack = vec![entry];
    while let Some(name) = stack.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        if let Some(block) = scfg.get(&name) {
            stack.extend(block.jump_targets().iter().cloned());
        }
    }
    let dead: BTreeSet<String> = scfg
        .names()
        .filter(|n| !reachable.contains(*n))
        .map(str::to_string)
        .collect();
    scfg.remove_blocks(&dead);
    for name in &dead {
        targets.remove(name);
    }

    Ok((scfg, targets))
}

enum Action {
    Jump(String),
    Return,
}

/// Executes an SCFG against the VM.
pub struct Simulator<'a> {
    program: &'a [Inst],
    targets: &'a TargetTable,
    vm: Vm,
    ctrl: BTreeMap<String, i64>,
    steps: usize,
    max_steps: usize,
}

impl<'a> Simulator<'a> {
    pub fn new(program: &'a [Inst], targets: &'a TargetTable, max_steps: usize) -> Self {
        Self {
            program,
            targets,
            vm: Vm::new(),
            ctrl: BTreeMap::new(),
            steps: 0,
            max_steps,
        }
    }

    /// Runs from the graph head until a block returns. The produced output
    /// is the VM's print trace.
    pub fn run(mut self, scfg: &Scfg) -> Result<String, SimError> {
        let mut label = scfg.find_head()?;
        loop {
            let block = scfg
                .get(&label)
                .ok_or_else(|| SimError::Escaped { label: label.clone() })?;
            match self.run_block(block)? {
                Action::Return => return Ok(self.vm.into_output()),
                Action::Jump(next) => label = next,
            }
        }
    }

    fn run_block(&mut self, block: &Block) -> Result<Action, SimError> {
        match block.kind() {
            BlockKind::Region(data) => self.run_region(data),
            BlockKind::Bytecode { begin, end } => self.run_bytecode(block, *begin, *end),
            BlockKind::SyntheticAssignment { assignments } => {
                for (variable, value) in assignments {
                    self.ctrl.insert(variable.clone(), *value);
                }
                Ok(self.fallthrough(block))
            }
            BlockKind::SyntheticHead(table)
            | BlockKind::SyntheticExitingLatch(table)
            | BlockKind::SyntheticExitBranch(table) => {
                let value = self.ctrl.get(&table.variable).copied().ok_or_else(|| {
                    SimError::UnboundControlVariable {
                        variable: table.variable.clone(),
                    }
                })?;
                let target = table.target_for(value).ok_or_else(|| {
                    SimError::UnboundControlVariable {
                        variable: table.variable.clone(),
                    }
                })?;
                Ok(Action::Jump(target.to_string()))
            }
            _ => Ok(self.fallthrough(block)),
        }
    }

    fn fallthrough(&self, block: &Block) -> Action {
        match block.effective_jump_targets().next() {
            Some(target) => Action::Jump(target.to_string()),
            None => Action::Return,
        }
    }

    fn run_region(&mut self, data: &RegionData) -> Result<Action, SimError> {
        let mut label = data.subregion.find_head()?;
        loop {
            let block = data
                .subregion
                .get(&label)
                .ok_or_else(|| SimError::Escaped { label: label.clone() })?;
            match self.run_block(block)? {
                Action::Return => return Ok(Action::Return),
                Action::Jump(next) => {
                    if data.subregion.contains(&next) {
                        label = next;
                    } else {
                        // Control leaves the region; the parent resolves
                        // the label.
                        return Ok(Action::Jump(next));
                    }
                }
            }
        }
    }

    fn run_bytecode(&mut self, block: &Block, begin: usize, end: usize) -> Result<Action, SimError> {
        let mut pc = begin;
        for (offset, inst) in self.program[begin..end].iter().enumerate() {
            if self.steps >= self.max_steps {
                return Err(SimError::StepLimit);
            }
            pc = self.vm.eval_inst(begin + offset, inst)?;
            self.steps += 1;
        }
        let pc_targets = self
            .targets
            .get(block.name())
            .ok_or_else(|| SimError::Escaped {
                label: block.name().to_string(),
            })?;
        match pc_targets.iter().position(|t| *t == pc) {
            // Target order is preserved by every transformation, so the
            // offset's position selects the (possibly rewritten) target.
            Some(pos) => Ok(Action::Jump(block.jump_targets()[pos].clone())),
            None => Ok(Action::Return),
        }
    }
}
