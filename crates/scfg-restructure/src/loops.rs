//! Loop restructuring (Bahmann et al. 2015, §4.1).
//!
//! Every strongly connected component that forms a loop is rewritten to
//! have a single header and a single exiting latch. Multi-header loops get
//! a synthetic head dispatching on a control variable; multi-exit loops
//! get a synthetic exiting latch (and, for several exit targets, a
//! synthetic exit branch) fed by per-edge assignment blocks. The loop is
//! then wrapped as a `loop` region and the pass recurses into every
//! subregion.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use scfg_core::block::{SYNTH_ASSIGN, SYNTH_EXIT_BRANCH, SYNTH_EXITING_LATCH, SYNTH_HEAD};
use scfg_core::{
    Block, BlockKind, BranchTable, DispatcherKind, Error, RegionKind, Result, Scfg,
};

use crate::dominators::dominator_sets;
use crate::region::{extract_region, update_region_bounds};

/// Restructures all loops of `scfg`, recursing into subregions.
///
/// Cycles in code unreachable from the head are left untouched: they have
/// no entry to restructure against, and unreachable blocks are preserved,
/// not repaired. `Scfg::unreachable_blocks` reports them.
pub fn restructure_loop(scfg: &mut Scfg) -> Result<()> {
    let reachable: HashSet<String> = if scfg.find_head().is_ok() {
        scfg.reverse_post_order().into_iter().collect()
    } else {
        scfg.names().map(str::to_string).collect()
    };
    let mut loops: Vec<BTreeSet<String>> = scfg
        .compute_scc()
        .into_iter()
        .filter(|component| is_loop(scfg, component))
        .filter(|component| component.iter().any(|name| reachable.contains(name)))
        .collect();
    // Deterministic processing order: by smallest member name.
    loops.sort_by(|a, b| a.iter().next().cmp(&b.iter().next()));
    debug!(loops = loops.len(), blocks = scfg.len(), "restructuring loops");

    for mut looped in loops {
        loop_restructure_helper(scfg, &mut looped)?;
        extract_region(scfg, &looped, RegionKind::Loop)?;
    }

    let region_names: Vec<String> = scfg
        .blocks()
        .filter(|b| b.is_region())
        .map(|b| b.name().to_string())
        .collect();
    for name in region_names {
        if let Some(data) = scfg.get_mut(&name).and_then(Block::region_mut) {
            restructure_loop(&mut data.subregion)?;
            update_region_bounds(data)?;
        }
    }
    Ok(())
}

/// A component is a loop when it has at least two members, or one member
/// with an effective self-edge.
fn is_loop(scfg: &Scfg, component: &BTreeSet<String>) -> bool {
    if component.len() > 1 {
        return true;
    }
    component.iter().next().is_some_and(|name| {
        scfg.get(name)
            .is_some_and(|block| block.effective_jump_targets().any(|t| t == name))
    })
}

fn reverse_lookup(table: &[(i64, String)], target: &str) -> i64 {
    table
        .iter()
        .find(|(_, t)| t == target)
        .map(|(v, _)| *v)
        .unwrap_or(-1)
}

/// Rewrites one loop in place so it has a single header and a single
/// exiting latch. Inserted synthetic blocks that belong to the loop are
/// added to `looped`.
pub(crate) fn loop_restructure_helper(
    scfg: &mut Scfg,
    looped: &mut BTreeSet<String>,
) -> Result<()> {
    let gen = scfg.name_gen().clone();
    let (headers, entries) = scfg.find_headers_and_entries(looped)?;
    let (exiting_blocks, exit_blocks) = scfg.find_exiting_and_exits(looped);

    // Unify multiple headers behind a synthetic head dispatching on a
    // control variable assigned at each entry.
    let headers_were_unified = headers.len() > 1;
    let loop_head = if headers_were_unified {
        let solo_head = gen.new_block_name(SYNTH_HEAD);
        scfg.insert_block_and_control_blocks(&solo_head, &entries, &headers, DispatcherKind::Head)?;
        looped.insert(solo_head.clone());
        solo_head
    } else {
        headers[0].clone()
    };

    let backedge_blocks: Vec<String> = looped
        .iter()
        .filter(|name| {
            scfg.get(name).is_some_and(|block| {
                block
                    .effective_jump_targets()
                    .any(|t| headers.contains(&t.to_string()))
            })
        })
        .cloned()
        .collect();

    // Already a single exiting latch: declaring the backedge is enough.
    if backedge_blocks.len() == 1
        && exiting_blocks.len() == 1
        && backedge_blocks[0] == exiting_blocks[0]
    {
        let block = scfg.take_block(&backedge_blocks[0])?;
        return scfg.add_block(block.declare_backedge(&loop_head));
    }

    let synth_exiting_latch = gen.new_block_name(SYNTH_EXITING_LATCH);
    let needs_synth_exit = exit_blocks.len() > 1;
    let synth_exit = if needs_synth_exit {
        Some(gen.new_block_name(SYNTH_EXIT_BRANCH))
    } else {
        None
    };

    // When headers were unified, the head's control variable doubles as
    // the exit selector so the next iteration re-enters the right header.
    let exit_variable = if headers_were_unified {
        scfg.get(&loop_head)
            .and_then(|b| b.kind().branch_table())
            .map(|t| t.variable.clone())
            .ok_or_else(|| {
                Error::InvariantViolation(format!("{loop_head:?} is not a dispatcher block"))
            })?
    } else {
        gen.new_var_name("exit")
    };
    let backedge_variable = gen.new_var_name("backedge");

    let exit_value_table: Vec<(i64, String)> = exit_blocks
        .iter()
        .enumerate()
        .map(|(i, name)| (i as i64, name.clone()))
        .collect();
    // The latch leaves through the synthetic exit branch when there are
    // several exit targets; a loop with no exit target at all only ever
    // iterates.
    let latch_exit_target = match &synth_exit {
        Some(name) => Some(name.clone()),
        None => exit_blocks.first().cloned(),
    };
    let backedge_value_table: Vec<(i64, String)> = match &latch_exit_target {
        Some(exit_target) => vec![(0, loop_head.clone()), (1, exit_target.clone())],
        None => vec![(0, loop_head.clone())],
    };
    let header_value_table: Vec<(i64, String)> = if headers_were_unified {
        scfg.get(&loop_head)
            .and_then(|b| b.kind().branch_table())
            .map(|t| t.table.clone())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let doms = dominator_sets(scfg);
    let mut new_blocks: BTreeSet<String> = BTreeSet::new();
    let names: Vec<String> = looped.iter().cloned().collect();
    for name in names {
        if !exiting_blocks.contains(&name) && !backedge_blocks.contains(&name) {
            continue;
        }
        let targets: Vec<String> = match scfg.get(&name) {
            Some(block) => block.effective_jump_targets().map(str::to_string).collect(),
            None => continue,
        };
        let mut new_jt = targets.clone();
        for jt in &targets {
            if exit_blocks.contains(jt) {
                // Arc out of the loop: assign the exit selector and leave
                // through the latch.
                let Some(exit_target) = &latch_exit_target else {
                    return Err(Error::InvariantViolation(format!(
                        "loop exit arc {name:?} -> {jt:?} without exit target"
                    )));
                };
                let synth_assign = gen.new_block_name(SYNTH_ASSIGN);
                new_blocks.insert(synth_assign.clone());
                let mut assignments = BTreeMap::new();
                if needs_synth_exit {
                    assignments.insert(
                        exit_variable.clone(),
                        reverse_lookup(&exit_value_table, jt),
                    );
                }
                assignments.insert(
                    backedge_variable.clone(),
                    reverse_lookup(&backedge_value_table, exit_target),
                );
                scfg.add_block(Block::new(
                    synth_assign.as_str(),
                    vec![synth_exiting_latch.clone()],
                    BlockKind::SyntheticAssignment { assignments },
                ))?;
                if let Some(pos) = new_jt.iter().position(|t| t == jt) {
                    new_jt[pos] = synth_assign;
                }
            } else if headers.contains(jt)
                && (!doms.get(jt).is_some_and(|d| d.contains(&name)) || name == *jt)
            {
                // Genuine backedge arc: assign the iterate selector (and,
                // when the head dispatches, which header comes next) and
                // route through the latch.
                let synth_assign = gen.new_block_name(SYNTH_ASSIGN);
                new_blocks.insert(synth_assign.clone());
                let mut assignments = BTreeMap::new();
                assignments.insert(
                    backedge_variable.clone(),
                    reverse_lookup(&backedge_value_table, &loop_head),
                );
                if needs_synth_exit || headers_were_unified {
                    assignments.insert(
                        exit_variable.clone(),
                        reverse_lookup(&header_value_table, jt),
                    );
                }
                scfg.add_block(Block::new(
                    synth_assign.as_str(),
                    vec![synth_exiting_latch.clone()],
                    BlockKind::SyntheticAssignment { assignments },
                ))?;
                if let Some(pos) = new_jt.iter().position(|t| t == jt) {
                    new_jt[pos] = synth_assign;
                }
            }
        }
        let block = scfg.take_block(&name)?;
        scfg.add_block(block.replace_jump_targets(new_jt))?;
    }
    looped.extend(new_blocks);

    let latch_targets = match &latch_exit_target {
        Some(exit_target) => vec![exit_target.clone(), loop_head.clone()],
        None => vec![loop_head.clone()],
    };
    looped.insert(synth_exiting_latch.clone());
    scfg.add_block(
        Block::new(
            synth_exiting_latch.as_str(),
            latch_targets,
            BlockKind::SyntheticExitingLatch(BranchTable {
                variable: backedge_variable,
                table: backedge_value_table,
            }),
        )
        .with_backedges(vec![loop_head]),
    )?;

    // The exit branch lives outside the loop: it dispatches to the exit
    // target selected before leaving.
    if let Some(synth_exit) = synth_exit {
        scfg.add_block(Block::new(
            synth_exit.as_str(),
            exit_blocks.clone(),
            BlockKind::SyntheticExitBranch(BranchTable {
                variable: exit_variable,
                table: exit_value_table,
            }),
        ))?;
    }
    Ok(())
}
