//! Branch restructuring (Bahmann et al. 2015, §4.2).
//!
//! Runs on the acyclic effective skeleton left by loop restructuring.
//! Every block with two or more distinct effective successors heads a
//! construct: the blocks it dominates up to its continuation (its
//! immediate postdominator). The construct is repaired until it has a
//! single continuation and a single exiting block, then wrapped as a
//! `branch` region. Heads are processed innermost first; repairs can
//! surface new dispatcher heads, so a level is iterated to quiescence.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use scfg_core::block::{SYNTH_EXIT_BRANCH, SYNTH_FILL, SYNTH_TAIL};
use scfg_core::{Block, DispatcherKind, Error, RegionData, RegionKind, Result, Scfg};

use crate::dominators::{dominator_sets, immediate_dominators, post_dominator_sets};
use crate::region::{extract_region, update_region_bounds};

/// Restructures all branch constructs of `scfg`, recursing into loop
/// subregions.
pub fn restructure_branch(scfg: &mut Scfg) -> Result<()> {
    wrap_level(scfg)?;
    let region_names: Vec<String> = scfg
        .blocks()
        .filter(|b| b.is_region())
        .map(|b| b.name().to_string())
        .collect();
    for name in region_names {
        if let Some(data) = scfg.get_mut(&name).and_then(Block::region_mut) {
            descend(data)?;
        }
    }
    Ok(())
}

/// Loop (and meta) subregions get a full pass of their own; branch
/// subregions were produced by this pass and are structured already, so
/// they are only traversed to reach loop regions nested in their arms.
fn descend(data: &mut RegionData) -> Result<()> {
    match data.kind {
        RegionKind::Loop | RegionKind::Meta => {
            restructure_branch(&mut data.subregion)?;
            update_region_bounds(data)
        }
        RegionKind::Branch => {
            let nested: Vec<String> = data
                .subregion
                .blocks()
                .filter(|b| b.is_region())
                .map(|b| b.name().to_string())
                .collect();
            for name in nested {
                if let Some(inner) = data.subregion.get_mut(&name).and_then(Block::region_mut) {
                    descend(inner)?;
                }
            }
            Ok(())
        }
    }
}

/// Wraps branch constructs at this level until none remain. Heads are
/// taken in reverse topological order so inner constructs are wrapped
/// before enclosing ones; after each wrap the order is recomputed.
fn wrap_level(scfg: &mut Scfg) -> Result<()> {
    let mut attempted: HashSet<String> = HashSet::new();
    loop {
        let mut head = None;
        for name in scfg.reverse_post_order().into_iter().rev() {
            if attempted.contains(&name) {
                continue;
            }
            if branching_targets(scfg, &name).len() >= 2 {
                head = Some(name);
                break;
            }
        }
        let Some(name) = head else {
            return Ok(());
        };
        attempted.insert(name.clone());
        debug!(head = %name, "wrapping branch construct");
        wrap_construct(scfg, &name)?;
    }
}

/// Distinct effective in-graph successors of a block.
fn branching_targets(scfg: &Scfg, name: &str) -> BTreeSet<String> {
    match scfg.get(name) {
        Some(block) => block
            .effective_jump_targets()
            .filter(|t| scfg.contains(t))
            .map(str::to_string)
            .collect(),
        None => BTreeSet::new(),
    }
}

/// The construct headed at `h`: `h` plus every block it dominates that its
/// continuation does not dominate. Returns the construct and the
/// continuation (the immediate postdominator of `h`).
fn construct_set(scfg: &Scfg, h: &str) -> Result<(BTreeSet<String>, String)> {
    let doms = dominator_sets(scfg);
    let ipostdoms = immediate_dominators(&post_dominator_sets(scfg));
    let Some(continuation) = ipostdoms.get(h) else {
        return Err(Error::InvariantViolation(format!(
            "branching block {h:?} has no postdominator"
        )));
    };
    let mut construct: BTreeSet<String> = BTreeSet::from([h.to_string()]);
    for name in scfg.names() {
        if name == h {
            continue;
        }
        let Some(name_doms) = doms.get(name) else {
            continue;
        };
        if name_doms.contains(h) && !name_doms.contains(continuation) {
            construct.insert(name.to_string());
        }
    }
    Ok((construct, continuation.clone()))
}

/// Repairs and wraps the construct headed at `h`.
fn wrap_construct(scfg: &mut Scfg, h: &str) -> Result<()> {
    let gen = scfg.name_gen().clone();

    // Several continuation targets are unified behind a synthetic exit
    // branch: every arc out of the construct assigns a control variable
    // and the dispatcher routes on it. The dispatcher itself stays at this
    // level and becomes the construct's continuation.
    let (construct, _) = construct_set(scfg, h)?;
    let (exiting, exits) = scfg.find_exiting_and_exits(&construct);
    if exits.len() > 1 {
        let dispatch = gen.new_block_name(SYNTH_EXIT_BRANCH);
        scfg.insert_block_and_control_blocks(
            &dispatch,
            &exiting,
            &exits,
            DispatcherKind::ExitBranch,
        )?;
    }
    let (mut construct, _) = construct_set(scfg, h)?;
    let (_, exits) = scfg.find_exiting_and_exits(&construct);
    let [continuation] = exits.as_slice() else {
        return Err(Error::InvariantViolation(format!(
            "construct at {h:?} has continuations {exits:?}, expected exactly one"
        )));
    };
    let continuation = continuation.clone();

    // Empty arms: a direct arc from the head to the continuation gets a
    // fill block as its body.
    loop {
        let direct = scfg
            .get(h)
            .ok_or_else(|| Error::UnknownBlock(h.to_string()))?
            .effective_jump_targets()
            .any(|t| t == continuation);
        if !direct {
            break;
        }
        let fill = gen.new_block_name(SYNTH_FILL);
        scfg.insert_synthetic_fill(&fill, &[h.to_string()], &[continuation.clone()])?;
        construct.insert(fill);
    }

    // Merge multiple exiting blocks through a synthetic tail so the
    // region is single-exit.
    let (exiting, _) = scfg.find_exiting_and_exits(&construct);
    if exiting.len() > 1 {
        let tail = gen.new_block_name(SYNTH_TAIL);
        scfg.insert_synthetic_tail(&tail, &exiting, &[continuation.clone()])?;
        construct.insert(tail);
    }

    extract_region(scfg, &construct, RegionKind::Branch)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scfg_core::BlockKind;

    fn graph_from(blocks: Vec<Block>) -> Scfg {
        let mut scfg = Scfg::new();
        for block in blocks {
            scfg.add_block(block).unwrap();
        }
        scfg
    }

    #[test]
    fn test_diamond_becomes_branch_region() {
        let mut scfg = graph_from(vec![
            Block::basic("a", vec!["b".into(), "c".into()]),
            Block::basic("b", vec!["d".into()]),
            Block::basic("c", vec!["d".into()]),
            Block::basic("d", vec![]),
        ]);
        restructure_branch(&mut scfg).unwrap();

        let region = scfg.get("branch_region_0").unwrap();
        let data = region.region().unwrap();
        assert_eq!(data.kind, RegionKind::Branch);
        assert_eq!(data.header, "a");
        // Both arms merge through a tail, which is the region's exiting
        // block; the continuation stays outside.
        assert_eq!(data.exiting, "synth_tail_0");
        assert_eq!(region.jump_targets(), &["d".to_string()]);
        assert!(data.subregion.contains("b"));
        assert!(data.subregion.contains("c"));
        assert!(scfg.contains("d"));
        assert!(!scfg.contains("a"));
    }

    #[test]
    fn test_empty_arm_gets_fill() {
        // a -> {b, c}, b -> c: the a -> c arm is empty.
        let mut scfg = graph_from(vec![
            Block::basic("a", vec!["b".into(), "c".into()]),
            Block::basic("b", vec!["c".into()]),
            Block::basic("c", vec![]),
        ]);
        restructure_branch(&mut scfg).unwrap();

        let region = scfg.get("branch_region_0").unwrap();
        let data = region.region().unwrap();
        assert!(data.subregion.contains("synth_fill_0"));
        // The head routes its second arm through the fill, preserving
        // target order.
        let head = data.subregion.get("a").unwrap();
        assert_eq!(
            head.jump_targets(),
            &["b".to_string(), "synth_fill_0".to_string()]
        );
        let fill = data.subregion.get("synth_fill_0").unwrap();
        assert!(matches!(fill.kind(), BlockKind::SyntheticFill));
        assert_eq!(
            fill.jump_targets(),
            &["synth_tail_0".to_string()]
        );
        assert_eq!(region.jump_targets(), &["c".to_string()]);
    }

    #[test]
    fn test_single_exiting_arm_needs_no_tail() {
        // a -> {b, c}; b -> e; c -> e; but through a shared block first:
        // a -> {b, c}, b -> m, c -> m, m -> e. The merge point m is the
        // single exiting block.
        let mut scfg = graph_from(vec![
            Block::basic("a", vec!["b".into(), "c".into()]),
            Block::basic("b", vec!["m".into()]),
            Block::basic("c", vec!["m".into()]),
            Block::basic("m", vec!["e".into()]),
            Block::basic("e", vec![]),
        ]);
        restructure_branch(&mut scfg).unwrap();
        // The continuation of a is m; the construct {a, b, c} merges
        // through a tail into m, then m -> e stays linear.
        let region = scfg.get("branch_region_0").unwrap();
        assert_eq!(region.jump_targets(), &["m".to_string()]);
        assert!(scfg.contains("m"));
        assert!(scfg.contains("e"));
    }

    #[test]
    fn test_sequential_branches_become_sibling_regions() {
        let mut scfg = graph_from(vec![
            Block::basic("a", vec!["b".into(), "c".into()]),
            Block::basic("b", vec!["d".into()]),
            Block::basic("c", vec!["d".into()]),
            Block::basic("d", vec!["e".into(), "f".into()]),
            Block::basic("e", vec!["g".into()]),
            Block::basic("f", vec!["g".into()]),
            Block::basic("g", vec![]),
        ]);
        restructure_branch(&mut scfg).unwrap();
        let regions: Vec<&str> = scfg
            .blocks()
            .filter(|b| b.is_region())
            .map(|b| b.name())
            .collect();
        assert_eq!(regions.len(), 2);
        // d's construct was wrapped first (bottom-up), then a's.
        let first = scfg.get("branch_region_0").unwrap().region().unwrap();
        assert_eq!(first.header, "d");
        let second = scfg.get("branch_region_1").unwrap().region().unwrap();
        assert_eq!(second.header, "a");
        // a's region continues into d's region, which continues into g.
        assert_eq!(
            scfg.get("branch_region_1").unwrap().jump_targets(),
            &["branch_region_0".to_string()]
        );
        assert_eq!(
            scfg.get("branch_region_0").unwrap().jump_targets(),
            &["g".to_string()]
        );
    }

    #[test]
    fn test_nested_branch_wrapped_inside_outer_arm() {
        // The inner branch b -> {c, d} -> m sits inside a's first arm.
        let mut scfg = graph_from(vec![
            Block::basic("a", vec!["b".into(), "s".into()]),
            Block::basic("b", vec!["c".into(), "d".into()]),
            Block::basic("c", vec!["m".into()]),
            Block::basic("d", vec!["m".into()]),
            Block::basic("m", vec!["t".into()]),
            Block::basic("s", vec!["t".into()]),
            Block::basic("t", vec![]),
        ]);
        restructure_branch(&mut scfg).unwrap();
        // Outer region at top level, continuing into t.
        let outer_names: Vec<&str> = scfg
            .blocks()
            .filter(|b| b.is_region())
            .map(|b| b.name())
            .collect();
        assert_eq!(outer_names, vec!["branch_region_1"]);
        let outer = scfg.get("branch_region_1").unwrap().region().unwrap();
        assert_eq!(outer.header, "a");
        // The inner construct was wrapped first and lives inside the
        // outer subregion.
        assert!(outer.subregion.contains("branch_region_0"));
        let inner = outer
            .subregion
            .get("branch_region_0")
            .unwrap()
            .region()
            .unwrap();
        assert_eq!(inner.header, "b");
    }
}
