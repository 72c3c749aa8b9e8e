//! End-to-end restructuring scenarios: the boundary cases of the
//! restructuring algorithm, including the two irreducible shapes from
//! Bahmann et al. (2015), figures 3 and 4.

use scfg_core::{Block, BlockKind, RegionKind, Scfg};
use scfg_restructure::{restructure, verify};

/// All blocks of a graph, subregions flattened.
fn flatten(scfg: &Scfg) -> Vec<&Block> {
    fn walk<'a>(scfg: &'a Scfg, out: &mut Vec<&'a Block>) {
        for block in scfg.blocks() {
            out.push(block);
            if let Some(region) = block.region() {
                walk(&region.subregion, out);
            }
        }
    }
    let mut out = Vec::new();
    walk(scfg, &mut out);
    out
}

fn count_kind(scfg: &Scfg, tag: &str) -> usize {
    flatten(scfg)
        .iter()
        .filter(|b| b.kind().type_tag() == tag)
        .count()
}

fn top_level_regions(scfg: &Scfg) -> Vec<&Block> {
    scfg.blocks().filter(|b| b.is_region()).collect()
}

#[test]
fn scenario_single_block_gains_a_return() {
    let mut scfg = Scfg::from_yaml(
        "
'A':
  type: basic
  jt: []
",
    )
    .unwrap();
    restructure(&mut scfg).unwrap();
    assert_eq!(scfg.len(), 2);
    assert_eq!(
        scfg.get("A").unwrap().jump_targets(),
        &["synth_return_0".to_string()]
    );
    let ret = scfg.get("synth_return_0").unwrap();
    assert!(matches!(ret.kind(), BlockKind::SyntheticReturn));
    assert!(ret.is_exiting());
}

#[test]
fn scenario_diamond_becomes_one_branch_region() {
    let mut scfg = Scfg::from_yaml(
        "
'A':
  type: basic
  jt: ['B', 'C']
'B':
  type: basic
  jt: ['D']
'C':
  type: basic
  jt: ['D']
'D':
  type: basic
  jt: []
",
    )
    .unwrap();
    restructure(&mut scfg).unwrap();

    // No synthetic return is needed: D is already the unique exit.
    assert_eq!(count_kind(&scfg, "synth_return"), 0);
    let regions = top_level_regions(&scfg);
    assert_eq!(regions.len(), 1);
    let data = regions[0].region().unwrap();
    assert_eq!(data.kind, RegionKind::Branch);
    assert_eq!(data.header, "A");
    assert!(data.subregion.contains("B"));
    assert!(data.subregion.contains("C"));
    // The region exits to D, which stays at the top level.
    assert_eq!(regions[0].jump_targets(), &["D".to_string()]);
    assert!(scfg.contains("D"));
}

#[test]
fn scenario_irreducible_two_entry_loop() {
    // The entry branches straight to both members of the cycle {P, Q}.
    let mut scfg = Scfg::from_yaml(
        "
'A':
  type: basic
  jt: ['P', 'Q']
'P':
  type: basic
  jt: ['Q', 'X']
'Q':
  type: basic
  jt: ['P']
'X':
  type: basic
  jt: []
",
    )
    .unwrap();
    restructure(&mut scfg).unwrap();

    // One synthetic head dispatches between the original headers.
    assert_eq!(count_kind(&scfg, "synth_head"), 1);
    let blocks = flatten(&scfg);
    let head = blocks
        .iter()
        .find(|b| matches!(b.kind(), BlockKind::SyntheticHead(_)))
        .unwrap();
    let table = head.kind().branch_table().unwrap();
    assert_eq!(table.table.len(), 2);

    // Exactly one loop region, with the synthetic head as header and the
    // synthetic latch as its unique exiting block.
    let loop_regions: Vec<_> = blocks
        .iter()
        .filter_map(|b| b.region())
        .filter(|r| r.kind == RegionKind::Loop)
        .collect();
    assert_eq!(loop_regions.len(), 1);
    assert_eq!(count_kind(&scfg, "synth_exiting_latch"), 1);
    assert_eq!(loop_regions[0].exiting, "synth_exiting_latch_0");
}

#[test]
fn scenario_multi_exit_loop() {
    // A loop with two distinct exits to two distinct continuations.
    let mut scfg = Scfg::from_yaml(
        "
'A':
  type: basic
  jt: ['B']
'B':
  type: basic
  jt: ['C', 'X']
'C':
  type: basic
  jt: ['B', 'Y']
'X':
  type: basic
  jt: []
'Y':
  type: basic
  jt: []
",
    )
    .unwrap();
    restructure(&mut scfg).unwrap();

    // Two exits are first joined behind one synthetic return, the loop
    // leaves through a single latch, and the latch's successor dispatches
    // through an exit branch wrapped in a branch region.
    assert_eq!(count_kind(&scfg, "synth_return"), 1);
    assert_eq!(count_kind(&scfg, "synth_exiting_latch"), 1);
    assert!(count_kind(&scfg, "synth_exit_branch") >= 1);

    let branch_at_latch_successor = top_level_regions(&scfg).iter().any(|b| {
        b.region().is_some_and(|r| {
            r.kind == RegionKind::Branch
                && r.subregion
                    .get(&r.header)
                    .is_some_and(|h| matches!(h.kind(), BlockKind::SyntheticExitBranch(_)))
        })
    });
    assert!(branch_at_latch_successor);
}

#[test]
fn scenario_for_loop_with_early_break() {
    // for i in range(n): c += 1; if i == 100: break
    // return c
    let mut scfg = Scfg::from_yaml(
        "
'entry':
  type: basic
  jt: ['cond']
'cond':
  type: basic
  jt: ['body', 'after']
'body':
  type: basic
  jt: ['cont', 'after']
'cont':
  type: basic
  jt: ['cond']
'after':
  type: basic
  jt: []
",
    )
    .unwrap();
    restructure(&mut scfg).unwrap();

    // One loop region; its latch dispatches between iterating and leaving.
    let blocks = flatten(&scfg);
    let loop_regions: Vec<_> = blocks
        .iter()
        .filter_map(|b| b.region())
        .filter(|r| r.kind == RegionKind::Loop)
        .collect();
    assert_eq!(loop_regions.len(), 1);
    let latch = blocks
        .iter()
        .find(|b| matches!(b.kind(), BlockKind::SyntheticExitingLatch(_)))
        .unwrap();
    assert_eq!(latch.kind().branch_table().unwrap().table.len(), 2);
    assert_eq!(latch.backedges().len(), 1);

    // The loop body contains a nested branch region for the break test.
    fn contains_branch_region(scfg: &Scfg) -> bool {
        scfg.blocks().any(|b| {
            b.region().is_some_and(|r| {
                r.kind == RegionKind::Branch || contains_branch_region(&r.subregion)
            })
        })
    }
    assert!(contains_branch_region(&loop_regions[0].subregion));
}

#[test]
fn scenario_empty_branch_arm_gets_fill() {
    let mut scfg = Scfg::from_yaml(
        "
'A':
  type: basic
  jt: ['B', 'C']
'B':
  type: basic
  jt: ['C']
'C':
  type: basic
  jt: []
",
    )
    .unwrap();
    restructure(&mut scfg).unwrap();

    assert_eq!(count_kind(&scfg, "synth_fill"), 1);
    let regions = top_level_regions(&scfg);
    assert_eq!(regions.len(), 1);
    let data = regions[0].region().unwrap();
    // Both arms now have a body before the continuation C: B, and the
    // fill standing in for the empty arm.
    let head = data.subregion.get("A").unwrap();
    assert_eq!(
        head.jump_targets(),
        &["B".to_string(), "synth_fill_0".to_string()]
    );
    assert_eq!(regions[0].jump_targets(), &["C".to_string()]);
}

#[test]
fn restructure_is_deterministic() {
    let text = "
'A':
  type: basic
  jt: ['B']
'B':
  type: basic
  jt: ['C', 'X']
'C':
  type: basic
  jt: ['B', 'Y']
'X':
  type: basic
  jt: ['Z']
'Y':
  type: basic
  jt: ['Z']
'Z':
  type: basic
  jt: []
";
    let mut first = Scfg::from_yaml(text).unwrap();
    let mut second = Scfg::from_yaml(text).unwrap();
    restructure(&mut first).unwrap();
    restructure(&mut second).unwrap();
    assert_eq!(first.to_yaml(), second.to_yaml());
}

#[test]
fn restructured_output_roundtrips_through_yaml() {
    let mut scfg = Scfg::from_yaml(
        "
'A':
  type: basic
  jt: ['B', 'C']
'B':
  type: basic
  jt: ['A', 'D']
'C':
  type: basic
  jt: ['D']
'D':
  type: basic
  jt: []
",
    )
    .unwrap();
    restructure(&mut scfg).unwrap();
    let text = scfg.to_yaml();
    let reparsed = Scfg::from_yaml(&text).unwrap();
    assert_eq!(reparsed, scfg);
    assert_eq!(reparsed.to_yaml(), text);
    verify::check_structured(&reparsed).unwrap();
}

#[test]
fn dead_code_is_preserved_not_pruned() {
    // A detached cycle is unreachable; restructuring must neither prune
    // nor crash on it, and the analysis must flag it.
    let mut scfg = Scfg::from_yaml(
        "
'A':
  type: basic
  jt: ['B']
'B':
  type: basic
  jt: []
'dead1':
  type: basic
  jt: ['dead2']
'dead2':
  type: basic
  jt: ['dead1']
",
    )
    .unwrap();
    let unreachable = scfg.unreachable_blocks().unwrap();
    assert_eq!(unreachable, vec!["dead1".to_string(), "dead2".to_string()]);

    restructure(&mut scfg).unwrap();

    // The dead cycle survives untouched: no region, no backedge marking.
    assert!(scfg.contains("dead1"));
    assert!(scfg.contains("dead2"));
    assert_eq!(
        scfg.get("dead1").unwrap().jump_targets(),
        &["dead2".to_string()]
    );
    assert!(scfg.get("dead1").unwrap().backedges().is_empty());
    assert_eq!(
        scfg.unreachable_blocks().unwrap(),
        vec!["dead1".to_string(), "dead2".to_string()]
    );
    // The reachable part keeps its shape.
    assert!(scfg.get("B").unwrap().is_exiting());
}
