//! Dominator and postdominator sets over one graph level.
//!
//! Internal helpers for the restructuring passes. Computation is the
//! classic worklist fixpoint over dominator sets; graphs at one region
//! level are small enough that the set-based formulation is the simplest
//! deterministic choice. Edges are effective in-graph edges only.

use std::collections::{BTreeMap, BTreeSet};

use scfg_core::Scfg;

pub(crate) type DomSets = BTreeMap<String, BTreeSet<String>>;

/// Dominator sets: `doms[b]` holds every block on all paths from the
/// level's entries to `b`, including `b` itself.
pub(crate) fn dominator_sets(scfg: &Scfg) -> DomSets {
    let mut preds: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut succs: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for block in scfg.blocks() {
        for target in block.effective_jump_targets() {
            if scfg.contains(target) {
                preds.entry(target).or_default().insert(block.name());
                succs.entry(block.name()).or_default().insert(target);
            }
        }
    }
    let entries: BTreeSet<&str> = scfg
        .names()
        .filter(|n| preds.get(n).is_none_or(BTreeSet::is_empty))
        .collect();
    fixpoint(scfg, &entries, &preds, &succs)
}

/// Postdominator sets, computed as dominator sets of the reversed graph
/// seeded at the blocks without in-graph successors.
pub(crate) fn post_dominator_sets(scfg: &Scfg) -> DomSets {
    let mut preds: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut succs: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for block in scfg.blocks() {
        for target in block.effective_jump_targets() {
            if scfg.contains(target) {
                preds.entry(block.name()).or_default().insert(target);
                succs.entry(target).or_default().insert(block.name());
            }
        }
    }
    let entries: BTreeSet<&str> = scfg
        .names()
        .filter(|n| preds.get(n).is_none_or(BTreeSet::is_empty))
        .collect();
    fixpoint(scfg, &entries, &preds, &succs)
}

fn fixpoint(
    scfg: &Scfg,
    entries: &BTreeSet<&str>,
    preds: &BTreeMap<&str, BTreeSet<&str>>,
    succs: &BTreeMap<&str, BTreeSet<&str>>,
) -> DomSets {
    let all: BTreeSet<String> = scfg.names().map(str::to_string).collect();
    let mut doms: DomSets = DomSets::new();
    let mut todo: Vec<String> = Vec::new();
    for name in scfg.names() {
        if entries.contains(name) {
            doms.insert(name.to_string(), BTreeSet::from([name.to_string()]));
        } else {
            doms.insert(name.to_string(), all.clone());
            todo.push(name.to_string());
        }
    }
    while let Some(name) = todo.pop() {
        if entries.contains(name.as_str()) {
            continue;
        }
        let mut new_doms = BTreeSet::from([name.clone()]);
        if let Some(ps) = preds.get(name.as_str()) {
            let mut intersection: Option<BTreeSet<String>> = None;
            for p in ps {
                let pdoms = &doms[*p];
                intersection = Some(match intersection {
                    None => pdoms.clone(),
                    Some(acc) => acc.intersection(pdoms).cloned().collect(),
                });
            }
            if let Some(acc) = intersection {
                new_doms.extend(acc);
            }
        }
        if new_doms != doms[&name] {
            doms.insert(name.clone(), new_doms);
            if let Some(ss) = succs.get(name.as_str()) {
                todo.extend(ss.iter().map(|s| s.to_string()));
            }
        }
    }
    doms
}

/// Reduces dominator sets to the immediate dominator of each block.
/// Entries (and blocks dominated only by themselves) have none.
pub(crate) fn immediate_dominators(doms: &DomSets) -> BTreeMap<String, String> {
    let mut strict: DomSets = doms
        .iter()
        .map(|(k, v)| {
            let mut set = v.clone();
            set.remove(k);
            (k.clone(), set)
        })
        .collect();
    let keys: Vec<String> = strict.keys().cloned().collect();
    let mut changed = true;
    while changed {
        changed = false;
        for k in &keys {
            let current = strict[k].clone();
            let mut reduced = current.clone();
            for v in &current {
                if let Some(vdoms) = strict.get(v) {
                    for d in vdoms {
                        reduced.remove(d);
                    }
                }
            }
            if reduced.len() < current.len() {
                strict.insert(k.clone(), reduced);
                changed = true;
            }
        }
    }
    strict
        .into_iter()
        .filter_map(|(k, v)| {
            let mut it = v.into_iter();
            match (it.next(), it.next()) {
                (Some(only), None) => Some((k, only)),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scfg_core::Block;

    fn graph_from(blocks: Vec<Block>) -> Scfg {
        let mut scfg = Scfg::new();
        for block in blocks {
            scfg.add_block(block).unwrap();
        }
        scfg
    }

    fn diamond() -> Scfg {
        graph_from(vec![
            Block::basic("a", vec!["b".into(), "c".into()]),
            Block::basic("b", vec!["d".into()]),
            Block::basic("c", vec!["d".into()]),
            Block::basic("d", vec![]),
        ])
    }

    #[test]
    fn test_dominator_sets_diamond() {
        let doms = dominator_sets(&diamond());
        assert!(doms["d"].contains("a"));
        assert!(!doms["d"].contains("b"));
        assert!(!doms["d"].contains("c"));
        assert!(doms["b"].contains("a"));
    }

    #[test]
    fn test_post_dominator_sets_diamond() {
        let postdoms = post_dominator_sets(&diamond());
        assert!(postdoms["a"].contains("d"));
        assert!(!postdoms["a"].contains("b"));
        assert!(postdoms["b"].contains("d"));
    }

    #[test]
    fn test_immediate_dominators_linear() {
        let scfg = graph_from(vec![
            Block::basic("a", vec!["b".into()]),
            Block::basic("b", vec!["c".into()]),
            Block::basic("c", vec![]),
        ]);
        let idoms = immediate_dominators(&dominator_sets(&scfg));
        assert_eq!(idoms.get("b").map(String::as_str), Some("a"));
        assert_eq!(idoms.get("c").map(String::as_str), Some("b"));
        assert_eq!(idoms.get("a"), None);
    }

    #[test]
    fn test_immediate_postdominator_of_branch() {
        let idoms = immediate_dominators(&post_dominator_sets(&diamond()));
        assert_eq!(idoms.get("a").map(String::as_str), Some("d"));
    }
}
