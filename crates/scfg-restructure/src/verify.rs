//! Defensive post-pass verification.
//!
//! Restructuring surfaces any broken invariant immediately instead of
//! producing a silently malformed graph: closure of references, unique
//! head and exit, reducibility of every level, single-entry/single-exit
//! regions and global name uniqueness.

use std::collections::{BTreeSet, HashSet};

use scfg_core::{Error, Result, Scfg};

/// Every reference resolves, and the graph has exactly one head and one
/// exiting block. Applies to a top-level graph after `join_returns`.
pub fn check_closed(scfg: &Scfg) -> Result<()> {
    for block in scfg.blocks() {
        for target in block.jump_targets() {
            if !scfg.contains(target) {
                return Err(Error::UndefinedReference {
                    block: block.name().to_string(),
                    target: target.clone(),
                });
            }
        }
    }
    scfg.find_head()?;
    let exiting: Vec<&str> = scfg
        .blocks()
        .filter(|b| b.is_exiting())
        .map(|b| b.name())
        .collect();
    if exiting.len() != 1 {
        return Err(Error::InvariantViolation(format!(
            "expected exactly one exiting block, found {exiting:?}"
        )));
    }
    Ok(())
}

/// Removing backedges leaves a DAG at every region level.
///
/// Cycles in code unreachable from a level's head are exempt: the loop
/// pass preserves them instead of restructuring them, and
/// `Scfg::unreachable_blocks` is the analysis that reports them.
pub fn check_reducible(scfg: &Scfg) -> Result<()> {
    let reachable: HashSet<String> = if scfg.find_head().is_ok() {
        scfg.reverse_post_order().into_iter().collect()
    } else {
        scfg.names().map(str::to_string).collect()
    };
    for component in scfg.compute_scc() {
        if !component.iter().any(|name| reachable.contains(name)) {
            continue;
        }
        if component.len() > 1 {
            return Err(Error::InvariantViolation(format!(
                "effective cycle remains: {component:?}"
            )));
        }
        if let Some(name) = component.iter().next() {
            let self_loop = scfg
                .get(name)
                .is_some_and(|b| b.effective_jump_targets().any(|t| t == name));
            if self_loop {
                return Err(Error::InvariantViolation(format!(
                    "effective self-loop remains: {name:?}"
                )));
            }
        }
    }
    for block in scfg.blocks() {
        if let Some(region) = block.region() {
            check_reducible(&region.subregion)?;
        }
    }
    Ok(())
}

/// Every region block has exactly one header and one exiting block, and
/// its recorded boundary names match its subregion.
pub fn check_regions(scfg: &Scfg) -> Result<()> {
    for block in scfg.blocks() {
        let Some(region) = block.region() else {
            continue;
        };
        let head = region.subregion.find_head().map_err(|_| {
            Error::InvariantViolation(format!(
                "region {:?} subregion has no unique head",
                block.name()
            ))
        })?;
        if head != region.header {
            return Err(Error::InvariantViolation(format!(
                "region {:?} header is {:?} but subregion head is {head:?}",
                block.name(),
                region.header
            )));
        }
        let names: BTreeSet<String> = region.subregion.names().map(str::to_string).collect();
        let (exiting, _) = region.subregion.find_exiting_and_exits(&names);
        if exiting.len() != 1 || exiting[0] != region.exiting {
            return Err(Error::InvariantViolation(format!(
                "region {:?} exiting is {:?} but subregion exiting blocks are {exiting:?}",
                block.name(),
                region.exiting
            )));
        }
        check_regions(&region.subregion)?;
    }
    Ok(())
}

/// Flattening all subregions yields pairwise distinct names.
pub fn check_unique_names(scfg: &Scfg) -> Result<()> {
    fn collect(scfg: &Scfg, seen: &mut HashSet<String>) -> Result<()> {
        for block in scfg.blocks() {
            if !seen.insert(block.name().to_string()) {
                return Err(Error::InvariantViolation(format!(
                    "name {:?} appears in more than one region",
                    block.name()
                )));
            }
            if let Some(region) = block.region() {
                collect(&region.subregion, seen)?;
            }
        }
        Ok(())
    }
    collect(scfg, &mut HashSet::new())
}

/// All structural invariants of a fully restructured graph.
pub fn check_structured(scfg: &Scfg) -> Result<()> {
    check_closed(scfg)?;
    check_reducible(scfg)?;
    check_regions(scfg)?;
    check_unique_names(scfg)
}
