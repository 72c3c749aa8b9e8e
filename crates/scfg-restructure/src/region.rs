//! Region extraction: materializing a restructured node set as a single
//! region block owning a subregion.

use std::collections::BTreeSet;

use scfg_core::{Block, BlockKind, Error, RegionData, RegionKind, Result, Scfg};

/// Moves `region_blocks` out of `scfg` into a fresh subregion and replaces
/// them with one region block. The set must be single-entry/single-exit:
/// exactly one header and one exiting block. Entry edges (targets and
/// backedges) are retargeted at the region block; the region block takes
/// over the exiting block's external successors. Returns the region name.
pub(crate) fn extract_region(
    scfg: &mut Scfg,
    region_blocks: &BTreeSet<String>,
    kind: RegionKind,
) -> Result<String> {
    let (headers, entries) = scfg.find_headers_and_entries(region_blocks)?;
    let (exiting_blocks, _) = scfg.find_exiting_and_exits(region_blocks);
    let [header] = headers.as_slice() else {
        return Err(Error::InvariantViolation(format!(
            "region {region_blocks:?} has headers {headers:?}, expected exactly one"
        )));
    };
    let [exiting] = exiting_blocks.as_slice() else {
        return Err(Error::InvariantViolation(format!(
            "region {region_blocks:?} has exiting blocks {exiting_blocks:?}, expected exactly one"
        )));
    };
    // The header fallback can hand back the graph head; a head outside the
    // set would build a region whose header its subregion does not contain.
    if !region_blocks.contains(header) {
        return Err(Error::InvariantViolation(format!(
            "region header {header:?} is not a member of {region_blocks:?}"
        )));
    }

    let gen = scfg.name_gen().clone();
    let region_name = gen.new_region_name(kind.as_str());

    // Move the blocks into the subregion in sorted order so insertion
    // order stays reproducible.
    let mut subregion = Scfg::with_name_gen(gen);
    for name in region_blocks {
        subregion.add_block(scfg.take_block(name)?)?;
    }
    let region_targets: Vec<String> = subregion
        .get(exiting)
        .map(|b| b.effective_jump_targets().map(str::to_string).collect())
        .unwrap_or_default();

    for entry in &entries {
        // An entry recorded from an enclosing level is not ours to rewrite.
        if !scfg.contains(entry) {
            continue;
        }
        let block = scfg.take_block(entry)?;
        let jt: Vec<String> = block
            .jump_targets()
            .iter()
            .map(|t| retarget(t, header, &region_name))
            .collect();
        let be: Vec<String> = block
            .backedges()
            .iter()
            .map(|t| retarget(t, header, &region_name))
            .collect();
        let mut block = block.replace_jump_targets(jt).replace_backedges(be);
        block.retarget_through_exiting(header, &region_name)?;
        scfg.add_block(block)?;
    }

    scfg.add_block(Block::new(
        region_name.clone(),
        region_targets,
        BlockKind::Region(Box::new(RegionData {
            kind,
            header: header.clone(),
            subregion,
            exiting: exiting.clone(),
        })),
    ))?;
    Ok(region_name)
}

fn retarget(target: &str, old: &str, new: &str) -> String {
    if target == old {
        new.to_string()
    } else {
        target.to_string()
    }
}

/// Re-derives a region's header and exiting names from its subregion.
///
/// Recursing into a subregion can wrap the region's former header or
/// exiting block into a nested region; the enclosing record is repaired
/// here rather than through parent pointers.
pub(crate) fn update_region_bounds(data: &mut RegionData) -> Result<()> {
    data.header = data.subregion.find_head()?;
    let names: BTreeSet<String> = data.subregion.names().map(str::to_string).collect();
    let (exiting, _) = data.subregion.find_exiting_and_exits(&names);
    let [exiting] = exiting.as_slice() else {
        return Err(Error::InvariantViolation(format!(
            "region with header {:?} has exiting blocks {exiting:?}, expected exactly one",
            data.header
        )));
    };
    data.exiting = exiting.clone();
    Ok(())
}
