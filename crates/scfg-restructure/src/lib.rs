//! # scfg-restructure
//!
//! The SCFG restructuring passes of Bahmann et al. (2015), §§4.1–4.2:
//! after [`restructure`] every loop has a single header and a single
//! exiting latch, and every branch construct is a single-entry/single-exit
//! region. The graph is first closed (`join_returns`), then
//! loop-restructured, then branch-restructured, each pass recursing into
//! the regions it creates. Defensive verification runs at the end and
//! surfaces any broken invariant immediately.

mod branches;
mod dominators;
mod loops;
mod region;
pub mod verify;

pub use branches::restructure_branch;
pub use loops::restructure_loop;

use scfg_core::{Result, Scfg};

/// Restructures `scfg` in place: close, loop pass, branch pass, verify.
pub fn restructure(scfg: &mut Scfg) -> Result<()> {
    scfg.join_returns()?;
    restructure_loop(scfg)?;
    restructure_branch(scfg)?;
    verify::check_structured(scfg)?;
    Ok(())
}
