//! # scfg-sim
//!
//! A mock assembly, its virtual machine, and a block-level SCFG simulator.
//! Together they differentially test the restructuring passes: a program
//! executed directly and executed through its restructured graph must
//! print the same trace.

pub mod mock_asm;
pub mod simulator;

use thiserror::Error;

pub use mock_asm::{parse, run_program, Inst, Vm};
pub use simulator::{program_to_scfg, Simulator, TargetTable};

/// Errors of the mock assembly and the simulator.
#[derive(Error, Debug)]
pub enum SimError {
    /// Assembly text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Execution exceeded the step budget.
    #[error("step limit exceeded")]
    StepLimit,

    /// A conditional branch ran before any counter instruction.
    #[error("brctr at {pc} without a preceding counter")]
    MissingCounter { pc: usize },

    /// A dispatcher block read a control variable that was never assigned.
    #[error("control variable {variable:?} is unbound")]
    UnboundControlVariable { variable: String },

    /// Control reached a label that no graph level defines.
    #[error("control escaped to unknown label {label:?}")]
    Escaped { label: String },

    /// The graph itself is malformed.
    #[error(transparent)]
    Graph(#[from] scfg_core::Error),
}
