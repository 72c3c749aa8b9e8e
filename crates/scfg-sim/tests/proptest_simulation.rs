//! Differential property tests: a random program executed directly on the
//! VM and executed through its restructured SCFG must print the same
//! trace.
//!
//! Programs are generated so that they always terminate: backward jumps
//! only occur as the counted arm of a `brctr`, whose counter decrements
//! persistently, and the uncounted arm always moves forward.

use proptest::prelude::*;

use scfg_restructure::{restructure, verify};
use scfg_sim::{program_to_scfg, run_program, Inst, Simulator};

#[derive(Debug, Clone)]
enum Term {
    Fall,
    Goto(usize),
    BrCtr { count: i64, taken: usize, forward: usize },
}

/// Maps one raw sample to block `index`'s terminator; `forward` is folded
/// into `index + 1..n` so every cycle has a forward escape.
fn term_from_raw(index: usize, num_blocks: usize, raw: (u8, i64, usize, usize)) -> Term {
    let (choice, count, taken, fwd) = raw;
    let forward = index + 1 + (fwd % (num_blocks - index - 1));
    match choice {
        0 | 1 => Term::Fall,
        2 => Term::Goto(forward),
        _ if taken == forward => Term::Goto(forward),
        _ => Term::BrCtr {
            count,
            taken,
            forward,
        },
    }
}

/// Lowers per-block terminators to an instruction list. Every block
/// prints its own tag first, so the output trace reflects the block-level
/// control flow exactly.
fn assemble(terms: &[Term]) -> Vec<Inst> {
    let num_blocks = terms.len() + 1;
    let size = |term: Option<&Term>| match term {
        None => 1,
        Some(Term::Fall) => 1,
        Some(Term::Goto(_)) => 2,
        Some(Term::BrCtr { .. }) => 3,
    };
    let mut offsets = Vec::with_capacity(num_blocks);
    let mut offset = 0;
    for index in 0..num_blocks {
        offsets.push(offset);
        offset += size(terms.get(index));
    }

    let mut program = Vec::with_capacity(offset);
    for index in 0..num_blocks {
        program.push(Inst::Print {
            text: format!("P{index}"),
        });
        match terms.get(index) {
            None | Some(Term::Fall) => {}
            Some(Term::Goto(target)) => program.push(Inst::Goto {
                target: offsets[*target],
            }),
            Some(Term::BrCtr {
                count,
                taken,
                forward,
            }) => {
                program.push(Inst::Ctr { count: *count });
                program.push(Inst::BrCtr {
                    true_target: offsets[*taken],
                    false_target: offsets[*forward],
                });
            }
        }
    }
    program
}

fn arb_program() -> impl Strategy<Value = Vec<Inst>> {
    (3usize..10)
        .prop_flat_map(|n| {
            (
                Just(n),
                prop::collection::vec((0u8..6, 1i64..5, 1..n, 0..n), n - 1),
            )
        })
        .prop_map(|(n, raw)| {
            let terms: Vec<Term> = raw
                .into_iter()
                .enumerate()
                .map(|(i, sample)| term_from_raw(i, n, sample))
                .collect();
            assemble(&terms)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Restructuring a compiled program upholds the structural invariants.
    #[test]
    fn compiled_programs_restructure_cleanly(program in arb_program()) {
        let (mut scfg, _) = program_to_scfg(&program).unwrap();
        restructure(&mut scfg).unwrap();
        verify::check_structured(&scfg).unwrap();
    }

    /// The restructured graph is semantically equivalent to the program:
    /// simulation and direct execution print the same trace.
    #[test]
    fn restructured_simulation_matches_vm(program in arb_program()) {
        let direct = match run_program(&program, 10_000) {
            Ok(output) => output,
            // Generated programs terminate by construction; an overrun
            // would point at the generator, not the engine.
            Err(_) => return Err(TestCaseError::fail("program did not terminate")),
        };
        let (mut scfg, targets) = program_to_scfg(&program).unwrap();
        restructure(&mut scfg).unwrap();
        let simulated = Simulator::new(&program, &targets, 100_000)
            .run(&scfg)
            .unwrap();
        prop_assert_eq!(simulated, direct);
    }

    /// Simulation of the *unrestructured* graph also matches the VM; this
    /// pins down the front-end independently of the passes.
    #[test]
    fn flat_simulation_matches_vm(program in arb_program()) {
        let direct = run_program(&program, 10_000).unwrap();
        let (scfg, targets) = program_to_scfg(&program).unwrap();
        let simulated = Simulator::new(&program, &targets, 100_000)
            .run(&scfg)
            .unwrap();
        prop_assert_eq!(simulated, direct);
    }
}
