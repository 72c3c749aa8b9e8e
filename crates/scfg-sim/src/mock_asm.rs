//! A mock assembly with minimal operational semantics.
//!
//! Four instructions are enough to exercise every control flow shape the
//! restructuring passes deal with: straight-line output, unconditional
//! jumps, and a counter-driven conditional branch whose counter decrements
//! persistently, so every counted loop terminates. Programs have no input;
//! their behavior is static, which makes them ideal for differential
//! testing of control flow transformations.

use std::collections::HashMap;

use crate::SimError;

/// One instruction. Jump targets are absolute instruction offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    /// Print `text` and fall through.
    Print { text: String },
    /// Set the program counter to `target`.
    Goto { target: usize },
    /// Initialize the counter at this location to `count` on first visit,
    /// decrement it toward zero, and store it in the last-counter
    /// register.
    Ctr { count: i64 },
    /// Jump to `true_target` when the last counter is non-zero, else to
    /// `false_target`.
    BrCtr {
        true_target: usize,
        false_target: usize,
    },
}

/// Parses assembly text. Labels (`label <name>`) name the offset of the
/// following instruction; `print`, `goto`, `ctr` and `brctr` assemble to
/// one [`Inst`] each.
pub fn parse(asm: &str) -> Result<Vec<Inst>, SimError> {
    let mut labels: HashMap<&str, usize> = HashMap::new();
    let mut raw: Vec<(&str, Vec<&str>)> = Vec::new();
    for line in asm.lines() {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            continue;
        };
        let tail: Vec<&str> = parts.collect();
        if head == "label" {
            let [name] = tail.as_slice() else {
                return Err(SimError::Parse(format!("malformed label line: {line:?}")));
            };
            labels.insert(name, raw.len());
        } else {
            raw.push((head, tail));
        }
    }

    let resolve = |name: &str| {
        labels
            .get(name)
            .copied()
            .ok_or_else(|| SimError::Parse(format!("unknown label {name:?}")))
    };
    let mut program = Vec::with_capacity(raw.len());
    for (head, tail) in raw {
        let inst = match (head, tail.as_slice()) {
            ("print", [text]) => Inst::Print {
                text: (*text).to_string(),
            },
            ("goto", [label]) => Inst::Goto {
                target: resolve(label)?,
            },
            ("ctr", [count]) => Inst::Ctr {
                count: count
                    .parse()
                    .map_err(|_| SimError::Parse(format!("bad counter {count:?}")))?,
            },
            ("brctr", [true_label, false_label]) => Inst::BrCtr {
                true_target: resolve(true_label)?,
                false_target: resolve(false_label)?,
            },
            _ => return Err(SimError::Parse(format!("invalid instruction {head:?}"))),
        };
        program.push(inst);
    }
    Ok(program)
}

/// The virtual machine: a program counter, an output buffer, the
/// last-counter register and the per-location counter table.
#[derive(Debug, Default)]
pub struct Vm {
    output: String,
    last_ctr: Option<i64>,
    counters: HashMap<usize, i64>,
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn into_output(self) -> String {
        self.output
    }

    /// Evaluates one instruction at `pc`, returning the next pc.
    pub fn eval_inst(&mut self, pc: usize, inst: &Inst) -> Result<usize, SimError> {
        match inst {
            Inst::Print { text } => {
                self.output.push_str(text);
                self.output.push('\n');
                Ok(pc + 1)
            }
            Inst::Goto { target } => Ok(*target),
            Inst::Ctr { count } => {
                let counter = self.counters.entry(pc).or_insert(*count);
                *counter = (*counter - 1).max(0);
                self.last_ctr = Some(*counter);
                Ok(pc + 1)
            }
            Inst::BrCtr {
                true_target,
                false_target,
            } => {
                let ctr = self.last_ctr.ok_or(SimError::MissingCounter { pc })?;
                Ok(if ctr != 0 { *true_target } else { *false_target })
            }
        }
    }
}

/// Runs a program on a fresh VM from offset 0 until it falls off the end.
pub fn run_program(program: &[Inst], max_steps: usize) -> Result<String, SimError> {
    let mut vm = Vm::new();
    let mut pc = 0;
    let mut steps = 0;
    while pc < program.len() {
        if steps >= max_steps {
            return Err(SimError::StepLimit);
        }
        pc = vm.eval_inst(pc, &program[pc])?;
        steps += 1;
    }
    Ok(vm.into_output())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTED_LOOP: &str = "
        print S
        label top
            ctr 3
            brctr body end
        label body
            print B
            goto top
        label end
            print E
    ";

    #[test]
    fn test_parse_counted_loop() {
        let program = parse(COUNTED_LOOP).unwrap();
        assert_eq!(program.len(), 6);
        assert_eq!(
            program[2],
            Inst::BrCtr {
                true_target: 3,
                false_target: 5
            }
        );
        assert_eq!(program[4], Inst::Goto { target: 1 });
    }

    #[test]
    fn test_parse_rejects_unknown_label() {
        assert!(matches!(
            parse("goto nowhere"),
            Err(SimError::Parse(_))
        ));
    }

    #[test]
    fn test_vm_counted_loop() {
        // ctr 3 yields 2, 1, 0: the body runs twice.
        let program = parse(COUNTED_LOOP).unwrap();
        let output = run_program(&program, 1000).unwrap();
        assert_eq!(output, "S\nB\nB\nE\n");
    }

    #[test]
    fn test_vm_hits_step_limit() {
        let program = parse("label spin\nprint X\ngoto spin").unwrap();
        assert!(matches!(
            run_program(&program, 50),
            Err(SimError::StepLimit)
        ));
    }

    #[test]
    fn test_brctr_without_counter_is_an_error() {
        let program = parse("brctr a b\nlabel a\nlabel b\nprint X").unwrap();
        assert!(matches!(
            run_program(&program, 50),
            Err(SimError::MissingCounter { pc: 0 })
        ));
    }
}
