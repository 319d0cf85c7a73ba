//! Interpreter for the emitted machine code. Used to check that generated
//! programs compute what the source says.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MachineError {
    #[error("line {line}: cannot parse `{text}`")]
    Parse { line: usize, text: String },
    #[error("instruction {pc}: jump to {target} is outside the program")]
    JumpOutOfRange { pc: usize, target: i64 },
    #[error("instruction {pc}: GET with no input left")]
    InputExhausted { pc: usize },
    #[error("program ran past its last instruction")]
    FellOff,
    #[error("step limit of {0} reached")]
    StepLimit(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Get,
    Put,
    Halt,
    Inc,
    Dec,
    Load(i64),
    Store(i64),
    Loadi(i64),
    Storei(i64),
    Add(i64),
    Sub(i64),
    Shift(i64),
    Jump(i64),
    Jpos(i64),
    Jzero(i64),
    Jneg(i64),
}

impl Op {
    fn cost(self) -> u64 {
        match self {
            Op::Get | Op::Put => 100,
            Op::Load(_) | Op::Store(_) | Op::Add(_) | Op::Sub(_) => 10,
            Op::Loadi(_) | Op::Storei(_) => 20,
            Op::Shift(_) => 5,
            Op::Inc | Op::Dec | Op::Jump(_) | Op::Jpos(_) | Op::Jzero(_) | Op::Jneg(_) => 1,
            Op::Halt => 0,
        }
    }
}

fn parse_line(line: &str) -> Option<Op> {
    // verbose listings prefix every line with "address:"
    let line = match line.split_once(':') {
        Some((_, rest)) => rest,
        None => line,
    };
    let mut parts = line.split_whitespace();
    let mnemonic = parts.next()?;
    let arg = parts.next().map(str::parse::<i64>);
    if parts.next().is_some() {
        return None;
    }
    let op = match (mnemonic, arg) {
        ("GET", None) => Op::Get,
        ("PUT", None) => Op::Put,
        ("HALT", None) => Op::Halt,
        ("INC", None) => Op::Inc,
        ("DEC", None) => Op::Dec,
        (m, Some(Ok(n))) => match m {
            "LOAD" => Op::Load(n),
            "STORE" => Op::Store(n),
            "LOADI" => Op::Loadi(n),
            "STOREI" => Op::Storei(n),
            "ADD" => Op::Add(n),
            "SUB" => Op::Sub(n),
            "SHIFT" => Op::Shift(n),
            "JUMP" => Op::Jump(n),
            "JPOS" => Op::Jpos(n),
            "JZERO" => Op::Jzero(n),
            "JNEG" => Op::Jneg(n),
            _ => return None,
        },
        _ => return None,
    };
    Some(op)
}

fn shift(acc: i64, by: i64) -> i64 {
    if by >= 0 {
        if by >= 63 {
            0
        } else {
            acc.wrapping_mul(1i64 << by)
        }
    } else {
        acc >> (-by).min(63)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Run {
    pub outputs: Vec<i64>,
    pub memory: BTreeMap<i64, i64>,
    pub steps: u64,
    pub cost: u64,
}

impl Run {
    /// Cell contents; untouched cells read as 0.
    pub fn cell(&self, address: i64) -> i64 {
        self.memory.get(&address).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct Machine {
    program: Vec<Op>,
    step_limit: u64,
}

impl Machine {
    pub fn parse(text: &str) -> Result<Machine, MachineError> {
        let mut program = vec![];
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let op = parse_line(line).ok_or_else(|| MachineError::Parse {
                line: n + 1,
                text: line.to_string(),
            })?;
            program.push(op);
        }
        Ok(Machine {
            program,
            step_limit: 10_000_000,
        })
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn len(&self) -> usize {
        self.program.len()
    }

    pub fn is_empty(&self) -> bool {
        self.program.is_empty()
    }

    pub fn run(&self, inputs: &[i64]) -> Result<Run, MachineError> {
        let mut run = Run::default();
        let mut input = inputs.iter().copied();
        let mut pc = 0usize;
        loop {
            let Some(&op) = self.program.get(pc) else {
                return Err(MachineError::FellOff);
            };
            if run.steps >= self.step_limit {
                return Err(MachineError::StepLimit(self.step_limit));
            }
            run.steps += 1;
            run.cost += op.cost();

            let acc = run.cell(0);
            let mut next = pc + 1;
            let mut jump = |target: i64, taken: bool| -> Result<(), MachineError> {
                if taken {
                    next = usize::try_from(target)
                        .ok()
                        .filter(|t| *t < self.program.len())
                        .ok_or(MachineError::JumpOutOfRange { pc, target })?;
                }
                Ok(())
            };
            let result = match op {
                Op::Get => Some(input.next().ok_or(MachineError::InputExhausted { pc })?),
                Op::Put => {
                    run.outputs.push(acc);
                    None
                }
                Op::Halt => return Ok(run),
                Op::Inc => Some(acc.wrapping_add(1)),
                Op::Dec => Some(acc.wrapping_sub(1)),
                Op::Load(i) => Some(run.cell(i)),
                Op::Store(i) => {
                    run.memory.insert(i, acc);
                    None
                }
                Op::Loadi(i) => Some(run.cell(run.cell(i))),
                Op::Storei(i) => {
                    run.memory.insert(run.cell(i), acc);
                    None
                }
                Op::Add(i) => Some(acc.wrapping_add(run.cell(i))),
                Op::Sub(i) => Some(acc.wrapping_sub(run.cell(i))),
                Op::Shift(i) => Some(shift(acc, run.cell(i))),
                Op::Jump(t) => {
                    jump(t, true)?;
                    None
                }
                Op::Jpos(t) => {
                    jump(t, acc > 0)?;
                    None
                }
                Op::Jzero(t) => {
                    jump(t, acc == 0)?;
                    None
                }
                Op::Jneg(t) => {
                    jump(t, acc < 0)?;
                    None
                }
            };
            if let Some(v) = result {
                run.memory.insert(0, v);
            }
            pc = next;
        }
    }
}
