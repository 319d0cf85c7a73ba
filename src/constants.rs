use tracing::{debug, trace};

use crate::asm::{Address, Arena, Instruction, Sequence};

// machine costs of the instructions used by constant synthesis
const COST_MEM: u64 = 10;
const COST_SHIFT: u64 = 5;
const COST_STEP: u64 = 1;
const COST_NEGATE: u64 = 3 * COST_MEM;

#[derive(Debug, Clone)]
pub struct Constant {
    pub value: i64,
    pub address: Address,
    /// Cost of materializing the value from zero.
    pub cost: u64,
}

/// Deduplicated literal table. Entries are kept ordered by magnitude, so the
/// constants a value may be built from always precede it.
#[derive(Debug)]
pub struct ConstantPool {
    region: Address,
    constants: Vec<Constant>,
    next_slot: i64,
    small: i64,
    reuse: bool,
}

#[derive(Debug, Clone, Copy)]
enum Plan {
    Scratch,
    // LOAD source, then INC/DEC the difference
    Delta { from: usize },
    // LOAD source, then extend the binary representation
    Prefix { from: usize, negate: bool },
}

fn order_key(v: i64) -> (u64, bool) {
    (v.unsigned_abs(), v < 0)
}

fn bit_len(m: u64) -> u32 {
    64 - m.leading_zeros()
}

fn low_bits(m: u64, k: u32) -> u64 {
    if k == 0 {
        0
    } else {
        m & (u64::MAX >> (64 - k))
    }
}

impl ConstantPool {
    pub fn new(small: i64, reuse: bool) -> Self {
        let mut pool = Self {
            region: Address::new(0),
            constants: vec![],
            next_slot: 0,
            small,
            reuse,
        };
        // INC/DEC make these free to build, and SHIFT needs both
        pool.add_constant(1);
        pool.add_constant(-1);
        pool
    }

    /// Adds `value`, or returns `None` when it is already pooled.
    pub fn add_constant(&mut self, value: i64) -> Option<&Constant> {
        let pos = match self
            .constants
            .binary_search_by_key(&order_key(value), |c| order_key(c.value))
        {
            Ok(_) => return None,
            Err(pos) => pos,
        };
        let constant = Constant {
            value,
            address: self.region.at(self.next_slot),
            cost: self.scratch_cost(value),
        };
        trace!(value, slot = self.next_slot, "constant added");
        self.next_slot += 1;
        self.constants.insert(pos, constant);
        self.constants.get(pos)
    }

    pub fn get_constant(&self, value: i64) -> Option<&Constant> {
        self.constants
            .binary_search_by_key(&order_key(value), |c| order_key(c.value))
            .ok()
            .map(|i| &self.constants[i])
    }

    /// Address of `value`, pooling it first if needed.
    pub fn intern(&mut self, value: i64) -> Address {
        if let Some(c) = self.get_constant(value) {
            return c.address.clone();
        }
        self.add_constant(value);
        self.get_constant(value)
            .map(|c| c.address.clone())
            .unwrap_or_else(|| self.region.at(self.next_slot - 1))
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.constants.iter()
    }

    /// Moves the whole constant region to start at `base`.
    pub fn place(&self, base: i64) {
        debug!(base, count = self.constants.len(), "constant region placed");
        self.region.set_slot(base);
    }

    fn scratch_cost(&self, value: i64) -> u64 {
        let m = value.unsigned_abs();
        let body = if m == 0 || (m as i128) < self.small as i128 {
            m * COST_STEP
        } else {
            let neg = if value < 0 { COST_NEGATE } else { 0 };
            m.count_ones() as u64 * COST_STEP + (bit_len(m) as u64 - 1) * COST_SHIFT + neg
        };
        COST_MEM + body + COST_MEM
    }

    fn plan(&self, idx: usize) -> (Plan, u64) {
        let target = &self.constants[idx];
        let mut best = (Plan::Scratch, target.cost, false);
        if !self.reuse {
            return (best.0, best.1);
        }
        let v = target.value;
        let m = v.unsigned_abs();
        for (i, c) in self.constants[..idx].iter().enumerate() {
            if c.value == 0 {
                continue;
            }
            let source_neg = c.value < 0;
            let mut consider = |plan: Plan, cost: u64| {
                if cost < best.1 || (cost == best.1 && best.2 && !source_neg) {
                    best = (plan, cost, source_neg);
                }
            };
            if source_neg == (v < 0) {
                let diff = (v as i128 - c.value as i128).unsigned_abs();
                if diff < self.small.max(1) as u128 {
                    consider(Plan::Delta { from: i }, 2 * COST_MEM + diff as u64 * COST_STEP);
                }
            }
            let cm = c.value.unsigned_abs();
            let Some(k) = bit_len(m).checked_sub(bit_len(cm)) else {
                continue;
            };
            if k > 0 && m >> k == cm {
                let negate = source_neg != (v < 0);
                let cost = 2 * COST_MEM
                    + k as u64 * COST_SHIFT
                    + low_bits(m, k).count_ones() as u64 * COST_STEP
                    + if negate { COST_NEGATE } else { 0 };
                consider(Plan::Prefix { from: i, negate }, cost);
            }
        }
        (best.0, best.1)
    }

    /// Startup code writing every pooled value into its cell.
    pub fn generate(&self, arena: &mut Arena, primary: &Address, secondary: &Address) -> Sequence {
        let mut seq = Sequence::new(arena);
        for idx in 0..self.constants.len() {
            let part = self.generate_constant(idx, arena, primary, secondary);
            seq.append(part);
        }
        seq
    }

    fn generate_constant(&self, idx: usize, arena: &mut Arena, primary: &Address, secondary: &Address) -> Sequence {
        let target = &self.constants[idx];
        let v = target.value;
        let m = v.unsigned_abs();
        let (plan, cost) = self.plan(idx);
        trace!(value = v, ?plan, cost, "synthesizing constant");

        let mut seq = Sequence::new(arena);
        let mut emit = |seq: &mut Sequence, i: Instruction| {
            seq.push(arena.push(i));
        };
        match plan {
            Plan::Scratch => {
                emit(&mut seq, Instruction::Sub(primary.clone()));
                if m == 0 || (m as i128) < self.small as i128 {
                    let step = if v < 0 { Instruction::Dec } else { Instruction::Inc };
                    for _ in 0..m {
                        emit(&mut seq, step.clone());
                    }
                } else {
                    let one = self.one();
                    emit(&mut seq, Instruction::Inc);
                    for bit in (0..bit_len(m) - 1).rev() {
                        emit(&mut seq, Instruction::Shift(one.clone()));
                        if m >> bit & 1 == 1 {
                            emit(&mut seq, Instruction::Inc);
                        }
                    }
                    if v < 0 {
                        negate(&mut seq, &mut emit, secondary);
                    }
                }
            }
            Plan::Delta { from } => {
                let source = &self.constants[from];
                emit(&mut seq, Instruction::Load(source.address.clone()));
                let diff = v as i128 - source.value as i128;
                let step = if diff < 0 { Instruction::Dec } else { Instruction::Inc };
                for _ in 0..diff.unsigned_abs() {
                    emit(&mut seq, step.clone());
                }
            }
            Plan::Prefix { from, negate: flip } => {
                let source = &self.constants[from];
                let one = self.one();
                emit(&mut seq, Instruction::Load(source.address.clone()));
                let k = bit_len(m) - bit_len(source.value.unsigned_abs());
                // the accumulator carries the source's sign while extending
                let step = if source.value < 0 { Instruction::Dec } else { Instruction::Inc };
                for bit in (0..k).rev() {
                    emit(&mut seq, Instruction::Shift(one.clone()));
                    if m >> bit & 1 == 1 {
                        emit(&mut seq, step.clone());
                    }
                }
                if flip {
                    negate(&mut seq, &mut emit, secondary);
                }
            }
        }
        emit(&mut seq, Instruction::Store(target.address.clone()));
        seq
    }

    fn one(&self) -> Address {
        self.get_constant(1)
            .map(|c| c.address.clone())
            .unwrap_or_else(|| self.region.at(0))
    }
}

// acc <- -acc, through a scratch cell
fn negate(seq: &mut Sequence, emit: &mut impl FnMut(&mut Sequence, Instruction), scratch: &Address) {
    emit(seq, Instruction::Store(scratch.clone()));
    emit(seq, Instruction::Sub(scratch.clone()));
    emit(seq, Instruction::Sub(scratch.clone()));
}
