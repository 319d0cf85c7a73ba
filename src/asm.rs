use std::cell::Cell;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::error::{CompileError, Result};

/// A memory cell reference shared by every instruction naming the same slot.
/// Moving the slot (`set_slot`) is seen by all clones; the offset is per handle.
#[derive(Debug, Clone)]
pub struct Address {
    slot: Rc<Cell<i64>>,
    offset: i64,
}

impl Address {
    pub fn new(slot: i64) -> Self {
        Self {
            slot: Rc::new(Cell::new(slot)),
            offset: 0,
        }
    }

    pub fn get(&self) -> i64 {
        self.slot.get() + self.offset
    }

    pub fn set_slot(&self, slot: i64) {
        self.slot.set(slot);
    }

    pub fn set_offset(&mut self, offset: i64) {
        self.offset = offset;
    }

    /// Another handle onto the same slot, displaced by `offset`.
    pub fn at(&self, offset: i64) -> Address {
        Address {
            slot: Rc::clone(&self.slot),
            offset,
        }
    }

    /// True when both handles name the same logical cell, not merely the same number.
    pub fn same_cell(&self, other: &Address) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot) && self.offset == other.offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(usize);

impl Label {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum Instruction {
    Get,
    Put,
    Halt,
    Inc,
    Dec,
    Load(Address),
    Store(Address),
    Loadi(Address),
    Storei(Address),
    Add(Address),
    Sub(Address),
    Shift(Address),
    Jump(Label),
    Jpos(Label),
    Jzero(Label),
    Jneg(Label),
    // zero width; takes the address of the next real instruction, or of its redirect
    Stub(Option<Label>),
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Get => "GET",
            Instruction::Put => "PUT",
            Instruction::Halt => "HALT",
            Instruction::Inc => "INC",
            Instruction::Dec => "DEC",
            Instruction::Load(_) => "LOAD",
            Instruction::Store(_) => "STORE",
            Instruction::Loadi(_) => "LOADI",
            Instruction::Storei(_) => "STOREI",
            Instruction::Add(_) => "ADD",
            Instruction::Sub(_) => "SUB",
            Instruction::Shift(_) => "SHIFT",
            Instruction::Jump(_) => "JUMP",
            Instruction::Jpos(_) => "JPOS",
            Instruction::Jzero(_) => "JZERO",
            Instruction::Jneg(_) => "JNEG",
            Instruction::Stub(_) => "STUB",
        }
    }

    pub fn operand(&self) -> Option<&Address> {
        match self {
            Instruction::Load(a)
            | Instruction::Store(a)
            | Instruction::Loadi(a)
            | Instruction::Storei(a)
            | Instruction::Add(a)
            | Instruction::Sub(a)
            | Instruction::Shift(a) => Some(a),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<Label> {
        match self {
            Instruction::Jump(t) | Instruction::Jpos(t) | Instruction::Jzero(t) | Instruction::Jneg(t) => {
                Some(*t)
            }
            _ => None,
        }
    }

    pub fn is_stub(&self) -> bool {
        matches!(self, Instruction::Stub(_))
    }
}

#[derive(Debug)]
struct Node {
    instr: Instruction,
    address: Option<i64>,
}

/// Owner of every instruction created during one compilation. Sequences and
/// jumps refer to instructions through `Label`s, which stay valid for the
/// lifetime of the arena.
#[derive(Debug, Default)]
pub struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instr: Instruction) -> Label {
        self.nodes.push(Node { instr, address: None });
        Label(self.nodes.len() - 1)
    }

    pub fn stub(&mut self) -> Label {
        self.push(Instruction::Stub(None))
    }

    pub fn get(&self, l: Label) -> &Instruction {
        &self.nodes[l.0].instr
    }

    pub fn replace(&mut self, l: Label, instr: Instruction) {
        self.nodes[l.0].instr = instr;
    }

    /// Address assigned by the last `seal` covering `l`.
    pub fn address(&self, l: Label) -> Option<i64> {
        self.nodes[l.0].address
    }

    /// Points `stub` at `target`. Everything already aimed at `stub` follows.
    pub fn redirect(&mut self, stub: Label, target: Label) -> Result<()> {
        if !self.get(stub).is_stub() {
            return Err(CompileError::Unclassifiable(format!(
                "only stubs can be redirected, got {}",
                self.get(stub).mnemonic()
            )));
        }
        if self.resolve(target) == stub {
            return Err(CompileError::StubCycle(stub.0));
        }
        self.replace(stub, Instruction::Stub(Some(target)));
        Ok(())
    }

    /// Follows redirects from `l` to the first label that is not a redirected
    /// stub, compressing the path on the way.
    pub fn resolve(&mut self, l: Label) -> Label {
        let mut chain = vec![];
        let mut cur = l;
        while let Instruction::Stub(Some(next)) = self.get(cur) {
            chain.push(cur);
            cur = *next;
        }
        for hop in chain {
            self.replace(hop, Instruction::Stub(Some(cur)));
        }
        cur
    }

    /// Assigns linear addresses to `seq`. Real instructions are numbered in
    /// order; plain stubs take the number of the next real instruction and
    /// redirected stubs that of their resolved target. Safe to repeat.
    pub fn seal(&mut self, seq: &Sequence) {
        let mut counter = 0i64;
        let mut redirected = vec![];
        for &l in &seq.items {
            let instr = self.get(l);
            if let Instruction::Stub(Some(_)) = instr {
                redirected.push(l);
                continue;
            }
            let real = !instr.is_stub();
            self.nodes[l.0].address = Some(counter);
            if real {
                counter += 1;
            }
        }
        for l in redirected {
            let target = self.resolve(l);
            self.nodes[l.0].address = self.address(target);
        }
    }

    /// One line of machine code, or `None` for stubs.
    pub fn render(&self, l: Label) -> Option<String> {
        let instr = self.get(l);
        if instr.is_stub() {
            return None;
        }
        if let Some(a) = instr.operand() {
            return Some(format!("{} {}", instr.mnemonic(), a.get()));
        }
        if let Some(t) = instr.target() {
            let to = self.address(t).unwrap_or(-1);
            return Some(format!("{} {}", instr.mnemonic(), to));
        }
        Some(instr.mnemonic().to_string())
    }
}

/// An ordered run of instructions that always ends in its own stub, so that
/// `end()` is a valid "after this block" target before anything follows it.
#[derive(Debug, Clone)]
pub struct Sequence {
    items: Vec<Label>,
    end: Label,
}

impl Sequence {
    pub fn new(arena: &mut Arena) -> Self {
        let end = arena.stub();
        Self { items: vec![end], end }
    }

    pub fn end(&self) -> Label {
        self.end
    }

    pub fn start(&self, arena: &Arena) -> Result<Label> {
        self.items
            .iter()
            .copied()
            .find(|l| !arena.get(*l).is_stub())
            .ok_or(CompileError::EmptySequence)
    }

    pub fn push(&mut self, l: Label) -> &mut Self {
        let at = self.items.len() - 1;
        self.items.insert(at, l);
        self
    }

    pub fn append(&mut self, other: Sequence) -> &mut Self {
        let at = self.items.len() - 1;
        self.items.splice(at..at, other.items);
        self
    }

    pub fn items(&self) -> &[Label] {
        &self.items
    }
}

/// A complete program: the arena plus the top-level sequence.
#[derive(Debug)]
pub struct Assembly {
    pub arena: Arena,
    pub code: Sequence,
}

impl Assembly {
    pub fn seal(&mut self) {
        self.arena.seal(&self.code);
    }

    /// Real instructions in program order.
    pub fn instructions(&self) -> impl Iterator<Item = (Label, &Instruction)> + '_ {
        self.code
            .items()
            .iter()
            .map(move |l| (*l, self.arena.get(*l)))
            .filter(|(_, i)| !i.is_stub())
    }

    pub fn len(&self) -> usize {
        self.instructions().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn render(&self, verbose: bool) -> String {
        let mut out = String::new();
        for &l in self.code.items() {
            let Some(line) = self.arena.render(l) else {
                continue;
            };
            if verbose {
                let _ = writeln!(out, "{}: {line}", self.arena.address(l).unwrap_or(-1));
            } else {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}
