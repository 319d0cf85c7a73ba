use tracing::trace;

use crate::asm::Address;
use crate::error::{CompileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Scalar,
    Array { start: i64, end: i64 },
    Temporary,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub address: Address,
    pub read_only: bool,
    pub initialized: bool,
    // each diagnostic is reported once per variable
    pub warned_uninitialized: bool,
    pub warned_bounds: bool,
}

impl Variable {
    fn new(name: &str, kind: VarKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            address: Address::new(0),
            read_only: false,
            initialized: false,
            warned_uninitialized: false,
            warned_bounds: false,
        }
    }

    pub fn scalar(name: &str) -> Self {
        Self::new(name, VarKind::Scalar)
    }

    pub fn array(name: &str, start: i64, end: i64) -> Self {
        Self::new(name, VarKind::Array { start, end })
    }

    /// A `for` loop counter: written only by the loop itself.
    pub fn iterator(name: &str) -> Self {
        Self {
            read_only: true,
            initialized: true,
            ..Self::new(name, VarKind::Scalar)
        }
    }

    pub fn temporary() -> Self {
        Self {
            initialized: true,
            ..Self::new("", VarKind::Temporary)
        }
    }

    /// Cells occupied, or `None` when the count does not fit an `i64`.
    pub fn size(&self) -> Option<i64> {
        match self.kind {
            VarKind::Array { start, end } => end.checked_sub(start)?.checked_add(1),
            VarKind::Scalar | VarKind::Temporary => Some(1),
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.kind == VarKind::Temporary
    }
}

/// Arrays may not reach past this cell; the rest of the address space
/// holds scalars, temporaries and the constant region.
pub const MEMORY_LIMIT: i64 = 1 << 62;

/// Stack allocator for variable cells. Popping retreats the cursor, so the
/// cells of a finished construct are handed out again to the next one.
#[derive(Debug)]
pub struct VariableTable {
    vars: Vec<Variable>,
    cursor: i64,
    high_water: i64,
}

impl VariableTable {
    pub fn new(first_free: i64) -> Self {
        Self {
            vars: vec![],
            cursor: first_free,
            high_water: first_free,
        }
    }

    pub fn push_variable_scope(&mut self, mut var: Variable) -> Result<Address> {
        if !var.is_temporary() && self.vars.iter().any(|v| v.name == var.name) {
            return Err(CompileError::Redeclaration(var.name));
        }
        let next = match var.kind {
            VarKind::Array { start, end } => var
                .size()
                .filter(|&n| n > 0)
                .and_then(|n| self.cursor.checked_add(n))
                .filter(|&next| next <= MEMORY_LIMIT)
                .ok_or_else(|| CompileError::InvalidArray {
                    name: var.name.clone(),
                    start,
                    end,
                })?,
            VarKind::Scalar | VarKind::Temporary => self
                .cursor
                .checked_add(1)
                .ok_or_else(|| CompileError::Unclassifiable("variable cells exhausted".to_string()))?,
        };
        var.address = Address::new(self.cursor);
        trace!(name = %var.name, address = self.cursor, size = next - self.cursor, "push variable");
        self.cursor = next;
        self.high_water = self.high_water.max(self.cursor);
        let address = var.address.clone();
        self.vars.push(var);
        Ok(address)
    }

    pub fn pop_variable_scope(&mut self, n: usize) {
        for _ in 0..n {
            let Some(var) = self.vars.pop() else {
                break;
            };
            trace!(name = %var.name, "pop variable");
            self.cursor = var.address.get();
        }
    }

    /// Most recently pushed variable called `name`.
    pub fn resolve_variable(&mut self, name: &str) -> Result<&mut Variable> {
        self.vars
            .iter_mut()
            .rev()
            .find(|v| !v.is_temporary() && v.name == name)
            .ok_or_else(|| CompileError::UndeclaredVariable(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// First cell no variable has ever occupied.
    pub fn high_water(&self) -> i64 {
        self.high_water
    }
}
