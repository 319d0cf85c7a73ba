use tracing::{debug, warn};

use crate::asm::{Address, Arena, Assembly, Instruction, Label, Sequence};
use crate::ast::*;
use crate::config::{Options, Severity};
use crate::constants::ConstantPool;
use crate::error::{CompileError, Result, Warning};
use crate::variables::{VarKind, Variable, VariableTable};

pub const PRIMARY: i64 = 0;
pub const SECONDARY: i64 = 1;
pub const EXPRESSION: i64 = 2;
pub const FIRST_FREE: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Constant,
    Variable,
    ConstantArray,
    VariableArray,
}

/// Where a value lives once `code` has run. When `indirect` is set,
/// `address` holds the address of the value rather than the value itself.
#[derive(Debug)]
pub struct Resolution {
    pub code: Sequence,
    pub address: Address,
    pub kind: ResolutionKind,
    pub indirect: bool,
    pub temporaries: usize,
    pub writable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

pub struct CodeGen<'o> {
    pub(crate) arena: Arena,
    pub(crate) pool: ConstantPool,
    pub(crate) vars: VariableTable,
    pub(crate) options: &'o Options,
    pub(crate) warnings: Vec<Warning>,
    pub(crate) primary: Address,
    pub(crate) secondary: Address,
    pub(crate) expression: Address,
}

impl<'o> CodeGen<'o> {
    pub fn new(options: &'o Options) -> Self {
        Self {
            arena: Arena::new(),
            pool: ConstantPool::new(options.small_constant, options.reuse_constants),
            vars: VariableTable::new(FIRST_FREE),
            options,
            warnings: vec![],
            primary: Address::new(PRIMARY),
            secondary: Address::new(SECONDARY),
            expression: Address::new(EXPRESSION),
        }
    }

    pub fn variables(&self) -> &VariableTable {
        &self.vars
    }

    /// Builds the whole program: constant initialization, commands, HALT.
    pub fn generate(mut self, program: &Program) -> Result<(Assembly, Vec<Warning>)> {
        for &c in &program.constants {
            self.pool.add_constant(c);
        }
        self.declare(&program.declarations)?;

        let mut body = self.gen_commands(&program.commands)?;
        let halt = self.arena.push(Instruction::Halt);
        body.push(halt);

        self.pool.place(self.vars.high_water());
        let mut code = self
            .pool
            .generate(&mut self.arena, &self.primary, &self.secondary);
        code.append(body);

        let mut assembly = Assembly {
            arena: self.arena,
            code,
        };
        assembly.seal();
        debug!(
            instructions = assembly.len(),
            constants = self.pool.len(),
            "code generated"
        );
        Ok((assembly, self.warnings))
    }

    pub fn declare(&mut self, declarations: &[Declaration]) -> Result<()> {
        for d in declarations {
            let var = match d {
                Declaration::Scalar(name) => Variable::scalar(name),
                Declaration::Array { name, start, end } => Variable::array(name, *start, *end),
            };
            self.vars.push_variable_scope(var)?;
        }
        Ok(())
    }

    fn warn(&mut self, w: Warning) {
        warn!("{w}");
        self.warnings.push(w);
    }

    pub(crate) fn sequence(&mut self) -> Sequence {
        Sequence::new(&mut self.arena)
    }

    pub(crate) fn emit(&mut self, seq: &mut Sequence, instr: Instruction) -> Label {
        let l = self.arena.push(instr);
        seq.push(l);
        l
    }

    /// Places a fresh jump target at the current end of `seq`.
    pub(crate) fn mark(&mut self, seq: &mut Sequence) -> Label {
        let l = self.arena.stub();
        seq.push(l);
        l
    }

    pub(crate) fn constant(&mut self, value: i64) -> Address {
        self.pool.intern(value)
    }

    pub(crate) fn temporary(&mut self) -> Result<Address> {
        self.vars.push_variable_scope(Variable::temporary())
    }

    pub(crate) fn load(&mut self, seq: &mut Sequence, r: &Resolution) {
        let instr = if r.indirect {
            Instruction::Loadi(r.address.clone())
        } else {
            Instruction::Load(r.address.clone())
        };
        self.emit(seq, instr);
    }

    pub(crate) fn store(&mut self, seq: &mut Sequence, r: &Resolution) {
        let instr = if r.indirect {
            Instruction::Storei(r.address.clone())
        } else {
            Instruction::Store(r.address.clone())
        };
        self.emit(seq, instr);
    }

    /// acc <- acc + `by` as a chain of INC or DEC.
    pub(crate) fn step(&mut self, seq: &mut Sequence, by: i64) {
        let instr = if by < 0 { Instruction::Dec } else { Instruction::Inc };
        for _ in 0..by.unsigned_abs() {
            self.emit(seq, instr.clone());
        }
    }

    /// acc <- -acc
    pub(crate) fn negate(&mut self, seq: &mut Sequence) {
        let s = self.secondary.clone();
        self.emit(seq, Instruction::Store(s.clone()));
        self.emit(seq, Instruction::Sub(s.clone()));
        self.emit(seq, Instruction::Sub(s));
    }

    pub(crate) fn is_small(&self, v: i64) -> bool {
        (v.unsigned_abs() as i128) < self.options.small_constant as i128
    }

    /// Runs `f` and releases every variable it pushed, on success or failure.
    pub fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mark = self.vars.len();
        let result = f(self);
        let pushed = self.vars.len().saturating_sub(mark);
        self.vars.pop_variable_scope(pushed);
        result
    }

    // ---------- resolution ----------

    pub fn resolve_value(&mut self, v: &Value) -> Result<Resolution> {
        match v {
            Value::Number(n) => {
                let address = self.constant(*n);
                Ok(Resolution {
                    code: self.sequence(),
                    address,
                    kind: ResolutionKind::Constant,
                    indirect: false,
                    temporaries: 0,
                    writable: false,
                })
            }
            Value::Identifier(id) => self.resolve_identifier(id, Access::Read),
        }
    }

    pub fn resolve_target(&mut self, id: &Identifier) -> Result<Resolution> {
        self.resolve_identifier(id, Access::Write)
    }

    fn touch(&mut self, name: &str, access: Access) -> Result<()> {
        let var = self.vars.resolve_variable(name)?;
        let warn = match access {
            Access::Write => {
                var.initialized = true;
                false
            }
            Access::Read if !var.initialized && !var.warned_uninitialized => {
                var.warned_uninitialized = true;
                true
            }
            Access::Read => false,
        };
        if warn {
            self.warn(Warning::UninitializedRead(name.to_string()));
        }
        Ok(())
    }

    fn resolve_identifier(&mut self, id: &Identifier, access: Access) -> Result<Resolution> {
        match id {
            Identifier::Variable(name) => {
                let var = self.vars.resolve_variable(name)?;
                if let VarKind::Array { .. } = var.kind {
                    return Err(CompileError::NotAScalar(name.clone()));
                }
                let address = var.address.clone();
                let writable = !var.read_only;
                self.touch(name, access)?;
                Ok(Resolution {
                    code: self.sequence(),
                    address,
                    kind: ResolutionKind::Variable,
                    indirect: false,
                    temporaries: 0,
                    writable,
                })
            }
            Identifier::Access(name, index) => {
                let var = self.vars.resolve_variable(name)?;
                let VarKind::Array { start, end } = var.kind else {
                    return Err(CompileError::NotAnArray(name.clone()));
                };
                let offset = index
                    .checked_sub(start)
                    .filter(|&o| var.address.get().checked_add(o).is_some())
                    .ok_or_else(|| CompileError::UnaddressableIndex {
                        name: name.clone(),
                        index: *index,
                    })?;
                let address = var.address.at(offset);
                let report = !(start..=end).contains(index) && !var.warned_bounds;
                if report {
                    if self.options.bounds == Severity::Error {
                        return Err(CompileError::IndexOutOfBounds {
                            name: name.clone(),
                            index: *index,
                            start,
                            end,
                        });
                    }
                    var.warned_bounds = true;
                    self.warn(Warning::IndexOutOfBounds {
                        name: name.clone(),
                        index: *index,
                    });
                }
                self.touch(name, access)?;
                Ok(Resolution {
                    code: self.sequence(),
                    address,
                    kind: ResolutionKind::ConstantArray,
                    indirect: false,
                    temporaries: 0,
                    writable: true,
                })
            }
            Identifier::VariableAccess(name, index) => {
                let var = self.vars.resolve_variable(name)?;
                let VarKind::Array { start, .. } = var.kind else {
                    return Err(CompileError::NotAnArray(name.clone()));
                };
                let base = var.address.get();
                let idx = self.resolve_identifier(&Identifier::Variable(index.clone()), Access::Read)?;
                self.touch(name, access)?;

                let mut code = self.sequence();
                let temp = self.temporary()?;
                self.load(&mut code, &idx);
                match base.checked_sub(start) {
                    Some(shift) if self.is_small(shift) => self.step(&mut code, shift),
                    Some(shift) => {
                        let c = self.constant(shift);
                        self.emit(&mut code, Instruction::Add(c));
                    }
                    // index - start stays in range for every valid index
                    None => {
                        let s = self.constant(start);
                        self.emit(&mut code, Instruction::Sub(s));
                        let b = self.constant(base);
                        self.emit(&mut code, Instruction::Add(b));
                    }
                }
                self.emit(&mut code, Instruction::Store(temp.clone()));
                Ok(Resolution {
                    code,
                    address: temp,
                    kind: ResolutionKind::VariableArray,
                    indirect: true,
                    temporaries: 1,
                    writable: true,
                })
            }
        }
    }

    // ---------- expressions ----------

    /// Code leaving the expression's value readable through the returned
    /// resolution. Binary results are left in the expression accumulator.
    pub fn gen_expression(&mut self, e: &Expression) -> Result<Resolution> {
        let (lhs, op, rhs) = match e {
            Expression::Unary(v) => return self.resolve_value(v),
            Expression::Binary(l, op, r) => (l, *op, r),
        };
        let (code, temporaries) = match op {
            BinOp::Add | BinOp::Sub => self.gen_additive(lhs, op, rhs)?,
            BinOp::Mul => self.gen_multiply(lhs, rhs)?,
            BinOp::Div | BinOp::Mod => self.gen_divide(lhs, rhs, op == BinOp::Mod)?,
        };
        Ok(Resolution {
            code,
            address: self.expression.clone(),
            kind: ResolutionKind::Variable,
            indirect: false,
            temporaries,
            writable: false,
        })
    }

    fn gen_additive(&mut self, lhs: &Value, op: BinOp, rhs: &Value) -> Result<(Sequence, usize)> {
        let sign = if op == BinOp::Sub { -1 } else { 1 };
        let small_rhs = rhs.as_number().filter(|v| self.is_small(*v));
        let small_lhs = lhs.as_number().filter(|v| self.is_small(*v) && op == BinOp::Add);

        let mut seq = self.sequence();
        let temporaries;
        if let Some(c) = small_rhs {
            let l = self.resolve_value(lhs)?;
            temporaries = l.temporaries;
            seq.append(l.code.clone());
            self.load(&mut seq, &l);
            self.step(&mut seq, sign * c);
        } else if let Some(c) = small_lhs {
            let r = self.resolve_value(rhs)?;
            temporaries = r.temporaries;
            seq.append(r.code.clone());
            self.load(&mut seq, &r);
            self.step(&mut seq, c);
        } else {
            let l = self.resolve_value(lhs)?;
            let r = self.resolve_value(rhs)?;
            temporaries = l.temporaries + r.temporaries;
            seq.append(l.code.clone());
            seq.append(r.code.clone());
            let operand = self.stage(&mut seq, &r);
            self.load(&mut seq, &l);
            let instr = if op == BinOp::Sub {
                Instruction::Sub(operand)
            } else {
                Instruction::Add(operand)
            };
            self.emit(&mut seq, instr);
        }
        let e = self.expression.clone();
        self.emit(&mut seq, Instruction::Store(e));
        Ok((seq, temporaries))
    }

    /// A direct address holding `r`'s value; indirect values are copied
    /// into the expression accumulator first.
    pub(crate) fn stage(&mut self, seq: &mut Sequence, r: &Resolution) -> Address {
        if !r.indirect {
            return r.address.clone();
        }
        let e = self.expression.clone();
        self.emit(seq, Instruction::Loadi(r.address.clone()));
        self.emit(seq, Instruction::Store(e.clone()));
        e
    }

    // ---------- conditions ----------

    /// Wraps `block` so that it runs only when `cond` holds.
    pub fn gen_condition(&mut self, cond: &Condition, block: Sequence) -> Result<Sequence> {
        let (lhs, op, rhs) = match (cond.lhs.as_number(), cond.rhs.as_number()) {
            (Some(c), None) if self.is_small(c) => (&cond.rhs, cond.op.flip(), &cond.lhs),
            _ => (&cond.lhs, cond.op, &cond.rhs),
        };

        let mut seq = self.sequence();
        match rhs.as_number().filter(|v| self.is_small(*v)) {
            Some(c) => {
                let l = self.resolve_value(lhs)?;
                seq.append(l.code.clone());
                self.load(&mut seq, &l);
                self.step(&mut seq, -c);
            }
            None => {
                let l = self.resolve_value(lhs)?;
                let r = self.resolve_value(rhs)?;
                seq.append(l.code.clone());
                seq.append(r.code.clone());
                let operand = self.stage(&mut seq, &r);
                self.load(&mut seq, &l);
                self.emit(&mut seq, Instruction::Sub(operand));
            }
        }

        let end = block.end();
        match op {
            RelOp::Eq => {
                let entry = self.arena.stub();
                self.emit(&mut seq, Instruction::Jzero(entry));
                self.emit(&mut seq, Instruction::Jump(end));
                seq.push(entry);
            }
            RelOp::Ne => {
                self.emit(&mut seq, Instruction::Jzero(end));
            }
            RelOp::Lt => {
                self.emit(&mut seq, Instruction::Jzero(end));
                self.emit(&mut seq, Instruction::Jpos(end));
            }
            RelOp::Gt => {
                self.emit(&mut seq, Instruction::Jzero(end));
                self.emit(&mut seq, Instruction::Jneg(end));
            }
            RelOp::Le => {
                self.emit(&mut seq, Instruction::Jpos(end));
            }
            RelOp::Ge => {
                self.emit(&mut seq, Instruction::Jneg(end));
            }
        }
        seq.append(block);
        Ok(seq)
    }

    // ---------- commands ----------

    pub fn gen_commands(&mut self, cmds: &[Command]) -> Result<Sequence> {
        let mut seq = self.sequence();
        for c in cmds {
            let part = self.gen_statement(c)?;
            seq.append(part);
        }
        Ok(seq)
    }

    /// One command; every variable it pushes is released before returning.
    pub fn gen_statement(&mut self, cmd: &Command) -> Result<Sequence> {
        self.scoped(|g| g.gen_command(cmd))
    }

    fn gen_command(&mut self, cmd: &Command) -> Result<Sequence> {
        match cmd {
            Command::Read(id) => {
                let target = self.resolve_target(id)?;
                if !target.writable {
                    return Err(CompileError::ReadOnly(id.name().to_string()));
                }
                let mut seq = target.code.clone();
                self.emit(&mut seq, Instruction::Get);
                self.store(&mut seq, &target);
                Ok(seq)
            }
            Command::Write(v) => {
                let value = self.resolve_value(v)?;
                let mut seq = value.code.clone();
                self.load(&mut seq, &value);
                self.emit(&mut seq, Instruction::Put);
                Ok(seq)
            }
            Command::Assign(id, e) => {
                let value = self.gen_expression(e)?;
                let target = self.resolve_target(id)?;
                if !target.writable {
                    return Err(CompileError::ReadOnly(id.name().to_string()));
                }
                let mut seq = target.code.clone();
                seq.append(value.code.clone());
                self.load(&mut seq, &value);
                self.store(&mut seq, &target);
                Ok(seq)
            }
            Command::If(cond, body) => {
                let block = self.gen_commands(body)?;
                self.gen_condition(cond, block)
            }
            Command::IfElse(cond, then_body, else_body) => {
                let mut then_block = self.gen_commands(then_body)?;
                let else_block = self.gen_commands(else_body)?;
                self.emit(&mut then_block, Instruction::Jump(else_block.end()));
                let mut seq = self.gen_condition(cond, then_block)?;
                seq.append(else_block);
                Ok(seq)
            }
            Command::While {
                cond,
                body,
                do_while: false,
            } => {
                let mut seq = self.sequence();
                let guard = self.mark(&mut seq);
                let mut block = self.gen_commands(body)?;
                self.emit(&mut block, Instruction::Jump(guard));
                let guarded = self.gen_condition(cond, block)?;
                seq.append(guarded);
                Ok(seq)
            }
            Command::While {
                cond,
                body,
                do_while: true,
            } => {
                let mut seq = self.sequence();
                let start = self.mark(&mut seq);
                let block = self.gen_commands(body)?;
                seq.append(block);
                let mut back = self.sequence();
                self.emit(&mut back, Instruction::Jump(start));
                let guarded = self.gen_condition(cond, back)?;
                seq.append(guarded);
                Ok(seq)
            }
            Command::For {
                var,
                from,
                to,
                downto,
                body,
            } => self.gen_for(var, from, to, *downto, body),
        }
    }

    fn gen_for(&mut self, var: &str, from: &Value, to: &Value, downto: bool, body: &[Command]) -> Result<Sequence> {
        let start = self.resolve_value(from)?;
        let end = self.resolve_value(to)?;
        let mut seq = start.code.clone();
        seq.append(end.code.clone());

        // the bound is evaluated once, on entry
        let bound = if end.kind == ResolutionKind::Constant {
            end.address.clone()
        } else {
            let t = self.temporary()?;
            self.load(&mut seq, &end);
            self.emit(&mut seq, Instruction::Store(t.clone()));
            t
        };

        let it = self.vars.push_variable_scope(Variable::iterator(var))?;
        self.load(&mut seq, &start);
        self.emit(&mut seq, Instruction::Store(it.clone()));

        let test = self.mark(&mut seq);
        let exit = self.arena.stub();
        self.emit(&mut seq, Instruction::Load(it.clone()));
        self.emit(&mut seq, Instruction::Sub(bound));
        let leave = if downto {
            Instruction::Jneg(exit)
        } else {
            Instruction::Jpos(exit)
        };
        self.emit(&mut seq, leave);

        let block = self.gen_commands(body)?;
        seq.append(block);
        self.emit(&mut seq, Instruction::Load(it.clone()));
        self.emit(&mut seq, if downto { Instruction::Dec } else { Instruction::Inc });
        self.emit(&mut seq, Instruction::Store(it));
        self.emit(&mut seq, Instruction::Jump(test));
        seq.push(exit);
        Ok(seq)
    }
}
