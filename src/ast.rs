use std::fmt;

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub declarations: Vec<Declaration>,
    pub commands: Vec<Command>,
    // every literal and array bound seen by the front end
    pub constants: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Scalar(String),
    Array { name: String, start: i64, end: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    Variable(String),
    Access(String, i64),          // a(3)
    VariableAccess(String, String), // a(b)
}

impl Identifier {
    pub fn name(&self) -> &str {
        match self {
            Identifier::Variable(n) | Identifier::Access(n, _) | Identifier::VariableAccess(n, _) => n,
        }
    }

    pub fn copy_with<R: Replacer + ?Sized>(&self, r: &R) -> Identifier {
        r.identifier(self).unwrap_or_else(|| self.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Number(i64),
    Identifier(Identifier),
}

impl Value {
    pub fn var(name: &str) -> Value {
        Value::Identifier(Identifier::Variable(name.to_string()))
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Identifier(_) => None,
        }
    }

    pub fn copy_with<R: Replacer + ?Sized>(&self, r: &R) -> Value {
        if let Some(v) = r.value(self) {
            return v;
        }
        match self {
            Value::Number(n) => Value::Number(*n),
            Value::Identifier(id) => Value::Identifier(id.copy_with(r)),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Variable(n) => write!(f, "{n}"),
            Identifier::Access(n, i) => write!(f, "{n}({i})"),
            Identifier::VariableAccess(n, i) => write!(f, "{n}({i})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Identifier(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Unary(Value),
    Binary(Value, BinOp, Value),
}

impl Expression {
    pub fn copy_with<R: Replacer + ?Sized>(&self, r: &R) -> Expression {
        match self {
            Expression::Unary(v) => Expression::Unary(v.copy_with(r)),
            Expression::Binary(a, op, b) => Expression::Binary(a.copy_with(r), *op, b.copy_with(r)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl RelOp {
    /// The operator that holds for `rhs OP lhs` whenever `self` holds for `lhs OP rhs`.
    pub fn flip(self) -> RelOp {
        match self {
            RelOp::Eq => RelOp::Eq,
            RelOp::Ne => RelOp::Ne,
            RelOp::Lt => RelOp::Gt,
            RelOp::Gt => RelOp::Lt,
            RelOp::Le => RelOp::Ge,
            RelOp::Ge => RelOp::Le,
        }
    }

    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            RelOp::Eq => lhs == rhs,
            RelOp::Ne => lhs != rhs,
            RelOp::Lt => lhs < rhs,
            RelOp::Gt => lhs > rhs,
            RelOp::Le => lhs <= rhs,
            RelOp::Ge => lhs >= rhs,
        }
    }

    /// Whether `x OP x` holds.
    pub fn reflexive(self) -> bool {
        matches!(self, RelOp::Eq | RelOp::Le | RelOp::Ge)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub lhs: Value,
    pub op: RelOp,
    pub rhs: Value,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            RelOp::Eq => "EQ",
            RelOp::Ne => "NEQ",
            RelOp::Lt => "LE",
            RelOp::Gt => "GE",
            RelOp::Le => "LEQ",
            RelOp::Ge => "GEQ",
        };
        write!(f, "{} {op} {}", self.lhs, self.rhs)
    }
}

impl Condition {
    pub fn new(lhs: Value, op: RelOp, rhs: Value) -> Self {
        Self { lhs, op, rhs }
    }

    pub fn copy_with<R: Replacer + ?Sized>(&self, r: &R) -> Condition {
        Condition {
            lhs: self.lhs.copy_with(r),
            op: self.op,
            rhs: self.rhs.copy_with(r),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Assign(Identifier, Expression),
    If(Condition, Vec<Command>),
    IfElse(Condition, Vec<Command>, Vec<Command>),
    While {
        cond: Condition,
        body: Vec<Command>,
        do_while: bool,
    },
    For {
        var: String,
        from: Value,
        to: Value,
        downto: bool,
        body: Vec<Command>,
    },
    Read(Identifier),
    Write(Value),
}

impl Command {
    pub fn copy_with<R: Replacer + ?Sized>(&self, r: &R) -> Command {
        match self {
            Command::Assign(id, e) => Command::Assign(id.copy_with(r), e.copy_with(r)),
            Command::If(c, body) => Command::If(c.copy_with(r), copy_commands(body, r)),
            Command::IfElse(c, then_b, else_b) => {
                Command::IfElse(c.copy_with(r), copy_commands(then_b, r), copy_commands(else_b, r))
            }
            Command::While { cond, body, do_while } => Command::While {
                cond: cond.copy_with(r),
                body: copy_commands(body, r),
                do_while: *do_while,
            },
            Command::For {
                var,
                from,
                to,
                downto,
                body,
            } => Command::For {
                var: var.clone(),
                from: from.copy_with(r),
                to: to.copy_with(r),
                downto: *downto,
                body: copy_commands(body, r),
            },
            Command::Read(id) => Command::Read(id.copy_with(r)),
            Command::Write(v) => Command::Write(v.copy_with(r)),
        }
    }
}

pub fn copy_commands<R: Replacer + ?Sized>(cmds: &[Command], r: &R) -> Vec<Command> {
    cmds.iter().map(|c| c.copy_with(r)).collect()
}

/// Hook consulted by `copy_with` at every value and identifier of a subtree.
/// Returning `Some` substitutes the node; `None` keeps copying structurally.
pub trait Replacer {
    fn value(&self, _v: &Value) -> Option<Value> {
        None
    }

    fn identifier(&self, _id: &Identifier) -> Option<Identifier> {
        None
    }
}
