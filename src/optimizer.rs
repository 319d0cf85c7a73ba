use std::collections::HashSet;

use tracing::{debug, warn};

use crate::ast::*;
use crate::config::Options;
use crate::error::Warning;

/// Walks `cmds` and every nested body, offering each command to `replace`.
/// A returned list takes the command's place (an empty list removes it).
/// Reports whether anything was replaced.
pub fn traverse(cmds: &mut Vec<Command>, replace: &mut dyn FnMut(&Command) -> Option<Vec<Command>>) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < cmds.len() {
        if let Some(new) = replace(&cmds[i]) {
            let n = new.len();
            cmds.splice(i..=i, new);
            i += n;
            changed = true;
            continue;
        }
        changed |= match &mut cmds[i] {
            Command::If(_, body) | Command::While { body, .. } | Command::For { body, .. } => traverse(body, replace),
            Command::IfElse(_, then_body, else_body) => {
                let a = traverse(then_body, replace);
                let b = traverse(else_body, replace);
                a || b
            }
            _ => false,
        };
        i += 1;
    }
    changed
}

fn fixed_point(name: &str, cmds: &mut Vec<Command>, replace: &mut dyn FnMut(&Command) -> Option<Vec<Command>>) -> bool {
    let mut rounds = 0;
    while traverse(cmds, replace) {
        rounds += 1;
    }
    debug!(pass = name, rounds, "optimizer pass finished");
    rounds > 0
}

/// Rewrites the program in place. Literals introduced by unrolling are
/// added to `program.constants`.
pub fn optimize(program: &mut Program, options: &Options) {
    let limit = options.unroll_limit;
    let colliding = colliding_iterators(program);
    loop {
        let mut changed = fixed_point("branches", &mut program.commands, &mut eliminate_branch);

        let mut introduced = vec![];
        changed |= fixed_point("unroll", &mut program.commands, &mut |c: &Command| {
            unroll(c, limit, &colliding, &mut introduced)
        });
        program.constants.extend(introduced);

        changed |= fixed_point("fold", &mut program.commands, &mut fold);
        if !changed {
            break;
        }
    }
}

/// Statically known outcome of `cond`: both sides literal, or both the same
/// identifier.
pub fn decide(cond: &Condition) -> Option<bool> {
    match (cond.lhs.as_number(), cond.rhs.as_number()) {
        (Some(a), Some(b)) => Some(cond.op.holds(a, b)),
        (None, None) if cond.lhs == cond.rhs => Some(cond.op.reflexive()),
        _ => None,
    }
}

fn eliminate_branch(cmd: &Command) -> Option<Vec<Command>> {
    match cmd {
        Command::If(cond, body) => decide(cond).map(|taken| if taken { body.clone() } else { vec![] }),
        Command::IfElse(cond, then_body, else_body) => {
            decide(cond).map(|taken| if taken { then_body.clone() } else { else_body.clone() })
        }
        Command::While {
            cond,
            body,
            do_while,
        } => match decide(cond) {
            // the body of a post-test loop still runs once
            Some(false) if *do_while => Some(body.clone()),
            Some(false) => Some(vec![]),
            _ => None,
        },
        _ => None,
    }
}

struct Substitute<'a> {
    var: &'a str,
    value: i64,
}

impl Replacer for Substitute<'_> {
    fn value(&self, v: &Value) -> Option<Value> {
        match v {
            Value::Identifier(Identifier::Variable(n)) if n == self.var => Some(Value::Number(self.value)),
            _ => None,
        }
    }

    fn identifier(&self, id: &Identifier) -> Option<Identifier> {
        match id {
            Identifier::VariableAccess(a, n) if n == self.var => Some(Identifier::Access(a.clone(), self.value)),
            _ => None,
        }
    }
}

/// Iterator names that clash with a declaration or an enclosing loop of the
/// same name. Such loops must reach code generation to be rejected there.
fn colliding_iterators(program: &Program) -> HashSet<String> {
    let mut names: HashSet<String> = program
        .declarations
        .iter()
        .map(|d| match d {
            Declaration::Scalar(n) | Declaration::Array { name: n, .. } => n.clone(),
        })
        .collect();
    let mut found = HashSet::new();
    collect_collisions(&program.commands, &mut names, &mut found);
    found
}

fn collect_collisions(cmds: &[Command], scope: &mut HashSet<String>, found: &mut HashSet<String>) {
    for c in cmds {
        match c {
            Command::For { var, body, .. } => {
                if scope.insert(var.clone()) {
                    collect_collisions(body, scope, found);
                    scope.remove(var);
                } else {
                    found.insert(var.clone());
                    collect_collisions(body, scope, found);
                }
            }
            Command::If(_, body) | Command::While { body, .. } => collect_collisions(body, scope, found),
            Command::IfElse(_, a, b) => {
                collect_collisions(a, scope, found);
                collect_collisions(b, scope, found);
            }
            _ => {}
        }
    }
}

/// True when `cmds` assign `var` or open a loop that rebinds it.
fn writes(cmds: &[Command], var: &str) -> bool {
    cmds.iter().any(|c| match c {
        Command::Assign(Identifier::Variable(n), _) | Command::Read(Identifier::Variable(n)) => n == var,
        Command::For { var: n, .. } if n == var => true,
        Command::If(_, body) | Command::While { body, .. } | Command::For { body, .. } => writes(body, var),
        Command::IfElse(_, a, b) => writes(a, var) || writes(b, var),
        _ => false,
    })
}

fn unroll(cmd: &Command, limit: u64, colliding: &HashSet<String>, introduced: &mut Vec<i64>) -> Option<Vec<Command>> {
    let Command::For {
        var,
        from: Value::Number(lo),
        to: Value::Number(hi),
        downto,
        body,
    } = cmd
    else {
        return None;
    };
    let (lo, hi) = (*lo as i128, *hi as i128);
    let span = if *downto { lo - hi } else { hi - lo };
    let count = (span + 1).max(0);
    if count as u128 > limit as u128 || colliding.contains(var) || writes(body, var) {
        return None;
    }
    let values: Vec<i64> = if *downto {
        (hi..=lo).rev().map(|v| v as i64).collect()
    } else {
        (lo..=hi).map(|v| v as i64).collect()
    };
    debug!(var = %var, iterations = values.len(), "unrolling loop");
    let mut flat = Vec::with_capacity(values.len() * body.len());
    for v in values {
        introduced.push(v);
        flat.extend(copy_commands(body, &Substitute { var, value: v }));
    }
    Some(flat)
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// `a op b` as the generated code computes it, or `None` when it must be
/// left to run time (division by zero, overflow).
pub fn evaluate(a: i64, op: BinOp, b: i64) -> Option<i64> {
    match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => floor_div(a, b),
        BinOp::Mod => {
            let q = floor_div(a, b)?;
            a.checked_sub(q.checked_mul(b)?)
        }
    }
}

fn fold(cmd: &Command) -> Option<Vec<Command>> {
    let Command::Assign(id, Expression::Binary(Value::Number(a), op, Value::Number(b))) = cmd else {
        return None;
    };
    let v = evaluate(*a, *op, *b)?;
    Some(vec![Command::Assign(id.clone(), Expression::Unary(Value::Number(v)))])
}

/// One warning per `WHILE` whose condition always holds.
pub fn infinite_loops(cmds: &[Command]) -> Vec<Warning> {
    let mut found = vec![];
    scan_loops(cmds, &mut found);
    found
}

fn scan_loops(cmds: &[Command], found: &mut Vec<Warning>) {
    for c in cmds {
        match c {
            Command::While { cond, body, .. } => {
                if decide(cond) == Some(true) {
                    let w = Warning::InfiniteLoop(cond.to_string());
                    warn!("{w}");
                    found.push(w);
                }
                scan_loops(body, found);
            }
            Command::If(_, body) | Command::For { body, .. } => scan_loops(body, found),
            Command::IfElse(_, a, b) => {
                scan_loops(a, found);
                scan_loops(b, found);
            }
            _ => {}
        }
    }
}
