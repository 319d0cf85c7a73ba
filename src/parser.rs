use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::error::{CompileError, Result};

#[derive(Parser)]
#[grammar = "impc.pest"]
struct ImpParser;

fn error_at(p: &Pair<Rule>, message: impl Into<String>) -> CompileError {
    let (line, column) = p.line_col();
    CompileError::Parse {
        line,
        column,
        message: message.into(),
    }
}

fn next<'i>(it: &mut Pairs<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>> {
    it.next()
        .ok_or_else(|| CompileError::Unclassifiable(format!("parse tree is missing {what}")))
}

/// Parses a whole source file. Every literal and array bound is also
/// collected into `Program::constants`.
pub fn parse_program(src: &str) -> Result<Program> {
    let mut pairs = ImpParser::parse(Rule::program, src).map_err(|e| {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        CompileError::Parse {
            line,
            column,
            message: e.variant.message().to_string(),
        }
    })?;
    let p = next(&mut pairs, "program")?;
    build_program(p)
}

fn build_program(p: Pair<Rule>) -> Result<Program> {
    let mut program = Program::default();
    for item in p.into_inner() {
        match item.as_rule() {
            Rule::declarations => {
                for d in item.into_inner() {
                    let decl = build_declaration(d, &mut program.constants)?;
                    program.declarations.push(decl);
                }
            }
            Rule::commands => program.commands = build_commands(item, &mut program.constants)?,
            _ => {}
        }
    }
    Ok(program)
}

fn build_number(p: Pair<Rule>, consts: &mut Vec<i64>) -> Result<i64> {
    let n = p
        .as_str()
        .parse::<i64>()
        .map_err(|e| error_at(&p, format!("bad number {}: {e}", p.as_str())))?;
    consts.push(n);
    Ok(n)
}

fn build_declaration(p: Pair<Rule>, consts: &mut Vec<i64>) -> Result<Declaration> {
    let inner = next(&mut p.into_inner(), "declaration")?;
    match inner.as_rule() {
        Rule::pid => Ok(Declaration::Scalar(inner.as_str().to_string())),
        Rule::array_decl | Rule::square_decl => {
            let at = inner.clone();
            let mut it = inner.into_inner();
            let name = next(&mut it, "array name")?.as_str().to_string();
            let start = build_number(next(&mut it, "array start")?, consts)?;
            let end = build_number(next(&mut it, "array end")?, consts)?;
            if start > end {
                return Err(error_at(
                    &at,
                    format!("array {name} is declared with start {start} after end {end}"),
                ));
            }
            Ok(Declaration::Array { name, start, end })
        }
        r => Err(CompileError::Unclassifiable(format!("declaration {r:?}"))),
    }
}

fn build_commands(p: Pair<Rule>, consts: &mut Vec<i64>) -> Result<Vec<Command>> {
    let mut v = vec![];
    for c in p.into_inner() {
        v.push(build_command(c, consts)?);
    }
    Ok(v)
}

fn build_command(p: Pair<Rule>, consts: &mut Vec<i64>) -> Result<Command> {
    let rule = p.as_rule();
    let mut it = p.into_inner();
    match rule {
        Rule::assign => {
            let id = build_identifier(next(&mut it, "assignment target")?, consts)?;
            let e = build_expression(next(&mut it, "expression")?, consts)?;
            Ok(Command::Assign(id, e))
        }
        Rule::if_then => {
            let cond = build_condition(next(&mut it, "condition")?, consts)?;
            let body = build_commands(next(&mut it, "commands")?, consts)?;
            Ok(Command::If(cond, body))
        }
        Rule::if_else => {
            let cond = build_condition(next(&mut it, "condition")?, consts)?;
            let then_body = build_commands(next(&mut it, "commands")?, consts)?;
            let else_body = build_commands(next(&mut it, "commands")?, consts)?;
            Ok(Command::IfElse(cond, then_body, else_body))
        }
        Rule::while_loop => {
            let cond = build_condition(next(&mut it, "condition")?, consts)?;
            let body = build_commands(next(&mut it, "commands")?, consts)?;
            Ok(Command::While {
                cond,
                body,
                do_while: false,
            })
        }
        Rule::do_while => {
            let body = build_commands(next(&mut it, "commands")?, consts)?;
            let cond = build_condition(next(&mut it, "condition")?, consts)?;
            Ok(Command::While {
                cond,
                body,
                do_while: true,
            })
        }
        Rule::for_loop => {
            let var = next(&mut it, "iterator")?.as_str().to_string();
            let from = build_value(next(&mut it, "start")?, consts)?;
            let dir = next(&mut it, "direction")?.as_str().to_string();
            let to = build_value(next(&mut it, "end")?, consts)?;
            let body = build_commands(next(&mut it, "commands")?, consts)?;
            Ok(Command::For {
                var,
                from,
                to,
                downto: dir == "DOWNTO",
                body,
            })
        }
        Rule::read => Ok(Command::Read(build_identifier(next(&mut it, "identifier")?, consts)?)),
        Rule::write => Ok(Command::Write(build_value(next(&mut it, "value")?, consts)?)),
        r => Err(CompileError::Unclassifiable(format!("command {r:?}"))),
    }
}

fn build_expression(p: Pair<Rule>, consts: &mut Vec<i64>) -> Result<Expression> {
    let mut it = p.into_inner();
    let lhs = build_value(next(&mut it, "operand")?, consts)?;
    let Some(op) = it.next() else {
        return Ok(Expression::Unary(lhs));
    };
    let op = match op.as_str() {
        "PLUS" => BinOp::Add,
        "MINUS" => BinOp::Sub,
        "TIMES" => BinOp::Mul,
        "DIV" => BinOp::Div,
        "MOD" => BinOp::Mod,
        other => return Err(error_at(&op, format!("unknown operator {other}"))),
    };
    let rhs = build_value(next(&mut it, "operand")?, consts)?;
    Ok(Expression::Binary(lhs, op, rhs))
}

fn build_condition(p: Pair<Rule>, consts: &mut Vec<i64>) -> Result<Condition> {
    let mut it = p.into_inner();
    let lhs = build_value(next(&mut it, "operand")?, consts)?;
    let op = next(&mut it, "relation")?;
    let op = match op.as_str() {
        "EQ" => RelOp::Eq,
        "NEQ" => RelOp::Ne,
        "LE" => RelOp::Lt,
        "GE" => RelOp::Gt,
        "LEQ" => RelOp::Le,
        "GEQ" => RelOp::Ge,
        other => return Err(error_at(&op, format!("unknown relation {other}"))),
    };
    let rhs = build_value(next(&mut it, "operand")?, consts)?;
    Ok(Condition::new(lhs, op, rhs))
}

fn build_value(p: Pair<Rule>, consts: &mut Vec<i64>) -> Result<Value> {
    let inner = next(&mut p.into_inner(), "value")?;
    match inner.as_rule() {
        Rule::num => Ok(Value::Number(build_number(inner, consts)?)),
        Rule::identifier => Ok(Value::Identifier(build_identifier(inner, consts)?)),
        r => Err(CompileError::Unclassifiable(format!("value {r:?}"))),
    }
}

fn build_identifier(p: Pair<Rule>, consts: &mut Vec<i64>) -> Result<Identifier> {
    let inner = next(&mut p.into_inner(), "identifier")?;
    match inner.as_rule() {
        Rule::pid => Ok(Identifier::Variable(inner.as_str().to_string())),
        Rule::paren_access | Rule::square_access => {
            let mut it = inner.into_inner();
            let name = next(&mut it, "array name")?.as_str().to_string();
            let index = next(&mut it, "index")?;
            match index.as_rule() {
                Rule::num => Ok(Identifier::Access(name, build_number(index, consts)?)),
                _ => Ok(Identifier::VariableAccess(name, index.as_str().to_string())),
            }
        }
        r => Err(CompileError::Unclassifiable(format!("identifier {r:?}"))),
    }
}
