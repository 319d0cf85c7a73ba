use std::process::{Command, Stdio};

use impc::ast::{Declaration, Identifier};
use impc::machine::Machine;
use impc::parser::parse_program;
use impc::CompileError;

fn run_compiler(args: &[&str], src: &str) -> String {
    let mut child = Command::new(env!("CARGO_BIN_EXE_impc"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn impc");

    {
        use std::io::Write;
        let stdin = child.stdin.as_mut().expect("stdin not available");
        stdin
            .write_all(src.as_bytes())
            .expect("failed to write source to stdin");
    }

    let out = child.wait_with_output().expect("failed to wait on child");
    assert!(
        out.status.success(),
        "compiler failed.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).expect("stdout is not valid utf-8")
}

fn run_fixture(args: &[&str], input: i64) -> Vec<i64> {
    let src = include_str!("fixtures/all_syntax.imp");
    let code = run_compiler(args, src);
    Machine::parse(&code)
        .expect("emitted code does not parse")
        .run(&[input])
        .expect("program did not halt")
        .outputs
}

#[test]
fn compiles_all_syntax_fixture() {
    let five = vec![6, -7, 25, 3, 4, -20, 3, 1, -1, 11];
    let nine = vec![10, -3, 81, 11, 4, -20, 3, 1, 2, -1, 11];
    assert_eq!(run_fixture(&[], 5), five);
    assert_eq!(run_fixture(&[], 9), nine);
    assert_eq!(run_fixture(&["--no-optimize"], 5), five);
    assert_eq!(run_fixture(&["--no-optimize"], 9), nine);
}

#[test]
fn fixture_uses_only_machine_instructions() {
    let code = run_compiler(&[], include_str!("fixtures/all_syntax.imp"));
    let known = [
        "GET", "PUT", "LOAD", "STORE", "LOADI", "STOREI", "ADD", "SUB", "SHIFT", "INC", "DEC", "JUMP", "JPOS", "JZERO",
        "JNEG", "HALT",
    ];
    for line in code.lines() {
        let mnemonic = line.split_whitespace().next().unwrap_or_default();
        assert!(known.contains(&mnemonic), "unexpected line {line:?}");
    }
    assert_eq!(code.matches("HALT").count(), 1);
}

#[test]
fn square_and_round_brackets_are_the_same() {
    let round = parse_program("DECLARE t(1:3), i BEGIN t(i) ASSIGN t(2); END").unwrap();
    let square = parse_program("DECLARE t[1:3], i BEGIN t[i] ASSIGN t[ 2 ]; END").unwrap();
    assert_eq!(round.declarations, square.declarations);
    assert_eq!(round.commands, square.commands);
    assert_eq!(
        round.declarations[0],
        Declaration::Array {
            name: "t".to_string(),
            start: 1,
            end: 3
        }
    );
}

#[test]
fn detached_brackets_are_comments() {
    let commented = parse_program("DECLARE a [ t(1:3) ] BEGIN [ a ASSIGN 2; ] a ASSIGN 1; [x] END").unwrap();
    let plain = parse_program("DECLARE a BEGIN a ASSIGN 1; END").unwrap();
    assert_eq!(commented.declarations, plain.declarations);
    assert_eq!(commented.commands, plain.commands);
}

#[test]
fn identifiers_and_indices() {
    let program = parse_program("DECLARE t(-5:5), x_y BEGIN READ t(-5); READ t(x_y); READ x_y; END").unwrap();
    let targets: Vec<Identifier> = program
        .commands
        .iter()
        .map(|c| match c {
            impc::ast::Command::Read(id) => id.clone(),
            other => panic!("unexpected command {other:?}"),
        })
        .collect();
    assert_eq!(
        targets,
        vec![
            Identifier::Access("t".to_string(), -5),
            Identifier::VariableAccess("t".to_string(), "x_y".to_string()),
            Identifier::Variable("x_y".to_string()),
        ]
    );
}

#[test]
fn literals_and_bounds_are_collected() {
    let program = parse_program("DECLARE t(2:9), a BEGIN a ASSIGN 1000 TIMES a; IF a GE -4 THEN WRITE 7; ENDIF END")
        .unwrap();
    for v in [2, 9, 1000, -4, 7] {
        assert!(program.constants.contains(&v), "{v} missing from {:?}", program.constants);
    }
}

#[test]
fn malformed_programs_are_parse_errors() {
    for src in [
        "DECLARE a BEGIN a ASSIGN 1 END",
        "DECLARE a BEGIN END",
        "declare a begin a ASSIGN 1; end",
        "DECLARE A BEGIN A ASSIGN 1; END",
        "DECLARE a BEGIN a ASSIGN 1 PLUS 2 PLUS 3; END",
        "DECLARE a BEGIN IF a EQ 1 THEN WRITE a; END",
        "DECLARE t(3:1) BEGIN WRITE 1; END",
        "DECLARE a BEGIN WRITE 99999999999999999999; END",
    ] {
        assert!(
            matches!(parse_program(src), Err(CompileError::Parse { .. })),
            "accepted {src:?}"
        );
    }
}

#[test]
fn parse_errors_carry_a_position() {
    let Err(CompileError::Parse { line, column, .. }) = parse_program("DECLARE a\nBEGIN\n    READ 5;\nEND") else {
        panic!("expected a parse error");
    };
    assert_eq!((line, column), (3, 10));
}
