use impc::ast::RelOp;
use impc::machine::Machine;
use impc::{compile_source, Options};

const SAMPLES: [i64; 9] = [-100, -4, -3, -1, 0, 1, 3, 4, 100];

const RELATIONS: [(&str, RelOp); 6] = [
    ("EQ", RelOp::Eq),
    ("NEQ", RelOp::Ne),
    ("LE", RelOp::Lt),
    ("GE", RelOp::Gt),
    ("LEQ", RelOp::Le),
    ("GEQ", RelOp::Ge),
];

fn run_with(options: &Options, src: &str, inputs: &[i64]) -> Vec<i64> {
    let compiled = compile_source(src, options).unwrap_or_else(|e| panic!("compile failed: {e}\n{src}"));
    let machine = Machine::parse(&compiled.render(false)).expect("emitted code does not parse");
    machine
        .run(inputs)
        .unwrap_or_else(|e| panic!("run failed: {e}\n{src}"))
        .outputs
}

fn both(src: &str, inputs: &[i64]) -> Vec<i64> {
    let optimized = run_with(&Options::default(), src, inputs);
    let plain = run_with(&Options::unoptimized(), src, inputs);
    assert_eq!(optimized, plain, "optimizer changed the result of\n{src}\ninputs {inputs:?}");
    optimized
}

fn flag(b: bool) -> Vec<i64> {
    vec![b as i64]
}

#[test]
fn relations_between_variables() {
    for (word, op) in RELATIONS {
        let src = format!("DECLARE a, b BEGIN READ a; READ b; IF a {word} b THEN WRITE 1; ELSE WRITE 0; ENDIF END");
        for a in SAMPLES {
            for b in SAMPLES {
                assert_eq!(both(&src, &[a, b]), flag(op.holds(a, b)), "{a} {word} {b}");
            }
        }
    }
}

#[test]
fn relations_against_literals() {
    for (word, op) in RELATIONS {
        for c in [-1000, -3, 0, 3, 1000] {
            let right = format!("DECLARE a BEGIN READ a; IF a {word} {c} THEN WRITE 1; ELSE WRITE 0; ENDIF END");
            let left = format!("DECLARE a BEGIN READ a; IF {c} {word} a THEN WRITE 1; ELSE WRITE 0; ENDIF END");
            for a in SAMPLES.into_iter().chain([c - 1, c, c + 1]) {
                assert_eq!(both(&right, &[a]), flag(op.holds(a, c)), "{a} {word} {c}");
                assert_eq!(both(&left, &[a]), flag(op.holds(c, a)), "{c} {word} {a}");
            }
        }
    }
}

#[test]
fn relations_on_array_elements() {
    let src = "DECLARE t(0:1), i
BEGIN
    READ t(0);
    READ t(1);
    i ASSIGN 1;
    IF t(0) LEQ t(i) THEN WRITE 1; ENDIF
    IF t(i) EQ t(1) THEN WRITE 2; ENDIF
END";
    assert_eq!(both(src, &[5, 7]), vec![1, 2]);
    assert_eq!(both(src, &[8, 7]), vec![2]);
}

#[test]
fn if_without_else_falls_through() {
    let src = "DECLARE a BEGIN READ a; IF a GE 0 THEN WRITE a; ENDIF WRITE 9; END";
    assert_eq!(both(src, &[4]), vec![4, 9]);
    assert_eq!(both(src, &[-4]), vec![9]);
}

#[test]
fn nested_if_else() {
    let src = "DECLARE a
BEGIN
    READ a;
    IF a LE 0 THEN
        WRITE -1;
    ELSE
        IF a EQ 0 THEN
            WRITE 0;
        ELSE
            IF a GE 10 THEN WRITE 10; ELSE WRITE 1; ENDIF
        ENDIF
    ENDIF
END";
    assert_eq!(both(src, &[-5]), vec![-1]);
    assert_eq!(both(src, &[5]), vec![1]);
    assert_eq!(both(src, &[50]), vec![10]);
}

#[test]
fn while_tests_before_the_body() {
    let src = "DECLARE n, s
BEGIN
    READ n;
    s ASSIGN 0;
    WHILE n GEQ 1 DO
        s ASSIGN s PLUS n;
        n ASSIGN n MINUS 1;
    ENDWHILE
    WRITE s;
END";
    assert_eq!(both(src, &[10]), vec![55]);
    assert_eq!(both(src, &[0]), vec![0]);
    assert_eq!(both(src, &[-3]), vec![0]);
}

#[test]
fn do_while_runs_the_body_first() {
    let src = "DECLARE n
BEGIN
    READ n;
    DO
        WRITE n;
        n ASSIGN n PLUS 1;
    WHILE n LEQ 3 ENDDO
END";
    assert_eq!(both(src, &[1]), vec![1, 2, 3]);
    assert_eq!(both(src, &[7]), vec![7]);
}

#[test]
fn for_counts_up_and_down() {
    let up = "DECLARE a, b BEGIN READ a; READ b; FOR i FROM a TO b DO WRITE i; ENDFOR END";
    let down = "DECLARE a, b BEGIN READ a; READ b; FOR i FROM a DOWNTO b DO WRITE i; ENDFOR END";
    for (a, b) in [(1, 4), (-2, 1), (3, 3), (5, 2), (-1, -4)] {
        let ascending: Vec<i64> = (a..=b).collect();
        let descending: Vec<i64> = (b..=a).rev().collect();
        assert_eq!(both(up, &[a, b]), ascending, "{a} TO {b}");
        assert_eq!(both(down, &[a, b]), descending, "{a} DOWNTO {b}");
    }
}

#[test]
fn for_evaluates_its_bound_once() {
    let src = "DECLARE n
BEGIN
    READ n;
    FOR i FROM 1 TO n DO
        n ASSIGN n PLUS 1;
        WRITE i;
    ENDFOR
    WRITE n;
END";
    assert_eq!(both(src, &[3]), vec![1, 2, 3, 6]);
}

#[test]
fn for_with_array_bounds() {
    let src = "DECLARE t(1:2)
BEGIN
    READ t(1);
    READ t(2);
    FOR i FROM t(1) TO t(2) DO WRITE i; ENDFOR
END";
    assert_eq!(both(src, &[2, 4]), vec![2, 3, 4]);
}

#[test]
fn nested_loops() {
    let src = "DECLARE n, s
BEGIN
    READ n;
    FOR i FROM 1 TO n DO
        FOR j FROM i DOWNTO 1 DO
            s ASSIGN i TIMES j;
            WRITE s;
        ENDFOR
    ENDFOR
END";
    assert_eq!(both(src, &[3]), vec![1, 4, 2, 9, 6, 3]);
}

#[test]
fn loops_inside_while() {
    let src = "DECLARE n, total
BEGIN
    READ n;
    total ASSIGN 0;
    WHILE n GE 0 DO
        FOR k FROM 1 TO n DO
            total ASSIGN total PLUS k;
        ENDFOR
        n ASSIGN n MINUS 1;
    ENDWHILE
    WRITE total;
END";
    // 6 + 3 + 1
    assert_eq!(both(src, &[3]), vec![10]);
}

#[test]
fn sequential_loops_reuse_the_iterator_name() {
    let src = "BEGIN
    FOR i FROM 1 TO 2 DO WRITE i; ENDFOR
    FOR i FROM 5 DOWNTO 4 DO WRITE i; ENDFOR
END";
    assert_eq!(both(src, &[]), vec![1, 2, 5, 4]);
}

#[test]
fn iterator_indexes_arrays() {
    let src = "DECLARE t(3:6), s
BEGIN
    FOR i FROM 3 TO 6 DO t(i) ASSIGN i TIMES i; ENDFOR
    s ASSIGN 0;
    FOR i FROM 6 DOWNTO 3 DO
        s ASSIGN s PLUS t(i);
        WRITE t(i);
    ENDFOR
    WRITE s;
END";
    assert_eq!(both(src, &[]), vec![36, 25, 16, 9, 86]);
}
