use impc::asm::{Address, Arena, Assembly, Instruction, Label, Sequence};
use impc::codegen::{CodeGen, FIRST_FREE};
use impc::machine::{Machine, Run};
use impc::parser::parse_program;
use impc::{peephole, Options};

struct Builder {
    arena: Arena,
    code: Sequence,
}

impl Builder {
    fn new() -> Self {
        let mut arena = Arena::new();
        let code = Sequence::new(&mut arena);
        Self { arena, code }
    }

    fn emit(&mut self, instr: Instruction) -> Label {
        let l = self.arena.push(instr);
        self.code.push(l);
        l
    }

    fn place(&mut self, stub: Label) {
        self.code.push(stub);
    }

    fn finish(self) -> Assembly {
        let mut assembly = Assembly {
            arena: self.arena,
            code: self.code,
        };
        assembly.seal();
        assembly
    }
}

fn execute(assembly: &Assembly, inputs: &[i64]) -> Run {
    Machine::parse(&assembly.render(false))
        .expect("rendered code does not parse")
        .run(inputs)
        .expect("program did not halt")
}

#[test]
fn jump_past_a_dropped_load_still_lands_on_its_target() {
    let mut b = Builder::new();
    let cell = Address::new(5);
    b.emit(Instruction::Get);
    b.emit(Instruction::Store(cell.clone()));
    b.emit(Instruction::Load(cell));
    let top = b.arena.stub();
    b.place(top);
    b.emit(Instruction::Put);
    b.emit(Instruction::Dec);
    b.emit(Instruction::Jpos(top));
    b.emit(Instruction::Halt);
    let mut assembly = b.finish();
    let before = execute(&assembly, &[3]);

    assert_eq!(peephole::optimize(&mut assembly).unwrap(), 1);
    assert_eq!(assembly.render(false), "GET\nSTORE 5\nPUT\nDEC\nJPOS 2\nHALT\n");
    let after = execute(&assembly, &[3]);
    assert_eq!(before.outputs, vec![3, 2, 1]);
    assert_eq!(after.outputs, before.outputs);
}

#[test]
fn load_with_a_jump_landing_on_it_is_kept() {
    let mut b = Builder::new();
    let cell = Address::new(5);
    b.emit(Instruction::Get);
    b.emit(Instruction::Store(cell.clone()));
    let top = b.arena.stub();
    b.place(top);
    b.emit(Instruction::Load(cell.clone()));
    b.emit(Instruction::Put);
    b.emit(Instruction::Dec);
    b.emit(Instruction::Store(cell));
    b.emit(Instruction::Jpos(top));
    b.emit(Instruction::Halt);
    let mut assembly = b.finish();
    let text = assembly.render(false);

    assert_eq!(peephole::optimize(&mut assembly).unwrap(), 0);
    assert_eq!(assembly.render(false), text);
    assert_eq!(execute(&assembly, &[3]).outputs, vec![3, 2, 1]);
}

#[test]
fn store_then_indirect_load_goes_through_the_accumulator() {
    let mut b = Builder::new();
    let seven = Address::new(7);
    let pointer = Address::new(20);
    b.emit(Instruction::Sub(Address::new(0)));
    for _ in 0..9 {
        b.emit(Instruction::Inc);
    }
    b.emit(Instruction::Store(seven));
    b.emit(Instruction::Sub(Address::new(0)));
    for _ in 0..7 {
        b.emit(Instruction::Inc);
    }
    let fused = b.arena.stub();
    b.emit(Instruction::Jump(fused));
    b.emit(Instruction::Get);
    b.place(fused);
    b.emit(Instruction::Store(pointer.clone()));
    let loadi = b.emit(Instruction::Loadi(pointer));
    b.emit(Instruction::Put);
    b.emit(Instruction::Halt);
    let mut assembly = b.finish();
    assert_eq!(execute(&assembly, &[]).outputs, vec![9]);

    assert_eq!(peephole::optimize(&mut assembly).unwrap(), 1);
    let text = assembly.render(false);
    assert!(!text.contains("STORE 20"), "{text}");
    assert!(text.contains("LOADI 0"), "{text}");
    // the jump follows the store onto the load
    let target = assembly.arena.address(loadi).unwrap();
    assert!(text.contains(&format!("JUMP {target}")), "{text}");
    assert_eq!(execute(&assembly, &[]).outputs, vec![9]);
}

#[test]
fn shared_pointer_cell_is_not_fused() {
    let mut b = Builder::new();
    let pointer = Address::new(20);
    b.emit(Instruction::Get);
    b.emit(Instruction::Store(pointer.clone()));
    b.emit(Instruction::Loadi(pointer.clone()));
    b.emit(Instruction::Put);
    b.emit(Instruction::Load(pointer));
    b.emit(Instruction::Put);
    b.emit(Instruction::Halt);
    let mut assembly = b.finish();

    assert_eq!(peephole::optimize(&mut assembly).unwrap(), 0);
    // m[0] holds the input itself
    assert_eq!(execute(&assembly, &[0]).outputs, vec![0, 0]);
}

#[test]
fn generated_programs_keep_their_behaviour() {
    let programs: [(&str, &[i64]); 5] = [
        (
            "DECLARE a, b, t(0:3)
            BEGIN
                READ a;
                b ASSIGN a;
                WRITE b;
                FOR i FROM 0 TO 3 DO t(i) ASSIGN i PLUS a; ENDFOR
                READ b;
                WRITE t(b);
                t(b) ASSIGN t(b) TIMES 2;
                WRITE t(b);
            END",
            &[5, 2],
        ),
        (
            "DECLARE a, b, t(0:3)
            BEGIN
                READ a;
                READ b;
                WHILE a GE 0 DO
                    t(b) ASSIGN a;
                    a ASSIGN a MINUS 1;
                    b ASSIGN b PLUS 1;
                    IF b GE 3 THEN b ASSIGN 0; ENDIF
                ENDWHILE
                WRITE t(0);
                WRITE t(3);
            END",
            &[6, 1],
        ),
        (
            "DECLARE a, b, t(0:3)
            BEGIN
                READ a;
                DO
                    b ASSIGN a MOD 4;
                    t(b) ASSIGN a;
                    a ASSIGN a DIV 2;
                WHILE a GE 0 ENDDO
                WRITE t(1);
            END",
            &[27],
        ),
        (
            "DECLARE a, b, t(0:3)
            BEGIN
                READ a;
                READ b;
                a ASSIGN a TIMES b;
                b ASSIGN a DIV b;
                WRITE a;
                WRITE b;
            END",
            &[-6, 7],
        ),
        (
            "DECLARE a, b, t(0:3)
            BEGIN
                FOR i FROM 3 DOWNTO 0 DO
                    READ t(i);
                ENDFOR
                a ASSIGN 0;
                FOR i FROM 0 TO 3 DO
                    b ASSIGN t(i);
                    IF b GE a THEN a ASSIGN b; ENDIF
                ENDFOR
                WRITE a;
            END",
            &[4, -1, 9, 2],
        ),
    ];

    let options = Options::unoptimized();
    let mut rewrites = 0;
    for (src, inputs) in programs {
        let program = parse_program(src).unwrap();
        let (mut assembly, _) = CodeGen::new(&options).generate(&program).unwrap();
        let before = execute(&assembly, inputs);

        rewrites += peephole::optimize(&mut assembly).unwrap();
        let after = execute(&assembly, inputs);
        assert_eq!(after.outputs, before.outputs, "{src}");
        // a, b and t(0..=3)
        for cell in FIRST_FREE..FIRST_FREE + 6 {
            assert_eq!(after.cell(cell), before.cell(cell), "cell {cell} of\n{src}");
        }
        assert!(after.cost <= before.cost);
    }
    assert!(rewrites > 0);
}
