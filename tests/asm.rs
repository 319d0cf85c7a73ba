use impc::asm::{Address, Arena, Instruction, Label, Sequence};
use impc::CompileError;

fn push(arena: &mut Arena, seq: &mut Sequence, instr: Instruction) -> Label {
    let l = arena.push(instr);
    seq.push(l);
    l
}

fn addresses(arena: &Arena, labels: &[Label]) -> Vec<Option<i64>> {
    labels.iter().map(|l| arena.address(*l)).collect()
}

#[test]
fn stubs_take_the_address_of_the_next_instruction() {
    let mut arena = Arena::new();
    let mut seq = Sequence::new(&mut arena);
    let get = push(&mut arena, &mut seq, Instruction::Get);
    let target = arena.stub();
    seq.push(target);
    let jump = push(&mut arena, &mut seq, Instruction::Jump(target));
    let halt = push(&mut arena, &mut seq, Instruction::Halt);
    arena.seal(&seq);

    assert_eq!(arena.address(get), Some(0));
    assert_eq!(arena.address(target), Some(1));
    assert_eq!(arena.address(jump), Some(1));
    assert_eq!(arena.address(halt), Some(2));
    assert_eq!(arena.address(seq.end()), Some(3));
    assert_eq!(arena.render(jump).as_deref(), Some("JUMP 1"));
    assert_eq!(arena.render(target), None);
}

#[test]
fn sealing_twice_gives_the_same_addresses() {
    let mut arena = Arena::new();
    let mut seq = Sequence::new(&mut arena);
    let mut labels = vec![];
    for i in 0..6 {
        if i % 2 == 0 {
            let s = arena.stub();
            seq.push(s);
            labels.push(s);
        }
        labels.push(push(&mut arena, &mut seq, Instruction::Inc));
    }
    arena.seal(&seq);
    let first = addresses(&arena, &labels);
    arena.seal(&seq);
    assert_eq!(first, addresses(&arena, &labels));
}

#[test]
fn stubs_do_not_shift_real_instructions() {
    let mut arena = Arena::new();
    let mut with_stubs = Sequence::new(&mut arena);
    let mut real = vec![];
    for instr in [Instruction::Get, Instruction::Inc, Instruction::Put, Instruction::Halt] {
        let s = arena.stub();
        with_stubs.push(s);
        real.push(push(&mut arena, &mut with_stubs, instr));
    }
    let back = arena.stub();
    with_stubs.push(back);
    let redirected = arena.stub();
    arena.redirect(redirected, real[0]).unwrap();
    with_stubs.push(redirected);

    arena.seal(&with_stubs);
    let stubbed = addresses(&arena, &real);

    let mut plain = Sequence::new(&mut arena);
    for l in &real {
        plain.push(*l);
    }
    arena.seal(&plain);
    assert_eq!(stubbed, addresses(&arena, &real));
    assert_eq!(stubbed, vec![Some(0), Some(1), Some(2), Some(3)]);
}

#[test]
fn redirection_reaches_everything_aimed_at_the_stub() {
    let mut arena = Arena::new();
    let mut seq = Sequence::new(&mut arena);
    let first = arena.stub();
    let second = arena.stub();
    let jump = push(&mut arena, &mut seq, Instruction::Jump(first));
    push(&mut arena, &mut seq, Instruction::Inc);
    seq.push(second);
    let put = push(&mut arena, &mut seq, Instruction::Put);
    push(&mut arena, &mut seq, Instruction::Halt);
    seq.push(first);

    arena.redirect(first, second).unwrap();
    arena.seal(&seq);
    assert_eq!(arena.render(jump).as_deref(), Some("JUMP 2"));
    assert_eq!(arena.resolve(first), second);

    // a later redirect of the target is followed too
    arena.redirect(second, put).unwrap();
    arena.seal(&seq);
    assert_eq!(arena.render(jump).as_deref(), Some("JUMP 2"));
    assert_eq!(arena.resolve(first), put);
}

#[test]
fn redirect_rejects_cycles_and_real_instructions() {
    let mut arena = Arena::new();
    let a = arena.stub();
    let b = arena.stub();
    arena.redirect(a, b).unwrap();
    assert!(matches!(arena.redirect(b, a), Err(CompileError::StubCycle(_))));
    assert!(matches!(arena.redirect(b, b), Err(CompileError::StubCycle(_))));

    let inc = arena.push(Instruction::Inc);
    assert!(matches!(arena.redirect(inc, a), Err(CompileError::Unclassifiable(_))));
}

#[test]
fn start_of_an_empty_sequence_is_an_error() {
    let mut arena = Arena::new();
    let mut seq = Sequence::new(&mut arena);
    let s = arena.stub();
    seq.push(s);
    assert!(matches!(seq.start(&arena), Err(CompileError::EmptySequence)));

    let inc = push(&mut arena, &mut seq, Instruction::Inc);
    assert_eq!(seq.start(&arena).unwrap(), inc);
}

#[test]
fn appended_sequences_keep_the_outer_end_last() {
    let mut arena = Arena::new();
    let mut outer = Sequence::new(&mut arena);
    push(&mut arena, &mut outer, Instruction::Get);
    let mut inner = Sequence::new(&mut arena);
    push(&mut arena, &mut inner, Instruction::Put);
    let inner_end = inner.end();
    outer.append(inner);
    push(&mut arena, &mut outer, Instruction::Halt);

    let items = outer.items();
    assert_eq!(*items.last().unwrap(), outer.end());
    assert!(items.contains(&inner_end));
    arena.seal(&outer);
    assert_eq!(arena.address(inner_end), Some(2));
}

#[test]
fn moving_a_slot_moves_every_handle() {
    let base = Address::new(10);
    let elem = base.at(2);
    let other = Address::new(12);
    assert_eq!(elem.get(), 12);
    assert!(!elem.same_cell(&other));
    assert!(elem.same_cell(&base.at(2)));

    base.set_slot(40);
    assert_eq!(base.get(), 40);
    assert_eq!(elem.get(), 42);

    let mut moved = elem.clone();
    moved.set_offset(5);
    assert_eq!(moved.get(), 45);
    assert_eq!(elem.get(), 42);
}
