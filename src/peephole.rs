use std::collections::HashSet;

use tracing::{debug, trace};

use crate::asm::{Address, Assembly, Instruction, Label};
use crate::codegen::PRIMARY;
use crate::error::Result;

/// Addresses some jump lands on, as of the last seal.
fn jump_targets(assembly: &mut Assembly) -> HashSet<i64> {
    let targets: Vec<Label> = assembly.instructions().filter_map(|(_, i)| i.target()).collect();
    targets
        .into_iter()
        .filter_map(|t| {
            let t = assembly.arena.resolve(t);
            assembly.arena.address(t)
        })
        .collect()
}

/// Instructions other than `except` that name the same cell handle as `a`.
fn shared(assembly: &Assembly, a: &Address, except: [Label; 2]) -> bool {
    assembly
        .instructions()
        .filter(|(l, _)| !except.contains(l))
        .any(|(_, i)| i.operand().is_some_and(|o| o.same_cell(a)))
}

enum Rewrite {
    // STORE x; LOAD x: the load is a no-op
    DropLoad(Label),
    // STORE t; LOADI t with t used nowhere else: go through the accumulator
    Fuse { store: Label, loadi: Label },
}

fn find_rewrites(assembly: &mut Assembly) -> Vec<Rewrite> {
    let targets = jump_targets(assembly);
    let landed = |assembly: &Assembly, l: Label| {
        assembly
            .arena
            .address(l)
            .is_some_and(|a| targets.contains(&a))
    };

    let mut found = vec![];
    let mut prev: Option<(Label, Address)> = None;
    let real: Vec<(Label, Instruction)> = assembly.instructions().map(|(l, i)| (l, i.clone())).collect();
    for (l, instr) in real {
        match (&prev, &instr) {
            (Some((_, x)), Instruction::Load(y)) if x.get() == y.get() && !landed(assembly, l) => {
                found.push(Rewrite::DropLoad(l));
                prev = None;
                continue;
            }
            (Some((store, x)), Instruction::Loadi(y))
                if x.same_cell(y) && !landed(assembly, l) && !shared(assembly, x, [*store, l]) =>
            {
                found.push(Rewrite::Fuse { store: *store, loadi: l });
                prev = None;
                continue;
            }
            _ => {}
        }
        prev = match instr {
            Instruction::Store(x) => Some((l, x)),
            _ => None,
        };
    }
    found
}

/// Removes redundant store/load pairs until none is left, resealing after
/// every round. Returns the number of rewrites.
pub fn optimize(assembly: &mut Assembly) -> Result<usize> {
    let mut total = 0;
    loop {
        assembly.seal();
        let rewrites = find_rewrites(assembly);
        if rewrites.is_empty() {
            break;
        }
        total += rewrites.len();
        for r in rewrites {
            match r {
                Rewrite::DropLoad(l) => {
                    trace!(label = l.index(), "dropping load after store");
                    assembly.arena.replace(l, Instruction::Stub(None));
                }
                Rewrite::Fuse { store, loadi } => {
                    trace!(label = loadi.index(), "fusing store into indirect load");
                    // jumps aimed at the store now land on the load
                    assembly.arena.replace(store, Instruction::Stub(None));
                    assembly.arena.redirect(store, loadi)?;
                    assembly
                        .arena
                        .replace(loadi, Instruction::Loadi(Address::new(PRIMARY)));
                }
            }
        }
    }
    debug!(rewrites = total, instructions = assembly.len(), "peephole finished");
    Ok(total)
}
