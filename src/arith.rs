//! Multiplication, division and modulo for a machine that only adds,
//! subtracts and shifts. Results are left in the expression accumulator.
//! Division rounds toward negative infinity; the remainder takes the
//! divisor's sign. A zero divisor yields 0 for both.

use crate::asm::{Address, Instruction, Label, Sequence};
use crate::ast::Value;
use crate::codegen::CodeGen;
use crate::error::Result;

/// `Some(k)` when `|v| == 2^k`.
fn power_of_two(v: i64) -> Option<u32> {
    let m = v.unsigned_abs();
    m.is_power_of_two().then(|| m.trailing_zeros())
}

impl CodeGen<'_> {
    pub(crate) fn gen_multiply(&mut self, lhs: &Value, rhs: &Value) -> Result<(Sequence, usize)> {
        let shortcut = |v: i64| v == 0 || power_of_two(v).is_some();
        match (lhs.as_number(), rhs.as_number()) {
            (_, Some(c)) if shortcut(c) => self.gen_scale(lhs, c),
            (Some(c), _) if shortcut(c) => self.gen_scale(rhs, c),
            _ => self.gen_peasant(lhs, rhs),
        }
    }

    // v * c for c = 0 or c = ±2^k
    fn gen_scale(&mut self, v: &Value, c: i64) -> Result<(Sequence, usize)> {
        let mut seq = self.sequence();
        let e = self.expression.clone();
        if c == 0 {
            let p = self.primary.clone();
            self.emit(&mut seq, Instruction::Sub(p));
            self.emit(&mut seq, Instruction::Store(e));
            return Ok((seq, 0));
        }
        let r = self.resolve_value(v)?;
        seq.append(r.code.clone());
        self.load(&mut seq, &r);
        if let Some(k) = power_of_two(c).filter(|k| *k > 0) {
            let by = self.constant(k as i64);
            self.emit(&mut seq, Instruction::Shift(by));
        }
        if c < 0 {
            self.negate(&mut seq);
        }
        self.emit(&mut seq, Instruction::Store(e));
        Ok((seq, r.temporaries))
    }

    // double-and-add over the factor of smaller magnitude
    fn gen_peasant(&mut self, lhs: &Value, rhs: &Value) -> Result<(Sequence, usize)> {
        let l = self.resolve_value(lhs)?;
        let r = self.resolve_value(rhs)?;
        let mut seq = self.sequence();
        seq.append(l.code.clone());
        seq.append(r.code.clone());

        let a = self.temporary()?;
        let b = self.temporary()?;
        let one = self.constant(1);
        let half = self.constant(-1);
        let p = self.primary.clone();
        let s = self.secondary.clone();
        let e = self.expression.clone();

        self.load(&mut seq, &l);
        self.emit(&mut seq, Instruction::Store(a.clone()));
        self.load(&mut seq, &r);
        self.emit(&mut seq, Instruction::Store(b.clone()));
        self.emit(&mut seq, Instruction::Sub(p.clone()));
        self.emit(&mut seq, Instruction::Store(e.clone()));

        // make b non-negative, moving its sign onto a
        let signed = self.arena.stub();
        self.emit(&mut seq, Instruction::Load(b.clone()));
        self.emit(&mut seq, Instruction::Jpos(signed));
        self.emit(&mut seq, Instruction::Jzero(signed));
        self.emit(&mut seq, Instruction::Load(a.clone()));
        self.negate(&mut seq);
        self.emit(&mut seq, Instruction::Store(a.clone()));
        self.emit(&mut seq, Instruction::Load(b.clone()));
        self.negate(&mut seq);
        self.emit(&mut seq, Instruction::Store(b.clone()));
        seq.push(signed);

        // s <- |a|; swap when |a| < b
        let abs = self.arena.stub();
        let top = self.arena.stub();
        let negswap = self.arena.stub();
        self.emit(&mut seq, Instruction::Load(a.clone()));
        self.emit(&mut seq, Instruction::Jpos(abs));
        self.negate(&mut seq);
        seq.push(abs);
        self.emit(&mut seq, Instruction::Store(s.clone()));
        self.emit(&mut seq, Instruction::Sub(b.clone()));
        self.emit(&mut seq, Instruction::Jpos(top));
        self.emit(&mut seq, Instruction::Jzero(top));
        self.emit(&mut seq, Instruction::Load(a.clone()));
        self.emit(&mut seq, Instruction::Jneg(negswap));
        self.emit(&mut seq, Instruction::Load(b.clone()));
        self.emit(&mut seq, Instruction::Store(a.clone()));
        self.emit(&mut seq, Instruction::Load(s.clone()));
        self.emit(&mut seq, Instruction::Store(b.clone()));
        self.emit(&mut seq, Instruction::Jump(top));
        seq.push(negswap);
        self.emit(&mut seq, Instruction::Sub(p));
        self.emit(&mut seq, Instruction::Sub(b.clone()));
        self.emit(&mut seq, Instruction::Store(a.clone()));
        self.emit(&mut seq, Instruction::Load(s));
        self.emit(&mut seq, Instruction::Store(b.clone()));
        seq.push(top);

        let end = self.arena.stub();
        let even = self.arena.stub();
        self.emit(&mut seq, Instruction::Load(b.clone()));
        self.emit(&mut seq, Instruction::Jzero(end));
        // 2 * (b / 2) - b is 0 for even b, -1 for odd
        self.emit(&mut seq, Instruction::Shift(half.clone()));
        self.emit(&mut seq, Instruction::Shift(one.clone()));
        self.emit(&mut seq, Instruction::Sub(b.clone()));
        self.emit(&mut seq, Instruction::Jzero(even));
        self.emit(&mut seq, Instruction::Load(e.clone()));
        self.emit(&mut seq, Instruction::Add(a.clone()));
        self.emit(&mut seq, Instruction::Store(e));
        seq.push(even);
        self.emit(&mut seq, Instruction::Load(b.clone()));
        self.emit(&mut seq, Instruction::Shift(half));
        self.emit(&mut seq, Instruction::Store(b));
        self.emit(&mut seq, Instruction::Load(a.clone()));
        self.emit(&mut seq, Instruction::Shift(one));
        self.emit(&mut seq, Instruction::Store(a));
        self.emit(&mut seq, Instruction::Jump(top));
        seq.push(end);

        Ok((seq, l.temporaries + r.temporaries + 2))
    }

    pub(crate) fn gen_divide(&mut self, lhs: &Value, rhs: &Value, modulo: bool) -> Result<(Sequence, usize)> {
        if let (Value::Identifier(a), Value::Identifier(b)) = (lhs, rhs) {
            if a == b {
                return self.gen_self_divide(lhs, modulo);
            }
        }
        match rhs.as_number() {
            Some(c) if c == 0 || power_of_two(c).is_some() => self.gen_divide_by(lhs, c, modulo),
            _ => self.gen_long_divide(lhs, rhs, modulo),
        }
    }

    // x / x is 1 unless x is 0; x % x is always 0
    fn gen_self_divide(&mut self, v: &Value, modulo: bool) -> Result<(Sequence, usize)> {
        let mut seq = self.sequence();
        let p = self.primary.clone();
        let e = self.expression.clone();
        if modulo {
            self.emit(&mut seq, Instruction::Sub(p));
            self.emit(&mut seq, Instruction::Store(e));
            return Ok((seq, 0));
        }
        let r = self.resolve_value(v)?;
        seq.append(r.code.clone());
        self.load(&mut seq, &r);
        let out = self.arena.stub();
        self.emit(&mut seq, Instruction::Jzero(out));
        self.emit(&mut seq, Instruction::Sub(p));
        self.emit(&mut seq, Instruction::Inc);
        seq.push(out);
        self.emit(&mut seq, Instruction::Store(e));
        Ok((seq, r.temporaries))
    }

    // divisor 0 or ±2^k
    fn gen_divide_by(&mut self, v: &Value, c: i64, modulo: bool) -> Result<(Sequence, usize)> {
        let mut seq = self.sequence();
        let p = self.primary.clone();
        let s = self.secondary.clone();
        let e = self.expression.clone();
        let k = power_of_two(c).unwrap_or(0);
        if c == 0 || (modulo && k == 0) {
            self.emit(&mut seq, Instruction::Sub(p));
            self.emit(&mut seq, Instruction::Store(e));
            return Ok((seq, 0));
        }

        let r = self.resolve_value(v)?;
        seq.append(r.code.clone());
        self.load(&mut seq, &r);
        if !modulo {
            if c < 0 {
                self.negate(&mut seq);
            }
            if k > 0 {
                let down = self.constant(-(k as i64));
                self.emit(&mut seq, Instruction::Shift(down));
            }
            self.emit(&mut seq, Instruction::Store(e));
            return Ok((seq, r.temporaries));
        }
        let down = self.constant(-(k as i64));
        let up = self.constant(k as i64);
        if c > 0 {
            // v - ((v >> k) << k)
            self.emit(&mut seq, Instruction::Shift(down));
            self.emit(&mut seq, Instruction::Shift(up));
            self.emit(&mut seq, Instruction::Store(s.clone()));
            self.load(&mut seq, &r);
            self.emit(&mut seq, Instruction::Sub(s));
        } else {
            // -((-v) mod 2^k); negating leaves v in the secondary accumulator
            self.negate(&mut seq);
            self.emit(&mut seq, Instruction::Shift(down));
            self.emit(&mut seq, Instruction::Shift(up));
            self.emit(&mut seq, Instruction::Add(s));
        }
        self.emit(&mut seq, Instruction::Store(e));
        Ok((seq, r.temporaries))
    }

    fn gen_long_divide(&mut self, lhs: &Value, rhs: &Value, modulo: bool) -> Result<(Sequence, usize)> {
        let l = self.resolve_value(lhs)?;
        let r = self.resolve_value(rhs)?;
        let mut seq = self.sequence();
        seq.append(l.code.clone());
        seq.append(r.code.clone());

        let tl = self.temporary()?;
        let tr = self.temporary()?;
        let n = self.temporary()?;
        let d = self.temporary()?;
        let sd = self.temporary()?;
        let sq = self.temporary()?;
        let one = self.constant(1);
        let half = self.constant(-1);
        let p = self.primary.clone();
        let e = self.expression.clone();
        let out = self.arena.stub();

        self.load(&mut seq, &l);
        self.emit(&mut seq, Instruction::Store(tl.clone()));
        self.load(&mut seq, &r);
        self.emit(&mut seq, Instruction::Store(tr.clone()));

        // d <- |R|, n <- |L|; a zero divisor leaves 0 in the accumulator
        let dpos = self.arena.stub();
        self.emit(&mut seq, Instruction::Jzero(out));
        self.emit(&mut seq, Instruction::Jpos(dpos));
        self.negate(&mut seq);
        seq.push(dpos);
        self.emit(&mut seq, Instruction::Store(d.clone()));
        self.emit(&mut seq, Instruction::Store(sd.clone()));
        let npos = self.arena.stub();
        self.emit(&mut seq, Instruction::Load(tl.clone()));
        self.emit(&mut seq, Instruction::Jpos(npos));
        self.negate(&mut seq);
        seq.push(npos);
        self.emit(&mut seq, Instruction::Store(n.clone()));

        if !modulo {
            self.emit(&mut seq, Instruction::Sub(p.clone()));
            self.emit(&mut seq, Instruction::Store(e.clone()));
        }
        self.emit(&mut seq, Instruction::Sub(p.clone()));
        self.emit(&mut seq, Instruction::Inc);
        self.emit(&mut seq, Instruction::Store(sq.clone()));

        // scale the divisor past the dividend
        let grow = self.mark(&mut seq);
        let shrink = self.arena.stub();
        self.emit(&mut seq, Instruction::Load(n.clone()));
        self.emit(&mut seq, Instruction::Sub(sd.clone()));
        self.emit(&mut seq, Instruction::Jneg(shrink));
        self.emit(&mut seq, Instruction::Load(sd.clone()));
        self.emit(&mut seq, Instruction::Shift(one.clone()));
        self.emit(&mut seq, Instruction::Store(sd.clone()));
        self.emit(&mut seq, Instruction::Load(sq.clone()));
        self.emit(&mut seq, Instruction::Shift(one));
        self.emit(&mut seq, Instruction::Store(sq.clone()));
        self.emit(&mut seq, Instruction::Jump(grow));

        // then subtract it back down, one bit of quotient per step
        seq.push(shrink);
        let done = self.arena.stub();
        self.emit(&mut seq, Instruction::Load(sq.clone()));
        self.emit(&mut seq, Instruction::Shift(half.clone()));
        self.emit(&mut seq, Instruction::Jzero(done));
        self.emit(&mut seq, Instruction::Store(sq.clone()));
        self.emit(&mut seq, Instruction::Load(sd.clone()));
        self.emit(&mut seq, Instruction::Shift(half));
        self.emit(&mut seq, Instruction::Store(sd.clone()));
        self.emit(&mut seq, Instruction::Load(n.clone()));
        self.emit(&mut seq, Instruction::Sub(sd));
        self.emit(&mut seq, Instruction::Jneg(shrink));
        self.emit(&mut seq, Instruction::Store(n.clone()));
        if !modulo {
            self.emit(&mut seq, Instruction::Load(e.clone()));
            self.emit(&mut seq, Instruction::Add(sq));
            self.emit(&mut seq, Instruction::Store(e.clone()));
        }
        self.emit(&mut seq, Instruction::Jump(shrink));
        seq.push(done);

        if modulo {
            self.gen_remainder_sign(&mut seq, &tl, &tr, &n, &d, out);
        } else {
            self.gen_quotient_sign(&mut seq, &tl, &tr, &n, out);
        }
        seq.push(out);
        self.emit(&mut seq, Instruction::Store(e));
        Ok((seq, l.temporaries + r.temporaries + 6))
    }

    // magnitude quotient q in the expression accumulator, remainder n:
    // q when the signs agree, -q when they differ and n == 0, -(q + 1) otherwise
    fn gen_quotient_sign(
        &mut self,
        seq: &mut Sequence,
        tl: &Address,
        tr: &Address,
        n: &Address,
        out: Label,
    ) {
        let e = self.expression.clone();
        let lneg = self.arena.stub();
        let differ = self.arena.stub();
        let same = self.arena.stub();
        let exact = self.arena.stub();
        let flip = self.arena.stub();

        self.emit(seq, Instruction::Load(tl.clone()));
        self.emit(seq, Instruction::Jneg(lneg));
        self.emit(seq, Instruction::Load(tr.clone()));
        self.emit(seq, Instruction::Jneg(differ));
        self.emit(seq, Instruction::Jump(same));
        seq.push(lneg);
        self.emit(seq, Instruction::Load(tr.clone()));
        self.emit(seq, Instruction::Jneg(same));
        seq.push(differ);
        self.emit(seq, Instruction::Load(n.clone()));
        self.emit(seq, Instruction::Jzero(exact));
        self.emit(seq, Instruction::Load(e.clone()));
        self.emit(seq, Instruction::Inc);
        self.emit(seq, Instruction::Jump(flip));
        seq.push(exact);
        self.emit(seq, Instruction::Load(e.clone()));
        seq.push(flip);
        self.negate(seq);
        self.emit(seq, Instruction::Jump(out));
        seq.push(same);
        self.emit(seq, Instruction::Load(e));
    }

    // magnitude remainder n, divisor magnitude d
    fn gen_remainder_sign(
        &mut self,
        seq: &mut Sequence,
        tl: &Address,
        tr: &Address,
        n: &Address,
        d: &Address,
        out: Label,
    ) {
        let p = self.primary.clone();
        let rneg = self.arena.stub();
        let keep = self.arena.stub();
        let negr = self.arena.stub();

        self.emit(seq, Instruction::Load(n.clone()));
        self.emit(seq, Instruction::Jzero(out));
        self.emit(seq, Instruction::Load(tr.clone()));
        self.emit(seq, Instruction::Jneg(rneg));
        // positive divisor: n, or d - n for a negative dividend
        self.emit(seq, Instruction::Load(tl.clone()));
        self.emit(seq, Instruction::Jpos(keep));
        self.emit(seq, Instruction::Load(d.clone()));
        self.emit(seq, Instruction::Sub(n.clone()));
        self.emit(seq, Instruction::Jump(out));
        seq.push(keep);
        self.emit(seq, Instruction::Load(n.clone()));
        self.emit(seq, Instruction::Jump(out));
        // negative divisor: n - d, or -n for a negative dividend
        seq.push(rneg);
        self.emit(seq, Instruction::Load(tl.clone()));
        self.emit(seq, Instruction::Jneg(negr));
        self.emit(seq, Instruction::Load(n.clone()));
        self.emit(seq, Instruction::Sub(d.clone()));
        self.emit(seq, Instruction::Jump(out));
        seq.push(negr);
        self.emit(seq, Instruction::Sub(p));
        self.emit(seq, Instruction::Sub(n.clone()));
    }
}
