//! Numeric tower and operator semantics on evaluated operands.
//!
//! Every operation picks the narrowest exact representation that can hold
//! the result: integers, then reduced rationals, then doubles, each with a
//! complex counterpart. Exact arithmetic uses checked operations and falls
//! back to doubles on overflow instead of wrapping.

use num_complex::{Complex, Complex64};
use num_rational::Rational64;
use num_traits::{pow::checked_pow, CheckedAdd, CheckedDiv, CheckedMul, CheckedSub, One, Zero};
use std::cmp::Ordering;
use std::convert::TryFrom;

use crate::node::*;
use crate::render::Dialect;

#[derive(Clone, Copy, PartialEq, PartialOrd)]
enum Rank {
    Int,
    Ratio,
    Float,
}

/// Exactness level of a numeric node and whether it is complex
fn rank(n: &Node) -> Option<(Rank, bool)> {
    let r = match n {
        Node::Int(..) => (Rank::Int, false),
        Node::Ratio(..) => (Rank::Ratio, false),
        Node::Float(..) => (Rank::Float, false),
        Node::ComplexInt(..) => (Rank::Int, true),
        Node::ComplexRatio(..) => (Rank::Ratio, true),
        Node::ComplexFloat(..) => (Rank::Float, true),
        _ => return None,
    };
    Some(r)
}

fn top_rank(a: &Node, b: &Node) -> Option<(Rank, bool)> {
    let (ra, ca) = rank(a)?;
    let (rb, cb) = rank(b)?;
    let r = if ra > rb { ra } else { rb };
    Some((r, ca || cb))
}

pub(crate) fn ratio_to_f64(r: &Rational64) -> f64 {
    *r.numer() as f64 / *r.denom() as f64
}

// reducing a ratio negates its parts, which overflows for i64::MIN
fn safe_ratio(r: &Rational64) -> bool {
    *r.numer() != i64::MIN && *r.denom() != i64::MIN
}

fn safe_complex(c: &Complex<Rational64>) -> bool {
    safe_ratio(&c.re) && safe_ratio(&c.im)
}

fn cx_add<T: Clone + CheckedAdd>(a: &Complex<T>, b: &Complex<T>) -> Option<Complex<T>> {
    Some(Complex::new(a.re.checked_add(&b.re)?, a.im.checked_add(&b.im)?))
}

fn cx_sub<T: Clone + CheckedSub>(a: &Complex<T>, b: &Complex<T>) -> Option<Complex<T>> {
    Some(Complex::new(a.re.checked_sub(&b.re)?, a.im.checked_sub(&b.im)?))
}

fn cx_mul<T: Clone + CheckedAdd + CheckedSub + CheckedMul>(a: &Complex<T>, b: &Complex<T>) -> Option<Complex<T>> {
    let re = a.re.checked_mul(&b.re)?.checked_sub(&a.im.checked_mul(&b.im)?)?;
    let im = a.re.checked_mul(&b.im)?.checked_add(&a.im.checked_mul(&b.re)?)?;
    Some(Complex::new(re, im))
}

fn cx_div(a: &Complex<Rational64>, b: &Complex<Rational64>) -> Option<Complex<Rational64>> {
    let den = b.re.checked_mul(&b.re)?.checked_add(&b.im.checked_mul(&b.im)?)?;
    if den.is_zero() {
        return None;
    }
    let re = a.re.checked_mul(&b.re)?.checked_add(&a.im.checked_mul(&b.im)?)?;
    let im = a.im.checked_mul(&b.re)?.checked_sub(&a.re.checked_mul(&b.im)?)?;
    Some(Complex::new(re.checked_div(&den)?, im.checked_div(&den)?))
}

fn cx_pow(base: &Complex<Rational64>, exp: u64) -> Option<Complex<Rational64>> {
    let mut res = Complex::new(Rational64::one(), Rational64::zero());
    let mut base = base.clone();
    let mut exp = exp;
    while exp > 0 {
        if exp % 2 == 1 {
            res = cx_mul(&res, &base)?;
        }
        exp /= 2;
        if exp > 0 {
            base = cx_mul(&base, &base)?;
        }
    }
    Some(res)
}

impl Node {
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Node::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn to_ratio(&self) -> Option<Rational64> {
        match self {
            Node::Int(i) => Some(Rational64::from_integer(*i)),
            Node::Ratio(r) => Some(*r),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Node::Int(i) => Some(*i as f64),
            Node::Ratio(r) => Some(ratio_to_f64(r)),
            Node::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn to_complex_int(&self) -> Option<Complex<i64>> {
        match self {
            Node::Int(i) => Some(Complex::new(*i, 0)),
            Node::ComplexInt(c) => Some(*c),
            _ => None,
        }
    }

    pub fn to_complex_ratio(&self) -> Option<Complex<Rational64>> {
        match self {
            Node::ComplexInt(c) => Some(Complex::new(Rational64::from_integer(c.re), Rational64::from_integer(c.im))),
            Node::ComplexRatio(c) => Some(*c),
            _ => self.to_ratio().map(|r| Complex::new(r, Rational64::zero())),
        }
    }

    pub fn to_complex_f64(&self) -> Option<Complex64> {
        match self {
            Node::ComplexInt(c) => Some(Complex::new(c.re as f64, c.im as f64)),
            Node::ComplexRatio(c) => Some(Complex::new(ratio_to_f64(&c.re), ratio_to_f64(&c.im))),
            Node::ComplexFloat(c) => Some(*c),
            _ => self.to_f64().map(|f| Complex::new(f, 0.0)),
        }
    }
}

macro_rules! basic_op {
    ($id:ident, $tr:ident, $m:ident, $cx:ident, $op:tt) => {
        pub(crate) fn $id(a: &Node, b: &Node) -> Option<Node> {
            let (r, complex) = top_rank(a, b)?;
            if complex {
                let exact = match r {
                    Rank::Int => $cx(&a.to_complex_int()?, &b.to_complex_int()?).map(Node::from_complex_int),
                    Rank::Ratio => {
                        let (x, y) = (a.to_complex_ratio()?, b.to_complex_ratio()?);
                        if safe_complex(&x) && safe_complex(&y) {
                            $cx(&x, &y).map(Node::from_complex_ratio)
                        } else {
                            None
                        }
                    }
                    Rank::Float => None,
                };
                if exact.is_some() {
                    return exact;
                }
                return Some(Node::from_complex_float(a.to_complex_f64()? $op b.to_complex_f64()?));
            }
            let exact = match r {
                Rank::Int => $tr::$m(&a.to_i64()?, &b.to_i64()?).map(Node::Int),
                Rank::Ratio => {
                    let (x, y) = (a.to_ratio()?, b.to_ratio()?);
                    if safe_ratio(&x) && safe_ratio(&y) {
                        $tr::$m(&x, &y).map(Node::from_ratio)
                    } else {
                        None
                    }
                }
                Rank::Float => None,
            };
            if exact.is_some() {
                return exact;
            }
            Some(Node::Float(a.to_f64()? $op b.to_f64()?))
        }
    };
}

basic_op!(add, CheckedAdd, checked_add, cx_add, +);
basic_op!(sub, CheckedSub, checked_sub, cx_sub, -);
basic_op!(mul, CheckedMul, checked_mul, cx_mul, *);

/// Exact quotient when both operands are exact, IEEE semantics otherwise:
/// `1/0` is `+∞` and `0/0` is NaN
pub(crate) fn div(a: &Node, b: &Node) -> Option<Node> {
    let (r, complex) = top_rank(a, b)?;
    if complex {
        if r != Rank::Float {
            let (x, y) = (a.to_complex_ratio()?, b.to_complex_ratio()?);
            if safe_complex(&x) && safe_complex(&y) {
                if let Some(c) = cx_div(&x, &y) {
                    return Some(Node::from_complex_ratio(c));
                }
            }
        }
        return Some(Node::from_complex_float(a.to_complex_f64()? / b.to_complex_f64()?));
    }
    if r != Rank::Float {
        let (x, y) = (a.to_ratio()?, b.to_ratio()?);
        if !y.is_zero() && safe_ratio(&x) && safe_ratio(&y) {
            if let Some(q) = CheckedDiv::checked_div(&x, &y) {
                return Some(Node::from_ratio(q));
            }
        }
    }
    Some(Node::Float(a.to_f64()? / b.to_f64()?))
}

/// Remainder with the sign of the dividend
pub(crate) fn rem(a: &Node, b: &Node) -> Option<Node> {
    let (r, complex) = top_rank(a, b)?;
    if complex {
        return None;
    }
    match r {
        Rank::Int => {
            if let Some(v) = a.to_i64()?.checked_rem(b.to_i64()?) {
                return Some(Node::Int(v));
            }
        }
        Rank::Ratio => {
            let (x, y) = (a.to_ratio()?, b.to_ratio()?);
            if !y.is_zero() && safe_ratio(&x) && safe_ratio(&y) {
                let q = CheckedDiv::checked_div(&x, &y).map(|q| q.trunc());
                let r = q
                    .and_then(|q| CheckedMul::checked_mul(&q, &y))
                    .and_then(|p| CheckedSub::checked_sub(&x, &p));
                if let Some(r) = r {
                    return Some(Node::from_ratio(r));
                }
            }
        }
        Rank::Float => {}
    }
    Some(Node::Float(a.to_f64()? % b.to_f64()?))
}

/// Integer exponents stay exact, negative bases with fractional exponents
/// become complex
pub(crate) fn pow(a: &Node, b: &Node) -> Option<Node> {
    if !a.is_numeric() || !b.is_numeric() {
        return None;
    }
    if let Node::Int(e) = b {
        let e = *e;
        let n = e.unsigned_abs();
        match a {
            Node::Int(..) | Node::Ratio(..) => {
                let base = a.to_ratio()?;
                if let (true, Ok(n)) = (safe_ratio(&base), usize::try_from(n)) {
                    if let Some(p) = checked_pow(base, n) {
                        if e >= 0 {
                            return Some(Node::from_ratio(p));
                        }
                        if !p.is_zero() && safe_ratio(&p) {
                            return Some(Node::from_ratio(p.recip()));
                        }
                    }
                }
                return Some(Node::Float(a.to_f64()?.powf(e as f64)));
            }
            Node::ComplexInt(..) | Node::ComplexRatio(..) => {
                let base = a.to_complex_ratio()?;
                if safe_complex(&base) {
                    if let Some(p) = cx_pow(&base, n) {
                        if e >= 0 {
                            return Some(Node::from_complex_ratio(p));
                        }
                        let one = Complex::new(Rational64::one(), Rational64::zero());
                        if let Some(inv) = cx_div(&one, &p) {
                            return Some(Node::from_complex_ratio(inv));
                        }
                    }
                }
                return Some(Node::from_complex_float(a.to_complex_f64()?.powf(e as f64)));
            }
            _ => {}
        }
    }
    if a.is_real() && b.is_real() {
        let (x, y) = (a.to_f64()?, b.to_f64()?);
        if x >= 0.0 || x.is_nan() || y.fract() == 0.0 || !y.is_finite() {
            return Some(Node::Float(x.powf(y)));
        }
    }
    Some(Node::from_complex_float(a.to_complex_f64()?.powc(b.to_complex_f64()?)))
}

pub(crate) fn neg(a: &Node) -> Option<Node> {
    let n = match a {
        Node::Int(i) => i.checked_neg().map_or(Node::Float(-(*i as f64)), Node::Int),
        Node::Ratio(r) => {
            if safe_ratio(r) {
                Node::Ratio(-r)
            } else {
                Node::Float(-ratio_to_f64(r))
            }
        }
        Node::Float(f) => Node::Float(-f),
        Node::ComplexInt(c) => match (c.re.checked_neg(), c.im.checked_neg()) {
            (Some(re), Some(im)) => Node::ComplexInt(Complex::new(re, im)),
            _ => Node::ComplexFloat(Complex::new(-(c.re as f64), -(c.im as f64))),
        },
        Node::ComplexRatio(c) => {
            if safe_complex(c) {
                Node::ComplexRatio(-c)
            } else {
                Node::from_complex_float(-a.to_complex_f64()?)
            }
        }
        Node::ComplexFloat(c) => Node::ComplexFloat(-c),
        Node::Array(arr) => {
            let mut items = Vec::with_capacity(arr.len());
            for item in arr.items() {
                items.push(unary_or_symbolic(UnaryOp::Negate, item));
            }
            Node::array(items)
        }
        _ => return None,
    };
    Some(n)
}

/// Product of `1..=n`; doubles take over once 64 bits overflow
pub(crate) fn factorial(a: &Node) -> Option<Node> {
    let n = a.as_integral()?;
    if n < 0 {
        return None;
    }
    let mut acc = 1i64;
    let mut i = 2i64;
    while i <= n {
        match acc.checked_mul(i) {
            Some(v) => acc = v,
            None => {
                let mut f = acc as f64;
                while i <= n && f.is_finite() {
                    f *= i as f64;
                    i += 1;
                }
                return Some(Node::Float(f));
            }
        }
        i += 1;
    }
    match a {
        Node::Float(..) => Some(Node::Float(acc as f64)),
        _ => Some(Node::Int(acc)),
    }
}

/// Logical not for booleans, bitwise not for integers
pub(crate) fn not(a: &Node) -> Option<Node> {
    match a {
        Node::Bool(b) => Some(Node::Bool(!b)),
        Node::Int(i) => Some(Node::Int(!i)),
        _ => None,
    }
}

macro_rules! logic_op {
    ($id:ident, $bool_op:tt, $bit_op:tt) => {
        pub(crate) fn $id(a: &Node, b: &Node) -> Option<Node> {
            match (a, b) {
                (Node::Bool(x), Node::Bool(y)) => Some(Node::Bool(*x $bool_op *y)),
                (Node::Int(x), Node::Int(y)) => Some(Node::Int(x $bit_op y)),
                _ => None,
            }
        }
    };
}

logic_op!(and, &&, &);
logic_op!(or, ||, |);

/// Ordering of reals, strings and characters
pub(crate) fn compare(a: &Node, b: &Node) -> Option<Ordering> {
    match (a, b) {
        (Node::Str(x), Node::Str(y)) => Some(x.cmp(y)),
        (Node::Char(x), Node::Char(y)) => Some(x.cmp(y)),
        _ if a.is_real() && b.is_real() => {
            if a.is_exact() && b.is_exact() {
                Some(a.to_ratio()?.cmp(&b.to_ratio()?))
            } else {
                a.to_f64()?.partial_cmp(&b.to_f64()?)
            }
        }
        _ => None,
    }
}

/// Value equality across numeric variants. `None` when either side is
/// still symbolic.
pub(crate) fn equals(a: &Node, b: &Node) -> Option<bool> {
    if a.is_numeric() && b.is_numeric() {
        if a.is_exact() && b.is_exact() {
            return Some(a.to_complex_ratio()? == b.to_complex_ratio()?);
        }
        return Some(a.to_complex_f64()? == b.to_complex_f64()?);
    }
    match (a, b) {
        (Node::Array(x), Node::Array(y)) => {
            if x.len() != y.len() {
                return Some(false);
            }
            for (p, q) in x.items().iter().zip(y.items()) {
                if !equals(p, q)? {
                    return Some(false);
                }
            }
            Some(true)
        }
        (Node::Placeholder(..), _) | (_, Node::Placeholder(..)) => None,
        _ if a.is_primitive() && b.is_primitive() => Some(a == b),
        _ => None,
    }
}

fn text_of(n: &Node) -> Option<String> {
    match n {
        Node::Str(s) => Some(s.to_string()),
        Node::Char(c) => Some(c.to_string()),
        Node::Array(..) | Node::Map(..) | Node::Fault(..) | Node::Placeholder(..) => None,
        _ if n.is_primitive() => Some(n.render(Dialect::Internal)),
        _ => None,
    }
}

pub(crate) fn concat(a: &Node, b: &Node) -> Option<Node> {
    match (a, b) {
        (Node::Array(x), Node::Array(y)) => {
            let mut items = x.items().to_vec();
            items.extend_from_slice(y.items());
            Some(Node::array(items))
        }
        (Node::Str(..), _) | (_, Node::Str(..)) | (Node::Char(..), Node::Char(..)) => {
            let mut s = text_of(a)?;
            s.push_str(&text_of(b)?);
            Some(Node::from(s.as_str()))
        }
        _ => None,
    }
}

fn size_fault(la: usize, lb: usize) -> Node {
    Node::fault(FaultKind::OutOfBounds, &format!("Array sizes differ: {} and {}", la, lb))
}

fn elementwise(op: BinaryOp, a: &Array, b: &Array) -> Node {
    if a.len() != b.len() {
        return size_fault(a.len(), b.len());
    }
    let items = a
        .items()
        .iter()
        .zip(b.items())
        .map(|(x, y)| binary_or_symbolic(op, x, y))
        .collect();
    Node::array(items)
}

fn broadcast(op: BinaryOp, arr: &Array, scalar: &Node, scalar_left: bool) -> Node {
    let items = arr
        .items()
        .iter()
        .map(|x| {
            if scalar_left {
                binary_or_symbolic(op, scalar, x)
            } else {
                binary_or_symbolic(op, x, scalar)
            }
        })
        .collect();
    Node::array(items)
}

fn dot(a: &Array, b: &Array) -> Node {
    if a.len() != b.len() {
        return size_fault(a.len(), b.len());
    }
    let mut acc = Node::Int(0);
    for (x, y) in a.items().iter().zip(b.items()) {
        let p = binary_or_symbolic(BinaryOp::Mul, x, y);
        acc = binary_or_symbolic(BinaryOp::Add, &acc, &p);
    }
    acc
}

fn cross(a: &Array, b: &Array) -> Node {
    if a.len() != 3 || b.len() != 3 {
        return size_fault(a.len(), b.len());
    }
    let (x, y) = (a.items(), b.items());
    let part = |i: usize, j: usize| {
        let l = binary_or_symbolic(BinaryOp::Mul, &x[i], &y[j]);
        let r = binary_or_symbolic(BinaryOp::Mul, &x[j], &y[i]);
        binary_or_symbolic(BinaryOp::Sub, &l, &r)
    };
    Node::array(vec![part(1, 2), part(2, 0), part(0, 1)])
}

/// Rows of a rectangular matrix given as an array of arrays
fn rows(a: &Array) -> Option<Vec<&[Node]>> {
    let mut rows = Vec::with_capacity(a.len());
    for item in a.items() {
        match item {
            Node::Array(row) => rows.push(row.items()),
            _ => return None,
        }
    }
    let width = rows.first().map_or(0, |r| r.len());
    if rows.iter().any(|r| r.len() != width) {
        return None;
    }
    Some(rows)
}

fn mat_mul(a: &Array, b: &Array) -> Option<Node> {
    let (ra, rb) = (rows(a)?, rows(b)?);
    let inner = ra.first().map_or(0, |r| r.len());
    if inner != rb.len() {
        return Some(size_fault(inner, rb.len()));
    }
    let width = rb.first().map_or(0, |r| r.len());
    let mut out = Vec::with_capacity(ra.len());
    for row in &ra {
        let mut cells = Vec::with_capacity(width);
        for col in 0..width {
            let mut acc = Node::Int(0);
            for (k, x) in row.iter().enumerate() {
                let p = binary_or_symbolic(BinaryOp::Mul, x, &rb[k][col]);
                acc = binary_or_symbolic(BinaryOp::Add, &acc, &p);
            }
            cells.push(acc);
        }
        out.push(Node::array(cells));
    }
    Some(Node::array(out))
}

pub(crate) fn transpose(a: &Node) -> Option<Node> {
    match a {
        Node::Array(arr) => match rows(arr) {
            Some(rs) if !rs.is_empty() => {
                let width = rs[0].len();
                let out = (0..width)
                    .map(|c| Node::array(rs.iter().map(|r| r[c].clone()).collect()))
                    .collect();
                Some(Node::array(out))
            }
            _ => Some(Node::array(arr.items().iter().map(|x| Node::array(vec![x.clone()])).collect())),
        },
        _ if a.is_numeric() => Some(a.clone()),
        _ => None,
    }
}

fn element_of(x: &Node, container: &Node) -> Option<bool> {
    if let Node::Placeholder(..) = x {
        return None;
    }
    match container {
        Node::Set(s) => Some(s.contains(x).unwrap_or(false)),
        Node::Array(arr) => {
            let mut unknown = false;
            for item in arr.items() {
                match equals(x, item) {
                    Some(true) => return Some(true),
                    Some(false) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                None
            } else {
                Some(false)
            }
        }
        _ => None,
    }
}

fn subset(a: &Node, b: &Node) -> Option<bool> {
    match (a, b) {
        (Node::Set(x), Node::Set(y)) => Some(x.is_subset_of(*y)),
        (Node::Array(arr), _) => {
            for item in arr.items() {
                if !element_of(item, b)? {
                    return Some(false);
                }
            }
            Some(true)
        }
        _ => None,
    }
}

/// Applies a binary operator to evaluated operands. `None` means the
/// operator does not apply to them.
pub(crate) fn apply_binary(op: BinaryOp, a: &Node, b: &Node) -> Option<Node> {
    match (op, a, b) {
        (BinaryOp::Add, Node::Array(x), Node::Array(y))
        | (BinaryOp::Sub, Node::Array(x), Node::Array(y))
        | (BinaryOp::Mul, Node::Array(x), Node::Array(y)) => return Some(elementwise(op, x, y)),
        (BinaryOp::Mul, Node::Array(x), s) | (BinaryOp::Div, Node::Array(x), s) if s.is_numeric() => {
            return Some(broadcast(op, x, s, false))
        }
        (BinaryOp::Mul, s, Node::Array(x)) if s.is_numeric() => return Some(broadcast(op, x, s, true)),
        (BinaryOp::Dot, Node::Array(x), Node::Array(y)) => return Some(dot(x, y)),
        (BinaryOp::Cross, Node::Array(x), Node::Array(y)) => return Some(cross(x, y)),
        (BinaryOp::MatMul, Node::Array(x), Node::Array(y)) => return mat_mul(x, y),
        _ => {}
    }
    match op {
        BinaryOp::Add => add(a, b),
        BinaryOp::Sub => sub(a, b),
        BinaryOp::Mul | BinaryOp::Dot | BinaryOp::MatMul => mul(a, b),
        BinaryOp::Div => div(a, b),
        BinaryOp::Rem => rem(a, b),
        BinaryOp::Pow => pow(a, b),
        BinaryOp::And => and(a, b),
        BinaryOp::Or => or(a, b),
        BinaryOp::Concat => concat(a, b),
        BinaryOp::Eq => equals(a, b).map(Node::Bool),
        BinaryOp::NotEq => equals(a, b).map(|e| Node::Bool(!e)),
        BinaryOp::Less => compare(a, b).map(|o| Node::Bool(o == Ordering::Less)),
        BinaryOp::Greater => compare(a, b).map(|o| Node::Bool(o == Ordering::Greater)),
        BinaryOp::LessEq => compare(a, b).map(|o| Node::Bool(o != Ordering::Greater)),
        BinaryOp::GreaterEq => compare(a, b).map(|o| Node::Bool(o != Ordering::Less)),
        BinaryOp::ElementOf => element_of(a, b).map(Node::Bool),
        BinaryOp::NotElementOf => element_of(a, b).map(|e| Node::Bool(!e)),
        BinaryOp::Subset => subset(a, b).map(Node::Bool),
        BinaryOp::NotSubset => subset(a, b).map(|e| Node::Bool(!e)),
        BinaryOp::Cross => None,
        BinaryOp::Then => Some(b.clone()),
    }
}

pub(crate) fn apply_unary(op: UnaryOp, a: &Node) -> Option<Node> {
    match op {
        UnaryOp::Negate => neg(a),
        UnaryOp::Not => not(a),
        UnaryOp::Transpose => transpose(a),
        UnaryOp::Factorial => factorial(a),
    }
}

/// Result for operands an operator could not combine: a fault operand
/// wins, then NaN, otherwise the node is kept in symbolic form
pub(crate) fn fallback(operands: &[&Node]) -> Option<Node> {
    if let Some(f) = operands.iter().find(|n| n.is_fault()) {
        return Some((*f).clone());
    }
    if operands.iter().any(|n| n.is_nan()) {
        return Some(Node::Float(f64::NAN));
    }
    None
}

pub(crate) fn binary_or_symbolic(op: BinaryOp, a: &Node, b: &Node) -> Node {
    apply_binary(op, a, b)
        .or_else(|| fallback(&[a, b]))
        .unwrap_or_else(|| Node::binary(op, a.clone(), b.clone()))
}

pub(crate) fn unary_or_symbolic(op: UnaryOp, a: &Node) -> Node {
    apply_unary(op, a)
        .or_else(|| fallback(&[a]))
        .unwrap_or_else(|| Node::unary(op, a.clone()))
}
