//! Fixed table of named functions and their leaf math.
//!
//! The compiler resolves `name(args)` through this table by name and
//! argument count. Functions with side effects or lazy arguments (`if`,
//! `while`, `for`, `rand`, `compile`, `program`, `delete`) are evaluated by
//! the caller; everything else is a pure function of evaluated arguments.

use lazy_static::lazy_static;
use num_complex::{Complex, Complex64};
use num_integer::Integer;
use num_rational::Rational64;
use num_traits::Zero;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::sync::Arc;
use tracing::debug;

use crate::intern::{intern, Name};
use crate::node::*;
use crate::parse::is_identifier;
use crate::render::Dialect;
use crate::value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Rand,
    Abs,
    Arg,
    Conjugate,
    Real,
    Imag,
    Sqrt,
    Cbrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Round,
    Sign,
    Int,
    Float,
    String,
    Char,
    /// smallest element of an array
    MinOf,
    /// largest element of an array
    MaxOf,
    Sum,
    Sort,
    Transpose,
    Size,
    Compile,
    Program,
    Delete,
    Atan2,
    Gcd,
    Lcm,
    Min,
    Max,
    Ncr,
    While,
    If,
    For,
}

lazy_static! {
    static ref FUNCS: Vec<(&'static str, usize, Func)> = vec![
        ("rand", 0, Func::Rand),
        ("abs", 1, Func::Abs),
        ("arg", 1, Func::Arg),
        ("conjugate", 1, Func::Conjugate),
        ("real", 1, Func::Real),
        ("imag", 1, Func::Imag),
        ("sqrt", 1, Func::Sqrt),
        ("cbrt", 1, Func::Cbrt),
        ("exp", 1, Func::Exp),
        ("log", 1, Func::Log),
        ("sin", 1, Func::Sin),
        ("cos", 1, Func::Cos),
        ("tan", 1, Func::Tan),
        ("asin", 1, Func::Asin),
        ("acos", 1, Func::Acos),
        ("atan", 1, Func::Atan),
        ("sinh", 1, Func::Sinh),
        ("cosh", 1, Func::Cosh),
        ("tanh", 1, Func::Tanh),
        ("round", 1, Func::Round),
        ("sign", 1, Func::Sign),
        ("int", 1, Func::Int),
        ("float", 1, Func::Float),
        ("string", 1, Func::String),
        ("char", 1, Func::Char),
        ("min", 1, Func::MinOf),
        ("max", 1, Func::MaxOf),
        ("sum", 1, Func::Sum),
        ("sort", 1, Func::Sort),
        ("transpose", 1, Func::Transpose),
        ("size", 1, Func::Size),
        ("compile", 1, Func::Compile),
        ("program", 1, Func::Program),
        ("delete", 1, Func::Delete),
        ("atan2", 2, Func::Atan2),
        ("gcd", 2, Func::Gcd),
        ("lcm", 2, Func::Lcm),
        ("min", 2, Func::Min),
        ("max", 2, Func::Max),
        ("ncr", 2, Func::Ncr),
        ("while", 2, Func::While),
        ("if", 3, Func::If),
        ("for", 4, Func::For),
    ];
}

/// Host callback reachable from expressions as `name()`
pub type ProgramFn = Arc<dyn Fn() -> bool + Send + Sync>;

lazy_static! {
    static ref PROGRAM_FUNCS: RwLock<FxHashMap<Name, ProgramFn>> = RwLock::new(FxHashMap::default());
}

/// Makes `name()` call `f` when evaluated. Built-in names and invalid
/// identifiers are refused. Expressions compiled before the call keep
/// treating `name()` as a user function.
pub fn register_program_function<F>(name: &str, f: F) -> bool
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    if !is_identifier(name) || is_builtin(name) {
        return false;
    }
    debug!(target: "calcscript::funcs", "program function {}", name);
    PROGRAM_FUNCS.write().insert(intern(name), Arc::new(f));
    true
}

pub fn unregister_program_function(name: &str) -> bool {
    PROGRAM_FUNCS.write().remove(&intern(name)).is_some()
}

pub fn is_program_function(name: Name) -> bool {
    PROGRAM_FUNCS.read().contains_key(&name)
}

/// Runs the callback outside the lock, `None` if it is not registered
pub(crate) fn run_program_function(name: Name) -> Option<bool> {
    let f = PROGRAM_FUNCS.read().get(&name).cloned()?;
    Some(f())
}

/// Function registered under `name` that takes `arity` arguments
pub fn lookup(name: &str, arity: usize) -> Option<Func> {
    FUNCS
        .iter()
        .find(|(n, a, _)| *n == name && *a == arity)
        .map(|(_, _, f)| *f)
}

/// True if `name` is taken by a built-in function of any arity
pub fn is_builtin(name: &str) -> bool {
    FUNCS.iter().any(|(n, _, _)| *n == name)
}

impl Func {
    pub fn name(self) -> &'static str {
        FUNCS.iter().find(|(_, _, f)| *f == self).map_or("", |(n, _, _)| *n)
    }

    pub fn arity(self) -> usize {
        FUNCS.iter().find(|(_, _, f)| *f == self).map_or(0, |(_, a, _)| *a)
    }

    /// True for functions whose arguments are evaluated by the function
    /// itself
    pub(crate) fn is_lazy(self) -> bool {
        matches!(self, Func::If | Func::While | Func::For | Func::Delete)
    }
}

/// Real function with a complex continuation outside its real domain
fn real_or_complex(
    x: &Node,
    real: fn(f64) -> f64,
    cx: fn(Complex64) -> Complex64,
    domain: fn(f64) -> bool,
) -> Option<Node> {
    if x.is_real() {
        let f = x.to_f64()?;
        if domain(f) || f.is_nan() {
            return Some(Node::Float(real(f)));
        }
        return Some(Node::from_complex_float(cx(Complex::new(f, 0.0))));
    }
    if x.is_complex() {
        return Some(Node::from_complex_float(cx(x.to_complex_f64()?)));
    }
    None
}

fn any(_: f64) -> bool {
    true
}

fn non_negative(f: f64) -> bool {
    f >= 0.0
}

fn unit_range(f: f64) -> bool {
    (-1.0..=1.0).contains(&f)
}

fn exact_root(v: i64, degree: u32) -> Option<i64> {
    if v < 0 {
        return None;
    }
    let guess = (v as f64).powf(1.0 / f64::from(degree)).round() as i64;
    [guess - 1, guess, guess + 1]
        .iter()
        .copied()
        .find(|&c| c >= 0 && c.checked_pow(degree) == Some(v))
}

fn sqrt(x: &Node) -> Option<Node> {
    if let Some(r) = x.to_ratio() {
        let negative = *r.numer() < 0;
        if let Some(n) = r.numer().checked_abs() {
            if let (Some(sn), Some(sd)) = (exact_root(n, 2), exact_root(*r.denom(), 2)) {
                let root = Rational64::new(sn, sd);
                if negative {
                    return Some(Node::from_complex_ratio(Complex::new(Rational64::zero(), root)));
                }
                return Some(Node::from_ratio(root));
            }
        }
    }
    if x.is_real() {
        let f = x.to_f64()?;
        if f < 0.0 {
            return Some(Node::from_complex_float(Complex::new(0.0, (-f).sqrt())));
        }
        return Some(Node::Float(f.sqrt()));
    }
    Some(Node::from_complex_float(x.to_complex_f64()?.sqrt()))
}

fn cbrt(x: &Node) -> Option<Node> {
    if let Node::Int(i) = x {
        let root = i.checked_abs().and_then(|a| exact_root(a, 3));
        if let Some(r) = root {
            return Some(Node::Int(if *i < 0 { -r } else { r }));
        }
    }
    if x.is_real() {
        return Some(Node::Float(x.to_f64()?.cbrt()));
    }
    Some(Node::from_complex_float(x.to_complex_f64()?.powf(1.0 / 3.0)))
}

fn abs(x: &Node) -> Option<Node> {
    match x {
        Node::Int(..) | Node::Ratio(..) | Node::Float(..) => {
            if x.signum() == Some(-1) {
                value::neg(x)
            } else {
                Some(x.clone())
            }
        }
        _ if x.is_complex() => Some(Node::Float(x.to_complex_f64()?.norm())),
        _ => None,
    }
}

fn conjugate(x: &Node) -> Option<Node> {
    let n = match x {
        Node::ComplexInt(c) => Node::ComplexInt(c.conj()),
        Node::ComplexRatio(c) => Node::ComplexRatio(c.conj()),
        Node::ComplexFloat(c) => Node::ComplexFloat(c.conj()),
        _ if x.is_real() => x.clone(),
        _ => return None,
    };
    Some(n)
}

fn real_part(x: &Node, imag: bool) -> Option<Node> {
    let (re, im) = match x {
        Node::ComplexInt(c) => (Node::Int(c.re), Node::Int(c.im)),
        Node::ComplexRatio(c) => (Node::from_ratio(c.re), Node::from_ratio(c.im)),
        Node::ComplexFloat(c) => (Node::Float(c.re), Node::Float(c.im)),
        _ if x.is_real() => (x.clone(), Node::Int(0)),
        _ => return None,
    };
    Some(if imag { im } else { re })
}

/// Integer node when the double holds an integral value that fits
fn integral_or_float(f: f64) -> Node {
    match Node::Float(f).as_integral() {
        Some(i) => Node::Int(i),
        None => Node::Float(f),
    }
}

fn round(x: &Node) -> Option<Node> {
    match x {
        Node::Int(..) => Some(x.clone()),
        Node::Ratio(r) => Some(Node::Int(r.round().to_integer())),
        Node::Float(f) => Some(integral_or_float(f.round())),
        _ => None,
    }
}

fn truncate(x: &Node) -> Option<Node> {
    match x {
        Node::Int(..) => Some(x.clone()),
        Node::Ratio(r) => Some(Node::Int(r.trunc().to_integer())),
        Node::Float(f) => Some(integral_or_float(f.trunc())),
        Node::Bool(b) => Some(Node::Int(*b as i64)),
        Node::Char(c) => Some(Node::Int(*c as i64)),
        Node::Str(s) => s.trim().parse::<i64>().ok().map(Node::Int),
        _ => None,
    }
}

fn to_float(x: &Node) -> Option<Node> {
    match x {
        Node::Str(s) => s.trim().parse::<f64>().ok().map(Node::Float),
        _ if x.is_real() => Some(Node::Float(x.to_f64()?)),
        _ if x.is_complex() => Some(Node::ComplexFloat(x.to_complex_f64()?)),
        _ => None,
    }
}

fn sign(x: &Node) -> Option<Node> {
    if let Some(s) = x.signum() {
        return Some(Node::Int(i64::from(s)));
    }
    if x.is_complex() {
        let c = x.to_complex_f64()?;
        return Some(Node::from_complex_float(c / c.norm()));
    }
    None
}

fn to_char(x: &Node) -> Option<Node> {
    match x {
        Node::Char(..) => Some(x.clone()),
        Node::Int(i) => u32::try_from(*i).ok().and_then(std::char::from_u32).map(Node::Char),
        Node::Str(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Node::Char(c)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn extreme(items: &[Node], wanted: Ordering) -> Option<Node> {
    let mut best = items.first()?;
    for item in &items[1..] {
        if value::compare(item, best)? == wanted {
            best = item;
        }
    }
    Some(best.clone())
}

fn sort(arr: &Array) -> Option<Node> {
    let items = arr.items();
    // every pair must be comparable before sort_by may rely on it
    for w in items.windows(2) {
        value::compare(&w[0], &w[1])?;
    }
    if let Some(first) = items.first() {
        for item in items {
            value::compare(first, item)?;
        }
    }
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| value::compare(a, b).unwrap_or(Ordering::Equal));
    Some(Node::array(sorted))
}

fn size(x: &Node) -> Option<Node> {
    let n = match x {
        Node::Array(a) => a.len(),
        Node::Map(m) => m.len(),
        Node::Str(s) => s.chars().count(),
        _ => return None,
    };
    Some(Node::Int(n as i64))
}

fn gcd_lcm(a: &Node, b: &Node, lcm: bool) -> Option<Node> {
    let (x, y) = (a.as_integral()?, b.as_integral()?);
    if x == i64::MIN || y == i64::MIN {
        return None;
    }
    if !lcm {
        return Some(Node::Int(x.gcd(&y)));
    }
    if x == 0 || y == 0 {
        return Some(Node::Int(0));
    }
    let g = x.gcd(&y);
    match (x / g).checked_mul(y).and_then(i64::checked_abs) {
        Some(v) => Some(Node::Int(v)),
        None => Some(Node::Float((x as f64 / g as f64 * y as f64).abs())),
    }
}

/// Binomial coefficient, exact while it fits into 64 bits
fn ncr(n: &Node, k: &Node) -> Option<Node> {
    let (n, k) = (n.as_integral()?, k.as_integral()?);
    if n < 0 || k < 0 || k > n {
        return Some(Node::Int(0));
    }
    let k = k.min(n - k);
    let mut acc = 1i64;
    for i in 1..=k {
        // acc * (n - k + i) is always divisible by i
        match acc.checked_mul(n - k + i) {
            Some(v) => acc = v / i,
            None => {
                // every factor is at least 2, so f leaves the finite range fast
                let mut f = acc as f64;
                let mut j = i;
                while j <= k && f.is_finite() {
                    f = f * (n - k + j) as f64 / j as f64;
                    j += 1;
                }
                return Some(Node::Float(f.round()));
            }
        }
    }
    Some(Node::Int(acc))
}

/// Applies a pure function to evaluated arguments. `None` means the
/// function does not apply to them (yet).
pub(crate) fn apply(func: Func, args: &[Node]) -> Option<Node> {
    match (func, args) {
        (Func::Abs, [x]) => abs(x),
        (Func::Arg, [x]) => {
            if let Some(s) = x.signum() {
                return Some(if s < 0 { Node::Float(std::f64::consts::PI) } else { Node::Int(0) });
            }
            x.to_complex_f64().map(|c| Node::Float(c.arg()))
        }
        (Func::Conjugate, [x]) => conjugate(x),
        (Func::Real, [x]) => real_part(x, false),
        (Func::Imag, [x]) => real_part(x, true),
        (Func::Sqrt, [x]) => sqrt(x),
        (Func::Cbrt, [x]) => cbrt(x),
        (Func::Exp, [x]) => real_or_complex(x, f64::exp, Complex64::exp, any),
        (Func::Log, [x]) => real_or_complex(x, f64::ln, Complex64::ln, non_negative),
        (Func::Sin, [x]) => real_or_complex(x, f64::sin, Complex64::sin, any),
        (Func::Cos, [x]) => real_or_complex(x, f64::cos, Complex64::cos, any),
        (Func::Tan, [x]) => real_or_complex(x, f64::tan, Complex64::tan, any),
        (Func::Asin, [x]) => real_or_complex(x, f64::asin, Complex64::asin, unit_range),
        (Func::Acos, [x]) => real_or_complex(x, f64::acos, Complex64::acos, unit_range),
        (Func::Atan, [x]) => real_or_complex(x, f64::atan, Complex64::atan, any),
        (Func::Sinh, [x]) => real_or_complex(x, f64::sinh, Complex64::sinh, any),
        (Func::Cosh, [x]) => real_or_complex(x, f64::cosh, Complex64::cosh, any),
        (Func::Tanh, [x]) => real_or_complex(x, f64::tanh, Complex64::tanh, any),
        (Func::Round, [x]) => round(x),
        (Func::Sign, [x]) => sign(x),
        (Func::Int, [x]) => truncate(x),
        (Func::Float, [x]) => to_float(x),
        (Func::String, [x]) => match x {
            Node::Str(..) => Some(x.clone()),
            Node::Placeholder(..) => None,
            _ if x.is_primitive() => Some(Node::from(x.render(Dialect::Internal).as_str())),
            _ => None,
        },
        (Func::Char, [x]) => to_char(x),
        (Func::MinOf, [Node::Array(a)]) => extreme(a.items(), Ordering::Less),
        (Func::MaxOf, [Node::Array(a)]) => extreme(a.items(), Ordering::Greater),
        (Func::Sum, [Node::Array(a)]) => {
            let mut acc = Node::Int(0);
            for item in a.items() {
                acc = value::binary_or_symbolic(BinaryOp::Add, &acc, item);
            }
            Some(acc)
        }
        (Func::Sort, [Node::Array(a)]) => sort(a),
        (Func::Transpose, [x]) => value::transpose(x),
        (Func::Size, [x]) => size(x),
        (Func::Atan2, [y, x]) if y.is_real() && x.is_real() => Some(Node::Float(y.to_f64()?.atan2(x.to_f64()?))),
        (Func::Gcd, [a, b]) => gcd_lcm(a, b, false),
        (Func::Lcm, [a, b]) => gcd_lcm(a, b, true),
        (Func::Min, [a, b]) => extreme(&[a.clone(), b.clone()], Ordering::Less),
        (Func::Max, [a, b]) => extreme(&[a.clone(), b.clone()], Ordering::Greater),
        (Func::Ncr, [n, k]) => ncr(n, k),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(func: Func, args: &[Node]) -> Option<Node> {
        apply(func, args)
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("sin", 1), Some(Func::Sin));
        assert_eq!(lookup("min", 1), Some(Func::MinOf));
        assert_eq!(lookup("min", 2), Some(Func::Min));
        assert_eq!(lookup("sin", 2), None);
        assert_eq!(lookup("nosuch", 1), None);
        assert_eq!(Func::For.arity(), 4);
        assert_eq!(Func::MaxOf.name(), "max");
        assert!(is_builtin("while"));
        assert!(!is_builtin("nosuch"));
    }

    #[test]
    fn test_program_functions() {
        assert!(!register_program_function("sin", || true));
        assert!(!register_program_function("1x", || true));
        assert!(register_program_function("funcs_ready", || true));
        assert!(is_program_function(intern("funcs_ready")));
        assert_eq!(run_program_function(intern("funcs_ready")), Some(true));
        assert!(unregister_program_function("funcs_ready"));
        assert!(!unregister_program_function("funcs_ready"));
        assert_eq!(run_program_function(intern("funcs_ready")), None);
    }

    #[test]
    fn test_roots() {
        assert_eq!(call(Func::Sqrt, &[Node::Int(16)]), Some(Node::Int(4)));
        assert_eq!(
            call(Func::Sqrt, &[Node::Ratio(Rational64::new(4, 9))]),
            Some(Node::Ratio(Rational64::new(2, 3)))
        );
        assert_eq!(call(Func::Sqrt, &[Node::Int(-4)]), Some(Node::ComplexInt(Complex::new(0, 2))));
        assert_eq!(call(Func::Sqrt, &[Node::Float(2.25)]), Some(Node::Float(1.5)));
        assert_eq!(call(Func::Sqrt, &[Node::Int(2)]), Some(Node::Float(2f64.sqrt())));
        assert_eq!(call(Func::Cbrt, &[Node::Int(-27)]), Some(Node::Int(-3)));
    }

    #[test]
    fn test_math() {
        assert_eq!(call(Func::Abs, &[Node::Int(-3)]), Some(Node::Int(3)));
        assert_eq!(call(Func::Abs, &[Node::ComplexInt(Complex::new(3, 4))]), Some(Node::Float(5.0)));
        assert_eq!(call(Func::Sin, &[Node::Int(0)]), Some(Node::Float(0.0)));
        assert_eq!(call(Func::Exp, &[Node::Int(0)]), Some(Node::Float(1.0)));
        assert!(call(Func::Log, &[Node::Int(-1)]).map_or(false, |n| n.is_complex()));
        assert_eq!(call(Func::Round, &[Node::Float(2.6)]), Some(Node::Int(3)));
        assert_eq!(call(Func::Int, &[Node::Ratio(Rational64::new(-7, 2))]), Some(Node::Int(-3)));
        assert_eq!(call(Func::Int, &[Node::from("42")]), Some(Node::Int(42)));
        assert_eq!(call(Func::Sign, &[Node::Float(-0.5)]), Some(Node::Int(-1)));
        assert_eq!(
            call(Func::Conjugate, &[Node::ComplexInt(Complex::new(1, 2))]),
            Some(Node::ComplexInt(Complex::new(1, -2)))
        );
        assert_eq!(call(Func::Imag, &[Node::ComplexInt(Complex::new(1, 2))]), Some(Node::Int(2)));
        assert_eq!(call(Func::Sin, &[Node::from("x")]), None);
    }

    #[test]
    fn test_integers() {
        assert_eq!(call(Func::Gcd, &[Node::Int(12), Node::Int(18)]), Some(Node::Int(6)));
        assert_eq!(call(Func::Lcm, &[Node::Int(4), Node::Int(6)]), Some(Node::Int(12)));
        assert_eq!(call(Func::Ncr, &[Node::Int(5), Node::Int(2)]), Some(Node::Int(10)));
        assert_eq!(call(Func::Ncr, &[Node::Int(60), Node::Int(30)]), Some(Node::Int(118_264_581_564_861_424)));
        assert_eq!(call(Func::Ncr, &[Node::Int(3), Node::Int(5)]), Some(Node::Int(0)));
        assert_eq!(
            call(Func::Ncr, &[Node::Int(1_000_000_000_000), Node::Int(500_000_000_000)]),
            Some(Node::Float(f64::INFINITY))
        );
        match call(Func::Ncr, &[Node::Int(1000), Node::Int(500)]) {
            Some(Node::Float(f)) => assert!(f.is_finite() && f > 1e299),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_arrays() {
        let arr = Node::array(vec![Node::Int(3), Node::Float(1.5), Node::Int(2)]);
        assert_eq!(call(Func::MinOf, &[arr.clone()]), Some(Node::Float(1.5)));
        assert_eq!(call(Func::MaxOf, &[arr.clone()]), Some(Node::Int(3)));
        assert_eq!(call(Func::Sum, &[arr.clone()]), Some(Node::Float(6.5)));
        assert_eq!(
            call(Func::Sort, &[arr.clone()]),
            Some(Node::array(vec![Node::Float(1.5), Node::Int(2), Node::Int(3)]))
        );
        assert_eq!(call(Func::Size, &[arr]), Some(Node::Int(3)));
        assert_eq!(call(Func::Size, &[Node::from("héllo")]), Some(Node::Int(5)));
        assert_eq!(call(Func::String, &[Node::Int(5)]), Some(Node::from("5")));
        assert_eq!(call(Func::Char, &[Node::Int(65)]), Some(Node::Char('A')));
    }
}
