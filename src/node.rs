use num_complex::{Complex, Complex64};
use num_rational::Rational64;
use num_traits::{Signed, Zero};
use std::fmt;
use std::rc::Rc;

use crate::errors::*;
use crate::funcs::Func;
use crate::intern::Name;
use crate::program::Script;

/// Named mathematical sets. They hold no children and only answer
/// membership questions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberSet {
    /// ℕ: positive integers
    Natural,
    /// ℤ
    Integer,
    /// ℚ
    Rational,
    /// ℝ: finite reals
    Real,
    /// ℂ: any finite number
    Complex,
    /// ℙ
    Prime,
    /// ℱ: Fibonacci numbers
    Fibonacci,
}

impl NumberSet {
    pub fn symbol(self) -> char {
        match self {
            NumberSet::Natural => 'ℕ',
            NumberSet::Integer => 'ℤ',
            NumberSet::Rational => 'ℚ',
            NumberSet::Real => 'ℝ',
            NumberSet::Complex => 'ℂ',
            NumberSet::Prime => 'ℙ',
            NumberSet::Fibonacci => 'ℱ',
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        let s = match c {
            'ℕ' => NumberSet::Natural,
            'ℤ' => NumberSet::Integer,
            'ℚ' => NumberSet::Rational,
            'ℝ' => NumberSet::Real,
            'ℂ' => NumberSet::Complex,
            'ℙ' => NumberSet::Prime,
            'ℱ' => NumberSet::Fibonacci,
            _ => return None,
        };
        Some(s)
    }

    /// Membership test. `None` means the question does not apply to the
    /// node (it is not a number).
    pub fn contains(self, node: &Node) -> Option<bool> {
        if !node.is_numeric() {
            return None;
        }
        let integral = node.as_integral();
        let res = match self {
            NumberSet::Natural => integral.map_or(false, |i| i > 0),
            NumberSet::Integer => integral.is_some(),
            NumberSet::Rational => match node {
                Node::Int(..) | Node::Ratio(..) => true,
                Node::Float(f) => f.is_finite() && f.fract() == 0.0,
                _ => false,
            },
            NumberSet::Real => node.is_real() && !node.is_nan() && node.to_f64().map_or(false, f64::is_finite),
            NumberSet::Complex => !node.is_nan() && node.to_complex_f64().map_or(false, |c| c.re.is_finite() && c.im.is_finite()),
            NumberSet::Prime => integral.map_or(false, is_prime),
            NumberSet::Fibonacci => integral.map_or(false, is_fibonacci),
        };
        Some(res)
    }

    /// Inclusion between sets: ℙ ⊆ ℕ ⊆ ℤ ⊆ ℚ ⊆ ℝ ⊆ ℂ and ℱ ⊆ ℤ
    pub fn is_subset_of(self, other: NumberSet) -> bool {
        fn level(s: NumberSet) -> u8 {
            match s {
                NumberSet::Prime => 0,
                NumberSet::Natural => 1,
                NumberSet::Fibonacci => 1,
                NumberSet::Integer => 2,
                NumberSet::Rational => 3,
                NumberSet::Real => 4,
                NumberSet::Complex => 5,
            }
        }
        if self == other {
            return true;
        }
        match (self, other) {
            (NumberSet::Fibonacci, NumberSet::Natural)
            | (NumberSet::Natural, NumberSet::Fibonacci)
            | (NumberSet::Prime, NumberSet::Fibonacci) => false,
            _ => level(self) < level(other),
        }
    }
}

/// Naive trial division, good enough for 64-bit values
pub(crate) fn is_prime(v: i64) -> bool {
    if v <= 1 {
        return false;
    }
    if v < 4 {
        return true;
    }
    if v % 2 == 0 {
        return false;
    }
    let mut curr = 3i64;
    while curr <= v / curr {
        if v % curr == 0 {
            return false;
        }
        curr += 2;
    }
    true
}

pub(crate) fn is_fibonacci(v: i64) -> bool {
    if v < 0 {
        return false;
    }
    let (mut a, mut b) = (0i64, 1i64);
    while a < v {
        let next = match a.checked_add(b) {
            Some(n) => n,
            None => return false,
        };
        a = b;
        b = next;
    }
    a == v
}

/// Discriminant of a runtime fault
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    OutOfBounds,
    NotAnArray,
    /// condition is neither true nor false
    Condition,
    /// cancelled through the controller
    Stopped,
    OnlyVariables,
    Arity,
    Incompatible,
    Compile,
    /// user functions or stored expressions nested too deeply
    Recursion,
}

/// Recoverable runtime error carried as a value
#[derive(Clone, Debug, PartialEq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: Rc<str>,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub(crate) const PRIO_THEN: u8 = 0;
pub(crate) const PRIO_ASSIGN: u8 = 1;
pub(crate) const PRIO_LOGIC: u8 = 2;
pub(crate) const PRIO_EQ: u8 = 3;
pub(crate) const PRIO_CMP: u8 = 4;
pub(crate) const PRIO_ADD: u8 = 5;
pub(crate) const PRIO_MUL: u8 = 6;
pub(crate) const PRIO_POW: u8 = 7;
pub(crate) const PRIO_TRANSPOSE: u8 = 8;
pub(crate) const PRIO_NOT: u8 = 9;
/// literals, names, calls and postfix forms
pub(crate) const PRIO_ATOM: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    Transpose,
    Factorial,
}

impl UnaryOp {
    pub fn priority(self) -> u8 {
        match self {
            UnaryOp::Negate => PRIO_ADD,
            UnaryOp::Not => PRIO_NOT,
            UnaryOp::Transpose => PRIO_TRANSPOSE,
            UnaryOp::Factorial => PRIO_ATOM,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    /// `a;b`
    Then,
    And,
    Or,
    Eq,
    NotEq,
    ElementOf,
    NotElementOf,
    Subset,
    NotSubset,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Add,
    Sub,
    Concat,
    /// scalar product `⁕`
    Dot,
    /// matrix product `•`
    MatMul,
    /// cross product `✖`
    Cross,
    Mul,
    Div,
    Rem,
    Pow,
}

lazy_static::lazy_static! {
    static ref BINARY_OPS: Vec<(char, BinaryOp)> = [
        (';', BinaryOp::Then),
        ('˄', BinaryOp::And),
        ('˅', BinaryOp::Or),
        ('=', BinaryOp::Eq),
        ('≠', BinaryOp::NotEq),
        ('∈', BinaryOp::ElementOf),
        ('∉', BinaryOp::NotElementOf),
        ('⊆', BinaryOp::Subset),
        ('⊈', BinaryOp::NotSubset),
        ('<', BinaryOp::Less),
        ('>', BinaryOp::Greater),
        ('≤', BinaryOp::LessEq),
        ('≥', BinaryOp::GreaterEq),
        ('+', BinaryOp::Add),
        ('-', BinaryOp::Sub),
        ('◦', BinaryOp::Concat),
        ('⁕', BinaryOp::Dot),
        ('•', BinaryOp::MatMul),
        ('✖', BinaryOp::Cross),
        ('*', BinaryOp::Mul),
        ('/', BinaryOp::Div),
        ('%', BinaryOp::Rem),
        ('^', BinaryOp::Pow),
    ]
    .to_vec();
}

impl BinaryOp {
    pub fn from_char(c: char) -> Option<Self> {
        BINARY_OPS.iter().find(|(ch, _)| *ch == c).map(|(_, op)| *op)
    }

    pub fn symbol(self) -> char {
        BINARY_OPS.iter().find(|(_, op)| *op == self).map_or('?', |(ch, _)| *ch)
    }

    pub fn priority(self) -> u8 {
        match self {
            BinaryOp::Then => PRIO_THEN,
            BinaryOp::And | BinaryOp::Or => PRIO_LOGIC,
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::ElementOf
            | BinaryOp::NotElementOf
            | BinaryOp::Subset
            | BinaryOp::NotSubset => PRIO_EQ,
            BinaryOp::Less | BinaryOp::Greater | BinaryOp::LessEq | BinaryOp::GreaterEq => PRIO_CMP,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Concat => PRIO_ADD,
            BinaryOp::Dot | BinaryOp::MatMul | BinaryOp::Cross | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                PRIO_MUL
            }
            BinaryOp::Pow => PRIO_POW,
        }
    }
}

/// Ordered children of an array node. The count of non-primitive children
/// lets evaluation skip arrays that are already values.
#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    items: Vec<Node>,
    non_primitive: usize,
}

impl Array {
    pub fn new(items: Vec<Node>) -> Self {
        let non_primitive = items.iter().filter(|n| !n.is_primitive()).count();
        Array { items, non_primitive }
    }

    pub fn items(&self) -> &[Node] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_primitive(&self) -> bool {
        self.non_primitive == 0
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut Node> {
        self.items.get_mut(idx)
    }

    /// Replaces a child (or appends when `idx == len`) keeping the counter
    pub(crate) fn put(&mut self, idx: usize, node: Node) {
        if !node.is_primitive() {
            self.non_primitive += 1;
        }
        if idx == self.items.len() {
            self.items.push(node);
        } else {
            if !self.items[idx].is_primitive() {
                self.non_primitive -= 1;
            }
            self.items[idx] = node;
        }
    }

    /// Recounts after children were changed through `get_mut`
    pub(crate) fn refresh(&mut self) {
        self.non_primitive = self.items.iter().filter(|n| !n.is_primitive()).count();
    }
}

/// Map from primitive keys to nodes, in insertion order
#[derive(Clone, Debug, PartialEq, Default)]
pub struct MapNode {
    entries: Vec<(Node, Node)>,
}

impl MapNode {
    pub fn new(entries: Vec<(Node, Node)>) -> Self {
        let mut map = MapNode::default();
        for (k, v) in entries {
            map.insert(k, v);
        }
        map
    }

    pub fn entries(&self) -> &[(Node, Node)] {
        &self.entries
    }

    pub fn get(&self, key: &Node) -> Option<&Node> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub(crate) fn get_mut(&mut self, key: &Node) -> Option<&mut Node> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: Node, value: Node) {
        match self.get_mut(&key) {
            Some(v) => *v = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_primitive(&self) -> bool {
        self.entries.iter().all(|(_, v)| v.is_primitive())
    }
}

/// Expression node. Leaves are values, composites hold their children
/// behind `Rc` so trees are cheap to clone and share.
#[derive(Clone, Debug)]
pub enum Node {
    Int(i64),
    /// always reduced, denominator greater than one
    Ratio(Rational64),
    Float(f64),
    ComplexInt(Complex<i64>),
    ComplexRatio(Complex<Rational64>),
    ComplexFloat(Complex64),
    Bool(bool),
    Char(char),
    Str(Rc<str>),
    Array(Rc<Array>),
    Map(Rc<MapNode>),
    Set(NumberSet),
    Fault(Fault),
    /// reference to a variable
    Var(Name),
    /// unbound variable, produced only on request of the controller
    Placeholder(Name),
    Unary(UnaryOp, Rc<Node>),
    Binary(BinaryOp, Rc<Node>, Rc<Node>),
    /// `target[index]`
    Index(Rc<Node>, Rc<Node>),
    /// `value→target`
    Assign(Rc<Node>, Rc<Node>),
    Call(Func, Rc<[Node]>),
    UserCall(Name, Rc<[Node]>),
    /// `name()` bound to a registered host callback, yields a boolean
    HostCall(Name),
    Program(Rc<Script>),
}

fn float_eq(f1: f64, f2: f64) -> bool {
    f1 == f2 || (f1.is_nan() && f2.is_nan())
}

impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Int(i1), Node::Int(i2)) => i1 == i2,
            (Node::Ratio(r1), Node::Ratio(r2)) => r1 == r2,
            (Node::Float(f1), Node::Float(f2)) => float_eq(*f1, *f2),
            (Node::ComplexInt(c1), Node::ComplexInt(c2)) => c1 == c2,
            (Node::ComplexRatio(c1), Node::ComplexRatio(c2)) => c1 == c2,
            (Node::ComplexFloat(c1), Node::ComplexFloat(c2)) => float_eq(c1.re, c2.re) && float_eq(c1.im, c2.im),
            (Node::Bool(b1), Node::Bool(b2)) => b1 == b2,
            (Node::Char(c1), Node::Char(c2)) => c1 == c2,
            (Node::Str(s1), Node::Str(s2)) => s1 == s2,
            (Node::Array(a1), Node::Array(a2)) => a1.items == a2.items,
            (Node::Map(m1), Node::Map(m2)) => m1 == m2,
            (Node::Set(s1), Node::Set(s2)) => s1 == s2,
            (Node::Fault(f1), Node::Fault(f2)) => f1 == f2,
            (Node::Var(n1), Node::Var(n2)) => n1 == n2,
            (Node::Placeholder(n1), Node::Placeholder(n2)) => n1 == n2,
            (Node::Unary(o1, a1), Node::Unary(o2, a2)) => o1 == o2 && a1 == a2,
            (Node::Binary(o1, a1, b1), Node::Binary(o2, a2, b2)) => o1 == o2 && a1 == a2 && b1 == b2,
            (Node::Index(a1, b1), Node::Index(a2, b2)) => a1 == a2 && b1 == b2,
            (Node::Assign(a1, b1), Node::Assign(a2, b2)) => a1 == a2 && b1 == b2,
            (Node::Call(f1, a1), Node::Call(f2, a2)) => f1 == f2 && a1 == a2,
            (Node::UserCall(n1, a1), Node::UserCall(n2, a2)) => n1 == n2 && a1 == a2,
            (Node::HostCall(n1), Node::HostCall(n2)) => n1 == n2,
            (Node::Program(p1), Node::Program(p2)) => p1 == p2,
            (_, _) => false,
        }
    }
}

impl Default for Node {
    fn default() -> Node {
        Node::Int(0)
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Node {
        Node::Int(i)
    }
}

impl From<f64> for Node {
    fn from(f: f64) -> Node {
        Node::Float(f)
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Node {
        Node::Bool(b)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Node {
        Node::Str(Rc::from(s))
    }
}

impl Node {
    pub fn array(items: Vec<Node>) -> Node {
        Node::Array(Rc::new(Array::new(items)))
    }

    pub fn map(entries: Vec<(Node, Node)>) -> Node {
        Node::Map(Rc::new(MapNode::new(entries)))
    }

    pub fn fault(kind: FaultKind, message: &str) -> Node {
        Node::Fault(Fault {
            kind,
            message: Rc::from(message),
        })
    }

    pub fn unary(op: UnaryOp, a: Node) -> Node {
        Node::Unary(op, Rc::new(a))
    }

    pub fn binary(op: BinaryOp, a: Node, b: Node) -> Node {
        Node::Binary(op, Rc::new(a), Rc::new(b))
    }

    pub fn index(target: Node, idx: Node) -> Node {
        Node::Index(Rc::new(target), Rc::new(idx))
    }

    pub fn assign(value: Node, target: Node) -> Node {
        Node::Assign(Rc::new(value), Rc::new(target))
    }

    pub fn call(func: Func, args: Vec<Node>) -> Node {
        Node::Call(func, Rc::from(args))
    }

    pub fn user_call(name: Name, args: Vec<Node>) -> Node {
        Node::UserCall(name, Rc::from(args))
    }

    /// Exact rational, collapsed to an integer when the denominator is one
    pub fn from_ratio(r: Rational64) -> Node {
        if r.is_integer() {
            Node::Int(r.to_integer())
        } else {
            Node::Ratio(r)
        }
    }

    pub fn from_complex_int(c: Complex<i64>) -> Node {
        if c.im == 0 {
            Node::Int(c.re)
        } else {
            Node::ComplexInt(c)
        }
    }

    pub fn from_complex_ratio(c: Complex<Rational64>) -> Node {
        if c.im.is_zero() {
            Node::from_ratio(c.re)
        } else if c.re.is_integer() && c.im.is_integer() {
            Node::ComplexInt(Complex::new(c.re.to_integer(), c.im.to_integer()))
        } else {
            Node::ComplexRatio(c)
        }
    }

    pub fn from_complex_float(c: Complex64) -> Node {
        if c.im == 0.0 {
            Node::Float(c.re)
        } else {
            Node::ComplexFloat(c)
        }
    }

    // --------------------------------

    /// True if evaluating the node is a no-op that yields the node itself
    pub fn is_primitive(&self) -> bool {
        match self {
            Node::Array(a) => a.is_primitive(),
            Node::Map(m) => m.is_primitive(),
            Node::Var(..)
            | Node::Unary(..)
            | Node::Binary(..)
            | Node::Index(..)
            | Node::Assign(..)
            | Node::Call(..)
            | Node::UserCall(..)
            | Node::HostCall(..)
            | Node::Program(..) => false,
            _ => true,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Node::Int(..)
                | Node::Ratio(..)
                | Node::Float(..)
                | Node::ComplexInt(..)
                | Node::ComplexRatio(..)
                | Node::ComplexFloat(..)
        )
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Node::Int(..) | Node::Ratio(..) | Node::Float(..))
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Node::ComplexInt(..) | Node::ComplexRatio(..) | Node::ComplexFloat(..))
    }

    /// Integer or rational, real or complex
    pub fn is_exact(&self) -> bool {
        matches!(
            self,
            Node::Int(..) | Node::Ratio(..) | Node::ComplexInt(..) | Node::ComplexRatio(..)
        )
    }

    pub fn is_integral(&self) -> bool {
        match self {
            Node::Int(..) => true,
            Node::Float(f) => f.is_finite() && f.fract() == 0.0,
            _ => false,
        }
    }

    /// Integer value of integral nodes that fit into 64 bits
    pub(crate) fn as_integral(&self) -> Option<i64> {
        match self {
            Node::Int(i) => Some(*i),
            Node::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.2e18 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.signum() == Some(1)
    }

    /// Sign of a real number: -1, 0 or 1
    pub fn signum(&self) -> Option<i8> {
        let s = match self {
            Node::Int(i) => i.signum() as i8,
            Node::Ratio(r) => {
                if r.is_positive() {
                    1
                } else if r.is_negative() {
                    -1
                } else {
                    0
                }
            }
            Node::Float(f) => {
                if f.is_nan() {
                    return None;
                }
                if *f > 0.0 {
                    1
                } else if *f < 0.0 {
                    -1
                } else {
                    0
                }
            }
            _ => return None,
        };
        Some(s)
    }

    pub fn is_nan(&self) -> bool {
        match self {
            Node::Float(f) => f.is_nan(),
            Node::ComplexFloat(c) => c.re.is_nan() || c.im.is_nan(),
            _ => false,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Node::Fault(..))
    }

    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            Node::Fault(f) => Some(f.kind),
            _ => None,
        }
    }

    // --------------------------------

    pub fn arity(&self) -> usize {
        match self {
            Node::Array(a) => a.len(),
            Node::Map(m) => m.len() * 2,
            Node::Unary(..) => 1,
            Node::Binary(..) | Node::Index(..) | Node::Assign(..) => 2,
            Node::Call(_, args) | Node::UserCall(_, args) => args.len(),
            _ => 0,
        }
    }

    /// Child by position. Map children alternate key and value.
    pub fn child(&self, idx: usize) -> Option<&Node> {
        match self {
            Node::Array(a) => a.items.get(idx),
            Node::Map(m) => m.entries.get(idx / 2).map(|(k, v)| if idx % 2 == 0 { k } else { v }),
            Node::Unary(_, a) if idx == 0 => Some(&**a),
            Node::Binary(_, a, b) | Node::Index(a, b) | Node::Assign(a, b) => match idx {
                0 => Some(&**a),
                1 => Some(&**b),
                _ => None,
            },
            Node::Call(_, args) | Node::UserCall(_, args) => args.get(idx),
            _ => None,
        }
    }

    pub fn children(&self) -> Vec<Node> {
        (0..self.arity()).filter_map(|i| self.child(i).cloned()).collect()
    }

    /// Node of the same kind with new children
    pub fn rebuild(&self, children: Vec<Node>) -> CompileResult {
        let check = |expected: usize| -> Result<(), CompileError> {
            if children.len() == expected {
                Ok(())
            } else {
                Err(CompileError::Rebuild {
                    expected,
                    found: children.len(),
                })
            }
        };
        let node = match self {
            Node::Array(..) => Node::array(children),
            Node::Map(..) => {
                if children.len() % 2 != 0 {
                    return Err(CompileError::Rebuild {
                        expected: children.len() + 1,
                        found: children.len(),
                    });
                }
                let mut it = children.into_iter();
                let mut entries = Vec::new();
                while let (Some(k), Some(v)) = (it.next(), it.next()) {
                    entries.push((k, v));
                }
                Node::map(entries)
            }
            Node::Unary(op, _) => {
                check(1)?;
                let mut it = children.into_iter();
                match it.next() {
                    Some(a) => Node::unary(*op, a),
                    None => return Err(CompileError::Rebuild { expected: 1, found: 0 }),
                }
            }
            Node::Binary(..) | Node::Index(..) | Node::Assign(..) => {
                check(2)?;
                let mut it = children.into_iter();
                let (a, b) = match (it.next(), it.next()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(CompileError::Rebuild { expected: 2, found: 0 }),
                };
                match self {
                    Node::Binary(op, ..) => Node::binary(*op, a, b),
                    Node::Index(..) => Node::index(a, b),
                    _ => Node::assign(a, b),
                }
            }
            Node::Call(func, _) => {
                check(func.arity())?;
                Node::call(*func, children)
            }
            Node::UserCall(name, args) => {
                check(args.len())?;
                Node::user_call(*name, children)
            }
            _ => {
                check(0)?;
                self.clone()
            }
        };
        Ok(node)
    }

    /// Ids of all variables and user functions the tree refers to
    pub fn referenced_names(&self, out: &mut Vec<Name>) {
        match self {
            Node::Var(n) | Node::Placeholder(n) => out.push(*n),
            Node::UserCall(n, _) => out.push(*n),
            Node::Program(p) => p.referenced_names(out),
            _ => {}
        }
        for i in 0..self.arity() {
            if let Some(c) = self.child(i) {
                c.referenced_names(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::intern;

    #[test]
    fn test_normalize() {
        assert_eq!(Node::from_ratio(Rational64::new(4, 2)), Node::Int(2));
        assert_eq!(Node::from_ratio(Rational64::new(1, 2)), Node::Ratio(Rational64::new(1, 2)));
        assert_eq!(Node::from_complex_int(Complex::new(3, 0)), Node::Int(3));
        assert_eq!(
            Node::from_complex_ratio(Complex::new(Rational64::new(2, 1), Rational64::new(3, 1))),
            Node::ComplexInt(Complex::new(2, 3))
        );
        assert_eq!(Node::from_complex_float(Complex::new(1.5, 0.0)), Node::Float(1.5));
    }

    #[test]
    fn test_equality() {
        assert_eq!(Node::Float(f64::NAN), Node::Float(f64::NAN));
        assert_ne!(Node::Int(2), Node::Float(2.0));
        assert_eq!(
            Node::binary(BinaryOp::Add, Node::Int(1), Node::Var(intern("x"))),
            Node::binary(BinaryOp::Add, Node::Int(1), Node::Var(intern("x")))
        );
        assert_ne!(
            Node::binary(BinaryOp::Add, Node::Int(1), Node::Int(2)),
            Node::binary(BinaryOp::Sub, Node::Int(1), Node::Int(2))
        );
    }

    #[test]
    fn test_predicates() {
        assert!(Node::Int(3).is_integral());
        assert!(Node::Float(3.0).is_integral());
        assert!(!Node::Float(3.5).is_integral());
        assert!(!Node::Ratio(Rational64::new(1, 2)).is_integral());
        assert_eq!(Node::Ratio(Rational64::new(-1, 2)).signum(), Some(-1));
        assert!(Node::Float(0.1).is_positive());
        assert!(Node::Float(f64::NAN).is_nan());
        assert!(Node::ComplexFloat(Complex::new(1.0, f64::NAN)).is_nan());
        assert_eq!(Node::ComplexInt(Complex::new(0, 1)).signum(), None);
    }

    #[test]
    fn test_primitive_counter() {
        let x = Node::Var(intern("x"));
        let arr = Array::new(vec![Node::Int(1), x.clone(), Node::Int(2)]);
        assert!(!arr.is_primitive());
        let mut arr2 = arr.clone();
        arr2.put(1, Node::Int(5));
        assert!(arr2.is_primitive());
        arr2.put(3, x);
        assert!(!arr2.is_primitive());
        assert_eq!(arr2.len(), 4);
        assert!(Node::array(vec![Node::Int(1), Node::from("a")]).is_primitive());
    }

    #[test]
    fn test_rebuild() {
        let x = Node::Var(intern("x"));
        let node = Node::binary(BinaryOp::Mul, x.clone(), Node::Int(2));
        assert_eq!(node.arity(), 2);
        assert_eq!(node.child(0), Some(&x));
        let rebuilt = node.rebuild(vec![Node::Int(3), Node::Int(4)]);
        assert_eq!(rebuilt, Ok(Node::binary(BinaryOp::Mul, Node::Int(3), Node::Int(4))));
        let bad = node.rebuild(vec![Node::Int(3)]);
        assert_eq!(bad, Err(CompileError::Rebuild { expected: 2, found: 1 }));
        assert_eq!(Node::Int(1).rebuild(vec![]), Ok(Node::Int(1)));
        let map = Node::map(vec![(Node::from("a"), Node::Int(1))]);
        assert_eq!(map.arity(), 2);
        assert_eq!(map.rebuild(map.children()), Ok(map.clone()));
    }

    #[test]
    fn test_sets() {
        assert_eq!(NumberSet::Natural.contains(&Node::Int(3)), Some(true));
        assert_eq!(NumberSet::Natural.contains(&Node::Int(0)), Some(false));
        assert_eq!(NumberSet::Integer.contains(&Node::Float(-4.0)), Some(true));
        assert_eq!(NumberSet::Rational.contains(&Node::Ratio(Rational64::new(1, 3))), Some(true));
        assert_eq!(NumberSet::Real.contains(&Node::Float(f64::INFINITY)), Some(false));
        assert_eq!(NumberSet::Real.contains(&Node::ComplexInt(Complex::new(0, 1))), Some(false));
        assert_eq!(NumberSet::Complex.contains(&Node::ComplexInt(Complex::new(0, 1))), Some(true));
        assert_eq!(NumberSet::Prime.contains(&Node::Int(97)), Some(true));
        assert_eq!(NumberSet::Prime.contains(&Node::Int(91)), Some(false));
        assert_eq!(NumberSet::Fibonacci.contains(&Node::Int(21)), Some(true));
        assert_eq!(NumberSet::Fibonacci.contains(&Node::Int(22)), Some(false));
        assert_eq!(NumberSet::Natural.contains(&Node::from("x")), None);
        assert!(NumberSet::Prime.is_subset_of(NumberSet::Real));
        assert!(!NumberSet::Real.is_subset_of(NumberSet::Integer));
        assert!(!NumberSet::Fibonacci.is_subset_of(NumberSet::Natural));
    }
}
