//! Text output of nodes in three dialects.
//!
//! The internal dialect is re-parseable: compiling the rendering of a
//! compiled tree gives the same tree back. Children are wrapped in brackets
//! only when the surrounding operator binds tighter.

use num_rational::Rational64;
use std::f64::consts;
use std::fmt;

use crate::node::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// the calculator's own syntax
    Internal,
    Latex,
    /// OpenOffice/LibreOffice Math
    OpenOffice,
}

/// Shortest decimal that reads back as the same double
pub(crate) fn format_f64(g: f64) -> String {
    let mut buf = dtoa::Buffer::new();
    let mut s = buf.format(g).to_string();
    if !s.contains(|c: char| c == '.' || c == 'e' || c == 'E') {
        s.push_str(".0");
    }
    s
}

impl Node {
    /// Binding strength of the node as it appears in text
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Node::Int(i) if *i < 0 => PRIO_ADD,
            Node::Float(f) if f.is_sign_negative() && !f.is_nan() => PRIO_ADD,
            Node::Ratio(r) if *r.numer() < 0 => PRIO_ADD,
            Node::Ratio(..) => PRIO_MUL,
            Node::ComplexInt(..) | Node::ComplexRatio(..) | Node::ComplexFloat(..) => {
                let (re, im) = complex_parts(self);
                if re.signum() != Some(0) || im.signum() == Some(-1) {
                    PRIO_ADD
                } else if is_one(&im) {
                    PRIO_ATOM
                } else {
                    PRIO_MUL
                }
            }
            Node::Unary(op, _) => op.priority(),
            Node::Binary(op, ..) => op.priority(),
            Node::Assign(..) => PRIO_ASSIGN,
            _ => PRIO_ATOM,
        }
    }

    pub fn render(&self, dialect: Dialect) -> String {
        let mut w = Writer {
            dialect,
            out: String::new(),
        };
        w.node(self);
        w.out
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.render(Dialect::Internal))
    }
}

fn complex_parts(n: &Node) -> (Node, Node) {
    match n {
        Node::ComplexInt(c) => (Node::Int(c.re), Node::Int(c.im)),
        Node::ComplexRatio(c) => (Node::from_ratio(c.re), Node::from_ratio(c.im)),
        Node::ComplexFloat(c) => (Node::Float(c.re), Node::Float(c.im)),
        _ => (n.clone(), Node::Int(0)),
    }
}

fn is_one(n: &Node) -> bool {
    match n {
        Node::Int(i) => *i == 1,
        Node::Float(f) => *f == 1.0,
        _ => false,
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

struct Writer {
    dialect: Dialect,
    out: String,
}

impl Writer {
    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn open(&mut self) {
        match self.dialect {
            Dialect::Internal => self.push("("),
            Dialect::Latex => self.push("\\left("),
            Dialect::OpenOffice => self.push("left( "),
        }
    }

    fn close(&mut self) {
        match self.dialect {
            Dialect::Internal => self.push(")"),
            Dialect::Latex => self.push("\\right)"),
            Dialect::OpenOffice => self.push(" right)"),
        }
    }

    fn clipped(&mut self, n: &Node, clip: bool) {
        if clip {
            self.open();
            self.node(n);
            self.close();
        } else {
            self.node(n);
        }
    }

    /// Argument of a function: LaTeX and OpenOffice group it in braces
    fn group(&mut self, n: &Node) {
        if self.dialect == Dialect::Internal {
            self.node(n);
        } else {
            self.push("{");
            self.node(n);
            self.push("}");
        }
    }

    fn float(&mut self, g: f64) {
        let special = match (self.dialect, g) {
            (_, g) if g.is_nan() => Some(match self.dialect {
                Dialect::Internal => "undef",
                Dialect::Latex => "\\text{undef}",
                Dialect::OpenOffice => "\"undef\"",
            }),
            (Dialect::Internal, g) if g == f64::INFINITY => Some("∞"),
            (Dialect::Internal, g) if g == f64::NEG_INFINITY => Some("-∞"),
            (Dialect::Internal, g) if g == consts::PI => Some("π"),
            (Dialect::Internal, g) if g == consts::E => Some("ℯ"),
            (Dialect::Latex, g) if g == f64::INFINITY => Some("\\infty"),
            (Dialect::Latex, g) if g == f64::NEG_INFINITY => Some("-\\infty"),
            (Dialect::Latex, g) if g == consts::PI => Some("\\pi"),
            (Dialect::OpenOffice, g) if g == f64::INFINITY => Some("infinity"),
            (Dialect::OpenOffice, g) if g == f64::NEG_INFINITY => Some("-infinity"),
            (Dialect::OpenOffice, g) if g == consts::PI => Some("%pi"),
            _ => None,
        };
        match special {
            Some(s) => self.push(s),
            None => {
                let s = format_f64(g);
                self.push(&s);
            }
        }
    }

    fn ratio(&mut self, r: &Rational64) {
        let (n, d) = (*r.numer(), *r.denom());
        match self.dialect {
            Dialect::Internal => self.push(&format!("{}/{}", n, d)),
            Dialect::Latex if n < 0 => self.push(&format!("-\\frac{{{}}}{{{}}}", -(n as i128), d)),
            Dialect::Latex => self.push(&format!("\\frac{{{}}}{{{}}}", n, d)),
            Dialect::OpenOffice => self.push(&format!("{{{}}} over {{{}}}", n, d)),
        }
    }

    fn complex(&mut self, n: &Node) {
        let (re, im) = complex_parts(n);
        let negative = im.signum() == Some(-1);
        let im = if negative {
            crate::value::neg(&im).unwrap_or(im)
        } else {
            im
        };
        if re.signum() != Some(0) {
            self.node(&re);
            self.push(if negative { "-" } else { "+" });
        } else if negative {
            self.push("-");
        }
        let unit = match self.dialect {
            Dialect::Internal => "ⅈ",
            _ => "i",
        };
        if !is_one(&im) {
            self.node(&im);
            if self.dialect == Dialect::Internal {
                self.push("*");
            }
        }
        self.push(unit);
    }

    fn list(&mut self, items: &[Node], sep: &str) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            self.node(item);
        }
    }

    fn array(&mut self, arr: &Array) {
        match self.dialect {
            Dialect::Internal => {
                self.push("{");
                self.list(arr.items(), ",");
                self.push("}");
            }
            Dialect::Latex | Dialect::OpenOffice => {
                let (row_sep, col_sep) = if self.dialect == Dialect::Latex {
                    (" \\\\ ", " & ")
                } else {
                    (" ## ", " # ")
                };
                let nested = !arr.is_empty() && arr.items().iter().all(|n| matches!(n, Node::Array(..)));
                if self.dialect == Dialect::Latex {
                    self.push("\\begin{pmatrix}");
                } else {
                    self.push("left( matrix{");
                }
                if nested {
                    for (i, row) in arr.items().iter().enumerate() {
                        if i > 0 {
                            self.push(row_sep);
                        }
                        if let Node::Array(row) = row {
                            self.list(row.items(), col_sep);
                        }
                    }
                } else {
                    self.list(arr.items(), row_sep);
                }
                if self.dialect == Dialect::Latex {
                    self.push("\\end{pmatrix}");
                } else {
                    self.push("} right)");
                }
            }
        }
    }

    fn binary_symbol(&self, op: BinaryOp) -> String {
        let s = match self.dialect {
            Dialect::Internal => return op.symbol().to_string(),
            Dialect::Latex => match op {
                BinaryOp::Then => ";\\;",
                BinaryOp::And => " \\land ",
                BinaryOp::Or => " \\lor ",
                BinaryOp::Eq => "=",
                BinaryOp::NotEq => " \\neq ",
                BinaryOp::ElementOf => " \\in ",
                BinaryOp::NotElementOf => " \\notin ",
                BinaryOp::Subset => " \\subseteq ",
                BinaryOp::NotSubset => " \\nsubseteq ",
                BinaryOp::Less => "<",
                BinaryOp::Greater => ">",
                BinaryOp::LessEq => " \\le ",
                BinaryOp::GreaterEq => " \\ge ",
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Concat => " \\circ ",
                BinaryOp::Dot | BinaryOp::MatMul | BinaryOp::Mul => " \\cdot ",
                BinaryOp::Cross => " \\times ",
                BinaryOp::Div => "/",
                BinaryOp::Rem => " \\bmod ",
                BinaryOp::Pow => "^",
            },
            Dialect::OpenOffice => match op {
                BinaryOp::Then => "; ",
                BinaryOp::And => " and ",
                BinaryOp::Or => " or ",
                BinaryOp::Eq => " = ",
                BinaryOp::NotEq => " <> ",
                BinaryOp::ElementOf => " in ",
                BinaryOp::NotElementOf => " notin ",
                BinaryOp::Subset => " subseteq ",
                BinaryOp::NotSubset => " nsubseteq ",
                BinaryOp::Less => " < ",
                BinaryOp::Greater => " > ",
                BinaryOp::LessEq => " <= ",
                BinaryOp::GreaterEq => " >= ",
                BinaryOp::Add => " + ",
                BinaryOp::Sub => " - ",
                BinaryOp::Concat => " circ ",
                BinaryOp::Dot | BinaryOp::MatMul | BinaryOp::Mul => " cdot ",
                BinaryOp::Cross => " times ",
                BinaryOp::Div => " / ",
                BinaryOp::Rem => " mod ",
                BinaryOp::Pow => "^",
            },
        };
        s.to_string()
    }

    fn binary(&mut self, op: BinaryOp, a: &Node, b: &Node) {
        if op == BinaryOp::Div && self.dialect != Dialect::Internal {
            if self.dialect == Dialect::Latex {
                self.push("\\frac{");
                self.node(a);
                self.push("}{");
                self.node(b);
                self.push("}");
            } else {
                self.push("{");
                self.node(a);
                self.push("} over {");
                self.node(b);
                self.push("}");
            }
            return;
        }
        let prio = op.priority();
        self.clipped(a, a.priority() < prio);
        let sym = self.binary_symbol(op);
        self.push(&sym);
        if op == BinaryOp::Pow && self.dialect != Dialect::Internal {
            self.group(b);
        } else {
            self.clipped(b, b.priority() <= prio);
        }
    }

    fn unary(&mut self, op: UnaryOp, a: &Node) {
        match op {
            UnaryOp::Negate => {
                self.push("-");
                // "-3" would read back as a literal, not a negation
                self.clipped(a, a.is_numeric() || a.priority() <= PRIO_ADD);
            }
            UnaryOp::Not => {
                self.push(match self.dialect {
                    Dialect::Internal => "¬",
                    Dialect::Latex => "\\neg ",
                    Dialect::OpenOffice => "neg ",
                });
                self.clipped(a, a.priority() <= PRIO_NOT);
            }
            UnaryOp::Transpose => {
                if self.dialect == Dialect::Internal {
                    self.push("ᵗ");
                    self.clipped(a, a.priority() <= PRIO_TRANSPOSE);
                } else {
                    self.clipped(a, a.priority() < PRIO_ATOM);
                    self.push("^{T}");
                }
            }
            UnaryOp::Factorial => {
                self.clipped(a, a.priority() < PRIO_ATOM);
                self.push("!");
            }
        }
    }

    fn call(&mut self, name: &str, args: &[Node]) {
        match (self.dialect, name, args) {
            (Dialect::Latex, "sqrt", [x]) => {
                self.push("\\sqrt");
                self.group(x);
            }
            (Dialect::Latex, "abs", [x]) => {
                self.push("\\left|");
                self.node(x);
                self.push("\\right|");
            }
            (Dialect::OpenOffice, "sqrt", [x]) | (Dialect::OpenOffice, "abs", [x]) => {
                self.push(name);
                self.group(x);
            }
            _ => {
                if self.dialect == Dialect::Latex {
                    self.push("\\operatorname{");
                    self.push(name);
                    self.push("}");
                } else {
                    self.push(name);
                }
                self.open();
                self.list(args, ",");
                self.close();
            }
        }
    }

    fn set(&mut self, s: NumberSet) {
        match self.dialect {
            Dialect::Internal => self.out.push(s.symbol()),
            Dialect::Latex => {
                let letter = match s {
                    NumberSet::Fibonacci => "F",
                    NumberSet::Prime => "P",
                    NumberSet::Natural => "N",
                    NumberSet::Integer => "Z",
                    NumberSet::Rational => "Q",
                    NumberSet::Real => "R",
                    NumberSet::Complex => "C",
                };
                self.push(&format!("\\mathbb{{{}}}", letter));
            }
            Dialect::OpenOffice => self.push(match s {
                NumberSet::Natural => "setN",
                NumberSet::Integer => "setZ",
                NumberSet::Rational => "setQ",
                NumberSet::Real => "setR",
                NumberSet::Complex => "setC",
                NumberSet::Prime => "\"P\"",
                NumberSet::Fibonacci => "\"F\"",
            }),
        }
    }

    fn text(&mut self, s: &str) {
        let quoted = escape(s);
        match self.dialect {
            Dialect::Latex => {
                self.push("\\text{");
                self.push(&quoted);
                self.push("}");
            }
            _ => self.push(&quoted),
        }
    }

    fn node(&mut self, n: &Node) {
        match n {
            Node::Int(i) => self.push(&i.to_string()),
            Node::Ratio(r) => self.ratio(r),
            Node::Float(g) => self.float(*g),
            Node::ComplexInt(..) | Node::ComplexRatio(..) | Node::ComplexFloat(..) => self.complex(n),
            Node::Bool(b) => self.push(if *b { "true" } else { "false" }),
            Node::Char(c) => {
                let s = match c {
                    '\n' => "'\\n'".to_string(),
                    '\t' => "'\\t'".to_string(),
                    '\\' | '\'' => format!("'\\{}'", c),
                    _ => format!("'{}'", c),
                };
                self.push(&s);
            }
            Node::Str(s) => self.text(s),
            Node::Array(arr) => self.array(arr),
            Node::Map(m) => {
                self.push("{");
                for (i, (k, v)) in m.entries().iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                    }
                    self.node(k);
                    self.push(":");
                    self.node(v);
                }
                self.push("}");
            }
            Node::Set(s) => self.set(*s),
            Node::Fault(f) => {
                let msg = format!("Exception:{}", escape(&f.message));
                match self.dialect {
                    Dialect::Latex => self.push(&format!("\\text{{{}}}", msg)),
                    _ => self.push(&msg),
                }
            }
            Node::Var(name) | Node::Placeholder(name) => self.push(name.as_str()),
            Node::Unary(op, a) => self.unary(*op, a),
            Node::Binary(op, a, b) => self.binary(*op, a, b),
            Node::Index(target, idx) => {
                self.clipped(target, target.priority() < PRIO_ATOM);
                self.push("[");
                self.node(idx);
                self.push("]");
            }
            Node::Assign(value, target) => {
                self.clipped(value, value.priority() < PRIO_ASSIGN);
                self.push(match self.dialect {
                    Dialect::Internal => "→",
                    Dialect::Latex => " \\to ",
                    Dialect::OpenOffice => " toward ",
                });
                self.clipped(target, target.priority() <= PRIO_ASSIGN);
            }
            Node::Call(func, args) => self.call(func.name(), args),
            Node::UserCall(name, args) => self.call(name.as_str(), args),
            Node::HostCall(name) => self.call(name.as_str(), &[]),
            Node::Program(script) => {
                self.push("program");
                self.open();
                self.text(script.source());
                self.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::intern;
    use num_complex::Complex;

    fn var(s: &str) -> Node {
        Node::Var(intern(s))
    }

    #[test]
    fn test_numbers() {
        assert_eq!(Node::Int(-12).to_string(), "-12");
        assert_eq!(Node::Float(2.5).to_string(), "2.5");
        assert_eq!(Node::Float(3.0).to_string(), "3.0");
        assert_eq!(Node::Float(f64::INFINITY).to_string(), "∞");
        assert_eq!(Node::Float(f64::NEG_INFINITY).to_string(), "-∞");
        assert_eq!(Node::Float(f64::NAN).to_string(), "undef");
        assert_eq!(Node::Float(consts::PI).to_string(), "π");
        assert_eq!(Node::Ratio(Rational64::new(-3, 4)).to_string(), "-3/4");
        assert_eq!(Node::ComplexInt(Complex::new(0, 1)).to_string(), "ⅈ");
        assert_eq!(Node::ComplexInt(Complex::new(2, -1)).to_string(), "2-ⅈ");
        assert_eq!(Node::ComplexInt(Complex::new(1, 3)).to_string(), "1+3*ⅈ");
        assert_eq!(Node::ComplexInt(Complex::new(0, -3)).to_string(), "-3*ⅈ");
    }

    #[test]
    fn test_literals() {
        assert_eq!(Node::Char('x').to_string(), "'x'");
        assert_eq!(Node::Char('\n').to_string(), "'\\n'");
        assert_eq!(Node::Char('\\').to_string(), "'\\\\'");
        assert_eq!(Node::Char('\'').to_string(), "'\\''");
        assert_eq!(Node::from("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Node::array(vec![Node::Int(1), Node::Bool(true)]).to_string(), "{1,true}");
        assert_eq!(Node::map(vec![(Node::from("k"), Node::Int(1))]).to_string(), "{\"k\":1}");
        assert_eq!(Node::Set(NumberSet::Real).to_string(), "ℝ");
        assert_eq!(Node::fault(FaultKind::NotAnArray, "Not an Array").to_string(), "Exception:\"Not an Array\"");
    }

    #[test]
    fn test_clipping() {
        let (a, b, c) = (var("a"), var("b"), var("c"));
        let sum = Node::binary(BinaryOp::Add, a.clone(), b.clone());
        assert_eq!(Node::binary(BinaryOp::Mul, sum.clone(), c.clone()).to_string(), "(a+b)*c");
        assert_eq!(Node::binary(BinaryOp::Add, c.clone(), sum.clone()).to_string(), "c+(a+b)");
        assert_eq!(Node::binary(BinaryOp::Add, sum, c.clone()).to_string(), "a+b+c");
        assert_eq!(Node::binary(BinaryOp::Pow, Node::Int(2), Node::Int(-3)).to_string(), "2^(-3)");
        assert_eq!(Node::unary(UnaryOp::Negate, Node::unary(UnaryOp::Negate, a.clone())).to_string(), "-(-a)");
        assert_eq!(Node::unary(UnaryOp::Negate, Node::Int(3)).to_string(), "-(3)");
        assert_eq!(Node::unary(UnaryOp::Factorial, Node::Int(-3)).to_string(), "(-3)!");
        assert_eq!(
            Node::unary(UnaryOp::Not, Node::binary(BinaryOp::Pow, a.clone(), b.clone())).to_string(),
            "¬(a^b)"
        );
        assert_eq!(Node::assign(Node::Int(1), a.clone()).to_string(), "1→a");
        assert_eq!(Node::index(a, Node::Int(0)).to_string(), "a[0]");
        assert_eq!(
            Node::binary(BinaryOp::Div, b, Node::Ratio(Rational64::new(1, 2))).to_string(),
            "b/(1/2)"
        );
    }

    #[test]
    fn test_dialects() {
        let node = Node::binary(BinaryOp::Div, var("a"), Node::Int(2));
        assert_eq!(node.render(Dialect::Latex), "\\frac{a}{2}");
        assert_eq!(node.render(Dialect::OpenOffice), "{a} over {2}");
        let node = Node::binary(BinaryOp::Mul, Node::Int(2), var("x"));
        assert_eq!(node.render(Dialect::Latex), "2 \\cdot x");
        assert_eq!(node.render(Dialect::OpenOffice), "2 cdot x");
        let node = Node::binary(
            BinaryOp::Mul,
            Node::binary(BinaryOp::Add, var("a"), Node::Int(1)),
            var("b"),
        );
        assert_eq!(node.render(Dialect::Latex), "\\left(a+1\\right) \\cdot b");
        let vec = Node::array(vec![Node::Int(1), Node::Int(2)]);
        assert_eq!(vec.render(Dialect::Latex), "\\begin{pmatrix}1 \\\\ 2\\end{pmatrix}");
        assert_eq!(vec.render(Dialect::OpenOffice), "left( matrix{1 ## 2} right)");
        assert_eq!(Node::Float(consts::PI).render(Dialect::Latex), "\\pi");
    }
}
