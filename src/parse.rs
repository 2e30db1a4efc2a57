//! Expression compiler.
//!
//! The compiler works on a character range. It first tries the range as a
//! literal, then splits it at the rightmost operator of the lowest priority
//! outside brackets and literals, and finally falls back to postfix forms,
//! calls, strings, arrays and names.

use num_complex::Complex;
use std::f64::consts::{E, PI};
use std::rc::Rc;
use tracing::debug;

use crate::errors::*;
use crate::funcs;
use crate::intern::intern;
use crate::node::*;
use crate::program::Script;

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];

/// Priority of an operator character, `None` for any other character
fn op_priority(c: char) -> Option<u8> {
    match c {
        '→' => Some(PRIO_ASSIGN),
        'ᵗ' => Some(PRIO_TRANSPOSE),
        '¬' => Some(PRIO_NOT),
        _ => BinaryOp::from_char(c).map(BinaryOp::priority),
    }
}

/// Checks that `name` is a valid variable or function name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Removes spaces and line breaks outside string and character literals
fn strip(text: &str) -> Vec<char> {
    let mut out = Vec::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '"' | '\'' => {
                match quote {
                    None => quote = Some(c),
                    Some(q) if q == c => quote = None,
                    _ => {}
                }
                out.push(c);
            }
            ' ' | '\n' | '\r' if quote.is_none() => {}
            _ => out.push(c),
        }
    }
    out
}

fn unescape(chars: &[char]) -> String {
    let mut s = String::with_capacity(chars.len());
    let mut it = chars.iter();
    while let Some(&c) = it.next() {
        if c != '\\' {
            s.push(c);
            continue;
        }
        match it.next() {
            Some('n') => s.push('\n'),
            Some('t') => s.push('\t'),
            Some(&other) => s.push(other),
            None => s.push('\\'),
        }
    }
    s
}

struct Compiler<'a> {
    chars: &'a [char],
}

impl<'a> Compiler<'a> {
    fn error(&self, b: usize, e: usize) -> CompileError {
        CompileError::parse(&self.chars[b..e])
    }

    fn text(&self, b: usize, e: usize) -> String {
        self.chars[b..e].iter().collect()
    }

    /// Index of the closing quote of a string starting at `i`
    fn string_end(&self, i: usize, e: usize) -> Option<usize> {
        let mut j = i + 1;
        while j < e {
            match self.chars[j] {
                '\\' => j += 2,
                '"' => return Some(j),
                _ => j += 1,
            }
        }
        None
    }

    /// Index of the opening quote of a string ending at `i`
    fn string_start(&self, b: usize, i: usize) -> Option<usize> {
        let mut j = i;
        while j > b {
            j -= 1;
            if self.chars[j] != '"' {
                continue;
            }
            let escapes = self.chars[b..j].iter().rev().take_while(|&&c| c == '\\').count();
            if escapes % 2 == 0 {
                return Some(j);
            }
        }
        None
    }

    /// Index of the closing quote of a character literal starting at `i`
    fn char_end(&self, i: usize, e: usize) -> usize {
        if i + 2 < e && self.chars[i + 1] != '\\' && self.chars[i + 2] == '\'' {
            i + 2
        } else if i + 3 < e && self.chars[i + 1] == '\\' && self.chars[i + 3] == '\'' {
            i + 3
        } else {
            i
        }
    }

    fn char_start(&self, b: usize, i: usize) -> usize {
        if i >= b + 2 && self.chars[i - 2] == '\'' {
            i - 2
        } else if i >= b + 3 && self.chars[i - 3] == '\'' && self.chars[i - 2] == '\\' {
            i - 3
        } else {
            i
        }
    }

    /// Index of the bracket closing the one at `open`
    fn closing(&self, open: usize, e: usize) -> Option<usize> {
        let mut depth = 0i32;
        let mut i = open;
        while i < e {
            match self.chars[i] {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                '"' => i = self.string_end(i, e)?,
                '\'' => i = self.char_end(i, e),
                '\\' => i += 1,
                _ => {}
            }
            i += 1;
        }
        None
    }

    /// Index of the bracket opening the one at `close`
    fn opening(&self, b: usize, close: usize) -> Option<usize> {
        let mut depth = 0i32;
        let mut i = close + 1;
        while i > b {
            i -= 1;
            match self.chars[i] {
                ')' | ']' | '}' => depth += 1,
                '(' | '[' | '{' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                '"' => i = self.string_start(b, i)?,
                '\'' => i = self.char_start(b, i),
                _ => {}
            }
        }
        None
    }

    /// Ranges of comma-separated items at bracket depth 0
    fn split_list(&self, b: usize, e: usize) -> Option<Vec<(usize, usize)>> {
        let mut items = Vec::new();
        if b == e {
            return Some(items);
        }
        let mut start = b;
        let mut i = b;
        while i < e {
            match self.chars[i] {
                '(' | '[' | '{' => i = self.closing(i, e)?,
                '"' => i = self.string_end(i, e)?,
                '\'' => i = self.char_end(i, e),
                '\\' => i += 1,
                ',' => {
                    items.push((start, i));
                    start = i + 1;
                }
                _ => {}
            }
            i += 1;
        }
        items.push((start, e));
        Some(items)
    }

    /// `+`/`-` right after the exponent marker of a numeric literal
    fn is_exponent_sign(&self, b: usize, i: usize) -> bool {
        if i < b + 2 || !matches!(self.chars[i - 1], 'e' | 'E') {
            return false;
        }
        let mut j = i - 1;
        let mut digits = 0;
        while j > b && (self.chars[j - 1].is_ascii_digit() || self.chars[j - 1] == '.') {
            j -= 1;
            if self.chars[j].is_ascii_digit() {
                digits += 1;
            }
        }
        digits > 0 && (j == b || !(self.chars[j - 1].is_alphanumeric() || self.chars[j - 1] == '_'))
    }

    fn literal(&self, b: usize, e: usize) -> Option<Node> {
        let s = &self.chars[b..e];
        let node = match s {
            ['∞'] => Node::Float(f64::INFINITY),
            ['π'] => Node::Float(PI),
            ['ℯ'] => Node::Float(E),
            ['ⅈ'] => Node::ComplexInt(Complex::new(0, 1)),
            [c] => Node::Set(NumberSet::from_symbol(*c)?),
            ['-', '∞'] => Node::Float(f64::NEG_INFINITY),
            ['\'', c, '\''] if *c != '\\' => Node::Char(*c),
            ['\\', 'p', 'i'] => Node::Float(PI),
            ['\'', '\\', 'n', '\''] => Node::Char('\n'),
            ['\'', '\\', 't', '\''] => Node::Char('\t'),
            ['\'', '\\', c, '\''] => Node::Char(*c),
            ['t', 'r', 'u', 'e'] => Node::Bool(true),
            ['f', 'a', 'l', 's', 'e'] => Node::Bool(false),
            ['u', 'n', 'd', 'e', 'f'] => Node::Float(f64::NAN),
            ['\\', 'e', 'u', 'l', 'e', 'r'] => Node::Float(E),
            _ => return None,
        };
        Some(node)
    }

    fn number(&self, b: usize, e: usize) -> Option<Node> {
        let first = self.chars[b];
        let text = self.text(b, e);
        if let Some(hex) = text.strip_prefix("0x") {
            return i64::from_str_radix(hex, 16).ok().map(Node::Int);
        }
        if first != '+' {
            if let Ok(i) = text.parse::<i64>() {
                return Some(Node::Int(i));
            }
        }
        let numeric = |c: &char| c.is_ascii_digit() || matches!(*c, '.' | 'e' | 'E' | '+' | '-');
        if (first.is_ascii_digit() || first == '-') && self.chars[b + 1..e].iter().all(numeric) {
            if let Ok(f) = text.parse::<f64>() {
                return Some(Node::Float(f));
            }
        }
        None
    }

    /// Position and character of the operator to split at
    fn split_point(&self, b: usize, e: usize) -> Option<usize> {
        let mut best: Option<(usize, u8)> = None;
        let mut depth = 0i32;
        let mut i = e;
        while i > b {
            i -= 1;
            let c = self.chars[i];
            match c {
                ')' | ']' | '}' => depth += 1,
                '(' | '[' | '{' => depth -= 1,
                '"' => i = self.string_start(b, i)?,
                '\'' => i = self.char_start(b, i),
                _ if depth != 0 => {}
                _ => {
                    if i > b && self.chars[i - 1] == '\\' {
                        continue;
                    }
                    let prio = match op_priority(c) {
                        Some(p) => p,
                        None => continue,
                    };
                    if (c == '+' || c == '-') && self.is_exponent_sign(b, i) {
                        continue;
                    }
                    if best.map_or(true, |(_, p)| prio < p) {
                        best = Some((i, prio));
                        if prio == PRIO_THEN {
                            break;
                        }
                    }
                }
            }
        }
        best.map(|(i, _)| i)
    }

    /// Builds the node for `a op b` where `a` may be empty
    fn operator(&self, op: char, (ab, ae): (usize, usize), (bb, be): (usize, usize)) -> CompileResult {
        let right = self.node(bb, be)?;
        if ab == ae {
            let node = match op {
                '+' => right,
                '-' => Node::unary(UnaryOp::Negate, right),
                '¬' => Node::unary(UnaryOp::Not, right),
                'ᵗ' => Node::unary(UnaryOp::Transpose, right),
                _ => return Err(self.error(ab, be)),
            };
            return Ok(node);
        }
        let left = self.node(ab, ae)?;
        match op {
            '→' => Ok(Node::assign(left, right)),
            _ => match BinaryOp::from_char(op) {
                Some(bin) => Ok(Node::binary(bin, left, right)),
                None => Err(self.error(ab, be)),
            },
        }
    }

    fn superscript(&self, b: usize, e: usize) -> Option<CompileResult> {
        let mut i = e;
        let mut exp = 0i64;
        let mut scale = 1i64;
        while i > b {
            match SUPERSCRIPT_DIGITS.iter().position(|&d| d == self.chars[i - 1]) {
                Some(d) => {
                    exp = exp.checked_add((d as i64).checked_mul(scale)?)?;
                    scale = scale.checked_mul(10)?;
                    i -= 1;
                }
                None => break,
            }
        }
        if i == e {
            return None;
        }
        if i > b && self.chars[i - 1] == '⁻' {
            exp = -exp;
            i -= 1;
        } else if i > b && self.chars[i - 1] == '⁺' {
            i -= 1;
        }
        if i == b {
            return Some(Err(self.error(b, e)));
        }
        Some(self.node(b, i).map(|base| Node::binary(BinaryOp::Pow, base, Node::Int(exp))))
    }

    fn call(&self, b: usize, e: usize, open: usize) -> CompileResult {
        let name = self.text(b, open);
        let ranges = self.split_list(open + 1, e - 1).ok_or_else(|| self.error(b, e))?;
        let mut args = Vec::with_capacity(ranges.len());
        for (ab, ae) in ranges {
            args.push(self.node(ab, ae)?);
        }
        match (name.as_str(), args.len()) {
            ("set", 2) => {
                let value = args.pop().unwrap_or_default();
                let target = args.pop().unwrap_or_default();
                if !matches!(target, Node::Var(..) | Node::UserCall(..) | Node::Index(..)) {
                    return Err(self.error(b, e));
                }
                return Ok(Node::assign(value, target));
            }
            ("program", 1) => {
                if let Some(Node::Str(src)) = args.first() {
                    let script = Script::compile(src)?;
                    return Ok(Node::Program(Rc::new(script)));
                }
            }
            _ => {}
        }
        if let Some(func) = funcs::lookup(&name, args.len()) {
            return Ok(Node::call(func, args));
        }
        let id = intern(&name);
        if args.is_empty() && funcs::is_program_function(id) {
            return Ok(Node::HostCall(id));
        }
        Ok(Node::user_call(id, args))
    }

    fn node(&self, b: usize, e: usize) -> CompileResult {
        if b >= e {
            return Err(self.error(b, e));
        }
        if let Some(n) = self.literal(b, e) {
            return Ok(n);
        }
        if let Some(n) = self.number(b, e) {
            return Ok(n);
        }

        if let Some(i) = self.split_point(b, e) {
            let c = self.chars[i];
            if (c == '+' || c == '-') && i > b && op_priority(self.chars[i - 1]).is_some() {
                return self.operator(self.chars[i - 1], (b, i - 1), (i, e));
            }
            return self.operator(c, (b, i), (i + 1, e));
        }

        if let Some(res) = self.superscript(b, e) {
            return res;
        }
        let first = self.chars[b];
        let last = self.chars[e - 1];
        if last == '!' {
            return Ok(Node::unary(UnaryOp::Factorial, self.node(b, e - 1)?));
        }
        if last == ']' {
            let open = self.opening(b, e - 1).ok_or_else(|| self.error(b, e))?;
            if open > b {
                let target = self.node(b, open)?;
                let idx = self.node(open + 1, e - 1)?;
                return Ok(Node::index(target, idx));
            }
            return Err(self.error(b, e));
        }
        if first == '(' && self.closing(b, e) == Some(e - 1) {
            return self.node(b + 1, e - 1);
        }
        if last == ')' {
            if let Some(open) = self.chars[b..e].iter().position(|&c| c == '(').map(|p| p + b) {
                if open > b && is_identifier(&self.text(b, open)) && self.closing(open, e) == Some(e - 1) {
                    return self.call(b, e, open);
                }
            }
            return Err(self.error(b, e));
        }
        if first == '"' && e - b >= 2 && self.string_end(b, e) == Some(e - 1) {
            return Ok(Node::from(unescape(&self.chars[b + 1..e - 1]).as_str()));
        }
        if first == '{' && self.closing(b, e) == Some(e - 1) {
            let ranges = self.split_list(b + 1, e - 1).ok_or_else(|| self.error(b, e))?;
            let mut items = Vec::with_capacity(ranges.len());
            for (ib, ie) in ranges {
                items.push(self.node(ib, ie)?);
            }
            return Ok(Node::array(items));
        }
        let text = self.text(b, e);
        if is_identifier(&text) {
            return Ok(Node::Var(intern(&text)));
        }
        Err(self.error(b, e))
    }
}

/// Compiles an expression into a node tree
pub fn compile(text: &str) -> CompileResult {
    let chars = strip(text);
    let res = Compiler { chars: &chars }.node(0, chars.len());
    if let Err(ref e) = res {
        debug!(target: "calcscript::parse", "{} in {:?}", e, text);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Controller;
    use crate::funcs::Func;
    use crate::stack::Stack;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn var(s: &str) -> Node {
        Node::Var(intern(s))
    }

    fn calc(text: &str) -> Node {
        let mut stack = Stack::new();
        let mut ctrl = Controller::new();
        compile(text).unwrap().calculate(&mut stack, &mut ctrl)
    }

    #[test]
    fn test_priority() {
        assert_eq!(calc("2+3*4"), Node::Int(14));
        assert_eq!(calc("(2+3)*4"), Node::Int(20));
        assert_eq!(calc("2^3^2"), Node::Int(64));
        assert_eq!(calc("10-4-3"), Node::Int(3));
        assert_eq!(calc("2*-3"), Node::Int(-6));
        assert_eq!(calc("1 / 0"), Node::Float(f64::INFINITY));
    }

    #[test]
    fn test_literals() {
        assert_eq!(compile("42"), Ok(Node::Int(42)));
        assert_eq!(compile("-42"), Ok(Node::Int(-42)));
        assert_eq!(compile("0x1F"), Ok(Node::Int(31)));
        assert_eq!(compile("2.5e3"), Ok(Node::Float(2500.0)));
        assert_eq!(compile("1e-7"), Ok(Node::Float(1e-7)));
        assert_eq!(compile("99999999999999999999"), Ok(Node::Float(1e20)));
        assert_eq!(compile("π"), Ok(Node::Float(PI)));
        assert_eq!(compile("\\pi"), Ok(Node::Float(PI)));
        assert_eq!(compile("\\euler"), Ok(Node::Float(E)));
        assert_eq!(compile("-∞"), Ok(Node::Float(f64::NEG_INFINITY)));
        assert_eq!(compile("undef"), Ok(Node::Float(f64::NAN)));
        assert_eq!(compile("ⅈ"), Ok(Node::ComplexInt(Complex::new(0, 1))));
        assert_eq!(compile("ℙ"), Ok(Node::Set(NumberSet::Prime)));
        assert_eq!(compile("'a'"), Ok(Node::Char('a')));
        assert_eq!(compile("' '"), Ok(Node::Char(' ')));
        assert_eq!(compile("'\\n'"), Ok(Node::Char('\n')));
        assert_eq!(compile("'\\\\'"), Ok(Node::Char('\\')));
        assert_eq!(compile("'\\''"), Ok(Node::Char('\'')));
        for c in &['\\', '\''] {
            let node = Node::binary(BinaryOp::Concat, Node::Char(*c), Node::Char(*c));
            assert_eq!(compile(&node.to_string()), Ok(node));
        }
        assert_eq!(compile("true"), Ok(Node::Bool(true)));
        assert_eq!(compile("\"a b\\\"c\""), Ok(Node::from("a b\"c")));
        assert_eq!(compile("{}"), Ok(Node::array(vec![])));
        assert_eq!(
            compile("{1, x}"),
            Ok(Node::array(vec![Node::Int(1), var("x")]))
        );
    }

    #[test]
    fn test_operators() {
        let (x, y) = (var("x"), var("y"));
        assert_eq!(
            compile("x+1e-7"),
            Ok(Node::binary(BinaryOp::Add, x.clone(), Node::Float(1e-7)))
        );
        assert_eq!(compile("--x"), Ok(Node::unary(UnaryOp::Negate, Node::unary(UnaryOp::Negate, x.clone()))));
        assert_eq!(compile("+x"), Ok(x.clone()));
        assert_eq!(compile("¬x"), Ok(Node::unary(UnaryOp::Not, x.clone())));
        assert_eq!(compile("ᵗx"), Ok(Node::unary(UnaryOp::Transpose, x.clone())));
        assert_eq!(compile("x!"), Ok(Node::unary(UnaryOp::Factorial, x.clone())));
        assert_eq!(compile("x²"), Ok(Node::binary(BinaryOp::Pow, x.clone(), Node::Int(2))));
        assert_eq!(compile("x⁻¹²"), Ok(Node::binary(BinaryOp::Pow, x.clone(), Node::Int(-12))));
        assert_eq!(compile("3→x"), Ok(Node::assign(Node::Int(3), x.clone())));
        assert_eq!(compile("set(x,3)"), Ok(Node::assign(Node::Int(3), x.clone())));
        assert_eq!(
            compile("x;y"),
            Ok(Node::binary(BinaryOp::Then, x.clone(), y.clone()))
        );
        assert_eq!(
            compile("x[1][y]"),
            Ok(Node::index(Node::index(x.clone(), Node::Int(1)), y.clone()))
        );
        assert_eq!(
            compile("x ∈ ℕ ˄ y ≤ 2"),
            Ok(Node::binary(
                BinaryOp::And,
                Node::binary(BinaryOp::ElementOf, x, Node::Set(NumberSet::Natural)),
                Node::binary(BinaryOp::LessEq, y, Node::Int(2)),
            ))
        );
    }

    #[test]
    fn test_calls() {
        let x = var("x");
        assert_eq!(compile("sin(x)"), Ok(Node::call(Func::Sin, vec![x.clone()])));
        assert_eq!(compile("rand()"), Ok(Node::call(Func::Rand, vec![])));
        assert_eq!(
            compile("min(x, 2)"),
            Ok(Node::call(Func::Min, vec![x.clone(), Node::Int(2)]))
        );
        assert_eq!(
            compile("f(x, g(1,2))"),
            Ok(Node::user_call(
                intern("f"),
                vec![x, Node::user_call(intern("g"), vec![Node::Int(1), Node::Int(2)])]
            ))
        );
        assert_eq!(
            compile("\"a,b\" ◦ \"c\""),
            Ok(Node::binary(BinaryOp::Concat, Node::from("a,b"), Node::from("c")))
        );
        match compile("program(\"1→a\nreturn(a)\")") {
            Ok(Node::Program(..)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_errors() {
        assert_eq!(compile(""), Err(CompileError::Parse { text: String::new() }));
        assert_eq!(compile("1+"), Err(CompileError::Parse { text: String::new() }));
        assert!(compile("(1+2").is_err());
        assert!(compile("1*/2").is_err());
        assert!(compile("x¬y").is_err());
        assert!(compile("2x").is_err());
        assert_eq!(compile("set(1,2)"), Err(CompileError::Parse { text: "set(1,2)".to_string() }));
        assert!(compile("set(a+1,2)").is_err());
        assert!(compile("set(f(a),2)").is_ok());
        assert!(compile("set(a[0],2)").is_ok());
        assert!(!is_identifier("2x"));
        assert!(is_identifier("_x2"));
    }

    fn leaf() -> impl Strategy<Value = Node> {
        prop_oneof![
            (-1000i64..1000).prop_map(Node::Int),
            prop::sample::select(vec![0.5, 2.5, -2.5, 1e-7, 1e20, f64::INFINITY, f64::NEG_INFINITY, f64::NAN])
                .prop_map(Node::Float),
            prop::sample::select(vec!["a", "b", "x1", "_y"]).prop_map(|s| Node::Var(intern(s))),
            any::<bool>().prop_map(Node::Bool),
            prop::sample::select(vec!['c', '\\', '\'', '"', '\n']).prop_map(Node::Char),
        ]
    }

    fn tree() -> impl Strategy<Value = Node> {
        let ops = vec![
            BinaryOp::Then,
            BinaryOp::And,
            BinaryOp::Eq,
            BinaryOp::Less,
            BinaryOp::Add,
            BinaryOp::Sub,
            BinaryOp::Mul,
            BinaryOp::Div,
            BinaryOp::Rem,
            BinaryOp::Pow,
        ];
        let unary = vec![UnaryOp::Negate, UnaryOp::Not, UnaryOp::Transpose, UnaryOp::Factorial];
        leaf().prop_recursive(4, 32, 2, move |inner| {
            prop_oneof![
                (prop::sample::select(ops.clone()), inner.clone(), inner.clone())
                    .prop_map(|(op, a, b)| Node::binary(op, a, b)),
                (prop::sample::select(unary.clone()), inner.clone()).prop_map(|(op, a)| Node::unary(op, a)),
                (inner.clone(), inner).prop_map(|(a, b)| Node::index(a, b)),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_render_roundtrip(node in tree()) {
            let text = node.to_string();
            prop_assert_eq!(compile(&text), Ok(node), "{}", text);
        }
    }
}
