//! Evaluation of node trees against a scope.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

use crate::funcs::{self, Func};
use crate::intern::Name;
use crate::node::*;
use crate::parse::compile;
use crate::program::Script;
use crate::stack::{Scope, Stack, Variable};
use crate::value;

/// Nesting limit for user function calls and stored expressions
const MAX_DEPTH: usize = 128;

/// Caller-owned evaluation settings and cancellation flag
#[derive(Debug)]
pub struct Controller {
    stop: Arc<AtomicBool>,
    calculate_random: bool,
    calculate_loop: bool,
    connect_empty_variables: bool,
    depth: usize,
    buffers: Vec<Vec<Node>>,
}

impl Default for Controller {
    fn default() -> Self {
        Controller {
            stop: Arc::new(AtomicBool::new(false)),
            calculate_random: true,
            calculate_loop: true,
            connect_empty_variables: false,
            depth: 0,
            buffers: Vec::new(),
        }
    }
}

impl Controller {
    /// Evaluates everything, random numbers and loops included
    pub fn new() -> Self {
        Default::default()
    }

    /// Leaves `rand()`, `while()` and `for()` unevaluated
    pub fn symbolic() -> Self {
        Controller::new().with_random(false).with_loops(false)
    }

    pub fn with_random(mut self, on: bool) -> Self {
        self.calculate_random = on;
        self
    }

    pub fn with_loops(mut self, on: bool) -> Self {
        self.calculate_loop = on;
        self
    }

    /// Unbound variables evaluate to placeholders instead of themselves
    pub fn with_placeholders(mut self, on: bool) -> Self {
        self.connect_empty_variables = on;
        self
    }

    /// Flag another thread can set to cancel a running evaluation
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn calculate_random(&self) -> bool {
        self.calculate_random
    }

    pub fn calculate_loop(&self) -> bool {
        self.calculate_loop
    }

    pub fn connect_empty_variables(&self) -> bool {
        self.connect_empty_variables
    }

    /// Argument vector for a built-in call, reused across calls
    pub(crate) fn take_buffer(&mut self) -> Vec<Node> {
        self.buffers.pop().unwrap_or_default()
    }

    pub(crate) fn return_buffer(&mut self, mut buf: Vec<Node>) {
        buf.clear();
        self.buffers.push(buf);
    }

    fn enter(&mut self) -> Result<(), Node> {
        if self.depth >= MAX_DEPTH {
            return Err(Node::fault(FaultKind::Recursion, "Maximum recursion depth exceeded"));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }
}

pub(crate) fn stopped(line: Option<usize>) -> Node {
    warn!(target: "calcscript::eval", "evaluation stopped");
    match line {
        Some(l) => Node::fault(FaultKind::Stopped, &format!("Stopped in line {}", l)),
        None => Node::fault(FaultKind::Stopped, "Stopped"),
    }
}

fn out_of_bounds(idx: &Node, len: usize) -> Node {
    Node::fault(
        FaultKind::OutOfBounds,
        &format!("Index {} out of bounds [0, {})", idx, len),
    )
}

fn not_an_array() -> Node {
    Node::fault(FaultKind::NotAnArray, "Not an Array")
}

impl Node {
    /// Evaluates the tree. Runtime errors come back as fault nodes.
    pub fn calculate(&self, scope: &mut dyn Scope, ctrl: &mut Controller) -> Node {
        if self.is_primitive() {
            return self.clone();
        }
        match self {
            Node::Var(name) => variable(*name, scope, ctrl),
            Node::Array(arr) => {
                let items = arr.items().iter().map(|n| n.calculate(scope, ctrl)).collect();
                Node::array(items)
            }
            Node::Map(m) => {
                let entries = m
                    .entries()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.calculate(scope, ctrl)))
                    .collect();
                Node::map(entries)
            }
            Node::Unary(op, a) => {
                let a = a.calculate(scope, ctrl);
                value::unary_or_symbolic(*op, &a)
            }
            Node::Binary(BinaryOp::Then, a, b) => {
                a.calculate(scope, ctrl);
                b.calculate(scope, ctrl)
            }
            Node::Binary(op, a, b) => {
                let a = a.calculate(scope, ctrl);
                match (op, &a) {
                    (BinaryOp::And, Node::Bool(false)) | (BinaryOp::Or, Node::Bool(true)) => return a,
                    _ => {}
                }
                let b = b.calculate(scope, ctrl);
                value::binary_or_symbolic(*op, &a, &b)
            }
            Node::Index(target, idx) => {
                let target = target.calculate(scope, ctrl);
                let idx = idx.calculate(scope, ctrl);
                index(target, idx)
            }
            Node::Assign(value, target) => assign(value, target, scope, ctrl),
            Node::Call(func, args) => call(self, *func, args, scope, ctrl),
            Node::UserCall(name, args) => user_call(*name, args, scope, ctrl),
            Node::HostCall(name) => match funcs::run_program_function(*name) {
                Some(b) => Node::Bool(b),
                None => self.clone(),
            },
            Node::Program(script) => script.run(scope, ctrl),
            _ => self.clone(),
        }
    }
}

fn variable(name: Name, scope: &mut dyn Scope, ctrl: &mut Controller) -> Node {
    let stored = match scope.get(name) {
        Some(var) if !var.is_function() => var.value().cloned(),
        _ => None,
    };
    match stored {
        Some(v) if v.is_primitive() => v,
        Some(v) => {
            if let Err(fault) = ctrl.enter() {
                return fault;
            }
            let res = v.calculate(scope, ctrl);
            ctrl.leave();
            res
        }
        None if ctrl.connect_empty_variables => Node::Placeholder(name),
        None => Node::Var(name),
    }
}

fn index(target: Node, idx: Node) -> Node {
    if target.is_fault() {
        return target;
    }
    if idx.is_fault() {
        return idx;
    }
    match target {
        Node::Array(ref arr) if idx.is_numeric() => match idx.as_integral() {
            Some(k) if k >= 0 && (k as usize) < arr.len() => arr.items()[k as usize].clone(),
            _ => out_of_bounds(&idx, arr.len()),
        },
        Node::Str(ref s) if idx.is_numeric() => {
            let len = s.chars().count();
            let ch = idx.as_integral().filter(|k| *k >= 0).and_then(|k| s.chars().nth(k as usize));
            ch.map_or_else(|| out_of_bounds(&idx, len), Node::Char)
        }
        Node::Map(ref m) if idx.is_primitive() && !matches!(idx, Node::Placeholder(..)) => match m.get(&idx) {
            Some(v) => v.clone(),
            None => Node::fault(FaultKind::OutOfBounds, &format!("Key {} not found", idx)),
        },
        Node::Placeholder(..) => Node::index(target, idx),
        _ if target.is_primitive() && idx.is_primitive() && !matches!(idx, Node::Placeholder(..)) => not_an_array(),
        _ => Node::index(target, idx),
    }
}

/// Validated position for writing into an array of `len` elements
fn write_position(idx: &Node, len: usize) -> Result<usize, Node> {
    match idx.as_integral() {
        Some(k) if k >= 0 && (k as usize) <= len => Ok(k as usize),
        _ => Err(out_of_bounds(idx, len + 1)),
    }
}

/// Replaces the element at `path` inside `node`, copying shared parts
fn set_path(node: &mut Node, path: &[Node], value: Node) -> Result<(), Node> {
    let (idx, rest) = match path.split_first() {
        Some(p) => p,
        None => {
            *node = value;
            return Ok(());
        }
    };
    match node {
        Node::Array(arr) => {
            let k = write_position(idx, arr.len())?;
            if !rest.is_empty() && k == arr.len() {
                return Err(out_of_bounds(idx, arr.len()));
            }
            let arr = Rc::make_mut(arr);
            if rest.is_empty() {
                arr.put(k, value);
            } else {
                if let Some(child) = arr.get_mut(k) {
                    set_path(child, rest, value)?;
                }
                arr.refresh();
            }
            Ok(())
        }
        Node::Map(m) => {
            if !idx.is_primitive() || matches!(idx, Node::Array(..) | Node::Map(..) | Node::Placeholder(..)) {
                return Err(Node::fault(FaultKind::OutOfBounds, &format!("Invalid map key {}", idx)));
            }
            let m = Rc::make_mut(m);
            if rest.is_empty() {
                m.insert(idx.clone(), value);
                return Ok(());
            }
            match m.get_mut(idx) {
                Some(child) => set_path(child, rest, value),
                None => Err(Node::fault(FaultKind::OutOfBounds, &format!("Key {} not found", idx))),
            }
        }
        _ => Err(not_an_array()),
    }
}

fn assign(value: &Node, target: &Node, scope: &mut dyn Scope, ctrl: &mut Controller) -> Node {
    match target {
        Node::Var(name) => {
            let v = value.calculate(scope, ctrl);
            scope.assign_add_local(*name, v.clone());
            v
        }
        Node::UserCall(name, args) => {
            let mut params = Vec::with_capacity(args.len());
            for arg in args.iter() {
                match arg {
                    Node::Var(p) => params.push(*p),
                    _ => return Node::fault(FaultKind::OnlyVariables, "Only variables allowed"),
                }
            }
            trace!(target: "calcscript::eval", "define {}({} params)", name, params.len());
            scope.replace_add_local(Variable::function(*name, params, value.clone()));
            value.clone()
        }
        Node::Index(..) => {
            let v = value.calculate(scope, ctrl);
            let mut path = Vec::new();
            let mut cur = target;
            while let Node::Index(t, i) = cur {
                path.push(i.calculate(scope, ctrl));
                cur = &**t;
            }
            path.reverse();
            if let Some(f) = path.iter().find(|n| n.is_fault()) {
                return f.clone();
            }
            let name = match cur {
                Node::Var(n) => *n,
                _ => return not_an_array(),
            };
            let mut root = match scope.get(name) {
                Some(var) if !var.is_function() => match var.value() {
                    Some(n) => n.clone(),
                    None => return not_an_array(),
                },
                _ => return not_an_array(),
            };
            match set_path(&mut root, &path, v.clone()) {
                Ok(()) => {
                    scope.assign(name, root);
                    v
                }
                Err(fault) => fault,
            }
        }
        _ => Node::fault(
            FaultKind::Incompatible,
            &format!("Cannot assign to {}", target),
        ),
    }
}

fn condition(node: &Node, scope: &mut dyn Scope, ctrl: &mut Controller) -> Result<bool, Node> {
    match node.calculate(scope, ctrl) {
        Node::Bool(b) => Ok(b),
        Node::Fault(f) => Err(Node::Fault(f)),
        other => Err(Node::fault(
            FaultKind::Condition,
            &format!("neither true nor false in condition {}", other),
        )),
    }
}

fn run_loop(
    init: Option<&Node>,
    cond: &Node,
    step: Option<&Node>,
    body: &Node,
    scope: &mut dyn Scope,
    ctrl: &mut Controller,
) -> Node {
    if let Some(init) = init {
        init.calculate(scope, ctrl);
    }
    let mut last = Node::Bool(true);
    loop {
        if ctrl.is_stopped() {
            return stopped(None);
        }
        match condition(cond, scope, ctrl) {
            Ok(true) => {}
            Ok(false) => return last,
            Err(fault) => return fault,
        }
        last = body.calculate(scope, ctrl);
        if let Some(step) = step {
            step.calculate(scope, ctrl);
        }
    }
}

/// Functions that decide themselves which arguments to evaluate
fn lazy_call(node: &Node, func: Func, args: &[Node], scope: &mut dyn Scope, ctrl: &mut Controller) -> Node {
    match (func, args) {
        (Func::If, [cond, yes, no]) => {
            let c = cond.calculate(scope, ctrl);
            match c {
                Node::Bool(true) => yes.calculate(scope, ctrl),
                Node::Bool(false) => no.calculate(scope, ctrl),
                _ => value::fallback(&[&c]).unwrap_or_else(|| Node::call(func, vec![c, yes.clone(), no.clone()])),
            }
        }
        (Func::While, [cond, body]) => {
            if !ctrl.calculate_loop {
                return node.clone();
            }
            run_loop(None, cond, None, body, scope, ctrl)
        }
        (Func::For, [init, cond, step, body]) => {
            if !ctrl.calculate_loop {
                return node.clone();
            }
            run_loop(Some(init), cond, Some(step), body, scope, ctrl)
        }
        (Func::Delete, [target]) => match target {
            Node::Var(name) | Node::UserCall(name, _) => Node::Bool(scope.delete(*name)),
            _ => Node::fault(FaultKind::OnlyVariables, "Only variables allowed"),
        },
        _ => node.clone(),
    }
}

fn call(node: &Node, func: Func, args: &[Node], scope: &mut dyn Scope, ctrl: &mut Controller) -> Node {
    if func.is_lazy() {
        return lazy_call(node, func, args, scope, ctrl);
    }
    match (func, args) {
        (Func::Rand, []) => {
            if ctrl.calculate_random {
                Node::Float(rand::random::<f64>())
            } else {
                node.clone()
            }
        }
        (Func::Compile, [text]) => match text.calculate(scope, ctrl) {
            Node::Str(s) => match compile(&s) {
                Ok(n) => n.calculate(scope, ctrl),
                Err(e) => Node::fault(FaultKind::Compile, &e.to_string()),
            },
            other => value::fallback(&[&other]).unwrap_or_else(|| Node::call(func, vec![other])),
        },
        (Func::Program, [text]) => match text.calculate(scope, ctrl) {
            Node::Str(s) => match Script::compile(&s) {
                Ok(script) => script.run(scope, ctrl),
                Err(e) => Node::fault(FaultKind::Compile, &e.to_string()),
            },
            other => value::fallback(&[&other]).unwrap_or_else(|| Node::call(func, vec![other])),
        },
        _ => {
            let mut buf = ctrl.take_buffer();
            for arg in args {
                buf.push(arg.calculate(scope, ctrl));
            }
            let res = funcs::apply(func, &buf)
                .or_else(|| {
                    let refs: Vec<&Node> = buf.iter().collect();
                    value::fallback(&refs)
                })
                .unwrap_or_else(|| Node::call(func, buf.clone()));
            ctrl.return_buffer(buf);
            res
        }
    }
}

fn user_call(name: Name, args: &[Node], scope: &mut dyn Scope, ctrl: &mut Controller) -> Node {
    let evaluated: Vec<Node> = args.iter().map(|a| a.calculate(scope, ctrl)).collect();
    let (params, body) = match scope.get(name) {
        Some(var) if var.is_function() => (
            var.params().map(<[Name]>::to_vec).unwrap_or_default(),
            var.value().cloned(),
        ),
        _ => return Node::user_call(name, evaluated),
    };
    if params.len() != evaluated.len() {
        return Node::fault(
            FaultKind::Arity,
            &format!("{} expects {} arguments, got {}", name, params.len(), evaluated.len()),
        );
    }
    let body = match body {
        Some(b) => b,
        None => return Node::user_call(name, evaluated),
    };
    if !evaluated.iter().all(Node::is_primitive) {
        return Node::user_call(name, evaluated);
    }
    if let Err(fault) = ctrl.enter() {
        return fault;
    }
    let res = {
        let mut frame = Stack::with_parent(scope);
        for (p, v) in params.into_iter().zip(evaluated) {
            frame.set_local(Variable::new(p, v));
        }
        body.calculate(&mut frame, ctrl)
    };
    ctrl.leave();
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::intern;
    use num_rational::Rational64;
    use pretty_assertions::assert_eq;

    fn run(stack: &mut Stack, text: &str) -> Node {
        let mut ctrl = Controller::new();
        compile(text).unwrap().calculate(stack, &mut ctrl)
    }

    #[test]
    fn test_arithmetic() {
        let mut stack = Stack::new();
        assert_eq!(run(&mut stack, "1/3+1/6"), Node::Ratio(Rational64::new(1, 2)));
        assert_eq!(run(&mut stack, "(1/2)*4"), Node::Int(2));
        assert_eq!(run(&mut stack, "1/0"), Node::Float(f64::INFINITY));
        assert_eq!(run(&mut stack, "0/0"), Node::Float(f64::NAN));
        assert_eq!(run(&mut stack, "5!"), Node::Int(120));
        assert_eq!(run(&mut stack, "ⅈ^2"), Node::Int(-1));
        assert_eq!(run(&mut stack, "7 ∈ ℙ"), Node::Bool(true));
        assert_eq!(run(&mut stack, "\"ab\" ◦ 'c'"), Node::from("abc"));
        assert_eq!(run(&mut stack, "{1,2}+{3,4}"), Node::array(vec![Node::Int(4), Node::Int(6)]));
        assert_eq!(run(&mut stack, "2 < 3 ˄ ¬false"), Node::Bool(true));
    }

    #[test]
    fn test_variables() {
        let mut stack = Stack::new();
        let x = intern("eval_x");
        assert_eq!(run(&mut stack, "eval_x+1"), Node::binary(BinaryOp::Add, Node::Var(x), Node::Int(1)));
        assert_eq!(run(&mut stack, "3→eval_x"), Node::Int(3));
        assert_eq!(run(&mut stack, "eval_x*2"), Node::Int(6));
        assert_eq!(run(&mut stack, "4→eval_x;eval_x^2"), Node::Int(16));

        let mut ctrl = Controller::new().with_placeholders(true);
        let unbound = compile("eval_unbound").unwrap().calculate(&mut stack, &mut ctrl);
        assert_eq!(unbound, Node::Placeholder(intern("eval_unbound")));
    }

    #[test]
    fn test_stored_expression() {
        let mut stack = Stack::new();
        let (a, b) = (intern("eval_a"), intern("eval_b"));
        stack.set_local(Variable::new(a, Node::Int(1)));
        stack.set_local(Variable::new(b, compile("eval_a+1").unwrap()));
        assert_eq!(run(&mut stack, "eval_b"), Node::Int(2));
        stack.assign(a, Node::Int(5));
        assert_eq!(run(&mut stack, "eval_b"), Node::Int(6));

        let c = intern("eval_self");
        stack.set_local(Variable::new(c, compile("eval_self+1").unwrap()));
        assert_eq!(run(&mut stack, "eval_self").fault_kind(), Some(FaultKind::Recursion));
    }

    #[test]
    fn test_user_functions() {
        let mut stack = Stack::new();
        assert_eq!(run(&mut stack, "eval_x^2+1→eval_f(eval_x)"), compile("eval_x^2+1").unwrap());
        assert_eq!(run(&mut stack, "eval_f(3)"), Node::Int(10));
        assert_eq!(run(&mut stack, "eval_f(1,2)").fault_kind(), Some(FaultKind::Arity));
        assert_eq!(run(&mut stack, "1→eval_g(2)").fault_kind(), Some(FaultKind::OnlyVariables));
        assert_eq!(
            run(&mut stack, "eval_f(eval_y)"),
            Node::user_call(intern("eval_f"), vec![Node::Var(intern("eval_y"))])
        );
        assert!(stack.get(intern("eval_x")).is_none());
        run(&mut stack, "if(eval_n<2, eval_n, eval_fib(eval_n-1)+eval_fib(eval_n-2))→eval_fib(eval_n)");
        assert_eq!(run(&mut stack, "eval_fib(10)"), Node::Int(55));
    }

    #[test]
    fn test_index() {
        let mut stack = Stack::new();
        run(&mut stack, "{1,{2,3}}→eval_arr");
        assert_eq!(run(&mut stack, "eval_arr[1][0]"), Node::Int(2));
        assert_eq!(run(&mut stack, "eval_arr[5]").fault_kind(), Some(FaultKind::OutOfBounds));
        assert_eq!(run(&mut stack, "eval_arr[0][0]").fault_kind(), Some(FaultKind::NotAnArray));
        assert_eq!(run(&mut stack, "\"abc\"[1]"), Node::Char('b'));

        assert_eq!(run(&mut stack, "9→eval_arr[1][1]"), Node::Int(9));
        assert_eq!(run(&mut stack, "eval_arr[1]"), Node::array(vec![Node::Int(2), Node::Int(9)]));
        assert_eq!(run(&mut stack, "4→eval_arr[2]"), Node::Int(4));
        assert_eq!(run(&mut stack, "size(eval_arr)"), Node::Int(3));
        assert_eq!(run(&mut stack, "1→eval_arr[7]").fault_kind(), Some(FaultKind::OutOfBounds));
        assert_eq!(run(&mut stack, "1→eval_arr[0][0]").fault_kind(), Some(FaultKind::NotAnArray));
        assert_eq!(run(&mut stack, "size(eval_arr)"), Node::Int(3));
    }

    #[test]
    fn test_functions() {
        let mut stack = Stack::new();
        assert_eq!(run(&mut stack, "if(1<2, 10, 20)"), Node::Int(10));
        assert_eq!(run(&mut stack, "sqrt(16)+abs(-2)"), Node::Int(6));
        assert_eq!(run(&mut stack, "compile(\"2*3\")"), Node::Int(6));
        assert_eq!(run(&mut stack, "compile(\"2*\")").fault_kind(), Some(FaultKind::Compile));
        assert_eq!(run(&mut stack, "for(0→eval_i, eval_i<5, eval_i+1→eval_i, eval_i)"), Node::Int(4));
        assert_eq!(run(&mut stack, "while(eval_i<8, eval_i+1→eval_i)"), Node::Int(8));
        assert_eq!(run(&mut stack, "delete(eval_i)"), Node::Bool(true));
        assert_eq!(run(&mut stack, "delete(eval_i)"), Node::Bool(false));
        assert_eq!(run(&mut stack, "while(1, 2)").fault_kind(), Some(FaultKind::Condition));
        match run(&mut stack, "rand()") {
            Node::Float(f) => assert!((0.0..1.0).contains(&f)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_program_functions() {
        use std::sync::atomic::AtomicUsize;
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        assert!(funcs::register_program_function("eval_hook", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        }));
        let node = compile("eval_hook()").unwrap();
        assert_eq!(node, Node::HostCall(intern("eval_hook")));
        assert_eq!(node.to_string(), "eval_hook()");

        let mut stack = Stack::new();
        assert_eq!(run(&mut stack, "eval_hook() ˅ true"), Node::Bool(true));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(funcs::unregister_program_function("eval_hook"));
        let mut ctrl = Controller::new();
        assert_eq!(node.calculate(&mut stack, &mut ctrl), node);
        assert_eq!(
            run(&mut stack, "eval_hook()"),
            Node::user_call(intern("eval_hook"), vec![])
        );
    }

    #[test]
    fn test_symbolic_controller() {
        let mut stack = Stack::new();
        let mut ctrl = Controller::symbolic();
        let node = compile("rand()").unwrap();
        assert_eq!(node.calculate(&mut stack, &mut ctrl), node);
        let node = compile("while(true, 1)").unwrap();
        assert_eq!(node.calculate(&mut stack, &mut ctrl), node);
    }

    #[test]
    fn test_buffer_reuse() {
        let mut stack = Stack::new();
        let mut ctrl = Controller::new();
        let node = compile("max(sqrt(16), 2)").unwrap();
        assert_eq!(node.calculate(&mut stack, &mut ctrl), Node::Int(4));
        assert_eq!(ctrl.buffers.len(), 2);
        assert!(ctrl.buffers.iter().all(|b| b.is_empty() && b.capacity() > 0));
        node.calculate(&mut stack, &mut ctrl);
        assert_eq!(ctrl.buffers.len(), 2);
    }

    #[test]
    fn test_stop() {
        let mut stack = Stack::new();
        let mut ctrl = Controller::new();
        ctrl.stop();
        let node = compile("while(true, 1)").unwrap();
        assert_eq!(node.calculate(&mut stack, &mut ctrl).fault_kind(), Some(FaultKind::Stopped));
        ctrl.reset();
        assert!(!ctrl.stop_handle().load(Ordering::SeqCst));
    }
}
