//! Line based scripts with `if`, `while`, `for` and `return` blocks.
//!
//! Every non-blank line is compiled on its own. Block openers are lines
//! of the form `if(c)`, `while(c)` and `for(init,cond,step)`; they are
//! closed by `endif`, `endwhile` and `endfor`, and `if` may have a single
//! `else`.

use std::fmt;
use tracing::debug;

use crate::errors::{CompileError, CompileResult};
use crate::eval::{stopped, Controller};
use crate::intern::Name;
use crate::node::{FaultKind, Node};
use crate::parse::compile;
use crate::stack::{Scope, Stack};

#[derive(Debug)]
enum Block {
    Statement(Node),
    Return(Node),
    If { cond: Node, line: usize, then: Box<Block> },
    IfElse { cond: Node, line: usize, then: Box<Block>, otherwise: Box<Block> },
    While { cond: Node, line: usize, body: Box<Block> },
    For { init: Node, cond: Node, step: Node, line: usize, body: Box<Block> },
    Statements(Vec<Block>),
}

/// Classified source line
enum Line {
    If(Node),
    Else,
    EndIf,
    While(Node),
    EndWhile,
    For(Node, Node, Node),
    EndFor,
    Return(Node),
    Statement(Node),
}

fn classify(node: Node) -> Line {
    let keyword = match &node {
        Node::Var(name) => match name.as_str() {
            "else" => Some(Line::Else),
            "endif" => Some(Line::EndIf),
            "endwhile" => Some(Line::EndWhile),
            "endfor" => Some(Line::EndFor),
            _ => None,
        },
        Node::UserCall(name, args) => match (name.as_str(), &args[..]) {
            ("if", [c]) => Some(Line::If(c.clone())),
            ("while", [c]) => Some(Line::While(c.clone())),
            ("for", [i, c, s]) => Some(Line::For(i.clone(), c.clone(), s.clone())),
            ("return", [r]) => Some(Line::Return(r.clone())),
            _ => None,
        },
        _ => None,
    };
    keyword.unwrap_or(Line::Statement(node))
}

/// Block under construction
enum Open {
    If { cond: Node, line: usize, then: Vec<Block>, otherwise: Option<Vec<Block>> },
    While { cond: Node, line: usize, body: Vec<Block> },
    For { init: Node, cond: Node, step: Node, line: usize, body: Vec<Block> },
}

impl Open {
    fn line(&self) -> usize {
        match self {
            Open::If { line, .. } | Open::While { line, .. } | Open::For { line, .. } => *line,
        }
    }

    fn body(&mut self) -> &mut Vec<Block> {
        match self {
            Open::If { otherwise: Some(body), .. } => body,
            Open::If { then, .. } => then,
            Open::While { body, .. } | Open::For { body, .. } => body,
        }
    }
}

/// Compiled script. Two scripts are equal when their sources are.
pub struct Script {
    source: String,
    body: Block,
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Script({:?})", self.source)
    }
}

impl PartialEq for Script {
    fn eq(&self, other: &Script) -> bool {
        self.source == other.source
    }
}

fn statements(blocks: Vec<Block>) -> Box<Block> {
    Box::new(Block::Statements(blocks))
}

enum Flow {
    Next,
    Return(Node),
}

impl Script {
    pub fn compile(text: &str) -> CompileResult<Script> {
        let mut open: Vec<Open> = Vec::new();
        let mut top: Vec<Block> = Vec::new();

        for (idx, raw) in text.split('\n').enumerate() {
            let line = idx + 1;
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let node = compile(raw).map_err(|e| {
                debug!(target: "calcscript::program", "line {}: {}", line, e);
                CompileError::Interpret { line, cause: Some(Box::new(e)) }
            })?;
            let closed = match classify(node) {
                Line::If(cond) => {
                    open.push(Open::If { cond, line, then: Vec::new(), otherwise: None });
                    None
                }
                Line::While(cond) => {
                    open.push(Open::While { cond, line, body: Vec::new() });
                    None
                }
                Line::For(init, cond, step) => {
                    open.push(Open::For { init, cond, step, line, body: Vec::new() });
                    None
                }
                Line::Else => match open.last_mut() {
                    Some(Open::If { otherwise: otherwise @ None, .. }) => {
                        *otherwise = Some(Vec::new());
                        None
                    }
                    _ => return Err(CompileError::interpret(line)),
                },
                Line::EndIf => match open.pop() {
                    Some(Open::If { cond, line, then, otherwise }) => Some(match otherwise {
                        Some(otherwise) => Block::IfElse {
                            cond,
                            line,
                            then: statements(then),
                            otherwise: statements(otherwise),
                        },
                        None => Block::If { cond, line, then: statements(then) },
                    }),
                    _ => return Err(CompileError::interpret(line)),
                },
                Line::EndWhile => match open.pop() {
                    Some(Open::While { cond, line, body }) => Some(Block::While { cond, line, body: statements(body) }),
                    _ => return Err(CompileError::interpret(line)),
                },
                Line::EndFor => match open.pop() {
                    Some(Open::For { init, cond, step, line, body }) => Some(Block::For {
                        init,
                        cond,
                        step,
                        line,
                        body: statements(body),
                    }),
                    _ => return Err(CompileError::interpret(line)),
                },
                Line::Return(node) => Some(Block::Return(node)),
                Line::Statement(node) => Some(Block::Statement(node)),
            };
            if let Some(block) = closed {
                match open.last_mut() {
                    Some(o) => o.body().push(block),
                    None => top.push(block),
                }
            }
        }
        if let Some(o) = open.last() {
            return Err(CompileError::interpret(o.line()));
        }
        Ok(Script { source: text.to_string(), body: Block::Statements(top) })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn referenced_names(&self, out: &mut Vec<Name>) {
        self.body.referenced_names(out);
    }

    /// Runs the script in a new frame on top of `scope`. A script without
    /// `return` yields `true`.
    pub fn run(&self, scope: &mut dyn Scope, ctrl: &mut Controller) -> Node {
        let mut frame = Stack::with_parent(scope);
        match self.body.exec(&mut frame, ctrl) {
            Flow::Return(node) => node,
            Flow::Next => Node::Bool(true),
        }
    }
}

fn condition(cond: &Node, line: usize, scope: &mut dyn Scope, ctrl: &mut Controller) -> Result<bool, Node> {
    match cond.calculate(scope, ctrl) {
        Node::Bool(b) => Ok(b),
        _ => Err(Node::fault(
            FaultKind::Condition,
            &format!("neither true nor false in condition in line {}", line),
        )),
    }
}

impl Block {
    fn exec(&self, scope: &mut dyn Scope, ctrl: &mut Controller) -> Flow {
        match self {
            Block::Statement(node) => {
                node.calculate(scope, ctrl);
                Flow::Next
            }
            Block::Return(node) => Flow::Return(node.calculate(scope, ctrl)),
            Block::If { cond, line, then } => match condition(cond, *line, scope, ctrl) {
                Ok(true) => then.exec(scope, ctrl),
                Ok(false) => Flow::Next,
                Err(fault) => Flow::Return(fault),
            },
            Block::IfElse { cond, line, then, otherwise } => match condition(cond, *line, scope, ctrl) {
                Ok(true) => then.exec(scope, ctrl),
                Ok(false) => otherwise.exec(scope, ctrl),
                Err(fault) => Flow::Return(fault),
            },
            Block::While { cond, line, body } => loop {
                if ctrl.is_stopped() {
                    return Flow::Return(stopped(Some(*line)));
                }
                match condition(cond, *line, scope, ctrl) {
                    Ok(true) => {}
                    Ok(false) => return Flow::Next,
                    Err(fault) => return Flow::Return(fault),
                }
                if let Flow::Return(node) = body.exec(scope, ctrl) {
                    return Flow::Return(node);
                }
            },
            Block::For { init, cond, step, line, body } => {
                init.calculate(scope, ctrl);
                loop {
                    if ctrl.is_stopped() {
                        return Flow::Return(stopped(Some(*line)));
                    }
                    match condition(cond, *line, scope, ctrl) {
                        Ok(true) => {}
                        Ok(false) => return Flow::Next,
                        Err(fault) => return Flow::Return(fault),
                    }
                    if let Flow::Return(node) = body.exec(scope, ctrl) {
                        return Flow::Return(node);
                    }
                    step.calculate(scope, ctrl);
                }
            }
            Block::Statements(blocks) => {
                for block in blocks {
                    if let Flow::Return(node) = block.exec(scope, ctrl) {
                        return Flow::Return(node);
                    }
                }
                Flow::Next
            }
        }
    }

    fn referenced_names(&self, out: &mut Vec<Name>) {
        match self {
            Block::Statement(n) | Block::Return(n) => n.referenced_names(out),
            Block::If { cond, then, .. } => {
                cond.referenced_names(out);
                then.referenced_names(out);
            }
            Block::IfElse { cond, then, otherwise, .. } => {
                cond.referenced_names(out);
                then.referenced_names(out);
                otherwise.referenced_names(out);
            }
            Block::While { cond, body, .. } => {
                cond.referenced_names(out);
                body.referenced_names(out);
            }
            Block::For { init, cond, step, body, .. } => {
                init.referenced_names(out);
                cond.referenced_names(out);
                step.referenced_names(out);
                body.referenced_names(out);
            }
            Block::Statements(blocks) => blocks.iter().for_each(|b| b.referenced_names(out)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::intern;
    use crate::stack::Variable;
    use pretty_assertions::assert_eq;

    fn run(text: &str) -> Node {
        let mut stack = Stack::new();
        let mut ctrl = Controller::new();
        Script::compile(text).unwrap().run(&mut stack, &mut ctrl)
    }

    #[test]
    fn test_while() {
        let text = "0→i\nwhile(i<10)\n  i+1→i\nendwhile\nreturn(i)";
        assert_eq!(run(text), Node::Int(10));
        let text = "set(s,0)\nset(i,0)\nwhile(i<5)\nset(s,s+i)\nset(i,i+1)\nendwhile\nreturn(s)";
        assert_eq!(run(text), Node::Int(10));
    }

    #[test]
    fn test_if_else() {
        let text = "5→x\nif(x>3)\nreturn(\"big\")\nelse\nreturn(\"small\")\nendif";
        assert_eq!(run(text), Node::from("big"));
        let text = "1→x\nif(x>3)\nreturn(\"big\")\nelse\nreturn(\"small\")\nendif";
        assert_eq!(run(text), Node::from("small"));
        assert_eq!(run("1→x\nif(x>3)\n2→x\nendif"), Node::Bool(true));
    }

    #[test]
    fn test_for() {
        let text = "0→s\nfor(1→k,k≤4,k+1→k)\ns+k→s\nendfor\nreturn(s)";
        assert_eq!(run(text), Node::Int(10));
        let text = "for(0→k,true,k+1→k)\nif(k=3)\nreturn(k*k)\nendif\nendfor";
        assert_eq!(run(text), Node::Int(9));
    }

    #[test]
    fn test_errors() {
        assert_eq!(Script::compile("1+1\nwhile(true)\n2").unwrap_err().line(), Some(2));
        assert_eq!(Script::compile("1+1\n\nendif").unwrap_err().line(), Some(3));
        assert_eq!(Script::compile("if(true)\nelse\nelse\nendif").unwrap_err().line(), Some(3));
        assert_eq!(Script::compile("while(true)\nendfor").unwrap_err().line(), Some(2));
        assert_eq!(Script::compile("1+\n").unwrap_err().line(), Some(1));

        let res = run("\n\nif(3)\nendif");
        assert_eq!(res.fault_kind(), Some(FaultKind::Condition));
        assert_eq!(res, Node::fault(FaultKind::Condition, "neither true nor false in condition in line 3"));
    }

    #[test]
    fn test_frames() {
        let mut stack = Stack::new();
        let mut ctrl = Controller::new();
        let (g, l) = (intern("prog_global"), intern("prog_local"));
        stack.set_local(Variable::new(g, Node::Int(1)));
        let script = Script::compile("prog_global+1→prog_global\n7→prog_local").unwrap();
        assert_eq!(script.run(&mut stack, &mut ctrl), Node::Bool(true));
        assert_eq!(stack.get(g).and_then(Variable::value), Some(&Node::Int(2)));
        assert!(stack.get(l).is_none());

        let mut names = Vec::new();
        script.referenced_names(&mut names);
        assert!(names.contains(&g) && names.contains(&l));
    }

    #[test]
    fn test_stop() {
        let mut stack = Stack::new();
        let mut ctrl = Controller::new();
        ctrl.stop();
        let res = Script::compile("while(true)\nendwhile").unwrap().run(&mut stack, &mut ctrl);
        assert_eq!(res, Node::fault(FaultKind::Stopped, "Stopped in line 1"));
    }

    #[test]
    fn test_program_node() {
        let script = Script::compile("return(2)").unwrap();
        assert_eq!(script.source(), "return(2)");
        assert_eq!(compile("program(\"return(2)\")").unwrap(), Node::Program(std::rc::Rc::new(script)));
        assert_eq!(run("return(program(\"return(6*7)\"))"), Node::Int(42));
    }
}
