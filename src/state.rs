use crate::errors::{CompileError, CompileResult};
use crate::eval::Controller;
use crate::funcs::is_builtin;
use crate::intern::{intern, Name};
use crate::node::Node;
use crate::parse::{compile, is_identifier};
use crate::program::Script;
use crate::stack::{Changes, Observer, Scope, Stack, Variable};

const LAST_RESULT: &str = "ans";

/// holds the current state of the engine: global variables, evaluation
/// settings and the observer of the global frame
pub struct CalcState {
    stack: Stack<'static>,
    ctrl: Controller,
    observer: Observer,
}

impl Default for CalcState {
    fn default() -> CalcState {
        CalcState::with_controller(Controller::new())
    }
}

impl CalcState {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_controller(ctrl: Controller) -> Self {
        let stack = Stack::new();
        let observer = Observer::watch(&stack);
        CalcState { stack, ctrl, observer }
    }

    pub fn controller(&self) -> &Controller {
        &self.ctrl
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.ctrl
    }

    pub fn stack(&self) -> &Stack<'static> {
        &self.stack
    }

    /// Returns the value of a global variable
    pub fn variable(&self, name: &str) -> Option<Node> {
        self.stack.get(intern(name)).and_then(Variable::value).cloned()
    }

    /// Check if variable name is valid:
    /// - name convention
    /// - does not conflict with a literal like `true` or `ℤ`
    /// - does not conflict with any function
    /// - does not conflict with special variables, like `ans`
    pub fn variable_name_validate(&self, name: &str) -> CompileResult<()> {
        let literal = !matches!(compile(name), Ok(Node::Var(..)));
        if !is_identifier(name) || literal || is_builtin(name) || name == LAST_RESULT {
            return Err(CompileError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Creates a global variable or replaces the value of an existing one.
    /// The value is stored as is, so an expression keeps depending on the
    /// variables it refers to.
    pub fn set_variable(&mut self, name: &str, value: Node) -> CompileResult<()> {
        self.variable_name_validate(name)?;
        self.stack.set_local(Variable::new(intern(name), value));
        Ok(())
    }

    pub fn delete_variable(&mut self, name: &str) -> bool {
        self.stack.delete(intern(name))
    }

    /// Returns the result of the last successful evaluation
    pub fn result(&self) -> Option<Node> {
        self.variable(LAST_RESULT)
    }

    /// Compiles and evaluates an expression in the global frame
    pub fn eval(&mut self, text: &str) -> CompileResult {
        let node = compile(text)?;
        let res = node.calculate(&mut self.stack, &mut self.ctrl);
        self.remember(&res);
        Ok(res)
    }

    /// Compiles and runs a multi-line script on top of the global frame
    pub fn run_script(&mut self, text: &str) -> CompileResult {
        let script = Script::compile(text)?;
        let res = script.run(&mut self.stack, &mut self.ctrl);
        self.remember(&res);
        Ok(res)
    }

    fn remember(&mut self, res: &Node) {
        if !res.is_fault() {
            self.stack.set_local(Variable::new(intern(LAST_RESULT), res.clone()));
        }
    }

    /// Global variables changed since the previous call, and the ones
    /// depending on them
    pub fn changes(&mut self) -> Changes {
        self.observer.update(&self.stack)
    }

    /// Registers a closure called by `changes` when the variable or
    /// anything it depends on has changed
    pub fn listen<F: FnMut(Name) + 'static>(&mut self, name: &str, f: F) {
        self.observer.listen(intern(name), f);
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

/// evaluates a given expression and returns either result or error
pub fn eval(expr: &str, state: &mut CalcState) -> CompileResult {
    state.eval(expr)
}
