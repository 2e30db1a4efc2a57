//! Variables and scope frames.
//!
//! A frame owns its variables, sorted by name id, and borrows its parent.
//! Lookups walk the chain from the innermost frame outwards.

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

use crate::intern::Name;
use crate::node::Node;

/// Named cell holding a value or a user function body
#[derive(Clone, Debug)]
pub struct Variable {
    name: Name,
    params: Option<Vec<Name>>,
    value: Option<Node>,
    mod_count: u64,
    // frame counter at insertion, tells a re-created variable from the old one
    serial: u64,
    // names the value refers to, valid for the stored mod_count
    pendent: RefCell<Option<(u64, Rc<[Name]>)>>,
}

impl Variable {
    pub fn new(name: Name, value: Node) -> Self {
        Variable {
            name,
            params: None,
            value: Some(value),
            mod_count: 0,
            serial: 0,
            pendent: RefCell::new(None),
        }
    }

    /// Declared variable without a value
    pub fn unbound(name: Name) -> Self {
        Variable {
            name,
            params: None,
            value: None,
            mod_count: 0,
            serial: 0,
            pendent: RefCell::new(None),
        }
    }

    /// User function: `body` is kept unevaluated
    pub fn function(name: Name, params: Vec<Name>, body: Node) -> Self {
        Variable {
            name,
            params: Some(params),
            value: Some(body),
            mod_count: 0,
            serial: 0,
            pendent: RefCell::new(None),
        }
    }

    pub fn name(&self) -> Name {
        self.name
    }

    pub fn params(&self) -> Option<&[Name]> {
        self.params.as_deref()
    }

    pub fn value(&self) -> Option<&Node> {
        self.value.as_ref()
    }

    pub fn is_function(&self) -> bool {
        self.params.is_some()
    }

    pub fn mod_count(&self) -> u64 {
        self.mod_count
    }

    pub fn set_value(&mut self, value: Node) {
        self.params = None;
        self.value = Some(value);
        self.mod_count += 1;
    }

    pub fn set_function(&mut self, params: Vec<Name>, body: Node) {
        self.params = Some(params);
        self.value = Some(body);
        self.mod_count += 1;
    }

    /// Takes over value and parameters of `other`, keeping the identity
    pub fn replace(&mut self, other: Variable) {
        self.params = other.params;
        self.value = other.value;
        self.mod_count += 1;
    }

    /// Sorted ids of the variables and functions the value refers to,
    /// without the function's own parameters
    pub fn pendent(&self) -> Rc<[Name]> {
        if let Some((count, names)) = &*self.pendent.borrow() {
            if *count == self.mod_count {
                return Rc::clone(names);
            }
        }
        let mut names = Vec::new();
        if let Some(v) = &self.value {
            v.referenced_names(&mut names);
        }
        names.sort();
        names.dedup();
        if let Some(params) = &self.params {
            names.retain(|n| !params.contains(n));
        }
        let names: Rc<[Name]> = Rc::from(names);
        *self.pendent.borrow_mut() = Some((self.mod_count, Rc::clone(&names)));
        names
    }
}

/// Chain of variable frames
pub trait Scope {
    /// Variable visible from this frame: local first, then the parents
    fn get(&self, id: Name) -> Option<&Variable>;
    fn get_local(&self, id: Name) -> Option<&Variable>;
    fn get_mut(&mut self, id: Name) -> Option<&mut Variable>;
    /// Changes the nearest existing variable. Returns false if there is none.
    fn assign(&mut self, id: Name, value: Node) -> bool;
    /// Creates or overwrites a variable in this frame
    fn set_local(&mut self, var: Variable);
    /// Creates or overwrites a variable in the root frame
    fn set_global(&mut self, var: Variable);
    /// Overwrites a local variable, else assigns in the parents, else
    /// creates a local one
    fn assign_add_local(&mut self, id: Name, value: Node);
    /// Same as `assign_add_local` for a whole variable
    fn replace_add_local(&mut self, var: Variable);
    fn delete(&mut self, id: Name) -> bool;
    /// Changes in this frame plus changes in the parents
    fn mod_count(&self) -> u64;
    fn clear(&mut self);
}

/// Scope frame with an optional parent
#[derive(Default)]
pub struct Stack<'p> {
    vars: Vec<Variable>,
    parent: Option<&'p mut dyn Scope>,
    mod_count: u64,
}

impl<'p> fmt::Debug for Stack<'p> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Stack")
            .field("vars", &self.vars)
            .field("has_parent", &self.parent.is_some())
            .field("mod_count", &self.mod_count)
            .finish()
    }
}

impl<'p> Stack<'p> {
    /// Root frame
    pub fn new() -> Self {
        Stack {
            vars: Vec::new(),
            parent: None,
            mod_count: 0,
        }
    }

    pub fn with_parent(parent: &'p mut dyn Scope) -> Self {
        Stack {
            vars: Vec::new(),
            parent: Some(parent),
            mod_count: 0,
        }
    }

    /// Local variables sorted by id
    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn position(&self, id: Name) -> Result<usize, usize> {
        self.vars.binary_search_by(|v| v.name.cmp(&id))
    }

    fn in_parents(&self, id: Name) -> bool {
        self.parent.as_ref().map_or(false, |p| p.get(id).is_some())
    }

    fn insert(&mut self, idx: usize, mut var: Variable) {
        trace!(target: "calcscript::stack", "new variable {}", var.name);
        self.mod_count += 1;
        var.serial = self.mod_count;
        self.vars.insert(idx, var);
    }
}

impl<'p> Scope for Stack<'p> {
    fn get(&self, id: Name) -> Option<&Variable> {
        match self.position(id) {
            Ok(idx) => Some(&self.vars[idx]),
            Err(..) => self.parent.as_ref().and_then(|p| p.get(id)),
        }
    }

    fn get_local(&self, id: Name) -> Option<&Variable> {
        self.position(id).ok().map(|idx| &self.vars[idx])
    }

    fn get_mut(&mut self, id: Name) -> Option<&mut Variable> {
        match self.position(id) {
            Ok(idx) => Some(&mut self.vars[idx]),
            Err(..) => match &mut self.parent {
                Some(p) => p.get_mut(id),
                None => None,
            },
        }
    }

    fn assign(&mut self, id: Name, value: Node) -> bool {
        match self.position(id) {
            Ok(idx) => {
                trace!(target: "calcscript::stack", "assign {} = {}", id, value);
                self.vars[idx].set_value(value);
                self.mod_count += 1;
                true
            }
            Err(..) => match &mut self.parent {
                Some(p) => p.assign(id, value),
                None => false,
            },
        }
    }

    fn set_local(&mut self, var: Variable) {
        match self.position(var.name) {
            Ok(idx) => {
                self.vars[idx].replace(var);
                self.mod_count += 1;
            }
            Err(idx) => self.insert(idx, var),
        }
    }

    fn set_global(&mut self, var: Variable) {
        match &mut self.parent {
            Some(p) => p.set_global(var),
            None => self.set_local(var),
        }
    }

    fn assign_add_local(&mut self, id: Name, value: Node) {
        match self.position(id) {
            Ok(..) => {
                self.assign(id, value);
            }
            Err(idx) => {
                if self.in_parents(id) {
                    if let Some(p) = &mut self.parent {
                        p.assign(id, value);
                    }
                } else {
                    self.insert(idx, Variable::new(id, value));
                }
            }
        }
    }

    fn replace_add_local(&mut self, var: Variable) {
        match self.position(var.name) {
            Ok(..) => self.set_local(var),
            Err(idx) => {
                if self.in_parents(var.name) {
                    if let Some(p) = &mut self.parent {
                        p.replace_add_local(var);
                    }
                } else {
                    self.insert(idx, var);
                }
            }
        }
    }

    fn delete(&mut self, id: Name) -> bool {
        match self.position(id) {
            Ok(idx) => {
                trace!(target: "calcscript::stack", "delete {}", id);
                self.vars.remove(idx);
                self.mod_count += 1;
                true
            }
            Err(..) => match &mut self.parent {
                Some(p) => p.delete(id),
                None => false,
            },
        }
    }

    fn mod_count(&self) -> u64 {
        self.mod_count + self.parent.as_ref().map_or(0, |p| p.mod_count())
    }

    fn clear(&mut self) {
        self.vars.clear();
        self.mod_count += 1;
    }
}

/// Result of an observer update
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Changes {
    /// variables added, removed or modified since the last update
    pub changed: Vec<Name>,
    /// variables whose value refers, directly or not, to a changed one
    pub dependent: Vec<Name>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.dependent.is_empty()
    }
}

type Listener = Box<dyn FnMut(Name)>;

/// Tracks the variables of one frame between updates
#[derive(Default)]
pub struct Observer {
    // name with (insertion serial, mod_count)
    snapshot: Vec<(Name, (u64, u64))>,
    listeners: FxHashMap<Name, Vec<Listener>>,
}

fn snapshot(frame: &Stack) -> Vec<(Name, (u64, u64))> {
    frame.variables().iter().map(|v| (v.name(), (v.serial, v.mod_count()))).collect()
}

impl Observer {
    pub fn new() -> Self {
        Default::default()
    }

    /// Observer whose first update reports only changes made after this call
    pub fn watch(frame: &Stack) -> Self {
        Observer {
            snapshot: snapshot(frame),
            listeners: FxHashMap::default(),
        }
    }

    /// Registers a closure called with the id whenever that variable
    /// changes or depends on a change
    pub fn listen<F: FnMut(Name) + 'static>(&mut self, id: Name, f: F) {
        self.listeners.entry(id).or_insert_with(Vec::new).push(Box::new(f));
    }

    pub fn update(&mut self, frame: &Stack) -> Changes {
        let current = snapshot(frame);
        let mut changed = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.snapshot.len() || j < current.len() {
            match (self.snapshot.get(i), current.get(j)) {
                (Some(old), Some(new)) if old.0 == new.0 => {
                    if old.1 != new.1 {
                        changed.push(new.0);
                    }
                    i += 1;
                    j += 1;
                }
                (Some(old), Some(new)) if old.0 < new.0 => {
                    changed.push(old.0);
                    i += 1;
                }
                (_, Some(new)) => {
                    changed.push(new.0);
                    j += 1;
                }
                (Some(old), None) => {
                    changed.push(old.0);
                    i += 1;
                }
                (None, None) => break,
            }
        }
        self.snapshot = current;

        let mut dependent: Vec<Name> = Vec::new();
        loop {
            let mut grown = false;
            for var in frame.variables() {
                let id = var.name();
                if changed.binary_search(&id).is_ok() || dependent.contains(&id) {
                    continue;
                }
                let reaches = var
                    .pendent()
                    .iter()
                    .any(|n| changed.binary_search(n).is_ok() || dependent.contains(n));
                if reaches {
                    dependent.push(id);
                    grown = true;
                }
            }
            if !grown {
                break;
            }
        }
        dependent.sort();

        if !changed.is_empty() {
            trace!(target: "calcscript::stack", "changed {:?}, dependent {:?}", changed, dependent);
        }
        for id in changed.iter().chain(dependent.iter()) {
            if let Some(list) = self.listeners.get_mut(id) {
                for f in list.iter_mut() {
                    f(*id);
                }
            }
        }
        Changes { changed, dependent }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::intern;
    use crate::parse::compile;
    use std::cell::Cell;

    #[test]
    fn test_shadowing() {
        let x = intern("stack_x");
        let mut root = Stack::new();
        root.set_local(Variable::new(x, Node::Int(1)));
        {
            let mut child = Stack::with_parent(&mut root);
            assert_eq!(child.get(x).and_then(|v| v.value()), Some(&Node::Int(1)));
            child.set_local(Variable::new(x, Node::Int(2)));
            assert_eq!(child.get(x).and_then(|v| v.value()), Some(&Node::Int(2)));
            assert!(child.get_local(x).is_some());
        }
        assert_eq!(root.get(x).and_then(|v| v.value()), Some(&Node::Int(1)));
    }

    #[test]
    fn test_assign_to_parent() {
        let x = intern("stack_y");
        let mut root = Stack::new();
        root.set_local(Variable::new(x, Node::Int(1)));
        let before = root.mod_count();
        {
            let mut child = Stack::with_parent(&mut root);
            child.assign_add_local(x, Node::Int(5));
            assert!(child.is_empty());
            assert_eq!(child.get(x).and_then(|v| v.value()), Some(&Node::Int(5)));
        }
        assert_eq!(root.mod_count(), before + 1);
        assert_eq!(root.get(x).and_then(|v| v.value()), Some(&Node::Int(5)));
        assert_eq!(root.get(x).map(Variable::mod_count), Some(1));
    }

    #[test]
    fn test_add_local() {
        let (x, y) = (intern("stack_a"), intern("stack_b"));
        let mut root = Stack::new();
        {
            let mut child = Stack::with_parent(&mut root);
            child.assign_add_local(x, Node::Int(1));
            assert_eq!(child.len(), 1);
            assert!(!child.assign(y, Node::Int(2)));
            child.set_global(Variable::new(y, Node::Int(3)));
            assert!(child.get_local(y).is_none());
            assert!(child.delete(y));
        }
        assert!(root.get(x).is_none());
        assert!(root.get(y).is_none());
    }

    #[test]
    fn test_pendent() {
        let (f, a, p) = (intern("stack_f"), intern("stack_c"), intern("stack_p"));
        let body = compile("stack_p*stack_c+stack_c").unwrap();
        let var = Variable::function(f, vec![p], body);
        assert_eq!(&*var.pendent(), &[a][..]);
    }

    #[test]
    fn test_observer() {
        let (a, b, c) = (intern("obs_a"), intern("obs_b"), intern("obs_c"));
        let mut root = Stack::new();
        root.set_local(Variable::new(a, Node::Int(1)));
        root.set_local(Variable::new(b, compile("obs_a+1").unwrap()));
        root.set_local(Variable::new(c, compile("obs_b*2").unwrap()));
        let mut observer = Observer::watch(&root);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        observer.listen(c, move |_| counter.set(counter.get() + 1));

        assert!(observer.update(&root).is_empty());
        root.assign(a, Node::Int(2));
        let changes = observer.update(&root);
        assert_eq!(changes.changed, vec![a]);
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(changes.dependent, expected);
        assert_eq!(calls.get(), 1);

        root.delete(b);
        let changes = observer.update(&root);
        assert_eq!(changes.changed, vec![b]);
        assert_eq!(changes.dependent, vec![c]);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_observer_recreated() {
        let (a, b) = (intern("obs_re_a"), intern("obs_re_b"));
        let mut root = Stack::new();
        root.set_local(Variable::new(a, Node::Int(1)));
        root.set_local(Variable::new(b, compile("obs_re_a*2").unwrap()));
        let mut observer = Observer::watch(&root);

        root.delete(a);
        root.set_local(Variable::new(a, Node::Int(5)));
        let changes = observer.update(&root);
        assert_eq!(changes.changed, vec![a]);
        assert_eq!(changes.dependent, vec![b]);

        root.clear();
        root.set_local(Variable::new(a, Node::Int(7)));
        let changes = observer.update(&root);
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(changes.changed, expected);
        assert!(observer.update(&root).is_empty());
    }
}
