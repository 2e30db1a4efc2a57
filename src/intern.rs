//! Process-wide name table.
//!
//! Every identifier (variables, user functions, parameters) is stored once
//! and referred to by a small integer id, so scope lookups compare integers
//! instead of strings. The table only grows.

use lazy_static::lazy_static;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;

/// Interned identifier
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(u32);

impl Name {
    /// Raw id of the name, stable for the lifetime of the process
    pub fn id(self) -> u32 {
        self.0
    }

    pub fn as_str(self) -> &'static str {
        INTERNER.name_of(self)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.as_str(), self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Table {
    ids: FxHashMap<&'static str, u32>,
    names: Vec<&'static str>,
}

/// Append-only name table guarded by a single lock.
pub struct Interner {
    table: RwLock<Table>,
}

impl Default for Interner {
    fn default() -> Self {
        Interner {
            table: RwLock::new(Table {
                ids: FxHashMap::default(),
                names: Vec::with_capacity(64),
            }),
        }
    }
}

impl Interner {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the id of `text`, inserting it on first use
    pub fn intern(&self, text: &str) -> Name {
        {
            let table = self.table.read();
            if let Some(&id) = table.ids.get(text) {
                return Name(id);
            }
        }

        let mut table = self.table.write();
        // another thread may have inserted it between the two locks
        if let Some(&id) = table.ids.get(text) {
            return Name(id);
        }
        let id = table.names.len() as u32;
        let stored: &'static str = Box::leak(text.to_owned().into_boxed_str());
        table.names.push(stored);
        table.ids.insert(stored, id);
        Name(id)
    }

    /// Returns the id of `text` without inserting it
    pub fn lookup(&self, text: &str) -> Option<Name> {
        self.table.read().ids.get(text).map(|&id| Name(id))
    }

    /// Text of an interned name. Ids are only handed out by `intern`, so an
    /// unknown id can only come from another interner.
    pub fn name_of(&self, name: Name) -> &'static str {
        self.table.read().names.get(name.0 as usize).copied().unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.table.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

lazy_static! {
    static ref INTERNER: Interner = Interner::new();
}

/// Interns `text` in the global table
pub fn intern(text: &str) -> Name {
    INTERNER.intern(text)
}

/// Text of a name from the global table
pub fn name_of(name: Name) -> &'static str {
    INTERNER.name_of(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_intern() {
        let interner = Interner::new();
        let a = interner.intern("alpha");
        let b = interner.intern("beta");
        assert_ne!(a, b);
        assert_eq!(interner.intern("alpha"), a);
        assert_eq!(interner.name_of(b), "beta");
        assert_eq!(interner.lookup("gamma"), None);
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_global() {
        let x = intern("test_global_x");
        assert_eq!(x.as_str(), "test_global_x");
        assert_eq!(name_of(x), "test_global_x");
        assert_eq!(intern("test_global_x"), x);
        assert_eq!(format!("{}", x), "test_global_x");
    }

    #[test]
    fn test_concurrent() {
        let interner = Arc::new(Interner::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let interner = Arc::clone(&interner);
                thread::spawn(move || (0..100).map(|i| interner.intern(&format!("v{}", i))).collect::<Vec<_>>())
            })
            .collect();
        let results: Vec<Vec<Name>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(interner.len(), 100);
    }
}
