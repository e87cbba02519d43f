//! Package stack + function registry (spec.md §3/§4.6).
//!
//! An ordered sequence of packages, each mapping `(namespace, name)` to a
//! [`Function`]. Activating a package moves it to the back of the sequence
//! (highest precedence); lookup walks back-to-front, skipping inactive
//! packages, and returns the first match.

use ahash::AHashMap;
use std::rc::Rc;

use crate::function::Function;

struct Package {
    name: String,
    active: bool,
    // namespace ("" for bare/global) -> name -> function
    functions: AHashMap<String, AHashMap<String, Rc<Function>>>,
}

pub struct FunctionRegistry {
    packages: Vec<Package>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            packages: vec![Package {
                name: String::new(),
                active: true,
                functions: AHashMap::new(),
            }],
        }
    }

    fn find_index(&self, name: &str) -> Option<usize> {
        self.packages.iter().position(|p| p.name == name)
    }

    /// Finds or creates a package by name, without changing its activation
    /// state or position. Used while registering functions declared inside
    /// a `package P { ... }` block, which must exist even before it is ever
    /// activated.
    pub fn ensure_package(&mut self, name: &str) -> usize {
        if let Some(idx) = self.find_index(name) {
            return idx;
        }
        self.packages.push(Package {
            name: name.to_string(),
            active: false,
            functions: AHashMap::new(),
        });
        self.packages.len() - 1
    }

    pub fn register(&mut self, package: &str, namespace: &str, name: &str, function: Rc<Function>) {
        let idx = self.ensure_package(package);
        self.packages[idx]
            .functions
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), function);
    }

    /// Activates `name`, moving it to the back of the precedence order (or
    /// inserting it there if it has never been registered). The empty
    /// package is always active at the front and never moves.
    pub fn activate(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        if let Some(idx) = self.find_index(name) {
            let mut pkg = self.packages.remove(idx);
            pkg.active = true;
            self.packages.push(pkg);
        } else {
            self.packages.push(Package {
                name: name.to_string(),
                active: true,
                functions: AHashMap::new(),
            });
        }
    }

    /// Marks `name` inactive without changing its position, so a later
    /// `activate` call restores its former precedence-order slot at the back.
    pub fn deactivate(&mut self, name: &str) {
        if let Some(idx) = self.find_index(name) {
            self.packages[idx].active = false;
        }
    }

    /// Back-to-front search over active packages for `(namespace, name)`.
    /// Returns the package index the match was found in, for `parent::`
    /// resolution against calls made from within that function.
    #[must_use]
    pub fn lookup(&self, namespace: &str, name: &str) -> Option<(usize, Rc<Function>)> {
        for (idx, pkg) in self.packages.iter().enumerate().rev() {
            if !pkg.active {
                continue;
            }
            if let Some(f) = pkg.functions.get(namespace).and_then(|ns| ns.get(name)) {
                return Some((idx, f.clone()));
            }
        }
        None
    }

    /// Walks the registry from just below `from_package_index`, searching
    /// for the next `(namespace, name)` match going toward the empty
    /// package. Used by `parent::name` (spec.md §4.6).
    #[must_use]
    pub fn lookup_parent(&self, from_package_index: usize, namespace: &str, name: &str) -> Option<(usize, Rc<Function>)> {
        for idx in (0..from_package_index).rev() {
            let pkg = &self.packages[idx];
            if !pkg.active {
                continue;
            }
            if let Some(f) = pkg.functions.get(namespace).and_then(|ns| ns.get(name)) {
                return Some((idx, f.clone()));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Function, NativeFunction, NativeCallback};
    use crate::value::Value;

    fn dummy_fn(name: &str) -> Rc<Function> {
        let callback: NativeCallback = Rc::new(|_, _, _| Value::Integer(0));
        Rc::new(Function::Native(Rc::new(NativeFunction {
            package: String::new(),
            namespace: String::new(),
            name: name.to_string(),
            callback,
        })))
    }

    #[test]
    fn activation_order_determines_precedence() {
        let mut reg = FunctionRegistry::new();
        reg.register("", "", "f", dummy_fn("root"));
        reg.register("a", "", "f", dummy_fn("a"));
        reg.register("b", "", "f", dummy_fn("b"));

        assert_eq!(reg.lookup("", "f").unwrap().1.name(), "root");

        reg.activate("a");
        assert_eq!(reg.lookup("", "f").unwrap().1.name(), "a");

        reg.activate("b");
        assert_eq!(reg.lookup("", "f").unwrap().1.name(), "b");

        reg.deactivate("b");
        assert_eq!(reg.lookup("", "f").unwrap().1.name(), "a");

        reg.activate("b");
        assert_eq!(reg.lookup("", "f").unwrap().1.name(), "b");
    }

    #[test]
    fn lookup_parent_walks_backward_from_owning_package() {
        let mut reg = FunctionRegistry::new();
        reg.register("", "", "f", dummy_fn("root"));
        reg.register("a", "", "f", dummy_fn("a"));
        reg.register("b", "", "f", dummy_fn("b"));
        reg.activate("a");
        reg.activate("b");

        let (b_idx, top) = reg.lookup("", "f").unwrap();
        assert_eq!(top.name(), "b");
        let (a_idx, mid) = reg.lookup_parent(b_idx, "", "f").unwrap();
        assert_eq!(mid.name(), "a");
        let (_, root) = reg.lookup_parent(a_idx, "", "f").unwrap();
        assert_eq!(root.name(), "root");
    }
}
