//! Console object model: class descriptors, instances, and the
//! instantiation-descriptor tree built while executing `new Type(...) {...}`.
//!
//! Only the [`ConsoleObject`] trait is part of this crate's contract (spec.md
//! §1): concrete host classes like `FileObject`/`SimSet`/`ScriptObject` are
//! the embedder's concern. [`GenericObject`] is the default implementation
//! used when the host registers a class without a custom initialiser.

use ahash::AHashMap;
use std::fmt;

use crate::intern::StringId;
use crate::value::Value;

/// Monotonically assigned, never reused for the lifetime of the interpreter
/// (spec.md §3 Invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Reconstructs an `ObjectId` from a raw integer, the form console
    /// object references take once they've round-tripped through a `Value`
    /// (e.g. the result of `new Type() {...}` stored in a variable and later
    /// used as a bound-call target). Does not check the id is live; callers
    /// go through `ObjectRegistry::get`/`get_mut` for that.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The interface every console object instance implements. Field access is
/// keyed by interned, case-folded name (spec.md §3 "tagged fields").
pub trait ConsoleObject {
    fn class_name(&self) -> &str;
    fn get_field(&self, name: StringId) -> Option<Value>;
    fn set_field(&mut self, name: StringId, value: Value);
    fn add_child(&mut self, child: ObjectId);
    fn remove_child(&mut self, child: ObjectId);
    fn children(&self) -> &[ObjectId];
}

/// Default, dynamically-fielded console object used unless the host supplies
/// its own initialiser for a class.
pub struct GenericObject {
    class_name: String,
    fields: AHashMap<StringId, Value>,
    children: Vec<ObjectId>,
}

impl GenericObject {
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: AHashMap::new(),
            children: Vec::new(),
        }
    }
}

impl ConsoleObject for GenericObject {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn get_field(&self, name: StringId) -> Option<Value> {
        self.fields.get(&name).cloned()
    }

    fn set_field(&mut self, name: StringId, value: Value) {
        self.fields.insert(name, value);
    }

    fn add_child(&mut self, child: ObjectId) {
        self.children.push(child);
    }

    fn remove_child(&mut self, child: ObjectId) {
        self.children.retain(|&c| c != child);
    }

    fn children(&self) -> &[ObjectId] {
        &self.children
    }
}

/// Constructs a fresh, empty instance for a class. Boxed so hosts can supply
/// their own concrete `ConsoleObject` implementations.
pub type ClassInitFn = Box<dyn Fn() -> Box<dyn ConsoleObject>>;

pub struct ClassDescriptor {
    pub name: String,
    pub parent: Option<String>,
    /// Flattened ancestor chain, most-derived first, ending at the root
    /// class; recomputed whenever a new class is registered (spec.md §4.7).
    pub hierarchy: Vec<String>,
    pub init: ClassInitFn,
}

/// A field assignment resolved during the execution of
/// `PushObjectField`/`PopObjectInstantiation`.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub name: StringId,
    pub value: Value,
}

/// Tree node built on a per-frame stack while executing
/// `PushObjectInstantiation`/`PushObjectField`/`PopObjectInstantiation`, then
/// handed to [`ObjectRegistry::materialize`] for recursive instantiation.
#[derive(Debug, Clone)]
pub struct ObjectInstantiationDescriptor {
    pub type_name: String,
    pub name: String,
    pub fields: Vec<ResolvedField>,
    pub children: Vec<ObjectInstantiationDescriptor>,
}

/// Owns every registered class and every live instance.
#[derive(Default)]
pub struct ObjectRegistry {
    classes: AHashMap<String, ClassDescriptor>,
    instances: Vec<Option<Box<dyn ConsoleObject>>>,
    by_name: AHashMap<String, ObjectId>,
}

impl ObjectRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Class names are matched case-insensitively regardless of the
    /// interpreter's string-interning mode (spec.md §3 lists "type names"
    /// among the categories folded for lookup), so the registry keys and
    /// matches on the lowercased form rather than threading a case-sensitivity
    /// flag through a model that otherwise has no dependency on `Interner`.
    pub fn register_class(&mut self, name: &str, parent: Option<&str>, init: ClassInitFn) {
        self.classes.insert(
            name.to_ascii_lowercase(),
            ClassDescriptor {
                name: name.to_string(),
                parent: parent.map(str::to_ascii_lowercase),
                hierarchy: Vec::new(),
                init,
            },
        );
        self.recompute_hierarchies();
    }

    /// Hierarchies are stored in each class's original display casing (what
    /// the host passed to `register_class`), even though the walk itself
    /// keys off the lowercased name — callers like `class_hierarchy` look up
    /// by folded name but get back names worth printing or re-registering.
    fn recompute_hierarchies(&mut self) {
        let keys: Vec<String> = self.classes.keys().cloned().collect();
        for key in keys {
            let mut hierarchy = vec![self.classes[&key].name.clone()];
            let mut current_key = self.classes.get(&key).and_then(|d| d.parent.clone());
            // Guard against accidental cycles rather than looping forever.
            let mut guard = 0;
            let mut seen = vec![key.clone()];
            while let Some(parent_key) = current_key {
                if seen.contains(&parent_key) || guard > 256 {
                    break;
                }
                guard += 1;
                seen.push(parent_key.clone());
                let Some(parent_descriptor) = self.classes.get(&parent_key) else {
                    break;
                };
                hierarchy.push(parent_descriptor.name.clone());
                current_key = parent_descriptor.parent.clone();
            }
            if let Some(descriptor) = self.classes.get_mut(&key) {
                descriptor.hierarchy = hierarchy;
            }
        }
    }

    #[must_use]
    pub fn class_hierarchy(&self, class_name: &str) -> &[String] {
        self.classes
            .get(&class_name.to_ascii_lowercase())
            .map_or(&[], |d| d.hierarchy.as_slice())
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&dyn ConsoleObject> {
        self.instances
            .get(id.as_u32() as usize)
            .and_then(|slot| slot.as_deref())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut (dyn ConsoleObject + 'static)> {
        self.instances
            .get_mut(id.as_u32() as usize)
            .and_then(|slot| slot.as_deref_mut())
    }

    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<ObjectId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn resolve(&self, id_or_name: &str) -> Option<ObjectId> {
        if let Ok(raw) = id_or_name.parse::<u32>() {
            let id = ObjectId(raw);
            if self.get(id).is_some() {
                return Some(id);
            }
        }
        self.find_by_name(id_or_name)
    }

    /// Depth-first materialisation of an instantiation-descriptor tree
    /// (spec.md §4.7). Returns the root's id, or `None` if the root's class
    /// is unknown (logged by the caller, which has the platform context).
    pub fn materialize(&mut self, descriptor: &ObjectInstantiationDescriptor) -> Option<ObjectId> {
        let Some(class) = self.classes.get(&descriptor.type_name.to_ascii_lowercase()) else {
            return None;
        };
        let mut instance = (class.init)();
        for field in &descriptor.fields {
            instance.set_field(field.name, field.value.clone());
        }
        let id = ObjectId(u32::try_from(self.instances.len()).expect("object id overflow"));
        self.instances.push(Some(instance));
        if !descriptor.name.is_empty() {
            self.by_name.insert(descriptor.name.clone(), id);
        }
        for child in &descriptor.children {
            if let Some(child_id) = self.materialize(child) {
                if let Some(parent) = self.get_mut(id) {
                    parent.add_child(child_id);
                }
            }
        }
        Some(id)
    }

    /// Removes an instance from both indices and unlinks it from its parent.
    pub fn destroy(&mut self, id: ObjectId, parent: Option<ObjectId>) {
        if let Some(slot) = self.instances.get_mut(id.as_u32() as usize) {
            *slot = None;
        }
        self.by_name.retain(|_, &mut v| v != id);
        if let Some(parent_id) = parent {
            if let Some(parent) = self.get_mut(parent_id) {
                parent.remove_child(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_chain(registry: &mut ObjectRegistry) {
        registry.register_class("ConsoleObject", None, Box::new(|| Box::new(GenericObject::new("ConsoleObject"))));
        registry.register_class(
            "SimObject",
            Some("ConsoleObject"),
            Box::new(|| Box::new(GenericObject::new("SimObject"))),
        );
        registry.register_class(
            "ScriptObject",
            Some("SimObject"),
            Box::new(|| Box::new(GenericObject::new("ScriptObject"))),
        );
    }

    #[test]
    fn hierarchy_is_flattened_most_derived_first() {
        let mut registry = ObjectRegistry::new();
        register_chain(&mut registry);
        assert_eq!(
            registry.class_hierarchy("ScriptObject"),
            &["ScriptObject".to_string(), "SimObject".to_string(), "ConsoleObject".to_string()]
        );
    }

    #[test]
    fn materialize_registers_by_name_and_children() {
        let mut registry = ObjectRegistry::new();
        register_chain(&mut registry);
        let child = ObjectInstantiationDescriptor {
            type_name: "ScriptObject".into(),
            name: "kid".into(),
            fields: Vec::new(),
            children: Vec::new(),
        };
        let root = ObjectInstantiationDescriptor {
            type_name: "ScriptObject".into(),
            name: "root".into(),
            fields: Vec::new(),
            children: vec![child],
        };
        let root_id = registry.materialize(&root).unwrap();
        assert_eq!(registry.find_by_name("root"), Some(root_id));
        let kid_id = registry.find_by_name("kid").unwrap();
        assert_eq!(registry.get(root_id).unwrap().children(), &[kid_id]);
    }

    #[test]
    fn materialize_returns_none_for_unknown_class() {
        let mut registry = ObjectRegistry::new();
        let descriptor = ObjectInstantiationDescriptor {
            type_name: "Unknown".into(),
            name: String::new(),
            fields: Vec::new(),
            children: Vec::new(),
        };
        assert!(registry.materialize(&descriptor).is_none());
    }
}
