//! Script and native functions, as stored in the [`crate::registry::FunctionRegistry`].
//!
//! Both variants implement the same invocation contract (spec.md §3): a
//! package, a namespace, a name, and a way to run given arguments.

use std::rc::Rc;

use crate::bytecode::InstructionSequence;
use crate::object::ObjectId;
use crate::value::Value;

/// A function declared in script source.
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    pub package: String,
    pub namespace: String,
    pub name: String,
    pub params: Vec<String>,
    pub body: InstructionSequence,
}

/// Host callback signature: `(this-object, execution-state, argument-vector)`
/// returning at most one result (spec.md §6 embedding API).
pub type NativeCallback = Rc<dyn Fn(Option<ObjectId>, &mut crate::vm::ExecState, &[Value]) -> Value>;

#[derive(Clone)]
pub struct NativeFunction {
    pub package: String,
    pub namespace: String,
    pub name: String,
    pub callback: NativeCallback,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("package", &self.package)
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Function {
    Script(Rc<ScriptFunction>),
    Native(Rc<NativeFunction>),
}

impl Function {
    #[must_use]
    pub fn package(&self) -> &str {
        match self {
            Self::Script(f) => &f.package,
            Self::Native(f) => &f.package,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Script(f) => &f.namespace,
            Self::Native(f) => &f.namespace,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Script(f) => &f.name,
            Self::Native(f) => &f.name,
        }
    }
}
