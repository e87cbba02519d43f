//! Embedding façade (spec.md §6): the single entry point a host program
//! constructs, owning the string table, global scope, function registry, and
//! object registry for the lifetime of the embedding.

use ahash::AHashMap;

use crate::bytecode::{compile_program, CodeBlock};
use crate::error::TorqueError;
use crate::function::{Function, NativeCallback, NativeFunction};
use crate::intern::Interner;
use crate::object::{ClassInitFn, ObjectRegistry};
use crate::parser::parse;
use crate::platform::PlatformContext;
use crate::registry::FunctionRegistry;
use crate::value::Value;
use crate::vm::{self, ExecState};

/// Callback signature accepted by [`Interpreter::register_native`]. Re-exported
/// under this name because the embedding API (spec.md §6) names it `NativeFn`;
/// it's the same shape as [`crate::function::NativeCallback`].
pub type NativeFn = NativeCallback;

/// The four knobs spec.md §6 names for constructing an [`Interpreter`].
/// `max_recursion_depth` of 0 means unbounded, matching the VM's guard
/// (spec.md §4.5).
pub struct InterpreterConfig {
    pub max_recursion_depth: u32,
    pub case_sensitive: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: 0,
            case_sensitive: false,
        }
    }
}

/// Owns everything a running script needs outside its own call frame. One
/// `Interpreter` is meant to live for as long as the embedding host wants a
/// single TorqueScript namespace (spec.md §5: single-threaded, no shared
/// interpreter state across instances).
pub struct Interpreter {
    interner: Interner,
    globals: AHashMap<crate::intern::StringId, Value>,
    functions: FunctionRegistry,
    objects: ObjectRegistry,
    platform: Box<dyn PlatformContext>,
    max_recursion_depth: usize,
}

impl Interpreter {
    #[must_use]
    pub fn new(config: InterpreterConfig, platform: Box<dyn PlatformContext>) -> Self {
        let mut interp = Self {
            interner: Interner::new(config.case_sensitive),
            globals: AHashMap::new(),
            functions: FunctionRegistry::new(),
            objects: ObjectRegistry::new(),
            platform,
            max_recursion_depth: config.max_recursion_depth as usize,
        };
        interp.register_builtins();
        interp
    }

    /// The one concrete native function spec.md §7 names directly: `echo`
    /// concatenates its arguments (left to right — plain concatenation is
    /// associative, so evaluation order doesn't matter here) and forwards the
    /// result to `PlatformContext::log_echo`. Everything else the embedding
    /// host wants reachable from script goes through `register_native`.
    fn register_builtins(&mut self) {
        let echo: NativeFn = std::rc::Rc::new(|_this, state, args| {
            let message: String = args.iter().map(Value::to_torque_string).collect();
            state.platform.log_echo(&message);
            Value::Integer(0)
        });
        self.register_native("", "", "echo", echo);
    }

    /// Registers a host function under `package`/`namespace`/`name`, visible
    /// to script code the same way a script-declared function is (spec.md
    /// §3/§6). An empty `package` registers into the always-active base
    /// package.
    pub fn register_native(&mut self, package: &str, namespace: &str, name: &str, f: NativeFn) {
        let function = Function::Native(std::rc::Rc::new(NativeFunction {
            package: package.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            callback: f,
        }));
        self.functions.register(package, namespace, name, std::rc::Rc::new(function));
    }

    /// Registers a console-object class, optionally deriving from `parent`
    /// (spec.md §3/§4.7). Re-registering a name replaces its descriptor and
    /// recomputes every class's flattened hierarchy.
    pub fn register_class(&mut self, name: &str, parent: Option<&str>, init: ClassInitFn) {
        self.objects.register_class(name, parent, init);
    }

    #[must_use]
    pub fn get_global(&self, name: &str) -> Value {
        self.interner
            .find(name)
            .and_then(|id| self.globals.get(&id).cloned())
            .unwrap_or(Value::Integer(0))
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        let id = self.interner.intern(name);
        self.globals.insert(id, value);
    }

    /// Parses and compiles `source` without executing it. Returned
    /// `CodeBlock`s may be re-run any number of times via [`Self::execute`].
    pub fn compile(&mut self, source: &str) -> Result<CodeBlock, TorqueError> {
        let program = parse(source)?;
        let code = compile_program(&program, &mut self.interner)?;
        Ok(code)
    }

    /// Runs a previously compiled program's top-level body, first registering
    /// any functions it declares (spec.md §4.5: `RegisterFunction` runs as
    /// part of the top-level body, not as a separate pass).
    pub fn execute(&mut self, code: &CodeBlock) -> Result<Value, TorqueError> {
        let mut state = self.exec_state();
        let result = vm::execute(&mut state, &code.functions, &code.top_level)?;
        Ok(result)
    }

    /// `compile` then `execute` in one step, the common case for a one-shot
    /// script or a REPL line (spec.md §6).
    pub fn evaluate(&mut self, source: &str) -> Result<Value, TorqueError> {
        let code = self.compile(source)?;
        self.execute(&code)
    }

    /// Renders a disassembly listing of `code`'s top-level body followed by
    /// each function it declares, resolving string-table operands against
    /// this interpreter's interner (spec.md §6 CLI behaviour).
    #[must_use]
    pub fn disassemble_code(&self, code: &CodeBlock) -> String {
        let mut out = format!("; top level\n{}", crate::disasm::disassemble(&code.top_level, &self.interner));
        for function in &code.functions {
            out.push_str(&format!(
                "; function {}::{}\n{}",
                function.namespace,
                function.name,
                crate::disasm::disassemble(&function.body, &self.interner)
            ));
        }
        out
    }

    /// Moves `name` to the back of the precedence order (spec.md §4.6): its
    /// functions now shadow same-named functions in lower-precedence
    /// packages, including the base package.
    pub fn activate_package(&mut self, name: &str) {
        let folded = self.interner.fold(name).into_owned();
        self.functions.activate(&folded);
    }

    /// Marks `name` inactive without losing its precedence-order slot, so a
    /// later `activate_package` restores it to the same position (spec.md
    /// §4.6).
    pub fn deactivate_package(&mut self, name: &str) {
        let folded = self.interner.fold(name).into_owned();
        self.functions.deactivate(&folded);
    }

    fn exec_state(&mut self) -> ExecState<'_> {
        ExecState {
            interner: &mut self.interner,
            globals: &mut self.globals,
            functions: &mut self.functions,
            objects: &mut self.objects,
            platform: self.platform.as_mut(),
            max_recursion_depth: self.max_recursion_depth,
            call_depth: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NullPlatformContext;

    #[test]
    fn evaluate_runs_a_program_and_returns_its_result() {
        let mut interp = Interpreter::new(InterpreterConfig::default(), Box::new(NullPlatformContext));
        let result = interp.evaluate("$x = 10; return $x * 4;").unwrap();
        assert_eq!(result.to_integer(), 40);
    }

    /// Mirrors a host that wants to keep its own handle on echoed output
    /// after handing a boxed `PlatformContext` to the interpreter.
    struct SharedEcho(std::rc::Rc<std::cell::RefCell<Vec<String>>>);
    impl PlatformContext for SharedEcho {
        fn log_echo(&mut self, message: &str) {
            self.0.borrow_mut().push(message.to_string());
        }
        fn log_warning(&mut self, _message: &str) {}
        fn log_error(&mut self, _message: &str) {}
        fn open_file(&mut self, _path: &str, _mode: crate::platform::FileMode) -> std::io::Result<Box<dyn crate::platform::FileHandle>> {
            Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "no filesystem access"))
        }
    }

    #[test]
    fn echo_concatenates_arguments_and_forwards_to_platform() {
        let echoed = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut interp = Interpreter::new(InterpreterConfig::default(), Box::new(SharedEcho(echoed.clone())));
        interp.evaluate(r#"echo("result: ", 5 + 2);"#).unwrap();
        assert_eq!(echoed.borrow().as_slice(), ["result: 7"]);
    }

    #[test]
    fn globals_persist_across_separate_evaluate_calls() {
        let mut interp = Interpreter::new(InterpreterConfig::default(), Box::new(NullPlatformContext));
        interp.evaluate("$counter = 0;").unwrap();
        interp.evaluate("$counter = $counter + 1;").unwrap();
        interp.evaluate("$counter = $counter + 1;").unwrap();
        assert_eq!(interp.get_global("counter").to_integer(), 2);
    }

    #[test]
    fn set_global_is_visible_to_evaluated_source() {
        let mut interp = Interpreter::new(InterpreterConfig::default(), Box::new(NullPlatformContext));
        interp.set_global("seed", Value::Integer(7));
        let result = interp.evaluate("return $seed + 1;").unwrap();
        assert_eq!(result.to_integer(), 8);
    }

    #[test]
    fn package_activation_shadows_base_function() {
        let mut interp = Interpreter::new(InterpreterConfig::default(), Box::new(NullPlatformContext));
        interp.evaluate("function greet() { return 1; }").unwrap();
        interp
            .evaluate("package P1 { function greet() { return 2; } };")
            .unwrap();
        assert_eq!(interp.evaluate("return greet();").unwrap().to_integer(), 1);
        interp.activate_package("P1");
        assert_eq!(interp.evaluate("return greet();").unwrap().to_integer(), 2);
        interp.deactivate_package("P1");
        assert_eq!(interp.evaluate("return greet();").unwrap().to_integer(), 1);
    }

    #[test]
    fn compiled_code_block_can_be_executed_more_than_once() {
        let mut interp = Interpreter::new(InterpreterConfig::default(), Box::new(NullPlatformContext));
        let code = interp.compile("$hits = $hits + 1; return $hits;").unwrap();
        assert_eq!(interp.execute(&code).unwrap().to_integer(), 1);
        assert_eq!(interp.execute(&code).unwrap().to_integer(), 2);
    }
}
