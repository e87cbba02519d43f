//! End-to-end scenarios and cross-cutting invariants exercised through the
//! public embedding API only (no access to compiler/VM internals).

use std::cell::RefCell;
use std::rc::Rc;

use torque_script::{CollectingPlatformContext, FileHandle, FileMode, Interpreter, InterpreterConfig, NullPlatformContext, PlatformContext, Value};

fn interp() -> Interpreter {
    Interpreter::new(InterpreterConfig::default(), Box::new(NullPlatformContext))
}

/// `Interpreter::new` takes ownership of the boxed platform, so a test that
/// wants to inspect what was logged needs its own channel back out; this
/// shares one `Vec` per kind behind an `Rc<RefCell<_>>`.
#[derive(Clone, Default)]
struct SharedPlatform {
    echo: Rc<RefCell<Vec<String>>>,
    warnings: Rc<RefCell<Vec<String>>>,
}

impl PlatformContext for SharedPlatform {
    fn log_echo(&mut self, message: &str) {
        self.echo.borrow_mut().push(message.to_string());
    }
    fn log_warning(&mut self, message: &str) {
        self.warnings.borrow_mut().push(message.to_string());
    }
    fn log_error(&mut self, _message: &str) {}
    fn open_file(&mut self, _path: &str, _mode: FileMode) -> std::io::Result<Box<dyn FileHandle>> {
        Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "no filesystem access"))
    }
}

#[test]
fn scenario_1_for_loop_accumulates_by_five() {
    let mut i = interp();
    i.evaluate("$g = 0; for (%i = 0; %i < 10; %i++) { $g = $g + 5; }").unwrap();
    assert_eq!(i.get_global("g").to_integer(), 50);
}

#[test]
fn scenario_2_while_loop_counts_down_and_up() {
    let mut i = interp();
    i.evaluate("$g = 100; %i = 10; while (%i) { $g = $g + 1; %i = %i - 1; }").unwrap();
    assert_eq!(i.get_global("g").to_integer(), 110);
}

#[test]
fn scenario_3_if_else_selects_the_right_branch_per_condition() {
    let mut i = interp();
    i.evaluate("$one = 10; $two = -10; if (1) $three = 200; else $three = 0; if (0) $four = 0; else $four = 500;")
        .unwrap();
    assert_eq!(i.get_global("one").to_integer(), 10);
    assert_eq!(i.get_global("two").to_integer(), -10);
    assert_eq!(i.get_global("three").to_integer(), 200);
    assert_eq!(i.get_global("four").to_integer(), 500);
}

#[test]
fn scenario_4_package_activation_changes_call_precedence() {
    let mut i = interp();
    i.evaluate("function f() {return 1;}").unwrap();
    i.evaluate("package A { function f() {return 2;} }").unwrap();
    i.evaluate("package B { function f() {return 3;} }").unwrap();

    assert_eq!(i.evaluate("return f();").unwrap().to_integer(), 1);
    i.activate_package("A");
    assert_eq!(i.evaluate("return f();").unwrap().to_integer(), 2);
    i.activate_package("B");
    assert_eq!(i.evaluate("return f();").unwrap().to_integer(), 3);
}

#[test]
fn scenario_5_array_fold_reaches_echo() {
    let platform = SharedPlatform::default();
    let mut i = Interpreter::new(InterpreterConfig::default(), Box::new(platform.clone()));
    i.evaluate("$result[1,2,3] = 5; echo($result_1_2_3);").unwrap();
    assert_eq!(platform.echo.borrow().as_slice(), ["5"]);
}

#[test]
fn scenario_6_switch_multi_case_and_default() {
    let mut i = interp();
    i.evaluate("$x = 3; switch ($x) { case 1: $r=10; case 2 or 3: $r=20; default: $r=-10; }").unwrap();
    assert_eq!(i.get_global("r").to_integer(), 20);

    let mut i = interp();
    i.evaluate("$x = 7; switch ($x) { case 1: $r=10; case 2 or 3: $r=20; default: $r=-10; }").unwrap();
    assert_eq!(i.get_global("r").to_integer(), -10);
}

#[test]
fn determinism_same_source_yields_same_globals() {
    let mut a = interp();
    let mut b = interp();
    let src = "$g = 0; for (%i = 0; %i < 7; %i++) { $g = $g + %i; }";
    a.evaluate(src).unwrap();
    b.evaluate(src).unwrap();
    assert_eq!(a.get_global("g"), b.get_global("g"));
}

#[test]
fn parent_chaining_runs_base_then_each_package_in_activation_order() {
    let mut i = interp();
    i.evaluate(
        r#"
        function f() { $trace = $trace @ "root"; return 0; }
        package P1 { function f() { $trace = $trace @ "p1"; return parent::f(); } }
        package P2 { function f() { $trace = $trace @ "p2"; return parent::f(); } }
        "#,
    )
    .unwrap();
    i.activate_package("P1");
    i.activate_package("P2");
    i.evaluate("$trace = \"\"; f();").unwrap();
    assert_eq!(i.get_global("trace").to_torque_string(), "p2p1root");
}

#[test]
fn case_sensitivity_toggle_changes_whether_echo_and_ecHO_are_the_same_function() {
    let mut insensitive = Interpreter::new(
        InterpreterConfig {
            case_sensitive: false,
            ..Default::default()
        },
        Box::new(NullPlatformContext),
    );
    let insensitive_result = insensitive.evaluate("return ECHO(\"hi\");").unwrap();
    assert_eq!(insensitive_result.to_integer(), 0); // echo() itself always returns 0

    let platform = SharedPlatform::default();
    let mut sensitive = Interpreter::new(
        InterpreterConfig {
            case_sensitive: true,
            ..Default::default()
        },
        Box::new(platform.clone()),
    );
    // ECHO is a distinct, unregistered name in case-sensitive mode: the call
    // is unresolved and logs a warning instead of reaching echo's body.
    let sensitive_result = sensitive.evaluate("return ECHO(\"hi\");").unwrap();
    assert_eq!(sensitive_result.to_integer(), 0);
    assert_eq!(platform.warnings.borrow().len(), 1);
}

#[test]
fn round_trip_formats_integers_and_short_floats_back_to_the_same_value() {
    let mut i = interp();
    assert_eq!(i.evaluate("return 42;").unwrap(), Value::Integer(42));
    let f = i.evaluate("return 3.5;").unwrap();
    assert_eq!(f.to_torque_string().parse::<f32>().unwrap(), 3.5);
}

#[test]
fn unknown_method_call_on_a_console_object_logs_and_yields_zero() {
    let platform = SharedPlatform::default();
    let mut i = Interpreter::new(InterpreterConfig::default(), Box::new(platform.clone()));
    i.register_class("ScriptObject", None, Box::new(|| Box::new(torque_script::GenericObject::new("ScriptObject"))));
    let result = i.evaluate(r#"$probe = new ScriptObject() {}; return $probe.noSuchMethod();"#).unwrap();
    assert_eq!(result.to_integer(), 0);
    assert_eq!(platform.warnings.borrow().len(), 1);
}

#[test]
fn collecting_platform_context_buffers_every_channel() {
    let mut platform = CollectingPlatformContext::default();
    platform.log_echo("e");
    platform.log_warning("w");
    assert_eq!(platform.echo, vec!["e".to_string()]);
    assert_eq!(platform.warnings, vec!["w".to_string()]);
}
