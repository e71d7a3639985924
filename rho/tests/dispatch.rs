use rho::{
    ArenaSettings, ArgList, Expr, ExprArg, Formal, Interpreter,
    InterpreterCreateInfo, MethodCacheState, Object, ObjectRef, Opcode,
    PrimitiveMethodsCode, QuickCheck, RuntimeError, builtin_index,
};

fn interp() -> Interpreter {
    Interpreter::new(InterpreterCreateInfo::default()).expect("default settings are valid")
}

fn torture_interp() -> Interpreter {
    Interpreter::new(InterpreterCreateInfo {
        arena: ArenaSettings {
            torture: true,
            ..Default::default()
        },
        ..Default::default()
    })
    .expect("torture settings are valid")
}

fn sym(interp: &Interpreter, name: &str) -> Expr {
    Expr::Symbol(interp.symbols.intern(name))
}

fn call(interp: &Interpreter, name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(sym(interp, name), args.into_iter().map(ExprArg::new).collect())
}

fn function(interp: &Interpreter, formals: &[&str], body: Expr) -> Expr {
    let formals = formals
        .iter()
        .map(|name| Formal::new(interp.symbols.intern(name)))
        .collect();
    Expr::function(formals, body)
}

fn define(interp: &mut Interpreter, name: &str, value: Expr) {
    let name = interp.symbols.intern(name);
    interp
        .eval_toplevel(Expr::assign(name, value))
        .expect("definition succeeds");
}

fn classed(interp: &Interpreter, value: Expr, classes: &[&str]) -> Expr {
    let classes = call(
        interp,
        "c",
        classes.iter().map(|class| Expr::string(class)).collect(),
    );
    call(interp, "class<-", vec![value, classes])
}

fn eval(interp: &mut Interpreter, expr: Expr) -> ObjectRef {
    interp.eval_toplevel(expr).expect("evaluation succeeds")
}

fn strings(interp: &Interpreter, value: ObjectRef) -> Vec<String> {
    interp.as_strings(value).map(<[String]>::to_vec).unwrap_or_default()
}

/// speak <- function(x, ...) UseMethod("speak")
/// speak.A <- function(x, ...) "A"
/// speak.B <- function(x, ...) c("B", NextMethod())
fn install_speak(interp: &mut Interpreter) {
    let generic = call(interp, "UseMethod", vec![Expr::string("speak")]);
    let generic = function(interp, &["x", "..."], generic);
    define(interp, "speak", generic);
    let a = function(interp, &["x", "..."], Expr::string("A"));
    define(interp, "speak.A", a);
    let next = call(interp, "NextMethod", vec![]);
    let b_body = call(interp, "c", vec![Expr::string("B"), next]);
    let b = function(interp, &["x", "..."], b_body);
    define(interp, "speak.B", b);
}

#[test]
fn most_specific_method_runs_and_next_method_resumes() {
    let mut interp = interp();
    install_speak(&mut interp);
    let obj = classed(&interp, Expr::int(1), &["B", "A"]);
    define(&mut interp, "obj", obj);

    let speak = call(&interp, "speak", vec![sym(&interp, "obj")]);
    let value = eval(&mut interp, speak);
    assert_eq!(strings(&interp, value), vec!["B", "A"]);
    assert!(interp.contexts.is_empty());
    assert_eq!(interp.root_depth(), 0);
}

#[test]
fn next_method_falls_back_to_the_default() {
    let mut interp = interp();
    install_speak(&mut interp);
    let next = call(&interp, "NextMethod", vec![]);
    let a_body = call(&interp, "c", vec![Expr::string("A"), next]);
    let a = function(&interp, &["x", "..."], a_body);
    define(&mut interp, "speak.A", a);
    let default = function(&interp, &["x", "..."], Expr::string("default"));
    define(&mut interp, "speak.default", default);

    let obj = classed(&interp, Expr::int(1), &["B", "A"]);
    let speak = call(&interp, "speak", vec![obj]);
    let value = eval(&mut interp, speak);
    assert_eq!(strings(&interp, value), vec!["B", "A", "default"]);
}

#[test]
fn next_method_without_a_default_has_no_method_to_invoke() {
    let mut interp = interp();
    install_speak(&mut interp);
    let next = call(&interp, "NextMethod", vec![]);
    let a = function(&interp, &["x", "..."], next);
    define(&mut interp, "speak.A", a);

    let obj = classed(&interp, Expr::int(1), &["B", "A"]);
    let speak = call(&interp, "speak", vec![obj]);
    let err = interp.eval_toplevel(speak).expect_err("nothing after speak.A");
    assert_eq!(err, RuntimeError::NoMethodToInvoke);
    assert_eq!(err.to_string(), "no method to invoke");
    assert!(interp.contexts.is_empty());
    assert_eq!(interp.root_depth(), 0);
}

#[test]
fn missing_method_names_generic_and_class() {
    let mut interp = interp();
    let generic = call(&interp, "UseMethod", vec![Expr::string("render")]);
    let render = function(&interp, &["x"], generic);
    define(&mut interp, "render", render);

    let widget = classed(&interp, Expr::int(1), &["widget"]);
    let render_call = call(&interp, "render", vec![widget]);
    let err = interp.eval_toplevel(render_call).expect_err("no render method");
    assert_eq!(
        err.to_string(),
        "no applicable method for 'render' applied to an object of class 'widget'"
    );

    let plain = call(&interp, "render", vec![Expr::int(1)]);
    let err = interp.eval_toplevel(plain).expect_err("no render method");
    assert_eq!(
        err.to_string(),
        "no applicable method for 'render' applied to an object of class c('integer', 'numeric')"
    );
}

#[test]
fn registered_methods_are_found_after_lexical_lookup() {
    let mut interp = interp();
    let generic = call(&interp, "UseMethod", vec![Expr::string("render")]);
    let render = function(&interp, &["x"], generic);
    define(&mut interp, "render", render);

    let method = function(&interp, &["x"], Expr::string("registered"));
    let method = eval(&mut interp, method);
    interp.register_s3_method("render", "widget", method);

    let widget = classed(&interp, Expr::int(1), &["widget"]);
    let render_call = call(&interp, "render", vec![widget]);
    let value = eval(&mut interp, render_call);
    assert_eq!(interp.as_string(value), Some("registered"));
}

#[test]
fn arguments_match_by_name_then_position_then_dots() {
    let mut interp = interp();
    let body = call(
        &interp,
        "c",
        vec![sym(&interp, "a"), sym(&interp, "b"), sym(&interp, "...")],
    );
    let f = function(&interp, &["a", "b", "..."], body);
    define(&mut interp, "f", f);

    let b = interp.symbols.intern("b");
    let f_call = Expr::call(
        sym(&interp, "f"),
        vec![
            ExprArg::named(b, Expr::int(3)),
            ExprArg::new(Expr::int(1)),
            ExprArg::new(Expr::int(2)),
        ],
    );
    let value = eval(&mut interp, f_call);
    assert!(matches!(interp.object(value), Object::Integer(v) if *v == vec![1, 3, 2]));
}

#[test]
fn promises_are_forced_once_across_dispatch() {
    let mut interp = interp();
    install_speak(&mut interp);
    let a_body = call(&interp, "c", vec![Expr::string("A"), call(&interp, "class", vec![sym(&interp, "x")])]);
    let a = function(&interp, &["x", "..."], a_body);
    define(&mut interp, "speak.A", a);
    define(&mut interp, "count", Expr::int(0));
    let obj = classed(&interp, Expr::int(1), &["B", "A"]);
    define(&mut interp, "obj", obj);

    // speak({ count <<- count + 1L; obj })
    let count = interp.symbols.intern("count");
    let bump = Expr::superassign(count, call(&interp, "+", vec![Expr::Symbol(count), Expr::int(1)]));
    let arg = Expr::block(vec![bump, sym(&interp, "obj")]);
    let speak = call(&interp, "speak", vec![arg]);
    let value = eval(&mut interp, speak);
    assert_eq!(strings(&interp, value), vec!["B", "A", "B", "A"]);

    let count = eval(&mut interp, Expr::Symbol(count));
    assert_eq!(interp.as_integer(count), Some(1));
}

#[test]
fn dispatch_variables_are_visible_to_methods() {
    let mut interp = interp();
    install_speak(&mut interp);
    let body = call(
        &interp,
        "c",
        vec![sym(&interp, ".Generic"), sym(&interp, ".Method"), sym(&interp, ".Class")],
    );
    let b = function(&interp, &["x", "..."], body);
    define(&mut interp, "speak.B", b);

    let obj = classed(&interp, Expr::int(1), &["C", "B", "A"]);
    let speak = call(&interp, "speak", vec![obj]);
    let value = eval(&mut interp, speak);
    assert_eq!(strings(&interp, value), vec!["speak", "speak.B", "B", "A"]);
}

#[test]
fn use_method_needs_a_calling_function() {
    let mut interp = interp();
    let use_method = call(&interp, "UseMethod", vec![Expr::string("speak")]);
    let err = interp.eval_toplevel(use_method).expect_err("top level");
    assert_eq!(err, RuntimeError::OutsideFunction);

    let next = call(&interp, "NextMethod", vec![]);
    let err = interp.eval_toplevel(next).expect_err("top level");
    assert_eq!(err, RuntimeError::OutsideMethodDispatch);
}

#[test]
fn operators_dispatch_through_the_ops_group() {
    let mut interp = interp();
    let group = function(&interp, &["e1", "e2"], Expr::string("group"));
    define(&mut interp, "Ops.money", group);
    let generic = function(&interp, &["e1", "e2"], Expr::string("generic"));
    define(&mut interp, "+.num", generic);
    let x = classed(&interp, Expr::int(1), &["money", "num"]);
    define(&mut interp, "x", x);

    // A group method for a more specific class wins.
    let sum = call(&interp, "+", vec![sym(&interp, "x"), Expr::int(1)]);
    let value = eval(&mut interp, sum.clone());
    assert_eq!(interp.as_string(value), Some("group"));

    // At the same class the generic's own method wins.
    let specific = function(&interp, &["e1", "e2"], Expr::string("specific"));
    define(&mut interp, "+.money", specific);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_string(value), Some("specific"));
}

#[test]
fn group_method_can_defer_to_the_builtin() {
    let mut interp = interp();
    let next = call(&interp, "NextMethod", vec![]);
    let method = function(&interp, &["e1", "e2"], next);
    define(&mut interp, "Ops.money", method);
    let x = classed(&interp, Expr::int(41), &["money"]);
    let sum = call(&interp, "+", vec![x, Expr::int(1)]);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_integer(value), Some(42));
}

#[test]
fn incompatible_operand_methods_warn_and_use_the_left() {
    let mut interp = interp();
    let a = function(&interp, &["e1", "e2"], Expr::string("a"));
    define(&mut interp, "Ops.a", a);
    let b = function(&interp, &["e1", "e2"], Expr::string("b"));
    define(&mut interp, "Ops.b", b);

    let lhs = classed(&interp, Expr::int(1), &["a"]);
    let rhs = classed(&interp, Expr::int(2), &["b"]);
    let sum = call(&interp, "+", vec![lhs, rhs]);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_string(value), Some("a"));
    assert_eq!(
        interp.take_warnings(),
        vec![r#"Incompatible methods ("Ops.a", "Ops.b") for "+""#]
    );
}

#[test]
fn internal_generic_dispatches_on_classed_objects() {
    let mut interp = interp();
    let next = call(&interp, "NextMethod", vec![]);
    let body = call(&interp, "+", vec![next, Expr::int(10)]);
    let method = function(&interp, &["x"], body);
    define(&mut interp, "length.widget", method);

    let widget = classed(&interp, Expr::int(1), &["widget"]);
    let length = call(&interp, "length", vec![widget]);
    let value = eval(&mut interp, length);
    assert_eq!(interp.as_integer(value), Some(11));

    let plain = call(&interp, "length", vec![call(&interp, "c", vec![Expr::int(1), Expr::int(2)])]);
    let value = eval(&mut interp, plain);
    assert_eq!(interp.as_integer(value), Some(2));
}

#[test]
fn standard_generic_without_methods_calls_the_plain_function() {
    let mut interp = interp();
    let plain = function(&interp, &["x"], Expr::string("plain"));
    define(&mut interp, "area", plain);
    let generic_body = call(&interp, "standardGeneric", vec![Expr::string("area")]);
    let generic = function(&interp, &["x"], generic_body);
    define(&mut interp, "area_generic", generic);

    let area = call(&interp, "area_generic", vec![Expr::int(1)]);
    let value = eval(&mut interp, area);
    assert_eq!(interp.as_string(value), Some("plain"));
    assert_eq!(interp.take_warnings().len(), 1);
}

#[test]
fn primitive_methods_override_and_defer() {
    let mut interp = interp();
    let plus = builtin_index("+").expect("+ is a builtin");
    let sum = call(&interp, "+", vec![Expr::int(1), Expr::int(2)]);

    let overriding = function(&interp, &["e1", "e2"], Expr::string("overridden"));
    let overriding = eval(&mut interp, overriding);
    interp.preserve_object(overriding);
    interp
        .set_primitive_methods(plus, PrimitiveMethodsCode::Set {
            generic: Some(overriding),
            methods: None,
        })
        .expect("generic supplied");
    assert_eq!(interp.primitive_method_state(plus), MethodCacheState::HasMethods);
    let value = eval(&mut interp, sum.clone());
    assert_eq!(interp.as_string(value), Some("overridden"));
    assert_eq!(interp.primitive_method_state(plus), MethodCacheState::HasMethods);

    let deferring = function(&interp, &["e1", "e2"], sym(&interp, ".DeferredDefault"));
    let deferring = eval(&mut interp, deferring);
    interp.preserve_object(deferring);
    interp
        .set_primitive_methods(plus, PrimitiveMethodsCode::Set {
            generic: Some(deferring),
            methods: None,
        })
        .expect("generic supplied");
    let value = eval(&mut interp, sum.clone());
    assert_eq!(interp.as_integer(value), Some(3));

    interp
        .set_primitive_methods(plus, PrimitiveMethodsCode::Clear)
        .expect("clearing succeeds");
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_integer(value), Some(3));
}

#[test]
fn next_method_rereads_renamed_method_formals() {
    let mut interp = interp();
    let generic = call(&interp, "UseMethod", vec![Expr::string("f")]);
    let generic = function(&interp, &["x", "..."], generic);
    define(&mut interp, "f", generic);
    let a = function(&interp, &["obj", "..."], call(&interp, "NextMethod", vec![]));
    define(&mut interp, "f.A", a);
    let default = function(&interp, &["x", "..."], call(&interp, "class", vec![sym(&interp, "x")]));
    define(&mut interp, "f.default", default);
    let obj = classed(&interp, Expr::int(1), &["A"]);
    define(&mut interp, "obj", obj);

    let f = call(&interp, "f", vec![sym(&interp, "obj")]);
    let value = eval(&mut interp, f.clone());
    assert_eq!(strings(&interp, value), vec!["A"]);

    // A global `x` must not leak into the default through the method frame.
    define(&mut interp, "x", Expr::string("global-x"));
    let value = eval(&mut interp, f);
    assert_eq!(strings(&interp, value), vec!["A"]);
    assert!(interp.contexts.is_empty());
}

#[test]
fn dispatch_object_falls_back_to_the_first_argument() {
    let mut interp = interp();
    let generic = call(&interp, "UseMethod", vec![Expr::string("f")]);
    let generic = function(&interp, &["x", "y"], generic);
    define(&mut interp, "f", generic);
    let a = function(&interp, &["x", "y"], Expr::string("A"));
    define(&mut interp, "f.A", a);
    let obj = classed(&interp, Expr::int(1), &["A"]);
    define(&mut interp, "obj", obj);

    // f(y = obj): nothing matches `x`, so the first actual is dispatched on.
    let y = interp.symbols.intern("y");
    let f = Expr::call(sym(&interp, "f"), vec![ExprArg::named(y, sym(&interp, "obj"))]);
    let value = eval(&mut interp, f);
    assert_eq!(interp.as_string(value), Some("A"));
}

/// Reads the method list for `+` from the global `plus_methods`.
fn provide_methods(
    interp: &mut Interpreter,
    _op: Opcode,
    _env: ObjectRef,
) -> Result<ObjectRef, RuntimeError> {
    let name = interp.symbols.intern("plus_methods");
    let global = interp.global_env();
    interp.get_var(name, global)
}

/// A first operand of 1 picks the first listed method, 2 runs the builtin,
/// anything else goes on to the generic.
fn quick_check(
    interp: &mut Interpreter,
    args: &ArgList,
    methods: ObjectRef,
    _op: Opcode,
) -> Result<QuickCheck, RuntimeError> {
    let first = args
        .get(0)
        .and_then(|arg| arg.value)
        .and_then(|value| interp.as_integer(value));
    let listed = match interp.object(methods) {
        Object::List(items) => items.first().copied(),
        _ => None,
    };
    Ok(match (first, listed) {
        (Some(1), Some(method)) => QuickCheck::Method(method),
        (Some(2), _) => QuickCheck::UseDefault,
        _ => QuickCheck::Search,
    })
}

fn hooked_interp() -> (Interpreter, Opcode) {
    let mut interp = interp();
    interp.hooks.get_primitive_methods = Some(provide_methods);
    interp.hooks.quick_method_check = Some(quick_check);
    let quick = function(&interp, &["e1", "e2"], Expr::string("quick"));
    let methods = call(&interp, "list", vec![quick]);
    define(&mut interp, "plus_methods", methods);
    (interp, builtin_index("+").expect("+ is a builtin"))
}

fn plus(interp: &Interpreter, e1: i64, e2: i64) -> Expr {
    call(interp, "+", vec![Expr::int(e1), Expr::int(e2)])
}

fn set_plus_generic(interp: &mut Interpreter, plus: Opcode, generic: Expr) {
    let generic = eval(interp, generic);
    interp.preserve_object(generic);
    interp
        .set_primitive_methods(plus, PrimitiveMethodsCode::Set {
            generic: Some(generic),
            methods: None,
        })
        .expect("generic supplied");
}

#[test]
fn reset_rebuilds_methods_and_quick_check_picks_the_path() {
    let (mut interp, op) = hooked_interp();
    let generic = function(&interp, &["e1", "e2"], Expr::string("generic"));
    set_plus_generic(&mut interp, op, generic);
    interp
        .set_primitive_methods(op, PrimitiveMethodsCode::Reset)
        .expect("reset succeeds");
    assert_eq!(interp.primitive_method_state(op), MethodCacheState::NeedsReset);

    let sum = plus(&interp, 1, 2);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_string(value), Some("quick"));
    assert_eq!(interp.primitive_method_state(op), MethodCacheState::HasMethods);

    let sum = plus(&interp, 2, 2);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_integer(value), Some(4));

    let sum = plus(&interp, 3, 2);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_string(value), Some("generic"));
    assert_eq!(interp.root_depth(), 0);
}

#[test]
fn builtin_runs_plainly_inside_its_own_generic() {
    let (mut interp, op) = hooked_interp();
    // function(e1, e2) e1 + e2 + 100L
    let inner = call(&interp, "+", vec![sym(&interp, "e1"), sym(&interp, "e2")]);
    let body = call(&interp, "+", vec![inner, Expr::int(100)]);
    let generic = function(&interp, &["e1", "e2"], body);
    set_plus_generic(&mut interp, op, generic);

    let sum = plus(&interp, 3, 2);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_integer(value), Some(105));
    assert_eq!(interp.primitive_method_state(op), MethodCacheState::HasMethods);

    interp
        .set_primitive_methods(op, PrimitiveMethodsCode::Suppress)
        .expect("suppressing succeeds");
    let sum = plus(&interp, 1, 2);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_integer(value), Some(3));
}

#[test]
fn reset_without_a_generic_keeps_the_rebuilt_entry() {
    let (mut interp, op) = hooked_interp();
    interp
        .set_primitive_methods(op, PrimitiveMethodsCode::Reset)
        .expect("reset succeeds");

    let sum = plus(&interp, 3, 2);
    let err = interp.eval_toplevel(sum).expect_err("no generic to run");
    assert_eq!(err, RuntimeError::MethodsUnavailable { name: "+".into() });
    assert_eq!(interp.primitive_method_state(op), MethodCacheState::HasMethods);

    let sum = plus(&interp, 1, 2);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_string(value), Some("quick"));

    interp
        .set_primitive_methods(op, PrimitiveMethodsCode::Clear)
        .expect("clearing succeeds");
    let sum = plus(&interp, 1, 2);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_integer(value), Some(3));
    assert!(interp.contexts.is_empty());
}

#[test]
fn failed_method_provider_leaves_the_entry_pending() {
    let mut interp = interp();
    interp.hooks.get_primitive_methods = Some(provide_methods);
    let op = builtin_index("+").expect("+ is a builtin");
    interp
        .set_primitive_methods(op, PrimitiveMethodsCode::Reset)
        .expect("reset succeeds");

    let sum = plus(&interp, 1, 2);
    let err = interp.eval_toplevel(sum).expect_err("plus_methods is unbound");
    assert_eq!(err, RuntimeError::UnboundVariable { name: "plus_methods".into() });
    assert_eq!(interp.primitive_method_state(op), MethodCacheState::NeedsReset);
    assert_eq!(interp.root_depth(), 0);
}

#[test]
fn dispatch_survives_collection_on_every_allocation() {
    let mut interp = torture_interp();
    install_speak(&mut interp);
    let obj = classed(&interp, Expr::int(1), &["B", "A"]);
    define(&mut interp, "obj", obj);

    let speak = call(&interp, "speak", vec![sym(&interp, "obj")]);
    for _ in 0..3 {
        let value = eval(&mut interp, speak.clone());
        assert_eq!(strings(&interp, value), vec!["B", "A"]);
    }

    let ops = function(&interp, &["e1", "e2"], call(&interp, "NextMethod", vec![]));
    define(&mut interp, "Ops.money", ops);
    let x = classed(&interp, Expr::int(41), &["money"]);
    let sum = call(&interp, "+", vec![x, Expr::int(1)]);
    let value = eval(&mut interp, sum);
    assert_eq!(interp.as_integer(value), Some(42));

    assert!(interp.gc_stats().collections > 0);
    assert!(interp.verify().is_ok());
    assert!(interp.contexts.is_empty());
    assert_eq!(interp.root_depth(), 0);
}
