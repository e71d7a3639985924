//! Run with:
//!   cargo bench --bench dispatch_benchmark

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rho::{Expr, ExprArg, Formal, Interpreter, InterpreterCreateInfo};

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
        .expect("Definition failed");
}

fn classed(interp: &Interpreter, value: Expr, classes: &[&str]) -> Expr {
    let classes = call(
        interp,
        "c",
        classes.iter().map(|class| Expr::string(class)).collect(),
    );
    call(interp, "class<-", vec![value, classes])
}

fn create_interpreter() -> Interpreter {
    Interpreter::new(InterpreterCreateInfo::default()).expect("Invalid settings")
}

fn warm_up(interp: &mut Interpreter, expr: &Expr) {
    for _ in 0..5 {
        interp.eval_toplevel(expr.clone()).expect("Warmup failed");
    }
    interp.collect_garbage();
}

/// UseMethod into the first class, NextMethod into the second.
fn bench_next_method_chain(c: &mut Criterion) {
    let mut interp = create_interpreter();
    let generic = call(&interp, "UseMethod", vec![Expr::string("speak")]);
    let generic = function(&interp, &["x", "..."], generic);
    define(&mut interp, "speak", generic);
    let a = function(&interp, &["x", "..."], Expr::string("A"));
    define(&mut interp, "speak.A", a);
    let next = call(&interp, "NextMethod", vec![]);
    let body = call(&interp, "c", vec![Expr::string("B"), next]);
    let b = function(&interp, &["x", "..."], body);
    define(&mut interp, "speak.B", b);
    let obj = classed(&interp, Expr::int(1), &["B", "A"]);
    define(&mut interp, "obj", obj);

    let speak = call(&interp, "speak", vec![sym(&interp, "obj")]);
    warm_up(&mut interp, &speak);

    c.bench_function("next_method_chain", |b| {
        b.iter(|| {
            interp
                .eval_toplevel(black_box(speak.clone()))
                .expect("Benchmark failed");
        });
    });
}

/// Arithmetic on a classed operand through an Ops group method.
fn bench_ops_group(c: &mut Criterion) {
    let mut interp = create_interpreter();
    let next = call(&interp, "NextMethod", vec![]);
    let method = function(&interp, &["e1", "e2"], next);
    define(&mut interp, "Ops.money", method);
    let x = classed(&interp, Expr::int(41), &["money"]);
    define(&mut interp, "x", x);

    let sum = call(&interp, "+", vec![sym(&interp, "x"), Expr::int(1)]);
    warm_up(&mut interp, &sum);

    c.bench_function("ops_group_next_method", |b| {
        b.iter(|| {
            interp
                .eval_toplevel(black_box(sum.clone()))
                .expect("Benchmark failed");
        });
    });
}

/// Plain closure recursion, no dispatch.
fn bench_recursive_countdown(c: &mut Criterion) {
    let mut interp = create_interpreter();
    // countdown <- function(n) if (n > 0L) countdown(n - 1L) else n
    let n = sym(&interp, "n");
    let test = call(&interp, ">", vec![n.clone(), Expr::int(0)]);
    let decrement = call(&interp, "-", vec![n.clone(), Expr::int(1)]);
    let recurse = call(&interp, "countdown", vec![decrement]);
    let body = Expr::if_else(test, recurse, Some(n));
    let countdown = function(&interp, &["n"], body);
    define(&mut interp, "countdown", countdown);

    let start = call(&interp, "countdown", vec![Expr::int(100)]);
    warm_up(&mut interp, &start);

    c.bench_function("recursive_countdown_100", |b| {
        b.iter(|| {
            interp
                .eval_toplevel(black_box(start.clone()))
                .expect("Benchmark failed");
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_next_method_chain, bench_ops_group, bench_recursive_countdown
}

criterion_main!(benches);
