use std::rc::Rc;

use crate::{
    BuiltinFlags, Closure, EvalResult, Expr, ExprArg, Interpreter, Object,
    ObjectRef, RuntimeError, get_builtin,
};

/// Evaluator entry point, replaceable through
/// [`Interpreter::set_eval_fn`].
pub type EvalFn = fn(&mut Interpreter, &Rc<Expr>, ObjectRef) -> EvalResult;

pub fn eval_expr(interp: &mut Interpreter, expr: &Rc<Expr>, env: ObjectRef) -> EvalResult {
    match &**expr {
        Expr::Literal(literal) => Ok(interp.alloc_literal(literal)),
        Expr::Symbol(sym) if *sym == interp.syms.dots => Err(
            RuntimeError::InvalidArgument("'...' used in an incorrect context".into()),
        ),
        Expr::Symbol(sym) => interp.get_var(*sym, env),
        Expr::Missing => Err(RuntimeError::InvalidArgument(
            "argument is missing, with no default".into(),
        )),
        Expr::Call { fun, args } => eval_call(interp, expr, fun, args, env),
        Expr::Function { formals, body } => {
            Ok(interp.alloc_object(Object::Closure(Closure {
                formals: formals.clone(),
                body: body.clone(),
                env,
            })))
        }
        Expr::Block(exprs) => {
            let mut value = interp.null();
            for expr in exprs {
                value = interp.eval(expr, env)?;
            }
            Ok(value)
        }
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            let cond = interp.eval(cond, env)?;
            if truthy(interp, cond)? {
                interp.eval(then, env)
            } else if let Some(otherwise) = otherwise {
                interp.eval(otherwise, env)
            } else {
                Ok(interp.null())
            }
        }
        Expr::Assign {
            name,
            value,
            superassign,
        } => {
            let value = interp.eval(value, env)?;
            if *superassign {
                interp.set_var(env, *name, value);
            } else {
                interp.define_var(env, *name, value);
            }
            Ok(value)
        }
    }
}

fn truthy(interp: &Interpreter, cond: ObjectRef) -> Result<bool, RuntimeError> {
    let value = match interp.object(cond) {
        Object::Logical(v) => v.first().copied(),
        Object::Integer(v) => v.first().map(|&i| i != 0),
        Object::Double(v) => v.first().map(|&d| d != 0.0),
        _ => {
            return Err(RuntimeError::Type(
                "argument is not interpretable as logical".into(),
            ));
        }
    };
    value.ok_or_else(|| RuntimeError::Type("argument is of length zero".into()))
}

fn eval_call(
    interp: &mut Interpreter,
    call: &Rc<Expr>,
    head: &Rc<Expr>,
    args: &[ExprArg],
    env: ObjectRef,
) -> EvalResult {
    let fun = match **head {
        Expr::Symbol(sym) => interp.find_fun(sym, env)?,
        _ => interp.eval(head, env)?,
    };
    let builtin = match interp.object(fun) {
        Object::Closure(_) => None,
        Object::Builtin(op) => Some(*op),
        _ => return Err(RuntimeError::NotAFunction),
    };

    let mark = interp.root_depth();
    interp.protect(fun);
    let result = match builtin {
        None => interp
            .promise_args(args, env)
            .and_then(|promargs| interp.apply_closure(call, fun, promargs, env, &[])),
        Some(op) if get_builtin(op).flags.contains(BuiltinFlags::SPECIAL) => {
            interp.call_special(call, op, env)
        }
        Some(op) => interp
            .eval_args(args, env)
            .and_then(|args| interp.apply_builtin(call, op, args, env)),
    };
    interp.release_roots(mark);
    result
}
