use super::message_text;
use crate::{
    BuiltinContext, EvalResult, HeapObject, Interpreter, Object, ObjectRef,
    RuntimeError,
};

/// Result type of `c()`, ordered by how far a value is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Mode {
    Null,
    Logical,
    Integer,
    Double,
    Character,
    List,
}

fn mode_of(obj: &Object) -> Mode {
    match obj {
        Object::Null => Mode::Null,
        Object::Logical(_) => Mode::Logical,
        Object::Integer(_) => Mode::Integer,
        Object::Double(_) => Mode::Double,
        Object::Character(_) => Mode::Character,
        _ => Mode::List,
    }
}

fn strings_of(obj: &Object) -> Vec<String> {
    match obj {
        Object::Logical(v) => v
            .iter()
            .map(|&b| if b { "TRUE" } else { "FALSE" }.to_owned())
            .collect(),
        Object::Integer(v) => v.iter().map(i64::to_string).collect(),
        Object::Double(v) => v.iter().map(f64::to_string).collect(),
        Object::Character(v) => v.clone(),
        _ => Vec::new(),
    }
}

fn doubles_of(obj: &Object) -> Vec<f64> {
    match obj {
        Object::Logical(v) => v.iter().map(|&b| b as i64 as f64).collect(),
        Object::Integer(v) => v.iter().map(|&i| i as f64).collect(),
        Object::Double(v) => v.clone(),
        _ => Vec::new(),
    }
}

fn integers_of(obj: &Object) -> Vec<i64> {
    match obj {
        Object::Logical(v) => v.iter().map(|&b| b as i64).collect(),
        Object::Integer(v) => v.clone(),
        _ => Vec::new(),
    }
}

/// Splits an atomic vector into length-one vectors, for `c()` into a list.
fn scalars_of(obj: &Object) -> Vec<Object> {
    match obj {
        Object::Logical(v) => v.iter().map(|&b| Object::Logical(vec![b])).collect(),
        Object::Integer(v) => v.iter().map(|&i| Object::Integer(vec![i])).collect(),
        Object::Double(v) => v.iter().map(|&d| Object::Double(vec![d])).collect(),
        Object::Character(v) => v
            .iter()
            .map(|s| Object::Character(vec![s.clone()]))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn combine(ctx: &mut BuiltinContext) -> EvalResult {
    let values = ctx.args.values().collect::<Vec<_>>();
    let interp = &mut *ctx.interp;
    let mode = values
        .iter()
        .map(|&value| mode_of(interp.object(value)))
        .max()
        .unwrap_or(Mode::Null);

    let combined = match mode {
        Mode::Null => Object::Null,
        Mode::Logical => Object::Logical(
            values
                .iter()
                .flat_map(|&value| match interp.object(value) {
                    Object::Logical(v) => v.clone(),
                    _ => Vec::new(),
                })
                .collect(),
        ),
        Mode::Integer => Object::Integer(
            values
                .iter()
                .flat_map(|&value| integers_of(interp.object(value)))
                .collect(),
        ),
        Mode::Double => Object::Double(
            values
                .iter()
                .flat_map(|&value| doubles_of(interp.object(value)))
                .collect(),
        ),
        Mode::Character => Object::Character(
            values
                .iter()
                .flat_map(|&value| strings_of(interp.object(value)))
                .collect(),
        ),
        Mode::List => {
            let mark = interp.root_depth();
            let mut elements = Vec::new();
            for value in values {
                let scalars = match interp.object(value) {
                    Object::List(items) => {
                        elements.extend(items.iter().copied());
                        continue;
                    }
                    Object::Null => continue,
                    atomic @ (Object::Logical(_)
                    | Object::Integer(_)
                    | Object::Double(_)
                    | Object::Character(_)) => scalars_of(atomic),
                    _ => {
                        elements.push(value);
                        continue;
                    }
                };
                for scalar in scalars {
                    let element = interp.alloc_object(scalar);
                    interp.protect(element);
                    elements.push(element);
                }
            }
            let list = interp.alloc_object(Object::List(elements));
            interp.release_roots(mark);
            return Ok(list);
        }
    };
    Ok(interp.alloc_object(combined))
}

pub fn list(ctx: &mut BuiltinContext) -> EvalResult {
    let names = ctx.interp.syms.names;
    let tagged = ctx.args.iter().any(|arg| arg.tag.is_some());
    let elements = ctx
        .args
        .iter()
        .map(|arg| arg.value.unwrap_or(ctx.interp.null()))
        .collect::<Vec<_>>();
    let list = ctx.interp.alloc_object(Object::List(elements));
    if tagged {
        let labels = ctx
            .args
            .iter()
            .map(|arg| {
                arg.tag
                    .map(|tag| ctx.interp.symbols.name(tag).to_string())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>();
        let mark = ctx.interp.root_depth();
        ctx.interp.protect(list);
        let labels = ctx.interp.alloc_object(Object::Character(labels));
        ctx.interp.heap_mut(list).set_attribute(names, Some(labels));
        ctx.interp.release_roots(mark);
    }
    Ok(list)
}

pub fn length(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(1, 1)?;
    let value = ctx.arg(0)?;
    let len = match ctx.interp.object(value) {
        Object::Environment(env) => env.frame.len(),
        other => other.len(),
    };
    Ok(ctx.interp.alloc_integer(vec![len as i64]))
}

pub fn class(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(1, 1)?;
    let value = ctx.arg(0)?;
    if let Some(class) = ctx.interp.heap(value).attribute(ctx.interp.syms.class) {
        return Ok(class);
    }
    let implicit = match ctx.interp.object(value) {
        Object::Double(_) => "numeric".to_owned(),
        _ => ctx
            .interp
            .implicit_class(value)
            .into_iter()
            .next()
            .unwrap_or_default(),
    };
    Ok(ctx.interp.alloc_character([implicit]))
}

pub fn old_class(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(1, 1)?;
    let value = ctx.arg(0)?;
    Ok(ctx
        .interp
        .heap(value)
        .attribute(ctx.interp.syms.class)
        .unwrap_or(ctx.interp.null()))
}

/// A copy of `value` with its class attribute replaced. Environments are
/// reference objects and are updated in place.
fn with_class(
    interp: &mut Interpreter,
    value: ObjectRef,
    class: Option<ObjectRef>,
) -> EvalResult {
    let sym = interp.syms.class;
    if matches!(interp.object(value), Object::Environment(_)) {
        interp.heap_mut(value).set_attribute(sym, class);
        return Ok(value);
    }
    if matches!(interp.object(value), Object::Null) {
        if class.is_some() {
            return Err(RuntimeError::InvalidArgument(
                "attempt to set an attribute on NULL".into(),
            ));
        }
        return Ok(value);
    }
    let mut copy: HeapObject = interp.heap(value).clone();
    copy.set_attribute(sym, class);
    Ok(interp.alloc(copy))
}

pub fn set_class(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(2, 2)?;
    let (value, class) = (ctx.arg(0)?, ctx.arg(1)?);
    let class = match ctx.interp.object(class) {
        Object::Null => None,
        Object::Character(v) if v.is_empty() => None,
        Object::Character(_) => Some(class),
        _ => {
            return Err(RuntimeError::InvalidArgument(
                "attempt to set invalid 'class' attribute".into(),
            ));
        }
    };
    with_class(ctx.interp, value, class)
}

pub fn unclass(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(1, 1)?;
    let value = ctx.arg(0)?;
    match ctx.interp.object(value) {
        Object::Environment(_) => Err(RuntimeError::InvalidArgument(
            "cannot unclass an environment".into(),
        )),
        _ if ctx.interp.heap(value).attribute(ctx.interp.syms.class).is_none() => {
            Ok(value)
        }
        _ => with_class(ctx.interp, value, None),
    }
}

pub fn inherits(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(2, 2)?;
    let (value, what) = (ctx.arg(0)?, ctx.arg(1)?);
    let Some(what) = ctx.interp.as_strings(what).map(<[String]>::to_vec) else {
        return Err(RuntimeError::InvalidArgument(
            "'what' must be a character vector".into(),
        ));
    };
    let classes = ctx.interp.class_vector(value);
    let found = classes.iter().any(|class| what.contains(class));
    Ok(ctx.interp.alloc_logical(vec![found]))
}

fn identical_objects(interp: &Interpreter, a: ObjectRef, b: ObjectRef) -> bool {
    if a == b {
        return true;
    }
    let (ha, hb) = (interp.heap(a), interp.heap(b));
    if ha.attributes.len() != hb.attributes.len() {
        return false;
    }
    let attributes_match = ha.attributes.iter().all(|&(name, value)| {
        hb.attribute(name)
            .is_some_and(|other| identical_objects(interp, value, other))
    });
    if !attributes_match {
        return false;
    }
    match (&ha.object, &hb.object) {
        (Object::Null, Object::Null) => true,
        (Object::Logical(x), Object::Logical(y)) => x == y,
        (Object::Integer(x), Object::Integer(y)) => x == y,
        (Object::Double(x), Object::Double(y)) => x == y,
        (Object::Character(x), Object::Character(y)) => x == y,
        (Object::Symbol(x), Object::Symbol(y)) => x == y,
        (Object::Builtin(x), Object::Builtin(y)) => x == y,
        (Object::List(x), Object::List(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|(&p, &q)| identical_objects(interp, p, q))
        }
        (Object::Closure(x), Object::Closure(y)) => {
            x.env == y.env
                && std::rc::Rc::ptr_eq(&x.body, &y.body)
                && std::rc::Rc::ptr_eq(&x.formals, &y.formals)
        }
        (Object::Language(x), Object::Language(y)) => std::rc::Rc::ptr_eq(x, y),
        _ => false,
    }
}

pub fn identical(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(2, 2)?;
    let (a, b) = (ctx.arg(0)?, ctx.arg(1)?);
    let same = identical_objects(ctx.interp, a, b);
    Ok(ctx.interp.alloc_logical(vec![same]))
}

pub fn invisible(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(0, 1)?;
    Ok(ctx.opt_arg(0).unwrap_or(ctx.interp.null()))
}

pub fn return_(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(0, 1)?;
    let value = ctx.opt_arg(0).unwrap_or(ctx.interp.null());
    Err(RuntimeError::Return {
        value,
        env: ctx.env,
    })
}

pub fn stop(ctx: &mut BuiltinContext) -> EvalResult {
    Err(RuntimeError::User(message_text(ctx.interp, &ctx.args)))
}

pub fn warning(ctx: &mut BuiltinContext) -> EvalResult {
    let message = message_text(ctx.interp, &ctx.args);
    ctx.interp.warn(message.clone());
    Ok(ctx.interp.alloc_character([message]))
}

pub fn environment(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(0, 1)?;
    let Some(fun) = ctx.opt_arg(0).filter(|&fun| fun != ctx.interp.null()) else {
        return Ok(ctx.env);
    };
    Ok(match ctx.interp.object(fun) {
        Object::Closure(closure) => closure.env,
        _ => ctx.interp.null(),
    })
}

pub fn parent_frame(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(0, 1)?;
    let generations = match ctx.opt_arg(0) {
        Some(n) => ctx.interp.as_integer(n).filter(|&n| n >= 1).ok_or_else(|| {
            RuntimeError::InvalidArgument("invalid 'n' value".into())
        })?,
        None => 1,
    };
    let mut env = ctx.env;
    for _ in 0..generations {
        match ctx.interp.contexts.function_with_env(env) {
            Some(frame) => env = frame.sysparent,
            None => return Ok(ctx.interp.global_env()),
        }
    }
    Ok(env)
}

pub fn sys_call(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(0, 0)?;
    let Some(call) = ctx
        .interp
        .contexts
        .function_with_env(ctx.env)
        .map(|frame| frame.call.clone())
    else {
        return Ok(ctx.interp.null());
    };
    Ok(ctx.interp.alloc_object(Object::Language(call)))
}

pub fn sys_function(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(0, 0)?;
    ctx.interp
        .contexts
        .function_with_env(ctx.env)
        .map(|frame| frame.callfun)
        .ok_or_else(|| {
            RuntimeError::InvalidArgument("not that many frames on the stack".into())
        })
}

pub fn is_function(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(1, 1)?;
    let value = ctx.arg(0)?;
    let is_function = ctx.interp.object(value).is_function();
    Ok(ctx.interp.alloc_logical(vec![is_function]))
}

/// Runs a full collection; returns `c(reclaimed, in use)`.
pub fn gc(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.check_arity(0, 0)?;
    let reclaimed = ctx.interp.collect_garbage();
    let in_use = ctx.interp.arena().allocated_cells();
    Ok(ctx
        .interp
        .alloc_integer(vec![reclaimed as i64, in_use as i64]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_mode_follows_the_widest_argument() {
        assert!(Mode::Character > Mode::Double);
        assert!(Mode::Double > Mode::Integer);
        assert!(Mode::List > Mode::Character);
        assert_eq!(mode_of(&Object::Logical(vec![true])), Mode::Logical);
        assert_eq!(
            strings_of(&Object::Logical(vec![true, false])),
            vec!["TRUE", "FALSE"]
        );
        assert_eq!(doubles_of(&Object::Integer(vec![2])), vec![2.0]);
    }
}
