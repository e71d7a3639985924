//! Special builtins: they see the unevaluated call.

use crate::{BuiltinContext, EvalResult, Expr, ExprArg, Object, RuntimeError};

fn expect_args<'a>(
    ctx: &'a BuiltinContext,
    min: usize,
    max: usize,
) -> Result<&'a [ExprArg], RuntimeError> {
    let args = ctx.call_args();
    if (min..=max).contains(&args.len()) {
        Ok(args)
    } else {
        Err(RuntimeError::InvalidArgument(format!(
            "{} arguments passed to '{}'",
            args.len(),
            ctx.name()
        )))
    }
}

pub fn quote(ctx: &mut BuiltinContext) -> EvalResult {
    let expr = expect_args(ctx, 1, 1)?[0].value.clone();
    Ok(match &*expr {
        Expr::Literal(literal) => ctx.interp.alloc_literal(literal),
        Expr::Symbol(sym) => ctx.interp.alloc_object(Object::Symbol(*sym)),
        _ => ctx.interp.alloc_object(Object::Language(expr)),
    })
}

pub fn missing(ctx: &mut BuiltinContext) -> EvalResult {
    let expr = expect_args(ctx, 1, 1)?[0].value.clone();
    let Expr::Symbol(sym) = *expr else {
        return Err(RuntimeError::InvalidArgument("invalid use of 'missing'".into()));
    };
    let missing = if sym == ctx.interp.syms.dots {
        ctx.interp.dots_args(ctx.env)?.is_empty()
    } else {
        ctx.interp.is_missing_arg(sym, ctx.env)?
    };
    Ok(ctx.interp.alloc_logical(vec![missing]))
}

pub fn use_method(ctx: &mut BuiltinContext) -> EvalResult {
    let args = expect_args(ctx, 1, 2)?.to_vec();
    ctx.interp.do_usemethod(ctx.call, &args, ctx.env)
}

pub fn next_method(ctx: &mut BuiltinContext) -> EvalResult {
    ctx.interp.nextmethod(ctx.call, ctx.env)
}

pub fn standard_generic(ctx: &mut BuiltinContext) -> EvalResult {
    let expr = expect_args(ctx, 1, 2)?[0].value.clone();
    let value = ctx.interp.eval(&expr, ctx.env)?;
    let name = ctx.interp.as_string(value).map(str::to_owned).ok_or_else(|| {
        RuntimeError::InvalidArgument(
            "argument to 'standardGeneric' must be a non-empty character string".into(),
        )
    })?;
    ctx.interp.standard_generic(&name, ctx.env)
}
