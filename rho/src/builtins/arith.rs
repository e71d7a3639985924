use crate::{BuiltinContext, EvalResult, Object, ObjectRef, RuntimeError};

#[derive(Debug, Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
}

enum Numbers {
    Int(Vec<i64>),
    Dbl(Vec<f64>),
}

impl Numbers {
    fn from_object(obj: &Object) -> Option<Self> {
        match obj {
            Object::Integer(v) => Some(Numbers::Int(v.clone())),
            Object::Logical(v) => {
                Some(Numbers::Int(v.iter().map(|&b| b as i64).collect()))
            }
            Object::Double(v) => Some(Numbers::Dbl(v.clone())),
            _ => None,
        }
    }

    fn into_f64(self) -> Vec<f64> {
        match self {
            Numbers::Int(v) => v.into_iter().map(|i| i as f64).collect(),
            Numbers::Dbl(v) => v,
        }
    }
}

/// Element-wise `f` with the shorter operand recycled; empty if either
/// operand is empty.
fn recycle<T: Copy, U: Copy, R>(
    lhs: &[T],
    rhs: &[U],
    mut f: impl FnMut(T, U) -> R,
) -> Vec<R> {
    if lhs.is_empty() || rhs.is_empty() {
        return Vec::new();
    }
    let len = lhs.len().max(rhs.len());
    (0..len)
        .map(|idx| f(lhs[idx % lhs.len()], rhs[idx % rhs.len()]))
        .collect()
}

fn overflow() -> RuntimeError {
    RuntimeError::Type("integer overflow".into())
}

fn non_numeric() -> RuntimeError {
    RuntimeError::Type("non-numeric argument to binary operator".into())
}

fn operands(
    ctx: &BuiltinContext,
) -> Result<(ObjectRef, Option<ObjectRef>), RuntimeError> {
    ctx.check_arity(1, 2)?;
    Ok((ctx.arg(0)?, ctx.args.get(1).map(|_| ctx.arg(1)).transpose()?))
}

fn unary(op: ArithOp, value: Numbers) -> Result<Object, RuntimeError> {
    match (op, value) {
        (ArithOp::Add, Numbers::Int(v)) => Ok(Object::Integer(v)),
        (ArithOp::Add, Numbers::Dbl(v)) => Ok(Object::Double(v)),
        (ArithOp::Sub, Numbers::Int(v)) => v
            .into_iter()
            .map(i64::checked_neg)
            .collect::<Option<Vec<_>>>()
            .map(Object::Integer)
            .ok_or_else(overflow),
        (ArithOp::Sub, Numbers::Dbl(v)) => Ok(Object::Double(
            v.into_iter().map(|d| -d).collect(),
        )),
        _ => Err(RuntimeError::Type("invalid unary operator".into())),
    }
}

fn binary(op: ArithOp, lhs: Numbers, rhs: Numbers) -> Result<Object, RuntimeError> {
    if let (Numbers::Int(a), Numbers::Int(b), false) =
        (&lhs, &rhs, matches!(op, ArithOp::Div))
    {
        let checked = match op {
            ArithOp::Add => i64::checked_add,
            ArithOp::Sub => i64::checked_sub,
            _ => i64::checked_mul,
        };
        return recycle(a, b, checked)
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .map(Object::Integer)
            .ok_or_else(overflow);
    }

    let (a, b) = (lhs.into_f64(), rhs.into_f64());
    let f = match op {
        ArithOp::Add => |x: f64, y: f64| x + y,
        ArithOp::Sub => |x, y| x - y,
        ArithOp::Mul => |x, y| x * y,
        ArithOp::Div => |x, y| x / y,
    };
    Ok(Object::Double(recycle(&a, &b, f)))
}

fn arith(ctx: &mut BuiltinContext, op: ArithOp) -> EvalResult {
    let (lhs, rhs) = operands(ctx)?;
    let result = {
        let interp = &*ctx.interp;
        let lhs = Numbers::from_object(interp.object(lhs)).ok_or_else(non_numeric)?;
        match rhs {
            None => unary(op, lhs)?,
            Some(rhs) => {
                let rhs = Numbers::from_object(interp.object(rhs))
                    .ok_or_else(non_numeric)?;
                binary(op, lhs, rhs)?
            }
        }
    };
    Ok(ctx.interp.alloc_object(result))
}

fn compare_with<T: PartialOrd + Copy>(op: CompareOp, a: &[T], b: &[T]) -> Vec<bool> {
    recycle(a, b, |x, y| match op {
        CompareOp::Eq => x == y,
        CompareOp::Ne => x != y,
        CompareOp::Lt => x < y,
        CompareOp::Gt => x > y,
    })
}

fn as_text(obj: &Object) -> Option<Vec<String>> {
    match obj {
        Object::Character(v) => Some(v.clone()),
        Object::Integer(v) => Some(v.iter().map(i64::to_string).collect()),
        Object::Double(v) => Some(v.iter().map(f64::to_string).collect()),
        Object::Logical(v) => Some(
            v.iter()
                .map(|&b| if b { "TRUE" } else { "FALSE" }.to_owned())
                .collect(),
        ),
        _ => None,
    }
}

fn compare(ctx: &mut BuiltinContext, op: CompareOp) -> EvalResult {
    ctx.check_arity(2, 2)?;
    let (lhs, rhs) = (ctx.arg(0)?, ctx.arg(1)?);
    let result = {
        let interp = &*ctx.interp;
        let (lhs, rhs) = (interp.object(lhs), interp.object(rhs));
        if matches!(lhs, Object::Character(_)) || matches!(rhs, Object::Character(_)) {
            let (Some(a), Some(b)) = (as_text(lhs), as_text(rhs)) else {
                return Err(RuntimeError::Type(
                    "comparison is possible only for atomic types".into(),
                ));
            };
            let a = a.iter().map(String::as_str).collect::<Vec<_>>();
            let b = b.iter().map(String::as_str).collect::<Vec<_>>();
            compare_with(op, &a, &b)
        } else {
            let (Some(a), Some(b)) =
                (Numbers::from_object(lhs), Numbers::from_object(rhs))
            else {
                return Err(RuntimeError::Type(
                    "comparison is possible only for atomic types".into(),
                ));
            };
            match (a, b) {
                (Numbers::Int(a), Numbers::Int(b)) => compare_with(op, &a, &b),
                (a, b) => compare_with(op, &a.into_f64(), &b.into_f64()),
            }
        }
    };
    Ok(ctx.interp.alloc_logical(result))
}

pub fn add(ctx: &mut BuiltinContext) -> EvalResult {
    arith(ctx, ArithOp::Add)
}

pub fn sub(ctx: &mut BuiltinContext) -> EvalResult {
    arith(ctx, ArithOp::Sub)
}

pub fn mul(ctx: &mut BuiltinContext) -> EvalResult {
    arith(ctx, ArithOp::Mul)
}

pub fn div(ctx: &mut BuiltinContext) -> EvalResult {
    arith(ctx, ArithOp::Div)
}

pub fn eq(ctx: &mut BuiltinContext) -> EvalResult {
    compare(ctx, CompareOp::Eq)
}

pub fn ne(ctx: &mut BuiltinContext) -> EvalResult {
    compare(ctx, CompareOp::Ne)
}

pub fn lt(ctx: &mut BuiltinContext) -> EvalResult {
    compare(ctx, CompareOp::Lt)
}

pub fn gt(ctx: &mut BuiltinContext) -> EvalResult {
    compare(ctx, CompareOp::Gt)
}
