use std::rc::Rc;

use crate::{
    ArgList, EvalResult, Expr, Interpreter, ObjectRef, Opcode, RuntimeError,
};

mod arith;
mod general;
mod methods;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BuiltinFlags: u8 {
        /// Receives its arguments unevaluated.
        const SPECIAL = 1 << 0;
        /// Dispatches on a classed first argument before running.
        const INTERNAL_GENERIC = 1 << 1;
        /// Member of the `Ops` group generic.
        const OPS_GROUP = 1 << 2;
    }
}

pub type BuiltinFn = fn(&mut BuiltinContext) -> EvalResult;

#[derive(Debug, Copy, Clone)]
pub struct BuiltinEntry<'a> {
    pub name: &'a str,
    pub flags: BuiltinFlags,
    pub fun: BuiltinFn,
}

impl<'a> BuiltinEntry<'a> {
    pub const fn new(name: &'a str, flags: BuiltinFlags, fun: BuiltinFn) -> Self {
        Self { name, flags, fun }
    }
}

pub struct BuiltinContext<'a> {
    pub interp: &'a mut Interpreter,
    pub call: &'a Rc<Expr>,
    pub opcode: Opcode,
    /// Evaluated arguments; empty for special builtins, which read the
    /// call instead.
    pub args: ArgList,
    /// The environment the call is evaluated in.
    pub env: ObjectRef,
}

impl BuiltinContext<'_> {
    pub fn name(&self) -> &'static str {
        BUILTINS[self.opcode.0].name
    }

    pub fn check_arity(&self, min: usize, max: usize) -> Result<(), RuntimeError> {
        let count = self.args.len();
        if (min..=max).contains(&count) {
            return Ok(());
        }
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        Err(RuntimeError::InvalidArgument(format!(
            "{count} arguments passed to '{}' which requires {expected}",
            self.name()
        )))
    }

    /// The evaluated argument at `idx`; empty arguments are an error.
    pub fn arg(&self, idx: usize) -> Result<ObjectRef, RuntimeError> {
        self.args.get(idx).and_then(|arg| arg.value).ok_or_else(|| {
            RuntimeError::InvalidArgument(format!(
                "argument {} of '{}' is missing",
                idx + 1,
                self.name()
            ))
        })
    }

    pub fn opt_arg(&self, idx: usize) -> Option<ObjectRef> {
        self.args.get(idx).and_then(|arg| arg.value)
    }

    /// Unevaluated arguments of the call, for special builtins.
    pub fn call_args(&self) -> &[crate::ExprArg] {
        self.call.call_args()
    }
}

const NONE: BuiltinFlags = BuiltinFlags::empty();
const SPECIAL: BuiltinFlags = BuiltinFlags::SPECIAL;
const OPS: BuiltinFlags = BuiltinFlags::OPS_GROUP;
const INTERNAL: BuiltinFlags = BuiltinFlags::INTERNAL_GENERIC;

pub const BUILTINS: &[BuiltinEntry] = &[
    BuiltinEntry::new("quote", SPECIAL, methods::quote),
    BuiltinEntry::new("missing", SPECIAL, methods::missing),
    BuiltinEntry::new("UseMethod", SPECIAL, methods::use_method),
    BuiltinEntry::new("NextMethod", SPECIAL, methods::next_method),
    BuiltinEntry::new("standardGeneric", SPECIAL, methods::standard_generic),
    BuiltinEntry::new("+", OPS, arith::add),
    BuiltinEntry::new("-", OPS, arith::sub),
    BuiltinEntry::new("*", OPS, arith::mul),
    BuiltinEntry::new("/", OPS, arith::div),
    BuiltinEntry::new("==", OPS, arith::eq),
    BuiltinEntry::new("!=", OPS, arith::ne),
    BuiltinEntry::new("<", OPS, arith::lt),
    BuiltinEntry::new(">", OPS, arith::gt),
    BuiltinEntry::new("c", NONE, general::combine),
    BuiltinEntry::new("list", NONE, general::list),
    BuiltinEntry::new("length", INTERNAL, general::length),
    BuiltinEntry::new("class", NONE, general::class),
    BuiltinEntry::new("oldClass", NONE, general::old_class),
    BuiltinEntry::new("class<-", NONE, general::set_class),
    BuiltinEntry::new("unclass", NONE, general::unclass),
    BuiltinEntry::new("inherits", NONE, general::inherits),
    BuiltinEntry::new("identical", NONE, general::identical),
    BuiltinEntry::new("invisible", NONE, general::invisible),
    BuiltinEntry::new("return", NONE, general::return_),
    BuiltinEntry::new("stop", NONE, general::stop),
    BuiltinEntry::new("warning", NONE, general::warning),
    BuiltinEntry::new("environment", NONE, general::environment),
    BuiltinEntry::new("parent.frame", NONE, general::parent_frame),
    BuiltinEntry::new("sys.call", NONE, general::sys_call),
    BuiltinEntry::new("sys.function", NONE, general::sys_function),
    BuiltinEntry::new("is.function", NONE, general::is_function),
    BuiltinEntry::new("gc", NONE, general::gc),
];

pub fn builtin_index(name: &str) -> Option<Opcode> {
    BUILTINS
        .iter()
        .position(|entry| entry.name == name)
        .map(Opcode)
}

pub fn get_builtin(op: Opcode) -> BuiltinEntry<'static> {
    debug_assert!(op.0 < BUILTINS.len());
    BUILTINS[op.0]
}

/// Renders a value for `stop()` and `warning()` messages.
fn message_text(interp: &Interpreter, args: &ArgList) -> String {
    args.values()
        .map(|value| match interp.object(value) {
            crate::Object::Character(v) => v.concat(),
            crate::Object::Integer(v) => {
                v.iter().map(i64::to_string).collect::<Vec<_>>().join(" ")
            }
            crate::Object::Double(v) => {
                v.iter().map(f64::to_string).collect::<Vec<_>>().join(" ")
            }
            crate::Object::Logical(v) => v
                .iter()
                .map(|&b| if b { "TRUE" } else { "FALSE" })
                .collect::<Vec<_>>()
                .join(" "),
            other => format!("<{}>", other.type_name()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_unique() {
        for (idx, entry) in BUILTINS.iter().enumerate() {
            assert_eq!(builtin_index(entry.name), Some(Opcode(idx)));
        }
    }

    #[test]
    fn operators_belong_to_ops_group() {
        for name in ["+", "-", "*", "/", "==", "!=", "<", ">"] {
            let op = builtin_index(name).expect("operator exists");
            assert!(get_builtin(op).flags.contains(BuiltinFlags::OPS_GROUP));
        }
        let length = builtin_index("length").expect("length exists");
        assert!(get_builtin(length).flags.contains(BuiltinFlags::INTERNAL_GENERIC));
        let quote = builtin_index("quote").expect("quote exists");
        assert!(get_builtin(quote).flags.contains(BuiltinFlags::SPECIAL));
    }
}
