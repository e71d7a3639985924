//! Closure and builtin application.

use std::rc::Rc;

use crate::{
    Arg, ArgList, Binding, BuiltinContext, BuiltinFlags, CallContext, Closure,
    ContextKind, EvalResult, Expr, Interpreter, Matched, Object, ObjectRef,
    Opcode, RuntimeError, Symbol, get_builtin,
};

impl Interpreter {
    /// Pushes `context`, failing once the nesting limit is reached.
    pub(crate) fn begin_context(&mut self, context: CallContext) -> Result<(), RuntimeError> {
        if self.contexts.depth() >= self.max_depth() {
            return Err(RuntimeError::TooDeep);
        }
        self.contexts.push(context);
        Ok(())
    }

    /// Pops the innermost context and releases every root it made.
    pub(crate) fn end_context(&mut self) {
        let context = self.contexts.pop();
        self.release_roots(context.root_depth);
    }

    /// Calls the closure `fun`.
    ///
    /// `promargs` are matched against the formals before a context exists,
    /// so matching errors are reported against the caller. `supplied` are
    /// extra bindings for the new frame (the dispatch variables), added
    /// only where matching left the name unbound.
    pub fn apply_closure(
        &mut self,
        call: &Rc<Expr>,
        fun: ObjectRef,
        promargs: ArgList,
        sysparent: ObjectRef,
        supplied: &[(Symbol, ObjectRef)],
    ) -> EvalResult {
        let Some(closure) = self.closure(fun).cloned() else {
            return Err(RuntimeError::NotAFunction);
        };
        let matched = self.match_call_args(call, &closure.formals, &promargs.0)?;

        self.begin_context(CallContext {
            kind: ContextKind::Function,
            call: call.clone(),
            callfun: fun,
            sysparent,
            cloenv: None,
            promargs,
            root_depth: self.root_depth(),
        })?;
        let result = self.run_closure(&closure, matched, supplied);
        self.end_context();
        result
    }

    fn run_closure(
        &mut self,
        closure: &Closure,
        matched: Vec<Matched>,
        supplied: &[(Symbol, ObjectRef)],
    ) -> EvalResult {
        let newenv = self.alloc_env(Some(closure.env));
        if let Some(context) = self.contexts.innermost_mut() {
            context.cloenv = Some(newenv);
        }

        for (formal, matched) in closure.formals.iter().zip(matched) {
            let binding = match matched {
                Matched::Supplied(value) => match self.object(value) {
                    Object::Promise(_) => Binding::promise(value),
                    _ => Binding::bound(value),
                },
                Matched::Missing => match &formal.default {
                    Some(default) => {
                        Binding::missing(Some(self.alloc_promise(default.clone(), newenv)))
                    }
                    None => Binding::missing(None),
                },
                Matched::Dots(args) if args.is_empty() => Binding::missing(None),
                Matched::Dots(args) => Binding::bound(self.alloc_object(Object::Dots(args))),
            };
            self.environment_mut(newenv)
                .frame
                .bind_binding(formal.name, binding);
        }

        let frame = &mut self.environment_mut(newenv).frame;
        for &(sym, value) in supplied {
            if !frame.contains(sym) {
                frame.bind(sym, value);
            }
        }

        match self.eval(&closure.body, newenv) {
            Err(RuntimeError::Return { value, env }) if env == newenv => Ok(value),
            result => result,
        }
    }

    /// Applies any function value: closures get `promargs` as they are,
    /// eager builtins get them forced.
    pub fn apply_function(
        &mut self,
        call: &Rc<Expr>,
        fun: ObjectRef,
        promargs: ArgList,
        env: ObjectRef,
        supplied: &[(Symbol, ObjectRef)],
    ) -> EvalResult {
        let op = match self.object(fun) {
            Object::Closure(_) => {
                return self.apply_closure(call, fun, promargs, env, supplied);
            }
            Object::Builtin(op) => *op,
            _ => return Err(RuntimeError::NotAFunction),
        };
        if get_builtin(op).flags.contains(BuiltinFlags::SPECIAL) {
            return self.call_special(call, op, env);
        }

        let mark = self.root_depth();
        let mut args = ArgList::new();
        let mut forced = Ok(());
        for arg in promargs.0 {
            let value = match arg.value.map(|value| self.force_value(value)) {
                Some(Ok(value)) => Some(value),
                Some(Err(err)) => {
                    forced = Err(err);
                    break;
                }
                None => None,
            };
            if let Some(value) = value {
                self.protect(value);
            }
            args.push(Arg { tag: arg.tag, value });
        }
        let result = forced.and_then(|()| self.apply_builtin(call, op, args, env));
        self.release_roots(mark);
        result
    }

    pub(crate) fn call_special(
        &mut self,
        call: &Rc<Expr>,
        op: Opcode,
        env: ObjectRef,
    ) -> EvalResult {
        let entry = get_builtin(op);
        (entry.fun)(&mut BuiltinContext {
            interp: self,
            call,
            opcode: op,
            args: ArgList::new(),
            env,
        })
    }

    fn is_default_call(&self, call: &Expr) -> bool {
        call.call_head()
            .is_some_and(|head| self.symbols.name(head).ends_with(".default"))
    }

    /// Runs an eager builtin on evaluated `args`, giving method dispatch
    /// the first chance at it.
    pub fn apply_builtin(
        &mut self,
        call: &Rc<Expr>,
        op: Opcode,
        args: ArgList,
        env: ObjectRef,
    ) -> EvalResult {
        let entry = get_builtin(op);
        if !self.is_default_call(call) {
            if let Some(value) = self.possible_dispatch(call, op, &args, env)? {
                return Ok(value);
            }
            if entry.flags.contains(BuiltinFlags::OPS_GROUP) {
                if let Some(value) = self.group_dispatch("Ops", call, op, &args, env)? {
                    return Ok(value);
                }
            } else if entry.flags.contains(BuiltinFlags::INTERNAL_GENERIC) {
                if let Some(value) = self.dispatch_or_eval(call, op, &args, env)? {
                    return Ok(value);
                }
            }
        }
        (entry.fun)(&mut BuiltinContext {
            interp: self,
            call,
            opcode: op,
            args,
            env,
        })
    }
}
