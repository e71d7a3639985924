//! Class-based dispatch: `UseMethod`, `NextMethod`, group dispatch for
//! operators and internal generics.

use std::rc::Rc;

use crate::{
    ArgList, BindingOrigin, CallContext, ContextKind, EvalResult, Expr,
    ExprArg, Formal, Interpreter, Matched, MethodLookup, MethodMatch,
    MethodSearch, Object, ObjectRef, Opcode, RuntimeError, Symbol, WellKnown,
    get_builtin, method_name,
};

/// Resolves method names through the call environment, then the
/// definition environment, then the registered S3 methods.
struct EnvLookup<'a> {
    interp: &'a mut Interpreter,
    callenv: ObjectRef,
    defenv: ObjectRef,
}

impl MethodLookup for EnvLookup<'_> {
    fn lookup(&mut self, name: &str) -> Result<Option<ObjectRef>, RuntimeError> {
        let Some(sym) = self.interp.symbols.lookup(name) else {
            return Ok(None);
        };
        if let Some(fun) = self.interp.find_fun_opt(sym, self.callenv)? {
            return Ok(Some(fun));
        }
        if let Some(fun) = self.interp.find_fun_opt(sym, self.defenv)? {
            return Ok(Some(fun));
        }
        let table = self.interp.s3_methods_env();
        Ok(self
            .interp
            .environment(table)
            .frame
            .binding(sym)
            .and_then(|binding| binding.value)
            .filter(|&fun| self.interp.object(fun).is_function()))
    }
}

/// The variables a dispatched method finds in its frame.
struct DispatchVars {
    class: ObjectRef,
    generic: ObjectRef,
    method: ObjectRef,
    group: ObjectRef,
    call_env: ObjectRef,
    def_env: ObjectRef,
}

impl DispatchVars {
    fn bindings(&self, syms: &WellKnown) -> [(Symbol, ObjectRef); 6] {
        [
            (syms.dot_class, self.class),
            (syms.dot_generic, self.generic),
            (syms.dot_method, self.method),
            (syms.dot_group, self.group),
            (syms.dot_generic_call_env, self.call_env),
            (syms.dot_generic_def_env, self.def_env),
        ]
    }
}

/// `'widget'` or `c('A', 'B')`, as used in dispatch errors.
pub fn format_class(classes: &[String]) -> String {
    match classes {
        [single] => format!("'{single}'"),
        _ => format!(
            "c({})",
            classes
                .iter()
                .map(|class| format!("'{class}'"))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

impl Interpreter {
    /// The class an object has without a class attribute.
    pub fn implicit_class(&self, r: ObjectRef) -> Vec<String> {
        let classes: &[&str] = match self.object(r) {
            Object::Null => &["NULL"],
            Object::Logical(_) => &["logical"],
            Object::Integer(_) => &["integer", "numeric"],
            Object::Double(_) => &["double", "numeric"],
            Object::Character(_) => &["character"],
            Object::List(_) => &["list"],
            Object::Symbol(_) => &["name"],
            Object::Closure(_) | Object::Builtin(_) => &["function"],
            Object::Environment(_) => &["environment"],
            Object::Promise(_) => &["promise"],
            Object::Dots(_) => &["..."],
            Object::Language(_) => &["call"],
        };
        classes.iter().map(|&class| class.to_owned()).collect()
    }

    pub fn explicit_class(&self, r: ObjectRef) -> Option<Vec<String>> {
        let class = self.heap(r).attribute(self.syms.class)?;
        self.as_strings(class)
            .filter(|classes| !classes.is_empty())
            .map(<[String]>::to_vec)
    }

    /// The class vector used for dispatch, most specific first.
    pub fn class_vector(&self, r: ObjectRef) -> Vec<String> {
        self.explicit_class(r)
            .unwrap_or_else(|| self.implicit_class(r))
    }

    /// Whether `r` carries a class attribute.
    pub fn is_object(&self, r: ObjectRef) -> bool {
        self.explicit_class(r).is_some()
    }

    fn protected_strings<S: Into<String>>(
        &mut self,
        values: impl IntoIterator<Item = S>,
    ) -> ObjectRef {
        let r = self.alloc_character(values);
        self.protect(r);
        r
    }

    /// `.Class` for a method found at `index` of `classes`: the suffix,
    /// remembering the full vector as `previous` when it was cut.
    fn dispatch_class(
        &mut self,
        classes: &[String],
        index: usize,
        keep_previous: bool,
    ) -> ObjectRef {
        let suffix = self.protected_strings(classes[index.min(classes.len())..].iter().cloned());
        if keep_previous && index > 0 {
            let previous = self.protected_strings(classes.iter().cloned());
            let sym = self.syms.previous;
            self.heap_mut(suffix).set_attribute(sym, Some(previous));
        }
        suffix
    }

    /// Value bound to `sym` in the frame of `env` itself.
    fn frame_value(&self, env: ObjectRef, sym: Symbol) -> Option<ObjectRef> {
        self.environment(env)
            .frame
            .binding(sym)
            .filter(|binding| binding.origin == BindingOrigin::Bound)
            .and_then(|binding| binding.value)
    }

    fn find_method(
        &mut self,
        search: &mut MethodSearch,
        callenv: ObjectRef,
        defenv: ObjectRef,
        from: usize,
        allow_default: bool,
    ) -> Result<Option<MethodMatch>, RuntimeError> {
        let mut lookup = EnvLookup {
            interp: self,
            callenv,
            defenv,
        };
        Ok(search.run(&mut lookup, from, allow_default)?.cloned())
    }

    /// Dispatches `generic` on the class of `object` and runs the method.
    ///
    /// `promargs` are handed to the method as they are, `callenv` becomes
    /// its caller. Returns `None` when no method applies.
    pub fn usemethod(
        &mut self,
        generic: &str,
        object: ObjectRef,
        call: &Rc<Expr>,
        promargs: ArgList,
        callenv: ObjectRef,
        defenv: ObjectRef,
    ) -> Result<Option<ObjectRef>, RuntimeError> {
        let _span = tracing::span!(tracing::Level::DEBUG, "usemethod", generic).entered();

        let mut search = MethodSearch::new(generic, None, self.class_vector(object));
        let Some(found) = self.find_method(&mut search, callenv, defenv, 0, true)?
        else {
            log::trace!("{generic}: no method for {:?}", search.classes);
            return Ok(None);
        };
        log::trace!("{generic}: dispatching to {}", found.name);

        let mark = self.root_depth();
        self.protect(found.method);
        let class = if found.is_default {
            self.null()
        } else {
            self.dispatch_class(&search.classes, found.index, true)
        };
        let vars = DispatchVars {
            class,
            generic: self.protected_strings([generic]),
            method: self.protected_strings([found.name.as_str()]),
            group: self.protected_strings([""]),
            call_env: callenv,
            def_env: defenv,
        };
        let head = self.symbols.intern(&found.name);
        let newcall = Rc::new(call.with_head(head));
        let bindings = vars.bindings(&self.syms);
        let result = self.apply_function(&newcall, found.method, promargs, callenv, &bindings);
        self.release_roots(mark);
        result.map(Some)
    }

    /// The object `UseMethod` dispatches on when none is given: the
    /// argument matched to the generic's first formal, or the first
    /// argument when that formal is `...` or matches nothing.
    fn dispatch_object(&mut self, callfun: ObjectRef, promargs: &ArgList) -> EvalResult {
        let first = self
            .closure(callfun)
            .and_then(|closure| closure.formals.first().map(|formal| formal.name))
            .filter(|&name| name != self.syms.dots);

        let chosen = match first {
            Some(formal) => {
                let name = self.symbols.name(formal);
                promargs
                    .iter()
                    .find(|arg| arg.tag == Some(formal))
                    .or_else(|| {
                        promargs.iter().find(|arg| {
                            arg.tag.is_some_and(|tag| {
                                name.starts_with(&*self.symbols.name(tag))
                            })
                        })
                    })
                    .or_else(|| promargs.iter().find(|arg| arg.tag.is_none()))
                    .or_else(|| promargs.get(0))
                    .copied()
            }
            None => promargs.get(0).copied(),
        };
        match chosen.and_then(|arg| arg.value) {
            Some(value) => self.force_value(value),
            None => Ok(self.null()),
        }
    }

    /// `UseMethod(generic, object)` called with `env` as its environment.
    ///
    /// A dispatched method's value is delivered as an early return from
    /// the generic.
    pub(crate) fn do_usemethod(
        &mut self,
        call: &Rc<Expr>,
        args: &[ExprArg],
        env: ObjectRef,
    ) -> EvalResult {
        let Some(context) = self.contexts.innermost() else {
            return Err(RuntimeError::OutsideFunction);
        };
        if context.kind != ContextKind::Function || context.cloenv != Some(env) {
            return Err(RuntimeError::InappropriateUse);
        }
        let context = context.clone();

        let mark = self.root_depth();
        let result = self.usemethod_from(&context, call, args, env);
        self.release_roots(mark);
        let value = result?;
        Err(RuntimeError::Return { value, env })
    }

    fn usemethod_from(
        &mut self,
        context: &CallContext,
        call: &Rc<Expr>,
        args: &[ExprArg],
        env: ObjectRef,
    ) -> EvalResult {
        let generic = self.eval(&args[0].value, env)?;
        let Some(generic) = self.as_string(generic).map(str::to_owned) else {
            return Err(RuntimeError::InvalidArgument(format!(
                "'generic' argument must be a character string in {}",
                call.display(&self.symbols)
            )));
        };

        let object = match args.get(1) {
            Some(arg) => self.eval(&arg.value, env)?,
            None => self.dispatch_object(context.callfun, &context.promargs)?,
        };
        self.protect(object);

        let sym = self.symbols.intern(&generic);
        let enclosing = self.environment(env).parent.unwrap_or(self.base_env());
        let defenv = match self.find_fun_opt(sym, enclosing)? {
            Some(fun) => self.closure(fun).map_or(self.base_env(), |closure| closure.env),
            None => self.base_env(),
        };

        let dispatched = self.usemethod(
            &generic,
            object,
            &context.call,
            context.promargs.clone(),
            context.sysparent,
            defenv,
        )?;
        dispatched.ok_or_else(|| RuntimeError::NoApplicableMethod {
            class: format_class(&self.class_vector(object)),
            generic,
        })
    }

    /// `NextMethod(generic, object, ...)` called with `env` as its
    /// environment.
    pub fn nextmethod(&mut self, call: &Rc<Expr>, env: ObjectRef) -> EvalResult {
        let mark = self.root_depth();
        let result = self.resume_dispatch(call, env);
        self.release_roots(mark);
        result
    }

    fn resume_dispatch(&mut self, call: &Rc<Expr>, env: ObjectRef) -> EvalResult {
        let Some(context) = self.contexts.function_with_env(env) else {
            return Err(RuntimeError::OutsideMethodDispatch);
        };
        let mcall = context.call.clone();
        let callfun = context.callfun;
        let promargs = context.promargs.clone();
        let Some(head) = mcall.call_head() else {
            return Err(RuntimeError::InvalidArgument(
                "'NextMethod' called from an anonymous function".into(),
            ));
        };

        let syms = self.syms;
        let callenv = self
            .frame_value(env, syms.dot_generic_call_env)
            .unwrap_or(env);
        let defenv = self
            .frame_value(env, syms.dot_generic_def_env)
            .unwrap_or(self.global_env());

        // NextMethod's own arguments.
        let own_formals = [
            Formal::new(syms.generic),
            Formal::new(syms.object),
            Formal::new(syms.dots),
        ];
        let own = self.promise_args(call.call_args(), env)?;
        let own = self.match_call_args(call, &own_formals, &own.0)?;
        let generic_arg = match &own[0] {
            Matched::Supplied(value) => {
                let value = self.force_value(*value)?;
                if value == self.null() {
                    None
                } else {
                    Some(self.as_string(value).map(str::to_owned).ok_or_else(|| {
                        RuntimeError::InvalidArgument(
                            "invalid generic argument to 'NextMethod'".into(),
                        )
                    })?)
                }
            }
            _ => None,
        };
        let extras = match &own[2] {
            Matched::Dots(args) => ArgList::from(args.clone()),
            _ => ArgList::new(),
        };

        // The calling generic, for the formals to re-match against.
        let head_name = self.symbols.name(head).to_string();
        let current = {
            let mut lookup = EnvLookup {
                interp: self,
                callenv: env,
                defenv,
            };
            lookup.lookup(&head_name)?
        };
        if current.is_none() {
            return Err(RuntimeError::NoCallingGeneric);
        }

        let generic = match self.frame_value(env, syms.dot_generic) {
            Some(value) => self.as_string(value).map(str::to_owned),
            None => generic_arg,
        }
        .ok_or(RuntimeError::GenericNotSpecified)?;

        let generic_sym = self.symbols.intern(&generic);
        let generic_fun = self.find_fun_opt(generic_sym, env)?;
        let formals = generic_fun
            .and_then(|fun| self.closure(fun))
            .or_else(|| self.closure(callfun))
            .map(|closure| closure.formals.clone())
            .ok_or(RuntimeError::NoCallingGeneric)?;

        // Actuals bound to a formal of the generic are passed on as
        // promises reading the running method's own formal for them, so
        // renamed formals and reassignments in the method are seen.
        let cloenv = env;
        let matched = self.match_call_args(&mcall, &formals, &promargs.0)?;
        let method_formals = self
            .closure(callfun)
            .map(|closure| closure.formals.clone())
            .unwrap_or_else(|| formals.clone());
        let method_matched = self.match_call_args(&mcall, &method_formals, &promargs.0)?;
        let mut args = promargs.clone();
        for matched in &matched {
            let Matched::Supplied(value) = *matched else {
                continue;
            };
            let Some(formal) = method_formals
                .iter()
                .zip(&method_matched)
                .find(|(_, bound)| **bound == Matched::Supplied(value))
                .map(|(formal, _)| formal)
            else {
                continue;
            };
            let missing = self
                .environment(cloenv)
                .frame
                .binding(formal.name)
                .is_some_and(|binding| binding.origin == BindingOrigin::Missing);
            if missing {
                continue;
            }
            let Some(idx) = args.iter().position(|arg| arg.value == Some(value)) else {
                continue;
            };
            let promise = self.alloc_promise(Rc::new(Expr::Symbol(formal.name)), cloenv);
            self.protect(promise);
            args.0[idx].value = Some(promise);
        }
        args.merge(extras);

        let klass = match self.frame_value(env, syms.dot_class) {
            Some(value) => self.as_strings(value).map(<[String]>::to_vec).unwrap_or_default(),
            None => {
                if promargs.is_empty() {
                    return Err(RuntimeError::ObjectNotSpecified);
                }
                let object = self.dispatch_object(callfun, &promargs)?;
                self.class_vector(object)
            }
        };

        let group_value = self.frame_value(env, syms.dot_group);
        let group = group_value
            .and_then(|value| self.as_strings(value))
            .and_then(|groups| groups.first().cloned())
            .unwrap_or_default();
        let basename = if group.is_empty() { generic.clone() } else { group.clone() };

        // Name of the method that is running now.
        let method_value = self.frame_value(env, syms.dot_method);
        let mut current_name = head_name.clone();
        let method_names = method_value
            .and_then(|value| self.as_strings(value))
            .map(<[String]>::to_vec);
        if let Some(names) = &method_names {
            let mut named = names.iter().filter(|name| !name.is_empty());
            if let Some(first) = named.next() {
                current_name = first.clone();
                if named.any(|other| other != first) {
                    self.warn("Incompatible methods ignored");
                }
            }
        }

        let start = klass
            .iter()
            .position(|class| method_name(&basename, class) == current_name)
            .map_or(0, |idx| idx + 1);

        let mut search = MethodSearch::new(&generic, Some(&group), klass);
        let found = self.find_method(&mut search, callenv, defenv, start, false)?;
        let default_name = method_name(&generic, "default");
        let (next, next_name) = match found {
            Some(found) => (found.method, found.name),
            None => {
                let default = if current_name == default_name {
                    None
                } else {
                    let mut lookup = EnvLookup {
                        interp: self,
                        callenv,
                        defenv,
                    };
                    lookup.lookup(&default_name)?
                };
                match default {
                    Some(method) => (method, default_name.clone()),
                    None => match self.find_fun_opt(generic_sym, env)? {
                        Some(fun) if matches!(self.object(fun), Object::Builtin(_)) => {
                            (fun, default_name.clone())
                        }
                        Some(_) => return Err(RuntimeError::NoMethodToInvoke),
                        None => return Err(RuntimeError::NoMoreMethods { generic }),
                    },
                }
            }
        };
        log::trace!("{generic}: next method {next_name}");
        self.protect(next);

        let class = self.dispatch_class(&search.classes, search.index, true);
        let method = match method_names {
            Some(names) => {
                let names = names
                    .iter()
                    .map(|name| if name.is_empty() { String::new() } else { next_name.clone() })
                    .collect::<Vec<_>>();
                self.protected_strings(names)
            }
            None => self.protected_strings([next_name.as_str()]),
        };
        let vars = DispatchVars {
            class,
            generic: self.protected_strings([generic.as_str()]),
            method,
            group: group_value.unwrap_or_else(|| self.protected_strings([""])),
            call_env: callenv,
            def_env: defenv,
        };
        let head = self.symbols.intern(&next_name);
        let newcall = Rc::new(mcall.with_head(head));
        let bindings = vars.bindings(&self.syms);
        let result = self.apply_function(&newcall, next, args, callenv, &bindings);
        result
    }

    /// Group dispatch for a builtin operator on evaluated `args`. Only
    /// operands with a class attribute take part.
    pub fn group_dispatch(
        &mut self,
        group: &str,
        call: &Rc<Expr>,
        op: Opcode,
        args: &ArgList,
        env: ObjectRef,
    ) -> Result<Option<ObjectRef>, RuntimeError> {
        let generic = get_builtin(op).name;
        if args.is_empty() || args.len() > 2 {
            return Ok(None);
        }
        let operands = args.iter().map(|arg| arg.value).collect::<Vec<_>>();
        let classes = operands
            .iter()
            .map(|value| value.and_then(|value| self.explicit_class(value)))
            .collect::<Vec<_>>();
        if classes.iter().all(Option::is_none) {
            return Ok(None);
        }
        let _span = tracing::span!(tracing::Level::DEBUG, "group_dispatch", group, generic)
            .entered();

        let base = self.base_env();
        let mut found = Vec::with_capacity(classes.len());
        for class in &classes {
            let hit = match class {
                Some(class) => {
                    let mut search = MethodSearch::new(generic, Some(group), class.clone());
                    self.find_method(&mut search, env, base, 0, false)?
                }
                None => None,
            };
            found.push(hit);
        }

        let chosen = match (found.first().cloned().flatten(), found.get(1).cloned().flatten()) {
            (Some(lhs), Some(rhs)) => {
                if lhs.method != rhs.method {
                    self.warn(format!(
                        "Incompatible methods (\"{}\", \"{}\") for \"{generic}\"",
                        lhs.name, rhs.name
                    ));
                }
                (lhs, 0)
            }
            (Some(lhs), None) => (lhs, 0),
            (None, Some(rhs)) => (rhs, 1),
            (None, None) => return Ok(None),
        };
        let (method, operand) = chosen;
        let dispatch_classes = classes[operand].clone().unwrap_or_default();
        let dispatch_class = dispatch_classes[method.index].clone();

        let mark = self.root_depth();
        self.protect(method.method);
        let per_operand = classes
            .iter()
            .map(|class| match class {
                Some(class) if class.contains(&dispatch_class) => method.name.clone(),
                _ => String::new(),
            })
            .collect::<Vec<_>>();
        let vars = DispatchVars {
            class: self.dispatch_class(&dispatch_classes, method.index, false),
            generic: self.protected_strings([generic]),
            method: self.protected_strings(per_operand),
            group: self.protected_strings([if method.group_match { group } else { "" }]),
            call_env: env,
            def_env: base,
        };
        let promargs = self.forced_promise_args(call, args);
        let head = self.symbols.intern(&method.name);
        let newcall = Rc::new(call.with_head(head));
        let bindings = vars.bindings(&self.syms);
        let result = self.apply_function(&newcall, method.method, promargs, env, &bindings);
        self.release_roots(mark);
        result.map(Some)
    }

    /// Dispatch for internal generics: an object first argument is handed
    /// to `UseMethod` from a pseudo context; `None` lets the builtin run.
    pub fn dispatch_or_eval(
        &mut self,
        call: &Rc<Expr>,
        op: Opcode,
        args: &ArgList,
        env: ObjectRef,
    ) -> Result<Option<ObjectRef>, RuntimeError> {
        let Some(first) = args.get(0).and_then(|arg| arg.value) else {
            return Ok(None);
        };
        if !self.is_object(first) {
            return Ok(None);
        }
        let generic = get_builtin(op).name;
        let base = self.base_env();
        let callfun = self
            .symbols
            .lookup(generic)
            .and_then(|sym| self.environment(base).frame.binding(sym))
            .and_then(|binding| binding.value)
            .unwrap_or(self.null());

        let mark = self.root_depth();
        let promargs = self.forced_promise_args(call, args);
        if let Err(err) = self.begin_context(CallContext {
            kind: ContextKind::Internal,
            call: call.clone(),
            callfun,
            sysparent: env,
            cloenv: Some(env),
            promargs: promargs.clone(),
            root_depth: mark,
        }) {
            self.release_roots(mark);
            return Err(err);
        }
        let result = self.usemethod(generic, first, call, promargs, env, base);
        self.end_context();
        result
    }
}
