//! Per-builtin method cache used by the formal-class subsystem to
//! override builtin operators, and the standard-generic entry point.

use std::rc::Rc;

use crate::{
    ArgList, BUILTINS, EvalResult, Expr, Interpreter, Object, ObjectRef,
    Opcode, RuntimeError, Visitable, Visitor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodCacheState {
    #[default]
    NoMethods,
    /// Methods changed; the entry is rebuilt on the next dispatch.
    NeedsReset,
    HasMethods,
    /// Dispatch is off, e.g. while the generic itself runs.
    Suppressed,
}

#[derive(Debug, Clone, Copy)]
pub enum PrimitiveMethodsCode {
    Clear,
    Reset,
    /// `None` keeps what is already cached.
    Set {
        generic: Option<ObjectRef>,
        methods: Option<ObjectRef>,
    },
    Suppress,
}

/// Result of the cheap method check done before a full search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickCheck {
    Method(ObjectRef),
    UseDefault,
    Search,
}

pub type QuickMethodCheckFn = fn(
    &mut Interpreter,
    &ArgList,
    ObjectRef,
    Opcode,
) -> Result<QuickCheck, RuntimeError>;

/// Supplies the method list of a builtin when its entry needs a reset.
pub type GetPrimitiveMethodsFn =
    fn(&mut Interpreter, Opcode, ObjectRef) -> Result<ObjectRef, RuntimeError>;

/// `standardGeneric(name)` for the generic `fdef` running in `env`.
pub type StandardGenericFn =
    fn(&mut Interpreter, &str, ObjectRef, ObjectRef) -> EvalResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchHooks {
    pub quick_method_check: Option<QuickMethodCheckFn>,
    pub get_primitive_methods: Option<GetPrimitiveMethodsFn>,
    pub standard_generic: Option<StandardGenericFn>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PrimitiveMethodEntry {
    state: MethodCacheState,
    generic: Option<ObjectRef>,
    methods: Option<ObjectRef>,
}

#[derive(Debug)]
pub struct PrimitiveMethods {
    entries: Vec<PrimitiveMethodEntry>,
}

impl PrimitiveMethods {
    pub fn new(count: usize) -> Self {
        Self {
            entries: vec![PrimitiveMethodEntry::default(); count],
        }
    }

    pub fn state(&self, op: Opcode) -> MethodCacheState {
        self.entries[op.0].state
    }

    fn entry_mut(&mut self, op: Opcode) -> &mut PrimitiveMethodEntry {
        &mut self.entries[op.0]
    }
}

impl Visitable for PrimitiveMethods {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        for entry in &self.entries {
            if let Some(generic) = entry.generic {
                visitor.visit(generic);
            }
            if let Some(methods) = entry.methods {
                visitor.visit(methods);
            }
        }
    }
}

impl Interpreter {
    pub fn primitive_method_state(&self, op: Opcode) -> MethodCacheState {
        self.prim_methods.state(op)
    }

    /// Updates the cache entry of `op` and returns the previous state.
    pub fn set_primitive_methods(
        &mut self,
        op: Opcode,
        code: PrimitiveMethodsCode,
    ) -> Result<MethodCacheState, RuntimeError> {
        let name = BUILTINS[op.0].name;
        let entry = self.prim_methods.entry_mut(op);
        let previous = entry.state;
        match code {
            PrimitiveMethodsCode::Clear => {
                *entry = PrimitiveMethodEntry::default();
            }
            PrimitiveMethodsCode::Reset => entry.state = MethodCacheState::NeedsReset,
            PrimitiveMethodsCode::Suppress => entry.state = MethodCacheState::Suppressed,
            PrimitiveMethodsCode::Set { generic, methods } => {
                if let Some(generic) = generic {
                    entry.generic = Some(generic);
                } else if entry.generic.is_none() {
                    return Err(RuntimeError::MethodsUnavailable {
                        name: name.to_owned(),
                    });
                }
                if methods.is_some() {
                    entry.methods = methods;
                }
                entry.state = MethodCacheState::HasMethods;
            }
        }
        log::debug!("primitive methods for '{name}': {previous:?} -> {:?}", entry.state);
        Ok(previous)
    }

    /// Gives the formal-class subsystem the first chance at a builtin call.
    ///
    /// `args` are the evaluated arguments. Returns `None` when the builtin's
    /// own implementation should run.
    pub fn possible_dispatch(
        &mut self,
        call: &Rc<Expr>,
        op: Opcode,
        args: &ArgList,
        env: ObjectRef,
    ) -> Result<Option<ObjectRef>, RuntimeError> {
        let mut current = self.prim_methods.state(op);
        if matches!(
            current,
            MethodCacheState::NoMethods | MethodCacheState::Suppressed
        ) {
            return Ok(None);
        }

        let name = BUILTINS[op.0].name;
        let _span =
            tracing::span!(tracing::Level::DEBUG, "possible_dispatch", op = name)
                .entered();

        if current == MethodCacheState::NeedsReset {
            let Some(provider) = self.hooks.get_primitive_methods else {
                return Err(RuntimeError::MethodsUnavailable {
                    name: name.to_owned(),
                });
            };
            self.set_primitive_methods(op, PrimitiveMethodsCode::Suppress)?;
            let methods = match provider(self, op, env) {
                Ok(methods) => methods,
                Err(err) => {
                    self.prim_methods.entry_mut(op).state = current;
                    return Err(err);
                }
            };
            // The rebuilt list is cached even without a generic, so a
            // missing generic below leaves the entry usable.
            let entry = self.prim_methods.entry_mut(op);
            entry.methods = Some(methods);
            entry.state = MethodCacheState::HasMethods;
            current = MethodCacheState::HasMethods;
            log::debug!("primitive methods for '{name}' rebuilt");
        }

        let mark = self.root_depth();
        let methods = self.prim_methods.entries[op.0].methods;
        if let (Some(methods), Some(check)) =
            (methods, self.hooks.quick_method_check)
        {
            match check(self, args, methods, op)? {
                QuickCheck::UseDefault => return Ok(None),
                QuickCheck::Method(method) => {
                    self.protect(method);
                    let promargs = self.forced_promise_args(call, args);
                    let generic = self.alloc_character([name]);
                    self.protect(generic);
                    let vars = [(self.syms.dot_generic, generic)];
                    let result =
                        self.apply_function(call, method, promargs, env, &vars);
                    self.release_roots(mark);
                    return result.map(Some);
                }
                QuickCheck::Search => (),
            }
        }

        let generic = match self.prim_methods.entries[op.0].generic {
            Some(generic) if self.closure(generic).is_some() => generic,
            _ => {
                return Err(RuntimeError::MethodsUnavailable {
                    name: name.to_owned(),
                });
            }
        };

        let promargs = self.forced_promise_args(call, args);
        self.prim_methods.entry_mut(op).state = MethodCacheState::Suppressed;
        let result = self.apply_closure(call, generic, promargs, env, &[]);
        self.prim_methods.entry_mut(op).state = current;
        self.release_roots(mark);

        let value = result?;
        if value == self.deferred_default() {
            Ok(None)
        } else {
            Ok(Some(value))
        }
    }

    /// `standardGeneric(name)` evaluated in `env`.
    pub fn standard_generic(&mut self, name: &str, env: ObjectRef) -> EvalResult {
        let Some(fdef) = self.contexts.function_with_env(env).map(|ctx| ctx.callfun)
        else {
            return Err(RuntimeError::NotFromGeneric {
                name: name.to_owned(),
            });
        };
        let hook = match self.hooks.standard_generic {
            Some(hook) => hook,
            None => {
                self.warn(
                    "'standardGeneric' called without 'methods' dispatch enabled (will be ignored)",
                );
                self.hooks.standard_generic = Some(dispatch_non_generic);
                dispatch_non_generic
            }
        };
        hook(self, name, env, fdef)
    }
}

/// Fallback standard-generic hook: calls the nearest non-generic function
/// named `name` above the generic with the generic's own arguments.
pub fn dispatch_non_generic(
    interp: &mut Interpreter,
    name: &str,
    env: ObjectRef,
    _fdef: ObjectRef,
) -> EvalResult {
    let sym = interp.symbols.intern(name);
    let dot_generic = interp.syms.dot_generic;

    let mut cursor = interp.environment(env).parent;
    let mut found = None;
    while let Some(current) = cursor {
        let (binding, parent) = {
            let frame_env = interp.environment(current);
            (frame_env.frame.binding(sym), frame_env.parent)
        };
        if let Some(binding) = binding {
            let value = interp.binding_value(binding)?;
            let non_generic = value.filter(|&fun| match interp.object(fun) {
                Object::Closure(closure) => !interp
                    .environment(closure.env)
                    .frame
                    .contains(dot_generic),
                _ => false,
            });
            if non_generic.is_some() {
                found = non_generic;
                break;
            }
        }
        cursor = parent;
    }

    let Some(fun) = found else {
        return Err(RuntimeError::NoNonGeneric {
            name: name.to_owned(),
        });
    };
    let Some(ctx) = interp.contexts.function_with_env(env) else {
        return Err(RuntimeError::NotFromGeneric {
            name: name.to_owned(),
        });
    };
    let call = Rc::new(ctx.call.with_head(sym));
    let promargs = ctx.promargs.clone();
    let sysparent = ctx.sysparent;
    interp.apply_function(&call, fun, promargs, sysparent, &[])
}
