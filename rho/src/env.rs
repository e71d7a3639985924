use std::collections::HashMap;

use crate::{
    Arena, EvalResult, Interpreter, Object, ObjectRef, RuntimeError, Symbol,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingOrigin {
    Unbound,
    /// A formal with no matching actual. The value slot may hold the
    /// promise of the formal's default expression.
    Missing,
    Bound,
    Promise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub origin: BindingOrigin,
    pub value: Option<ObjectRef>,
}

impl Binding {
    pub const UNBOUND: Binding = Binding {
        origin: BindingOrigin::Unbound,
        value: None,
    };

    pub fn bound(value: ObjectRef) -> Self {
        Self {
            origin: BindingOrigin::Bound,
            value: Some(value),
        }
    }

    pub fn promise(promise: ObjectRef) -> Self {
        Self {
            origin: BindingOrigin::Promise,
            value: Some(promise),
        }
    }

    pub fn missing(default: Option<ObjectRef>) -> Self {
        Self {
            origin: BindingOrigin::Missing,
            value: default,
        }
    }

    #[inline]
    pub fn is_unbound(&self) -> bool {
        self.origin == BindingOrigin::Unbound
    }
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    bindings: HashMap<Symbol, Binding, ahash::RandomState>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites `symbol` with origin `Bound`.
    pub fn bind(&mut self, symbol: Symbol, value: ObjectRef) {
        self.bindings.insert(symbol, Binding::bound(value));
    }

    pub fn bind_binding(&mut self, symbol: Symbol, binding: Binding) {
        self.bindings.insert(symbol, binding);
    }

    /// Local lookup only.
    pub fn binding(&self, symbol: Symbol) -> Option<Binding> {
        self.bindings.get(&symbol).copied()
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.bindings.contains_key(&symbol)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (Symbol, &Binding)> {
        self.bindings.iter().map(|(&sym, binding)| (sym, binding))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Environment {
    pub parent: Option<ObjectRef>,
    pub frame: Frame,
}

impl Environment {
    pub fn new(parent: Option<ObjectRef>) -> Self {
        Self {
            parent,
            frame: Frame::new(),
        }
    }

    /// Walks the enclosing chain starting at `self`.
    pub fn find(&self, symbol: Symbol, arena: &Arena) -> Binding {
        if let Some(binding) = self.frame.binding(symbol) {
            return binding;
        }
        let mut cursor = self.parent;
        while let Some(env) = cursor {
            let Some(Object::Environment(env)) =
                arena.get(env).map(|obj| &obj.object)
            else {
                panic!("enclosing reference {env:?} is not an environment");
            };
            if let Some(binding) = env.frame.binding(symbol) {
                return binding;
            }
            cursor = env.parent;
        }
        Binding::UNBOUND
    }
}

impl Interpreter {
    pub fn environment(&self, env: ObjectRef) -> &Environment {
        match self.object(env) {
            Object::Environment(env) => env,
            other => panic!("expected environment, got {}", other.type_name()),
        }
    }

    pub fn environment_mut(&mut self, env: ObjectRef) -> &mut Environment {
        match &mut self.heap_mut(env).object {
            Object::Environment(env) => env,
            other => panic!("expected environment, got {}", other.type_name()),
        }
    }

    pub fn alloc_env(&mut self, parent: Option<ObjectRef>) -> ObjectRef {
        self.alloc_object(Object::Environment(Environment::new(parent)))
    }

    pub fn find_var(&self, symbol: Symbol, env: ObjectRef) -> Binding {
        self.environment(env).find(symbol, &self.arena)
    }

    /// Defines `symbol` in the frame of `env`.
    pub fn define_var(&mut self, env: ObjectRef, symbol: Symbol, value: ObjectRef) {
        self.environment_mut(env).frame.bind(symbol, value);
    }

    /// Super-assignment: overwrites the nearest binding above `env`, or
    /// defines the variable globally.
    pub fn set_var(&mut self, env: ObjectRef, symbol: Symbol, value: ObjectRef) {
        let mut cursor = self.environment(env).parent;
        while let Some(current) = cursor {
            let frame_env = self.environment_mut(current);
            if frame_env.frame.contains(symbol) {
                frame_env.frame.bind(symbol, value);
                return;
            }
            cursor = frame_env.parent;
        }
        let global = self.global_env();
        self.define_var(global, symbol, value);
    }

    /// The value a binding stands for, forcing promises.
    ///
    /// Missing bindings without a default yield `None`.
    pub fn binding_value(
        &mut self,
        binding: Binding,
    ) -> Result<Option<ObjectRef>, RuntimeError> {
        match (binding.origin, binding.value) {
            (BindingOrigin::Unbound, _) | (BindingOrigin::Missing, None) => {
                Ok(None)
            }
            (BindingOrigin::Bound, value) => Ok(value),
            (BindingOrigin::Promise | BindingOrigin::Missing, Some(promise)) => {
                self.force(promise).map(Some)
            }
            (BindingOrigin::Promise, None) => {
                unreachable!("promise binding without a promise")
            }
        }
    }

    pub fn get_var(&mut self, symbol: Symbol, env: ObjectRef) -> EvalResult {
        let binding = self.find_var(symbol, env);
        match binding.origin {
            BindingOrigin::Unbound => Err(RuntimeError::UnboundVariable {
                name: self.symbols.name(symbol).to_string(),
            }),
            BindingOrigin::Missing if binding.value.is_none() => {
                Err(RuntimeError::MissingArgument {
                    name: self.symbols.name(symbol).to_string(),
                })
            }
            _ => Ok(self
                .binding_value(binding)?
                .expect("bound variables have a value")),
        }
    }

    /// Function lookup skips bindings whose value is not a function.
    pub fn find_fun_opt(
        &mut self,
        symbol: Symbol,
        env: ObjectRef,
    ) -> Result<Option<ObjectRef>, RuntimeError> {
        let mut cursor = Some(env);
        while let Some(current) = cursor {
            let (binding, parent) = {
                let env = self.environment(current);
                (env.frame.binding(symbol), env.parent)
            };
            if let Some(binding) = binding {
                if let Some(value) = self.binding_value(binding)? {
                    if self.object(value).is_function() {
                        return Ok(Some(value));
                    }
                }
            }
            cursor = parent;
        }
        Ok(None)
    }

    pub fn find_fun(&mut self, symbol: Symbol, env: ObjectRef) -> EvalResult {
        self.find_fun_opt(symbol, env)?.ok_or_else(|| {
            RuntimeError::FunctionNotFound {
                name: self.symbols.name(symbol).to_string(),
            }
        })
    }

    /// `missing(sym)` evaluated in `env`: true for unmatched formals, and
    /// for promises whose expression is itself a missing argument.
    pub fn is_missing_arg(
        &self,
        symbol: Symbol,
        env: ObjectRef,
    ) -> Result<bool, RuntimeError> {
        let Some(binding) = self.environment(env).frame.binding(symbol) else {
            return Err(RuntimeError::InvalidArgument(
                "'missing' can only be used for arguments".into(),
            ));
        };
        Ok(self.binding_is_missing(binding))
    }

    fn binding_is_missing(&self, binding: Binding) -> bool {
        match binding.origin {
            BindingOrigin::Missing => true,
            BindingOrigin::Promise => {
                let Some(promise) = binding.value else {
                    return false;
                };
                let Some((sym, penv)) = self.promise(promise).pending_symbol()
                else {
                    return false;
                };
                self.environment(penv)
                    .frame
                    .binding(sym)
                    .is_some_and(|inner| self.binding_is_missing(inner))
            }
            BindingOrigin::Bound | BindingOrigin::Unbound => false,
        }
    }
}
