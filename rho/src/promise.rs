use std::rc::Rc;

use crate::{EvalResult, Expr, Interpreter, Object, ObjectRef, RuntimeError, Symbol};

#[derive(Debug, Clone)]
pub enum PromiseState {
    Pending { expr: Rc<Expr>, env: ObjectRef },
    UnderEvaluation { expr: Rc<Expr>, env: ObjectRef },
    /// The environment is dropped once forced so it can be collected.
    Forced { expr: Rc<Expr>, value: ObjectRef },
}

/// A deferred, at-most-once evaluated argument.
#[derive(Debug, Clone)]
pub struct Promise {
    pub state: PromiseState,
}

impl Promise {
    pub fn new(expr: Rc<Expr>, env: ObjectRef) -> Self {
        Self {
            state: PromiseState::Pending { expr, env },
        }
    }

    /// A promise whose value is already known, used when arguments were
    /// evaluated before dispatch.
    pub fn forced(expr: Rc<Expr>, value: ObjectRef) -> Self {
        Self {
            state: PromiseState::Forced { expr, value },
        }
    }

    pub fn expr(&self) -> &Rc<Expr> {
        match &self.state {
            PromiseState::Pending { expr, .. }
            | PromiseState::UnderEvaluation { expr, .. }
            | PromiseState::Forced { expr, .. } => expr,
        }
    }

    pub fn value(&self) -> Option<ObjectRef> {
        match self.state {
            PromiseState::Forced { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self.state, PromiseState::Forced { .. })
    }

    /// `(sym, env)` when this is an unforced promise of a bare symbol.
    pub(crate) fn pending_symbol(&self) -> Option<(Symbol, ObjectRef)> {
        match &self.state {
            PromiseState::Pending { expr, env }
            | PromiseState::UnderEvaluation { expr, env } => match **expr {
                Expr::Symbol(sym) => Some((sym, *env)),
                _ => None,
            },
            PromiseState::Forced { .. } => None,
        }
    }
}

impl Interpreter {
    pub fn promise(&self, r: ObjectRef) -> &Promise {
        match self.object(r) {
            Object::Promise(promise) => promise,
            other => panic!("expected promise, got {}", other.type_name()),
        }
    }

    fn promise_mut(&mut self, r: ObjectRef) -> &mut Promise {
        match &mut self.heap_mut(r).object {
            Object::Promise(promise) => promise,
            other => panic!("expected promise, got {}", other.type_name()),
        }
    }

    pub fn alloc_promise(&mut self, expr: Rc<Expr>, env: ObjectRef) -> ObjectRef {
        self.alloc_object(Object::Promise(Promise::new(expr, env)))
    }

    /// Forces `promise`: the cached value if already forced, otherwise the
    /// held expression evaluated in the held environment.
    ///
    /// A failed evaluation leaves the promise pending so that it can be
    /// forced again.
    pub fn force(&mut self, promise: ObjectRef) -> EvalResult {
        let (expr, env) = match &self.promise(promise).state {
            PromiseState::Forced { value, .. } => return Ok(*value),
            PromiseState::UnderEvaluation { .. } => {
                return Err(RuntimeError::RecursivePromise);
            }
            PromiseState::Pending { expr, env } => (expr.clone(), *env),
        };

        self.promise_mut(promise).state = PromiseState::UnderEvaluation {
            expr: expr.clone(),
            env,
        };

        let mark = self.root_depth();
        self.protect(promise);
        let result = self.eval(&expr, env);
        self.release_roots(mark);

        self.promise_mut(promise).state = match result {
            Ok(value) => PromiseState::Forced { expr, value },
            Err(_) => PromiseState::Pending { expr, env },
        };
        result
    }

    /// Forces `value` if it is a promise, otherwise returns it unchanged.
    pub fn force_value(&mut self, value: ObjectRef) -> EvalResult {
        match self.object(value) {
            Object::Promise(_) => self.force(value),
            _ => Ok(value),
        }
    }
}
