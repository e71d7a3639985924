use std::rc::Rc;

use crate::{ArgList, Expr, ObjectRef, Visitable, Visitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// A closure invocation.
    Function,
    /// Pushed by internal dispatch so that methods see a caller context.
    Internal,
}

#[derive(Debug, Clone)]
pub struct CallContext {
    pub kind: ContextKind,
    pub call: Rc<Expr>,
    pub callfun: ObjectRef,
    /// The caller's environment.
    pub sysparent: ObjectRef,
    /// The callee's working environment, set once it is allocated.
    pub cloenv: Option<ObjectRef>,
    pub promargs: ArgList,
    /// Root stack depth at entry, restored on exit.
    pub root_depth: usize,
}

/// Active invocations, innermost last.
#[derive(Debug, Default)]
pub struct ContextStack(Vec<CallContext>);

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, context: CallContext) {
        self.0.push(context);
    }

    pub fn pop(&mut self) -> CallContext {
        self.0.pop().expect("context stack underflow")
    }

    pub fn innermost(&self) -> Option<&CallContext> {
        self.0.last()
    }

    pub fn innermost_mut(&mut self) -> Option<&mut CallContext> {
        self.0.last_mut()
    }

    /// Innermost first.
    pub fn iter(&self) -> impl Iterator<Item = &CallContext> {
        self.0.iter().rev()
    }

    /// The innermost closure context working in `env`.
    pub fn function_with_env(&self, env: ObjectRef) -> Option<&CallContext> {
        self.iter().find(|ctx| {
            ctx.kind == ContextKind::Function && ctx.cloenv == Some(env)
        })
    }
}

impl Visitable for CallContext {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        visitor.visit(self.callfun);
        visitor.visit(self.sysparent);
        if let Some(env) = self.cloenv {
            visitor.visit(env);
        }
        self.promargs.0.visit_edges(visitor);
    }
}

impl Visitable for ContextStack {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        self.0.iter().for_each(|ctx| ctx.visit_edges(visitor));
    }
}
