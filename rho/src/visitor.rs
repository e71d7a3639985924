use crate::{
    Arg, Binding, Environment, HeapObject, Object, ObjectRef, Promise,
    PromiseState,
};

pub trait Visitor {
    fn visit(&mut self, value: ObjectRef);
}

impl<F: FnMut(ObjectRef)> Visitor for F {
    #[inline]
    fn visit(&mut self, value: ObjectRef) {
        self(value)
    }
}

/// Visiting an object means visiting only its direct edges; the tracer
/// decides whether to follow them.
pub trait Visitable {
    fn visit_edges(&self, visitor: &mut impl Visitor);
}

impl Visitable for HeapObject {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        self.attributes
            .iter()
            .for_each(|&(_, value)| visitor.visit(value));
        self.object.visit_edges(visitor);
    }
}

impl Visitable for Object {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        match self {
            Object::Null
            | Object::Logical(_)
            | Object::Integer(_)
            | Object::Double(_)
            | Object::Character(_)
            | Object::Symbol(_)
            | Object::Builtin(_)
            | Object::Language(_) => (),
            Object::List(items) => {
                items.iter().for_each(|&item| visitor.visit(item))
            }
            Object::Closure(closure) => visitor.visit(closure.env),
            Object::Environment(env) => env.visit_edges(visitor),
            Object::Promise(promise) => promise.visit_edges(visitor),
            Object::Dots(args) => args.visit_edges(visitor),
        }
    }
}

impl Visitable for Environment {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        if let Some(parent) = self.parent {
            visitor.visit(parent);
        }
        self.frame
            .bindings()
            .for_each(|(_, binding)| binding.visit_edges(visitor));
    }
}

impl Visitable for Binding {
    #[inline]
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        if let Some(value) = self.value {
            visitor.visit(value);
        }
    }
}

impl Visitable for Promise {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        match &self.state {
            PromiseState::Pending { env, .. }
            | PromiseState::UnderEvaluation { env, .. } => visitor.visit(*env),
            PromiseState::Forced { value, .. } => visitor.visit(*value),
        }
    }
}

impl Visitable for [Arg] {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        self.iter()
            .filter_map(|arg| arg.value)
            .for_each(|value| visitor.visit(value));
    }
}
