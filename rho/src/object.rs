use std::{fmt, mem, rc::Rc};

use crate::{Arg, Environment, Expr, Formal, Promise, Symbol};

const GENERATION_BITS: u32 = 24;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;

/// A stable reference to a heap cell.
///
/// Packed `{ index: u32, generation: u24, size class: u8 }`. The generation
/// is bumped each time the cell is reclaimed, so a reference that outlived
/// its object is detected instead of silently aliasing a new one.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectRef(u64);

impl ObjectRef {
    pub(crate) fn from_parts(
        class: SizeClass,
        index: u32,
        generation: u32,
    ) -> Self {
        let generation = (generation & GENERATION_MASK) as u64;
        Self(index as u64 | (generation << 32) | ((class.0 as u64) << 56))
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub fn generation(self) -> u32 {
        ((self.0 >> 32) as u32) & GENERATION_MASK
    }

    #[inline]
    pub fn size_class(self) -> SizeClass {
        SizeClass((self.0 >> 56) as u8)
    }

    pub(crate) fn next_generation(generation: u32) -> u32 {
        generation.wrapping_add(1) & GENERATION_MASK
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("class", &self.size_class().0)
            .field("index", &self.index())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Index of an arena pool; pools are ordered by cell size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SizeClass(pub u8);

/// Builtins are referenced by their position in the builtin table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(pub usize);

#[derive(Debug, Clone)]
pub struct Closure {
    pub formals: Rc<[Formal]>,
    pub body: Rc<Expr>,
    pub env: ObjectRef,
}

#[derive(Debug, Clone)]
pub enum Object {
    Null,
    Logical(Vec<bool>),
    Integer(Vec<i64>),
    Double(Vec<f64>),
    Character(Vec<String>),
    List(Vec<ObjectRef>),
    Symbol(Symbol),
    Closure(Closure),
    Builtin(Opcode),
    Environment(Environment),
    Promise(Promise),
    /// The value bound to `...`.
    Dots(Vec<Arg>),
    Language(Rc<Expr>),
}

/// A heap cell payload: the object plus its attribute list.
#[derive(Debug, Clone)]
pub struct HeapObject {
    pub attributes: Vec<(Symbol, ObjectRef)>,
    pub object: Object,
}

const HEADER_SIZE: usize = 16;
const REF_SIZE: usize = mem::size_of::<u64>();

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "NULL",
            Object::Logical(_) => "logical",
            Object::Integer(_) => "integer",
            Object::Double(_) => "double",
            Object::Character(_) => "character",
            Object::List(_) => "list",
            Object::Symbol(_) => "symbol",
            Object::Closure(_) => "closure",
            Object::Builtin(_) => "builtin",
            Object::Environment(_) => "environment",
            Object::Promise(_) => "promise",
            Object::Dots(_) => "...",
            Object::Language(_) => "language",
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Object::Closure(_) | Object::Builtin(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Object::Null => 0,
            Object::Logical(v) => v.len(),
            Object::Integer(v) => v.len(),
            Object::Double(v) => v.len(),
            Object::Character(v) => v.len(),
            Object::List(v) => v.len(),
            Object::Dots(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload bytes, used to pick the size class.
    fn payload_size(&self) -> usize {
        match self {
            Object::Null | Object::Symbol(_) | Object::Builtin(_) => 0,
            Object::Logical(v) => v.len(),
            Object::Integer(v) => v.len() * mem::size_of::<i64>(),
            Object::Double(v) => v.len() * mem::size_of::<f64>(),
            Object::Character(v) => v
                .iter()
                .map(|s| REF_SIZE + s.len())
                .sum(),
            Object::List(v) => v.len() * REF_SIZE,
            Object::Dots(v) => v.len() * 2 * REF_SIZE,
            Object::Closure(_) => 3 * REF_SIZE,
            Object::Environment(env) => (1 + 2 * env.frame.len()) * REF_SIZE,
            Object::Promise(_) => 3 * REF_SIZE,
            Object::Language(_) => REF_SIZE,
        }
    }
}

impl HeapObject {
    pub fn new(object: Object) -> Self {
        Self {
            attributes: Vec::new(),
            object,
        }
    }

    pub fn with_attributes(
        object: Object,
        attributes: Vec<(Symbol, ObjectRef)>,
    ) -> Self {
        Self { attributes, object }
    }

    pub fn attribute(&self, name: Symbol) -> Option<ObjectRef> {
        self.attributes
            .iter()
            .find(|(sym, _)| *sym == name)
            .map(|&(_, value)| value)
    }

    pub fn set_attribute(&mut self, name: Symbol, value: Option<ObjectRef>) {
        let existing = self.attributes.iter().position(|(sym, _)| *sym == name);
        match (existing, value) {
            (Some(idx), Some(value)) => self.attributes[idx].1 = value,
            (Some(idx), None) => {
                self.attributes.remove(idx);
            }
            (None, Some(value)) => self.attributes.push((name, value)),
            (None, None) => (),
        }
    }

    pub fn estimated_size(&self) -> usize {
        HEADER_SIZE
            + self.attributes.len() * 2 * REF_SIZE
            + self.object.payload_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_reference_round_trips_parts() {
        let r = ObjectRef::from_parts(SizeClass(3), 70_000, 42);
        assert_eq!(r.size_class(), SizeClass(3));
        assert_eq!(r.index(), 70_000);
        assert_eq!(r.generation(), 42);
    }

    #[test]
    fn generation_wraps_within_its_bits() {
        let last = GENERATION_MASK;
        assert_eq!(ObjectRef::next_generation(last), 0);
        let r = ObjectRef::from_parts(SizeClass(0), 1, last);
        assert_eq!(r.generation(), last);
    }

    #[test]
    fn attributes_can_be_replaced_and_removed() {
        let table = crate::SymbolTable::new();
        let class = table.intern("class");
        let a = ObjectRef::from_parts(SizeClass(0), 1, 0);
        let b = ObjectRef::from_parts(SizeClass(0), 2, 0);
        let mut obj = HeapObject::new(Object::Null);
        obj.set_attribute(class, Some(a));
        obj.set_attribute(class, Some(b));
        assert_eq!(obj.attribute(class), Some(b));
        obj.set_attribute(class, None);
        assert_eq!(obj.attribute(class), None);
        assert!(obj.attributes.is_empty());
    }
}
