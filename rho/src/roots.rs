use crate::{ObjectRef, Visitable, Visitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RootEntry {
    object: ObjectRef,
    context: usize,
    serial: u64,
}

/// Handle to a protected slot, valid until the slot is popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootToken {
    slot: usize,
    serial: u64,
}

/// LIFO stack of references kept alive across collections.
///
/// Every entry remembers the context depth that pushed it; only that
/// context may pop it. Violations are logic faults and panic.
#[derive(Debug, Default)]
pub struct RootStack {
    entries: Vec<RootEntry>,
    next_serial: u64,
    /// Long-lived host references, released individually.
    precious: Vec<ObjectRef>,
}

impl RootStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn protect(&mut self, object: ObjectRef, context: usize) -> RootToken {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.entries.push(RootEntry {
            object,
            context,
            serial,
        });
        RootToken {
            slot: self.entries.len() - 1,
            serial,
        }
    }

    /// Pops `count` entries, all of which must belong to `context`.
    pub fn unprotect(&mut self, count: usize, context: usize) {
        assert!(
            count <= self.entries.len(),
            "unprotect({count}) underflows a root stack of depth {}",
            self.entries.len()
        );
        let start = self.entries.len() - count;
        if let Some(foreign) =
            self.entries[start..].iter().find(|e| e.context != context)
        {
            panic!(
                "unprotect from context {context} would pop a root of context {}",
                foreign.context
            );
        }
        self.entries.truncate(start);
    }

    /// Replaces the object in a protected slot without changing the depth.
    pub fn reprotect(&mut self, token: RootToken, object: ObjectRef) {
        match self.entries.get_mut(token.slot) {
            Some(entry) if entry.serial == token.serial => {
                entry.object = object;
            }
            _ => panic!("reprotect with a stale root token {token:?}"),
        }
    }

    /// Removes the topmost entry for `object`, the one sanctioned
    /// exception to LIFO order.
    pub fn find_and_remove(&mut self, object: ObjectRef) {
        let Some(idx) = self.entries.iter().rposition(|e| e.object == object)
        else {
            panic!("find_and_remove: {object:?} is not protected");
        };
        self.entries.remove(idx);
    }

    /// Drops every entry above `depth`, regardless of owner. Context exit
    /// uses this on every path.
    pub fn truncate(&mut self, depth: usize) {
        assert!(
            depth <= self.entries.len(),
            "root stack truncated to {depth} above its depth {}",
            self.entries.len()
        );
        self.entries.truncate(depth);
    }

    pub fn preserve_object(&mut self, object: ObjectRef) {
        self.precious.push(object);
    }

    pub fn release_object(&mut self, object: ObjectRef) {
        if let Some(idx) = self.precious.iter().rposition(|&r| r == object) {
            self.precious.swap_remove(idx);
        }
    }

    pub fn is_protected(&self, object: ObjectRef) -> bool {
        self.entries.iter().any(|e| e.object == object)
            || self.precious.contains(&object)
    }
}

impl Visitable for RootStack {
    fn visit_edges(&self, visitor: &mut impl Visitor) {
        self.entries.iter().for_each(|e| visitor.visit(e.object));
        self.precious.iter().for_each(|&r| visitor.visit(r));
    }
}
