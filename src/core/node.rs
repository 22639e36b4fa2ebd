use std::{
    any::Any,
    cell::RefCell,
    ops::{BitOr, BitOrAssign},
    rc::Rc,
};

use crate::SameValue;

use super::Globals;

/// Type-erased value slot shared between the node store and fork overlays.
pub(crate) type Value = Rc<dyn Any>;

/// Monomorphized same-value comparator captured when a node is created.
pub(crate) type SameFn = fn(&dyn Any, &dyn Any) -> bool;

/// Memo body. Returns the freshly produced value.
pub(crate) type DerivedFn = Rc<RefCell<dyn FnMut() -> Value>>;

/// Effect body. May hand back a cleanup to run before the next re-execution.
pub(crate) type EffectFn = Rc<RefCell<dyn FnMut() -> Option<Teardown>>>;

pub(crate) type Teardown = Box<dyn FnOnce()>;

/// Key into the node store.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct NodeKey(pub(crate) usize);

/// Per-node state bits.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub(crate) struct Flags(u8);

impl Flags {
    pub const EMPTY: Flags = Flags(0);
    /// Queued for re-execution (effects) or being propagated through (sources).
    pub const DIRTY: Flags = Flags(1);
    /// A dependency may have changed; refresh before the value is trusted.
    pub const MAYBE_DIRTY: Flags = Flags(1 << 1);
    pub const DERIVED: Flags = Flags(1 << 2);
    /// The memo has never produced a value.
    pub const UNINITIALIZED: Flags = Flags(1 << 3);
    /// Reads inside this reaction do not register dependencies.
    pub const ROOT: Flags = Flags(1 << 4);
    /// Created outside the enclosing scope tree.
    pub const DISCONNECTED: Flags = Flags(1 << 5);

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
    pub fn intersects(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }
    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }
    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }
}

impl BitOr for Flags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Flags(self.0 | rhs.0)
    }
}
impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// A node in the dependency graph. The header (`flags`, `parent`) is shared
/// by all three variants; everything else lives in the variant payload.
pub(crate) struct Node {
    pub flags: Flags,
    pub parent: Option<NodeKey>,
    pub kind: NodeKind,
}

pub(crate) enum NodeKind {
    Source(SourceData),
    Derived(DerivedData),
    Effect(EffectData),
}

pub(crate) struct SourceData {
    pub value: Value,
    pub same: SameFn,
    /// Reactions that read this source, in first-read order.
    pub reactions: Vec<NodeKey>,
}

pub(crate) struct DerivedData {
    /// `None` until the first evaluation.
    pub value: Option<Value>,
    pub same: SameFn,
    pub reactions: Vec<NodeKey>,
    pub deps: Vec<NodeKey>,
    pub producer: DerivedFn,
    /// Effects created while the producer ran, torn down before each re-run.
    pub child_effects: Vec<NodeKey>,
}

pub(crate) struct EffectData {
    /// Cleared on teardown; a queued key whose body is gone is skipped.
    pub body: Option<EffectFn>,
    /// Cleanups registered during the last run, executed in order before the
    /// next run or on teardown.
    pub teardown: Vec<Teardown>,
    pub deps: Vec<NodeKey>,
    /// Sibling links under an effect parent.
    pub prev: Option<NodeKey>,
    pub next: Option<NodeKey>,
    /// Child list, ordered by creation.
    pub head: Option<NodeKey>,
    pub tail: Option<NodeKey>,
    /// Assigned only to parentless effects, monotonically at creation.
    pub root_index: Option<u64>,
}

impl Node {
    pub fn is_derived(&self) -> bool {
        matches!(self.kind, NodeKind::Derived(_))
    }
    pub fn is_effect(&self) -> bool {
        matches!(self.kind, NodeKind::Effect(_))
    }

    pub fn as_derived(&self) -> &DerivedData {
        match &self.kind {
            NodeKind::Derived(d) => d,
            _ => unreachable!("node is not a derived"),
        }
    }
    pub fn as_derived_mut(&mut self) -> &mut DerivedData {
        match &mut self.kind {
            NodeKind::Derived(d) => d,
            _ => unreachable!("node is not a derived"),
        }
    }
    pub fn as_effect(&self) -> &EffectData {
        match &self.kind {
            NodeKind::Effect(e) => e,
            _ => unreachable!("node is not an effect"),
        }
    }
    pub fn as_effect_mut(&mut self) -> &mut EffectData {
        match &mut self.kind {
            NodeKind::Effect(e) => e,
            _ => unreachable!("node is not an effect"),
        }
    }

    /// Comparator for the node's value. Effects hold no value.
    pub fn same_fn(&self) -> SameFn {
        match &self.kind {
            NodeKind::Source(s) => s.same,
            NodeKind::Derived(d) => d.same,
            NodeKind::Effect(_) => unreachable!("effects hold no value"),
        }
    }

    /// Current globally visible value, ignoring fork overlays.
    pub fn value(&self) -> Option<Value> {
        match &self.kind {
            NodeKind::Source(s) => Some(s.value.clone()),
            NodeKind::Derived(d) => d.value.clone(),
            NodeKind::Effect(_) => None,
        }
    }

    pub fn reactions(&self) -> &[NodeKey] {
        match &self.kind {
            NodeKind::Source(s) => &s.reactions,
            NodeKind::Derived(d) => &d.reactions,
            NodeKind::Effect(_) => &[],
        }
    }
    pub fn reactions_mut(&mut self) -> &mut Vec<NodeKey> {
        match &mut self.kind {
            NodeKind::Source(s) => &mut s.reactions,
            NodeKind::Derived(d) => &mut d.reactions,
            NodeKind::Effect(_) => unreachable!("effects have no readers"),
        }
    }
    pub fn deps_mut(&mut self) -> &mut Vec<NodeKey> {
        match &mut self.kind {
            NodeKind::Derived(d) => &mut d.deps,
            NodeKind::Effect(e) => &mut e.deps,
            NodeKind::Source(_) => unreachable!("sources have no deps"),
        }
    }
}

fn same_of<T: SameValue + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a.same_value(b),
        _ => false,
    }
}

pub(crate) fn create_source<T: SameValue + 'static>(value: T) -> NodeKey {
    Globals::with(|g| {
        g.assert_runtime();
        let key = g.nodes.insert(Node {
            flags: Flags::EMPTY,
            parent: None,
            kind: NodeKind::Source(SourceData {
                value: Rc::new(value),
                same: same_of::<T>,
                reactions: Vec::new(),
            }),
        });
        NodeKey(key)
    })
}

pub(crate) fn create_derived<T: SameValue + 'static>(producer: DerivedFn) -> NodeKey {
    Globals::with(|g| {
        g.assert_runtime();
        let parent = g.current_reaction();
        let key = g.nodes.insert(Node {
            flags: Flags::DERIVED | Flags::UNINITIALIZED,
            parent,
            kind: NodeKind::Derived(DerivedData {
                value: None,
                same: same_of::<T>,
                reactions: Vec::new(),
                deps: Vec::new(),
                producer,
                child_effects: Vec::new(),
            }),
        });
        NodeKey(key)
    })
}
