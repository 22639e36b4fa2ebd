//! Runtime internals: the node store, the reaction stack, the pending-effect
//! queue, and the fork overlays.
//!
//! All of it is process-scoped, single-threaded state behind a
//! `thread_local!`. Public handles index into the node store and go through
//! the free functions of the submodules; user closures are never invoked
//! while the global cell is borrowed.

use std::{
    cell::RefCell,
    collections::VecDeque,
    marker::PhantomData,
    mem::replace,
    rc::Rc,
    thread::AccessError,
};

use derive_ex::derive_ex;
use parse_display::Display;
use slabmap::SlabMap;

mod evaluate;
mod fork_map;
mod node;
mod propagate;
mod scope;
mod track;

pub(crate) use fork_map::ForkMap;
pub(crate) use node::{
    create_derived, create_source, DerivedFn, EffectFn, Flags, Node, NodeKey, NodeKind, Teardown,
    Value,
};
pub(crate) use propagate::set_erased;
pub(crate) use scope::{create_effect, destroy_effect, register_cleanup, run_effect_body};
pub(crate) use track::{peek_erased, read_erased};

#[cfg(test)]
mod tests;

thread_local! {
    static GLOBALS: RefCell<Globals> = RefCell::new(Globals::new());
}

pub(crate) struct Globals {
    pub nodes: SlabMap<Node>,
    /// Currently running reactions, innermost last. `None` entries are
    /// sentinels that disable tracking (teardown runs under one).
    pub stack: Vec<Option<NodeKey>>,
    pub tracking: bool,
    /// Effects waiting for the next flush, in schedule order.
    pub queue: VecDeque<NodeKey>,
    /// Reads prefer this overlay; writes land in it.
    pub active_fork: Option<ForkMap>,
    /// A commit in progress; suppresses re-deriving values the commit
    /// already supplies.
    pub applying_fork: Option<ForkMap>,
    pub next_root_index: u64,
    is_runtime_exists: bool,
}

impl Globals {
    fn new() -> Self {
        Self {
            nodes: SlabMap::new(),
            stack: Vec::new(),
            tracking: true,
            queue: VecDeque::new(),
            active_fork: None,
            applying_fork: None,
            next_root_index: 0,
            is_runtime_exists: false,
        }
    }

    pub fn with<T>(f: impl FnOnce(&mut Self) -> T) -> T {
        GLOBALS.with(|g| f(&mut g.borrow_mut()))
    }
    pub fn try_with<T>(f: impl FnOnce(&mut Self) -> T) -> Result<T, AccessError> {
        GLOBALS.try_with(|g| f(&mut g.borrow_mut()))
    }

    pub fn assert_runtime(&self) {
        if !self.is_runtime_exists {
            panic!("`Runtime` is not created.");
        }
    }

    pub fn node(&self, key: NodeKey) -> &Node {
        self.nodes
            .get(key.0)
            .expect("reactive node used after its `Runtime` was dropped")
    }
    pub fn node_mut(&mut self, key: NodeKey) -> &mut Node {
        self.nodes
            .get_mut(key.0)
            .expect("reactive node used after its `Runtime` was dropped")
    }

    /// Innermost running reaction, skipping nothing: a sentinel on top means
    /// "no reaction".
    pub fn current_reaction(&self) -> Option<NodeKey> {
        self.stack.last().copied().flatten()
    }
}

/// Runs `f` without registering dependencies. Reads still see current
/// values.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _guard = TrackingGuard::set(false);
    f()
}

pub(crate) struct TrackingGuard {
    prev: bool,
}
impl TrackingGuard {
    pub fn set(tracking: bool) -> Self {
        let prev = Globals::with(|g| replace(&mut g.tracking, tracking));
        Self { prev }
    }
}
impl Drop for TrackingGuard {
    fn drop(&mut self) {
        let _ = Globals::try_with(|g| g.tracking = self.prev);
    }
}

/// Pushes a reaction-stack entry and forces tracking on (the per-node `ROOT`
/// flag and `None` sentinels opt out at the read site). Restores both on
/// drop so a panicking user closure leaves the stack balanced.
pub(crate) struct ReactionGuard {
    prev_tracking: bool,
}
impl ReactionGuard {
    pub fn push(entry: Option<NodeKey>) -> Self {
        let prev_tracking = Globals::with(|g| {
            g.stack.push(entry);
            replace(&mut g.tracking, true)
        });
        Self { prev_tracking }
    }
}
impl Drop for ReactionGuard {
    fn drop(&mut self) {
        let _ = Globals::try_with(|g| {
            g.stack.pop();
            g.tracking = self.prev_tracking;
        });
    }
}

/// Raised by a write performed while the innermost running reaction is a
/// memo. Memo bodies must stay pure.
#[non_exhaustive]
#[derive(Display, Debug)]
#[display("cannot write to a signal while a derived value is computing")]
pub struct UnsafeMutation {}

impl std::error::Error for UnsafeMutation {}

/// Owner of the thread's reactive state.
///
/// Only one `Runtime` can exist on a thread at a time; dropping it tears the
/// whole graph down. Writes only mark and enqueue — [`flush`](Runtime::flush)
/// is the deferred boundary where pending effects actually run.
#[derive_ex(Default)]
#[default(Self::new())]
pub struct Runtime {
    _not_send: PhantomData<Rc<()>>,
}

impl Runtime {
    pub fn new() -> Self {
        Globals::with(|g| {
            if replace(&mut g.is_runtime_exists, true) {
                panic!("Only one `Runtime` can exist in the same thread at the same time.");
            }
        });
        Self {
            _not_send: PhantomData,
        }
    }

    /// Drains the pending-effect queue.
    ///
    /// Each queued effect has its previous cleanups and children torn down,
    /// then re-runs, re-collecting dependencies. Effects enqueued by writes
    /// performed inside a running effect are drained in the same pass. Each
    /// effect dirtied by a batch of writes runs exactly once per flush.
    pub fn flush(&mut self) {
        loop {
            let Some(key) = Globals::with(|g| g.queue.pop_front()) else {
                break;
            };
            let body = Globals::with(|g| {
                let Some(node) = g.nodes.get_mut(key.0) else {
                    return None;
                };
                node.flags.remove(Flags::DIRTY);
                match &node.kind {
                    NodeKind::Effect(e) => e.body.clone(),
                    _ => None,
                }
            });
            let Some(body) = body else {
                // Torn down while queued; reclaim the slot kept alive for
                // this encounter.
                Globals::with(|g| {
                    if g.nodes.get(key.0).is_some_and(|n| n.is_effect()) {
                        let _ = g.nodes.remove(key.0);
                    }
                });
                continue;
            };
            scope::prepare_rerun(key);
            run_effect_body(key, body);
        }
    }

    /// True if a write has enqueued effects that a [`flush`](Runtime::flush)
    /// would run.
    pub fn has_pending(&self) -> bool {
        Globals::with(|g| !g.queue.is_empty())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let _ = Globals::try_with(|g| *g = Globals::new());
    }
}
