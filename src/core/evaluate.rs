use std::{mem::take, panic::resume_unwind};

use super::{scope, Flags, Globals, NodeKey, ReactionGuard, Value};

/// Re-runs a memo's producer and stores the result if it changed by
/// same-value comparison. Returns whether the stored value changed.
///
/// The previous run's child effects are torn down and its dependency edges
/// dropped before the producer re-runs and re-registers what it still reads.
/// If the producer panics, nothing is stored: the previous value and the
/// staleness bits stay, and the panic propagates to the reader.
pub(crate) fn update_derived(key: NodeKey) -> bool {
    let children = Globals::with(|g| take(&mut g.node_mut(key).as_derived_mut().child_effects));
    if !children.is_empty() {
        let mut first_panic = None;
        for child in children {
            scope::destroy_effect_collect(child, &mut first_panic);
        }
        if let Some(payload) = first_panic {
            resume_unwind(payload);
        }
    }

    Globals::with(|g| {
        let deps = take(&mut g.node_mut(key).as_derived_mut().deps);
        for dep in deps {
            if let Some(node) = g.nodes.get_mut(dep.0) {
                node.reactions_mut().retain(|r| *r != key);
            }
        }
    });

    let (producer, same, prev, was_uninit) = Globals::with(|g| {
        let overlay = g.active_fork.as_ref().and_then(|f| f.get(key));
        let node = g.node(key);
        let d = node.as_derived();
        (
            d.producer.clone(),
            d.same,
            overlay.or_else(|| d.value.clone()),
            node.flags.contains(Flags::UNINITIALIZED),
        )
    });

    let new_value: Value = {
        let _guard = ReactionGuard::push(Some(key));
        let mut producer = producer
            .try_borrow_mut()
            .unwrap_or_else(|_| panic!("detect cyclic dependency"));
        (&mut *producer)()
    };

    // Comparison runs outside the global borrow: it is user code.
    let changed = was_uninit || !prev.as_ref().is_some_and(|p| same(&**p, &*new_value));

    Globals::with(|g| {
        if g.active_fork.is_some() {
            if changed {
                // The speculative result shadows the node; the node itself
                // stays stale so post-fork reads recompute from the graph.
                g.active_fork.as_mut().unwrap().insert(key, new_value);
            }
        } else {
            let node = g.node_mut(key);
            if changed {
                node.as_derived_mut().value = Some(new_value);
            }
            node.flags
                .remove(Flags::DIRTY | Flags::MAYBE_DIRTY | Flags::UNINITIALIZED);
        }
    });
    changed
}
