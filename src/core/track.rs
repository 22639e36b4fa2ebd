use super::{evaluate, Flags, Globals, NodeKey, Value};

/// Tracked read of a source or derived.
///
/// Registers an edge with the innermost running reaction (unless tracking is
/// off or the reaction opted out), prefers the active fork's overlay, and
/// refreshes a stale memo before handing its value out.
pub(crate) fn read_erased(key: NodeKey) -> Value {
    Globals::with(|g| {
        if !g.tracking {
            return;
        }
        let Some(reader) = g.current_reaction() else {
            return;
        };
        if reader == key || g.node(reader).flags.contains(Flags::ROOT) {
            return;
        }
        let deps = g.node_mut(reader).deps_mut();
        if !deps.contains(&key) {
            deps.push(key);
        }
        let reactions = g.node_mut(key).reactions_mut();
        if !reactions.contains(&reader) {
            reactions.push(reader);
        }
    });

    if let Some(value) = overlay(key) {
        return value;
    }

    let stale = Globals::with(|g| {
        let node = g.node(key);
        node.is_derived() && node.flags.intersects(Flags::UNINITIALIZED | Flags::MAYBE_DIRTY)
    });
    if stale {
        evaluate::update_derived(key);
        // A refresh under an active fork lands in the overlay, not the node.
        if let Some(value) = overlay(key) {
            return value;
        }
    }

    Globals::with(|g| g.node(key).value().expect("memo produced no value"))
}

/// Untracked view of the effective current value: the fork overlay if one is
/// active, the node's value otherwise. Never recomputes; `None` once the
/// node is gone or before a memo's first evaluation.
pub(crate) fn peek_erased(key: NodeKey) -> Option<Value> {
    Globals::with(|g| {
        if let Some(fork) = &g.active_fork {
            if let Some(value) = fork.get(key) {
                return Some(value);
            }
        }
        g.nodes.get(key.0).and_then(|n| n.value())
    })
}

fn overlay(key: NodeKey) -> Option<Value> {
    Globals::with(|g| g.active_fork.as_ref().and_then(|f| f.get(key)))
}
