use std::collections::HashSet;

use super::{evaluate, Flags, Globals, NodeKey, NodeKind, UnsafeMutation, Value};

/// Write path. Stores `value` (into the active fork's overlay if one is
/// installed) and propagates dirtiness, unless the new value is
/// same-value-equal to the effective current one, in which case nothing
/// happens at all.
pub(crate) fn set_erased(key: NodeKey, value: Value) -> Result<(), UnsafeMutation> {
    let forbidden = Globals::with(|g| {
        g.assert_runtime();
        g.current_reaction()
            .is_some_and(|r| g.node(r).flags.contains(Flags::DERIVED))
    });
    if forbidden {
        return Err(UnsafeMutation {});
    }

    let (same, prior) = Globals::with(|g| {
        let overlay = g.active_fork.as_ref().and_then(|f| f.get(key));
        let node = g.node(key);
        (node.same_fn(), overlay.or_else(|| node.value()))
    });
    if prior.as_ref().is_some_and(|p| same(&**p, &*value)) {
        return Ok(());
    }

    Globals::with(|g| {
        if let Some(fork) = g.active_fork.as_mut() {
            fork.insert(key, value);
            return;
        }
        let node = g.node_mut(key);
        match &mut node.kind {
            NodeKind::Source(s) => s.value = value,
            NodeKind::Derived(d) => d.value = Some(value),
            NodeKind::Effect(_) => unreachable!("effects hold no value"),
        }
        if node.is_derived() {
            // A directly stored memo value is authoritative.
            node.flags
                .remove(Flags::MAYBE_DIRTY | Flags::UNINITIALIZED);
        }
    });

    mark_dirty(key);
    Ok(())
}

/// Walks the written node's reactions: memos with readers are recomputed
/// depth-first (recursing when their value changed), reader-less memos are
/// merely flagged stale, and live effects are filtered, ordered, and
/// enqueued for the next flush.
pub(crate) fn mark_dirty(key: NodeKey) {
    Globals::with(|g| g.node_mut(key).flags.insert(Flags::DIRTY));

    let (eager, candidates) = Globals::with(|g| {
        let reactions = g.node(key).reactions().to_vec();
        let fork_active = g.active_fork.is_some();
        let committing_key = g
            .applying_fork
            .as_ref()
            .is_some_and(|f| f.contains(key));
        let mut eager = Vec::new();
        let mut candidates = Vec::new();
        for r in reactions {
            let Some(node) = g.nodes.get(r.0) else {
                continue;
            };
            let is_derived = node.is_derived();
            let already_dirty = node.flags.contains(Flags::DIRTY);
            let lazy = is_derived && node.as_derived().reactions.is_empty();
            if is_derived {
                if committing_key
                    && g.applying_fork.as_ref().is_some_and(|f| f.contains(r))
                {
                    // The commit already carries this memo's next value.
                    continue;
                }
                g.node_mut(r).flags.insert(Flags::MAYBE_DIRTY);
                if !lazy {
                    eager.push(r);
                }
            } else {
                if fork_active {
                    // Speculative writes never run effects.
                    continue;
                }
                if !already_dirty {
                    candidates.push(r);
                }
            }
        }
        (eager, candidates)
    });

    for d in eager {
        // A sibling's propagation may have refreshed it in the meantime.
        let stale = Globals::with(|g| {
            g.nodes.get(d.0).is_some_and(|n| {
                n.flags
                    .intersects(Flags::DIRTY | Flags::MAYBE_DIRTY | Flags::UNINITIALIZED)
            })
        });
        if stale && evaluate::update_derived(d) {
            mark_dirty(d);
        }
    }

    if !candidates.is_empty() {
        let ordered = Globals::with(|g| {
            let kept = drop_shadowed(g, &candidates);
            sort_by_tree_order(g, kept)
        });
        Globals::with(|g| {
            for e in ordered {
                let Some(node) = g.nodes.get_mut(e.0) else {
                    continue;
                };
                let alive = matches!(&node.kind, NodeKind::Effect(eff) if eff.body.is_some());
                if alive && !node.flags.contains(Flags::DIRTY) {
                    node.flags.insert(Flags::DIRTY);
                    g.queue.push_back(e);
                }
            }
        });
    }

    // The bit is advisory on the written node; clear it eagerly so
    // subsequent independent writes re-enter.
    Globals::with(|g| {
        if let Some(node) = g.nodes.get_mut(key.0) {
            node.flags.remove(Flags::DIRTY);
        }
    });
}

/// Ancestor wins: a candidate whose (non-memo) ancestor is also scheduled is
/// dropped, since the ancestor's re-run recreates it. The walk stops at memo
/// boundaries; effects owned by a memo are independent units.
fn drop_shadowed(g: &Globals, candidates: &[NodeKey]) -> Vec<NodeKey> {
    let set: HashSet<NodeKey> = candidates.iter().copied().collect();
    candidates
        .iter()
        .copied()
        .filter(|&e| {
            let mut parent = g.node(e).parent;
            while let Some(p) = parent {
                let Some(node) = g.nodes.get(p.0) else {
                    break;
                };
                if node.is_derived() {
                    break;
                }
                if set.contains(&p) {
                    return false;
                }
                parent = node.parent;
            }
            true
        })
        .collect()
}

/// Orders effects by tree depth (roots first), then by document order in the
/// effect tree.
fn sort_by_tree_order(g: &Globals, keys: Vec<NodeKey>) -> Vec<NodeKey> {
    if keys.len() <= 1 {
        return keys;
    }
    let mut decorated: Vec<(usize, Vec<u64>, NodeKey)> = keys
        .into_iter()
        .map(|k| {
            let (depth, path) = tree_order_path(g, k);
            (depth, path, k)
        })
        .collect();
    decorated.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    decorated.into_iter().map(|(_, _, k)| k).collect()
}

/// Depth plus the root-first ordinal path used for document order. Top-level
/// effects order by their creation index; nodes that sit in no sibling
/// sequence fall back to their store key, which makes ordering across
/// disjoint trees stable but not meaningful.
fn tree_order_path(g: &Globals, key: NodeKey) -> (usize, Vec<u64>) {
    let mut chain = vec![key];
    let mut cursor = key;
    while let Some(p) = g.node(cursor).parent {
        chain.push(p);
        cursor = p;
    }
    chain.reverse();

    let top = chain[0];
    let mut path = Vec::with_capacity(chain.len());
    path.push(match &g.node(top).kind {
        NodeKind::Effect(e) => e.root_index.unwrap_or(top.0 as u64),
        _ => top.0 as u64,
    });
    for pair in chain.windows(2) {
        path.push(ordinal_within(g, pair[0], pair[1]));
    }
    (chain.len() - 1, path)
}

fn ordinal_within(g: &Globals, parent: NodeKey, child: NodeKey) -> u64 {
    match &g.node(parent).kind {
        NodeKind::Effect(e) => {
            let mut cursor = e.head;
            let mut index = 0u64;
            while let Some(c) = cursor {
                if c == child {
                    return index;
                }
                cursor = g.node(c).as_effect().next;
                index += 1;
            }
            child.0 as u64
        }
        NodeKind::Derived(d) => d
            .child_effects
            .iter()
            .position(|c| *c == child)
            .map_or(child.0 as u64, |i| i as u64),
        NodeKind::Source(_) => child.0 as u64,
    }
}
