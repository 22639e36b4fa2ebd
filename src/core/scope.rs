use std::{
    mem::take,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
};

use super::{
    node::EffectData, EffectFn, Flags, Globals, Node, NodeKey, NodeKind, ReactionGuard, Teardown,
};

type PanicPayload = Box<dyn std::any::Any + Send>;

/// Builds an effect node, links it under the innermost running reaction,
/// and runs its body once synchronously to collect dependencies.
///
/// Returns `None` when a disconnected scope turned out empty (nothing to
/// dispose) and was reclaimed on the spot.
pub(crate) fn create_effect(body: EffectFn, flags: Flags) -> Option<NodeKey> {
    let key = Globals::with(|g| {
        g.assert_runtime();
        let parent = if flags.contains(Flags::DISCONNECTED) {
            None
        } else {
            g.current_reaction()
        };
        let root_index = if parent.is_none() {
            let index = g.next_root_index;
            g.next_root_index += 1;
            Some(index)
        } else {
            None
        };
        let key = NodeKey(g.nodes.insert(Node {
            flags,
            parent,
            kind: NodeKind::Effect(EffectData {
                body: Some(body.clone()),
                teardown: Vec::new(),
                deps: Vec::new(),
                prev: None,
                next: None,
                head: None,
                tail: None,
                root_index,
            }),
        }));
        if let Some(parent) = parent {
            link_child(g, parent, key);
        }
        key
    });

    run_effect_body(key, body);

    Globals::with(|g| {
        let node = g.nodes.get(key.0)?;
        let elide = node.flags.contains(Flags::DISCONNECTED) && {
            let e = node.as_effect();
            e.teardown.is_empty() && e.deps.is_empty() && e.head.is_none()
        };
        if elide {
            let _ = g.nodes.remove(key.0);
            None
        } else {
            Some(key)
        }
    })
}

fn link_child(g: &mut Globals, parent: NodeKey, child: NodeKey) {
    if g.node(parent).is_derived() {
        g.node_mut(parent).as_derived_mut().child_effects.push(child);
        return;
    }
    let prev_tail = g.node(parent).as_effect().tail;
    {
        let e = g.node_mut(parent).as_effect_mut();
        if e.head.is_none() {
            e.head = Some(child);
        }
        e.tail = Some(child);
    }
    g.node_mut(child).as_effect_mut().prev = prev_tail;
    if let Some(tail) = prev_tail {
        g.node_mut(tail).as_effect_mut().next = Some(child);
    }
}

/// Runs an effect body with the node on the reaction stack, then stores the
/// returned cleanup, if any.
pub(crate) fn run_effect_body(key: NodeKey, body: EffectFn) {
    let teardown = {
        let _guard = ReactionGuard::push(Some(key));
        let mut body = body
            .try_borrow_mut()
            .unwrap_or_else(|_| panic!("detect cyclic dependency"));
        (&mut *body)()
    };
    if let Some(teardown) = teardown {
        Globals::with(|g| {
            if let Some(node) = g.nodes.get_mut(key.0) {
                if let NodeKind::Effect(e) = &mut node.kind {
                    if e.body.is_some() {
                        e.teardown.push(teardown);
                    }
                }
            }
        });
    }
}

/// Readies a queued effect for re-execution: children from the previous run
/// are destroyed, dependency edges dropped, and the previous cleanups run
/// (oldest first) under a sentinel reaction so they neither track reads nor
/// attribute writes.
///
/// A panicking cleanup does not stop the remaining ones; the first payload
/// resurfaces once the pass is complete.
pub(crate) fn prepare_rerun(key: NodeKey) {
    let mut first_panic = None;
    for child in collect_children_of(key) {
        destroy_effect_collect(child, &mut first_panic);
    }
    let teardowns = Globals::with(|g| {
        if g.nodes.get(key.0).is_none() {
            return Vec::new();
        }
        let deps = take(&mut g.node_mut(key).as_effect_mut().deps);
        for dep in deps {
            if let Some(node) = g.nodes.get_mut(dep.0) {
                node.reactions_mut().retain(|r| *r != key);
            }
        }
        take(&mut g.node_mut(key).as_effect_mut().teardown)
    });
    run_teardowns(teardowns, &mut first_panic);
    if let Some(payload) = first_panic {
        resume_unwind(payload);
    }
}

/// Full teardown: children first, then dependency edges, sibling unlink,
/// cleanups, and slot reclamation. Safe to call twice.
pub(crate) fn destroy_effect(key: NodeKey) {
    let mut first_panic = None;
    destroy_effect_collect(key, &mut first_panic);
    if let Some(payload) = first_panic {
        resume_unwind(payload);
    }
}

pub(crate) fn destroy_effect_collect(key: NodeKey, first_panic: &mut Option<PanicPayload>) {
    for child in collect_children_of(key) {
        destroy_effect_collect(child, first_panic);
    }
    let teardowns = Globals::with(|g| {
        if g.nodes.get(key.0).is_none() {
            return None;
        }
        let deps = take(&mut g.node_mut(key).as_effect_mut().deps);
        for dep in deps {
            if let Some(node) = g.nodes.get_mut(dep.0) {
                node.reactions_mut().retain(|r| *r != key);
            }
        }
        unlink_sibling(g, key);
        let e = g.node_mut(key).as_effect_mut();
        e.body = None;
        e.head = None;
        e.tail = None;
        Some(take(&mut e.teardown))
    });
    let Some(teardowns) = teardowns else {
        return;
    };
    run_teardowns(teardowns, first_panic);
    Globals::with(|g| {
        // A key still sitting in the queue keeps its slot until the drain
        // encounters and discards it.
        if g.nodes
            .get(key.0)
            .is_some_and(|n| !n.flags.contains(Flags::DIRTY))
        {
            let _ = g.nodes.remove(key.0);
        }
    });
}

fn collect_children_of(key: NodeKey) -> Vec<NodeKey> {
    Globals::with(|g| {
        let mut children = Vec::new();
        if let Some(node) = g.nodes.get(key.0) {
            if let NodeKind::Effect(e) = &node.kind {
                let mut cursor = e.head;
                while let Some(c) = cursor {
                    children.push(c);
                    cursor = g.node(c).as_effect().next;
                }
            }
        }
        children
    })
}

fn unlink_sibling(g: &mut Globals, key: NodeKey) {
    let (parent, prev, next) = {
        let node = g.node(key);
        let e = node.as_effect();
        (node.parent, e.prev, e.next)
    };
    let Some(parent) = parent else {
        return;
    };
    if g.nodes.get(parent.0).is_none() {
        return;
    }
    if g.node(parent).is_derived() {
        g.node_mut(parent)
            .as_derived_mut()
            .child_effects
            .retain(|c| *c != key);
        return;
    }
    match prev {
        Some(p) => {
            if let Some(node) = g.nodes.get_mut(p.0) {
                node.as_effect_mut().next = next;
            }
        }
        None => g.node_mut(parent).as_effect_mut().head = next,
    }
    match next {
        Some(n) => {
            if let Some(node) = g.nodes.get_mut(n.0) {
                node.as_effect_mut().prev = prev;
            }
        }
        None => g.node_mut(parent).as_effect_mut().tail = prev,
    }
    let e = g.node_mut(key).as_effect_mut();
    e.prev = None;
    e.next = None;
}

fn run_teardowns(teardowns: Vec<Teardown>, first_panic: &mut Option<PanicPayload>) {
    if teardowns.is_empty() {
        return;
    }
    // Cleanup code neither tracks reads nor writes into any reaction.
    let _guard = ReactionGuard::push(None);
    for teardown in teardowns {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(teardown)) {
            if first_panic.is_none() {
                *first_panic = Some(payload);
            }
        }
    }
}

/// Attaches a cleanup to the innermost enclosing effect.
pub(crate) fn register_cleanup(f: Teardown) {
    let target = Globals::with(|g| {
        for entry in g.stack.iter().rev() {
            let Some(key) = *entry else {
                // Sentinel: teardown in progress, nothing owns a new cleanup.
                break;
            };
            if g.node(key).is_effect() {
                return Some(key);
            }
        }
        None
    });
    let Some(target) = target else {
        panic!("`on_cleanup` must be called inside an effect");
    };
    Globals::with(|g| {
        if let Some(node) = g.nodes.get_mut(target.0) {
            if let NodeKind::Effect(e) = &mut node.kind {
                if e.body.is_some() {
                    e.teardown.push(f);
                }
            }
        }
    });
}
