use std::{cell::RefCell, rc::Rc};

use assert_call::{call, CallRecorder};
use pretty_assertions::assert_eq;

use super::*;
use crate::{derived, effect, signal, Derived, Signal};

#[test]
#[should_panic(expected = "Only one `Runtime` can exist in the same thread at the same time.")]
fn only_one_runtime_per_thread() {
    let _a = Runtime::new();
    let _b = Runtime::new();
}

#[test]
fn dropping_the_runtime_resets_the_thread() {
    {
        let _rt = Runtime::new();
        let _s = Signal::new(1);
    }
    let _rt = Runtime::new();
    let s = Signal::new(2);
    assert_eq!(s.get(), 2);
}

#[test]
#[should_panic(expected = "`Runtime` is not created.")]
fn nodes_require_a_runtime() {
    let _s = Signal::new(1);
}

#[test]
fn dependency_edges_are_symmetric() {
    let _rt = Runtime::new();
    let a = signal(1);
    let d = derived({
        let a = a.clone();
        move || a.get() + 1
    });
    effect({
        let d = d.clone();
        move || {
            d.get();
        }
    });

    let (a_reactions, d_deps, d_reactions) = Globals::with(|g| {
        (
            g.node(a.key).reactions().to_vec(),
            g.node(d.key).as_derived().deps.clone(),
            g.node(d.key).reactions().to_vec(),
        )
    });
    assert_eq!(a_reactions, vec![d.key]);
    assert_eq!(d_deps, vec![a.key]);
    assert_eq!(d_reactions.len(), 1);
    let e = d_reactions[0];
    Globals::with(|g| {
        assert_eq!(g.node(e).as_effect().deps, vec![d.key]);
    });
}

#[test]
fn rerun_rebuilds_edges_without_duplicates() {
    let mut rt = Runtime::new();
    let s = signal(0);
    effect({
        let s = s.clone();
        move || {
            // two reads, one edge
            s.get();
            s.get();
        }
    });
    s.set(1);
    rt.flush();
    s.set(2);
    rt.flush();
    Globals::with(|g| {
        assert_eq!(g.node(s.key).reactions().len(), 1);
        let e = g.node(s.key).reactions()[0];
        assert_eq!(g.node(e).as_effect().deps, vec![s.key]);
    });
}

#[test]
fn writes_inside_the_drain_extend_the_current_pass() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let a = signal(0);
    let b = signal(0);
    effect({
        let a = a.clone();
        let b = b.clone();
        move || {
            let v = a.get();
            call!("a {v}");
            if v == 1 {
                b.set(1);
            }
        }
    });
    effect({
        let b = b.clone();
        move || {
            call!("b {}", b.get());
        }
    });
    cr.verify(["a 0", "b 0"]);

    a.set(1);
    rt.flush();
    cr.verify(["a 1", "b 1"]);
    assert!(!rt.has_pending());
}

#[test]
fn queued_effects_of_a_disposed_scope_are_discarded() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = signal(0);
    let scope = crate::root({
        let s = s.clone();
        move || {
            effect(move || {
                call!("run {}", s.get());
            });
        }
    });
    cr.verify("run 0");

    s.set(1);
    assert!(rt.has_pending());
    scope.dispose();
    rt.flush();
    cr.verify(());
}

#[test]
fn disposing_a_middle_sibling_preserves_the_chain() {
    let _rt = Runtime::new();
    let body: EffectFn = Rc::new(RefCell::new(|| -> Option<Teardown> {
        effect(|| {});
        effect(|| {});
        effect(|| {});
        None
    }));
    let parent = create_effect(body, Flags::EMPTY).unwrap();

    let children = |parent: NodeKey| {
        Globals::with(|g| {
            let mut keys = Vec::new();
            let mut cursor = g.node(parent).as_effect().head;
            while let Some(c) = cursor {
                keys.push(c);
                cursor = g.node(c).as_effect().next;
            }
            keys
        })
    };
    let before = children(parent);
    assert_eq!(before.len(), 3);

    destroy_effect(before[1]);

    let after = children(parent);
    assert_eq!(after, vec![before[0], before[2]]);
    Globals::with(|g| {
        assert_eq!(g.node(before[0]).as_effect().next, Some(before[2]));
        assert_eq!(g.node(before[2]).as_effect().prev, Some(before[0]));
        assert_eq!(g.node(parent).as_effect().tail, Some(before[2]));
    });
}

#[test]
fn teardown_panics_do_not_stop_later_teardowns() {
    let mut cr = CallRecorder::new();
    let _rt = Runtime::new();
    let scope = crate::root(|| {
        effect(|| {
            crate::on_cleanup(|| call!("first"));
            crate::on_cleanup(|| panic!("cleanup failed"));
            crate::on_cleanup(|| call!("last"));
        });
    });
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scope.dispose()));
    assert!(result.is_err());
    cr.verify(["first", "last"]);
}

#[test]
fn empty_disconnected_scopes_are_reclaimed() {
    let _rt = Runtime::new();
    let nodes_before = Globals::with(|g| g.nodes.len());
    let scope = crate::root(|| {});
    assert_eq!(Globals::with(|g| g.nodes.len()), nodes_before);
    scope.dispose();
}

#[test]
fn lazy_memo_is_not_touched_by_a_write() {
    let mut rt = Runtime::new();
    let s = signal(1);
    let d: Derived<i32> = derived({
        let s = s.clone();
        move || s.get() * 2
    });
    assert_eq!(d.get(), 2);

    s.set(5);
    rt.flush();
    Globals::with(|g| {
        let node = g.node(d.key);
        assert!(node.flags.intersects(Flags::MAYBE_DIRTY));
        assert_eq!(
            node.as_derived()
                .value
                .as_ref()
                .and_then(|v| v.downcast_ref::<i32>())
                .copied(),
            Some(2)
        );
    });
    assert_eq!(d.get(), 10);
}
