use assert_call::{call, CallRecorder};
use pretty_assertions::assert_eq;

use crate::{derived, effect, on_cleanup, root, signal, untrack, Cleanup, Runtime};

#[test]
fn runs_once_at_creation_then_per_flush() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let x = signal(0);
    let y = signal(0);
    effect({
        let x = x.clone();
        let y = y.clone();
        move || {
            call!("run {} {}", x.get(), y.get());
        }
    });
    cr.verify("run 0 0");

    // several writes in one batch coalesce into a single re-execution
    x.set(1);
    y.set(1);
    rt.flush();
    cr.verify("run 1 1");
}

#[test]
fn diamond_sees_a_consistent_world() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let a = signal(0);
    let b = derived({
        let a = a.clone();
        move || a.get() * 2
    });
    let c = derived({
        let a = a.clone();
        move || a.get() + 1
    });
    effect({
        let b = b.clone();
        let c = c.clone();
        move || {
            call!("{}", b.get() + c.get());
        }
    });
    cr.verify("1");

    a.set(3);
    rt.flush();
    cr.verify("10");
}

#[test]
fn cleanup_runs_before_rerun_in_registration_order() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = signal(0);
    effect({
        let s = s.clone();
        move || {
            let value = s.get();
            call!("run {value}");
            on_cleanup(move || call!("first {value}"));
            on_cleanup(move || call!("second {value}"));
            Cleanup::new(move || call!("returned {value}"))
        }
    });
    cr.verify("run 0");

    s.set(1);
    rt.flush();
    cr.verify(["first 0", "second 0", "returned 0", "run 1"]);
}

#[test]
fn nested_scopes_tear_down_inner_first() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = signal(0);
    let scope = root({
        let s = s.clone();
        move || {
            effect(move || {
                let s = s.clone();
                effect(move || {
                    s.get();
                    call!("inner");
                });
                on_cleanup(|| call!("outer-cleanup"));
            });
        }
    });
    cr.verify("inner");

    scope.dispose();
    cr.verify("outer-cleanup");

    // the remembered dependency is gone for good
    s.set(1);
    rt.flush();
    cr.verify(());

    // disposing again is a no-op (and so is the drop)
    scope.dispose();
    cr.verify(());
}

#[test]
fn inner_cleanup_runs_before_outer_cleanup() {
    let mut cr = CallRecorder::new();
    let _rt = Runtime::new();
    let scope = root(|| {
        effect(|| {
            effect(|| {
                on_cleanup(|| call!("inner-cleanup"));
            });
            on_cleanup(|| call!("outer-cleanup"));
        });
    });
    scope.dispose();
    cr.verify(["inner-cleanup", "outer-cleanup"]);
}

#[test]
fn parent_rerun_shadows_queued_children() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = signal(0);
    effect({
        let s = s.clone();
        move || {
            let value = s.get();
            call!("parent {value}");
            let s = s.clone();
            effect(move || {
                call!("child {}", s.get());
            });
        }
    });
    cr.verify(["parent 0", "child 0"]);

    // both depend on s, but the child is recreated by the parent's re-run
    // and must not run twice
    s.set(1);
    rt.flush();
    cr.verify(["parent 1", "child 1"]);
}

#[test]
fn top_level_effects_flush_in_creation_order() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let gate = signal(0);
    let s = signal(0);
    effect({
        let gate = gate.clone();
        let s = s.clone();
        move || {
            if gate.get() == 1 {
                s.get();
            }
            call!("e1");
        }
    });
    effect({
        let s = s.clone();
        move || {
            s.get();
            call!("e2");
        }
    });
    cr.verify(["e1", "e2"]);

    gate.set(1);
    rt.flush();
    cr.verify("e1");

    // e2 subscribed to s first, but creation order wins at the flush
    s.set(5);
    rt.flush();
    cr.verify(["e1", "e2"]);
}

#[test]
fn shallow_effects_flush_before_deep_ones() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = signal(0);
    effect({
        let s = s.clone();
        move || {
            let s = s.clone();
            effect(move || {
                s.get();
                call!("nested");
            });
        }
    });
    effect({
        let s = s.clone();
        move || {
            s.get();
            call!("top");
        }
    });
    cr.verify(["nested", "top"]);

    // the nested effect subscribed first, yet depth orders the drain
    s.set(1);
    rt.flush();
    cr.verify(["top", "nested"]);
}

#[test]
fn untracked_reads_register_nothing() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let a = signal(0);
    let b = signal(0);
    effect({
        let a = a.clone();
        let b = b.clone();
        move || {
            let hidden = untrack(|| a.get());
            call!("run {} {}", hidden, b.get());
        }
    });
    cr.verify("run 0 0");

    a.set(5);
    assert!(!rt.has_pending());

    b.set(1);
    rt.flush();
    cr.verify("run 5 1");
}

#[test]
fn root_reads_track_nothing() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = signal(0);
    let scope = root({
        let s = s.clone();
        move || {
            call!("root {}", s.get());
        }
    });
    cr.verify("root 0");

    s.set(1);
    assert!(!rt.has_pending());
    scope.dispose();
}

#[test]
fn writes_from_cleanup_reach_the_next_flush() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = signal(0);
    let log = signal(0);
    effect({
        let log = log.clone();
        move || {
            call!("log {}", log.get());
        }
    });
    effect({
        let s = s.clone();
        let log = log.clone();
        move || {
            s.get();
            let log = log.clone();
            on_cleanup(move || {
                log.update(|v| v + 1);
            });
        }
    });
    cr.verify("log 0");

    s.set(1);
    rt.flush();
    cr.verify("log 1");
}

#[test]
fn bodies_may_return_nothing_or_a_cleanup() {
    let _rt = Runtime::new();
    effect(|| {});
    effect(|| Cleanup::new(|| {}));
    effect(|| None::<Cleanup>);
}
