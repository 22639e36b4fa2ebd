use assert_call::{call, CallRecorder};
use pretty_assertions::assert_eq;

use crate::{derived, effect, signal, Runtime, Signal};

#[test]
fn set_and_get() {
    let _rt = Runtime::new();
    let s = Signal::new(10);
    assert_eq!(s.get(), 10);
    s.set(20);
    assert_eq!(s.get(), 20);
}

#[test]
fn clones_share_the_cell() {
    let _rt = Runtime::new();
    let read = signal(1);
    let write = read.clone();
    write.set(7);
    assert_eq!(read.get(), 7);
}

#[test]
fn update_returns_the_stored_value() {
    let _rt = Runtime::new();
    let s = signal(10);
    assert_eq!(s.update(|v| v + 1), 11);
    assert_eq!(s.get(), 11);
}

#[test]
fn same_value_write_is_a_noop() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let s = signal(1);
    let d = derived({
        let s = s.clone();
        move || {
            call!("compute");
            s.get() * 2
        }
    });
    effect({
        let d = d.clone();
        move || {
            call!("run {}", d.get());
        }
    });
    cr.verify(["compute", "run 2"]);

    s.set(1);
    assert!(!rt.has_pending());
    rt.flush();
    cr.verify(());
}

#[test]
fn signed_zero_is_a_change_and_nan_is_not() {
    let mut rt = Runtime::new();
    let s = signal(0.0f64);
    effect({
        let s = s.clone();
        move || {
            s.get();
        }
    });
    s.set(-0.0);
    assert!(rt.has_pending());
    rt.flush();

    s.set(f64::NAN);
    rt.flush();
    s.set(f64::NAN);
    assert!(!rt.has_pending());
}

#[test]
fn write_inside_derived_is_rejected() {
    let _rt = Runtime::new();
    let s = signal(0);
    let d = derived({
        let s = s.clone();
        move || s.try_set(1).is_err()
    });
    assert!(d.get());
    assert_eq!(s.get(), 0);
}

#[test]
#[should_panic(expected = "cannot write to a signal while a derived value is computing")]
fn panicking_write_inside_derived() {
    let _rt = Runtime::new();
    let s = signal(0);
    let d = derived({
        let s = s.clone();
        move || {
            s.set(1);
            0
        }
    });
    d.get();
}

#[test]
fn debug_renders_the_current_value() {
    let _rt = Runtime::new();
    let s = signal(vec![1, 2]);
    assert_eq!(format!("{s:?}"), "[1, 2]");
}

#[test]
fn serde_roundtrip() {
    let _rt = Runtime::new();
    let s = signal(10);
    assert_eq!(serde_json::to_string(&s).unwrap(), "10");
    let t: Signal<u32> = serde_json::from_str("5").unwrap();
    assert_eq!(t.get(), 5);
}
