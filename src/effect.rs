use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::core::{create_effect, destroy_effect, register_cleanup, EffectFn, Flags, NodeKey};

#[cfg(test)]
mod tests;

/// Runs `f` once now, then again after any of the values it read changes,
/// at the next [`Runtime::flush`](crate::Runtime::flush).
///
/// The body may hand back a [`Cleanup`], run before the next re-execution
/// and on teardown. Effects created inside another effect (or a derived) are
/// owned by it: they are torn down when the parent re-runs or is disposed.
pub fn effect<F, R>(mut f: F)
where
    F: FnMut() -> R + 'static,
    R: IntoTeardown,
{
    let body: EffectFn = Rc::new(RefCell::new(move || f().into_teardown()));
    let _ = create_effect(body, Flags::EMPTY);
}

/// Registers a cleanup on the innermost enclosing effect, run before its
/// next re-execution and on teardown, in registration order.
///
/// # Panics
///
/// Panics when called outside an effect.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    register_cleanup(Box::new(f));
}

/// Creates a disconnected scope: effects created inside `f` belong to the
/// scope rather than to whatever reaction happens to be running, and reads
/// inside `f` itself track nothing.
///
/// The scope lives until the returned handle is disposed or dropped.
pub fn root(f: impl FnOnce() + 'static) -> RootSubscription {
    let mut f = Some(f);
    let body: EffectFn = Rc::new(RefCell::new(move || -> Option<Box<dyn FnOnce()>> {
        if let Some(f) = f.take() {
            f();
        }
        None
    }));
    let key = create_effect(body, Flags::ROOT | Flags::DISCONNECTED);
    RootSubscription {
        key: Cell::new(key),
    }
}

/// Cleanup handed back by an effect body.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Cleanup(Box::new(f))
    }
}

/// What an effect body may return: nothing, or a cleanup.
pub trait IntoTeardown {
    fn into_teardown(self) -> Option<Box<dyn FnOnce()>>;
}

impl IntoTeardown for () {
    fn into_teardown(self) -> Option<Box<dyn FnOnce()>> {
        None
    }
}
impl IntoTeardown for Cleanup {
    fn into_teardown(self) -> Option<Box<dyn FnOnce()>> {
        Some(self.0)
    }
}
impl IntoTeardown for Option<Cleanup> {
    fn into_teardown(self) -> Option<Box<dyn FnOnce()>> {
        self.map(|c| c.0)
    }
}

/// Handle to a [`root`] scope. Disposing tears the scope's effects down
/// synchronously, cascading through children; disposing twice is a no-op.
/// Dropping the handle disposes it.
#[must_use]
pub struct RootSubscription {
    key: Cell<Option<NodeKey>>,
}

impl RootSubscription {
    pub fn dispose(&self) {
        if let Some(key) = self.key.take() {
            destroy_effect(key);
        }
    }

    /// Detaches the scope: it lives for the rest of the runtime.
    pub fn leak(self) {
        self.key.take();
    }
}

impl Drop for RootSubscription {
    fn drop(&mut self) {
        self.dispose();
    }
}
