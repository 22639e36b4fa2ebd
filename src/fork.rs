use std::{
    future::Future,
    mem::replace,
    pin::Pin,
    task::{Context, Poll},
};

use crate::core::{set_erased, ForkMap, Globals};


/// Runs `f` with writes captured in a speculative overlay instead of the
/// graph, and returns the captured overlay as a [`Fork`].
///
/// Reads inside `f` prefer the overlay, so the speculation is internally
/// consistent; deriveds recompute against it without their global values
/// moving. No effect runs because of a speculative write, and until
/// [`Fork::apply`] nothing outside the fork can observe the new values.
pub fn fork(f: impl FnOnce()) -> Fork {
    let mut guard = ActiveForkGuard::install(ForkMap::new());
    f();
    Fork { map: guard.take() }
}

/// Like [`fork`], for bodies that suspend.
///
/// The overlay is installed when `fork_async` is called and stays installed
/// until the returned future completes (or is dropped), so writes from any
/// code that runs in that window land in the same fork.
pub fn fork_async<Fut>(f: impl FnOnce() -> Fut) -> ForkFuture
where
    Fut: Future<Output = ()> + 'static,
{
    let guard = ActiveForkGuard::install(ForkMap::new());
    let future = f();
    ForkFuture {
        future: Box::pin(future),
        guard,
    }
}

/// A set of captured speculative writes.
pub struct Fork {
    map: ForkMap,
}

impl Fork {
    /// Commits the captured writes through the normal write path, in first-
    /// write order: dependants are invalidated and effects enqueued exactly
    /// as if the values had been written directly. Deriveds whose next value
    /// the fork already carries are not recomputed, they are assigned.
    ///
    /// # Panics
    ///
    /// Panics if called while a derived value is computing.
    pub fn apply(&self) {
        let _guard = ApplyingForkGuard::install(self.map.clone());
        for (key, value) in self.map.iter() {
            if let Err(e) = set_erased(key, value.clone()) {
                panic!("{e}");
            }
        }
    }

    /// Runs `g` against a copy of the overlay and returns its result.
    /// Reads inside `g` see the speculative state; writes land in the copy
    /// and do not pollute this fork.
    pub fn with<R>(&self, g: impl FnOnce() -> R) -> R {
        let _guard = ActiveForkGuard::install(self.map.clone());
        g()
    }

    /// Number of nodes the fork wrote.
    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }
}

/// Resolves to the captured [`Fork`] once the speculative body completes.
#[must_use = "futures do nothing unless polled"]
pub struct ForkFuture {
    future: Pin<Box<dyn Future<Output = ()>>>,
    guard: ActiveForkGuard,
}

impl Future for ForkFuture {
    type Output = Fork;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Fork> {
        match self.future.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(Fork {
                map: self.guard.take(),
            }),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Installs an overlay as the active fork, restoring the previous one when
/// taken or dropped. A drop without take discards the speculative writes.
struct ActiveForkGuard {
    saved: Option<ForkMap>,
    done: bool,
}

impl ActiveForkGuard {
    fn install(map: ForkMap) -> Self {
        let saved = Globals::with(|g| {
            g.assert_runtime();
            replace(&mut g.active_fork, Some(map))
        });
        Self { saved, done: false }
    }

    fn take(&mut self) -> ForkMap {
        self.done = true;
        Globals::with(|g| replace(&mut g.active_fork, self.saved.take())).unwrap_or_default()
    }
}

impl Drop for ActiveForkGuard {
    fn drop(&mut self) {
        if !self.done {
            let saved = self.saved.take();
            let _ = Globals::try_with(|g| g.active_fork = saved);
        }
    }
}

struct ApplyingForkGuard {
    saved: Option<ForkMap>,
}

impl ApplyingForkGuard {
    fn install(map: ForkMap) -> Self {
        let saved = Globals::with(|g| replace(&mut g.applying_fork, Some(map)));
        Self { saved }
    }
}

impl Drop for ApplyingForkGuard {
    fn drop(&mut self) {
        let saved = self.saved.take();
        let _ = Globals::try_with(|g| g.applying_fork = saved);
    }
}
