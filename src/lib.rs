//! Fine-grained reactive runtime: signals, lazy memoized deriveds, batched
//! effects, nested effect scopes with cascading teardown, and speculative
//! forks.
//!
//! The graph is push-pull: writes push dirtiness to dependants, but memo
//! recomputation is pulled by reads, and effects wait in a queue until the
//! owner of the [`Runtime`] drains it with [`Runtime::flush`]. Several
//! writes between flushes coalesce into at most one re-execution per
//! affected effect.
//!
//! ```
//! use skein::{derived, effect, signal, Runtime};
//!
//! let mut rt = Runtime::new();
//!
//! let count = signal(1);
//! let doubled = derived({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//! effect({
//!     let doubled = doubled.clone();
//!     move || println!("doubled = {}", doubled.get())
//! });
//! // the effect ran once at creation; now invalidate it
//! count.set(5);
//! rt.flush(); // prints "doubled = 10"
//! ```
//!
//! Everything is single-threaded and cooperative: one [`Runtime`] per
//! thread owns the graph, and all scheduling state lives in thread-local
//! storage.

mod core;
mod derived;
mod effect;
mod fork;
mod same_value;
mod signal;

pub use self::core::{untrack, Runtime, UnsafeMutation};
pub use self::derived::{derived, Derived};
pub use self::effect::{effect, on_cleanup, root, Cleanup, IntoTeardown, RootSubscription};
pub use self::fork::{fork, fork_async, Fork, ForkFuture};
pub use self::same_value::SameValue;
pub use self::signal::{signal, Signal};
