use std::{cell::RefCell, fmt, marker::PhantomData, rc::Rc};

use derive_ex::derive_ex;

use crate::{
    core::{create_derived, peek_erased, read_erased, DerivedFn, NodeKey, Value},
    SameValue,
};


/// Creates a new [`Derived`].
pub fn derived<T: SameValue + 'static>(f: impl FnMut() -> T + 'static) -> Derived<T> {
    Derived::new(f)
}

/// A memoized projection of other signals and deriveds.
///
/// The producer does not run at creation. The first read computes; later
/// reads return the cached value until a dependency write invalidates it.
/// While nobody depends on it, a write never recomputes it either — the
/// refresh is deferred to the next read. A recomputation whose result is
/// same-value-equal to the previous one does not invalidate dependants.
#[derive_ex(Clone, bound())]
pub struct Derived<T: 'static> {
    pub(crate) key: NodeKey,
    _marker: PhantomData<Rc<T>>,
}

impl<T: SameValue + 'static> Derived<T> {
    pub fn new(mut f: impl FnMut() -> T + 'static) -> Self {
        let producer: DerivedFn = Rc::new(RefCell::new(move || -> Value { Rc::new(f()) }));
        Derived {
            key: create_derived::<T>(producer),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Derived<T> {
    /// Gets the current value, recomputing first if a dependency changed.
    /// Registers a dependency when called inside a reaction.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Like [`get`](Self::get), without cloning the whole value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = read_erased(self.key);
        f(value.downcast_ref::<T>().unwrap())
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match peek_erased(self.key) {
            Some(value) => value.downcast_ref::<T>().unwrap().fmt(f),
            None => write!(f, "<uninit>"),
        }
    }
}
