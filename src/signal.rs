use std::{fmt, marker::PhantomData, rc::Rc};

use derive_ex::derive_ex;
use serde::{Deserialize, Serialize};

use crate::{
    core::{create_source, peek_erased, read_erased, set_erased, NodeKey},
    SameValue, UnsafeMutation,
};

#[cfg(test)]
mod tests;

/// Creates a new [`Signal`].
pub fn signal<T: SameValue + 'static>(initial: T) -> Signal<T> {
    Signal::new(initial)
}

/// A writable value cell with tracked reads.
///
/// Reading inside an effect or derived registers a dependency on the cell.
/// Writing a value that is not same-value-equal to the current one
/// invalidates dependants and enqueues their effects for the next
/// [`Runtime::flush`](crate::Runtime::flush); a same value is a complete
/// no-op.
///
/// Clones share the cell, so the read and write halves can be handed to
/// different owners.
#[derive_ex(Clone, bound())]
pub struct Signal<T: 'static> {
    pub(crate) key: NodeKey,
    _marker: PhantomData<Rc<T>>,
}

impl<T: SameValue + 'static> Signal<T> {
    pub fn new(initial: T) -> Self {
        Signal {
            key: create_source(initial),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Signal<T> {
    /// Gets the current value, registering a dependency when called inside a
    /// reaction.
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

    /// Sets the value.
    ///
    /// # Panics
    ///
    /// Panics if called while a derived value is computing.
    pub fn set(&self, value: T) {
        self.try_set(value).unwrap_or_else(|e| panic!("{e}"));
    }

    pub fn try_set(&self, value: T) -> Result<(), UnsafeMutation> {
        set_erased(self.key, Rc::new(value))
    }

    /// Applies `f` to the current value and stores the result, returning the
    /// stored value. The read does not register a dependency.
    ///
    /// # Panics
    ///
    /// Panics if called while a derived value is computing.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> T
    where
        T: Clone,
    {
        self.try_update(f).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<T, UnsafeMutation>
    where
        T: Clone,
    {
        let current = peek_erased(self.key)
            .expect("signal used after its `Runtime` was dropped");
        let next = f(current.downcast_ref::<T>().unwrap());
        let stored = next.clone();
        set_erased(self.key, Rc::new(next))?;
        Ok(stored)
    }
}

impl<T: SameValue + Default + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match peek_erased(self.key) {
            Some(value) => value.downcast_ref::<T>().unwrap().fmt(f),
            None => write!(f, "<disposed>"),
        }
    }
}

impl<T> Serialize for Signal<T>
where
    T: Serialize + 'static,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        match peek_erased(self.key) {
            Some(value) => T::serialize(value.downcast_ref::<T>().unwrap(), serializer),
            None => Err(serde::ser::Error::custom("disposed")),
        }
    }
}

impl<'de, T> Deserialize<'de> for Signal<T>
where
    T: Deserialize<'de> + SameValue + 'static,
{
    fn deserialize<D>(deserializer: D) -> Result<Signal<T>, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Signal::new)
    }
}
