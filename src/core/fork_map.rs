use super::node::{NodeKey, Value};

/// Shadow map of speculative writes, ordered by first write.
///
/// Forks are small; linear lookup beats hashing for the handful of entries a
/// speculative block touches, and the order makes committing deterministic.
#[derive(Clone, Default)]
pub(crate) struct ForkMap {
    entries: Vec<(NodeKey, Value)>,
}

impl ForkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: NodeKey) -> Option<Value> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn insert(&mut self, key: NodeKey, value: Value) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, &Value)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
