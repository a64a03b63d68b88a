use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use crossbeam_epoch::Guard;

use super::table::Node;

/// A borrowed entry of a [`HashMap`](crate::structures::HashMap).
///
/// The guard keeps the current thread pinned, so the entry stays readable even
/// if another thread removes or replaces it in the meantime. Holding many
/// guards for a long time delays reclamation for the whole map.
pub struct DataGuard<'a, K, V> {
    node: *const Node<K, V>,
    _guard: Guard,
    _marker: PhantomData<(&'a K, &'a V)>,
}

impl<'a, K, V> DataGuard<'a, K, V> {
    /// # Safety
    /// `node` must have been loaded while `guard` was pinned.
    pub(crate) unsafe fn new(node: *const Node<K, V>, guard: Guard) -> Self {
        DataGuard {
            node,
            _guard: guard,
            _marker: PhantomData,
        }
    }

    fn node(&self) -> &Node<K, V> {
        unsafe { &*self.node }
    }

    pub fn key(&self) -> &K {
        &self.node().key
    }

    pub fn data(&self) -> &V {
        &self.node().value
    }
}

impl<'a, K, V: Clone> DataGuard<'a, K, V> {
    pub fn cloned(self) -> V {
        self.data().clone()
    }
}

impl<'a, K, V> Deref for DataGuard<'a, K, V> {
    type Target = V;

    fn deref(&self) -> &V {
        self.data()
    }
}

impl<'a, K: fmt::Debug, V: fmt::Debug> fmt::Debug for DataGuard<'a, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DataGuard")
            .field("key", self.key())
            .field("value", self.data())
            .finish()
    }
}
