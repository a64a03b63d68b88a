use crate::error::{CollectionError, Result};

/// A collection that producers add to and consumers take from, without caring
/// about the order it hands items back in.
pub trait ProducerConsumer<T> {
    /// Adds `item`, handing it back if the collection refused it.
    fn try_add(&self, item: T) -> std::result::Result<(), T>;

    /// Removes and returns some item, or None if the collection is empty.
    fn try_take(&self) -> Option<T>;

    /// A point-in-time copy of the items, in the order `try_take` would
    /// return them if nothing else ran.
    fn to_vec(&self) -> Vec<T>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies a snapshot of the items into `dest` starting at `index`. Nothing
    /// is written unless the whole snapshot fits.
    fn copy_to(&self, dest: &mut [T], index: usize) -> Result<()> {
        if index > dest.len() {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: dest.len(),
            });
        }
        let items = self.to_vec();
        let available = dest.len() - index;
        if items.len() > available {
            return Err(CollectionError::InsufficientSpace {
                required: items.len(),
                available,
            });
        }
        for (slot, item) in dest[index..].iter_mut().zip(items) {
            *slot = item;
        }
        Ok(())
    }
}
