//! Identity keys for items.
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::LibraryItem;

/// How items are passed around.
pub type SharedItem = Arc<dyn LibraryItem>;

/// A cache key which hashes and compares the item's allocation, not its contents.
///
/// The key holds a strong reference, so the address can't be handed to a different item while an entry for it is
/// alive.
#[derive(Clone)]
pub struct ItemRef(SharedItem);

impl ItemRef {
    pub fn new(item: &SharedItem) -> ItemRef {
        ItemRef(item.clone())
    }

    pub fn item(&self) -> &SharedItem {
        &self.0
    }

    fn addr(&self) -> *const () {
        // Drop the vtable half so that the same object seen through different vtables is still equal.
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for ItemRef {
    fn eq(&self, other: &ItemRef) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for ItemRef {}

impl Hash for ItemRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl std::fmt::Debug for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ItemRef({:p})", self.addr())
    }
}
