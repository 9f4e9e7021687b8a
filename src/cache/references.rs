use std::sync::OnceLock;

use crate::resolution::ObjectRef;

/// What a resolved-reference slot was reserved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceOrigin {
    /// A `String`, `MethodHandle`, `MethodType` or `Dynamic` constant
    Constant(u16),
    /// The appendix of an invokedynamic call site (indy row)
    CallSite(u32),
    /// The appendix of an `invokehandle` method row
    Appendix(u16),
}

/// The per-class array of resolved objects.
///
/// Slots are written at most once: the first thread to publish a value wins and every other
/// thread adopts it. Constant-backed slots occupy a prefix of the array in constant-pool order;
/// call-site and appendix slots follow in the order they were reserved during rewriting.
#[derive(Debug)]
pub struct ResolvedReferences {
    slots: Box<[OnceLock<ObjectRef>]>,
    origins: Box<[ReferenceOrigin]>,
    constant_count: usize,
}

impl ResolvedReferences {
    pub(crate) fn new(origins: Box<[ReferenceOrigin]>) -> Self {
        let constant_count = origins
            .iter()
            .take_while(|origin| matches!(origin, ReferenceOrigin::Constant(_)))
            .count();
        let slots = origins.iter().map(|_| OnceLock::new()).collect();
        ResolvedReferences {
            slots,
            origins,
            constant_count,
        }
    }

    /// Number of slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if there are no slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of constant-backed slots at the start of the array
    #[must_use]
    pub fn constant_count(&self) -> usize {
        self.constant_count
    }

    /// The stored object, if published
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&ObjectRef> {
        self.slots.get(slot).and_then(OnceLock::get)
    }

    /// What `slot` was reserved for
    #[must_use]
    pub fn origin(&self, slot: usize) -> Option<ReferenceOrigin> {
        self.origins.get(slot).copied()
    }

    /// Constant-pool index behind a constant-backed slot
    #[must_use]
    pub fn constant_pool_index(&self, slot: usize) -> Option<u16> {
        match self.origin(slot)? {
            ReferenceOrigin::Constant(cp_index) => Some(cp_index),
            _ => None,
        }
    }

    /// Slot of the constant at `cp_index`, found by bisecting the constant-backed prefix
    #[must_use]
    pub fn slot_for_constant(&self, cp_index: u16) -> Option<usize> {
        self.origins[..self.constant_count]
            .binary_search_by_key(&cp_index, |origin| match origin {
                ReferenceOrigin::Constant(index) => *index,
                _ => u16::MAX,
            })
            .ok()
    }

    /// First-writer-wins store. Returns the object that ended up in the slot, which is `value`
    /// only if the slot was empty. `None` if the slot does not exist.
    pub fn set_if_empty(&self, slot: usize, value: ObjectRef) -> Option<&ObjectRef> {
        let cell = self.slots.get(slot)?;
        Some(cell.get_or_init(|| value))
    }

    pub(crate) fn clear(&mut self, slot: usize) {
        if let Some(cell) = self.slots.get_mut(slot) {
            cell.take();
        }
    }

    /// Iterate `(slot, origin)` pairs
    pub fn origins(&self) -> impl Iterator<Item = (usize, ReferenceOrigin)> + '_ {
        self.origins.iter().copied().enumerate()
    }
}
