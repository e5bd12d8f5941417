//! Fixed-capacity, first-free-slot handle table.
//!
//! Both file handles (16 per session) and directory handles (8 per
//! session) are "the index of the first empty slot", per spec §4.4 — the
//! wire handle a client holds *is* the slot index, so allocation must be
//! deterministic and capacity must be enforced up front rather than
//! growing a `Vec` and running out of `u8` index space.

pub struct HandleTable<T> {
    slots: Vec<Option<T>>,
}

impl<T> HandleTable<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Finds the first free slot, stores `value` there, and returns its
    /// index. Returns `None` if every slot is occupied.
    pub fn alloc(&mut self, value: T) -> Option<u8> {
        let idx = self.slots.iter().position(Option::is_none)?;
        self.slots[idx] = Some(value);
        Some(idx as u8)
    }

    pub fn get(&self, handle: u8) -> Option<&T> {
        self.slots.get(handle as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: u8) -> Option<&mut T> {
        self.slots.get_mut(handle as usize).and_then(Option::as_mut)
    }

    /// Frees the slot, returning its previous occupant (dropping it
    /// closes a file handle / releases a directory cursor).
    pub fn free(&mut self, handle: u8) -> Option<T> {
        self.slots.get_mut(handle as usize).and_then(Option::take)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}
