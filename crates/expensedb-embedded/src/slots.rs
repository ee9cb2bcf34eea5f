//! Page addressing over the primary table's sequence keys.
//!
//! Every record owns the slot numbered by the sequence value it was created
//! with. A page covers a fixed, inclusive run of slots; deleted records leave
//! vacant slots behind which are never back-filled, so a page with vacancies
//! simply comes back short.

use std::ops::RangeInclusive;

use expensedb_core::PageRequest;

/// Inclusive run of slots addressed by one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWindow {
    first: u64,
    last: u64,
}

impl SlotWindow {
    /// `[(page-1)*page_size + 1 ..= page*page_size]`
    pub fn for_page(page: &PageRequest) -> Self {
        let first = page.offset() + 1;
        Self {
            first,
            last: first + u64::from(page.page_size()) - 1,
        }
    }

    pub fn first(&self) -> u64 {
        self.first
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn slots(&self) -> RangeInclusive<u64> {
        self.first..=self.last
    }
}

/// Outcome of seeking one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot<V> {
    /// The seek landed exactly on the slot.
    Occupied(V),
    /// The seek landed on a later key: the slot's record was deleted.
    Vacant,
    /// No key at or after the slot.
    End,
}

impl<V> Slot<V> {
    /// Classifies the result of a greater-or-equal seek for `slot`.
    pub fn classify(slot: u64, found: Option<(u64, V)>) -> Self {
        match found {
            Some((key, value)) if key == slot => Slot::Occupied(value),
            Some(_) => Slot::Vacant,
            None => Slot::End,
        }
    }
}

/// Seeks every slot of `window` in turn and collects the occupied ones.
/// Stops at the first slot past the last stored key.
pub fn scan_window<V, E, F>(window: SlotWindow, mut seek: F) -> Result<Vec<V>, E>
where
    F: FnMut(u64) -> Result<Option<(u64, V)>, E>,
{
    let capacity = (window.last - window.first + 1).min(1024) as usize;
    let mut found = Vec::with_capacity(capacity);
    for slot in window.slots() {
        match Slot::classify(slot, seek(slot)?) {
            Slot::Occupied(value) => found.push(value),
            Slot::Vacant => continue,
            Slot::End => break,
        }
    }
    Ok(found)
}
