//! Per-page lazy slots.
//!
//! A table is sized to the page count when a document is loaded. Each slot is
//! either [`Slot::Absent`] (never computed) or [`Slot::Present`], which may
//! hold an empty value: "computed, nothing found" is distinct from "not yet
//! computed".

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Slot<T> {
    #[default]
    Absent,
    Present(T),
}

impl<T> Slot<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Slot::Present(_))
    }

    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Slot::Present(value) => Some(value),
            Slot::Absent => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotTable<T> {
    slots: Vec<Slot<T>>,
}

impl<T> SlotTable<T> {
    pub fn new(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || Slot::Absent);
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `None` when `index` is out of range.
    pub fn slot(&self, index: usize) -> Option<&Slot<T>> {
        self.slots.get(index)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    pub fn is_present(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(Slot::is_present)
    }

    /// Fill a slot, replacing any previous value. Returns `false` if out of range.
    pub fn fill(&mut self, index: usize, value: T) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = Slot::Present(value);
                true
            }
            None => false,
        }
    }

    /// Return a slot to [`Slot::Absent`].
    pub fn reset(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Slot::Absent;
        }
    }

    /// Return every slot to [`Slot::Absent`], keeping the length.
    pub fn clear(&mut self) {
        self.slots.fill_with(|| Slot::Absent);
    }

    pub fn present_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_present()).count()
    }
}
