use std::fmt::{Debug, Error, Formatter};
use std::iter::{DoubleEndedIterator, Enumerate, Extend, FromIterator};
use std::ops::Sub;
use std::result::Result;
use std::slice::Iter;
use std::vec::IntoIter as VecIntoIter;

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are given in
/// terms of the sum of the widths of the previous elements (as opposed to the number of preceding
/// elements).
///
/// Class files are full of this shape:
///
///   - the constant pool, where `long` and `double` entries burn two indices
///   - the simulated operand stack, where `long` and `double` values take two slots and the
///     second slot must never be addressed on its own
///   - the locals of a stack map frame
///
/// Addressing the middle of a wide element is reported as [`OffsetResult::InvalidOffset`].
#[derive(Clone, Hash)]
pub struct OffsetVec<T: Sized> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,

    /// Offset for the first element (0 for stacks, 1 for the constant pool)
    initial_offset: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

impl<T: Sized + Width> OffsetVec<T> {
    /// New empty offset vector
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    /// New empty offset vector, with a custom starting offset
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
            initial_offset,
        }
    }

    /// Number of entries (not the sum of their widths)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset of the next element to be added
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Add an entry to the back, returning its offset
    pub fn push(&mut self, slot: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += slot.width();
        self.entries.push((offset, slot));

        offset
    }

    /// Remove an entry from the back
    pub fn pop(&mut self) -> Option<(Offset, usize, T)> {
        self.entries.pop().map(|(off, elem)| {
            self.offset_len = off;
            (off, self.entries.len(), elem)
        })
    }

    /// Peek at the entry at the back
    pub fn last(&self) -> Option<&T> {
        self.entries.last().map(|(_, elem)| elem)
    }

    /// Mutable access to the entry at the back (its width must not change)
    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.entries.last_mut().map(|(_, elem)| elem)
    }

    /// Empty the vector
    pub fn clear(&mut self) {
        self.entries.clear();
        self.offset_len = self.initial_offset;
    }

    /// Get an entry (and its index) by its offset in the vector
    ///
    /// Note: this uses binary search to find the offset
    pub fn get_offset(&self, offset: Offset) -> OffsetResult<'_, T> {
        match self.entries.binary_search_by_key(&offset, |(off, _)| *off) {
            Err(insert_at) if insert_at == self.entries.len() => OffsetResult::TooLarge,
            Err(insert_at) => OffsetResult::InvalidOffset(insert_at),
            Ok(found_idx) => OffsetResult::Ok(found_idx, &self.entries[found_idx].1),
        }
    }

    /// Set an entry by its offset in the vector, or push it if the offset is one past the end
    pub fn set_offset(&mut self, offset: Offset, value: T) -> OffsetResult<'static, ()> {
        if offset == self.offset_len() {
            self.push(value);
            return OffsetResult::Ok(self.len() - 1, &());
        }
        match self.entries.binary_search_by_key(&offset, |(off, _)| *off) {
            Err(insert_at) if insert_at == self.entries.len() => OffsetResult::TooLarge,
            Err(insert_at) => OffsetResult::InvalidOffset(insert_at),
            Ok(found_idx) => {
                let replacing = &mut self.entries[found_idx].1;
                if replacing.width() != value.width() {
                    OffsetResult::IncompatibleWidth(value.width(), replacing.width())
                } else {
                    *replacing = value;
                    OffsetResult::Ok(found_idx, &())
                }
            }
        }
    }

    /// Drop every entry from position `index` onwards
    pub fn truncate(&mut self, index: usize) {
        if let Some((offset, _)) = self.entries.get(index) {
            self.offset_len = *offset;
            self.entries.truncate(index);
        }
    }

    /// Update every entry in place (widths must be preserved)
    pub fn for_each_mut(&mut self, mut update: impl FnMut(&mut T)) {
        for (_, elem) in &mut self.entries {
            update(elem);
        }
    }

    pub fn iter(&self) -> OffsetVecIter<'_, T> {
        self.into_iter()
    }

    /// Iterate over just the entries
    pub fn values(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.entries.iter().map(|(_, elem)| elem)
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<A: Eq> Eq for OffsetVec<A> {}

impl<A: Width> Default for OffsetVec<A> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

impl<A: Width, const N: usize> From<[A; N]> for OffsetVec<A> {
    fn from(elems: [A; N]) -> Self {
        elems.into_iter().collect()
    }
}

pub enum OffsetResult<'a, T> {
    /// Element was accessed
    Ok(usize, &'a T),

    /// Offset was invalid, and falls in the middle of the element at this index
    InvalidOffset(usize),

    /// Width is incompatible (only occurs when trying to set an element)
    IncompatibleWidth(usize, usize),

    /// Offset is too big
    TooLarge,
}

impl<'a, T> OffsetResult<'a, T> {
    /// Convert to an `Option` and keep only the value found
    pub fn ok(&self) -> Option<&'a T> {
        match self {
            OffsetResult::Ok(_, found) => Some(found),
            OffsetResult::InvalidOffset(_)
            | OffsetResult::TooLarge
            | OffsetResult::IncompatibleWidth(_, _) => None,
        }
    }
}

/// Iterator for owned `OffsetVec`
pub struct OffsetVecIntoIter<T>(Enumerate<VecIntoIter<(Offset, T)>>);

impl<T> Iterator for OffsetVecIntoIter<T> {
    type Item = (Offset, usize, T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(idx, (off, elem))| (off, idx, elem))
    }
}

impl<T> DoubleEndedIterator for OffsetVecIntoIter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0
            .next_back()
            .map(|(idx, (off, elem))| (off, idx, elem))
    }
}

impl<T> IntoIterator for OffsetVec<T> {
    type Item = (Offset, usize, T);
    type IntoIter = OffsetVecIntoIter<T>;

    fn into_iter(self) -> OffsetVecIntoIter<T> {
        OffsetVecIntoIter(self.entries.into_iter().enumerate())
    }
}

/// Iterator for borrowed `OffsetVec`
pub struct OffsetVecIter<'a, T>(Enumerate<Iter<'a, (Offset, T)>>);

impl<'a, T> Iterator for OffsetVecIter<'a, T> {
    type Item = (Offset, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(idx, (off, elem))| (*off, idx, elem))
    }
}

impl<'a, T> DoubleEndedIterator for OffsetVecIter<'a, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0
            .next_back()
            .map(|(idx, (off, elem))| (*off, idx, elem))
    }
}

impl<'a, T> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, usize, &'a T);
    type IntoIter = OffsetVecIter<'a, T>;

    fn into_iter(self) -> OffsetVecIter<'a, T> {
        OffsetVecIter(self.entries.iter().enumerate())
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut offset_vec = OffsetVec::new();
        offset_vec.extend(elems);
        offset_vec
    }
}

impl<T: Width> Extend<T> for OffsetVec<T> {
    fn extend<U: IntoIterator<Item = T>>(&mut self, iter: U) {
        for elem in iter {
            self.push(elem);
        }
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Slot {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Slot {
        fn width(&self) -> usize {
            match self {
                Slot::Narrow(_) => 1,
                Slot::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_account_for_width() {
        let slots = OffsetVec::from([Slot::Narrow(1), Slot::Wide(2), Slot::Narrow(3)]);
        assert_eq!(
            slots.iter().map(|(off, idx, _)| (off, idx)).collect::<Vec<_>>(),
            vec![(Offset(0), 0), (Offset(1), 1), (Offset(3), 2)]
        );
        assert_eq!(slots.offset_len(), Offset(4));
    }

    #[test]
    fn second_half_of_wide_entry_is_not_addressable() {
        let slots = OffsetVec::from([Slot::Wide(1), Slot::Narrow(2)]);
        assert_eq!(slots.get_offset(Offset(0)).ok(), Some(&Slot::Wide(1)));
        assert!(matches!(
            slots.get_offset(Offset(1)),
            OffsetResult::InvalidOffset(1)
        ));
        assert_eq!(slots.get_offset(Offset(2)).ok(), Some(&Slot::Narrow(2)));
        assert!(matches!(slots.get_offset(Offset(3)), OffsetResult::TooLarge));
    }

    #[test]
    fn set_offset_preserves_width() {
        let mut slots = OffsetVec::from([Slot::Wide(1), Slot::Narrow(2)]);
        assert!(matches!(
            slots.set_offset(Offset(0), Slot::Narrow(9)),
            OffsetResult::IncompatibleWidth(1, 2)
        ));
        assert!(slots.set_offset(Offset(0), Slot::Wide(9)).ok().is_some());
        assert!(slots.set_offset(Offset(3), Slot::Narrow(4)).ok().is_some());
        assert_eq!(slots.len(), 3);
        assert_eq!(slots.offset_len(), Offset(4));
    }

    #[test]
    fn pop_and_truncate_rewind_offset() {
        let mut slots = OffsetVec::from([Slot::Narrow(1), Slot::Wide(2), Slot::Wide(3)]);
        assert_eq!(slots.pop(), Some((Offset(3), 2, Slot::Wide(3))));
        assert_eq!(slots.offset_len(), Offset(3));
        slots.truncate(1);
        assert_eq!(slots.offset_len(), Offset(1));
        assert_eq!(slots.last(), Some(&Slot::Narrow(1)));
    }

    #[test]
    fn pool_style_vectors_start_at_one() {
        let mut pool: OffsetVec<Slot> = OffsetVec::new_starting_at(Offset(1));
        assert_eq!(pool.push(Slot::Wide(1)), Offset(1));
        assert_eq!(pool.push(Slot::Narrow(2)), Offset(3));
        pool.clear();
        assert_eq!(pool.offset_len(), Offset(1));
    }
}
