//! Splitting a tenant's row set into bounded batches.
//!
//! Batches exist only to keep `IN (...)` clauses and outbound payloads small.
//! A batch has no identity beyond its offset in the parent slice.

use crate::error::CoreError;

/// Default number of keys per `IN (...)` lookup.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// A contiguous sub-slice of a larger item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a, T> {
    /// Index of `items[0]` within the parent slice.
    pub offset: usize,
    pub items: &'a [T],
}

impl<T> Batch<'_, T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Exclusive end index within the parent slice.
    pub fn end(&self) -> usize {
        self.offset + self.items.len()
    }
}

/// Iterator over the batches of a slice. Created by [`batches`].
#[derive(Debug, Clone)]
pub struct Batches<'a, T> {
    items: &'a [T],
    size: usize,
    offset: usize,
}

impl<'a, T> Iterator for Batches<'a, T> {
    type Item = Batch<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.items.len() {
            return None;
        }
        let end = (self.offset + self.size).min(self.items.len());
        let batch = Batch {
            offset: self.offset,
            items: &self.items[self.offset..end],
        };
        self.offset = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.items.len().saturating_sub(self.offset);
        let n = remaining.div_ceil(self.size);
        (n, Some(n))
    }
}

impl<T> ExactSizeIterator for Batches<'_, T> {}

/// Split `items` into contiguous batches of at most `size` elements.
///
/// An empty slice yields no batches. A `size` of zero is rejected.
pub fn batches<T>(items: &[T], size: usize) -> Result<Batches<'_, T>, CoreError> {
    if size == 0 {
        return Err(CoreError::Validation(
            "Batch size must be at least 1".to_string(),
        ));
    }
    Ok(Batches {
        items,
        size,
        offset: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_rejected() {
        assert!(batches(&[1, 2, 3], 0).is_err());
    }

    #[test]
    fn empty_input_yields_nothing() {
        let items: [u8; 0] = [];
        assert_eq!(batches(&items, 10).unwrap().count(), 0);
    }

    #[test]
    fn last_batch_is_short() {
        let items: Vec<u32> = (0..7).collect();
        let got: Vec<(usize, Vec<u32>)> = batches(&items, 3)
            .unwrap()
            .map(|b| (b.offset, b.items.to_vec()))
            .collect();
        assert_eq!(
            got,
            vec![(0, vec![0, 1, 2]), (3, vec![3, 4, 5]), (6, vec![6])]
        );
    }

    #[test]
    fn batches_cover_every_item_once() {
        let items: Vec<u32> = (0..1234).collect();
        let it = batches(&items, DEFAULT_BATCH_SIZE).unwrap();
        assert_eq!(it.len(), 3);
        let mut next_offset = 0;
        for b in it {
            assert_eq!(b.offset, next_offset);
            assert!(b.len() <= DEFAULT_BATCH_SIZE);
            next_offset = b.end();
        }
        assert_eq!(next_offset, items.len());
    }
}
