//! Bounded batch walking over a paged source.
//!
//! The staged-import pattern appears twice -- once for the global catalog
//! build, once per entity reconciling its completion set -- with the same
//! loop shape: walk a potentially huge source one fixed-size batch per
//! tick, and bail out hard if the source never terminates. [`BatchWalker`]
//! is that loop, parameterized by a page fetcher and a per-item visitor.

/// One fetched page of a walk.
#[derive(Debug)]
pub struct Page<T> {
    /// Items in this page, at most the requested limit.
    pub items: Vec<T>,
    /// Whether the source is exhausted after this page.
    pub last: bool,
}

impl<T> Page<T> {
    /// A page known to be the final one.
    pub const fn last(items: Vec<T>) -> Self {
        Self { items, last: true }
    }
}

/// Outcome of one walk step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStatus {
    /// More batches remain; step again next tick.
    InProgress,
    /// The source was exhausted; the walk is complete.
    Finished,
    /// The hard processed-count ceiling was hit before the source ended.
    Overrun {
        /// Items processed before the walk was aborted.
        processed: usize,
    },
}

/// Cursor over a paged source, bounded per step and in total.
///
/// Each [`step`](Self::step) processes at most one batch; the ceiling
/// protects against a misbehaving enumeration that never terminates.
#[derive(Debug, Clone)]
pub struct BatchWalker {
    cursor: usize,
    batch_size: usize,
    ceiling: usize,
}

impl BatchWalker {
    /// Start a walk with the given per-step batch size and total ceiling.
    ///
    /// A zero batch size is treated as 1 so a walk always makes progress.
    pub const fn new(batch_size: usize, ceiling: usize) -> Self {
        Self {
            cursor: 0,
            batch_size: if batch_size == 0 { 1 } else { batch_size },
            ceiling,
        }
    }

    /// Items processed so far.
    pub const fn processed(&self) -> usize {
        self.cursor
    }

    /// Process one batch: fetch the next page and visit every item.
    ///
    /// `fetch` receives the current offset and the full batch size; it
    /// reports source exhaustion via [`Page::last`] or a short page. Items
    /// past the ceiling are never visited; a page that would carry the
    /// cursor past the ceiling aborts the walk, while a source that ends
    /// exactly at the ceiling still finishes. Once
    /// [`WalkStatus::Finished`] or an overrun is returned the walker
    /// should be discarded.
    pub fn step<T, F, V>(&mut self, fetch: F, mut visit: V) -> WalkStatus
    where
        F: FnOnce(usize, usize) -> Page<T>,
        V: FnMut(T),
    {
        let remaining = self.ceiling.saturating_sub(self.cursor);
        if remaining == 0 {
            return WalkStatus::Overrun {
                processed: self.cursor,
            };
        }

        let page = fetch(self.cursor, self.batch_size);
        let fetched = page.items.len().min(self.batch_size);
        let kept = fetched.min(remaining);
        for item in page.items.into_iter().take(kept) {
            visit(item);
        }
        self.cursor = self.cursor.saturating_add(kept);

        if fetched > remaining {
            return WalkStatus::Overrun {
                processed: self.cursor,
            };
        }
        if page.last || fetched == 0 {
            WalkStatus::Finished
        } else {
            WalkStatus::InProgress
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_from(source: &[u32], offset: usize, limit: usize) -> Page<u32> {
        let end = offset.saturating_add(limit).min(source.len());
        Page {
            items: source.get(offset..end).map(<[u32]>::to_vec).unwrap_or_default(),
            last: end >= source.len(),
        }
    }

    #[test]
    fn walks_in_fixed_batches() {
        let source: Vec<u32> = (0..10).collect();
        let mut walker = BatchWalker::new(4, 100);
        let mut seen = Vec::new();

        let s1 = walker.step(|o, l| page_from(&source, o, l), |i| seen.push(i));
        assert_eq!(s1, WalkStatus::InProgress);
        assert_eq!(seen.len(), 4);

        let s2 = walker.step(|o, l| page_from(&source, o, l), |i| seen.push(i));
        assert_eq!(s2, WalkStatus::InProgress);

        let s3 = walker.step(|o, l| page_from(&source, o, l), |i| seen.push(i));
        assert_eq!(s3, WalkStatus::Finished);
        assert_eq!(seen, source);
    }

    #[test]
    fn exact_multiple_finishes_on_final_batch() {
        let source: Vec<u32> = (0..8).collect();
        let mut walker = BatchWalker::new(4, 100);
        let mut count = 0_usize;

        assert_eq!(
            walker.step(|o, l| page_from(&source, o, l), |_| count = count.saturating_add(1)),
            WalkStatus::InProgress
        );
        assert_eq!(
            walker.step(|o, l| page_from(&source, o, l), |_| count = count.saturating_add(1)),
            WalkStatus::Finished
        );
        assert_eq!(count, 8);
    }

    // Paging like the catalog build's: exhaustion only shows as a page
    // shorter than the requested limit.
    fn short_page_from(total: usize, offset: usize, limit: usize) -> Page<u32> {
        let end = offset.saturating_add(limit).min(total);
        let items: Vec<u32> = (offset..end).map(|i| u32::try_from(i).unwrap_or(0)).collect();
        Page {
            last: items.len() < limit,
            items,
        }
    }

    #[test]
    fn source_ending_exactly_at_the_ceiling_finishes() {
        let mut walker = BatchWalker::new(4, 10);
        let mut seen = 0_usize;

        let mut status = WalkStatus::InProgress;
        while status == WalkStatus::InProgress {
            status = walker.step(
                |o, l| short_page_from(10, o, l),
                |_| seen = seen.saturating_add(1),
            );
        }
        assert_eq!(status, WalkStatus::Finished);
        assert_eq!(seen, 10);
        assert_eq!(walker.processed(), 10);
    }

    #[test]
    fn source_past_the_ceiling_aborts_mid_page() {
        let mut walker = BatchWalker::new(4, 10);
        let mut seen = 0_usize;

        let mut status = WalkStatus::InProgress;
        while status == WalkStatus::InProgress {
            status = walker.step(
                |o, l| short_page_from(11, o, l),
                |_| seen = seen.saturating_add(1),
            );
        }
        assert_eq!(status, WalkStatus::Overrun { processed: 10 });
        // Nothing past the ceiling was visited.
        assert_eq!(seen, 10);
    }

    #[test]
    fn ceiling_aborts_unbounded_source() {
        // A source that always has more.
        let mut walker = BatchWalker::new(50, 100);
        let endless = |_offset: usize, limit: usize| Page {
            items: vec![0_u32; limit],
            last: false,
        };

        assert_eq!(walker.step(endless, |_| {}), WalkStatus::InProgress);
        assert_eq!(walker.step(endless, |_| {}), WalkStatus::InProgress);
        assert_eq!(
            walker.step(endless, |_| {}),
            WalkStatus::Overrun { processed: 100 }
        );
    }

    #[test]
    fn oversized_page_is_clamped_to_the_batch() {
        let mut walker = BatchWalker::new(2, 100);
        let mut seen = 0_usize;
        let status = walker.step(
            |_, _| Page {
                items: vec![1_u32, 2, 3, 4],
                last: false,
            },
            |_| seen = seen.saturating_add(1),
        );
        assert_eq!(status, WalkStatus::InProgress);
        assert_eq!(seen, 2);
        assert_eq!(walker.processed(), 2);
    }

    #[test]
    fn empty_first_page_finishes_immediately() {
        let mut walker = BatchWalker::new(4, 100);
        let status = walker.step(
            |_, _| Page::<u32> {
                items: Vec::new(),
                last: false,
            },
            |_| {},
        );
        assert_eq!(status, WalkStatus::Finished);
    }
}
