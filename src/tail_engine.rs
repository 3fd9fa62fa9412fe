use crate::log_entry::LogEntry;
use crate::types::{SeenSet, TailBuffer};

/// De-duplicating tail state for one session.
///
/// Pure state over a [`SeenSet`] and a [`TailBuffer`]; no I/O.
pub struct TailEngine {
    seen: SeenSet,
    buffer: TailBuffer,
}

impl TailEngine {
    pub fn new(max_lines: usize) -> Self {
        Self::with_seen(SeenSet::new(), max_lines)
    }

    pub fn with_seen(seen: SeenSet, max_lines: usize) -> Self {
        Self {
            seen,
            buffer: TailBuffer::new(max_lines),
        }
    }

    /// Yield the entries of `batch` that were never emitted before, in batch
    /// order.
    ///
    /// Evaluation is lazy: an entry is marked as seen and appended to the
    /// tail buffer only when the iterator hands it out, so dropping the
    /// iterator early leaves the remaining entries eligible for a later poll.
    pub fn absorb<I>(&mut self, batch: I) -> Absorb<'_, I::IntoIter>
    where
        I: IntoIterator<Item = LogEntry>,
    {
        Absorb {
            engine: self,
            batch: batch.into_iter(),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn buffer(&self) -> &TailBuffer {
        &self.buffer
    }

    fn admit(&mut self, entry: &LogEntry) -> bool {
        if !self.seen.insert(entry.identity_key()) {
            return false;
        }
        self.buffer.push(entry.render());
        true
    }
}

/// Iterator returned by [`TailEngine::absorb`].
pub struct Absorb<'a, I> {
    engine: &'a mut TailEngine,
    batch: I,
}

impl<I> Iterator for Absorb<'_, I>
where
    I: Iterator<Item = LogEntry>,
{
    type Item = LogEntry;

    fn next(&mut self) -> Option<LogEntry> {
        loop {
            let entry = self.batch.next()?;
            if self.engine.admit(&entry) {
                return Some(entry);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.batch.size_hint().1)
    }
}
