use crate::types::EventPayload;
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::trace;

/// Pending payloads awaiting delivery, in insertion order.
///
/// The queue is bounded only by memory; callers that need a bound use
/// [`EventQueue::trim_oldest`].
#[derive(Debug, Default)]
pub struct EventQueue {
    items: Mutex<VecDeque<EventPayload>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<EventPayload>> {
        // Every critical section leaves the deque consistent, so a poisoned
        // lock still guards valid data
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, payload: EventPayload) {
        self.lock().push_back(payload);
    }

    /// Puts previously drained payloads back at the end of the queue.
    pub fn requeue<I: IntoIterator<Item = EventPayload>>(&self, payloads: I) {
        let mut items = self.lock();
        let before = items.len();
        items.extend(payloads);
        trace!(requeued = items.len() - before, pending = items.len(), "Requeued payloads");
    }

    /// Takes the current contents of the queue, to be read back as chunks of
    /// at most `max_chunk_size` payloads.
    ///
    /// The queue is empty once this returns. Chunks that are never read are
    /// returned to the front of the queue when the [`DrainChunks`] is dropped.
    pub fn drain_chunks(&self, max_chunk_size: usize) -> DrainChunks<'_> {
        let pending = std::mem::take(&mut *self.lock());
        DrainChunks {
            queue: self,
            pending,
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    /// Drops the oldest payloads until at most `max_len` remain, returning how
    /// many were dropped.
    pub fn trim_oldest(&self, max_len: usize) -> usize {
        let mut items = self.lock();
        let excess = items.len().saturating_sub(max_len);
        items.drain(..excess);
        excess
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Iterator over the chunks taken out of an [`EventQueue`].
#[derive(Debug)]
pub struct DrainChunks<'a> {
    queue: &'a EventQueue,
    pending: VecDeque<EventPayload>,
    max_chunk_size: usize,
}

impl DrainChunks<'_> {
    /// Number of payloads not yet read out as chunks.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Iterator for DrainChunks<'_> {
    type Item = Vec<EventPayload>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_empty() {
            return None;
        }
        let n = self.max_chunk_size.min(self.pending.len());
        Some(self.pending.drain(..n).collect())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let chunks = self.pending.len().div_ceil(self.max_chunk_size);
        (chunks, Some(chunks))
    }
}

impl ExactSizeIterator for DrainChunks<'_> {}

impl Drop for DrainChunks<'_> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut items = self.queue.lock();
        while let Some(p) = self.pending.pop_back() {
            items.push_front(p);
        }
    }
}
