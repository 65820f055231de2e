use crate::models::{Batch, RawSample, BATCH_SIZE};

/// In-memory buffer that groups samples into transmission batches.
#[derive(Debug)]
pub struct BatchAccumulator {
    buffer: Vec<RawSample>,
    capacity: usize,
}

impl Default for BatchAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchAccumulator {
    pub fn new() -> Self {
        Self::with_capacity(BATCH_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Buffers `sample` and reports whether a full batch is ready.
    ///
    /// A sample whose timestamp is already buffered replaces the buffered one
    /// in place, so a batch never carries the same timestamp twice.
    pub fn push(&mut self, sample: RawSample) -> bool {
        match self
            .buffer
            .iter_mut()
            .find(|buffered| buffered.timestamp == sample.timestamp)
        {
            Some(buffered) => *buffered = sample,
            None => self.buffer.push(sample),
        }
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Moves the buffered samples out as a batch, leaving the buffer empty.
    /// Returns `None` when nothing is buffered.
    pub fn take_batch(&mut self) -> Option<Batch> {
        if self.buffer.is_empty() {
            return None;
        }
        let samples = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        Some(Batch::new(samples))
    }
}
