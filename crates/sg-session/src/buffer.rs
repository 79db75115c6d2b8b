use std::collections::VecDeque;

/// Append-only output log with a bounded retention window and a delivery cursor.
///
/// Offsets are absolute byte positions since session creation. When the
/// retained size exceeds `capacity` the oldest bytes are discarded and the
/// cursor is clamped so it never points before the retained window.
#[derive(Debug)]
pub struct OutputBuffer {
    data: VecDeque<u8>,
    capacity: usize,
    /// Absolute offset of `data[0]`.
    start: u64,
    /// Absolute offset of the next byte to deliver.
    cursor: u64,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::new(),
            capacity: capacity.max(1),
            start: 0,
            cursor: 0,
        }
    }

    /// Append newly produced bytes, evicting from the front past capacity.
    pub fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.data.extend(bytes);
        let excess = self.data.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.data.drain(..excess);
            self.start += excess as u64;
        }
        if self.cursor < self.start {
            self.cursor = self.start;
        }
    }

    /// Return every retained byte past the cursor and advance the cursor to the end.
    pub fn take_unread(&mut self) -> Vec<u8> {
        let from = (self.cursor - self.start) as usize;
        let out: Vec<u8> = self.data.range(from..).copied().collect();
        self.cursor = self.end();
        out
    }

    /// The whole retained window, without moving the cursor.
    pub fn retained(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Total bytes ever pushed.
    pub fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    /// Bytes discarded by the retention bound.
    pub fn evicted(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
