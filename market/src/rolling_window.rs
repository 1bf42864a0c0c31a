/// Fixed-capacity history of `f64` samples.
///
/// Backed by a ring buffer allocated once at construction. Pushing onto a full
/// window evicts the oldest sample. Reads are addressed by offset from the
/// most recent sample (`0` = newest).
#[derive(Clone, Debug, PartialEq)]
pub struct RollingWindow {
    /// Ring storage; `capacity` slots, never reallocated.
    buf: Box<[f64]>,

    /// Slot the next push writes to.
    head: usize,

    /// Number of live samples (`<= capacity`).
    len: usize,
}

impl RollingWindow {
    /// Empty window holding at most `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Full window of `capacity` zeros.
    pub fn zeroed(capacity: usize) -> Self {
        let mut window = Self::with_capacity(capacity);
        window.clear_zeroed();
        window
    }

    pub fn push(&mut self, value: f64) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }

        self.buf[self.head] = value;
        self.head = (self.head + 1) % capacity;

        if self.len < capacity {
            self.len += 1;
        }
    }

    /// Sample `offset` steps back from the most recent one.
    ///
    /// Callers must only ask for `offset < len()`. An out-of-range offset
    /// trips a debug assertion and otherwise reads a stale slot.
    pub fn at(&self, offset: usize) -> f64 {
        debug_assert!(
            offset < self.len,
            "offset {offset} out of range for window of length {}",
            self.len
        );
        self.buf[self.slot(offset)]
    }

    /// Checked variant of [`RollingWindow::at`].
    pub fn get(&self, offset: usize) -> Option<f64> {
        (offset < self.len).then(|| self.buf[self.slot(offset)])
    }

    pub fn latest(&self) -> Option<f64> {
        self.get(0)
    }

    /// Oldest sample still held by the window.
    pub fn oldest(&self) -> Option<f64> {
        self.len.checked_sub(1).and_then(|offset| self.get(offset))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Drop every sample. Storage is zeroed so cleared windows compare equal.
    pub fn clear(&mut self) {
        self.buf.fill(0.0);
        self.head = 0;
        self.len = 0;
    }

    /// Refill with `capacity` zeros.
    pub fn clear_zeroed(&mut self) {
        self.clear();
        self.len = self.capacity();
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).rev().map(|offset| self.buf[self.slot(offset)])
    }

    fn slot(&self, offset: usize) -> usize {
        let capacity = self.capacity();
        // head points one past the newest sample
        (self.head + capacity - 1 - offset % capacity) % capacity
    }
}
