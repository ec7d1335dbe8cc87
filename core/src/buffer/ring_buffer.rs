/// Default buffer capacity: 16 KiB.
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// Fixed-capacity circular byte buffer between a UART and its client.
///
/// When unread data would be overwritten, the read cursor is pushed
/// forward so it never lags behind lost bytes. Data loss is silent: the
/// buffer carries live serial output, not a log.
pub struct RingBuffer {
    data: Vec<u8>,
    /// Next index to write to.
    write_pos: usize,
    /// Next index to read from.
    read_pos: usize,
    /// Number of unread bytes. Needed because `read_pos == write_pos`
    /// holds both for an empty and for a completely full buffer.
    unread: usize,
    /// Set once the write cursor has completed a full lap.
    wrapped: bool,
}

impl RingBuffer {
    /// Create a new ring buffer with the given capacity in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            data: vec![0u8; capacity],
            write_pos: 0,
            read_pos: 0,
            unread: 0,
            wrapped: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes a `get` could currently return.
    pub fn len(&self) -> usize {
        self.unread
    }

    pub fn is_empty(&self) -> bool {
        self.unread == 0
    }

    pub fn has_data(&self) -> bool {
        self.unread > 0
    }

    /// Append data, overwriting the oldest bytes when full.
    pub fn put(&mut self, input: &[u8]) {
        if input.is_empty() {
            return;
        }
        let capacity = self.capacity();
        let end = self.write_pos + input.len();
        if end >= capacity {
            self.wrapped = true;
        }

        // Only the trailing `capacity` bytes can survive the write.
        let skipped = input.len().saturating_sub(capacity);
        let kept = &input[skipped..];
        let start = (self.write_pos + skipped) % capacity;
        self.copy_in(start, kept);

        self.write_pos = end % capacity;
        self.unread += input.len();
        if self.unread > capacity {
            self.unread = capacity;
            self.read_pos = self.write_pos;
        }
    }

    /// Take up to `max` of the oldest unread bytes.
    pub fn get(&mut self, max: usize) -> Vec<u8> {
        let count = max.min(self.unread);
        let mut out = Vec::with_capacity(count);
        if count == 0 {
            return out;
        }
        let capacity = self.capacity();
        let first = count.min(capacity - self.read_pos);
        out.extend_from_slice(&self.data[self.read_pos..self.read_pos + first]);
        out.extend_from_slice(&self.data[..count - first]);

        self.read_pos = (self.read_pos + count) % capacity;
        self.unread -= count;
        out
    }

    /// Make the next `get` start from the most recent full window.
    ///
    /// After at least one lap that is the last `capacity` bytes written;
    /// before the first lap it is everything written so far.
    pub fn rewind(&mut self) {
        if self.wrapped {
            self.read_pos = self.write_pos;
            self.unread = self.capacity();
        } else {
            self.read_pos = 0;
            self.unread = self.write_pos;
        }
    }

    fn copy_in(&mut self, start: usize, bytes: &[u8]) {
        let first = bytes.len().min(self.capacity() - start);
        self.data[start..start + first].copy_from_slice(&bytes[..first]);
        let rest = &bytes[first..];
        self.data[..rest.len()].copy_from_slice(rest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn put_and_get_small() {
        let mut rb = RingBuffer::new(64);
        rb.put(b"hello");
        assert!(rb.has_data());
        assert_eq!(rb.len(), 5);
        assert_eq!(rb.get(64), b"hello");
        assert!(!rb.has_data());
    }

    #[test]
    fn get_returns_at_most_max() {
        let mut rb = RingBuffer::new(16);
        rb.put(b"abcdefgh");
        assert_eq!(rb.get(3), b"abc");
        assert_eq!(rb.get(3), b"def");
        assert_eq!(rb.get(3), b"gh");
        assert!(rb.get(3).is_empty());
    }

    #[test]
    fn empty_buffer() {
        let mut rb = RingBuffer::new(64);
        assert!(rb.is_empty());
        assert!(!rb.has_data());
        assert!(rb.get(10).is_empty());
    }

    #[test]
    fn fill_exactly_keeps_everything() {
        let mut rb = RingBuffer::new(8);
        rb.put(b"12345678");
        assert!(rb.has_data());
        assert_eq!(rb.len(), 8);
        assert_eq!(rb.get(8), b"12345678");
    }

    #[test]
    fn overflow_discards_oldest() {
        let mut rb = RingBuffer::new(8);
        rb.put(b"ABCDEFGHIJKL");
        assert_eq!(rb.len(), 8);
        assert_eq!(rb.get(100), b"EFGHIJKL");
    }

    #[test]
    fn overflow_across_partial_read() {
        let mut rb = RingBuffer::new(4);
        rb.put(b"abc");
        assert_eq!(rb.get(1), b"a");
        // "bc" unread, then three more bytes push out "b"
        rb.put(b"def");
        assert_eq!(rb.get(10), b"cdef");
    }

    #[test]
    fn single_bytes_wrap_many_times() {
        let mut rb = RingBuffer::new(4);
        for i in 0u8..10 {
            rb.put(&[i]);
        }
        assert_eq!(rb.get(4), vec![6, 7, 8, 9]);
    }

    #[test]
    fn unread_never_exceeds_capacity() {
        let mut rb = RingBuffer::new(32);
        for len in [1usize, 7, 31, 32, 33, 100, 5] {
            rb.put(&pattern(len));
            assert!(rb.len() <= rb.capacity());
        }
    }

    #[test]
    fn rewind_before_first_lap_returns_all() {
        let mut rb = RingBuffer::new(16);
        rb.put(b"hello ");
        rb.put(b"world");
        assert_eq!(rb.get(100), b"hello world");
        rb.rewind();
        assert_eq!(rb.get(11), b"hello world");
    }

    #[test]
    fn rewind_after_lap_returns_last_window() {
        let mut rb = RingBuffer::new(8);
        rb.put(b"0123456789ABC");
        rb.get(3);
        rb.rewind();
        assert_eq!(rb.get(8), b"56789ABC");
        assert!(!rb.has_data());
    }

    #[test]
    fn rewind_on_exact_lap() {
        let mut rb = RingBuffer::new(4);
        rb.put(b"wxyz");
        rb.get(4);
        rb.rewind();
        assert_eq!(rb.get(4), b"wxyz");
    }

    #[test]
    fn rewind_twenty_kib_into_sixteen() {
        let mut rb = RingBuffer::new(DEFAULT_BUFFER_CAPACITY);
        let input = pattern(20 * 1024);
        for chunk in input.chunks(1000) {
            rb.put(chunk);
        }
        rb.rewind();

        let mut drained = Vec::new();
        while rb.has_data() {
            drained.extend(rb.get(4096));
        }
        assert_eq!(drained, &input[input.len() - DEFAULT_BUFFER_CAPACITY..]);
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        let _ = RingBuffer::new(0);
    }
}
