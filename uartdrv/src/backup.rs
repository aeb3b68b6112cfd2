/// Fixed-capacity FIFO of single bytes, used only while the shared ring is
/// saturated.
///
/// The byte-at-a-time interface keeps the worst case per operation constant;
/// throughput does not matter on this path.
pub struct BackupQueue {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
}

impl BackupQueue {
    pub fn new(capacity: usize) -> Self {
        BackupQueue {
            buf: vec![0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    /// Appends `byte`, or returns `false` if the queue is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        let tail = (self.head + self.len) % self.buf.len();
        self.buf[tail] = byte;
        self.len += 1;
        true
    }

    pub fn pop(&mut self) -> Option<u8> {
        let byte = self.peek_front()?;
        self.head = (self.head + 1) % self.buf.len();
        self.len -= 1;
        Some(byte)
    }

    pub fn peek_front(&self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.buf[self.head])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    fn test_fifo_order_across_wrap() {
        let mut queue = BackupQueue::new(3);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert_eq!(queue.pop(), Some(1));
        assert!(queue.push(3));
        assert!(queue.push(4));
        assert!(queue.is_full());

        assert_eq!(queue.peek_front(), Some(2));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    #[case(17)]
    fn test_push_fails_only_when_full(#[case] capacity: usize) {
        let mut queue = BackupQueue::new(capacity);
        for i in 0..capacity {
            assert!(queue.push(i as u8));
            assert_eq!(queue.len(), i + 1);
        }
        assert!(!queue.push(0xff));
        assert_eq!(queue.len(), capacity);
        assert_eq!(queue.peek_front(), Some(0));
    }

    #[rstest]
    fn test_zero_capacity_is_always_full() {
        let mut queue = BackupQueue::new(0);
        assert!(queue.is_empty());
        assert!(queue.is_full());
        assert!(!queue.push(1));
        assert_eq!(queue.pop(), None);
    }
}
