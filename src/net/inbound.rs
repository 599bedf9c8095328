//! Bounded FIFO buffer for bytes received from a peer.
//!
//! The receive loop is the only writer; callers drain it through `recv`.
//! Both sides go through the connection's lock, so this type itself is
//! plain single-threaded data.

use std::collections::VecDeque;

/// Returned when an append would push the buffer past its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub buffered: usize,
    pub incoming: usize,
    pub capacity: usize,
}

/// Bounded inbound byte queue.
#[derive(Debug)]
pub struct InboundBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl InboundBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::new(),
            capacity,
        }
    }

    /// Append a batch. The batch is rejected whole if it does not fit.
    pub fn append(&mut self, batch: &[u8]) -> Result<(), Overflow> {
        if self.bytes.len() + batch.len() > self.capacity {
            return Err(Overflow {
                buffered: self.bytes.len(),
                incoming: batch.len(),
                capacity: self.capacity,
            });
        }
        self.bytes.extend(batch);
        Ok(())
    }

    /// Move up to `out.len()` bytes into `out` in arrival order.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.bytes.len());
        let (front, back) = self.bytes.as_slices();
        let from_front = count.min(front.len());
        out[..from_front].copy_from_slice(&front[..from_front]);
        out[from_front..count].copy_from_slice(&back[..count - from_front]);
        self.bytes.drain(..count);
        count
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order_across_batches() {
        let mut buf = InboundBuffer::new(64);
        buf.append(b"hello ").unwrap();
        buf.append(b"world").unwrap();

        let mut out = [0u8; 4];
        assert_eq!(buf.drain_into(&mut out), 4);
        assert_eq!(&out, b"hell");

        let mut out = [0u8; 32];
        let n = buf.drain_into(&mut out);
        assert_eq!(&out[..n], b"o world");
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_handles_wrapped_storage() {
        let mut buf = InboundBuffer::new(8);
        buf.append(b"abcdef").unwrap();
        let mut out = [0u8; 5];
        buf.drain_into(&mut out);
        // Refill after a partial drain; storage may now wrap.
        buf.append(b"ghijk").unwrap();

        let mut out = [0u8; 8];
        let n = buf.drain_into(&mut out);
        assert_eq!(&out[..n], b"fghijk");
    }

    #[test]
    fn overflow_rejects_whole_batch() {
        let mut buf = InboundBuffer::new(10);
        buf.append(&[1; 8]).unwrap();

        let err = buf.append(&[2; 3]).unwrap_err();
        assert_eq!(
            err,
            Overflow {
                buffered: 8,
                incoming: 3,
                capacity: 10
            }
        );
        assert_eq!(buf.len(), 8);

        // Exactly reaching the bound is allowed.
        buf.append(&[3; 2]).unwrap();
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn empty_drain_returns_zero() {
        let mut buf = InboundBuffer::new(4);
        let mut out = [0u8; 4];
        assert_eq!(buf.drain_into(&mut out), 0);
    }
}
