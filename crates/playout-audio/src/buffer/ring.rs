//! Lock-free ring buffer for audio streaming.
//!
//! This buffer is designed for single-producer, single-consumer scenarios
//! where a decode thread fills slots and an audio callback drains them.
//! Splitting it yields exactly one [`Producer`] and one [`Consumer`], neither
//! of which can be cloned, so the SPSC contract is enforced by the types.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use playout_core::{Error, Result};

/// Lock-free single-producer, single-consumer ring buffer of slots.
///
/// Designed for real-time audio where allocations in the hot path are forbidden.
/// The read and write positions are monotonic counters; the slot index is the
/// position masked by `capacity - 1`, and `write_pos - read_pos` is the number
/// of filled slots.
pub struct RingBuffer<T> {
    /// The underlying slot storage.
    slots: Box<[UnsafeCell<T>]>,
    /// Total slots consumed so far.
    read_pos: AtomicUsize,
    /// Total slots published so far.
    write_pos: AtomicUsize,
    /// Buffer capacity (power of 2 for efficient modulo).
    capacity: usize,
    /// Mask for efficient modulo (capacity - 1).
    mask: usize,
}

impl<T: Default> RingBuffer<T> {
    /// Create a new ring buffer with the specified capacity.
    ///
    /// The capacity will be rounded up to the next power of 2. Allocation is
    /// fallible: an impossible size is reported instead of aborting.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Resource(
                "ring buffer capacity must be non-zero".to_string(),
            ));
        }
        let capacity = capacity.checked_next_power_of_two().ok_or_else(|| {
            Error::Resource(format!("ring buffer capacity {capacity} is too large"))
        })?;

        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|e| {
            Error::Resource(format!("Failed to allocate {capacity} ring slots: {e}"))
        })?;
        slots.resize_with(capacity, || UnsafeCell::new(T::default()));

        Ok(Self {
            slots: slots.into_boxed_slice(),
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        })
    }
}

impl<T> RingBuffer<T> {
    /// Split into the producer and consumer halves.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let ring = Arc::new(self);
        (
            Producer {
                ring: Arc::clone(&ring),
            },
            Consumer { ring },
        )
    }

    /// Get the buffer capacity in slots.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of slots available for reading.
    pub fn read_available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Get the number of free slots for writing.
    pub fn write_available(&self) -> usize {
        self.capacity - self.read_available()
    }

    /// Base pointer of the slot storage.
    fn base(&self) -> *mut T {
        // UnsafeCell<T> is repr(transparent), so the slots are a contiguous [T].
        UnsafeCell::raw_get(self.slots.as_ptr())
    }

    /// Split `count` slots starting at position `pos` into the contiguous run
    /// up to the end of storage and the wrapped remainder.
    const fn runs(&self, pos: usize, count: usize) -> (usize, usize, usize) {
        let start = pos & self.mask;
        let first = if count < self.capacity - start {
            count
        } else {
            self.capacity - start
        };
        (start, first, count - first)
    }
}

// SAFETY: RingBuffer is safe to share between threads (Send + Sync).
// Only the Producer touches slots in [write_pos, read_pos + capacity) and only
// the Consumer touches slots in [read_pos, write_pos). The Release stores and
// Acquire loads of the two positions hand each slot from one side to the other,
// so no slot is ever accessed by both at once.
#[allow(unsafe_code)]
unsafe impl<T: Send> Send for RingBuffer<T> {}
#[allow(unsafe_code)]
unsafe impl<T: Send> Sync for RingBuffer<T> {}

/// Writing half of a [`RingBuffer`].
pub struct Producer<T> {
    ring: Arc<RingBuffer<T>>,
}

impl<T> Producer<T> {
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }

    /// Number of slots that can be written right now.
    pub fn write_available(&self) -> usize {
        self.ring.write_available()
    }

    /// Number of published slots the consumer has not released yet.
    pub fn read_available(&self) -> usize {
        self.ring.read_available()
    }

    /// Borrow up to `count` writable slots.
    ///
    /// The second slice is non-empty only when the region wraps around the
    /// end of storage. Nothing is visible to the consumer until
    /// [`Producer::advance_write`] publishes it.
    pub fn write_regions(&mut self, count: usize) -> (&mut [T], &mut [T]) {
        let write_pos = self.ring.write_pos.load(Ordering::Relaxed);
        let count = count.min(self.ring.write_available());
        let (start, first, second) = self.ring.runs(write_pos, count);
        let base = self.ring.base();

        // SAFETY: We're the only writer, the slots in this range are free
        // (the Acquire load in write_available saw the consumer release them),
        // and the two runs are disjoint and within bounds.
        #[allow(unsafe_code)]
        unsafe {
            (
                std::slice::from_raw_parts_mut(base.add(start), first),
                std::slice::from_raw_parts_mut(base, second),
            )
        }
    }

    /// Publish `count` slots to the consumer.
    ///
    /// Returns the number actually published, which is clamped to
    /// [`Producer::write_available`].
    pub fn advance_write(&mut self, count: usize) -> usize {
        let count = count.min(self.ring.write_available());
        let write_pos = self.ring.write_pos.load(Ordering::Relaxed);
        self.ring
            .write_pos
            .store(write_pos.wrapping_add(count), Ordering::Release);
        count
    }
}

/// Reading half of a [`RingBuffer`].
pub struct Consumer<T> {
    ring: Arc<RingBuffer<T>>,
}

impl<T> Consumer<T> {
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }

    /// Number of filled slots ready to read.
    pub fn read_available(&self) -> usize {
        self.ring.read_available()
    }

    /// Number of free slots the producer may fill.
    pub fn write_available(&self) -> usize {
        self.ring.write_available()
    }

    /// Borrow up to `count` readable slots, oldest first.
    ///
    /// The second slice is non-empty only when the region wraps around the
    /// end of storage. Slots stay owned by the consumer until
    /// [`Consumer::advance_read`] releases them.
    pub fn read_regions(&mut self, count: usize) -> (&[T], &[T]) {
        let read_pos = self.ring.read_pos.load(Ordering::Relaxed);
        let count = count.min(self.ring.read_available());
        let (start, first, second) = self.ring.runs(read_pos, count);
        let base = self.ring.base();

        // SAFETY: We're the only reader, the slots in this range were
        // published (the Acquire load in read_available saw the producer's
        // Release store) and the producer won't touch them until released.
        #[allow(unsafe_code)]
        unsafe {
            (
                std::slice::from_raw_parts(base.add(start), first),
                std::slice::from_raw_parts(base, second),
            )
        }
    }

    /// Release `count` slots back to the producer.
    ///
    /// Returns the number actually released, which is clamped to
    /// [`Consumer::read_available`].
    pub fn advance_read(&mut self, count: usize) -> usize {
        let count = count.min(self.ring.read_available());
        let read_pos = self.ring.read_pos.load(Ordering::Relaxed);
        self.ring
            .read_pos
            .store(read_pos.wrapping_add(count), Ordering::Release);
        count
    }

    /// Discard everything queued.
    ///
    /// Only call this once the producer has stopped; a concurrent producer
    /// would race the flush and leave freshly published slots behind.
    pub fn flush(&mut self) -> usize {
        let write_pos = self.ring.write_pos.load(Ordering::Acquire);
        let read_pos = self.ring.read_pos.load(Ordering::Relaxed);
        self.ring.read_pos.store(write_pos, Ordering::Release);
        write_pos.wrapping_sub(read_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn push(producer: &mut Producer<u64>, values: &[u64]) -> usize {
        let (first, second) = producer.write_regions(values.len());
        let written = first.len() + second.len();
        for (slot, value) in first.iter_mut().chain(second.iter_mut()).zip(values) {
            *slot = *value;
        }
        producer.advance_write(written)
    }

    fn pop(consumer: &mut Consumer<u64>, count: usize) -> Vec<u64> {
        let (first, second) = consumer.read_regions(count);
        let values: Vec<u64> = first.iter().chain(second).copied().collect();
        consumer.advance_read(values.len());
        values
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        let ring = RingBuffer::<u64>::with_capacity(20).unwrap();
        assert_eq!(ring.capacity(), 32);
        assert_eq!(ring.write_available(), 32);
        assert_eq!(ring.read_available(), 0);
        assert!(RingBuffer::<u64>::with_capacity(0).is_err());
        assert!(RingBuffer::<u64>::with_capacity(usize::MAX).is_err());
    }

    #[test]
    fn test_basic_write_read() {
        let (mut producer, mut consumer) = RingBuffer::with_capacity(8).unwrap().split();

        assert_eq!(push(&mut producer, &[1, 2, 3, 4, 5]), 5);
        assert_eq!(consumer.read_available(), 5);
        assert_eq!(producer.write_available(), 3);

        assert_eq!(pop(&mut consumer, 5), vec![1, 2, 3, 4, 5]);
        assert_eq!(consumer.read_available(), 0);
    }

    #[test]
    fn test_wraparound() {
        let (mut producer, mut consumer) = RingBuffer::with_capacity(8).unwrap().split();

        // Fill most of the buffer
        assert_eq!(push(&mut producer, &[1; 6]), 6);

        // Read some
        assert_eq!(pop(&mut consumer, 4), vec![1; 4]);

        // Write more (should wrap around)
        {
            let (first, second) = producer.write_regions(5);
            assert_eq!(first.len(), 2);
            assert_eq!(second.len(), 3);
        }
        assert_eq!(push(&mut producer, &[2; 5]), 5);

        // Read everything
        let (first, second) = consumer.read_regions(7);
        assert_eq!(first, &[1, 1, 2, 2]);
        assert_eq!(second, &[2, 2, 2]);
    }

    #[test]
    fn test_full_buffer() {
        let (mut producer, mut consumer) = RingBuffer::with_capacity(4).unwrap().split();

        assert_eq!(push(&mut producer, &[1; 4]), 4);
        assert_eq!(producer.write_available(), 0);

        // Should not be able to write more
        assert_eq!(push(&mut producer, &[2]), 0);
        assert_eq!(producer.advance_write(1), 0);

        // Read one, then we can write one
        pop(&mut consumer, 1);
        assert_eq!(push(&mut producer, &[2]), 1);
    }

    #[test]
    fn test_advance_read_is_clamped() {
        let (mut producer, mut consumer) = RingBuffer::with_capacity(4).unwrap().split();
        push(&mut producer, &[7, 8]);
        assert_eq!(consumer.advance_read(10), 2);
        assert_eq!(consumer.read_available(), 0);
        assert_eq!(producer.write_available(), 4);
    }

    #[test]
    fn test_flush() {
        let (mut producer, mut consumer) = RingBuffer::with_capacity(16).unwrap().split();

        push(&mut producer, &[1; 10]);
        assert_eq!(consumer.read_available(), 10);

        assert_eq!(consumer.flush(), 10);
        assert_eq!(consumer.read_available(), 0);
        assert_eq!(producer.write_available(), 16);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        const TOTAL: u64 = 10_000;
        let (mut producer, mut consumer) = RingBuffer::with_capacity(64).unwrap().split();

        let writer = thread::spawn(move || {
            let mut next = 0;
            while next < TOTAL {
                let (first, second) = producer.write_regions(16);
                let mut written = 0;
                for slot in first.iter_mut().chain(second.iter_mut()) {
                    if next + written >= TOTAL {
                        break;
                    }
                    *slot = next + written;
                    written += 1;
                }
                producer.advance_write(written as usize);
                next += written;
                if written == 0 {
                    thread::yield_now();
                }
            }
        });

        let reader = thread::spawn(move || {
            let mut expected = 0;
            while expected < TOTAL {
                let values = pop(&mut consumer, 16);
                for value in &values {
                    assert_eq!(*value, expected);
                    expected += 1;
                }
                if values.is_empty() {
                    thread::yield_now();
                }
            }
            expected
        });

        writer.join().unwrap();
        assert_eq!(reader.join().unwrap(), TOTAL);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(usize),
        Pop(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![(0usize..12).prop_map(Op::Push), (0usize..12).prop_map(Op::Pop)]
    }

    proptest! {
        #[test]
        fn test_fifo_and_accounting(capacity in 1usize..33, ops in prop::collection::vec(op(), 0..200)) {
            let (mut producer, mut consumer) = RingBuffer::with_capacity(capacity).unwrap().split();
            let capacity = producer.capacity();
            let mut model = std::collections::VecDeque::new();
            let mut next = 0u64;

            for op in ops {
                match op {
                    Op::Push(n) => {
                        let values: Vec<u64> = (next..next + n as u64).collect();
                        let written = push(&mut producer, &values);
                        prop_assert_eq!(written, n.min(capacity - model.len()));
                        model.extend(&values[..written]);
                        next += written as u64;
                    }
                    Op::Pop(n) => {
                        let values = pop(&mut consumer, n);
                        let expected: Vec<u64> = model.drain(..n.min(model.len())).collect();
                        prop_assert_eq!(values, expected);
                    }
                }
                prop_assert_eq!(consumer.read_available() + producer.write_available(), capacity);
                prop_assert_eq!(consumer.read_available(), model.len());
            }
        }
    }
}
