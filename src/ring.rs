/// Bounded hand-off ring between one feed and one worker
///
/// Slots are pre-allocated at construction and overwritten in place; capacity
/// is a power of two so cursors wrap with a mask. `push` blocks while the
/// ring is full and `pop` blocks while it is empty, so a slow consumer
/// applies backpressure instead of losing updates. `halt` wakes both sides
/// and ends all traffic; anything still buffered at that point is abandoned.

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("ring is halted")]
pub struct RingHalted;

struct Slots<T> {
    cells: Box<[T]>,
    head: u64, // next slot to pop
    tail: u64, // next slot to push
    halted: bool,
}

pub struct RingBuffer<T> {
    slots: Mutex<Slots<T>>,
    index_mask: usize,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "capacity must be a power of two");

        let cells: Vec<T> = (0..capacity).map(|_| T::default()).collect();
        RingBuffer {
            slots: Mutex::new(Slots {
                cells: cells.into_boxed_slice(),
                head: 0,
                tail: 0,
                halted: false,
            }),
            index_mask: capacity - 1,
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Copy one item into the next free slot, blocking while the ring is full
    pub fn push(&self, item: T) -> Result<(), RingHalted> {
        let mut slots = self.slots.lock();
        loop {
            if slots.halted {
                return Err(RingHalted);
            }
            if slots.tail - slots.head < self.capacity as u64 {
                break;
            }
            self.not_full.wait(&mut slots);
        }

        let at = (slots.tail as usize) & self.index_mask;
        slots.cells[at] = item;
        slots.tail += 1;
        drop(slots);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Take the oldest item, blocking while the ring is empty
    ///
    /// Returns None once the ring is halted, even if items remain buffered.
    pub fn pop(&self) -> Option<T> {
        let mut slots = self.slots.lock();
        loop {
            if slots.halted {
                return None;
            }
            if slots.head < slots.tail {
                break;
            }
            self.not_empty.wait(&mut slots);
        }

        let at = (slots.head as usize) & self.index_mask;
        let item = slots.cells[at];
        slots.head += 1;
        drop(slots);

        self.not_full.notify_one();
        Some(item)
    }

    /// Wake both sides and refuse all further traffic. Idempotent.
    pub fn halt(&self) {
        let mut slots = self.slots.lock();
        slots.halted = true;
        drop(slots);

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_halted(&self) -> bool {
        self.slots.lock().halted
    }

    /// Items currently buffered
    pub fn len(&self) -> usize {
        let slots = self.slots.lock();
        (slots.tail - slots.head) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
