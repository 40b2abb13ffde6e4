//! Lock-free single-producer/single-consumer ring bridging the interrupt
//! domain (producer) and the task domain (consumer).
//!
//! `put` and `get` are free-running `u16` counters; the slot index is the
//! counter masked by `N - 1`. With `N` a power of two, `put - get` computed
//! with wrapping arithmetic is the number of used slots even after the
//! counters themselves overflow.
//!
//! The producer writes a slot and then publishes it with a `Release` store
//! of `put`; the consumer loads `put` with `Acquire` before reading slots.
//! A full ring never overwrites: the item is dropped and the saturating
//! `lost` counter is incremented instead.
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// Fixed-capacity SPSC queue of `Copy` records.
pub struct SpscRing<T: Copy, const N: usize> {
    slots: [UnsafeCell<MaybeUninit<T>>; N],
    put: AtomicU16,
    get: AtomicU16,
    lost: AtomicU16,
    producer_taken: AtomicBool,
    consumer_taken: AtomicBool,
}

// Slots are only written by the single producer before publication and only
// read by the single consumer after observing the publication.
unsafe impl<T: Copy + Send, const N: usize> Sync for SpscRing<T, N> {}

impl<T: Copy, const N: usize> Default for SpscRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy, const N: usize> SpscRing<T, N> {
    const CAPACITY_OK: () = assert!(
        N.is_power_of_two() && N <= 1 << 15,
        "ring capacity must be a power of two not above 32768"
    );

    pub const fn new() -> Self {
        let () = Self::CAPACITY_OK;
        Self {
            slots: [const { UnsafeCell::new(MaybeUninit::uninit()) }; N],
            put: AtomicU16::new(0),
            get: AtomicU16::new(0),
            lost: AtomicU16::new(0),
            producer_taken: AtomicBool::new(false),
            consumer_taken: AtomicBool::new(false),
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Occupied slots as seen from any context.
    pub fn used(&self) -> usize {
        let put = self.put.load(Ordering::Acquire);
        let get = self.get.load(Ordering::Acquire);
        put.wrapping_sub(get) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    pub fn is_full(&self) -> bool {
        self.used() >= N
    }

    /// Items dropped on overflow since the last [`SpscRing::take_lost`].
    pub fn lost(&self) -> u16 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Read and clear the lost counter in one step.
    pub fn take_lost(&self) -> u16 {
        self.lost.swap(0, Ordering::AcqRel)
    }

    fn count_lost(&self) {
        let _ = self
            .lost
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |v| v.checked_add(1));
    }

    /// Claim the producing end. Returns `None` once claimed.
    pub fn producer(&self) -> Option<Producer<'_, T, N>> {
        if self.producer_taken.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Producer { ring: self })
        }
    }

    /// Claim the consuming end. Returns `None` once claimed.
    pub fn consumer(&self) -> Option<Consumer<'_, T, N>> {
        if self.consumer_taken.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Consumer { ring: self })
        }
    }

    #[inline]
    fn slot(&self, counter: u16) -> *mut MaybeUninit<T> {
        self.slots[counter as usize & (N - 1)].get()
    }
}

//==================================================================================PRODUCER
/// Writing end; owned by the interrupt-side poller.
pub struct Producer<'a, T: Copy, const N: usize> {
    ring: &'a SpscRing<T, N>,
}

impl<'a, T: Copy, const N: usize> Producer<'a, T, N> {
    /// Store and publish one item. On overflow the item is handed back and
    /// the lost counter is incremented.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        let mut batch = self.batch();
        batch.push(item)
    }

    /// Open a batch whose items are published together when it is dropped.
    pub fn batch(&mut self) -> Batch<'_, T, N> {
        let put = self.ring.put.load(Ordering::Relaxed);
        Batch {
            ring: self.ring,
            put,
        }
    }

    pub fn ring(&self) -> &'a SpscRing<T, N> {
        self.ring
    }
}

/// Pending writes of a producer. Slots are written immediately, the put
/// counter is advanced once, on drop.
pub struct Batch<'p, T: Copy, const N: usize> {
    ring: &'p SpscRing<T, N>,
    put: u16,
}

impl<T: Copy, const N: usize> Batch<'_, T, N> {
    pub fn push(&mut self, item: T) -> Result<(), T> {
        let get = self.ring.get.load(Ordering::Acquire);
        if self.put.wrapping_sub(get) as usize >= N {
            self.ring.count_lost();
            return Err(item);
        }
        // The slot at `put` is outside the consumer's visible range until
        // `put` is published.
        unsafe { (*self.ring.slot(self.put)).write(item) };
        self.put = self.put.wrapping_add(1);
        Ok(())
    }
}

impl<T: Copy, const N: usize> Drop for Batch<'_, T, N> {
    fn drop(&mut self) {
        self.ring.put.store(self.put, Ordering::Release);
    }
}

//==================================================================================CONSUMER
/// Reading end; owned by the bus event aggregator.
pub struct Consumer<'a, T: Copy, const N: usize> {
    ring: &'a SpscRing<T, N>,
}

impl<'a, T: Copy, const N: usize> Consumer<'a, T, N> {
    /// Copy of the oldest item without releasing its slot.
    pub fn peek(&self) -> Option<T> {
        let put = self.ring.put.load(Ordering::Acquire);
        let get = self.ring.get.load(Ordering::Relaxed);
        if put == get {
            return None;
        }
        // Published slots are never written again before `get` moves past them.
        Some(unsafe { (*self.ring.slot(get)).assume_init() })
    }

    /// Release the oldest slot. No-op on an empty ring.
    pub fn consume(&mut self) {
        let put = self.ring.put.load(Ordering::Acquire);
        let get = self.ring.get.load(Ordering::Relaxed);
        if put != get {
            self.ring.get.store(get.wrapping_add(1), Ordering::Release);
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        let item = self.peek()?;
        self.consume();
        Some(item)
    }

    /// Drop everything published so far.
    pub fn clear(&mut self) {
        let put = self.ring.put.load(Ordering::Acquire);
        self.ring.get.store(put, Ordering::Release);
    }

    pub fn ring(&self) -> &'a SpscRing<T, N> {
        self.ring
    }
}
