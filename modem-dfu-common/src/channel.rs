// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bounded record channel between the receive context and the dispatcher.
//!
//! The producer side never blocks: when [`CHANNEL_CAPACITY`] records are
//! pending the newest record is dropped and counted. The consumer side blocks
//! until a record arrives or the producer closes the channel.
//!
//! Storage is a lock-free single-producer/single-consumer queue. How the
//! consumer sleeps depends on the build:
//! - `std`: the consumer parks its thread, the producer unparks it
//! - `embedded`: the consumer waits with `wfe`, the producer signals with `sev`
//! - otherwise: the consumer spins

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use heapless::spsc::{Consumer, Producer, Queue};

use crate::dispatch::RecordSource;
use crate::record::{Record, CHANNEL_CAPACITY};

// spsc::Queue<T, N> holds N - 1 elements
const QUEUE_SLOTS: usize = CHANNEL_CAPACITY + 1;

pub struct RecordChannel {
    queue: Queue<Record, QUEUE_SLOTS>,
    dropped: AtomicU32,
    closed: AtomicBool,
    wake: Wake,
}

impl Default for RecordChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordChannel {
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
            dropped: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            wake: Wake::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        CHANNEL_CAPACITY
    }

    /// Records dropped because the channel was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Split into the producer and consumer halves.
    pub fn split(&mut self) -> (RecordSender<'_>, RecordReceiver<'_>) {
        self.closed.store(false, Ordering::Release);
        let (producer, consumer) = self.queue.split();
        (
            RecordSender {
                producer,
                dropped: &self.dropped,
                closed: &self.closed,
                wake: &self.wake,
            },
            RecordReceiver {
                consumer,
                dropped: &self.dropped,
                closed: &self.closed,
                wake: &self.wake,
            },
        )
    }
}

/// Producer half, owned by the receive context.
///
/// Dropping the sender closes the channel.
pub struct RecordSender<'a> {
    producer: Producer<'a, Record, QUEUE_SLOTS>,
    dropped: &'a AtomicU32,
    closed: &'a AtomicBool,
    wake: &'a Wake,
}

impl RecordSender<'_> {
    /// Queue a record without blocking.
    ///
    /// Returns `false` and discards `record` if the channel is full.
    pub fn try_enqueue(&mut self, record: Record) -> bool {
        match self.producer.enqueue(record) {
            Ok(()) => {
                self.wake.notify();
                true
            }
            Err(_) => {
                // Single producer: plain load/store keeps this usable on cores without CAS
                let dropped = self.dropped.load(Ordering::Relaxed);
                self.dropped.store(dropped.wrapping_add(1), Ordering::Relaxed);
                false
            }
        }
    }

    pub fn is_full(&self) -> bool {
        !self.producer.ready()
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop the consumer once it has drained the pending records.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.wake.notify();
    }
}

impl Drop for RecordSender<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Consumer half, owned by the dispatch context.
pub struct RecordReceiver<'a> {
    consumer: Consumer<'a, Record, QUEUE_SLOTS>,
    dropped: &'a AtomicU32,
    closed: &'a AtomicBool,
    wake: &'a Wake,
}

impl RecordReceiver<'_> {
    pub fn try_dequeue(&mut self) -> Option<Record> {
        self.consumer.dequeue()
    }

    /// Wait for the next record.
    ///
    /// Returns `None` once the channel is closed and empty.
    pub fn dequeue_blocking(&mut self) -> Option<Record> {
        self.wake.register();
        loop {
            if let Some(record) = self.consumer.dequeue() {
                return Some(record);
            }
            if self.closed.load(Ordering::Acquire) {
                // A record may have landed between the dequeue and the flag load
                return self.consumer.dequeue();
            }
            self.wake.wait();
        }
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.consumer.ready()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl RecordSource for RecordReceiver<'_> {
    fn next_record(&mut self) -> Option<Record> {
        self.dequeue_blocking()
    }
}

// --- Consumer wake-up ---

#[cfg(feature = "std")]
struct Wake {
    waiter: std::sync::Mutex<Option<std::thread::Thread>>,
}

#[cfg(feature = "std")]
impl Wake {
    const fn new() -> Self {
        Self {
            waiter: std::sync::Mutex::new(None),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<std::thread::Thread>> {
        self.waiter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the calling thread the one to wake. The receiver may move between
    /// threads, so this runs on every blocking dequeue.
    fn register(&self) {
        *self.slot() = Some(std::thread::current());
        // Pairs with the fence in notify: either the producer sees the waiter
        // or the consumer sees the record
        core::sync::atomic::fence(Ordering::SeqCst);
    }

    fn wait(&self) {
        std::thread::park();
    }

    fn notify(&self) {
        core::sync::atomic::fence(Ordering::SeqCst);
        if let Some(thread) = self.slot().as_ref() {
            thread.unpark();
        }
    }
}

#[cfg(all(not(feature = "std"), feature = "embedded"))]
struct Wake;

#[cfg(all(not(feature = "std"), feature = "embedded"))]
impl Wake {
    const fn new() -> Self {
        Self
    }

    fn register(&self) {}

    fn wait(&self) {
        cortex_m::asm::wfe();
    }

    fn notify(&self) {
        cortex_m::asm::sev();
    }
}

#[cfg(all(not(feature = "std"), not(feature = "embedded")))]
struct Wake;

#[cfg(all(not(feature = "std"), not(feature = "embedded")))]
impl Wake {
    const fn new() -> Self {
        Self
    }

    fn register(&self) {}

    fn wait(&self) {
        core::hint::spin_loop();
    }

    fn notify(&self) {}
}
