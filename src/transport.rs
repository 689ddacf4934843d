//! Byte-level I2C transaction framing
//!
//! `BusTransport` is the one contract every backend satisfies: transactions
//! are staged into an outbound buffer, committed as a single contiguous
//! write, and reads land in an inbound FIFO that is consumed byte by byte.
//! Which backend a deployment uses is decided at build time: `NativeBus`
//! on Linux, the CH341 bridge on Windows.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

/// Sentinel returned by `read_byte` when the inbound queue is empty.
///
/// Mirrors Arduino `Wire::read()` returning -1 cast to a byte; the register
/// drivers were written against that convention and rely on `request_read`'s
/// count for error detection instead.
pub const EMPTY_READ: u8 = 0xFF;

/// One contract for framing I2C transactions, regardless of backend.
pub trait BusTransport {
    /// Acquire the underlying bus resource. No automatic retry.
    fn open(&mut self) -> Result<()>;

    /// Release the resource. Safe to call on an already-closed transport.
    fn close(&mut self);

    /// Set the target device address and reset the outbound buffer.
    /// Does not touch the bus.
    fn begin_transaction(&mut self, address: u8);

    /// Append bytes to the outbound buffer without transmitting.
    fn queue_write(&mut self, bytes: &[u8]);

    /// Transmit the queued outbound buffer to the targeted address as one
    /// contiguous write.
    fn commit_write(&mut self) -> Result<()>;

    /// Read exactly `count` bytes from `address` into the inbound queue.
    ///
    /// Returns the number of bytes actually received; 0 on any failure.
    fn request_read(&mut self, address: u8, count: usize) -> usize;

    /// Dequeue one byte from the inbound queue, [`EMPTY_READ`] when empty.
    fn read_byte(&mut self) -> u8;

    /// Number of unconsumed inbound bytes.
    fn available(&self) -> usize;
}

/// A bus transport shared between device handles and the polling thread.
///
/// The transport itself is a single-writer resource; the mutex provides the
/// visibility barrier between the controlling thread (health checks) and the
/// polling thread, and guarantees a device handle can never observe a
/// half-closed bus.
pub type SharedBus = Arc<Mutex<dyn BusTransport + Send>>;

/// Wrap a backend for sharing between device handles.
pub fn shared<B: BusTransport + Send + 'static>(bus: B) -> SharedBus {
    Arc::new(Mutex::new(bus))
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Outbound buffer and inbound FIFO shared by every backend.
///
/// The invariants live here so both backends behave identically: the
/// outbound buffer is cleared at the start of every transaction, and the
/// inbound queue only grows through a completed read and only shrinks
/// through sequential consumption.
#[derive(Debug, Default)]
pub(crate) struct WireState {
    target: u8,
    tx: Vec<u8>,
    rx: VecDeque<u8>,
}

impl WireState {
    /// Start a transaction: retarget and drop any stale outbound bytes.
    pub fn begin(&mut self, address: u8) {
        self.target = address;
        self.tx.clear();
    }

    pub fn target(&self) -> u8 {
        self.target
    }

    pub fn queue(&mut self, bytes: &[u8]) {
        self.tx.extend_from_slice(bytes);
    }

    pub fn tx(&self) -> &[u8] {
        &self.tx
    }

    pub fn fill_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn pop(&mut self) -> u8 {
        self.rx.pop_front().unwrap_or(EMPTY_READ)
    }

    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// Drop all staged and pending bytes (open/close boundaries).
    pub fn reset(&mut self) {
        self.tx.clear();
        self.rx.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_clears_outbound_buffer() {
        let mut wire = WireState::default();
        wire.queue(&[0x01, 0x02, 0x03]);
        wire.begin(0x6A);
        assert_eq!(wire.target(), 0x6A);
        assert!(wire.tx().is_empty());
    }

    #[test]
    fn test_queued_bytes_kept_in_order() {
        let mut wire = WireState::default();
        wire.begin(0x6B);
        wire.queue(&[0x11]);
        wire.queue(&[0xA0, 0x44]);
        assert_eq!(wire.tx(), &[0x11, 0xA0, 0x44]);
    }

    #[test]
    fn test_inbound_queue_is_fifo() {
        let mut wire = WireState::default();
        wire.fill_rx(&[0x01, 0x02, 0x03]);
        assert_eq!(wire.available(), 3);
        assert_eq!(wire.pop(), 0x01);
        assert_eq!(wire.pop(), 0x02);
        assert_eq!(wire.available(), 1);
        assert_eq!(wire.pop(), 0x03);
        assert_eq!(wire.available(), 0);
    }

    #[test]
    fn test_empty_read_returns_sentinel() {
        let mut wire = WireState::default();
        assert_eq!(wire.pop(), EMPTY_READ);
        // Popping an empty queue must not disturb later reads.
        wire.fill_rx(&[0x42]);
        assert_eq!(wire.pop(), 0x42);
        assert_eq!(wire.pop(), EMPTY_READ);
    }

    #[test]
    fn test_reset_drops_both_directions() {
        let mut wire = WireState::default();
        wire.queue(&[0x01]);
        wire.fill_rx(&[0x02]);
        wire.reset();
        assert!(wire.tx().is_empty());
        assert_eq!(wire.available(), 0);
    }
}
