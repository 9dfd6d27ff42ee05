//! Hand-off of a typed-in 4 digit number from an interrupt (or receive task) to the main loop.
//!
//! The producer side is whatever receives characters, typically a UART RX interrupt.  It calls
//! [`DigitBuffer::push`] for every byte.  The consumer side is the main loop, which polls
//! [`DigitBuffer::take`].  Once 4 digits are collected the producer stops accepting input until
//! the consumer has read the number out, so the consumer never sees a half-written buffer.
//!
//! Only atomic loads and stores are used, which keeps this usable on the Cortex-M0+ of the RP2040
//! (no compare-and-swap there), and the acquire/release pairing on the ready flag makes it sound
//! with the producer and consumer on different cores.

use crate::DIGITS;
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

/// What happened to a byte offered to [`DigitBuffer::push`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Push {
    /// Stored; more digits are needed
    Accepted,

    /// Stored, and it was the last digit.  The number is now ready.
    Completed,

    /// Dropped, either because it isn't an ASCII digit or because a complete number is still
    /// waiting to be taken
    Rejected,
}

/// Single-producer, single-consumer buffer for one 4 digit decimal number.
///
/// Intended to live in a `static` shared by the receive path and the main loop.
pub struct DigitBuffer {
    digits: [AtomicU8; DIGITS],
    count: AtomicU8,
    ready: AtomicBool,
}

impl DigitBuffer {
    pub const fn new() -> Self {
        Self {
            digits: [
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
            ],
            count: AtomicU8::new(0),
            ready: AtomicBool::new(false),
        }
    }

    /// Offer one received byte.  Producer side only.
    pub fn push(&self, byte: u8) -> Push {
        if !byte.is_ascii_digit() {
            return Push::Rejected;
        }

        let count = self.count.load(Ordering::Acquire);
        if count as usize >= DIGITS {
            return Push::Rejected;
        }

        self.digits[count as usize].store(byte - b'0', Ordering::Relaxed);
        let count = count + 1;
        self.count.store(count, Ordering::Release);

        if count as usize == DIGITS {
            self.ready.store(true, Ordering::Release);
            Push::Completed
        } else {
            Push::Accepted
        }
    }

    /// `true` once a complete number is waiting to be taken
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// If a complete number is available, read it out and make room for the next one.  Consumer
    /// side only.
    pub fn take(&self) -> Option<u16> {
        if !self.is_ready() {
            return None;
        }

        let number = self
            .digits
            .iter()
            .fold(0u16, |acc, digit| acc * 10 + digit.load(Ordering::Relaxed) as u16);

        self.reset();

        Some(number)
    }

    /// Drop whatever has been collected so far.  Consumer side only.
    ///
    /// The ready flag is cleared before the count so the producer, which refuses input while the
    /// count is full, can't start a new number that would then be flagged ready by mistake.
    ///
    /// On a complete number this is always sound, since the producer is locked out until the
    /// count drops.  On partial input it is only sound while the producer is quiescent (e.g. the
    /// RX interrupt masked): a [`Self::push`] that loaded the old count before this store will
    /// write its incremented count back afterwards and resurrect the stale digits.
    pub fn reset(&self) {
        self.ready.store(false, Ordering::Release);
        self.count.store(0, Ordering::Release);
    }
}

impl Default for DigitBuffer {
    fn default() -> Self {
        Self::new()
    }
}
