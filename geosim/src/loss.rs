//! Sliding-window loss counter for consumer sequence numbers.
//!
//! Slot `seq % window` holds whether `seq` was seen. When a higher sequence
//! number arrives the window slides forward; a slot that is reused before
//! its previous occupant was seen counts that occupant as lost. The bitmap
//! starts all ones so nothing before sequence zero is ever counted.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LossCounterError {
    #[error("window of {0} bits is not a positive multiple of 8")]
    InvalidWindow(u32),
}

#[derive(Debug, Clone)]
pub struct LossCounter {
    bitmap: Vec<u8>,
    window: u32,
    /// Highest sequence number seen so far.
    last_max: Option<u32>,
    lost: u32,
}

impl LossCounter {
    pub fn new(window: u32) -> Result<Self, LossCounterError> {
        if window == 0 || window % 8 != 0 {
            return Err(LossCounterError::InvalidWindow(window));
        }
        Ok(Self {
            bitmap: vec![0xFF; (window / 8) as usize],
            window,
            last_max: None,
            lost: 0,
        })
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    /// Sequence numbers that slid out of the window unseen.
    pub fn lost(&self) -> u32 {
        self.lost
    }

    pub fn notify_received(&mut self, seq: u32) {
        let next = self.last_max.map_or(0, |max| max.saturating_add(1));
        if seq >= next {
            for slot in next..=seq {
                if !self.bit(slot) {
                    self.lost += 1;
                }
                self.set_bit(slot, false);
            }
            self.last_max = Some(seq);
        } else if self.last_max.is_some_and(|max| max - seq >= self.window) {
            // Older than the window; already counted lost.
            return;
        }
        self.set_bit(seq, true);
    }

    fn bit(&self, seq: u32) -> bool {
        let slot = seq % self.window;
        self.bitmap[(slot / 8) as usize] & (1 << (slot % 8)) != 0
    }

    fn set_bit(&mut self, seq: u32, value: bool) {
        let slot = seq % self.window;
        let byte = &mut self.bitmap[(slot / 8) as usize];
        if value {
            *byte |= 1 << (slot % 8);
        } else {
            *byte &= !(1 << (slot % 8));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_must_be_multiple_of_eight() {
        assert_eq!(LossCounter::new(12).err(), Some(LossCounterError::InvalidWindow(12)));
        assert_eq!(LossCounter::new(0).err(), Some(LossCounterError::InvalidWindow(0)));
        assert_eq!(LossCounter::new(16).map(|c| c.window()), Ok(16));
    }

    #[test]
    fn test_in_order_has_no_loss() {
        let mut counter = LossCounter::new(8).unwrap();
        for seq in 0..40 {
            counter.notify_received(seq);
        }
        assert_eq!(counter.lost(), 0);
    }

    #[test]
    fn test_gap_counted_once_window_slides_past() {
        let mut counter = LossCounter::new(8).unwrap();
        for seq in [0, 1, 3, 4] {
            counter.notify_received(seq);
        }
        // 2 is still inside the window.
        assert_eq!(counter.lost(), 0);

        counter.notify_received(10);
        assert_eq!(counter.lost(), 1);
    }

    #[test]
    fn test_late_arrival_inside_window_is_not_lost() {
        let mut counter = LossCounter::new(8).unwrap();
        counter.notify_received(0);
        counter.notify_received(2);
        counter.notify_received(1);
        counter.notify_received(9);
        assert_eq!(counter.lost(), 0);
    }

    #[test]
    fn test_large_jump_counts_every_skipped_slot() {
        let mut counter = LossCounter::new(8).unwrap();
        counter.notify_received(0);
        counter.notify_received(20);
        // 1..=12 slid out of the window unseen.
        assert_eq!(counter.lost(), 12);
    }
}
