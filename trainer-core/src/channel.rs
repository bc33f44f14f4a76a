//! # Reading Channel
//!
//! A single-slot mailbox between the capture thread and the tuner display.
//! Publishing overwrites whatever has not been read yet, and taking clears
//! the slot, so the consumer only ever sees the freshest reading.
//!
//! One producer and one consumer are expected. Both sides are lock-free.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// One pitch-estimator output for one audio window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Detected fundamental in Hz, `None` when the window had no pitch.
    pub frequency_hz: Option<f32>,
}

impl Reading {
    pub fn pitched(frequency_hz: f32) -> Self {
        Self {
            frequency_hz: Some(frequency_hz),
        }
    }

    pub fn silent() -> Self {
        Self { frequency_hz: None }
    }
}

#[derive(Debug, Default)]
pub struct ReadingChannel {
    slot: ArcSwapOption<Reading>,
}

impl ReadingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `reading`, replacing any value the consumer has not taken.
    pub fn publish(&self, reading: Reading) {
        self.slot.store(Some(Arc::new(reading)));
    }

    /// Returns the latest reading and empties the slot, or `None` if nothing
    /// was published since the previous `take`.
    pub fn take(&self) -> Option<Reading> {
        self.slot.swap(None).map(|reading| *reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn take_on_empty_channel_is_none() {
        let channel = ReadingChannel::new();
        assert_eq!(channel.take(), None);
    }

    #[test]
    fn freshest_reading_wins() {
        let channel = ReadingChannel::new();
        channel.publish(Reading::pitched(110.0));
        channel.publish(Reading::silent());
        channel.publish(Reading::pitched(82.4));

        assert_eq!(channel.take(), Some(Reading::pitched(82.4)));
        assert_eq!(channel.take(), None);
    }

    #[test]
    fn silent_reading_is_still_a_reading() {
        let channel = ReadingChannel::new();
        channel.publish(Reading::silent());
        assert_eq!(channel.take(), Some(Reading { frequency_hz: None }));
    }

    #[test]
    fn consumer_sees_last_value_from_producer_thread() {
        let channel = Arc::new(ReadingChannel::new());
        let producer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                for i in 0..1000 {
                    channel.publish(Reading::pitched(i as f32));
                }
            })
        };
        producer.join().unwrap();

        assert_eq!(channel.take(), Some(Reading::pitched(999.0)));
        assert_eq!(channel.take(), None);
    }
}
