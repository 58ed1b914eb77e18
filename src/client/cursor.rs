use std::time::{Duration, Instant};

use crate::models::presence::CursorPosition;

/// Client-side coalescing of cursor samples before transmission. At most
/// one sample per interval goes out; the latest sample always wins. Dropped
/// samples are harmless, cursor broadcasting is cosmetic.
#[derive(Debug)]
pub struct CursorThrottle {
    min_interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<CursorPosition>,
}

impl CursorThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
            pending: None,
        }
    }

    /// Offers a fresh sample. Returns it when the interval allows sending
    /// now; otherwise the sample is held as the latest pending one.
    pub fn offer(&mut self, cursor: CursorPosition, now: Instant) -> Option<CursorPosition> {
        if self.ready(now) {
            self.last_sent = Some(now);
            self.pending = None;
            return Some(cursor);
        }
        self.pending = Some(cursor);
        None
    }

    /// Releases a held sample once the interval has passed. Call on a timer
    /// tick so the final cursor position is not lost.
    pub fn flush(&mut self, now: Instant) -> Option<CursorPosition> {
        if self.pending.is_some() && self.ready(now) {
            self.last_sent = Some(now);
            return self.pending.take();
        }
        None
    }

    fn ready(&self, now: Instant) -> bool {
        match self.last_sent {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(line: u32, column: u32) -> CursorPosition {
        CursorPosition { line, column }
    }

    #[test]
    fn first_sample_goes_straight_out() {
        let mut throttle = CursorThrottle::new(Duration::from_millis(80));
        assert_eq!(
            throttle.offer(cursor(1, 1), Instant::now()),
            Some(cursor(1, 1))
        );
    }

    #[test]
    fn rapid_samples_coalesce_to_latest() {
        let mut throttle = CursorThrottle::new(Duration::from_millis(80));
        let start = Instant::now();
        throttle.offer(cursor(1, 1), start);
        assert_eq!(throttle.offer(cursor(2, 2), start), None);
        assert_eq!(throttle.offer(cursor(3, 3), start), None);

        // After the interval the held (latest) sample is released.
        assert_eq!(
            throttle.flush(start + Duration::from_millis(80)),
            Some(cursor(3, 3))
        );
        assert_eq!(throttle.flush(start + Duration::from_millis(81)), None);
    }

    #[test]
    fn sample_after_interval_sends_immediately() {
        let mut throttle = CursorThrottle::new(Duration::from_millis(80));
        let start = Instant::now();
        throttle.offer(cursor(1, 1), start);
        assert_eq!(
            throttle.offer(cursor(5, 5), start + Duration::from_millis(100)),
            Some(cursor(5, 5))
        );
    }

    #[test]
    fn flush_before_interval_holds_the_sample() {
        let mut throttle = CursorThrottle::new(Duration::from_millis(80));
        let start = Instant::now();
        throttle.offer(cursor(1, 1), start);
        throttle.offer(cursor(2, 2), start);
        assert_eq!(throttle.flush(start + Duration::from_millis(40)), None);
        assert_eq!(
            throttle.flush(start + Duration::from_millis(90)),
            Some(cursor(2, 2))
        );
    }
}
