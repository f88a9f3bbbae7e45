use std::collections::VecDeque;

use tracing::debug;

/// One count-in tone to render at `time`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneEvent {
    pub index: u32,
    pub time: f64,
}

/// Cooperative timer for the count-in: a finite queue of tones spaced by a
/// fixed interval, drained as the external clock advances. Replaces the
/// original coroutine-driven intro playback.
#[derive(Debug)]
pub struct IntroSequence {
    queue: VecDeque<ToneEvent>,
}

impl IntroSequence {
    pub fn new(count: u32, start_time: f64, spacing: f64) -> Self {
        let mut queue = VecDeque::new();
        if spacing.is_finite() && spacing > 0.0 && start_time.is_finite() {
            for index in 0..count {
                queue.push_back(ToneEvent {
                    index,
                    time: start_time + index as f64 * spacing,
                });
            }
        }
        Self { queue }
    }

    /// Pop every tone scheduled up to and including `time_sec`.
    pub fn dispatch_until(&mut self, time_sec: f64) -> Vec<ToneEvent> {
        let mut due = Vec::new();
        while let Some(tone) = self.queue.front() {
            if tone.time > time_sec {
                break;
            }
            due.push(*tone);
            self.queue.pop_front();
        }
        due
    }

    /// Drop the remaining tones (stopping the session mid-count-in).
    pub fn cancel(&mut self) {
        if !self.queue.is_empty() {
            debug!("intro cancelled with {} tones pending", self.queue.len());
        }
        self.queue.clear();
    }

    pub fn is_done(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// First instant after the last tone, i.e. where beat 0 of the ensemble
    /// belongs.
    pub fn end_time(&self) -> Option<f64> {
        self.queue.back().map(|tone| tone.time)
    }
}

#[cfg(test)]
mod tests {
    use super::IntroSequence;

    #[test]
    fn tones_are_spaced_by_interval() {
        let mut intro = IntroSequence::new(4, 0.0, 0.5);
        let tones = intro.dispatch_until(10.0);
        assert_eq!(tones.len(), 4);
        for (i, tone) in tones.iter().enumerate() {
            assert_eq!(tone.index, i as u32);
            assert!((tone.time - i as f64 * 0.5).abs() < 1e-12);
        }
        assert!(intro.is_done());
    }

    #[test]
    fn dispatch_is_incremental() {
        let mut intro = IntroSequence::new(4, 0.0, 0.5);
        assert_eq!(intro.dispatch_until(0.6).len(), 2);
        assert_eq!(intro.remaining(), 2);
        assert_eq!(intro.dispatch_until(0.6).len(), 0);
        assert_eq!(intro.dispatch_until(2.0).len(), 2);
    }

    #[test]
    fn cancel_discards_pending_tones() {
        let mut intro = IntroSequence::new(8, 0.0, 0.25);
        let _ = intro.dispatch_until(0.3);
        intro.cancel();
        assert!(intro.is_done());
        assert!(intro.dispatch_until(100.0).is_empty());
    }

    #[test]
    fn zero_count_or_bad_spacing_is_empty() {
        assert!(IntroSequence::new(0, 0.0, 0.5).is_done());
        assert!(IntroSequence::new(4, 0.0, 0.0).is_done());
        assert!(IntroSequence::new(4, 0.0, -1.0).is_done());
        assert!(IntroSequence::new(4, 0.0, f64::NAN).is_done());
    }
}
