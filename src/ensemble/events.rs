use std::collections::VecDeque;
use std::ops::Range;

/// One produced note onset. Immutable once emitted; exactly one per player
/// per beat.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OnsetEvent {
    pub player_id: u32,
    pub beat: u64,
    /// Onset implied by the correction alone.
    pub scheduled_time: f64,
    /// Onset the playback collaborator should render (includes motor noise).
    pub actual_time: f64,
    /// `actual_time - reference_onset` for this beat.
    pub asynchrony: f64,
}

/// Merged time-ordered stream of all players' onsets, kept sorted by
/// `actual_time` for the playback side.
pub struct OnsetBoard {
    pub retention_past: f64,
    onsets: VecDeque<OnsetEvent>,
}

impl OnsetBoard {
    pub fn new(retention_past: f64) -> Self {
        Self {
            retention_past,
            onsets: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.onsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.onsets.is_empty()
    }

    pub fn publish(&mut self, onset: OnsetEvent) {
        if self.onsets.is_empty() {
            self.onsets.push_back(onset);
            return;
        }

        let push_back = matches!(
            self.onsets.back(),
            Some(last) if last.actual_time <= onset.actual_time
        );
        if push_back {
            self.onsets.push_back(onset);
        } else if matches!(
            self.onsets.front(),
            Some(first) if onset.actual_time < first.actual_time
        ) {
            self.onsets.push_front(onset);
        } else {
            let insert_at = self
                .onsets
                .iter()
                .position(|existing| existing.actual_time > onset.actual_time)
                .unwrap_or(self.onsets.len());
            self.onsets.insert(insert_at, onset);
        }
        debug_assert!(self.is_sorted_by_time());
    }

    fn is_sorted_by_time(&self) -> bool {
        self.onsets
            .iter()
            .zip(self.onsets.iter().skip(1))
            .all(|(a, b)| a.actual_time <= b.actual_time)
    }

    /// Drop onsets older than the retention window behind `now_sec`.
    pub fn prune(&mut self, now_sec: f64) {
        let min_keep = now_sec - self.retention_past;
        while let Some(front) = self.onsets.front() {
            if front.actual_time < min_keep {
                self.onsets.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn query_range<'a>(
        &'a self,
        range: Range<f64>,
    ) -> impl Iterator<Item = &'a OnsetEvent> + 'a {
        let start = range.start;
        let end = range.end;
        self.onsets
            .iter()
            .take_while(move |onset| onset.actual_time < end)
            .filter(move |onset| onset.actual_time >= start)
    }

    /// Remove and return every onset due strictly before `cutoff`, in time
    /// order. This is how the playback collaborator consumes the stream.
    pub fn drain_until(&mut self, cutoff: f64) -> Vec<OnsetEvent> {
        let mut due = Vec::new();
        while let Some(front) = self.onsets.front() {
            if front.actual_time < cutoff {
                due.push(*front);
                self.onsets.pop_front();
            } else {
                break;
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::{OnsetBoard, OnsetEvent};

    fn onset_at(player_id: u32, t: f64) -> OnsetEvent {
        OnsetEvent {
            player_id,
            beat: 0,
            scheduled_time: t,
            actual_time: t,
            asynchrony: 0.0,
        }
    }

    #[test]
    fn publish_keeps_time_order() {
        let mut board = OnsetBoard::new(10.0);
        board.publish(onset_at(0, 0.5));
        board.publish(onset_at(1, 0.1));
        board.publish(onset_at(2, 0.3));
        let times: Vec<f64> = board.query_range(0.0..1.0).map(|o| o.actual_time).collect();
        assert_eq!(times, vec![0.1, 0.3, 0.5]);
    }

    #[test]
    fn drain_until_consumes_in_order() {
        let mut board = OnsetBoard::new(10.0);
        for i in 0..5 {
            board.publish(onset_at(i, i as f64 * 0.5));
        }
        let due = board.drain_until(1.1);
        assert_eq!(due.len(), 3);
        assert_eq!(board.len(), 2);
        assert!(due.windows(2).all(|w| w[0].actual_time <= w[1].actual_time));
    }

    #[test]
    fn prune_drops_past_retention() {
        let mut board = OnsetBoard::new(1.0);
        board.publish(onset_at(0, 0.0));
        board.publish(onset_at(0, 5.0));
        board.prune(5.5);
        assert_eq!(board.len(), 1);
    }
}
