//! Single tracked object.

use std::collections::VecDeque;

use crate::tracker::matching::{Detection, ObjectClass};
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Single object track, exclusively owned by the tracker.
///
/// Rule engines receive clones and keep their own per-track bookkeeping keyed
/// by `track_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Unique track identifier, never reused within one tracker
    pub track_id: u64,
    /// Current track state
    pub state: TrackState,
    /// Class of the most recent matched detection
    pub class: ObjectClass,
    /// Confidence of the most recent matched detection
    pub confidence: f32,
    /// Frame index when the track was born
    pub start_frame: u64,
    /// Frame index of the most recent match
    pub last_seen: u64,
    history: VecDeque<Rect>,
    history_len: usize,
}

impl Track {
    /// Start a new track from an unmatched detection.
    pub fn new(track_id: u64, detection: &Detection, frame_index: u64, history_len: usize) -> Self {
        let history_len = history_len.max(1);
        let mut history = VecDeque::with_capacity(history_len);
        history.push_back(detection.bbox);
        Self {
            track_id,
            state: TrackState::New,
            class: detection.class,
            confidence: detection.confidence,
            start_frame: frame_index,
            last_seen: frame_index,
            history,
            history_len,
        }
    }

    /// Most recent bounding box.
    pub fn rect(&self) -> Rect {
        self.history.back().copied().unwrap_or_default()
    }

    /// Bounding boxes of matched frames, oldest first.
    pub fn history(&self) -> &VecDeque<Rect> {
        &self.history
    }

    /// Bounding box matched before the current one, if any.
    pub fn previous_rect(&self) -> Option<Rect> {
        let len = self.history.len();
        if len >= 2 { self.history.get(len - 2).copied() } else { None }
    }

    /// Number of frames elapsed since the last match.
    pub fn frames_since_seen(&self, frame_index: u64) -> u64 {
        frame_index.saturating_sub(self.last_seen)
    }

    pub fn update(&mut self, detection: &Detection, frame_index: u64) {
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(detection.bbox);
        self.class = detection.class;
        self.confidence = detection.confidence;
        self.last_seen = frame_index;
        self.state = TrackState::Tracked;
    }

    pub fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
    }

    pub fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32) -> Detection {
        Detection::from_rect(Rect::new(x, 0.0, 10.0, 10.0), ObjectClass::Vehicle, 0.9)
    }

    #[test]
    fn test_history_is_bounded() {
        let mut track = Track::new(1, &det(0.0), 0, 3);
        for i in 1..=5 {
            track.update(&det(i as f32), i);
        }
        let xs: Vec<f32> = track.history().iter().map(|r| r.x).collect();
        assert_eq!(xs, vec![3.0, 4.0, 5.0]);
        assert_eq!(track.rect().x, 5.0);
        assert_eq!(track.previous_rect().map(|r| r.x), Some(4.0));
        assert_eq!(track.last_seen, 5);
        assert_eq!(track.state, TrackState::Tracked);
    }

    #[test]
    fn test_new_track_has_no_previous() {
        let track = Track::new(1, &det(0.0), 4, 8);
        assert_eq!(track.state, TrackState::New);
        assert!(track.previous_rect().is_none());
        assert_eq!(track.frames_since_seen(7), 3);
    }
}
