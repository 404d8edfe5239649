//! Per-(track, kind) debounce latch shared by every rule engine.

use std::collections::HashMap;

/// `Watching → Confirmed → Emitted`. `Emitted` only goes away with the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// `streak` consecutive qualifying frames ending at `last_frame`
    Watching { streak: u32, last_frame: Option<u64> },
    Confirmed,
    Emitted,
}

#[derive(Debug, Default)]
pub struct RuleLatch {
    states: HashMap<u64, RuleState>,
}

impl RuleLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the observation of `track_id` on `frame_index`.
    ///
    /// A qualifying observation extends the streak only when the previous
    /// observation was on the frame right before; after a gap it starts a new
    /// streak. Non-qualifying observations reset it. Returns true exactly once
    /// per track: on the frame that brings the streak to `threshold`. The
    /// caller must then call [`RuleLatch::mark_emitted`].
    pub fn observe(&mut self, track_id: u64, frame_index: u64, qualifies: bool, threshold: u32) -> bool {
        let state = self.states.entry(track_id).or_insert(RuleState::Watching {
            streak: 0,
            last_frame: None,
        });

        match *state {
            RuleState::Emitted | RuleState::Confirmed => false,
            RuleState::Watching { streak, last_frame } => {
                let contiguous = last_frame.is_some_and(|f| f + 1 == frame_index);
                let streak = match (qualifies, contiguous) {
                    (false, _) => 0,
                    (true, true) => streak + 1,
                    (true, false) => 1,
                };
                if streak >= threshold {
                    *state = RuleState::Confirmed;
                    true
                } else {
                    *state = RuleState::Watching {
                        streak,
                        last_frame: Some(frame_index),
                    };
                    false
                }
            }
        }
    }

    pub fn mark_emitted(&mut self, track_id: u64) {
        self.states.insert(track_id, RuleState::Emitted);
    }

    pub fn state(&self, track_id: u64) -> Option<RuleState> {
        self.states.get(&track_id).copied()
    }

    pub fn is_emitted(&self, track_id: u64) -> bool {
        matches!(self.state(track_id), Some(RuleState::Emitted))
    }

    /// Forget evicted tracks.
    pub fn release(&mut self, track_ids: &[u64]) {
        for id in track_ids {
            self.states.remove(id);
        }
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_at_threshold() {
        let mut latch = RuleLatch::new();
        assert!(!latch.observe(1, 10, true, 3));
        assert!(!latch.observe(1, 11, true, 3));
        assert!(latch.observe(1, 12, true, 3));
        assert_eq!(latch.state(1), Some(RuleState::Confirmed));
        latch.mark_emitted(1);
        assert!(!latch.observe(1, 13, true, 3));
        assert!(latch.is_emitted(1));
    }

    #[test]
    fn test_break_resets_streak() {
        let mut latch = RuleLatch::new();
        latch.observe(1, 0, true, 3);
        latch.observe(1, 1, true, 3);
        latch.observe(1, 2, false, 3);
        assert_eq!(
            latch.state(1),
            Some(RuleState::Watching {
                streak: 0,
                last_frame: Some(2)
            })
        );
        assert!(!latch.observe(1, 3, true, 3));
    }

    #[test]
    fn test_frame_gap_restarts_streak() {
        let mut latch = RuleLatch::new();
        latch.observe(1, 10, true, 3);
        latch.observe(1, 11, true, 3);
        // Track not seen on 12 and 13.
        assert!(!latch.observe(1, 14, true, 3));
        assert_eq!(
            latch.state(1),
            Some(RuleState::Watching {
                streak: 1,
                last_frame: Some(14)
            })
        );
        assert!(!latch.observe(1, 15, true, 3));
        assert!(latch.observe(1, 16, true, 3));
    }

    #[test]
    fn test_release_forgets_track() {
        let mut latch = RuleLatch::new();
        latch.observe(4, 0, true, 1);
        latch.mark_emitted(4);
        latch.release(&[4]);
        assert!(latch.is_empty());
    }
}
