/// Track lifecycle: born → alive → stale → evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Created on this frame from an unmatched detection
    #[default]
    New,
    /// Matched on its most recent frame
    Tracked,
    /// Missed at least one frame, still eligible for association
    Lost,
    /// Missed more than `max_missed_frames`; never updated again
    Removed,
}

impl TrackState {
    /// Alive or stale tracks still take part in association.
    pub fn is_active(self) -> bool {
        !matches!(self, TrackState::Removed)
    }
}
