//! Violation events and the append-only event log.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::tracker::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    Helmet,
    WrongWay,
    RedLight,
}

impl ViolationKind {
    pub fn label(self) -> &'static str {
        match self {
            ViolationKind::Helmet => "HELMET",
            ViolationKind::WrongWay => "WRONG WAY",
            ViolationKind::RedLight => "RED LIGHT",
        }
    }
}

/// What the rule saw when it fired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    /// Offending track's box on the emitting frame
    pub bbox: Rect,
    /// Supporting box, e.g. the no-helmet detection
    pub secondary_bbox: Option<Rect>,
    pub secondary_track_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationEvent {
    pub track_id: u64,
    pub kind: ViolationKind,
    pub frame_index: u64,
    pub evidence: Evidence,
    pub confidence: f32,
}

/// Per-kind counts for a results page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViolationSummary {
    pub total: usize,
    pub by_kind: BTreeMap<ViolationKind, usize>,
    pub offending_tracks: usize,
}

/// Append-only record of every emitted event, in emission order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<ViolationEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn extend(&mut self, events: impl IntoIterator<Item = ViolationEvent>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[ViolationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events_of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &ViolationEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn events_for_track(&self, track_id: u64) -> impl Iterator<Item = &ViolationEvent> {
        self.events.iter().filter(move |e| e.track_id == track_id)
    }

    pub fn summary(&self) -> ViolationSummary {
        let mut by_kind = BTreeMap::new();
        let mut tracks = std::collections::BTreeSet::new();
        for event in &self.events {
            *by_kind.entry(event.kind).or_insert(0) += 1;
            tracks.insert(event.track_id);
        }
        ViolationSummary {
            total: self.events.len(),
            by_kind,
            offending_tracks: tracks.len(),
        }
    }
}
