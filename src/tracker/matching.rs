//! Detection input and the greedy IoU association policy.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::tracker::rect::Rect;

/// Class label attached to a detection by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectClass {
    Person,
    Rider,
    Motorcycle,
    Vehicle,
    Helmet,
    NoHelmet,
    RedLight,
    YellowLight,
    GreenLight,
}

impl ObjectClass {
    /// Classes that get persistent track identities.
    pub fn is_trackable(self) -> bool {
        matches!(
            self,
            ObjectClass::Person | ObjectClass::Rider | ObjectClass::Motorcycle | ObjectClass::Vehicle
        )
    }

    /// Road users whose movement is subject to wrong-way and red-light rules.
    pub fn is_road_user(self) -> bool {
        matches!(
            self,
            ObjectClass::Rider | ObjectClass::Motorcycle | ObjectClass::Vehicle
        )
    }

    pub fn is_traffic_light(self) -> bool {
        matches!(
            self,
            ObjectClass::RedLight | ObjectClass::YellowLight | ObjectClass::GreenLight
        )
    }

    /// Whether a track of class `self` may absorb a detection of class `other`.
    ///
    /// Detectors flip between person and rider for the same body, so those
    /// two are interchangeable. Everything else must match exactly.
    pub fn is_compatible_with(self, other: ObjectClass) -> bool {
        self == other
            || matches!(
                (self, other),
                (ObjectClass::Person, ObjectClass::Rider) | (ObjectClass::Rider, ObjectClass::Person)
            )
    }

    pub fn label(self) -> &'static str {
        match self {
            ObjectClass::Person => "person",
            ObjectClass::Rider => "rider",
            ObjectClass::Motorcycle => "motorcycle",
            ObjectClass::Vehicle => "vehicle",
            ObjectClass::Helmet => "helmet",
            ObjectClass::NoHelmet => "no-helmet",
            ObjectClass::RedLight => "red-light",
            ObjectClass::YellowLight => "yellow-light",
            ObjectClass::GreenLight => "green-light",
        }
    }
}

/// Detection input for the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box in TLWH pixel coordinates
    pub bbox: Rect,
    pub class: ObjectClass,
    /// Detection confidence in [0, 1]
    pub confidence: f32,
}

impl Detection {
    /// Build a detection from TLBR corners.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, class: ObjectClass, confidence: f32) -> Self {
        Self {
            bbox: Rect::from_tlbr(x1, y1, x2, y2),
            class,
            confidence,
        }
    }

    pub fn from_rect(bbox: Rect, class: ObjectClass, confidence: f32) -> Self {
        Self {
            bbox,
            class,
            confidence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    /// (track row, detection column) pairs
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Greedy association over an IoU similarity matrix (tracks × detections).
///
/// Every pair with IoU ≥ `threshold` and compatible classes is a candidate.
/// Candidates are taken in descending IoU order, ties broken by lower track
/// id and then lower detection index, and a pair is accepted when neither
/// side has been assigned yet. The result only depends on the inputs.
pub fn greedy_assignment(
    similarity: &Array2<f32>,
    track_ids: &[u64],
    track_classes: &[ObjectClass],
    det_classes: &[ObjectClass],
    threshold: f32,
) -> AssignmentResult {
    let (num_rows, num_cols) = similarity.dim();
    debug_assert_eq!(num_rows, track_ids.len());
    debug_assert_eq!(num_rows, track_classes.len());
    debug_assert_eq!(num_cols, det_classes.len());

    let mut candidates: Vec<(f32, u64, usize, usize)> = Vec::new();
    for row in 0..num_rows {
        for col in 0..num_cols {
            let iou = similarity[[row, col]];
            if iou >= threshold && track_classes[row].is_compatible_with(det_classes[col]) {
                candidates.push((iou, track_ids[row], col, row));
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut track_used = vec![false; num_rows];
    let mut det_used = vec![false; num_cols];
    let mut matches = Vec::new();

    for (_, _, col, row) in candidates {
        if track_used[row] || det_used[col] {
            continue;
        }
        track_used[row] = true;
        det_used[col] = true;
        matches.push((row, col));
    }

    let unmatched_tracks = (0..num_rows).filter(|&r| !track_used[r]).collect();
    let unmatched_detections = (0..num_cols).filter(|&c| !det_used[c]).collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}
