mod iou_tracker;
mod matching;
mod rect;
mod track;
mod track_state;

pub use iou_tracker::{IouTracker, TrackUpdate, TrackerConfig};
pub use matching::{AssignmentResult, Detection, ObjectClass, greedy_assignment};
pub use rect::{Rect, iou_matrix};
pub use track::Track;
pub use track_state::TrackState;
