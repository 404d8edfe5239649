//! Greedy IoU tracker.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::tracker::matching::{self, AssignmentResult, Detection, ObjectClass};
use crate::tracker::rect::{Rect, iou_matrix};
use crate::tracker::track::Track;

/// Configuration for the IouTracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU for a track/detection pair to be associated
    pub iou_threshold: f32,
    /// A track missing for more frames than this is evicted
    pub max_missed_frames: u64,
    /// Number of bounding boxes kept per track
    pub history_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_missed_frames: 10,
            history_len: 30,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.iou_threshold > 0.0 && self.iou_threshold <= 1.0) {
            return Err(PipelineError::config(format!(
                "tracker.iou_threshold must be in (0, 1], got {}",
                self.iou_threshold
            )));
        }
        if self.max_missed_frames == 0 {
            return Err(PipelineError::config("tracker.max_missed_frames must be positive"));
        }
        if self.history_len < 2 {
            return Err(PipelineError::config("tracker.history_len must be at least 2"));
        }
        Ok(())
    }
}

/// A track touched by the latest update.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackUpdate {
    pub track: Track,
    /// Born on this frame
    pub is_new: bool,
}

pub struct IouTracker {
    tracks: Vec<Track>,
    evicted: Vec<u64>,
    next_id: u64,
    config: TrackerConfig,
}

impl IouTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            evicted: Vec::new(),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Associate this frame's detections with the active tracks.
    ///
    /// Returns the tracks matched or created on `frame_index`, in track id
    /// order. Non-trackable classes (helmets, lights) are ignored.
    pub fn update(&mut self, detections: &[Detection], frame_index: u64) -> Vec<TrackUpdate> {
        self.evicted.clear();
        self.evict_stale(frame_index);

        let detections: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.class.is_trackable())
            .collect();

        let track_rects: Vec<Rect> = self.tracks.iter().map(|t| t.rect()).collect();
        let track_ids: Vec<u64> = self.tracks.iter().map(|t| t.track_id).collect();
        let track_classes: Vec<ObjectClass> = self.tracks.iter().map(|t| t.class).collect();
        let det_rects: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        let det_classes: Vec<ObjectClass> = detections.iter().map(|d| d.class).collect();

        let similarity = iou_matrix(&track_rects, &det_rects);
        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::greedy_assignment(
            &similarity,
            &track_ids,
            &track_classes,
            &det_classes,
            self.config.iou_threshold,
        );

        let mut updates = Vec::with_capacity(matches.len() + unmatched_detections.len());

        for (itrack, idet) in matches {
            let track = &mut self.tracks[itrack];
            track.update(detections[idet], frame_index);
            updates.push(TrackUpdate {
                track: track.clone(),
                is_new: false,
            });
        }

        for itrack in unmatched_tracks {
            self.tracks[itrack].mark_lost();
        }

        for idet in unmatched_detections {
            let track = Track::new(
                self.next_id,
                detections[idet],
                frame_index,
                self.config.history_len,
            );
            self.next_id += 1;
            debug!(
                track_id = track.track_id,
                class = track.class.label(),
                frame_index,
                "track born"
            );
            updates.push(TrackUpdate {
                track: track.clone(),
                is_new: true,
            });
            self.tracks.push(track);
        }

        updates.sort_by_key(|u| u.track.track_id);
        updates
    }

    /// Drop tracks unseen for more than `max_missed_frames` as of
    /// `frame_index`, before they can take part in association.
    fn evict_stale(&mut self, frame_index: u64) {
        let max_missed = self.config.max_missed_frames;
        let evicted = &mut self.evicted;
        self.tracks.retain_mut(|track| {
            if track.frames_since_seen(frame_index) <= max_missed {
                return true;
            }
            track.mark_removed();
            debug!(
                track_id = track.track_id,
                last_seen = track.last_seen,
                frame_index,
                "track evicted"
            );
            evicted.push(track.track_id);
            false
        });
    }

    /// Ids evicted by the most recent `update`.
    pub fn evicted_last_update(&self) -> &[u64] {
        &self.evicted
    }

    /// Alive and stale tracks.
    pub fn active_tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, track_id: u64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    /// Drop every track. Ids keep counting so they stay unique.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.evicted.clear();
    }
}
