use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::events::{Evidence, ViolationEvent, ViolationKind};
use crate::rules::state::RuleLatch;
use crate::rules::{FrameContext, ViolationRule};
use crate::tracker::{Detection, ObjectClass, Rect, Track};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmetConfig {
    /// Consecutive observations with a no-helmet head before emitting
    pub min_consecutive_frames: u32,
    /// Share of the no-helmet box that must lie inside the rider box
    pub containment_ratio: f32,
    /// IoU at which a no-helmet box pairs with a rider even when not contained
    pub pair_iou: f32,
    /// Share of a person box covered by a motorcycle to count the person as a rider
    pub motorcycle_overlap: f32,
    pub min_confidence: f32,
}

impl Default for HelmetConfig {
    fn default() -> Self {
        Self {
            min_consecutive_frames: 5,
            containment_ratio: 0.9,
            pair_iou: 0.5,
            motorcycle_overlap: 0.3,
            min_confidence: 0.5,
        }
    }
}

impl HelmetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_consecutive_frames == 0 {
            return Err(PipelineError::config(
                "helmet.min_consecutive_frames must be positive",
            ));
        }
        for (name, value) in [
            ("containment_ratio", self.containment_ratio),
            ("pair_iou", self.pair_iou),
            ("motorcycle_overlap", self.motorcycle_overlap),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(PipelineError::config(format!(
                    "helmet.{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(PipelineError::config(format!(
                "helmet.min_confidence must be in [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

/// Riders seen without a helmet for `min_consecutive_frames` in a row.
pub struct HelmetRule {
    config: HelmetConfig,
    latch: RuleLatch,
}

impl HelmetRule {
    pub fn new(config: HelmetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            latch: RuleLatch::new(),
        })
    }

    fn is_two_wheeler_rider(&self, track: &Track, detections: &[Detection]) -> bool {
        match track.class {
            ObjectClass::Rider => true,
            ObjectClass::Person => {
                let person = track.rect();
                let area = person.area();
                area > 0.0
                    && detections
                        .iter()
                        .filter(|d| d.class == ObjectClass::Motorcycle)
                        .any(|m| person.intersection_area(&m.bbox) / area >= self.config.motorcycle_overlap)
            }
            _ => false,
        }
    }

    /// Best no-helmet box belonging to `rider`, if any.
    fn paired_no_helmet<'a>(&self, rider: &Rect, detections: &'a [Detection]) -> Option<&'a Detection> {
        detections
            .iter()
            .filter(|d| d.class == ObjectClass::NoHelmet && d.confidence >= self.config.min_confidence)
            .filter(|d| {
                rider.containment_of(&d.bbox) >= self.config.containment_ratio
                    || rider.iou(&d.bbox) >= self.config.pair_iou
            })
            .max_by(|a, b| {
                rider
                    .containment_of(&a.bbox)
                    .total_cmp(&rider.containment_of(&b.bbox))
                    .then(a.confidence.total_cmp(&b.confidence))
            })
    }
}

impl ViolationRule for HelmetRule {
    fn kind(&self) -> ViolationKind {
        ViolationKind::Helmet
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>) -> Vec<ViolationEvent> {
        let mut events = Vec::new();
        for track in ctx.tracks {
            if !self.is_two_wheeler_rider(track, ctx.detections) {
                if self.latch.state(track.track_id).is_some() {
                    self.latch.observe(
                        track.track_id,
                        ctx.frame_index,
                        false,
                        self.config.min_consecutive_frames,
                    );
                }
                continue;
            }

            let rider = track.rect();
            let no_helmet = self.paired_no_helmet(&rider, ctx.detections);
            let fire = self.latch.observe(
                track.track_id,
                ctx.frame_index,
                no_helmet.is_some(),
                self.config.min_consecutive_frames,
            );
            if let (true, Some(head)) = (fire, no_helmet) {
                self.latch.mark_emitted(track.track_id);
                info!(
                    track_id = track.track_id,
                    frame_index = ctx.frame_index,
                    "helmet violation"
                );
                events.push(ViolationEvent {
                    track_id: track.track_id,
                    kind: ViolationKind::Helmet,
                    frame_index: ctx.frame_index,
                    evidence: Evidence {
                        bbox: rider,
                        secondary_bbox: Some(head.bbox),
                        secondary_track_id: None,
                    },
                    confidence: head.confidence.min(track.confidence),
                });
            }
        }
        events
    }

    fn release(&mut self, evicted: &[u64]) {
        self.latch.release(evicted);
    }

    fn reset(&mut self) {
        self.latch.clear();
    }
}
