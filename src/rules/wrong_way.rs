use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::events::{Evidence, ViolationEvent, ViolationKind};
use crate::rules::state::RuleLatch;
use crate::rules::{FrameContext, ViolationRule};
use crate::tracker::Track;
use crate::zones::{Zone, ZoneRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrongWayConfig {
    /// Tags of zones with a permitted direction to enforce
    pub zones: Vec<String>,
    /// Number of trailing history boxes used for the heading
    pub window: usize,
    /// Headings shorter than this (pixels) are treated as standing still
    pub min_displacement: f32,
    /// Normalized dot product below `-opposition_threshold` counts as wrong-way
    pub opposition_threshold: f32,
    pub min_consecutive_frames: u32,
}

impl Default for WrongWayConfig {
    fn default() -> Self {
        Self {
            zones: Vec::new(),
            window: 5,
            min_displacement: 2.0,
            opposition_threshold: 0.5,
            min_consecutive_frames: 5,
        }
    }
}

impl WrongWayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.zones.is_empty() {
            return Err(PipelineError::config(
                "wrong_way.zones must name at least one zone",
            ));
        }
        if self.window < 2 {
            return Err(PipelineError::config("wrong_way.window must be at least 2"));
        }
        if !(self.min_displacement >= 0.0 && self.min_displacement.is_finite()) {
            return Err(PipelineError::config(
                "wrong_way.min_displacement must be a non-negative number",
            ));
        }
        if !(0.0..1.0).contains(&self.opposition_threshold) {
            return Err(PipelineError::config(format!(
                "wrong_way.opposition_threshold must be in [0, 1), got {}",
                self.opposition_threshold
            )));
        }
        if self.min_consecutive_frames == 0 {
            return Err(PipelineError::config(
                "wrong_way.min_consecutive_frames must be positive",
            ));
        }
        Ok(())
    }
}

/// Road users moving against a zone's permitted direction.
pub struct WrongWayRule {
    config: WrongWayConfig,
    zones: Vec<Zone>,
    latch: RuleLatch,
}

impl WrongWayRule {
    pub fn new(config: WrongWayConfig, registry: &ZoneRegistry) -> Result<Self> {
        config.validate()?;
        let zones = config
            .zones
            .iter()
            .map(|tag| -> Result<Zone> {
                let zone = registry.zone(tag)?;
                if zone.permitted_direction().is_none() {
                    return Err(PipelineError::config(format!(
                        "zone '{tag}' is used for wrong-way detection but has no permitted_direction"
                    )));
                }
                Ok(zone.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            zones,
            latch: RuleLatch::new(),
        })
    }

    /// Centroid displacement over the trailing window, oldest to newest.
    fn heading(&self, track: &Track) -> Option<(Point2<f32>, Vector2<f32>)> {
        let history = track.history();
        if history.len() < 2 {
            return None;
        }
        let span = self.config.window.min(history.len());
        let oldest = history[history.len() - span].center();
        let newest = history[history.len() - 1].center();
        let newest = Point2::new(newest.0, newest.1);
        Some((newest, newest - Point2::new(oldest.0, oldest.1)))
    }

    /// Opposition score in [0, 1] when the track moves against its zone.
    fn opposition(&self, position: Point2<f32>, heading: Vector2<f32>) -> Option<f32> {
        if heading.norm() < self.config.min_displacement.max(f32::EPSILON) {
            return None;
        }
        let zone = self.zones.iter().find(|z| z.contains(position))?;
        let permitted = zone.permitted_direction()?;
        let dot = heading.normalize().dot(&permitted);
        (dot < -self.config.opposition_threshold).then_some(-dot)
    }
}

impl ViolationRule for WrongWayRule {
    fn kind(&self) -> ViolationKind {
        ViolationKind::WrongWay
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>) -> Vec<ViolationEvent> {
        let mut events = Vec::new();
        for track in ctx.tracks.iter().filter(|t| t.class.is_road_user()) {
            let Some((position, heading)) = self.heading(track) else {
                continue;
            };
            let opposition = self.opposition(position, heading);
            let fire = self.latch.observe(
                track.track_id,
                ctx.frame_index,
                opposition.is_some(),
                self.config.min_consecutive_frames,
            );
            if let (true, Some(score)) = (fire, opposition) {
                self.latch.mark_emitted(track.track_id);
                info!(
                    track_id = track.track_id,
                    frame_index = ctx.frame_index,
                    "wrong-way violation"
                );
                events.push(ViolationEvent {
                    track_id: track.track_id,
                    kind: ViolationKind::WrongWay,
                    frame_index: ctx.frame_index,
                    evidence: Evidence {
                        bbox: track.rect(),
                        secondary_bbox: None,
                        secondary_track_id: None,
                    },
                    confidence: score.clamp(0.0, 1.0),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::LightState;
    use crate::tracker::{Detection, ObjectClass, Rect};
    use crate::zones::ZoneConfig;

    fn registry() -> ZoneRegistry {
        let lane = ZoneConfig {
            tag: "northbound".into(),
            polygon: vec![[0.0, 0.0], [200.0, 0.0], [200.0, 400.0], [0.0, 400.0]],
            permitted_direction: Some([0.0, -1.0]),
        };
        let plaza = ZoneConfig {
            tag: "plaza".into(),
            polygon: vec![[300.0, 0.0], [400.0, 0.0], [400.0, 100.0]],
            permitted_direction: None,
        };
        ZoneRegistry::new(&[lane, plaza], &[]).unwrap()
    }

    fn config() -> WrongWayConfig {
        WrongWayConfig {
            zones: vec!["northbound".into()],
            ..WrongWayConfig::default()
        }
    }

    fn moving_track(dy: f32, frames: u64) -> Vec<Track> {
        let det = |y: f32| Detection::from_rect(Rect::new(80.0, y, 40.0, 40.0), ObjectClass::Vehicle, 0.9);
        let mut track = Track::new(1, &det(100.0), 0, 30);
        let mut snapshots = Vec::new();
        for f in 1..=frames {
            track.update(&det(100.0 + dy * f as f32), f);
            snapshots.push(track.clone());
        }
        snapshots
    }

    fn run(rule: &mut WrongWayRule, track: &Track, frame_index: u64) -> Vec<ViolationEvent> {
        let tracks = std::slice::from_ref(track);
        let ctx = FrameContext {
            frame_index,
            tracks,
            detections: &[],
            light: LightState::default(),
        };
        rule.evaluate(&ctx)
    }

    #[test]
    fn test_southbound_in_northbound_zone_fires_once() {
        let mut rule = WrongWayRule::new(config(), &registry()).unwrap();
        let mut events = Vec::new();
        for snapshot in moving_track(5.0, 20) {
            events.extend(run(&mut rule, &snapshot, snapshot.last_seen));
        }
        assert_eq!(events.len(), 1);
        // Qualifying streak starts at frame 1, the fifth observation is frame 5.
        assert_eq!(events[0].frame_index, 5);
        assert!(events[0].confidence > 0.99);
    }

    #[test]
    fn test_permitted_direction_never_fires() {
        let mut rule = WrongWayRule::new(config(), &registry()).unwrap();
        for snapshot in moving_track(-5.0, 20) {
            assert!(run(&mut rule, &snapshot, snapshot.last_seen).is_empty());
        }
    }

    #[test]
    fn test_stationary_jitter_ignored() {
        let mut rule = WrongWayRule::new(config(), &registry()).unwrap();
        for snapshot in moving_track(0.1, 20) {
            assert!(run(&mut rule, &snapshot, snapshot.last_seen).is_empty());
        }
    }

    #[test]
    fn test_configuration_errors() {
        let registry = registry();
        let unknown = WrongWayConfig {
            zones: vec!["nowhere".into()],
            ..WrongWayConfig::default()
        };
        assert!(WrongWayRule::new(unknown, &registry).is_err());

        let undirected = WrongWayConfig {
            zones: vec!["plaza".into()],
            ..WrongWayConfig::default()
        };
        assert!(WrongWayRule::new(undirected, &registry).is_err());

        assert!(WrongWayRule::new(WrongWayConfig::default(), &registry).is_err());
    }
}
