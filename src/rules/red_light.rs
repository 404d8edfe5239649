use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::events::{Evidence, ViolationEvent, ViolationKind};
use crate::light::SignalPhase;
use crate::rules::state::RuleLatch;
use crate::rules::{FrameContext, ViolationRule};
use crate::tracker::Rect;
use crate::zones::{Line, Zone, ZoneRegistry};

/// A stop line, optionally restricted to the lane it governs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLineConfig {
    pub line: String,
    #[serde(default)]
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedLightConfig {
    pub stop_lines: Vec<StopLineConfig>,
}

impl RedLightConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stop_lines.is_empty() {
            return Err(PipelineError::config(
                "red_light.stop_lines must name at least one line",
            ));
        }
        Ok(())
    }
}

struct StopLine {
    line: Line,
    zone: Option<Zone>,
}

/// Road users crossing a stop line from side A to side B while the light is red.
pub struct RedLightRule {
    stop_lines: Vec<StopLine>,
    latch: RuleLatch,
}

fn ground_point(rect: &Rect) -> Point2<f32> {
    let (x, y) = rect.bottom_center();
    Point2::new(x, y)
}

impl RedLightRule {
    pub fn new(config: RedLightConfig, registry: &ZoneRegistry) -> Result<Self> {
        config.validate()?;
        let stop_lines = config
            .stop_lines
            .iter()
            .map(|s| -> Result<StopLine> {
                Ok(StopLine {
                    line: registry.line(&s.line)?.clone(),
                    zone: s.zone.as_deref().map(|tag| registry.zone(tag).cloned()).transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            stop_lines,
            latch: RuleLatch::new(),
        })
    }
}

/// First stop line crossed between the two positions, if any.
fn crossed_line(stop_lines: &[StopLine], previous: Point2<f32>, current: Point2<f32>) -> Option<&Line> {
    stop_lines
        .iter()
        .filter(|s| s.zone.as_ref().is_none_or(|z| z.contains(current)))
        .map(|s| &s.line)
        .find(|line| line.crossed(previous, current))
}

impl ViolationRule for RedLightRule {
    fn kind(&self) -> ViolationKind {
        ViolationKind::RedLight
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>) -> Vec<ViolationEvent> {
        let mut events = Vec::new();
        for track in ctx.tracks.iter().filter(|t| t.class.is_road_user()) {
            let Some(previous) = track.previous_rect() else {
                continue;
            };
            let current = track.rect();
            let Some(line) = crossed_line(&self.stop_lines, ground_point(&previous), ground_point(&current))
            else {
                continue;
            };

            match ctx.light.phase {
                SignalPhase::Red => {}
                SignalPhase::Unknown => {
                    debug!(
                        track_id = track.track_id,
                        line = line.tag(),
                        frame_index = ctx.frame_index,
                        "stop line crossed with unknown light phase, evaluation suppressed"
                    );
                    continue;
                }
                phase => {
                    debug!(
                        track_id = track.track_id,
                        line = line.tag(),
                        ?phase,
                        "stop line crossed legally"
                    );
                    continue;
                }
            }

            if self.latch.observe(track.track_id, ctx.frame_index, true, 1) {
                self.latch.mark_emitted(track.track_id);
                info!(
                    track_id = track.track_id,
                    line = line.tag(),
                    frame_index = ctx.frame_index,
                    "red-light violation"
                );
                events.push(ViolationEvent {
                    track_id: track.track_id,
                    kind: ViolationKind::RedLight,
                    frame_index: ctx.frame_index,
                    evidence: Evidence {
                        bbox: current,
                        secondary_bbox: Some(previous),
                        secondary_track_id: None,
                    },
                    confidence: track.confidence,
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
