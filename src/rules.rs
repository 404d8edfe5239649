//! Violation rule engines.
//!
//! Every engine implements [`ViolationRule`]; the pipeline holds a fixed list
//! of [`RuleEngine`] values and runs them in order Helmet, WrongWay, RedLight.

mod helmet;
mod red_light;
mod state;
mod wrong_way;

pub use helmet::{HelmetConfig, HelmetRule};
pub use red_light::{RedLightConfig, RedLightRule, StopLineConfig};
pub use state::{RuleLatch, RuleState};
pub use wrong_way::{WrongWayConfig, WrongWayRule};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::events::{ViolationEvent, ViolationKind};
use crate::light::LightState;
use crate::tracker::{Detection, Track};
use crate::zones::ZoneRegistry;

/// Everything a rule may look at for one frame. Read-only.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub frame_index: u64,
    /// Tracks matched or born on this frame
    pub tracks: &'a [Track],
    /// All raw detections of this frame, including sub-detections
    pub detections: &'a [Detection],
    pub light: LightState,
}

pub trait ViolationRule {
    fn kind(&self) -> ViolationKind;

    /// Events for this frame; at most one per track over the track's lifetime.
    fn evaluate(&mut self, ctx: &FrameContext<'_>) -> Vec<ViolationEvent>;

    /// Drop bookkeeping for evicted tracks.
    fn release(&mut self, evicted: &[u64]);

    fn reset(&mut self);
}

pub enum RuleEngine {
    Helmet(HelmetRule),
    WrongWay(WrongWayRule),
    RedLight(RedLightRule),
}

impl ViolationRule for RuleEngine {
    fn kind(&self) -> ViolationKind {
        match self {
            RuleEngine::Helmet(rule) => rule.kind(),
            RuleEngine::WrongWay(rule) => rule.kind(),
            RuleEngine::RedLight(rule) => rule.kind(),
        }
    }

    fn evaluate(&mut self, ctx: &FrameContext<'_>) -> Vec<ViolationEvent> {
        match self {
            RuleEngine::Helmet(rule) => rule.evaluate(ctx),
            RuleEngine::WrongWay(rule) => rule.evaluate(ctx),
            RuleEngine::RedLight(rule) => rule.evaluate(ctx),
        }
    }

    fn release(&mut self, evicted: &[u64]) {
        match self {
            RuleEngine::Helmet(rule) => rule.release(evicted),
            RuleEngine::WrongWay(rule) => rule.release(evicted),
            RuleEngine::RedLight(rule) => rule.release(evicted),
        }
    }

    fn reset(&mut self) {
        match self {
            RuleEngine::Helmet(rule) => rule.reset(),
            RuleEngine::WrongWay(rule) => rule.reset(),
            RuleEngine::RedLight(rule) => rule.reset(),
        }
    }
}

/// Construct the enabled engines in evaluation order.
///
/// Disabled engines are not constructed at all.
pub fn build_engines(config: &PipelineConfig, registry: &ZoneRegistry) -> Result<Vec<RuleEngine>> {
    let mut engines = Vec::new();
    if config.detect_helmet_violation {
        engines.push(RuleEngine::Helmet(HelmetRule::new(config.helmet.clone())?));
    }
    if config.detect_wrongway_violation {
        engines.push(RuleEngine::WrongWay(WrongWayRule::new(
            config.wrong_way.clone(),
            registry,
        )?));
    }
    if config.detect_running_redlight_violation {
        engines.push(RuleEngine::RedLight(RedLightRule::new(
            config.red_light.clone(),
            registry,
        )?));
    }
    Ok(engines)
}
