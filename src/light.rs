//! Debounced traffic-light phase estimation.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::tracker::{Detection, ObjectClass, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalPhase {
    Red,
    Yellow,
    Green,
    #[default]
    Unknown,
}

impl SignalPhase {
    fn from_class(class: ObjectClass) -> Option<Self> {
        match class {
            ObjectClass::RedLight => Some(SignalPhase::Red),
            ObjectClass::YellowLight => Some(SignalPhase::Yellow),
            ObjectClass::GreenLight => Some(SignalPhase::Green),
            _ => None,
        }
    }
}

/// Reported signal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightState {
    pub phase: SignalPhase,
    /// Frame on which `phase` was accepted
    pub last_change_frame: Option<u64>,
    /// Consecutive observations of a phase that differs from `phase`
    pub debounce_counter: u32,
}

/// Where the estimator reads the signal from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LightSource {
    /// Use red/yellow/green light detections from the detector.
    Detection { min_confidence: f32 },
    /// Classify the lit color of a fixed image region.
    Region { roi: Rect, min_lit_fraction: f32 },
}

impl Default for LightSource {
    fn default() -> Self {
        LightSource::Detection {
            min_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub source: LightSource,
    pub debounce_frames: u32,
    /// Frames without any confident observation before falling back to Unknown
    pub unknown_after_frames: u64,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            source: LightSource::default(),
            debounce_frames: 3,
            unknown_after_frames: 90,
        }
    }
}

impl LightConfig {
    pub fn validate(&self) -> Result<()> {
        if self.debounce_frames == 0 {
            return Err(PipelineError::config("light.debounce_frames must be positive"));
        }
        if self.unknown_after_frames == 0 {
            return Err(PipelineError::config(
                "light.unknown_after_frames must be positive",
            ));
        }
        match &self.source {
            LightSource::Detection { min_confidence } => {
                if !(0.0..=1.0).contains(min_confidence) {
                    return Err(PipelineError::config(format!(
                        "light.source.min_confidence must be in [0, 1], got {min_confidence}"
                    )));
                }
            }
            LightSource::Region {
                roi,
                min_lit_fraction,
            } => {
                if !roi.is_valid() {
                    return Err(PipelineError::config("light.source.roi must have positive size"));
                }
                if !(*min_lit_fraction > 0.0 && *min_lit_fraction <= 1.0) {
                    return Err(PipelineError::config(format!(
                        "light.source.min_lit_fraction must be in (0, 1], got {min_lit_fraction}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Raw per-frame evidence of the signal phase.
#[derive(Debug, Clone, Copy)]
pub enum LightObservation<'a> {
    Detections(&'a [Detection]),
    Region(&'a RgbImage),
}

pub struct LightEstimator {
    config: LightConfig,
    state: LightState,
    candidate: Option<SignalPhase>,
    last_observed: Option<u64>,
}

impl LightEstimator {
    pub fn new(config: LightConfig) -> Self {
        Self {
            config,
            state: LightState::default(),
            candidate: None,
            last_observed: None,
        }
    }

    pub fn config(&self) -> &LightConfig {
        &self.config
    }

    pub fn state(&self) -> LightState {
        self.state
    }

    /// Build the observation matching the configured source.
    pub fn observation<'a>(
        &self,
        detections: &'a [Detection],
        frame: &'a RgbImage,
    ) -> LightObservation<'a> {
        match self.config.source {
            LightSource::Detection { .. } => LightObservation::Detections(detections),
            LightSource::Region { .. } => LightObservation::Region(frame),
        }
    }

    pub fn update(&mut self, observation: LightObservation<'_>, frame_index: u64) -> LightState {
        let observed = match (&self.config.source, observation) {
            (LightSource::Detection { min_confidence }, LightObservation::Detections(dets)) => {
                phase_from_detections(dets, *min_confidence)
            }
            (
                LightSource::Region {
                    roi,
                    min_lit_fraction,
                },
                LightObservation::Region(frame),
            ) => classify_region(frame, roi, *min_lit_fraction),
            _ => {
                debug!(frame_index, "light observation does not match configured source");
                None
            }
        };

        match observed {
            Some(phase) => {
                self.last_observed = Some(frame_index);
                self.observe(phase, frame_index);
            }
            None => self.decay(frame_index),
        }
        self.state
    }

    fn observe(&mut self, phase: SignalPhase, frame_index: u64) {
        if phase == self.state.phase {
            self.candidate = None;
            self.state.debounce_counter = 0;
            return;
        }

        if self.candidate == Some(phase) {
            self.state.debounce_counter += 1;
        } else {
            self.candidate = Some(phase);
            self.state.debounce_counter = 1;
        }

        if self.state.debounce_counter >= self.config.debounce_frames {
            info!(
                from = ?self.state.phase,
                to = ?phase,
                frame_index,
                "traffic light phase changed"
            );
            self.state = LightState {
                phase,
                last_change_frame: Some(frame_index),
                debounce_counter: 0,
            };
            self.candidate = None;
        }
    }

    fn decay(&mut self, frame_index: u64) {
        if self.state.phase == SignalPhase::Unknown {
            return;
        }
        let since = self.last_observed.map(|f| frame_index.saturating_sub(f));
        if since.is_some_and(|s| s > self.config.unknown_after_frames) {
            info!(frame_index, "traffic light not observed, phase unknown");
            self.state = LightState {
                phase: SignalPhase::Unknown,
                last_change_frame: Some(frame_index),
                debounce_counter: 0,
            };
            self.candidate = None;
        }
    }

    pub fn reset(&mut self) {
        self.state = LightState::default();
        self.candidate = None;
        self.last_observed = None;
    }
}

/// Phase of the most confident light detection above `min_confidence`.
fn phase_from_detections(detections: &[Detection], min_confidence: f32) -> Option<SignalPhase> {
    detections
        .iter()
        .filter(|d| d.class.is_traffic_light() && d.confidence >= min_confidence)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .and_then(|d| SignalPhase::from_class(d.class))
}

/// Count bright red, yellow and green pixels inside `roi` and return the
/// dominant one when it covers at least `min_lit_fraction` of the region.
pub fn classify_region(frame: &RgbImage, roi: &Rect, min_lit_fraction: f32) -> Option<SignalPhase> {
    let (width, height) = frame.dimensions();
    let x0 = roi.x.max(0.0) as u32;
    let y0 = roi.y.max(0.0) as u32;
    let x1 = (roi.right().max(0.0) as u32).min(width);
    let y1 = (roi.bottom().max(0.0) as u32).min(height);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }

    let mut counts = [0u32; 3];
    for y in y0..y1 {
        for x in x0..x1 {
            let [r, g, b] = frame.get_pixel(x, y).0;
            let (r, g, b) = (r as i32, g as i32, b as i32);
            if r > 150 && g > 120 && b < 100 && (r - g).abs() < 90 {
                counts[1] += 1;
            } else if r > 150 && r - g > 60 && r - b > 60 {
                counts[0] += 1;
            } else if g > 150 && g - r > 60 && g - b > 20 {
                counts[2] += 1;
            }
        }
    }

    let total = ((x1 - x0) * (y1 - y0)) as f32;
    let phases = [SignalPhase::Red, SignalPhase::Yellow, SignalPhase::Green];
    let (idx, &best) = counts.iter().enumerate().max_by_key(|(_, c)| **c)?;
    if best as f32 / total >= min_lit_fraction {
        Some(phases[idx])
    } else {
        None
    }
}
