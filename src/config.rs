use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::annotate::AnnotatorConfig;
use crate::error::{PipelineError, Result};
use crate::light::LightConfig;
use crate::rules::{HelmetConfig, RedLightConfig, WrongWayConfig};
use crate::tracker::TrackerConfig;
use crate::zones::{LineConfig, ZoneConfig, ZoneRegistry};

/// Everything the pipeline needs before the first frame.
///
/// Every field has a default, so a YAML file only lists what it changes:
///
/// ```yaml
/// detect_running_redlight_violation: true
/// lines:
///   - { tag: stop-a, from: [0, 420], to: [640, 420] }
/// red_light:
///   stop_lines:
///     - { line: stop-a }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detect_helmet_violation: bool,
    pub detect_wrongway_violation: bool,
    pub detect_running_redlight_violation: bool,
    pub tracker: TrackerConfig,
    pub light: LightConfig,
    pub helmet: HelmetConfig,
    pub wrong_way: WrongWayConfig,
    pub red_light: RedLightConfig,
    pub zones: Vec<ZoneConfig>,
    pub lines: Vec<LineConfig>,
    /// Frames allowed in flight between the detector and the rest of the pipeline
    pub prefetch_depth: usize,
    pub detector_timeout_ms: u64,
    pub annotator: AnnotatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detect_helmet_violation: false,
            detect_wrongway_violation: false,
            detect_running_redlight_violation: false,
            tracker: TrackerConfig::default(),
            light: LightConfig::default(),
            helmet: HelmetConfig::default(),
            wrong_way: WrongWayConfig::default(),
            red_light: RedLightConfig::default(),
            zones: Vec::new(),
            lines: Vec::new(),
            prefetch_depth: 2,
            detector_timeout_ms: 2000,
            annotator: AnnotatorConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.detector_timeout_ms)
    }

    /// Build the zone registry described by `zones` and `lines`.
    pub fn registry(&self) -> Result<ZoneRegistry> {
        ZoneRegistry::new(&self.zones, &self.lines)
    }

    /// Check thresholds and geometry. Rule sections are only checked for
    /// enabled rules; tag references are resolved when the engines are built.
    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        self.light.validate()?;
        self.annotator.validate()?;
        if self.detect_helmet_violation {
            self.helmet.validate()?;
        }
        if self.detect_wrongway_violation {
            self.wrong_way.validate()?;
        }
        if self.detect_running_redlight_violation {
            self.red_light.validate()?;
        }
        if self.prefetch_depth == 0 {
            return Err(PipelineError::config("prefetch_depth must be positive"));
        }
        if self.detector_timeout_ms == 0 {
            return Err(PipelineError::config("detector_timeout_ms must be positive"));
        }
        self.registry()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{LightSource, SignalPhase};

    const SAMPLE: &str = r#"
detect_helmet_violation: true
detect_wrongway_violation: true
detect_running_redlight_violation: true
tracker:
  iou_threshold: 0.4
light:
  source: { kind: region, roi: { x: 10, y: 10, width: 8, height: 20 }, min_lit_fraction: 0.2 }
  debounce_frames: 4
helmet:
  min_consecutive_frames: 3
zones:
  - tag: northbound
    polygon: [[0, 0], [320, 0], [320, 480], [0, 480]]
    permitted_direction: [0, -1]
lines:
  - { tag: stop-a, from: [0, 300], to: [320, 300] }
wrong_way:
  zones: [northbound]
red_light:
  stop_lines:
    - { line: stop-a, zone: northbound }
"#;

    #[test]
    fn test_parse_sample() {
        let config = PipelineConfig::from_yaml_str(SAMPLE).unwrap();
        assert!(config.detect_helmet_violation);
        assert_eq!(config.tracker.iou_threshold, 0.4);
        assert_eq!(config.tracker.max_missed_frames, 10);
        assert_eq!(config.light.debounce_frames, 4);
        assert!(matches!(config.light.source, LightSource::Region { .. }));
        assert_eq!(config.helmet.min_consecutive_frames, 3);
        assert_eq!(config.helmet.containment_ratio, 0.9);
        assert_eq!(config.red_light.stop_lines[0].zone.as_deref(), Some("northbound"));
        assert_eq!(config.prefetch_depth, 2);
        assert_eq!(SignalPhase::default(), SignalPhase::Unknown);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = PipelineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        assert!(PipelineConfig::from_yaml_str("tracker: { iou_threshold: -1.0 }").is_err());
        assert!(PipelineConfig::from_yaml_str("light: { debounce_frames: 0 }").is_err());
        assert!(PipelineConfig::from_yaml_str("prefetch_depth: 0").is_err());
        assert!(
            PipelineConfig::from_yaml_str(
                "detect_helmet_violation: true\nhelmet: { min_consecutive_frames: 0 }"
            )
            .is_err()
        );
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let yaml = "zones:\n  - { tag: z, polygon: [[0, 0], [1, 1]] }";
        assert!(matches!(
            PipelineConfig::from_yaml_str(yaml),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_disabled_rule_sections_not_checked() {
        // Red light is off, so the empty stop line list is fine.
        assert!(PipelineConfig::from_yaml_str("detect_helmet_violation: true").is_ok());
        assert!(PipelineConfig::from_yaml_str("detect_running_redlight_violation: true").is_err());
    }
}
