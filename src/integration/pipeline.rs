//! ViolationPipeline: detection, tracking, light estimation, rules and
//! annotation for one frame stream.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbImage;
use tracing::{info, warn};

use crate::annotate::Annotator;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::events::{EventLog, ViolationEvent, ViolationKind};
use crate::integration::Detector;
use crate::integration::prefetch::DetectionWorker;
use crate::light::{LightEstimator, LightState};
use crate::rules::{self, FrameContext, RuleEngine, ViolationRule};
use crate::tracker::{Detection, IouTracker, Track};
use crate::zones::ZoneRegistry;

/// Cooperative stop request, checked once per frame boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed { frames_processed: u64 },
    Cancelled { frames_processed: u64 },
}

/// One violation-detection pipeline per video stream.
///
/// All tracking, light and rule state lives here; independent streams use
/// independent pipelines.
pub struct ViolationPipeline {
    worker: DetectionWorker,
    tracker: IouTracker,
    light: LightEstimator,
    engines: Vec<RuleEngine>,
    annotator: Annotator,
    registry: ZoneRegistry,
    event_log: EventLog,
    last_events: Vec<ViolationEvent>,
    dimensions: Option<(u32, u32)>,
    last_frame: Option<u64>,
    halted: bool,
    stop: StopHandle,
    config: PipelineConfig,
}

impl ViolationPipeline {
    /// Validate `config`, build every component and start the detection worker.
    ///
    /// Configuration errors (unknown zone or line tags, bad geometry,
    /// non-positive thresholds) surface here, before any frame.
    pub fn new<D: Detector + 'static>(config: PipelineConfig, detector: D) -> Result<Self> {
        config.validate()?;
        let registry = config.registry()?;
        let engines = rules::build_engines(&config, &registry)?;
        let annotator = Annotator::new(config.annotator.clone(), &registry)?;
        let worker = DetectionWorker::spawn(
            detector,
            config.prefetch_depth,
            config.detector_timeout(),
        )?;

        info!(
            helmet = config.detect_helmet_violation,
            wrong_way = config.detect_wrongway_violation,
            red_light = config.detect_running_redlight_violation,
            prefetch_depth = config.prefetch_depth,
            "violation pipeline ready"
        );

        Ok(Self {
            worker,
            tracker: IouTracker::new(config.tracker.clone()),
            light: LightEstimator::new(config.light.clone()),
            engines,
            annotator,
            registry,
            event_log: EventLog::new(),
            last_events: Vec::new(),
            dimensions: None,
            last_frame: None,
            halted: false,
            stop: StopHandle::default(),
            config,
        })
    }

    /// Process a single frame and return its annotated copy.
    ///
    /// Frames must arrive with strictly increasing `frame_index`; gaps are
    /// fine. The input buffer is never modified.
    pub fn process(&mut self, frame: &RgbImage, frame_index: u64) -> Result<RgbImage> {
        if self.stop.is_stop_requested() {
            self.cancel();
            return Err(PipelineError::Cancelled);
        }
        self.admit(frame_index, frame.dimensions())?;
        self.worker.submit(frame_index, Arc::new(frame.clone()));
        let detections = self.receive_detections(frame_index);
        Ok(self.advance(frame, frame_index, detections))
    }

    /// Drive a whole stream, keeping up to `prefetch_depth` frames in
    /// detection while earlier frames are tracked and annotated.
    ///
    /// `sink` receives annotated frames in input order. A stop request drops
    /// frames still in flight without emitting them. On a fatal frame error
    /// (dimension change, out-of-order index) the frames admitted before it
    /// are finished and then the error is returned.
    pub fn run_stream<I, F>(&mut self, frames: I, mut sink: F) -> Result<StreamOutcome>
    where
        I: IntoIterator<Item = (u64, RgbImage)>,
        F: FnMut(u64, RgbImage),
    {
        let mut frames = frames.into_iter();
        let mut pending: VecDeque<(u64, Arc<RgbImage>)> = VecDeque::new();
        let mut failure = None;
        let mut frames_processed = 0;

        loop {
            if self.stop.is_stop_requested() {
                info!(frames_processed, "stream cancelled");
                self.cancel();
                return Ok(StreamOutcome::Cancelled { frames_processed });
            }

            while failure.is_none() && pending.len() < self.worker.depth() {
                let Some((frame_index, frame)) = frames.next() else {
                    break;
                };
                if let Err(err) = self.admit(frame_index, frame.dimensions()) {
                    failure = Some(err);
                    break;
                }
                let frame = Arc::new(frame);
                self.worker.submit(frame_index, Arc::clone(&frame));
                pending.push_back((frame_index, frame));
            }

            let Some((frame_index, frame)) = pending.pop_front() else {
                break;
            };
            let detections = self.receive_detections(frame_index);
            let annotated = self.advance(&frame, frame_index, detections);
            sink(frame_index, annotated);
            frames_processed += 1;
        }

        match failure {
            Some(err) => Err(err),
            None => {
                info!(frames_processed, events = self.event_log.len(), "stream complete");
                Ok(StreamOutcome::Completed { frames_processed })
            }
        }
    }

    /// Check ordering and dimensions before a frame enters the pipeline.
    fn admit(&mut self, frame_index: u64, dimensions: (u32, u32)) -> Result<()> {
        if self.halted {
            return Err(PipelineError::Halted);
        }
        if let Some(previous) = self.last_frame {
            if frame_index <= previous {
                return Err(PipelineError::OutOfOrderFrame {
                    previous,
                    found: frame_index,
                });
            }
        }
        match self.dimensions {
            Some(expected) if expected != dimensions => {
                self.halted = true;
                return Err(PipelineError::DimensionMismatch {
                    expected,
                    found: dimensions,
                });
            }
            Some(_) => {}
            None => self.dimensions = Some(dimensions),
        }
        self.last_frame = Some(frame_index);
        Ok(())
    }

    fn receive_detections(&mut self, frame_index: u64) -> Vec<Detection> {
        match self.worker.receive(frame_index) {
            Ok(detections) => detections,
            Err(err) => {
                warn!(frame_index, error = %err, "detections unavailable, continuing without");
                Vec::new()
            }
        }
    }

    /// Track, update the light, run the rules and annotate one frame.
    fn advance(&mut self, frame: &RgbImage, frame_index: u64, detections: Vec<Detection>) -> RgbImage {
        let tracks: Vec<Track> = self
            .tracker
            .update(&detections, frame_index)
            .into_iter()
            .map(|u| u.track)
            .collect();
        let evicted = self.tracker.evicted_last_update();

        let observation = self.light.observation(&detections, frame);
        let light = self.light.update(observation, frame_index);

        let ctx = FrameContext {
            frame_index,
            tracks: &tracks,
            detections: &detections,
            light,
        };
        let mut events = Vec::new();
        for engine in &mut self.engines {
            engine.release(evicted);
            events.extend(engine.evaluate(&ctx));
        }

        self.event_log.extend(events.iter().cloned());
        let annotated = self
            .annotator
            .render(frame, self.tracker.active_tracks(), &events, &light);
        self.last_events = events;
        annotated
    }

    /// Release all per-stream state. The event log is kept.
    fn cancel(&mut self) {
        self.worker.discard_in_flight();
        self.reset_stream();
        self.stop.clear();
    }

    /// Start over with a fresh stream: tracks, light phase, rule state,
    /// established frame size and frame ordering are forgotten. Track ids keep
    /// counting, and the event log is kept.
    pub fn reset_stream(&mut self) {
        self.tracker.reset();
        self.light.reset();
        for engine in &mut self.engines {
            engine.reset();
        }
        self.last_events.clear();
        self.dimensions = None;
        self.last_frame = None;
        self.halted = false;
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Append-only log of every violation emitted so far.
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Events emitted by the most recent frame.
    pub fn last_events(&self) -> &[ViolationEvent] {
        &self.last_events
    }

    pub fn light_state(&self) -> LightState {
        self.light.state()
    }

    /// Get a reference to the underlying tracker.
    pub fn tracker(&self) -> &IouTracker {
        &self.tracker
    }

    pub fn zones(&self) -> &ZoneRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Kinds of the enabled engines, in evaluation order.
    pub fn enabled_rules(&self) -> Vec<ViolationKind> {
        self.engines.iter().map(|e| e.kind()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectionUnavailable;
    use crate::integration::ReplayDetector;
    use crate::tracker::ObjectClass;

    fn red_light_config() -> PipelineConfig {
        PipelineConfig::from_yaml_str(
            r#"
detect_running_redlight_violation: true
lines:
  - { tag: stop, from: [0, 50], to: [100, 50] }
red_light:
  stop_lines: [{ line: stop }]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_disabled_engines_not_built() {
        let pipeline = ViolationPipeline::new(red_light_config(), ReplayDetector::new()).unwrap();
        assert_eq!(pipeline.enabled_rules(), vec![ViolationKind::RedLight]);

        let pipeline = ViolationPipeline::new(PipelineConfig::default(), ReplayDetector::new()).unwrap();
        assert!(pipeline.enabled_rules().is_empty());
    }

    #[test]
    fn test_unknown_tag_fails_before_first_frame() {
        let mut config = red_light_config();
        config.red_light.stop_lines[0].line = "missing".into();
        assert!(matches!(
            ViolationPipeline::new(config, ReplayDetector::new()),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_detector_failure_is_not_fatal() {
        let car = Detection::new(10.0, 10.0, 30.0, 30.0, ObjectClass::Vehicle, 0.9);
        let detector = ReplayDetector::new()
            .with_frame(0, vec![car.clone()])
            .fail_on(1, "corrupt buffer")
            .with_frame(2, vec![car]);
        let mut pipeline = ViolationPipeline::new(PipelineConfig::default(), detector).unwrap();
        let frame = RgbImage::new(100, 100);
        for i in 0..3 {
            pipeline.process(&frame, i).unwrap();
        }
        let track = &pipeline.tracker().active_tracks()[0];
        assert_eq!(track.track_id, 1);
        assert_eq!(track.last_seen, 2);
    }

    #[test]
    fn test_stale_tracks_still_drawn() {
        let car = Detection::new(10.0, 10.0, 30.0, 30.0, ObjectClass::Vehicle, 0.9);
        let detector = ReplayDetector::new().with_frame(0, vec![car]);
        let mut pipeline = ViolationPipeline::new(PipelineConfig::default(), detector).unwrap();
        let frame = RgbImage::new(40, 40);
        pipeline.process(&frame, 0).unwrap();
        let annotated = pipeline.process(&frame, 1).unwrap();
        assert_eq!(pipeline.tracker().active_tracks()[0].state, crate::tracker::TrackState::Lost);
        assert_ne!(*annotated.get_pixel(10, 10), image::Rgb([0, 0, 0]));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut pipeline = ViolationPipeline::new(PipelineConfig::default(), ReplayDetector::new()).unwrap();
        let frame = RgbImage::new(8, 8);
        pipeline.process(&frame, 3).unwrap();
        assert!(matches!(
            pipeline.process(&frame, 3),
            Err(PipelineError::OutOfOrderFrame { previous: 3, found: 3 })
        ));
        assert!(pipeline.process(&frame, 7).is_ok());
    }

    #[test]
    fn test_dimension_change_halts() {
        let mut pipeline = ViolationPipeline::new(PipelineConfig::default(), ReplayDetector::new()).unwrap();
        pipeline.process(&RgbImage::new(8, 8), 0).unwrap();
        assert!(matches!(
            pipeline.process(&RgbImage::new(16, 8), 1),
            Err(PipelineError::DimensionMismatch { expected: (8, 8), found: (16, 8) })
        ));
        assert!(matches!(
            pipeline.process(&RgbImage::new(8, 8), 2),
            Err(PipelineError::Halted)
        ));
    }

    #[test]
    fn test_timeout_yields_empty_frame() {
        let hang = |_: &RgbImage, frame_index: u64| {
            if frame_index == 0 {
                std::thread::sleep(std::time::Duration::from_millis(300));
            }
            Ok::<Vec<Detection>, DetectionUnavailable>(Vec::new())
        };
        let config = PipelineConfig {
            detector_timeout_ms: 30,
            ..PipelineConfig::default()
        };
        let mut pipeline = ViolationPipeline::new(config, hang).unwrap();
        let frame = RgbImage::new(8, 8);
        let out = pipeline.process(&frame, 0).unwrap();
        assert_eq!(out.dimensions(), (8, 8));
        assert!(pipeline.tracker().active_tracks().is_empty());
    }
}
