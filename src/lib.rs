//! Traffic violation detection on top of IoU multi-object tracking.
//!
//! Frames flow through a fixed per-frame sequence: an external [`Detector`]
//! produces detections, the [`IouTracker`] assigns persistent track ids, the
//! [`LightEstimator`] debounces the signal phase, and the rule engines
//! (helmet, wrong-way, red-light) turn track histories into
//! [`ViolationEvent`]s. [`ViolationPipeline`] sequences all of it and returns
//! an annotated copy of every frame.

pub mod annotate;
pub mod config;
pub mod error;
pub mod events;
pub mod integration;
pub mod light;
pub mod rules;
pub mod tracker;
pub mod zones;

pub use annotate::Annotator;
pub use config::PipelineConfig;
pub use error::{DetectionUnavailable, PipelineError, Result};
pub use events::{EventLog, Evidence, ViolationEvent, ViolationKind, ViolationSummary};
pub use integration::{
    DetectionBuilder, Detector, IntoDetections, ReplayDetector, StopHandle, StreamOutcome,
    ViolationPipeline,
};
pub use light::{LightEstimator, LightObservation, LightState, SignalPhase};
pub use tracker::{Detection, IouTracker, ObjectClass, Rect, Track, TrackState, TrackUpdate};
pub use zones::{Line, LineSide, Zone, ZoneRegistry};
