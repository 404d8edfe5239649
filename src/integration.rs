//! Integration module for connecting object detection backends with the
//! tracking and violation rules.
//!
//! This module provides the [`Detector`] trait, helpers for building
//! detections from model output, the prefetching detection worker, and the
//! [`ViolationPipeline`] orchestrator.

mod builder;
mod detector;
mod pipeline;
mod prefetch;

pub use builder::DetectionBuilder;
pub use detector::{Detector, IntoDetections, ReplayDetector};
pub use pipeline::{StopHandle, StreamOutcome, ViolationPipeline};
pub use prefetch::DetectionWorker;
