//! Trait for object detection inference backends.

use std::collections::HashMap;

use image::RgbImage;

use crate::error::DetectionUnavailable;
use crate::tracker::Detection;

/// Trait for object detection inference backends.
///
/// Implement this trait to connect any detection model to the pipeline. The
/// call must not depend on earlier frames; the pipeline runs it on its own
/// worker thread, possibly ahead of the frame currently being tracked.
///
/// # Example
///
/// ```ignore
/// use tvdr_rs::{Detection, DetectionUnavailable, Detector};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl Detector for MyDetector {
///     fn detect(&self, frame: &image::RgbImage, frame_index: u64) -> Result<Vec<Detection>, DetectionUnavailable> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait Detector: Send {
    /// Run inference on one RGB frame.
    ///
    /// # Arguments
    /// * `frame` - Frame pixels, RGB order, stable size across a stream
    /// * `frame_index` - Position of the frame in the stream
    fn detect(
        &self,
        frame: &RgbImage,
        frame_index: u64,
    ) -> Result<Vec<Detection>, DetectionUnavailable>;
}

impl<F> Detector for F
where
    F: Fn(&RgbImage, u64) -> Result<Vec<Detection>, DetectionUnavailable> + Send,
{
    fn detect(
        &self,
        frame: &RgbImage,
        frame_index: u64,
    ) -> Result<Vec<Detection>, DetectionUnavailable> {
        self(frame, frame_index)
    }
}

/// Helper trait for converting model-specific outputs to `Detection`.
///
/// Implement this for your model's output format to enable easy conversion.
pub trait IntoDetections {
    /// Convert the output into a vector of detections.
    fn into_detections(self) -> Vec<Detection>;
}

impl IntoDetections for Vec<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self
    }
}

/// Detector that replays recorded detections by frame index.
///
/// Makes pipeline runs reproducible independently of a model's own
/// nondeterminism. Frames without a recording yield no detections.
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    frames: HashMap<u64, Vec<Detection>>,
    unavailable: HashMap<u64, String>,
}

impl ReplayDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(mut self, frame_index: u64, detections: impl IntoDetections) -> Self {
        self.record(frame_index, detections);
        self
    }

    /// Append detections to a frame's recording.
    pub fn record(&mut self, frame_index: u64, detections: impl IntoDetections) {
        self.frames
            .entry(frame_index)
            .or_default()
            .extend(detections.into_detections());
    }

    /// Make `frame_index` fail as if the model rejected the buffer.
    pub fn fail_on(mut self, frame_index: u64, reason: impl Into<String>) -> Self {
        self.unavailable.insert(frame_index, reason.into());
        self
    }
}

impl Detector for ReplayDetector {
    fn detect(
        &self,
        _frame: &RgbImage,
        frame_index: u64,
    ) -> Result<Vec<Detection>, DetectionUnavailable> {
        if let Some(reason) = self.unavailable.get(&frame_index) {
            return Err(DetectionUnavailable::Rejected(reason.clone()));
        }
        Ok(self.frames.get(&frame_index).cloned().unwrap_or_default())
    }
}
