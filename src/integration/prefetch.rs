//! Detection worker with a bounded job queue.
//!
//! Detection does not depend on tracking state, so it runs on its own thread
//! ahead of the frame being tracked. The job queue holds at most `depth`
//! frames; submitting blocks while it is full, up to the detector timeout.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use image::RgbImage;
use tracing::debug;

use crate::error::{DetectionUnavailable, Result};
use crate::integration::Detector;
use crate::tracker::Detection;

struct Job {
    ticket: u64,
    frame_index: u64,
    frame: Arc<RgbImage>,
}

struct Outcome {
    ticket: u64,
    result: std::result::Result<Vec<Detection>, DetectionUnavailable>,
}

/// Frame handed to the worker, in submission order.
struct InFlight {
    frame_index: u64,
    /// None when the job could not be queued in time
    ticket: Option<u64>,
}

pub struct DetectionWorker {
    jobs: Sender<Job>,
    results: Receiver<Outcome>,
    in_flight: VecDeque<InFlight>,
    next_ticket: u64,
    depth: usize,
    timeout: Duration,
}

impl DetectionWorker {
    /// Move `detector` onto a dedicated thread.
    pub fn spawn<D: Detector + 'static>(detector: D, depth: usize, timeout: Duration) -> Result<Self> {
        let (jobs_tx, jobs_rx) = channel::bounded::<Job>(depth);
        // Results are bounded by the jobs in flight; an unbounded queue keeps
        // the worker from blocking on results the consumer already gave up on.
        let (results_tx, results_rx) = channel::unbounded::<Outcome>();

        thread::Builder::new()
            .name("detector".into())
            .spawn(move || {
                for job in jobs_rx.iter() {
                    let result = detector.detect(&job.frame, job.frame_index);
                    let outcome = Outcome {
                        ticket: job.ticket,
                        result,
                    };
                    if results_tx.send(outcome).is_err() {
                        break;
                    }
                }
                debug!("detection worker exiting");
            })?;

        Ok(Self {
            jobs: jobs_tx,
            results: results_rx,
            in_flight: VecDeque::with_capacity(depth),
            next_ticket: 0,
            depth,
            timeout,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Queue a frame for detection, blocking while the queue is full.
    pub fn submit(&mut self, frame_index: u64, frame: Arc<RgbImage>) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let job = Job {
            ticket,
            frame_index,
            frame,
        };
        let ticket = match self.jobs.send_timeout(job, self.timeout) {
            Ok(()) => Some(ticket),
            Err(SendTimeoutError::Timeout(_)) => {
                debug!(frame_index, "detection queue still full after timeout");
                None
            }
            Err(SendTimeoutError::Disconnected(_)) => None,
        };
        self.in_flight.push_back(InFlight {
            frame_index,
            ticket,
        });
    }

    /// Wait for the detections of the oldest submitted frame.
    ///
    /// `frame_index` must be the oldest frame in flight. Waits at most the
    /// configured timeout; results arriving later are dropped.
    pub fn receive(
        &mut self,
        frame_index: u64,
    ) -> std::result::Result<Vec<Detection>, DetectionUnavailable> {
        let Some(front) = self.in_flight.pop_front() else {
            return Err(DetectionUnavailable::WorkerStopped);
        };
        debug_assert_eq!(front.frame_index, frame_index);
        let Some(ticket) = front.ticket else {
            return Err(DetectionUnavailable::TimedOut(self.timeout));
        };

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(outcome) if outcome.ticket < ticket => {
                    debug!(ticket = outcome.ticket, "dropping late detection result");
                }
                Ok(outcome) => return outcome.result,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(DetectionUnavailable::TimedOut(self.timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DetectionUnavailable::WorkerStopped);
                }
            }
        }
    }

    /// Forget every queued frame; their results will be dropped on arrival.
    pub fn discard_in_flight(&mut self) {
        self.in_flight.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ObjectClass;

    fn frame() -> Arc<RgbImage> {
        Arc::new(RgbImage::new(4, 4))
    }

    fn echo(_: &RgbImage, frame_index: u64) -> std::result::Result<Vec<Detection>, DetectionUnavailable> {
        let x = frame_index as f32;
        Ok(vec![Detection::new(x, 0.0, x + 1.0, 1.0, ObjectClass::Vehicle, 0.9)])
    }

    #[test]
    fn test_results_in_submission_order() {
        let mut worker = DetectionWorker::spawn(echo, 3, Duration::from_secs(5)).unwrap();
        for i in 0..3 {
            worker.submit(i, frame());
        }
        assert_eq!(worker.in_flight(), 3);
        for i in 0..3 {
            let dets = worker.receive(i).unwrap();
            assert_eq!(dets[0].bbox.x, i as f32);
        }
        assert_eq!(worker.in_flight(), 0);
    }

    #[test]
    fn test_slow_detector_times_out_then_recovers() {
        let slow = |_: &RgbImage, frame_index: u64| {
            if frame_index == 0 {
                thread::sleep(Duration::from_millis(300));
            }
            echo(&RgbImage::new(1, 1), frame_index)
        };
        let mut worker = DetectionWorker::spawn(slow, 2, Duration::from_millis(50)).unwrap();
        worker.submit(0, frame());
        assert!(matches!(worker.receive(0), Err(DetectionUnavailable::TimedOut(_))));

        // The late result for frame 0 must not be handed out as frame 1's.
        worker.submit(1, frame());
        thread::sleep(Duration::from_millis(400));
        let dets = worker.receive(1).unwrap();
        assert_eq!(dets[0].bbox.x, 1.0);
    }

    #[test]
    fn test_discarded_results_not_reused() {
        let mut worker = DetectionWorker::spawn(echo, 2, Duration::from_secs(5)).unwrap();
        worker.submit(5, frame());
        worker.discard_in_flight();
        worker.submit(0, frame());
        assert_eq!(worker.receive(0).unwrap()[0].bbox.x, 0.0);
    }
}
