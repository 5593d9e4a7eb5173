//! Head tracker service
//!
//! Owns the background capture loop. `start` opens the camera on the calling
//! thread so an unavailable device is reported immediately, then shares the
//! opened source with a dedicated worker thread. The worker reads, detects,
//! reduces and publishes one [`Snapshot`] per frame until the run flag is
//! cleared. `stop` takes the source back and drops it, so the device is free
//! again as soon as `stop` returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camera_capture::{CameraProvider, FrameSource, VideoFrame};
use detection::{detect_or_empty, ObjectDetector};
use tracing::{debug, error, info, warn};

use crate::state::SnapshotCell;
use crate::{
    classify_gaze, reduce, Action, ControlState, FaceLocator, GazeReading, Snapshot,
    SnapshotReader, TrackerConfig, TrackerError,
};

/// Camera source shared between the tracker and its worker; `None` once released
type SharedSource = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One started run of the capture loop
struct Run {
    running: Arc<AtomicBool>,
    source: SharedSource,
    handle: JoinHandle<()>,
}

/// Background perception-to-control pipeline
pub struct HeadTracker {
    config: TrackerConfig,
    camera: Arc<dyn CameraProvider>,
    detector: Arc<dyn ObjectDetector>,
    face_locator: Option<Arc<dyn FaceLocator>>,
    cell: Arc<SnapshotCell>,
    run: Mutex<Option<Run>>,
}

impl HeadTracker {
    /// Create a stopped tracker
    pub fn new(
        config: TrackerConfig,
        camera: Arc<dyn CameraProvider>,
        detector: Arc<dyn ObjectDetector>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        info!(
            "Head tracker created (camera={}, detector={}, {}x{}, inference {})",
            camera.name(),
            detector.name(),
            config.capture_width,
            config.capture_height,
            config.inference_size
        );

        Ok(Self {
            config,
            camera,
            detector,
            face_locator: None,
            cell: Arc::new(SnapshotCell::default()),
            run: Mutex::new(None),
        })
    }

    /// Attach a face locator used for gaze gating
    pub fn with_face_locator(mut self, locator: Arc<dyn FaceLocator>) -> Self {
        self.face_locator = Some(locator);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<Run>> {
        lock(&self.run)
    }

    /// Whether acceleration is gated on gaze for the next run
    pub fn gaze_gating_active(&self) -> bool {
        self.config.gaze_gating && self.face_locator.is_some()
    }

    /// Open the camera and start the capture loop
    pub fn start(&self) -> Result<(), TrackerError> {
        let mut run = self.lock_run();
        if run.as_ref().is_some_and(|r| r.running.load(Ordering::Acquire)) {
            return Err(TrackerError::AlreadyRunning);
        }
        if let Some(previous) = run.take() {
            // Already released its source; at most one inference left
            if previous.handle.join().is_err() {
                error!("Previous capture thread panicked");
            }
        }

        let camera_config = self.config.camera_config();
        let source = self.camera.open(&camera_config).map_err(|e| {
            error!("Could not open camera {}: {}", camera_config.index, e);
            TrackerError::CameraUnavailable(e)
        })?;

        let face_locator = match (&self.face_locator, self.config.gaze_gating) {
            (Some(locator), true) => Some(Arc::clone(locator)),
            (None, true) => {
                warn!("Gaze gating enabled but no face locator attached, ignoring");
                None
            }
            _ => None,
        };

        self.cell.reset();
        let running = Arc::new(AtomicBool::new(true));
        let source: SharedSource = Arc::new(Mutex::new(Some(source)));
        let worker = CaptureLoop {
            config: self.config.clone(),
            source: Arc::clone(&source),
            detector: Arc::clone(&self.detector),
            face_locator,
            cell: Arc::clone(&self.cell),
            running: Arc::clone(&running),
        };

        let handle = thread::Builder::new()
            .name("head-tracker-capture".into())
            .spawn(move || worker.run())
            .map_err(|e| TrackerError::Spawn(e.to_string()))?;

        info!("Head tracker started on camera {}", camera_config.index);
        *run = Some(Run {
            running,
            source,
            handle,
        });
        Ok(())
    }

    /// Stop the capture loop, release the camera and reset the published
    /// state.
    ///
    /// Waits for an in-flight frame read, not for in-flight inference; the
    /// worker thread exits on its own right after.
    pub fn stop(&self) {
        let run = self.lock_run();
        let Some(run) = run.as_ref() else {
            return;
        };
        if !run.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.cell.reset();
        drop(lock(&run.source).take());
        info!("Head tracker stopped, camera released");
    }

    /// Stop and wait until the worker thread has exited
    pub fn stop_and_wait(&self) {
        self.stop();
        let finished = self.lock_run().take();
        if let Some(run) = finished {
            if run.handle.join().is_err() {
                error!("Capture thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_run()
            .as_ref()
            .is_some_and(|r| r.running.load(Ordering::Acquire))
    }

    /// Handle for consumers polling the state from other threads
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader::new(Arc::clone(&self.cell), self.config.mirror_display)
    }

    /// Latest control signal
    pub fn get_state(&self) -> ControlState {
        self.reader().get_state()
    }

    /// Latest frame for display
    pub fn get_frame(&self) -> Option<VideoFrame> {
        self.reader().get_frame()
    }
}

impl Drop for HeadTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Published iterations per second, refreshed once per second
struct FpsCounter {
    window_start: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) -> f32 {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = Instant::now();
        }
        self.fps
    }
}

/// State moved onto the capture thread
struct CaptureLoop {
    config: TrackerConfig,
    source: SharedSource,
    detector: Arc<dyn ObjectDetector>,
    face_locator: Option<Arc<dyn FaceLocator>>,
    cell: Arc<SnapshotCell>,
    running: Arc<AtomicBool>,
}

impl CaptureLoop {
    fn run(self) {
        debug!("Capture loop running");
        let mut sequence = 0u64;
        let mut fps = FpsCounter::new();

        while self.running.load(Ordering::Acquire) {
            let read = match lock(&self.source).as_mut() {
                Some(source) => source.read_frame(),
                None => break,
            };
            let frame = match read {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("Frame read failed: {}", e);
                    metrics::counter!("tracker_frame_read_failures_total").increment(1);
                    continue;
                }
            };

            let started = Instant::now();
            let detections = detect_or_empty(
                self.detector.as_ref(),
                &frame,
                self.config.confidence_threshold,
                self.config.inference_size,
            );
            metrics::histogram!("tracker_detector_latency_seconds")
                .record(started.elapsed().as_secs_f64());

            let reduction = reduce(&detections, self.config.mirror_controls);
            let mut control = ControlState {
                direction: reduction.direction,
                action: reduction.action,
                confidence: reduction.confidence,
                detections: reduction.labels,
            };

            let gaze = self.face_locator.as_deref().map(|l| read_gaze(l, &frame));
            if let Some(reading) = gaze {
                if control.action == Action::Accelerate && !reading.looking_at_screen() {
                    debug!("Acceleration gated: gaze {:?}", reading.direction);
                    control.action = Action::Stop;
                }
            }

            sequence += 1;
            let snapshot = Snapshot {
                control,
                frame: Some(Arc::new(frame)),
                raw_detections: detections,
                sequence,
                fps: fps.tick(),
                gaze,
            };

            if !self.cell.publish_if(&self.running, snapshot) {
                break;
            }
            metrics::counter!("tracker_frames_processed_total").increment(1);
        }

        info!("Capture loop exited after {} frames", sequence);
    }
}

fn read_gaze(locator: &dyn FaceLocator, frame: &VideoFrame) -> GazeReading {
    match locator.locate(frame) {
        Ok(observation) => classify_gaze(observation.as_ref()),
        Err(e) => {
            warn!("Face locator {} failed: {}", locator.name(), e);
            classify_gaze(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, FaceObservation, GazeDirection};
    use camera_capture::{CameraConfig, CameraError};
    use detection::{BBox, Detection, DetectionError, MockDetector};
    use std::sync::atomic::AtomicU32;

    /// Frames whose first pixel's red channel carries the sequence number
    struct CountingCamera {
        fail_open: bool,
        /// Every n-th read fails
        fail_every: Option<u32>,
        opened: AtomicU32,
    }

    impl CountingCamera {
        fn new() -> Self {
            Self {
                fail_open: false,
                fail_every: None,
                opened: AtomicU32::new(0),
            }
        }
    }

    struct CountingSource {
        width: u32,
        height: u32,
        reads: u32,
        sequence: u32,
        fail_every: Option<u32>,
    }

    impl CameraProvider for CountingCamera {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn open(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
            if self.fail_open {
                return Err(CameraError::Open {
                    index: config.index,
                    reason: "no such device".into(),
                });
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingSource {
                width: config.width,
                height: config.height,
                reads: 0,
                sequence: 0,
                fail_every: self.fail_every,
            }))
        }
    }

    impl FrameSource for CountingSource {
        fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
            thread::sleep(Duration::from_millis(1));
            self.reads += 1;
            if self.fail_every.is_some_and(|n| self.reads % n == 0) {
                return Err(CameraError::Stream("dropped frame".into()));
            }
            self.sequence += 1;
            let mut frame = VideoFrame::solid(self.width, self.height, [0, 0, 255]);
            frame.data[0] = (self.sequence % 256) as u8;
            frame.data[1] = 0;
            frame.data[2] = 0;
            frame.sequence = self.sequence;
            Ok(frame)
        }
    }

    /// BOOK_LEFT on even frames, BOOK_RIGHT on odd ones
    struct ParityDetector;

    impl ObjectDetector for ParityDetector {
        fn name(&self) -> &'static str {
            "parity"
        }

        fn detect(&self, frame: &VideoFrame, _: f32, _: u32) -> Result<Vec<Detection>, DetectionError> {
            let class_id = if frame.data[0] % 2 == 0 { 3 } else { 1 };
            Ok(vec![Detection::new(class_id, 0.9)])
        }
    }

    struct FailingDetector;

    impl ObjectDetector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&self, _: &VideoFrame, _: f32, _: u32) -> Result<Vec<Detection>, DetectionError> {
            Err(DetectionError::Inference("model crashed".into()))
        }
    }

    struct FixedLocator(Option<FaceObservation>);

    impl FaceLocator for FixedLocator {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn locate(&self, _: &VideoFrame) -> Result<Option<FaceObservation>, DetectionError> {
            Ok(self.0.clone())
        }
    }

    fn test_config() -> TrackerConfig {
        TrackerConfig {
            capture_width: 4,
            capture_height: 2,
            mirror_controls: false,
            mirror_display: false,
            ..Default::default()
        }
    }

    fn tracker(
        config: TrackerConfig,
        camera: CountingCamera,
        detector: impl ObjectDetector + 'static,
    ) -> HeadTracker {
        HeadTracker::new(config, Arc::new(camera), Arc::new(detector)).unwrap()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TrackerConfig {
            inference_size: 0,
            ..test_config()
        };
        let result = HeadTracker::new(
            config,
            Arc::new(CountingCamera::new()),
            Arc::new(MockDetector::default()),
        );
        assert!(matches!(result, Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_failed_open_keeps_default_state() {
        let camera = CountingCamera {
            fail_open: true,
            ..CountingCamera::new()
        };
        let tracker = tracker(test_config(), camera, MockDetector::default());

        let result = tracker.start();
        assert!(matches!(result, Err(TrackerError::CameraUnavailable(_))));
        assert!(!tracker.is_running());
        assert_eq!(tracker.get_state(), ControlState::default());
        assert!(tracker.get_frame().is_none());
    }

    #[test]
    fn test_start_publishes_reduced_state() {
        let detector = MockDetector::new(vec![Detection::new(1, 0.8), Detection::new(4, 0.6)]);
        let config = TrackerConfig {
            mirror_controls: true,
            ..test_config()
        };
        let tracker = tracker(config, CountingCamera::new(), detector);

        assert_eq!(tracker.get_state(), ControlState::default());
        tracker.start().unwrap();
        assert!(tracker.is_running());
        assert!(wait_for(|| tracker.reader().snapshot().sequence >= 3));

        let state = tracker.get_state();
        assert_eq!(state.direction, Direction::Left);
        assert_eq!(state.action, Action::Accelerate);
        assert!((state.confidence - 0.8).abs() < 1e-6);
        assert_eq!(state.detections, vec!["book_right: 80%", "smiling: 60%"]);
        tracker.stop_and_wait();
    }

    #[test]
    fn test_read_failures_are_skipped() {
        let camera = CountingCamera {
            fail_every: Some(2),
            ..CountingCamera::new()
        };
        let tracker = tracker(test_config(), camera, ParityDetector);

        tracker.start().unwrap();
        assert!(wait_for(|| tracker.reader().snapshot().sequence >= 5));
        assert!(tracker.is_running());
        tracker.stop_and_wait();
    }

    #[test]
    fn test_detector_failure_publishes_fail_safe_state() {
        let tracker = tracker(test_config(), CountingCamera::new(), FailingDetector);

        tracker.start().unwrap();
        assert!(wait_for(|| tracker.reader().snapshot().sequence >= 3));

        let snapshot = tracker.reader().snapshot();
        assert_eq!(snapshot.control, ControlState::default());
        assert!(snapshot.frame.is_some());
        assert!(snapshot.raw_detections.is_empty());
        tracker.stop_and_wait();
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let tracker = tracker(test_config(), CountingCamera::new(), MockDetector::default());

        tracker.start().unwrap();
        assert!(matches!(tracker.start(), Err(TrackerError::AlreadyRunning)));
        tracker.stop_and_wait();
    }

    #[test]
    fn test_stop_resets_and_allows_restart() {
        let camera = Arc::new(CountingCamera::new());
        let tracker = HeadTracker::new(
            test_config(),
            camera.clone(),
            Arc::new(MockDetector::new(vec![Detection::new(3, 0.7)])),
        )
        .unwrap();

        tracker.start().unwrap();
        assert!(wait_for(|| tracker.get_state().direction == Direction::Left));

        tracker.stop();
        assert!(!tracker.is_running());
        assert_eq!(tracker.get_state(), ControlState::default());
        assert!(tracker.get_frame().is_none());

        // idempotent
        tracker.stop();
        tracker.stop_and_wait();
        assert_eq!(tracker.get_state(), ControlState::default());

        tracker.start().unwrap();
        assert!(wait_for(|| tracker.get_state().direction == Direction::Left));
        assert_eq!(camera.opened.load(Ordering::SeqCst), 2);
        tracker.stop_and_wait();
    }

    #[test]
    fn test_stopped_worker_never_publishes() {
        let tracker = tracker(test_config(), CountingCamera::new(), ParityDetector);
        tracker.start().unwrap();
        assert!(wait_for(|| tracker.reader().snapshot().sequence >= 1));

        tracker.stop();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(tracker.reader().snapshot().sequence, 0);
        assert_eq!(tracker.get_state(), ControlState::default());
    }

    #[test]
    fn test_get_frame_mirrors_for_display() {
        let config = TrackerConfig {
            mirror_display: true,
            ..test_config()
        };
        let tracker = tracker(config, CountingCamera::new(), MockDetector::default());
        tracker.start().unwrap();
        assert!(wait_for(|| tracker.get_frame().is_some()));

        let snapshot = tracker.reader().snapshot();
        let raw = snapshot.frame.as_ref().unwrap();
        let shown = tracker.get_frame().unwrap();
        assert_eq!(shown.width, raw.width);
        // the sequence-marked pixel moves from the left edge to the right edge
        assert_eq!(raw.get_pixel(1, 0), Some([0, 0, 255]));
        assert_eq!(shown.get_pixel(0, 0), Some([0, 0, 255]));
        assert_eq!(shown.get_pixel(3, 0).map(|p| p[2]), Some(0));
        tracker.stop_and_wait();
    }

    #[test]
    fn test_snapshot_pairs_state_with_its_frame() {
        let tracker = tracker(test_config(), CountingCamera::new(), ParityDetector);
        let reader = tracker.reader();
        tracker.start().unwrap();

        let mut checked = 0;
        let ok = wait_for(|| {
            let snapshot = reader.snapshot();
            if let Some(frame) = &snapshot.frame {
                let expected = if frame.data[0] % 2 == 0 {
                    Direction::Left
                } else {
                    Direction::Right
                };
                assert_eq!(snapshot.control.direction, expected);
                assert_eq!(snapshot.sequence, frame.sequence as u64);
                checked += 1;
            }
            checked >= 50
        });
        assert!(ok);
        tracker.stop_and_wait();
    }

    #[test]
    fn test_gaze_gating_forces_stop() {
        let config = TrackerConfig {
            gaze_gating: true,
            ..test_config()
        };
        let tracker = tracker(
            config,
            CountingCamera::new(),
            MockDetector::new(vec![Detection::new(4, 0.9)]),
        )
        .with_face_locator(Arc::new(FixedLocator(None)));

        tracker.start().unwrap();
        assert!(wait_for(|| tracker.reader().snapshot().sequence >= 2));
        let snapshot = tracker.reader().snapshot();
        assert_eq!(snapshot.control.action, Action::Stop);
        assert_eq!(snapshot.gaze.map(|g| g.direction), Some(GazeDirection::NoFace));
        tracker.stop_and_wait();
    }

    #[test]
    fn test_gaze_on_screen_allows_acceleration() {
        let face = FaceObservation {
            face: BBox::new(0.0, 0.0, 200.0, 200.0),
            eyes: vec![BBox::new(50.0, 60.0, 20.0, 12.0), BBox::new(130.0, 60.0, 20.0, 12.0)],
        };
        let config = TrackerConfig {
            gaze_gating: true,
            ..test_config()
        };
        let tracker = tracker(
            config,
            CountingCamera::new(),
            MockDetector::new(vec![Detection::new(4, 0.9)]),
        )
        .with_face_locator(Arc::new(FixedLocator(Some(face))));

        tracker.start().unwrap();
        assert!(wait_for(|| tracker.get_state().action == Action::Accelerate));
        tracker.stop_and_wait();
    }

    /// Device that admits a single open source at a time
    #[derive(Default)]
    struct ExclusiveCamera {
        in_use: Arc<AtomicBool>,
    }

    struct ExclusiveSource {
        in_use: Arc<AtomicBool>,
        sequence: u32,
    }

    impl Drop for ExclusiveSource {
        fn drop(&mut self) {
            self.in_use.store(false, Ordering::SeqCst);
        }
    }

    impl CameraProvider for ExclusiveCamera {
        fn name(&self) -> &'static str {
            "exclusive"
        }

        fn open(&self, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
            if self.in_use.swap(true, Ordering::SeqCst) {
                return Err(CameraError::Open {
                    index: config.index,
                    reason: "device busy".into(),
                });
            }
            Ok(Box::new(ExclusiveSource {
                in_use: Arc::clone(&self.in_use),
                sequence: 0,
            }))
        }
    }

    impl FrameSource for ExclusiveSource {
        fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
            thread::sleep(Duration::from_millis(1));
            self.sequence += 1;
            let mut frame = VideoFrame::solid(4, 2, [0, 0, 0]);
            frame.sequence = self.sequence;
            Ok(frame)
        }
    }

    /// Detector that takes longer than a frame interval
    struct SlowDetector;

    impl ObjectDetector for SlowDetector {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn detect(&self, _: &VideoFrame, _: f32, _: u32) -> Result<Vec<Detection>, DetectionError> {
            thread::sleep(Duration::from_millis(50));
            Ok(vec![Detection::new(3, 0.9)])
        }
    }

    #[test]
    fn test_stop_releases_camera_before_returning() {
        let camera = Arc::new(ExclusiveCamera::default());
        let tracker =
            HeadTracker::new(test_config(), camera.clone(), Arc::new(SlowDetector)).unwrap();

        tracker.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        tracker.stop();
        assert!(!camera.in_use.load(Ordering::SeqCst));

        // immediate restart while the old worker is still inside inference
        tracker.start().unwrap();
        assert!(tracker.is_running());
        assert!(wait_for(|| tracker.get_state().direction == Direction::Left));

        tracker.stop();
        tracker.start().unwrap();
        tracker.stop_and_wait();
        assert!(!camera.in_use.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_and_wait_after_stop_joins_worker() {
        let tracker = tracker(test_config(), CountingCamera::new(), SlowDetector);
        tracker.start().unwrap();
        thread::sleep(Duration::from_millis(10));

        tracker.stop();
        tracker.stop_and_wait();
        assert!(tracker.lock_run().is_none());
        assert!(!tracker.is_running());
    }

    #[test]
    fn test_fps_counter_starts_at_zero() {
        let mut fps = FpsCounter::new();
        assert_eq!(fps.tick(), 0.0);
    }
}
