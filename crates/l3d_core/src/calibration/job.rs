//! Calibration job: frame scan, detection and camera group fit on a worker
//! thread.
//!
//! Phases run `Idle -> Preparing -> Detecting -> Fitting -> Finished`, or end
//! in `Failed` from any phase. Cancellation is cooperative and checked before
//! each frame; a detector or solver call in progress is never interrupted.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::collaborators::{BoardDetector, CameraGroupSolver};
use super::config::CalibrationConfig;
use super::types::{
    CalibrationError, CalibrationOutcome, CalibrationResult, CalibrationRow, DetectionTable,
};
use crate::logging::RunLogger;
use crate::media::FrameSource;

/// Set id used for all rows of a single recording session.
const DEFAULT_SET_ID: i64 = 0;

/// Where a job currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Preparing,
    Detecting { camera: String, frame: u64 },
    Fitting,
    Finished,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Finished | JobPhase::Failed)
    }
}

/// Messages sent from the worker to the owner of the `JobHandle`.
#[derive(Debug)]
pub enum CalibrationEvent {
    /// Sent after each camera: frames scanned so far out of the total.
    Progress { completed: u64, total: u64 },
    /// Detection is done and the solver is running; duration unknown.
    Fitting,
    /// Always the last event of a job, sent exactly once.
    Finished(CalibrationResult<CalibrationOutcome>),
}

impl CalibrationEvent {
    /// Progress as a single number: frames completed, `-1` while fitting.
    pub fn progress_value(&self) -> Option<i64> {
        match self {
            CalibrationEvent::Progress { completed, .. } => Some(*completed as i64),
            CalibrationEvent::Fitting => Some(-1),
            CalibrationEvent::Finished(_) => None,
        }
    }
}

/// Cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// The job stops before its next frame.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Exclusivity flag allowing one job per project.
#[derive(Debug, Clone, Default)]
pub struct JobSlot {
    busy: Arc<AtomicBool>,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Claim the slot; `None` if a job already holds it.
    pub fn try_acquire(&self) -> Option<JobGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| JobGuard {
                busy: Arc::clone(&self.busy),
            })
    }
}

/// Holds a `JobSlot` until dropped.
#[derive(Debug)]
pub struct JobGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// One camera's frames.
pub struct CameraInput {
    pub name: String,
    pub source: Box<dyn FrameSource>,
}

impl CameraInput {
    pub fn new(name: impl Into<String>, source: Box<dyn FrameSource>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

/// A fully resolved calibration run, ready to execute.
pub struct CalibrationJob {
    config: CalibrationConfig,
    inputs: Vec<CameraInput>,
    detector: Arc<dyn BoardDetector>,
    solver: Arc<dyn CameraGroupSolver>,
    logger: Option<RunLogger>,
}

impl CalibrationJob {
    /// `inputs` must match `config.cameras` in count and order.
    pub fn new(
        config: CalibrationConfig,
        inputs: Vec<CameraInput>,
        detector: Arc<dyn BoardDetector>,
        solver: Arc<dyn CameraGroupSolver>,
    ) -> CalibrationResult<Self> {
        let input_names: Vec<&str> = inputs.iter().map(|i| i.name.as_str()).collect();
        if input_names != config.cameras.iter().map(|s| s.as_str()).collect::<Vec<_>>() {
            return Err(CalibrationError::configuration(format!(
                "frame sources [{}] do not match cameras [{}]",
                input_names.join(", "),
                config.cameras.join(", ")
            )));
        }

        Ok(Self {
            config,
            inputs,
            detector,
            solver,
            logger: None,
        })
    }

    pub fn with_logger(mut self, logger: RunLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Frames the detector will see across all cameras.
    pub fn total_frames(&self) -> u64 {
        self.inputs
            .iter()
            .map(|i| self.config.frames_for(i.source.frame_count()))
            .sum()
    }

    /// Start the job on a worker thread.
    ///
    /// Fails with `JobRunning` if `slot` is taken. The slot is released when
    /// the worker finishes, before the `Finished` event is sent.
    pub fn spawn(self, slot: &JobSlot) -> CalibrationResult<JobHandle> {
        let guard = slot.try_acquire().ok_or(CalibrationError::JobRunning)?;

        let (sender, events) = mpsc::channel();
        let cancel = CancelToken::new();
        let phase = Arc::new(Mutex::new(JobPhase::Idle));

        let worker_cancel = cancel.clone();
        let worker_phase = Arc::clone(&phase);

        let thread = thread::Builder::new()
            .name("calibration".to_string())
            .spawn(move || {
                let mut emit = |event: CalibrationEvent| {
                    // A dropped handle just means nobody is listening
                    let _ = sender.send(event);
                };
                let result = self.run_guarded(&worker_cancel, &worker_phase, &mut emit);
                drop(guard);
                emit(CalibrationEvent::Finished(result));
            })
            .map_err(CalibrationError::Spawn)?;

        Ok(JobHandle {
            events,
            cancel,
            phase,
            thread: Some(thread),
        })
    }

    /// Run on the calling thread. Events other than `Finished` go to `emit`;
    /// the result is returned.
    pub fn run_blocking(
        self,
        cancel: &CancelToken,
        emit: &mut dyn FnMut(CalibrationEvent),
    ) -> CalibrationResult<CalibrationOutcome> {
        let phase = Mutex::new(JobPhase::Idle);
        self.run_guarded(cancel, &phase, emit)
    }

    /// Run, converting panics from collaborators into errors.
    fn run_guarded(
        mut self,
        cancel: &CancelToken,
        phase: &Mutex<JobPhase>,
        emit: &mut dyn FnMut(CalibrationEvent),
    ) -> CalibrationResult<CalibrationOutcome> {
        let logger = self.logger.take();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.execute(cancel, phase, logger.as_ref(), emit)
        }))
        .unwrap_or_else(|payload| Err(CalibrationError::WorkerPanicked(panic_message(payload))));

        match &result {
            Ok(outcome) => {
                *phase.lock() = JobPhase::Finished;
                tracing::info!(
                    "[Calibration] Finished: {} frames, reprojection error {:.4}",
                    outcome.frames_visited,
                    outcome.calibration.reprojection_error
                );
                if let Some(log) = &logger {
                    log.success(&format!(
                        "Calibration finished, reprojection error {:.4}",
                        outcome.calibration.reprojection_error
                    ));
                }
            }
            Err(e) => {
                *phase.lock() = JobPhase::Failed;
                tracing::error!("[Calibration] Failed: {}", e);
                if let Some(log) = &logger {
                    log.error(&format!("Calibration failed: {}", e));
                    log.dump_tail("detections");
                }
            }
        }
        if let Some(log) = logger {
            log.close();
        }

        result
    }

    fn execute(
        &mut self,
        cancel: &CancelToken,
        phase: &Mutex<JobPhase>,
        logger: Option<&RunLogger>,
        emit: &mut dyn FnMut(CalibrationEvent),
    ) -> CalibrationResult<CalibrationOutcome> {
        *phase.lock() = JobPhase::Preparing;
        if let Some(log) = logger {
            log.phase("Preparing");
        }

        let step = self.config.frame_step.max(1);
        let total = self.total_frames();
        let target = &self.config.target;
        let mut tables: Vec<DetectionTable> = self
            .config
            .cameras
            .iter()
            .map(DetectionTable::new)
            .collect();

        tracing::info!(
            "[Calibration] {} cameras, frame step {}, {} frames to scan",
            self.inputs.len(),
            step,
            total
        );

        if let Some(log) = logger {
            log.phase("Detecting");
        }

        let mut completed = 0u64;
        for (input, table) in self.inputs.iter_mut().zip(tables.iter_mut()) {
            let count = input.source.frame_count();
            if let Some(log) = logger {
                log.camera(&input.name);
            }

            let mut frame = 0u64;
            while frame < count {
                if cancel.is_cancelled() {
                    tracing::warn!("[Calibration] Cancelled before frame {} of {}", frame, input.name);
                    return Err(CalibrationError::Cancelled);
                }
                *phase.lock() = JobPhase::Detecting {
                    camera: input.name.clone(),
                    frame,
                };

                let image = input
                    .source
                    .read_frame(frame)
                    .map_err(|source| CalibrationError::Frame {
                        camera: input.name.clone(),
                        source,
                    })?;

                let detection = self
                    .detector
                    .detect(&image, target)
                    .map_err(|e| CalibrationError::detector(&input.name, frame, e.0))?;

                match detection {
                    Some(d) if !d.is_empty() => {
                        let row =
                            CalibrationRow::from_detection(&input.name, DEFAULT_SET_ID, frame, d)?;
                        if let Some(log) = logger {
                            log.detection(&format!(
                                "{} frame {}: {} corners",
                                input.name,
                                frame,
                                row.len()
                            ));
                        }
                        table.rows.push(row);
                    }
                    _ => {
                        tracing::trace!("[Calibration] {} frame {}: no board", input.name, frame);
                    }
                }

                completed += 1;
                frame += step;
            }

            if table.rows.is_empty() {
                tracing::warn!("[Calibration] No board detections for {}", input.name);
                if let Some(log) = logger {
                    log.warn(&format!("No board detections for {}", input.name));
                }
            } else {
                tracing::info!(
                    "[Calibration] {}: board found in {} frames",
                    input.name,
                    table.rows.len()
                );
            }

            emit(CalibrationEvent::Progress { completed, total });
            if let Some(log) = logger {
                log.frame_progress(completed, total);
            }
        }

        for (input, table) in self.inputs.iter().zip(tables.iter_mut()) {
            table.image_size = Some(input.source.frame_size());
        }

        *phase.lock() = JobPhase::Fitting;
        emit(CalibrationEvent::Fitting);
        if let Some(log) = logger {
            log.phase("Fitting");
        }

        let calibration = self
            .solver
            .fit(&tables, target, self.config.fit, self.config.initial.as_ref())
            .map_err(|e| CalibrationError::Solver(e.0))?;

        Ok(CalibrationOutcome {
            tables,
            calibration,
            frames_visited: completed,
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Owner's side of a running job.
pub struct JobHandle {
    events: Receiver<CalibrationEvent>,
    cancel: CancelToken,
    phase: Arc<Mutex<JobPhase>>,
    thread: Option<JoinHandle<()>>,
}

impl JobHandle {
    pub fn events(&self) -> &Receiver<CalibrationEvent> {
        &self.events
    }

    /// Next event if one is waiting.
    pub fn try_event(&self) -> Option<CalibrationEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> JobPhase {
        self.phase.lock().clone()
    }

    /// Block until the job ends, discarding progress events.
    pub fn wait(mut self) -> CalibrationResult<CalibrationOutcome> {
        let mut result = None;
        for event in self.events.iter() {
            if let CalibrationEvent::Finished(r) = event {
                result = Some(r);
                break;
            }
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result.unwrap_or_else(|| {
            Err(CalibrationError::WorkerPanicked(
                "worker exited without a result".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{
        BoardKind, CameraCalibration, CameraParameters, CollaboratorError, Detection, FitOptions,
        TargetModel, TargetSpec,
    };
    use crate::media::FrameError;
    use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

    /// Frames encode their index in the red channel of pixel (0, 0).
    struct FakeSource {
        count: u64,
        reads: Arc<Mutex<Vec<u64>>>,
    }

    impl FrameSource for FakeSource {
        fn frame_count(&self) -> u64 {
            self.count
        }

        fn frame_size(&self) -> (u32, u32) {
            (64, 48)
        }

        fn read_frame(&mut self, index: u64) -> Result<DynamicImage, FrameError> {
            self.reads.lock().push(index);
            let mut img = RgbImage::new(2, 2);
            img.put_pixel(0, 0, Rgb([(index % 256) as u8, 0, 0]));
            Ok(DynamicImage::ImageRgb8(img))
        }
    }

    /// Sees the board on frames whose index is a multiple of 20.
    struct EveryTwentieth;

    impl BoardDetector for EveryTwentieth {
        fn detect(
            &self,
            frame: &DynamicImage,
            _target: &TargetModel,
        ) -> Result<Option<Detection>, CollaboratorError> {
            let index = frame.get_pixel(0, 0)[0];
            if index % 20 == 0 {
                Ok(Some(Detection::new(vec![[1.0, 2.0], [3.0, 4.0]], vec![0, 1])))
            } else {
                Ok(None)
            }
        }
    }

    struct PanickingDetector;

    impl BoardDetector for PanickingDetector {
        fn detect(
            &self,
            _frame: &DynamicImage,
            _target: &TargetModel,
        ) -> Result<Option<Detection>, CollaboratorError> {
            panic!("detector blew up");
        }
    }

    struct FakeSolver {
        seen: Arc<Mutex<Option<(usize, FitOptions)>>>,
        fail: bool,
    }

    impl CameraGroupSolver for FakeSolver {
        fn fit(
            &self,
            tables: &[DetectionTable],
            _target: &TargetModel,
            options: FitOptions,
            _initial: Option<&CameraCalibration>,
        ) -> Result<CameraCalibration, CollaboratorError> {
            *self.seen.lock() = Some((tables.len(), options));
            if self.fail {
                return Err(CollaboratorError::new("did not converge"));
            }
            Ok(CameraCalibration {
                cameras: tables
                    .iter()
                    .map(|t| CameraParameters {
                        name: t.camera.clone(),
                        size: t.image_size.unwrap_or((0, 0)),
                        matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                        distortions: vec![0.0; 5],
                        rotation: [0.0; 3],
                        translation: [0.0; 3],
                    })
                    .collect(),
                reprojection_error: 0.25,
            })
        }
    }

    fn config(cameras: &[&str], step: u64) -> CalibrationConfig {
        CalibrationConfig {
            cameras: cameras.iter().map(|s| s.to_string()).collect(),
            target: TargetSpec {
                kind: BoardKind::Charuco,
                squares_x: 6,
                squares_y: 6,
                square_size: 24.33,
                marker_size: 17.0,
                marker_bits: 5,
                dictionary_size: 50,
            }
            .validate()
            .unwrap(),
            frame_step: step,
            fit: FitOptions::initial(),
            initial: None,
        }
    }

    fn job_with(
        counts: &[u64],
        step: u64,
        detector: Arc<dyn BoardDetector>,
        fail: bool,
    ) -> (CalibrationJob, Arc<Mutex<Vec<u64>>>, Arc<Mutex<Option<(usize, FitOptions)>>>) {
        let names: Vec<String> = (0..counts.len()).map(|i| format!("cam{}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let reads = Arc::new(Mutex::new(Vec::new()));
        let inputs = names
            .iter()
            .zip(counts)
            .map(|(n, &count)| {
                CameraInput::new(
                    n.clone(),
                    Box::new(FakeSource {
                        count,
                        reads: Arc::clone(&reads),
                    }) as Box<dyn FrameSource>,
                )
            })
            .collect();
        let seen = Arc::new(Mutex::new(None));
        let solver = Arc::new(FakeSolver {
            seen: Arc::clone(&seen),
            fail,
        });
        let job = CalibrationJob::new(config(&name_refs, step), inputs, detector, solver).unwrap();
        (job, reads, seen)
    }

    #[test]
    fn visits_every_nth_frame() {
        let (job, reads, seen) = job_with(&[100, 45], 10, Arc::new(EveryTwentieth), false);
        assert_eq!(job.total_frames(), 10 + 5);

        let mut events = Vec::new();
        let outcome = job
            .run_blocking(&CancelToken::new(), &mut |e| events.push(e))
            .unwrap();

        assert_eq!(outcome.frames_visited, 15);
        assert_eq!(reads.lock().len(), 15);
        assert_eq!(&reads.lock()[..3], &[0, 10, 20]);
        // Frames 0,20,...,80 in cam0; 0,20,40 in cam1
        assert_eq!(outcome.tables[0].rows.len(), 5);
        assert_eq!(outcome.tables[1].rows.len(), 3);
        assert_eq!(outcome.tables[0].image_size, Some((64, 48)));
        assert_eq!(outcome.tables[1].rows[2].frame, 40);

        let values: Vec<i64> = events.iter().filter_map(|e| e.progress_value()).collect();
        assert_eq!(values, vec![10, 15, -1]);
        assert_eq!(*seen.lock(), Some((2, FitOptions::initial())));
    }

    #[test]
    fn spawned_job_finishes_once_and_frees_slot() {
        let (job, _, _) = job_with(&[40, 40], 20, Arc::new(EveryTwentieth), false);
        let slot = JobSlot::new();
        let handle = job.spawn(&slot).unwrap();

        let (second, _, _) = job_with(&[1], 1, Arc::new(EveryTwentieth), false);
        // Either still running (rejected) or already done; never two at once
        if slot.is_busy() {
            assert!(matches!(second.spawn(&slot), Err(CalibrationError::JobRunning)));
        }

        let mut finished = 0;
        let mut last_progress = 0;
        let mut outcome = None;
        for event in handle.events().iter() {
            match event {
                CalibrationEvent::Progress { completed, total } => {
                    assert!(completed >= last_progress);
                    assert_eq!(total, 4);
                    last_progress = completed;
                }
                CalibrationEvent::Fitting => {}
                CalibrationEvent::Finished(result) => {
                    finished += 1;
                    outcome = Some(result);
                }
            }
        }
        assert_eq!(finished, 1);
        assert!(outcome.unwrap().is_ok());
        assert_eq!(handle.phase(), JobPhase::Finished);
        assert!(!slot.is_busy());
    }

    #[test]
    fn solver_failure_is_reported_distinctly() {
        let (job, _, _) = job_with(&[20], 10, Arc::new(EveryTwentieth), true);
        let handle = job.spawn(&JobSlot::new()).unwrap();
        let phase_source = Arc::clone(&handle.phase);
        let result = handle.wait();
        assert!(matches!(result, Err(CalibrationError::Solver(ref m)) if m == "did not converge"));
        assert_eq!(*phase_source.lock(), JobPhase::Failed);
    }

    #[test]
    fn detector_panic_becomes_error() {
        let (job, _, _) = job_with(&[20], 10, Arc::new(PanickingDetector), false);
        let slot = JobSlot::new();
        let result = job.spawn(&slot).unwrap().wait();
        match result {
            Err(CalibrationError::WorkerPanicked(msg)) => assert!(msg.contains("blew up")),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!slot.is_busy());
    }

    #[test]
    fn cancel_stops_before_next_frame() {
        let (job, reads, seen) = job_with(&[1000], 1, Arc::new(EveryTwentieth), false);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = job.run_blocking(&cancel, &mut |_| {});
        assert!(matches!(result, Err(CalibrationError::Cancelled)));
        assert!(reads.lock().is_empty());
        assert!(seen.lock().is_none());
    }

    #[test]
    fn empty_camera_reaches_solver() {
        let (job, _, seen) = job_with(&[30, 0], 10, Arc::new(EveryTwentieth), false);
        let outcome = job.run_blocking(&CancelToken::new(), &mut |_| {}).unwrap();
        assert!(outcome.tables[1].rows.is_empty());
        assert_eq!(seen.lock().map(|(n, _)| n), Some(2));
    }

    #[test]
    fn mismatched_inputs_rejected() {
        let result = CalibrationJob::new(
            config(&["camA", "camB"], 10),
            Vec::new(),
            Arc::new(EveryTwentieth),
            Arc::new(FakeSolver {
                seen: Arc::new(Mutex::new(None)),
                fail: false,
            }),
        );
        assert!(matches!(result, Err(CalibrationError::Configuration(_))));
    }

    #[test]
    fn slot_guard_releases_on_drop() {
        let slot = JobSlot::new();
        let guard = slot.try_acquire().unwrap();
        assert!(slot.try_acquire().is_none());
        drop(guard);
        assert!(slot.try_acquire().is_some());
    }
}
