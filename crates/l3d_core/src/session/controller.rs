//! Project session driven by UI actions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;

use super::types::{ActionOutcome, SessionError, SessionResult};
use crate::calibration::{
    BoardDetector, CalibrationConfig, CalibrationError, CalibrationJob, CalibrationOutcome,
    CameraCalibration, CameraGroupSolver, CameraInput, JobHandle, JobSlot,
};
use crate::config::Settings;
use crate::logging::RunLogger;
use crate::media::{validate_inputs, FrameSourceOpener, StreamProber};
use crate::params::{names, ParamValue};
use crate::project::{PointsTable, Project, SaveReport};
use crate::sync::{CameraStream, SyncError, SyncMethod, SyncPlan, Synchronizer};

/// External services a session calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub prober: Arc<dyn StreamProber>,
    pub opener: Arc<dyn FrameSourceOpener>,
    pub detector: Arc<dyn BoardDetector>,
    pub solver: Arc<dyn CameraGroupSolver>,
}

/// Owns a project and runs synchronization and calibration on it.
///
/// While a calibration job runs, everything that writes the parameter
/// tree fails with `SessionError::JobRunning`.
pub struct Session {
    project: Project,
    settings: Settings,
    synchronizer: Synchronizer,
    collaborators: Collaborators,
    slot: JobSlot,
}

impl Session {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Self {
        Self {
            project: Project::new(),
            settings,
            synchronizer: Synchronizer::new(),
            collaborators,
            slot: JobSlot::new(),
        }
    }

    /// Use a synchronizer with extra strategies registered.
    pub fn with_synchronizer(mut self, synchronizer: Synchronizer) -> Self {
        self.synchronizer = synchronizer;
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    fn ensure_idle(&self) -> SessionResult<()> {
        if self.slot.is_busy() {
            Err(SessionError::JobRunning)
        } else {
            Ok(())
        }
    }

    /// New videos: validate, rebuild default parameters and add stream info.
    pub fn on_added_videos(&mut self, paths: &[PathBuf], names: Option<&[String]>) -> SessionResult<()> {
        self.ensure_idle()?;
        validate_inputs(paths)?;
        self.project.set_videos(paths, names, &self.settings)?;

        let prober = self.collaborators.prober.as_ref();
        let infos = self
            .project
            .videos()
            .iter()
            .map(|video| video.stream_info(prober).cloned())
            .collect::<Result<Vec<_>, _>>()?;

        for (camera, info) in self.project.camera_names().iter().zip(infos) {
            tracing::debug!(
                "[Session] {}: {} frames at {}",
                camera,
                info.frame_count,
                info.frame_rate
            );
            self.project.add_video_info(camera, &info)?;
        }
        Ok(())
    }

    /// Run the configured synchronization method and store the plan.
    pub fn on_sync_requested(&mut self) -> SessionResult<Option<SyncPlan>> {
        self.ensure_idle()?;
        let path = format!("{}/{}", names::SYNCHRONIZATION, names::METHOD);
        let label = self.project.parameters().get_str(&path)?;
        let method = SyncMethod::parse(label).ok_or_else(|| SyncError::UnknownMethod(label.to_string()))?;

        let cameras = self.camera_streams()?;
        let plan = self.synchronizer.run(method, &cameras)?;
        if let Some(plan) = &plan {
            self.project.set_sync_plan(plan.clone())?;
        }
        Ok(plan)
    }

    fn camera_streams(&self) -> SessionResult<Vec<CameraStream>> {
        let names = self.project.camera_names();
        if names.is_empty() {
            return Err(SessionError::NoVideos);
        }
        names
            .into_iter()
            .zip(self.project.videos())
            .map(|(name, video)| {
                let info = video.stream_info(self.collaborators.prober.as_ref())?;
                Ok(CameraStream::new(name, info.clone()))
            })
            .collect()
    }

    /// Start a fresh calibration.
    pub fn on_calibrate_requested(&mut self) -> SessionResult<JobHandle> {
        self.start_calibration(None)
    }

    /// Refine the stored calibration, keeping its estimates as a start.
    pub fn on_refine_requested(&mut self) -> SessionResult<JobHandle> {
        let existing = self
            .project
            .calibration()
            .cloned()
            .ok_or(SessionError::NoCalibration)?;
        self.start_calibration(Some(existing))
    }

    fn start_calibration(&mut self, existing: Option<CameraCalibration>) -> SessionResult<JobHandle> {
        self.ensure_idle()?;
        let cameras = self.project.camera_names();
        if cameras.is_empty() {
            return Err(SessionError::NoVideos);
        }

        let mut config = CalibrationConfig::from_parameters(self.project.parameters(), &cameras)?;
        if let Some(existing) = existing {
            config = config.refining(existing)?;
        }

        let mut inputs = Vec::with_capacity(cameras.len());
        for (camera, video) in cameras.iter().zip(self.project.videos()) {
            let info = video.stream_info(self.collaborators.prober.as_ref())?;
            let source = self
                .collaborators
                .opener
                .open(video.path(), info)
                .map_err(|source| CalibrationError::Frame {
                    camera: camera.clone(),
                    source,
                })?;
            inputs.push(CameraInput::new(camera.clone(), source));
        }

        let mut job = CalibrationJob::new(
            config,
            inputs,
            Arc::clone(&self.collaborators.detector),
            Arc::clone(&self.collaborators.solver),
        )?;
        if let Some(logger) = self.run_logger() {
            job = job.with_logger(logger);
        }

        tracing::info!(
            "[Session] Starting calibration of {} ({} frames)",
            cameras.join(", "),
            job.total_frames()
        );
        Ok(job.spawn(&self.slot)?)
    }

    fn run_logger(&self) -> Option<RunLogger> {
        let name = format!("calibration_{}", Local::now().format("%Y%m%d_%H%M%S"));
        match RunLogger::builder(name, &self.settings.paths.logs_folder)
            .config(self.settings.logging.to_log_config())
            .build()
        {
            Ok(logger) => Some(logger),
            Err(e) => {
                tracing::warn!("[Session] No run log for this calibration: {}", e);
                None
            }
        }
    }

    /// Fire the action at `path` and run whatever it stands for.
    pub fn trigger_action(&mut self, path: &str) -> SessionResult<ActionOutcome> {
        self.project.parameters().fire_action(path)?;

        let sync = format!("{}/{}", names::SYNCHRONIZATION, names::SYNCHRONIZE);
        let calibrate = format!("{}/{}", names::CALIBRATION, names::CALIBRATE);
        let refine = format!("{}/{}", names::CALIBRATION, names::REFINE);

        let outcome = if path == sync {
            ActionOutcome::Synced(self.on_sync_requested()?)
        } else if path == calibrate {
            ActionOutcome::CalibrationStarted(self.on_calibrate_requested()?)
        } else if path == refine {
            ActionOutcome::CalibrationStarted(self.on_refine_requested()?)
        } else {
            ActionOutcome::Fired
        };
        Ok(outcome)
    }

    /// Store a finished calibration: points table, result and, if
    /// `Output file` is set, the exported calibration.
    pub fn apply_outcome(&mut self, outcome: CalibrationOutcome) -> SessionResult<()> {
        self.ensure_idle()?;
        let points = PointsTable::from_detections(&outcome.tables);
        tracing::info!(
            "[Session] Calibration stored: {} point rows, error {:.4}",
            points.len(),
            outcome.calibration.reprojection_error
        );
        self.project.add_points(points);
        self.project.add_calibration(outcome.calibration);

        let output_path = format!("{}/{}", names::CALIBRATION, names::OUTPUT_FILE);
        let output = self
            .project
            .parameters()
            .get_str(&output_path)
            .map(str::to_string)
            .unwrap_or_default();
        if !output.is_empty() {
            self.project.export_calibration(Path::new(&output))?;
        }
        Ok(())
    }

    pub fn set_value(&mut self, path: &str, value: impl Into<ParamValue>) -> SessionResult<()> {
        self.ensure_idle()?;
        self.project.parameters_mut().set_value(path, value)?;
        Ok(())
    }

    /// Replace the project with a saved one.
    pub fn load(&mut self, path: impl AsRef<Path>) -> SessionResult<()> {
        self.ensure_idle()?;
        self.project.load(path)?;
        Ok(())
    }

    pub fn save(&self, overwrite: bool) -> SessionResult<SaveReport> {
        Ok(self.project.save(overwrite)?)
    }

    pub fn save_as(&mut self, path: impl Into<PathBuf>, overwrite: bool) -> SessionResult<SaveReport> {
        Ok(self.project.save_as(path, overwrite)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{
        CameraParameters, CollaboratorError, Detection, DetectionTable, FitOptions, TargetModel,
    };
    use crate::media::{
        FrameError, FrameRate, FrameSource, ProbeError, ProbeResult, StreamInfo, Timecode,
    };
    use crate::project::PointKey;
    use chrono::{TimeZone, Utc};
    use image::DynamicImage;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct MapProber(HashMap<PathBuf, StreamInfo>);

    impl StreamProber for MapProber {
        fn probe(&self, path: &Path) -> ProbeResult<StreamInfo> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| ProbeError::NotFound(path.to_path_buf()))
        }
    }

    struct BlankSource(u64);

    impl FrameSource for BlankSource {
        fn frame_count(&self) -> u64 {
            self.0
        }

        fn frame_size(&self) -> (u32, u32) {
            (640, 480)
        }

        fn read_frame(&mut self, _index: u64) -> Result<DynamicImage, FrameError> {
            Ok(DynamicImage::new_rgb8(1, 1))
        }
    }

    struct BlankOpener;

    impl FrameSourceOpener for BlankOpener {
        fn open(&self, _path: &Path, info: &StreamInfo) -> Result<Box<dyn FrameSource>, FrameError> {
            Ok(Box::new(BlankSource(info.frame_count)))
        }
    }

    /// Always sees corners 0 and 1; waits for `gate` when one is given.
    struct GatedDetector {
        gate: Option<Arc<AtomicBool>>,
    }

    impl BoardDetector for GatedDetector {
        fn detect(
            &self,
            _frame: &DynamicImage,
            _target: &TargetModel,
        ) -> Result<Option<Detection>, CollaboratorError> {
            if let Some(gate) = &self.gate {
                while !gate.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                }
            }
            Ok(Some(Detection::new(vec![[10.0, 20.0], [30.0, 40.0]], vec![0, 1])))
        }
    }

    struct RecordingSolver(Mutex<Vec<FitOptions>>);

    impl CameraGroupSolver for RecordingSolver {
        fn fit(
            &self,
            tables: &[DetectionTable],
            _target: &TargetModel,
            options: FitOptions,
            _initial: Option<&CameraCalibration>,
        ) -> Result<CameraCalibration, CollaboratorError> {
            self.0.lock().push(options);
            Ok(CameraCalibration {
                cameras: tables
                    .iter()
                    .map(|t| CameraParameters {
                        name: t.camera.clone(),
                        size: t.image_size.unwrap_or_default(),
                        matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                        distortions: vec![0.0; 5],
                        rotation: [0.0; 3],
                        translation: [0.0; 3],
                    })
                    .collect(),
                reprojection_error: 0.5,
            })
        }
    }

    struct Fixture {
        dir: TempDir,
        paths: Vec<PathBuf>,
        session: Session,
        solver: Arc<RecordingSolver>,
    }

    fn info(tc: &str) -> StreamInfo {
        StreamInfo {
            frame_rate: FrameRate::new(30, 1).unwrap(),
            frame_count: 100,
            width: 640,
            height: 480,
            creation_time: Some(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()),
            timecode: Some(Timecode::parse(tc).unwrap()),
            has_audio: true,
            bitrate: None,
        }
    }

    fn fixture(gate: Option<Arc<AtomicBool>>) -> Fixture {
        let dir = tempdir().unwrap();
        let mut probed = HashMap::new();
        let mut paths = Vec::new();
        for (name, tc) in [("a.mp4", "10:00:00:00"), ("b.mp4", "10:00:00:15")] {
            let path = dir.path().join(name);
            fs::write(&path, b"").unwrap();
            probed.insert(path.clone(), info(tc));
            paths.push(path);
        }

        let mut settings = Settings::default();
        settings.paths.logs_folder = dir.path().join("logs").to_string_lossy().into_owned();

        let solver = Arc::new(RecordingSolver(Mutex::new(Vec::new())));
        let collaborators = Collaborators {
            prober: Arc::new(MapProber(probed)),
            opener: Arc::new(BlankOpener),
            detector: Arc::new(GatedDetector { gate }),
            solver: solver.clone(),
        };
        Fixture {
            dir,
            paths,
            session: Session::new(settings, collaborators),
            solver,
        }
    }

    #[test]
    fn added_videos_get_stream_info() {
        let mut f = fixture(None);
        f.session.on_added_videos(&f.paths, None).unwrap();
        let tree = f.session.project().parameters();
        assert_eq!(tree.get_int("Videos/camB/Frame count").unwrap(), 100);
        assert_eq!(tree.get_str("Videos/camA/Timecode").unwrap(), "10:00:00:00");
    }

    #[test]
    fn missing_videos_are_all_reported() {
        let mut f = fixture(None);
        let missing = vec![f.dir.path().join("x.mp4"), f.dir.path().join("y.mp4")];
        match f.session.on_added_videos(&missing, None) {
            Err(SessionError::Probe(ProbeError::MissingInputs(list))) => assert_eq!(list, missing),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn sync_action_writes_offsets() {
        let mut f = fixture(None);
        f.session.on_added_videos(&f.paths, None).unwrap();

        let outcome = f.session.trigger_action("Synchronization/Synchronize...").unwrap();
        let plan = match outcome {
            ActionOutcome::Synced(Some(plan)) => plan,
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(plan.entry("camB").unwrap().start_offset, 15);
        assert_eq!(
            f.session
                .project()
                .parameters()
                .get_int("Synchronization/Offsets/camB")
                .unwrap(),
            15
        );

        f.session.set_value("Synchronization/Method", "None").unwrap();
        assert!(f.session.on_sync_requested().unwrap().is_none());

        f.session.set_value("Synchronization/Method", "Audio").unwrap();
        assert!(matches!(
            f.session.on_sync_requested(),
            Err(SessionError::Sync(SyncError::MethodUnavailable(SyncMethod::Audio)))
        ));
    }

    #[test]
    fn calibrate_then_refine() {
        let mut f = fixture(None);
        f.session.on_added_videos(&f.paths, None).unwrap();
        let export = f.dir.path().join("calibration.toml");
        f.session
            .set_value("Calibration/Output file", &*export.to_string_lossy())
            .unwrap();

        assert!(matches!(
            f.session.on_refine_requested(),
            Err(SessionError::NoCalibration)
        ));

        let handle = match f.session.trigger_action("Calibration/Calibrate...").unwrap() {
            ActionOutcome::CalibrationStarted(h) => h,
            other => panic!("unexpected: {other:?}"),
        };
        let outcome = handle.wait().unwrap();
        // 100 frames at step 40 -> frames 0, 40, 80 per camera
        assert_eq!(outcome.frames_visited, 6);
        f.session.apply_outcome(outcome).unwrap();

        let points = f.session.project().points().unwrap();
        assert_eq!(points.len(), 6);
        assert_eq!(points.get(&PointKey::new(0, 40, 1), "camB"), Some([30.0, 40.0]));
        assert!(f.session.project().calibration().is_some());
        assert!(export.is_file());

        f.session.on_refine_requested().unwrap().wait().unwrap();
        assert_eq!(
            *f.solver.0.lock(),
            vec![FitOptions::initial(), FitOptions::refine()]
        );
    }

    #[test]
    fn running_job_blocks_tree_writes() {
        let gate = Arc::new(AtomicBool::new(false));
        let mut f = fixture(Some(gate.clone()));
        f.session.on_added_videos(&f.paths, None).unwrap();
        let project_file = f.dir.path().join("p.toml");
        f.session.save_as(&project_file, false).unwrap();

        let handle = f.session.on_calibrate_requested().unwrap();
        assert!(f.session.is_busy());
        assert!(matches!(
            f.session.set_value("Calibration/Frame Step", 10i64),
            Err(SessionError::JobRunning)
        ));
        assert!(matches!(f.session.load(&project_file), Err(SessionError::JobRunning)));
        assert!(matches!(
            f.session.on_calibrate_requested(),
            Err(SessionError::JobRunning)
        ));

        gate.store(true, Ordering::SeqCst);
        handle.wait().unwrap();
        assert!(!f.session.is_busy());
        f.session.set_value("Calibration/Frame Step", 10i64).unwrap();
        f.session.load(&project_file).unwrap();
    }

    #[test]
    fn unrelated_action_only_fires() {
        let mut f = fixture(None);
        f.session.on_added_videos(&f.paths, None).unwrap();
        f.session
            .project
            .parameters_mut()
            .add_child("", crate::params::Parameter::action("Reset view"), false)
            .unwrap();
        assert!(matches!(
            f.session.trigger_action("Reset view").unwrap(),
            ActionOutcome::Fired
        ));
        assert!(f.session.trigger_action("Calibration/Type").is_err());
    }
}
