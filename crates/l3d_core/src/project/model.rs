//! In-memory project state.

use std::path::{Path, PathBuf};

use super::points::PointsTable;
use super::store::{self, SaveReport};
use super::types::{ProjectError, ProjectResult};
use crate::calibration::CameraCalibration;
use crate::config::Settings;
use crate::media::{StreamInfo, VideoHandle};
use crate::params::{self, ParameterTree};
use crate::sync::SyncPlan;

/// A capture session: parameters, videos and derived results.
#[derive(Debug, Default)]
pub struct Project {
    filename: Option<PathBuf>,
    tree: ParameterTree,
    /// In camera order.
    videos: Vec<VideoHandle>,
    sync_plan: Option<SyncPlan>,
    calibration: Option<CameraCalibration>,
    points: Option<PointsTable>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a project file.
    pub fn open(path: impl AsRef<Path>) -> ProjectResult<Self> {
        let mut project = Self::new();
        project.load(path)?;
        Ok(project)
    }

    /// Replace this project's contents with a file's, keeping tree listeners.
    pub fn load(&mut self, path: impl AsRef<Path>) -> ProjectResult<()> {
        let path = path.as_ref();
        let doc = store::load_document(path)?;
        if !doc.incomplete_sections.is_empty() {
            tracing::warn!(
                "[Project] {} was saved incomplete, missing: {}",
                path.display(),
                doc.incomplete_sections.join(", ")
            );
        }

        let videos = params::video_files(&doc.tree)?
            .into_iter()
            .map(|(_, file)| VideoHandle::new(file))
            .collect();

        self.tree.replace_root(doc.tree);
        self.videos = videos;
        self.sync_plan = None;
        self.calibration = doc.calibration;
        self.points = doc.points;
        self.filename = Some(path.to_path_buf());
        Ok(())
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn set_filename(&mut self, path: impl Into<PathBuf>) {
        self.filename = Some(path.into());
    }

    pub fn parameters(&self) -> &ParameterTree {
        &self.tree
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterTree {
        &mut self.tree
    }

    pub fn camera_names(&self) -> Vec<String> {
        params::camera_names(&self.tree)
    }

    /// Start over with a new set of videos and default parameters.
    ///
    /// Clears any sync plan, calibration and points.
    pub fn set_videos(
        &mut self,
        paths: &[PathBuf],
        names: Option<&[String]>,
        settings: &Settings,
    ) -> ProjectResult<()> {
        let tree = params::default_parameters(paths, names, &settings.calibration, &settings.sync)?;
        self.tree.replace_root(tree);
        self.videos = paths.iter().map(VideoHandle::new).collect();
        self.sync_plan = None;
        self.calibration = None;
        self.points = None;
        tracing::info!("[Project] {} videos: {}", paths.len(), self.camera_names().join(", "));
        Ok(())
    }

    pub fn add_video_info(&mut self, camera: &str, info: &StreamInfo) -> ProjectResult<()> {
        params::add_video_info(&mut self.tree, camera, info)?;
        Ok(())
    }

    pub fn videos(&self) -> &[VideoHandle] {
        &self.videos
    }

    pub fn video(&self, camera: &str) -> Option<&VideoHandle> {
        let idx = self.camera_names().iter().position(|n| n == camera)?;
        self.videos.get(idx)
    }

    pub fn sync_plan(&self) -> Option<&SyncPlan> {
        self.sync_plan.as_ref()
    }

    /// Store a plan and mirror its offsets into the tree.
    pub fn set_sync_plan(&mut self, plan: SyncPlan) -> ProjectResult<()> {
        params::write_offsets(&mut self.tree, &plan)?;
        self.sync_plan = Some(plan);
        Ok(())
    }

    pub fn calibration(&self) -> Option<&CameraCalibration> {
        self.calibration.as_ref()
    }

    pub fn add_calibration(&mut self, calibration: CameraCalibration) {
        self.calibration = Some(calibration);
    }

    pub fn points(&self) -> Option<&PointsTable> {
        self.points.as_ref()
    }

    /// Replace the points table wholesale.
    pub fn add_points(&mut self, points: PointsTable) {
        self.points = Some(points);
    }

    /// Save to the current filename.
    pub fn save(&self, overwrite: bool) -> ProjectResult<SaveReport> {
        let path = self.filename.as_deref().ok_or(ProjectError::NoFilename)?;
        store::save_document(
            path,
            &self.tree,
            self.calibration.as_ref(),
            self.points.as_ref(),
            overwrite,
        )
    }

    /// Save under a new name, which becomes the project's filename once
    /// something was written.
    pub fn save_as(&mut self, path: impl Into<PathBuf>, overwrite: bool) -> ProjectResult<SaveReport> {
        let path = path.into();
        let report = store::save_document(
            &path,
            &self.tree,
            self.calibration.as_ref(),
            self.points.as_ref(),
            overwrite,
        )?;
        if !matches!(report, SaveReport::SkippedExisting { .. }) {
            self.filename = Some(path);
        }
        Ok(report)
    }

    pub fn export_calibration(&self, path: &Path) -> ProjectResult<()> {
        let calibration = self.calibration.as_ref().ok_or(ProjectError::NoCalibration)?;
        store::export_calibration(calibration, path)
    }
}
