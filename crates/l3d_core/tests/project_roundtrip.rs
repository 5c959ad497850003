//! Save/load of project files through the public API.

use std::path::PathBuf;

use l3d_core::config::Settings;
use l3d_core::params::{names, Parameter, ParameterTree};
use l3d_core::project::{Project, SaveReport};
use tempfile::tempdir;

#[test]
fn videos_and_method_survive_save_and_load() {
    let tree = ParameterTree::from_children(vec![
        Parameter::group(
            names::VIDEOS,
            vec![Parameter::group(
                "camA",
                vec![Parameter::scalar(names::FILE, "a.mp4")],
            )],
        ),
        Parameter::group(
            names::SYNCHRONIZATION,
            vec![Parameter::choice(
                names::METHOD,
                "Timecode",
                vec![
                    "None".to_string(),
                    "Timecode".to_string(),
                    "Audio".to_string(),
                    "Timecode+Audio".to_string(),
                ],
            )],
        ),
    ])
    .unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.toml");

    let mut project = Project::new();
    project.parameters_mut().replace_root(tree);
    assert!(matches!(
        project.save_as(&path, false).unwrap(),
        SaveReport::Written { .. }
    ));

    let loaded = Project::open(&path).unwrap();
    assert_eq!(loaded.parameters(), project.parameters());
    assert_eq!(loaded.parameters().get_str("Videos/camA/File").unwrap(), "a.mp4");
    assert_eq!(
        loaded.parameters().get_str("Synchronization/Method").unwrap(),
        "Timecode"
    );
}

#[test]
fn default_project_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("defaults.toml");
    let videos: Vec<PathBuf> = ["left.mp4", "right.mp4", "top.mp4"]
        .iter()
        .map(PathBuf::from)
        .collect();
    let names: Vec<String> = ["left", "right", "top"].iter().map(|s| s.to_string()).collect();

    let mut project = Project::new();
    project
        .set_videos(&videos, Some(&names), &Settings::default())
        .unwrap();
    project.save_as(&path, false).unwrap();

    let loaded = Project::open(&path).unwrap();
    assert_eq!(loaded.parameters(), project.parameters());
    assert_eq!(loaded.camera_names(), names);
    assert_eq!(
        loaded.parameters().get_float("Calibration/Size of square").unwrap(),
        24.33
    );
}
