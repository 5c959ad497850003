//! End-to-end synchronization scenarios on in-memory stream info.

use chrono::{TimeZone, Utc};
use l3d_core::media::{FrameRate, StreamInfo, Timecode};
use l3d_core::sync::{CameraStream, SyncError, SyncMethod, Synchronizer};

fn camera(name: &str, timecode: &str, rate: FrameRate, frames: u64) -> CameraStream {
    CameraStream::new(
        name,
        StreamInfo {
            frame_rate: rate,
            frame_count: frames,
            width: 1920,
            height: 1080,
            creation_time: Some(Utc.with_ymd_and_hms(2026, 3, 9, 16, 45, 0).unwrap()),
            timecode: Some(Timecode::parse(timecode).unwrap()),
            has_audio: true,
            bitrate: Some(20_000_000),
        },
    )
}

fn fps30() -> FrameRate {
    FrameRate::new(30, 1).unwrap()
}

#[test]
fn three_cameras_half_second_apart() {
    let cameras = vec![
        camera("camA", "14:00:00:00", fps30(), 1000),
        camera("camB", "14:00:00:15", fps30(), 1000),
        camera("camC", "14:00:01:00", fps30(), 1000),
    ];

    let plan = Synchronizer::new()
        .run(SyncMethod::Timecode, &cameras)
        .unwrap()
        .unwrap();

    let offsets: Vec<i64> = ["camA", "camB", "camC"]
        .iter()
        .map(|c| plan.entry(c).unwrap().start_offset)
        .collect();
    assert_eq!(offsets, vec![0, 15, 30]);
    assert_eq!(plan.common_length(), 970);

    // Latest start first
    assert_eq!(plan.camera_names(), vec!["camC", "camB", "camA"]);

    for name in ["camA", "camB", "camC"] {
        let range = plan.aligned_range(name).unwrap();
        assert_eq!(range.end - range.start, 970, "{}", name);
    }
    assert_eq!(plan.aligned_range("camA").unwrap(), 30..1000);
    assert_eq!(plan.aligned_range("camC").unwrap(), 0..970);
}

#[test]
fn mismatched_rates_fail_before_offsets() {
    let cameras = vec![
        camera("camA", "14:00:00:00", fps30(), 1000),
        camera("camB", "14:00:00:00", FrameRate::new(30000, 1001).unwrap(), 1000),
    ];
    let err = Synchronizer::new()
        .run(SyncMethod::Timecode, &cameras)
        .unwrap_err();
    match err {
        SyncError::FrameRateMismatch { rates } => assert_eq!(rates.len(), 2),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn disjoint_recordings_have_no_common_window() {
    let cameras = vec![
        camera("camA", "14:00:00:00", fps30(), 100),
        camera("camB", "14:00:10:00", fps30(), 100),
    ];
    assert_eq!(
        Synchronizer::new().run(SyncMethod::Timecode, &cameras),
        Err(SyncError::NoCommonWindow)
    );
}

#[test]
fn audio_needs_a_registered_strategy() {
    let cameras = vec![camera("camA", "14:00:00:00", fps30(), 100)];
    assert_eq!(
        Synchronizer::new().run(SyncMethod::TimecodeAudio, &cameras),
        Err(SyncError::MethodUnavailable(SyncMethod::TimecodeAudio))
    );
}
