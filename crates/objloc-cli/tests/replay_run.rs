use std::path::Path;

use objloc_cli::{Args, run};
use tempfile::tempdir;

#[path = "../../../testdata/poster.rs"]
mod poster;

use poster::{poster, scene_with_poster_at};

fn write_inputs(root: &Path) {
    poster().save(root.join("poster.png")).unwrap();
    std::fs::write(
        root.join("objloc.yaml"),
        "calibration_image: poster.png\nrate_hz: 200\nextractor:\n  octaves: 1\n",
    )
    .unwrap();

    let frames = root.join("frames");
    std::fs::create_dir_all(&frames).unwrap();
    for (i, offset) in [(30i64, 40i64), (50, 50), (70, 20)].into_iter().enumerate() {
        let frame = scene_with_poster_at(200, 180, offset.0, offset.1);
        frame.save(frames.join(format!("{i:03}.png"))).unwrap();
    }
    std::fs::write(frames.join("003.png"), b"corrupt").unwrap();
}

#[test]
fn replay_writes_results_and_overlays() {
    let tmp = tempdir().unwrap();
    write_inputs(tmp.path());
    let output = tmp.path().join("out");

    let args = Args {
        config: Some(tmp.path().join("objloc.yaml")),
        calibration: None,
        frames: tmp.path().join("frames"),
        source_fps: 40.0,
        output: Some(output.clone()),
        max_ticks: Some(400),
    };
    let summary = run(&args).unwrap();
    assert!(summary.cycles >= 1);
    assert!(summary.located >= 1);
    assert!(summary.ticks < 400);
    assert!(summary.submitted_frames >= summary.cycles);
    assert!(summary.dropped_frames <= summary.submitted_frames);

    let text = std::fs::read_to_string(output.join("results.jsonl")).unwrap();
    let records: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len() as u64, summary.cycles);
    assert!(records.iter().any(|r| r["result"]["status"] == "located"));

    let overlays = std::fs::read_dir(&output)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("frame_"))
        .count();
    let decoded = records
        .iter()
        .filter(|r| r["reason"]["kind"] != "frame_decode")
        .count();
    assert_eq!(overlays, decoded);
}
