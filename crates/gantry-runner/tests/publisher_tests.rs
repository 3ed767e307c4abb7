mod common;

use common::{RecordingConsole, RecordingSink, UploadBehaviour, job};
use gantry_core::Error;
use gantry_core::job::JobResult;
use gantry_core::plan::ArtifactPlan;
use gantry_runner::ArtifactsPublisher;
use pretty_assertions::assert_eq;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("logs/pic")).unwrap();
    fs::write(dir.path().join("logs/pic/fail.png"), b"f").unwrap();
    fs::write(dir.path().join("logs/pic/pass.png"), b"p").unwrap();
    fs::write(dir.path().join("README"), b"r").unwrap();
    dir
}

#[test]
fn publishes_folder_and_file_for_catch_all_rule() {
    let dir = workspace();
    let console = RecordingConsole::default();
    let sink = RecordingSink::default();

    ArtifactsPublisher::new(&sink, &console)
        .publish(&[ArtifactPlan::new("**/*", "mypic")], dir.path(), &job())
        .unwrap();

    assert_eq!(
        *sink.published.lock(),
        vec![
            ("mypic".to_string(), dir.path().join("README")),
            ("mypic/logs".to_string(), dir.path().join("logs/pic")),
        ]
    );
}

#[test]
fn unmatched_rule_reports_diagnostic_and_fails() {
    let dir = workspace();
    let console = RecordingConsole::default();
    let sink = RecordingSink::default();

    let err = ArtifactsPublisher::new(&sink, &console)
        .publish(&[ArtifactPlan::new("logs/picture", "mypic")], dir.path(), &job())
        .unwrap_err();

    assert!(matches!(err, Error::ArtifactNoMatch { .. }));
    assert!(sink.published.lock().is_empty());
    let expected = format!(
        "[go] The rule [logs/picture] does not match any resource under [{}]",
        dir.path().display()
    );
    assert_eq!(console.lines(), vec![expected]);
}

#[test]
fn upload_error_is_reported_with_pattern() {
    let dir = workspace();
    let console = RecordingConsole::default();
    let sink = RecordingSink::new(UploadBehaviour::Fail);

    let err = ArtifactsPublisher::new(&sink, &console)
        .publish(&[ArtifactPlan::new("**/*.png", "mypic")], dir.path(), &job())
        .unwrap_err();

    assert!(matches!(err, Error::UploadFailed(ref p) if p == "**/*.png"));
    assert!(console.contains("[go] Failed to upload [**/*.png]"));
}

#[test]
fn upload_panic_is_contained() {
    let dir = workspace();
    let console = RecordingConsole::default();
    let sink = RecordingSink::new(UploadBehaviour::Panic);

    let err = ArtifactsPublisher::new(&sink, &console)
        .publish(&[ArtifactPlan::new("**/*.png", "mypic")], dir.path(), &job())
        .unwrap_err();

    assert!(matches!(err, Error::UploadFailed(_)));
    assert!(console.contains("[go] Failed to upload [**/*.png]"));
}

#[test]
fn remaining_plans_still_publish_after_a_miss() {
    let dir = workspace();
    let console = RecordingConsole::default();
    let sink = RecordingSink::default();

    let result = ArtifactsPublisher::new(&sink, &console).publish(
        &[ArtifactPlan::new("missing", ""), ArtifactPlan::new("README", "docs")],
        dir.path(),
        &job(),
    );

    assert!(result.is_err());
    assert_eq!(
        *sink.published.lock(),
        vec![("docs".to_string(), dir.path().join("README"))]
    );
}

#[test]
fn sets_standard_job_properties() {
    let console = RecordingConsole::default();
    let sink = RecordingSink::default();

    ArtifactsPublisher::new(&sink, &console).set_job_properties(
        &job(),
        "agent-01",
        JobResult::Passed,
        Duration::from_secs(42),
    );

    let properties: Vec<(String, String)> = sink
        .properties
        .lock()
        .iter()
        .map(|p| (p.key.clone(), p.value.clone()))
        .collect();
    assert_eq!(
        properties,
        vec![
            ("cruise_agent".to_string(), "agent-01".to_string()),
            ("cruise_job_duration".to_string(), "42".to_string()),
            ("cruise_job_result".to_string(), "Passed".to_string()),
            ("cruise_job_id".to_string(), "-1".to_string()),
            ("cruise_pipeline_label".to_string(), "label-1".to_string()),
            ("cruise_pipeline_counter".to_string(), "1".to_string()),
            ("cruise_stage_counter".to_string(), "1".to_string()),
        ]
    );
}
