//! End-to-end runs of real child processes through the notification pipeline.

use runwatch::app::App;
use runwatch::config::{LifecycleTrigger, NotifyMode, OutputMode};
use runwatch::runner::CommandPlan;
use serde_json::Value;
use std::time::Duration;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{as_destinations, mock_destination::RecordingDestination, test_utils::test_config};

#[tokio::test]
async fn test_final_flush_sends_collected_output() {
    let destination = RecordingDestination::new("recorder");
    let config = test_config();

    let code = App::builder(config)
        .destinations_override(as_destinations(&[destination.clone()]))
        .build()
        .run(&CommandPlan::shell("echo one; echo two"))
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(
        destination.texts(),
        vec!["Final output\n```\none\ntwo\n```".to_string()]
    );
}

#[tokio::test]
async fn test_exit_code_passes_through() {
    let destination = RecordingDestination::new("recorder");
    let code = App::builder(test_config())
        .destinations_override(as_destinations(&[destination.clone()]))
        .build()
        .run(&CommandPlan::shell("echo failing >&2; exit 7"))
        .await
        .unwrap();

    assert_eq!(code, 7);
    assert_eq!(
        destination.texts(),
        vec!["Final output\n```\nfailing\n```".to_string()]
    );
}

#[tokio::test]
async fn test_secrets_are_redacted_and_filtered_lines_dropped() {
    let destination = RecordingDestination::new("recorder");
    let mut config = test_config();
    config.notify.filters.exclude = vec!["^debug:".to_string()];
    config.notify.redaction.patterns = vec![r"key=\S+".to_string()];

    App::builder(config)
        .destinations_override(as_destinations(&[destination.clone()]))
        .build()
        .run(&CommandPlan::shell(
            "echo 'found key=abc123'; echo 'debug: noise'; echo 'password=hunter2'",
        ))
        .await
        .unwrap();

    assert_eq!(
        destination.texts(),
        vec!["Final output\n```\nfound [REDACTED]\n[REDACTED]\n```".to_string()]
    );
}

#[tokio::test]
async fn test_lifecycle_messages_wrap_the_output() {
    let destination = RecordingDestination::new("recorder");
    let mut config = test_config();
    config.notify.notify_on = vec![LifecycleTrigger::Start, LifecycleTrigger::Finish];

    App::builder(config)
        .invocation("runwatch -- make")
        .destinations_override(as_destinations(&[destination.clone()]))
        .build()
        .run(&CommandPlan::shell("echo built; exit 2"))
        .await
        .unwrap();

    let texts = destination.texts();
    assert_eq!(texts.len(), 3);
    assert_eq!(
        texts[0],
        "Job started\n```\nStarted `runwatch -- make`\necho built; exit 2\n```"
    );
    assert_eq!(texts[1], "Final output\n```\nbuilt\n```");
    assert_eq!(
        texts[2],
        "Job finished\n```\nFinished `runwatch -- make`\necho built; exit 2 | exit=2\n```"
    );
}

#[tokio::test]
async fn test_attach_only_splits_by_smallest_destination_limit() {
    let roomy = RecordingDestination::with_limits("roomy", 4000, 1_000_000);
    let tight = RecordingDestination::with_limits("tight", 4000, 12);
    let mut config = test_config();
    config.notify.mode = NotifyMode::AttachOnly;

    App::builder(config)
        .destinations_override(as_destinations(&[roomy.clone(), tight.clone()]))
        .build()
        .run(&CommandPlan::shell("echo aaaa; echo bbbb; echo cccc"))
        .await
        .unwrap();

    for destination in [&roomy, &tight] {
        let files = destination.files();
        assert_eq!(files.len(), 2, "unexpected parts: {:?}", files);
        assert_eq!(files[0].0, "output.part.001.log");
        assert_eq!(files[0].1, "Final output (part 1/2)");
        assert_eq!(files[0].2, b"aaaa\nbbbb\n".to_vec());
        assert_eq!(files[1].2, b"cccc\n".to_vec());
    }
}

#[tokio::test]
async fn test_alert_is_sent_with_context() {
    let destination = RecordingDestination::new("recorder");
    let mut config = test_config();
    config.notify.alerts.patterns = vec!["ERROR".to_string()];
    config.notify.alerts.include_context_lines = 2;

    App::builder(config)
        .destinations_override(as_destinations(&[destination.clone()]))
        .build()
        .run(&CommandPlan::shell("echo x; echo y; echo 'ERROR: boom'"))
        .await
        .unwrap();

    let texts = destination.texts();
    assert!(texts.contains(
        &"ALERT: matched output pattern\n```\nMatched:\nERROR: boom\n\nContext:\ny\nERROR: boom\n```"
            .to_string()
    ));
    assert!(texts.contains(&"Final output\n```\nx\ny\nERROR: boom\n```".to_string()));
}

#[tokio::test]
async fn test_transient_destination_failures_are_retried() {
    let flaky = RecordingDestination::failing_first("flaky", 2);
    let mut config = test_config();
    config.notify.delivery.backoff_ms = 10;

    App::builder(config)
        .destinations_override(as_destinations(&[flaky.clone()]))
        .build()
        .run(&CommandPlan::shell("echo eventually"))
        .await
        .unwrap();

    flaky.wait_for_count(1, Duration::from_secs(5)).await;
    assert_eq!(flaky.texts(), vec!["Final output\n```\neventually\n```".to_string()]);
}

#[tokio::test]
async fn test_periodic_flush_delivers_before_exit() {
    let destination = RecordingDestination::new("recorder");
    let mut config = test_config();
    config.notify.notify_each = Some("1s".to_string());

    App::builder(config)
        .destinations_override(as_destinations(&[destination.clone()]))
        .build()
        .run(&CommandPlan::shell("echo early; sleep 1.5; echo late"))
        .await
        .unwrap();

    assert_eq!(
        destination.texts(),
        vec![
            "Output batch\n```\nearly\n```".to_string(),
            "Final output\n```\nlate\n```".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_local_outputs_without_destinations() {
    let dir = tempfile::tempdir().unwrap();
    let events_path = dir.path().join("events.jsonl");
    let output_path = dir.path().join("hosts.txt");

    let mut config = test_config();
    config.notify.callbacks.clear();
    config.event_output = Some(events_path.clone());
    config.output_file = Some(output_path.clone());
    config.output_mode = OutputMode::SortDedup;

    let code = App::builder(config)
        .build()
        .run(&CommandPlan::shell("echo b; echo a; echo b"))
        .await
        .unwrap();
    assert_eq!(code, 0);

    assert_eq!(std::fs::read_to_string(&output_path).unwrap(), "a\nb\n");

    let events: Vec<Value> = std::fs::read_to_string(&events_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0]["type"], "lifecycle");
    assert_eq!(events[0]["message"], "started");
    let lines: Vec<&str> = events[1..4]
        .iter()
        .map(|e| e["message"].as_str().unwrap())
        .collect();
    assert_eq!(lines, vec!["b", "a", "b"]);
    assert!(events[1..4].iter().all(|e| e["stream"] == "stdout"));
    assert_eq!(events[4]["message"], "finished");
    assert_eq!(events[4]["fields"]["exit_code"], "0");
}

#[tokio::test]
async fn test_missing_credentials_fail_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let config = test_config();

    let result = App::builder(config)
        .build()
        .run(&CommandPlan::shell(&format!("touch {}", marker.display())))
        .await;

    assert!(result.is_err());
    assert!(!marker.exists());
}
