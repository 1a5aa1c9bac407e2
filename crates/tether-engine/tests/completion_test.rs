mod common;

use common::{CHAT_REGISTRY, Dom, MockBackend, MockElement, engine};
use std::time::Duration;
use tether_engine::completion::{CompletionDetector, CompletionError, CompletionState};
use tether_engine::config::TetherConfig;
use tokio::time::Instant;

use CompletionState::*;

fn new_detector() -> CompletionDetector {
    CompletionDetector::new(engine(CHAT_REGISTRY), TetherConfig::default().completion).unwrap()
}

fn finished(response: &str) -> Dom {
    Dom::new()
        .show("#ready", "")
        .with(
            "#response",
            vec![
                MockElement::visible("Earlier answer"),
                MockElement::visible(response),
            ],
        )
}

#[tokio::test(start_paused = true)]
async fn test_busy_then_ready_completes_with_last_response() {
    let mut backend = MockBackend::new(Dom::new().show("#busy", "Generating"))
        .then(2000, finished("Hello world"));
    let mut detector = new_detector();

    let outcome = detector.run(&mut backend).await.unwrap();

    assert_eq!(outcome.text.as_deref(), Some("Hello world"));
    assert!(outcome.signal_observed);
    assert_eq!(outcome.elapsed, Duration::from_millis(2000));
    assert_eq!(detector.history(), &[Idle, Started, InProgress, Completed]);
}

#[tokio::test(start_paused = true)]
async fn test_thinking_signal_also_counts_as_progress() {
    let mut backend = MockBackend::new(Dom::new().show("#thinking", "Thinking..."))
        .then(1000, Dom::new().show("#busy", ""))
        .then(2500, finished("Done"));
    let mut detector = new_detector();

    let outcome = detector.run(&mut backend).await.unwrap();

    assert_eq!(outcome.text.as_deref(), Some("Done"));
    assert!(detector.signal_observed());
    assert_eq!(outcome.elapsed, Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn test_unobserved_fast_operation_completes_after_grace() {
    let mut backend = MockBackend::new(finished("Quick"));
    let mut detector = new_detector();

    let outcome = detector.run(&mut backend).await.unwrap();

    assert_eq!(outcome.text.as_deref(), Some("Quick"));
    assert!(!outcome.signal_observed);
    assert_eq!(outcome.elapsed, Duration::from_millis(3000));
    assert_eq!(detector.history(), &[Idle, Started, InProgress, Completed]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_alert_container_is_not_an_error() {
    let mut backend = MockBackend::new(
        Dom::new()
            .show("#busy", "Generating")
            .show("#alert", ""),
    )
    .then(1500, finished("All good").show("#alert", "   "));
    let mut detector = new_detector();

    let outcome = detector.run(&mut backend).await.unwrap();

    assert_eq!(outcome.text.as_deref(), Some("All good"));
    assert!(!detector.history().contains(&Errored));
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_alert_text_is_not_an_error() {
    let mut backend = MockBackend::new(
        Dom::new()
            .show("#busy", "Generating")
            .show("#alert", "Draft saved"),
    )
    .then(1000, finished("Fine").show("#alert", "Draft saved"));
    let mut detector = new_detector();

    let outcome = detector.run(&mut backend).await.unwrap();
    assert_eq!(outcome.text.as_deref(), Some("Fine"));
}

#[tokio::test(start_paused = true)]
async fn test_matching_alert_text_errors_with_exact_text() {
    let mut backend = MockBackend::new(Dom::new().show("#busy", "Generating")).then(
        1000,
        Dom::new()
            .show("#busy", "Generating")
            .show("#alert", "Usage LIMIT reached until 5pm"),
    );
    let mut detector = new_detector();

    let err = detector.run(&mut backend).await.unwrap_err();

    match err {
        CompletionError::Remote(text) => assert_eq!(text, "Usage LIMIT reached until 5pm"),
        other => panic!("expected remote error, got {:?}", other),
    }
    assert_eq!(detector.state(), Errored);
    assert_eq!(detector.error_text(), Some("Usage LIMIT reached until 5pm"));
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_toast_does_not_mask_later_error_strategy() {
    let registry = CHAT_REGISTRY.replace(
        r##"strategies: ["#alert"]"##,
        r##"strategies: ["[role='alert']", "div.error-message"]"##,
    );
    let mut backend = MockBackend::new(
        Dom::new()
            .show("#busy", "Generating")
            .show("[role='alert']", "Draft saved")
            .show("div.error-message", "Rate limit exceeded"),
    );
    let mut detector =
        CompletionDetector::new(engine(&registry), TetherConfig::default().completion).unwrap();

    let err = detector.run(&mut backend).await.unwrap_err();

    match err {
        CompletionError::Remote(text) => assert_eq!(text, "Rate limit exceeded"),
        other => panic!("expected remote error, got {:?}", other),
    }
    assert_eq!(detector.state(), Errored);
}

#[tokio::test(start_paused = true)]
async fn test_never_finishing_operation_times_out() {
    let mut backend = MockBackend::new(Dom::new().show("#busy", "Generating"));
    let mut detector = new_detector().with_budget(Duration::from_secs(10));

    let start = Instant::now();
    let err = detector.run(&mut backend).await.unwrap_err();

    assert!(matches!(
        err,
        CompletionError::TimedOut {
            last_state: InProgress,
            ..
        }
    ));
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert!(start.elapsed() < Duration::from_secs(11));
    assert_eq!(detector.state(), TimedOut);
    // No extraction happened.
    assert!(backend.calls_starting_with("query:#response").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_output_is_a_soft_empty_result() {
    let mut backend = MockBackend::new(Dom::new().show("#busy", ""))
        .then(500, Dom::new().show("#ready", ""));
    let mut detector = new_detector();

    let outcome = detector.run(&mut backend).await.unwrap();
    assert_eq!(outcome.text, None);

    let mut backend = MockBackend::new(Dom::new().show("#busy", "")).then(
        500,
        Dom::new().show("#ready", "").show("#response", "  \n "),
    );
    let mut detector = new_detector();
    let outcome = detector.run(&mut backend).await.unwrap();
    assert_eq!(outcome.text, None);
}

#[tokio::test(start_paused = true)]
async fn test_manual_ticks() {
    let mut backend =
        MockBackend::new(Dom::new().show("#busy", "")).then(600, finished("tick tock"));
    let mut detector = new_detector();

    assert_eq!(detector.tick(&mut backend).await.unwrap(), Idle);
    detector.trigger();
    assert_eq!(detector.state(), Started);
    assert_eq!(detector.tick(&mut backend).await.unwrap(), InProgress);
    assert_eq!(detector.tick(&mut backend).await.unwrap(), InProgress);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(detector.tick(&mut backend).await.unwrap(), Completed);
    // Terminal states are sticky.
    assert_eq!(detector.tick(&mut backend).await.unwrap(), Completed);
}

#[test]
fn test_invalid_error_pattern_is_rejected() {
    let mut config = TetherConfig::default().completion;
    config.error_patterns = vec!["(unclosed".into()];
    assert!(matches!(
        CompletionDetector::new(engine(CHAT_REGISTRY), config),
        Err(CompletionError::InvalidPattern(_))
    ));
}
