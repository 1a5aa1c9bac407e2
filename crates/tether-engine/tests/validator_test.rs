mod common;

use common::{Dom, MockBackend, engine};
use std::sync::Arc;
use tether_engine::config::TetherConfig;
use tether_engine::registry::{RegistryError, StrategyRegistry};
use tether_engine::resolution::ResolutionEngine;
use tether_engine::validator::{Validator, ValidatorError};

const REGISTRY: &str = r##"
_meta:
  version: "3"
chat:
  input:
    description: Message input
    strategies: ["#input", "textarea"]
  sendButton:
    description: Send button
    strategies: ["#send", "button[type=submit]"]
  stopButton:
    description: Stop button
    strategies: ["#stop"]
sidebar:
  projects:
    description: Project links
    strategies: ["nav a.project", "a[href*='/project/']"]
  newChat:
    description: New chat
    strategies: []
"##;

fn validator(source: &str) -> Validator {
    let mut config = TetherConfig::default().validation;
    config.persist_timestamp = false;
    Validator::new(engine(source), config)
}

#[tokio::test(start_paused = true)]
async fn test_one_result_per_entry_with_own_strategy() {
    let validator = validator(REGISTRY);
    let mut backend = MockBackend::new(
        Dom::new()
            .show("textarea", "")
            .hide("#send", "Send")
            .show("a[href*='/project/']", "Project A"),
    );

    let report = validator.validate_all(&mut backend, None).await.unwrap();

    assert_eq!(report.total(), 4);
    assert_eq!(
        report
            .results
            .iter()
            .map(|r| r.path.as_str())
            .collect::<Vec<_>>(),
        vec!["chat.input", "chat.sendButton", "chat.stopButton", "sidebar.projects"]
    );
    assert_eq!(report.found_count(), 3);
    assert_eq!(report.missing_count(), 1);

    let input = &report.results[0];
    assert!(input.found);
    assert_eq!(input.working_strategy.as_ref().unwrap().as_str(), "textarea");
    assert_eq!(input.failed_strategies.len(), 1);

    // Discovery mode only needs the element attached.
    assert!(report.results[1].found);

    let stop = &report.results[2];
    assert!(!stop.found);
    assert!(stop.working_strategy.is_none());
    assert_eq!(stop.failed_strategies.len(), 1);

    assert_eq!(report.skipped, vec!["sidebar.newChat"]);
    assert!(report.summary().contains("chat.stopButton"));
}

#[tokio::test(start_paused = true)]
async fn test_category_with_every_first_strategy_matching() {
    let validator = validator(REGISTRY);
    let mut backend = MockBackend::new(
        Dom::new()
            .show("#input", "")
            .show("#send", "Send")
            .show("#stop", "Stop"),
    );

    let report = validator
        .validate_all(&mut backend, Some("chat"))
        .await
        .unwrap();

    assert_eq!(report.category.as_deref(), Some("chat"));
    assert_eq!(report.found_count(), report.total());
    assert_eq!(report.missing_count(), 0);
    assert!(report.results.iter().all(|r| r.failed_strategies.is_empty()));
    assert!(report.skipped.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_category_is_an_error() {
    let validator = validator(REGISTRY);
    let mut backend = MockBackend::new(Dom::new());

    let err = validator
        .validate_all(&mut backend, Some("settings"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ValidatorError::Registry(RegistryError::UnknownSelector { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_report_serializes_with_camel_case_keys() {
    let validator = validator(REGISTRY);
    let mut backend = MockBackend::new(Dom::new().show("#stop", "Stop"));

    let report = validator
        .validate_all(&mut backend, Some("chat"))
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["results"][2]["workingStrategy"], "#stop");
    assert_eq!(json["results"][0]["failedStrategies"][1], "textarea");
    assert_eq!(json["results"][0]["found"], false);
}

#[tokio::test]
async fn test_validation_timestamp_written_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("selectors.json");
    std::fs::write(
        &path,
        r##"{"_meta": {"version": "3", "owner": "ops"}, "chat": {"stopButton": {"strategies": ["#stop"]}}}"##,
    )
    .unwrap();

    let registry = Arc::new(StrategyRegistry::from_path(&path));
    let engine = Arc::new(ResolutionEngine::new(
        registry.clone(),
        TetherConfig::default().resolution,
    ));
    let validator = Validator::new(engine, TetherConfig::default().validation);
    let mut backend = MockBackend::new(Dom::new().show("#stop", "Stop"));

    let report = validator.validate_all(&mut backend, None).await.unwrap();
    assert_eq!(report.found_count(), 1);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["_meta"]["lastValidated"], report.validated_at.as_str());
    assert_eq!(written["_meta"]["owner"], "ops");
    assert_eq!(written["chat"]["stopButton"]["strategies"][0], "#stop");

    let metadata = registry.metadata().await.unwrap();
    assert_eq!(metadata.last_validated, Some(report.validated_at.clone()));
}
