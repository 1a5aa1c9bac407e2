mod common;

use common::{Dom, MockBackend, MockElement, engine};
use std::time::Duration;
use tether_engine::backend::BackendError;
use tether_engine::protocol::LocatorExpression;
use tether_engine::registry::RegistryError;
use tether_engine::resolution::{ResolutionError, ResolveOptions};
use tokio::time::Instant;

const REGISTRY: &str = r##"
chat:
  sendButton:
    description: Send button
    strategies: ["a", "b"]
  input:
    description: Message input
    strategies: ["#s1", "#s2", "#s3"]
  four:
    strategies: ["#w", "#x", "#y", "#z"]
  pair:
    strategies: ["#p", "#q"]
files:
  rows:
    description: File rows
    strategies: ["#missing-rows", "li.file"]
"##;

fn exprs(list: &[&str]) -> Vec<LocatorExpression> {
    list.iter().map(|s| LocatorExpression::from(*s)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_scenario_send_button_second_strategy() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new().show("b", "Send"));

    let resolved = engine
        .resolve(
            &mut backend,
            "chat.sendButton",
            ResolveOptions::visible(Duration::from_millis(1000)),
        )
        .await
        .unwrap();

    assert_eq!(resolved.expression(), Some(&LocatorExpression::from("b")));
    assert_eq!(resolved.element().unwrap().text, "Send");
    assert_eq!(resolved.outcome.attempted_expressions, exprs(&["a", "b"]));
    assert_eq!(resolved.outcome.failures.len(), 1);
    assert_eq!(resolved.handle().unwrap().index, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_order_first_match_wins() {
    let engine = engine(REGISTRY);
    // s2 and s3 both match: s2 wins because it is registered first.
    let mut backend = MockBackend::new(
        Dom::new()
            .show("#s2", "second")
            .show("#s3", "third"),
    );

    let resolved = engine
        .resolve(
            &mut backend,
            "chat.input",
            ResolveOptions::visible(Duration::from_secs(3)),
        )
        .await
        .unwrap();

    assert_eq!(resolved.expression(), Some(&LocatorExpression::from("#s2")));
    assert_eq!(resolved.outcome.attempted_expressions, exprs(&["#s1", "#s2"]));
    assert!(backend.calls_starting_with("query:#s3").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_reports_every_strategy() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new());

    let err = engine
        .resolve(
            &mut backend,
            "chat.input",
            ResolveOptions::visible(Duration::from_millis(900)),
        )
        .await
        .unwrap_err();

    let exhausted = err.exhausted().expect("exhaustion error");
    assert_eq!(exhausted.path, "chat.input");
    assert_eq!(exhausted.description, "Message input");
    assert_eq!(exhausted.attempted_expressions, exprs(&["#s1", "#s2", "#s3"]));
    assert_eq!(exhausted.failures.len(), 3);
    assert!(exhausted.hint.contains("<inline registry>"));
    assert!(exhausted.report().contains("#s3"));
}

#[tokio::test(start_paused = true)]
async fn test_budget_split_with_slow_queries() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new()).with_query_delay(Duration::from_millis(30));

    let start = Instant::now();
    let err = engine
        .resolve(
            &mut backend,
            "chat.four",
            ResolveOptions::visible(Duration::from_millis(1000)),
        )
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err.exhausted().unwrap().failures.len(), 4);
    assert!(elapsed >= Duration::from_millis(1000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1100), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_query_cannot_overrun_budget() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new().show("#q", "late"))
        .with_query_delay(Duration::from_secs(10));

    let start = Instant::now();
    let err = engine
        .resolve(
            &mut backend,
            "chat.pair",
            ResolveOptions::visible(Duration::from_millis(1000)),
        )
        .await
        .unwrap_err();

    let exhausted = err.exhausted().unwrap();
    assert!(exhausted.failures[0].message.contains("did not answer"));
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_element_to_appear() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new()).then(300, Dom::new().show("a", "Send"));

    let start = Instant::now();
    let resolved = engine
        .resolve(
            &mut backend,
            "chat.sendButton",
            ResolveOptions::visible(Duration::from_millis(2000)),
        )
        .await
        .unwrap();

    assert_eq!(resolved.expression(), Some(&LocatorExpression::from("a")));
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(start.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_visible_state_skips_hidden_matches() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new().with(
        "a",
        vec![MockElement::hidden("template"), MockElement::visible("Send")],
    ));

    let resolved = engine
        .resolve(
            &mut backend,
            "chat.sendButton",
            ResolveOptions::visible(Duration::from_millis(400)),
        )
        .await
        .unwrap();
    assert_eq!(resolved.element().unwrap().index, 1);

    let attached = engine
        .resolve(
            &mut backend,
            "chat.sendButton",
            ResolveOptions::attached(Duration::from_millis(400)),
        )
        .await
        .unwrap();
    assert_eq!(attached.element().unwrap().index, 0);
}

#[tokio::test(start_paused = true)]
async fn test_hidden_state_waits_for_disappearance() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new().show("a", "Send")).then(400, Dom::new());

    let resolved = engine
        .resolve(
            &mut backend,
            "chat.sendButton",
            ResolveOptions::hidden(Duration::from_millis(2000)),
        )
        .await
        .unwrap();

    assert!(resolved.element().is_none());
    assert!(resolved.handle().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_query_error_moves_to_next_strategy() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new().show("b", "Send")).failing("a");

    let start = Instant::now();
    let resolved = engine
        .resolve(
            &mut backend,
            "chat.sendButton",
            ResolveOptions::visible(Duration::from_millis(1000)),
        )
        .await
        .unwrap();

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(resolved.outcome.failures[0].message.contains("not a valid selector"));
    assert_eq!(backend.calls_starting_with("query:a").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lost_session_is_not_folded_into_failures() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new().show("b", "Send"));
    backend.ready = false;

    let err = engine
        .resolve(
            &mut backend,
            "chat.sendButton",
            ResolveOptions::visible(Duration::from_millis(1000)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ResolutionError::Backend(BackendError::NotReady)));
    assert_eq!(backend.calls_starting_with("query:").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_selector_fails_fast() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new());

    let err = engine
        .resolve(
            &mut backend,
            "chat.nope",
            ResolveOptions::visible(Duration::from_millis(1000)),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResolutionError::Registry(RegistryError::UnknownSelector { .. })
    ));
    assert!(backend.calls.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resolve_all_returns_whole_match_set() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new().with(
        "li.file",
        vec![
            MockElement::visible("notes.md"),
            MockElement::hidden("draft.txt"),
            MockElement::visible("data.csv"),
        ],
    ));

    let resolved = engine
        .resolve_all(&mut backend, "files.rows", Duration::from_millis(600))
        .await
        .unwrap();

    assert_eq!(resolved.expression(), Some(&LocatorExpression::from("li.file")));
    assert_eq!(resolved.elements().len(), 3);
    let handles = resolved.handles();
    assert_eq!(handles.iter().map(|h| h.index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_probe_reports_without_failing() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(Dom::new());

    let outcome = engine
        .probe(
            &mut backend,
            "chat.pair",
            ResolveOptions::attached(Duration::ZERO),
        )
        .await
        .unwrap();

    assert!(!outcome.is_match());
    assert_eq!(outcome.failures.len(), 2);
    // A zero window still queries each expression once.
    assert_eq!(backend.calls_starting_with("query:").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_visits_every_strategy() {
    let engine = engine(REGISTRY);
    let mut backend = MockBackend::new(
        Dom::new()
            .show("#w", "first")
            .hide("#x", "hidden")
            .show("#z", "last"),
    );

    let matched = engine
        .sweep(&mut backend, "chat.four", ResolveOptions::visible(Duration::ZERO))
        .await
        .unwrap();

    let expressions: Vec<_> = matched.iter().map(|(e, _)| e.clone()).collect();
    assert_eq!(expressions, exprs(&["#w", "#z"]));
    assert_eq!(matched[1].1[0].text, "last");
    assert_eq!(backend.calls_starting_with("query:").len(), 4);
}
