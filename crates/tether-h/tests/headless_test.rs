use serial_test::serial;
use std::time::Duration;
use tether_engine::backend::{Backend, BackendError};
use tether_engine::protocol::{ElementHandle, LocatorExpression};
use tether_h::HeadlessBackend;

const PAGE: &str = "<html><head><title>Chat</title></head><body>\
<textarea id='input'></textarea>\
<button id='send' onclick=\"document.getElementById('out').innerText = document.getElementById('input').value\">Send</button>\
<button style='display:none' class='ghost'>Hidden</button>\
<div id='out'></div>\
</body></html>";

async fn launch() -> Option<HeadlessBackend> {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .ok();

    let mut backend = HeadlessBackend::new();
    match backend.launch().await {
        Ok(()) => Some(backend),
        Err(e) => {
            eprintln!("Skipping: failed to launch browser (is Chromium installed?): {}", e);
            None
        }
    }
}

fn handle(expression: &str) -> ElementHandle {
    ElementHandle::new(LocatorExpression::from(expression), 0)
}

#[tokio::test]
#[serial]
async fn test_query_fill_click_read() {
    let Some(mut backend) = launch().await else {
        return;
    };

    let nav = backend
        .navigate(&format!("data:text/html,{}", PAGE))
        .await
        .expect("Navigation failed");
    assert_eq!(nav.title, "Chat");

    let buttons = backend
        .query(&LocatorExpression::from("button"))
        .await
        .expect("query failed");
    assert_eq!(buttons.len(), 2);
    assert!(buttons[0].visible);
    assert!(!buttons[1].visible);
    assert_eq!(buttons[0].tag, "button");

    let by_text = backend
        .query(&LocatorExpression::from("text=Send"))
        .await
        .unwrap();
    assert_eq!(by_text.len(), 1);

    let by_xpath = backend
        .query(&LocatorExpression::from("xpath=//textarea"))
        .await
        .unwrap();
    assert_eq!(by_xpath.len(), 1);

    backend.fill(&handle("#input"), "hello").await.unwrap();
    backend.click(&handle("#send")).await.unwrap();
    let text = backend.inner_text(&handle("#out")).await.unwrap();
    assert_eq!(text, "hello");

    backend
        .type_text(&handle("#input"), "!", Duration::from_millis(5))
        .await
        .unwrap();
    backend.click(&handle("#send")).await.unwrap();
    assert_eq!(backend.inner_text(&handle("#out")).await.unwrap(), "hello!");

    let png = backend.screenshot(false).await.unwrap();
    assert!(png.starts_with(b"\x89PNG"));

    backend.close().await.expect("Close failed");
    assert!(!backend.is_ready().await);
}

#[tokio::test]
#[serial]
async fn test_invalid_expression_and_stale_handle() {
    let Some(mut backend) = launch().await else {
        return;
    };
    backend
        .navigate(&format!("data:text/html,{}", PAGE))
        .await
        .unwrap();

    let err = backend
        .query(&LocatorExpression::from("#["))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Query { ref expression, .. } if expression == "#["));

    let err = backend
        .inner_text(&ElementHandle::new(LocatorExpression::from("#out"), 5))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::StaleElement(_)), "{:?}", err);

    backend.close().await.unwrap();
    assert!(matches!(
        backend.query(&LocatorExpression::from("body")).await,
        Err(BackendError::NotReady)
    ));
}
