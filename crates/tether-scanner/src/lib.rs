/// The query helper injected into every page by the backends.
/// It installs `window.__tether` once and is a no-op afterwards.
pub const QUERY_JS: &str = include_str!("query.js");

/// Attribute the helper puts on an element so native drivers can address it by CSS.
pub const MARK_ATTRIBUTE: &str = "data-tether-mark";

/// Expression that is true once the helper is installed.
pub const PROBE_JS: &str = "typeof window.__tether !== 'undefined'";

/// Prefix of the error message the helper throws when an addressed element vanished.
pub const STALE_MARKER: &str = "tether:stale";

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

pub fn query_call(expression: &str) -> String {
    format!("window.__tether.query({})", quote(expression))
}

pub fn mark_call(expression: &str, index: usize, token: &str) -> String {
    format!(
        "window.__tether.mark({}, {}, {})",
        quote(expression),
        index,
        quote(token)
    )
}

pub fn text_call(expression: &str, index: usize) -> String {
    format!("window.__tether.text({}, {})", quote(expression), index)
}

pub fn fill_call(expression: &str, index: usize, value: &str) -> String {
    format!(
        "window.__tether.fill({}, {}, {})",
        quote(expression),
        index,
        quote(value)
    )
}

pub fn focus_call(expression: &str, index: usize) -> String {
    format!("window.__tether.focus({}, {})", quote(expression), index)
}

/// CSS selector for an element previously tagged with `mark_call`.
pub fn mark_selector(token: &str) -> String {
    format!("[{}={}]", MARK_ATTRIBUTE, quote(token))
}
