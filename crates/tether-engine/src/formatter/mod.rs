use crate::completion::CompletionOutcome;
use crate::resolution::Resolved;
pub use tether_common::formatter::{describe_element, excerpt, format_page_info};

/// One line saying which strategy resolved `path` and what it found.
pub fn format_resolved(verb: &str, path: &str, resolved: &Resolved) -> String {
    let mut out = format!("{} {}", verb, path);
    if let Some(expression) = resolved.expression() {
        out.push_str(&format!(" via '{}'", expression));
    }
    if let Some(element) = resolved.element() {
        out.push_str(&format!(": {}", describe_element(element)));
    }
    out
}

pub fn format_completion(outcome: &CompletionOutcome) -> String {
    match &outcome.text {
        Some(text) => text.clone(),
        None => format!(
            "(empty response after {:.1}s)",
            outcome.elapsed.as_secs_f64()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::ResolutionOutcome;
    use std::time::Duration;
    use tether_common::protocol::{ElementSnapshot, ElementState};

    #[test]
    fn test_format_resolved() {
        let element = ElementSnapshot {
            index: 0,
            tag: "button".into(),
            text: "Send".into(),
            visible: true,
            enabled: true,
            href: None,
        };
        let resolved = Resolved {
            outcome: ResolutionOutcome {
                path: "chat.sendButton".into(),
                description: "Send".into(),
                state: ElementState::Visible,
                matched_expression: Some("b".into()),
                element: Some(element.clone()),
                elements: vec![element],
                attempted_expressions: vec!["a".into(), "b".into()],
                failures: vec![],
            },
        };
        assert_eq!(
            format_resolved("Clicked", "chat.sendButton", &resolved),
            "Clicked chat.sendButton via 'b': <button> #0 \"Send\""
        );
    }

    #[test]
    fn test_format_empty_completion() {
        let outcome = CompletionOutcome {
            text: None,
            elapsed: Duration::from_millis(3500),
            signal_observed: false,
        };
        assert_eq!(format_completion(&outcome), "(empty response after 3.5s)");
    }
}
