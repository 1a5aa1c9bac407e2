use crate::protocol::{ElementSnapshot, PageInfo};

/// Longest text excerpt shown in one-line element descriptions.
const EXCERPT_LEN: usize = 60;

pub fn format_page_info(info: &PageInfo) -> String {
    format!(
        "URL: {}\nTitle: {}\nContext: {}",
        info.url, info.title, info.context
    )
}

/// One-line description of an element, used in logs and command output.
pub fn describe_element(snapshot: &ElementSnapshot) -> String {
    let mut flags = Vec::new();
    if !snapshot.visible {
        flags.push("hidden");
    }
    if !snapshot.enabled {
        flags.push("disabled");
    }

    let mut out = format!("<{}> #{}", snapshot.tag, snapshot.index);
    let text = excerpt(&snapshot.text);
    if !text.is_empty() {
        out.push_str(&format!(" \"{}\"", text));
    }
    if !flags.is_empty() {
        out.push_str(&format!(" ({})", flags.join(", ")));
    }
    out
}

/// Collapse whitespace and cut long text on a char boundary.
pub fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= EXCERPT_LEN {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(EXCERPT_LEN).collect();
    format!("{}...", cut)
}
