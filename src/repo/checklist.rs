//! Task checklist rendering and the "mark complete" transform.

use regex::Regex;
use std::sync::LazyLock;

static PENDING_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\s*[-*+]\s+)\[[ xX]?\]").unwrap());

static LIST_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+](?:\s+|$))?(?:\[[ xX]?\]\s*)?").unwrap());

/// The task text of a plan item without any list or checkbox prefix.
/// `None` when nothing is left.
pub fn task_text(item: &str) -> Option<String> {
    let text = LIST_PREFIX.replace(item.trim(), "");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Render plan items as a markdown checklist, one `- [ ] item` per line.
/// Items may arrive with or without their own list/checkbox prefix.
pub fn render(items: &[String]) -> String {
    items
        .iter()
        .filter_map(|item| task_text(item))
        .map(|item| format!("- [ ] {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Mark every checklist item done. Advisory only: nothing checks that the
/// work was actually completed.
pub fn mark_complete(checklist: &str) -> String {
    PENDING_ITEM.replace_all(checklist, "${1}[x]").into_owned()
}
