use serde_json::Value;

use crate::comment::normalize_id;

/// The id Reddit gives a depth-truncation stub instead of a real fullname.
pub(crate) const CONTINUE_SENTINEL: &str = "_";

#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
    /// Ordinary unfetched siblings, hydrated via a batch children request.
    More {
        ids: Vec<String>,
        parent: Option<String>,
        count: u32,
    },
    /// Depth-limit sentinel; the parent itself is the continuation target.
    ContinueThread { parent: Option<String>, count: u32 },
}

impl Placeholder {
    pub fn parent(&self) -> Option<&str> {
        match self {
            Placeholder::More { parent, .. } | Placeholder::ContinueThread { parent, .. } => {
                parent.as_deref()
            }
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            Placeholder::More { count, .. } | Placeholder::ContinueThread { count, .. } => *count,
        }
    }
}

/// Interprets one `more`-kind element. `fallback_parent` is the enclosing
/// comment when parsing nested replies; `last_sibling` is the last real
/// comment emitted at the same level, covering Reddit's trailing-stub
/// convention where the element carries no parent link of its own.
pub fn classify(
    data: &Value,
    fallback_parent: Option<&str>,
    last_sibling: Option<&str>,
) -> Placeholder {
    let own_id = data
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");

    let ids: Vec<String> = data
        .get("children")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(normalize_id)
                .collect()
        })
        .unwrap_or_default();

    let parent = data
        .get("parent_id")
        .and_then(Value::as_str)
        .and_then(normalize_id)
        .or_else(|| fallback_parent.and_then(normalize_id))
        .or_else(|| last_sibling.and_then(normalize_id));

    let explicit = data.get("count").and_then(Value::as_i64).unwrap_or(0);
    let sentinel = own_id == CONTINUE_SENTINEL && ids.is_empty();

    let count = if explicit > 0 {
        explicit as u32
    } else if !ids.is_empty() {
        ids.len() as u32
    } else if sentinel {
        1
    } else {
        0
    };

    if sentinel {
        Placeholder::ContinueThread { parent, count }
    } else {
        Placeholder::More { ids, parent, count }
    }
}
