use std::collections::HashMap;

use serde_json::Value;

use crate::comment::{clean_flair, html_to_text, normalize_id, Comment, FlairSegment};
use crate::placeholder::{classify, Placeholder};

/// Placeholder bookkeeping accumulated over one response. Nested levels
/// produce their own tables which are folded into the caller's with
/// [`SideTables::merge`], so placeholders discovered deep in a reply chain
/// surface at the top of the parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideTables {
    pub more_ids: Vec<String>,
    pub continue_parents: Vec<String>,
    pub pending_by_parent: HashMap<String, u32>,
    pub placeholder_parents: HashMap<String, String>,
}

impl SideTables {
    pub fn is_empty(&self) -> bool {
        self.more_ids.is_empty() && self.continue_parents.is_empty()
    }

    pub fn merge(&mut self, other: SideTables) {
        for id in other.more_ids {
            if !self.more_ids.contains(&id) {
                self.more_ids.push(id);
            }
        }
        for parent in other.continue_parents {
            if !self.continue_parents.contains(&parent) {
                self.continue_parents.push(parent);
            }
        }
        for (parent, count) in other.pending_by_parent {
            *self.pending_by_parent.entry(parent).or_insert(0) += count;
        }
        self.placeholder_parents.extend(other.placeholder_parents);
    }

    fn record(&mut self, placeholder: Placeholder) {
        match placeholder {
            Placeholder::More { ids, parent, count } => {
                for id in ids {
                    if let Some(parent) = parent.as_ref() {
                        self.placeholder_parents.insert(id.clone(), parent.clone());
                    }
                    if !self.more_ids.contains(&id) {
                        self.more_ids.push(id);
                    }
                }
                if count > 0 {
                    if let Some(parent) = parent {
                        *self.pending_by_parent.entry(parent).or_insert(0) += count;
                    }
                }
            }
            Placeholder::ContinueThread { parent, count } => {
                // A sentinel with no resolvable parent has nothing to continue from.
                if let Some(parent) = parent {
                    if !self.continue_parents.contains(&parent) {
                        self.continue_parents.push(parent.clone());
                    }
                    *self.pending_by_parent.entry(parent).or_insert(0) += count;
                }
            }
        }
    }
}

/// Parses one listing-shaped payload (`{kind, data: {children}}`). Anything
/// that does not match the shape degrades to an empty result rather than an
/// error; Reddit nests this shape recursively under `replies` and a single
/// malformed branch must not poison the response.
pub fn parse_listing(payload: &Value, fallback_parent: Option<&str>) -> (Vec<Comment>, SideTables) {
    match payload
        .get("data")
        .and_then(|data| data.get("children"))
        .and_then(Value::as_array)
    {
        Some(children) => parse_children(children, fallback_parent),
        None => (Vec::new(), SideTables::default()),
    }
}

/// Parses a bare element array — the `things` level of a batch-children
/// response, which skips the listing envelope.
pub fn parse_things(things: &Value, fallback_parent: Option<&str>) -> (Vec<Comment>, SideTables) {
    match things.as_array() {
        Some(children) => parse_children(children, fallback_parent),
        None => (Vec::new(), SideTables::default()),
    }
}

fn parse_children(children: &[Value], fallback_parent: Option<&str>) -> (Vec<Comment>, SideTables) {
    let mut comments = Vec::new();
    let mut tables = SideTables::default();
    let mut last_emitted: Option<String> = None;

    for child in children {
        let kind = child.get("kind").and_then(Value::as_str).unwrap_or("");
        let Some(data) = child.get("data") else {
            continue;
        };
        match kind {
            "t1" => {
                if let Some((comment, nested)) = parse_comment(data, fallback_parent) {
                    last_emitted = Some(comment.id.clone());
                    tables.merge(nested);
                    comments.push(comment);
                }
            }
            "more" => {
                tables.record(classify(data, fallback_parent, last_emitted.as_deref()));
            }
            _ => {}
        }
    }

    (comments, tables)
}

fn parse_comment(data: &Value, fallback_parent: Option<&str>) -> Option<(Comment, SideTables)> {
    let id = data
        .get("id")
        .and_then(Value::as_str)
        .and_then(normalize_id)
        .or_else(|| {
            data.get("name")
                .and_then(Value::as_str)
                .and_then(normalize_id)
        })?;

    let parent_id = data
        .get("parent_id")
        .and_then(Value::as_str)
        .and_then(normalize_id)
        .or_else(|| fallback_parent.and_then(normalize_id));

    let body_html = data
        .get("body_html")
        .and_then(Value::as_str)
        .filter(|html| !html.trim().is_empty())
        .map(str::to_string);
    let body = match body_html.as_deref() {
        Some(html) => html_to_text(html),
        None => data
            .get("body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };

    let flair = data
        .get("author_flair_text")
        .and_then(Value::as_str)
        .and_then(clean_flair);
    let flair_richtext = data
        .get("author_flair_richtext")
        .and_then(Value::as_array)
        .map(|segments| segments.iter().filter_map(parse_flair_segment).collect())
        .unwrap_or_default();

    let (replies, tables) = match data.get("replies") {
        Some(replies) if replies.is_object() => parse_listing(replies, Some(&id)),
        _ => (Vec::new(), SideTables::default()),
    };

    let comment = Comment {
        id,
        parent_id,
        author: data
            .get("author")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        body,
        body_html,
        score: data.get("score").and_then(Value::as_i64).unwrap_or(0),
        created_utc: data.get("created_utc").and_then(Value::as_f64).unwrap_or(0.0),
        flair,
        flair_richtext,
        pending_remote_replies: 0,
        replies,
    };

    Some((comment, tables))
}

fn parse_flair_segment(value: &Value) -> Option<FlairSegment> {
    let kind = value.get("e").and_then(Value::as_str)?;
    let text = value
        .get("t")
        .or_else(|| value.get("a"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let url = value.get("u").and_then(Value::as_str).unwrap_or_default();
    Some(FlairSegment {
        kind: kind.to_string(),
        text: text.to_string(),
        url: url.to_string(),
    })
}

/// Applies resolved pending-reply counts onto the built tree by id. Runs as
/// a post-pass once the whole response has been parsed, so counts attributed
/// to comments discovered later in the same response still land.
pub fn apply_pending_counts(comments: &mut [Comment], counts: &HashMap<String, u32>) {
    for comment in comments {
        if let Some(count) = counts.get(&comment.id) {
            comment.pending_remote_replies = *count;
        }
        apply_pending_counts(&mut comment.replies, counts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing(children: Value) -> Value {
        json!({"kind": "Listing", "data": {"children": children}})
    }

    #[test]
    fn trailing_more_attributes_to_last_sibling() {
        // A top-level comment followed by a bare `more` stub: the stub's
        // children belong to the comment that precedes it.
        let payload = listing(json!([
            {"kind": "t1", "data": {"id": "a", "body": "root"}},
            {"kind": "more", "data": {"id": "m1", "children": ["b", "c"]}},
        ]));
        let (comments, tables) = parse_listing(&payload, None);

        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].id, "a");
        assert_eq!(tables.more_ids, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(tables.placeholder_parents.get("b").map(String::as_str), Some("a"));
        assert_eq!(tables.placeholder_parents.get("c").map(String::as_str), Some("a"));
        assert_eq!(tables.pending_by_parent.get("a"), Some(&2));
    }

    #[test]
    fn continue_sentinel_goes_to_continue_queue_only() {
        let payload = listing(json!([
            {"kind": "t1", "data": {"id": "x", "body": "deep"}},
            {"kind": "more", "data": {"id": "_", "count": 0, "children": []}},
        ]));
        let (_, tables) = parse_listing(&payload, None);

        assert_eq!(tables.continue_parents, vec!["x".to_string()]);
        assert_eq!(tables.pending_by_parent.get("x"), Some(&1));
        assert!(tables.more_ids.is_empty());
    }

    #[test]
    fn nested_placeholders_surface_to_top() {
        let payload = listing(json!([
            {"kind": "t1", "data": {
                "id": "a",
                "body": "root",
                "replies": listing(json!([
                    {"kind": "t1", "data": {"id": "b", "body": "child"}},
                    {"kind": "more", "data": {"id": "m", "children": ["d", "e", "f"]}},
                ])),
            }},
        ]));
        let (comments, tables) = parse_listing(&payload, None);

        assert_eq!(comments[0].replies.len(), 1);
        assert_eq!(comments[0].replies[0].id, "b");
        assert_eq!(comments[0].replies[0].parent_id.as_deref(), Some("a"));
        assert_eq!(tables.more_ids, vec!["d".to_string(), "e".to_string(), "f".to_string()]);
        // The stub followed "b" at its level, so the pending replies are b's.
        assert_eq!(tables.pending_by_parent.get("b"), Some(&3));
    }

    #[test]
    fn empty_string_replies_means_no_children() {
        let payload = listing(json!([
            {"kind": "t1", "data": {"id": "a", "body": "leaf", "replies": ""}},
        ]));
        let (comments, tables) = parse_listing(&payload, None);
        assert!(comments[0].replies.is_empty());
        assert!(tables.is_empty());
    }

    #[test]
    fn node_without_id_is_skipped_entirely() {
        let payload = listing(json!([
            {"kind": "t1", "data": {"body": "ghost", "replies": listing(json!([
                {"kind": "t1", "data": {"id": "hidden", "body": "never parsed"}},
            ]))}},
            {"kind": "t1", "data": {"name": "t1_kept", "body": "via name"}},
        ]));
        let (comments, _) = parse_listing(&payload, None);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].id, "kept");
    }

    #[test]
    fn body_html_preferred_over_raw_body() {
        let payload = listing(json!([
            {"kind": "t1", "data": {
                "id": "a",
                "body": "*raw*",
                "body_html": "&lt;p&gt;rendered&lt;/p&gt;",
            }},
            {"kind": "t1", "data": {"id": "b", "body": "*raw*", "body_html": "  "}},
        ]));
        let (comments, _) = parse_listing(&payload, None);
        assert_eq!(comments[0].body, "rendered");
        assert_eq!(comments[1].body, "*raw*");
        assert!(comments[1].body_html.is_none());
    }

    #[test]
    fn flair_text_and_segments_carried() {
        let payload = listing(json!([
            {"kind": "t1", "data": {
                "id": "a",
                "body": "x",
                "author_flair_text": "\u{200B}Verified\u{FEFF}",
                "author_flair_richtext": [
                    {"e": "emoji", "a": ":snoo:", "u": "https://example.com/snoo.png"},
                    {"e": "text", "t": "Verified"},
                ],
            }},
        ]));
        let (comments, _) = parse_listing(&payload, None);
        assert_eq!(comments[0].flair.as_deref(), Some("Verified"));
        assert_eq!(comments[0].flair_richtext.len(), 2);
        assert_eq!(comments[0].flair_richtext[0].text, ":snoo:");
        assert_eq!(comments[0].flair_richtext[1].kind, "text");
    }

    #[test]
    fn malformed_listing_degrades_to_empty() {
        let (comments, tables) = parse_listing(&json!("garbage"), None);
        assert!(comments.is_empty() && tables.is_empty());

        let (comments, tables) = parse_things(&json!({"not": "an array"}), None);
        assert!(comments.is_empty() && tables.is_empty());
    }

    #[test]
    fn pending_counts_applied_recursively() {
        let payload = listing(json!([
            {"kind": "t1", "data": {
                "id": "a", "body": "root",
                "replies": listing(json!([
                    {"kind": "t1", "data": {"id": "b", "body": "child"}},
                    {"kind": "more", "data": {"id": "m", "parent_id": "t1_b", "children": ["z"]}},
                ])),
            }},
        ]));
        let (mut comments, tables) = parse_listing(&payload, None);
        apply_pending_counts(&mut comments, &tables.pending_by_parent);
        assert_eq!(comments[0].pending_remote_replies, 0);
        assert_eq!(comments[0].replies[0].pending_remote_replies, 1);
    }

    #[test]
    fn merge_dedups_and_sums() {
        let mut left = SideTables {
            more_ids: vec!["a".into(), "b".into()],
            continue_parents: vec!["p".into()],
            pending_by_parent: HashMap::from([("p".to_string(), 2)]),
            placeholder_parents: HashMap::from([("a".to_string(), "p".to_string())]),
        };
        let right = SideTables {
            more_ids: vec!["b".into(), "c".into()],
            continue_parents: vec!["p".into(), "q".into()],
            pending_by_parent: HashMap::from([("p".to_string(), 1)]),
            placeholder_parents: HashMap::from([("a".to_string(), "q".to_string())]),
        };
        left.merge(right);
        assert_eq!(left.more_ids, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(left.continue_parents, vec!["p".to_string(), "q".to_string()]);
        assert_eq!(left.pending_by_parent.get("p"), Some(&3));
        // Later attributions win in the placeholder-parent map.
        assert_eq!(left.placeholder_parents.get("a").map(String::as_str), Some("q"));
    }
}
