use std::time::{Duration, SystemTime};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

// Zero-width joiners/spaces and BOMs that Reddit flair text tends to smuggle in.
static ZERO_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new("[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}]").unwrap());

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Comment {
    pub id: String,
    pub parent_id: Option<String>,
    pub author: String,
    pub body: String,
    pub body_html: Option<String>,
    pub score: i64,
    pub created_utc: f64,
    pub flair: Option<String>,
    pub flair_richtext: Vec<FlairSegment>,
    pub pending_remote_replies: u32,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FlairSegment {
    pub kind: String,
    pub text: String,
    pub url: String,
}

impl Comment {
    pub fn created_at(&self) -> Option<SystemTime> {
        if self.created_utc == 0.0 {
            return None;
        }
        let secs = self.created_utc.trunc() as u64;
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    pub fn descendant_count(&self) -> usize {
        self.replies
            .iter()
            .map(|reply| 1 + reply.descendant_count())
            .sum()
    }
}

/// Strips the `t1_`/`t3_` fullname prefixes and surrounding whitespace.
/// Returns `None` when nothing usable remains.
pub fn normalize_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("t1_")
        .or_else(|| trimmed.strip_prefix("t3_"))
        .unwrap_or(trimmed);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

pub(crate) fn clean_flair(raw: &str) -> Option<String> {
    let cleaned = ZERO_WIDTH.replace_all(raw, "");
    let cleaned = cleaned.trim();
    if cleaned.chars().count() <= 1 {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Reddit's `body_html` is entity-escaped HTML. Decode the outer escaping,
/// drop the markup (keeping paragraph and line breaks), then decode the
/// entities that were inside the markup itself.
pub(crate) fn html_to_text(html: &str) -> String {
    let decoded = html_escape::decode_html_entities(html);
    let mut out = String::with_capacity(decoded.len());
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in decoded.chars() {
        if in_tag {
            if ch == '>' {
                in_tag = false;
                let name = tag.trim().trim_end_matches('/').trim();
                if name.eq_ignore_ascii_case("br")
                    || name.eq_ignore_ascii_case("/p")
                    || name.eq_ignore_ascii_case("/li")
                    || name.eq_ignore_ascii_case("/blockquote")
                {
                    out.push('\n');
                }
                tag.clear();
            } else {
                tag.push(ch);
            }
        } else if ch == '<' {
            in_tag = true;
        } else {
            out.push(ch);
        }
    }
    html_escape::decode_html_entities(out.trim()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_prefixes() {
        assert_eq!(normalize_id("t1_abc").as_deref(), Some("abc"));
        assert_eq!(normalize_id("t3_link").as_deref(), Some("link"));
        assert_eq!(normalize_id("  plain  ").as_deref(), Some("plain"));
        assert_eq!(normalize_id("t1_"), None);
        assert_eq!(normalize_id("   "), None);
    }

    #[test]
    fn flair_drops_zero_width_noise() {
        assert_eq!(clean_flair("\u{200B}\u{FEFF}").as_deref(), None);
        assert_eq!(clean_flair("\u{200B}x").as_deref(), None);
        assert_eq!(clean_flair("mod\u{200D}erator").as_deref(), Some("moderator"));
    }

    #[test]
    fn html_body_decodes_to_plain_text() {
        let html = "&lt;div class=\"md\"&gt;&lt;p&gt;one &amp;amp; two&lt;/p&gt;\n&lt;p&gt;three&lt;/p&gt;&lt;/div&gt;";
        assert_eq!(html_to_text(html), "one & two\n\nthree");
    }

    #[test]
    fn html_body_keeps_line_breaks() {
        let html = "&lt;p&gt;a&lt;br/&gt;b&lt;/p&gt;";
        assert_eq!(html_to_text(html), "a\nb");
    }

    #[test]
    fn descendants_counted_recursively() {
        let leaf = Comment {
            id: "c".into(),
            parent_id: Some("b".into()),
            author: String::new(),
            body: String::new(),
            body_html: None,
            score: 0,
            created_utc: 0.0,
            flair: None,
            flair_richtext: vec![],
            pending_remote_replies: 0,
            replies: vec![],
        };
        let mid = Comment {
            id: "b".into(),
            parent_id: Some("a".into()),
            replies: vec![leaf],
            ..empty("b")
        };
        let root = Comment {
            id: "a".into(),
            replies: vec![mid],
            ..empty("a")
        };
        assert_eq!(root.descendant_count(), 2);
        assert!(root.created_at().is_none());
    }

    fn empty(id: &str) -> Comment {
        Comment {
            id: id.into(),
            parent_id: None,
            author: String::new(),
            body: String::new(),
            body_html: None,
            score: 0,
            created_utc: 0.0,
            flair: None,
            flair_richtext: vec![],
            pending_remote_replies: 0,
            replies: vec![],
        }
    }
}
