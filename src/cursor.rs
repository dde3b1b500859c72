use std::collections::{HashMap, VecDeque};

use crate::comment::normalize_id;
use crate::parser::SideTables;

/// Reddit refuses batch-children requests above this many ids.
pub const MORE_BATCH_LIMIT: usize = 100;

/// Resumable pagination state for one post's comment tree: the outstanding
/// batch placeholders, the outstanding continue-thread targets, and which
/// comment each batch placeholder belongs to.
///
/// A cursor is a plain value. Callers keep exactly one live cursor per post
/// session and run at most one fetch step against it at a time; different
/// posts' cursors are fully independent.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationCursor {
    link_id: String,
    permalink: String,
    more_queue: VecDeque<String>,
    continue_queue: VecDeque<String>,
    placeholder_parents: HashMap<String, String>,
    forced_continue: Option<String>,
}

impl PaginationCursor {
    pub fn new(link_id: &str, permalink: &str) -> Self {
        Self {
            link_id: normalize_id(link_id).unwrap_or_default(),
            permalink: permalink.trim().to_string(),
            more_queue: VecDeque::new(),
            continue_queue: VecDeque::new(),
            placeholder_parents: HashMap::new(),
            forced_continue: None,
        }
    }

    /// Builds a cursor from one response's side tables; `None` when the
    /// response left no placeholder work behind.
    pub fn from_tables(link_id: &str, permalink: &str, tables: &SideTables) -> Option<Self> {
        let mut cursor = Self::new(link_id, permalink);
        cursor.absorb(tables);
        cursor.has_work().then_some(cursor)
    }

    pub fn link_id(&self) -> &str {
        &self.link_id
    }

    pub fn link_fullname(&self) -> String {
        format!("t3_{}", self.link_id)
    }

    pub fn permalink(&self) -> &str {
        &self.permalink
    }

    pub fn has_work(&self) -> bool {
        !self.more_queue.is_empty() || !self.continue_queue.is_empty()
    }

    pub fn remaining_more(&self) -> usize {
        self.more_queue.len()
    }

    pub fn remaining_continue(&self) -> usize {
        self.continue_queue.len()
    }

    /// Pops up to `min(max, 100, queue length)` ids in FIFO order. Oldest
    /// first matches the left-to-right discovery order of the tree.
    pub fn take_more_batch(&mut self, max: usize) -> Vec<String> {
        let take = max.min(MORE_BATCH_LIMIT).min(self.more_queue.len());
        self.more_queue.drain(..take).collect()
    }

    /// Appends ids not already queued and merges placeholder→parent
    /// attributions (later attributions overwrite).
    pub fn enqueue_more<I>(&mut self, ids: I, parents: &HashMap<String, String>)
    where
        I: IntoIterator<Item = String>,
    {
        for id in ids {
            let Some(id) = normalize_id(&id) else {
                continue;
            };
            if !self.more_queue.contains(&id) {
                self.more_queue.push_back(id);
            }
        }
        for (child, parent) in parents {
            if let (Some(child), Some(parent)) = (normalize_id(child), normalize_id(parent)) {
                self.placeholder_parents.insert(child, parent);
            }
        }
    }

    pub fn enqueue_continue_thread(&mut self, parent: &str) {
        let Some(parent) = normalize_id(parent) else {
            return;
        };
        if !self.continue_queue.contains(&parent) {
            self.continue_queue.push_back(parent);
        }
    }

    pub fn poll_continue_thread_parent(&mut self) -> Option<String> {
        self.continue_queue.pop_front()
    }

    /// Folds one response's side tables into the queues.
    pub fn absorb(&mut self, tables: &SideTables) {
        self.enqueue_more(tables.more_ids.iter().cloned(), &tables.placeholder_parents);
        for parent in &tables.continue_parents {
            self.enqueue_continue_thread(parent);
        }
    }

    /// Removes the attribution entries for fetched placeholder ids and
    /// tallies how many each parent lost. Ids without a recorded parent
    /// (top-level placeholders) are skipped silently.
    pub fn consume_placeholder_parents(&mut self, ids: &[String]) -> HashMap<String, u32> {
        let mut consumed: HashMap<String, u32> = HashMap::new();
        for id in ids {
            let removed = self.placeholder_parents.remove(id).or_else(|| {
                normalize_id(id).and_then(|id| self.placeholder_parents.remove(&id))
            });
            if let Some(parent) = removed {
                *consumed.entry(parent).or_insert(0) += 1;
            }
        }
        consumed
    }

    /// Designates a parent to be served ahead of normal continue-queue
    /// order, enqueueing it if absent.
    pub fn mark_force_continue_parent(&mut self, parent: &str) {
        let Some(parent) = normalize_id(parent) else {
            return;
        };
        if !self.continue_queue.contains(&parent) {
            self.continue_queue.push_back(parent.clone());
        }
        self.forced_continue = Some(parent);
    }

    /// One-shot: clears the forced designation and extracts that parent from
    /// wherever it sits in the continue-queue, keeping the rest in order. A
    /// forced parent that is no longer queued yields `None` without
    /// restoring the flag.
    pub fn consume_forced_continue_parent(&mut self) -> Option<String> {
        let forced = self.forced_continue.take()?;
        let position = self.continue_queue.iter().position(|id| *id == forced)?;
        self.continue_queue.remove(position)
    }

    /// Moves the queued placeholder ids attributed to `parent` to the front,
    /// keeping both groups in their original relative order.
    pub fn promote_placeholders_for_parent(&mut self, parent: &str) -> bool {
        let Some(parent) = normalize_id(parent) else {
            return false;
        };
        let (mut promoted, rest): (VecDeque<String>, VecDeque<String>) = self
            .more_queue
            .drain(..)
            .partition(|id| self.placeholder_parents.get(id) == Some(&parent));
        if promoted.is_empty() {
            self.more_queue = rest;
            return false;
        }
        promoted.extend(rest);
        self.more_queue = promoted;
        true
    }

    pub fn promote_continue_thread_parent(&mut self, parent: &str) -> bool {
        let Some(parent) = normalize_id(parent) else {
            return false;
        };
        let Some(position) = self.continue_queue.iter().position(|id| *id == parent) else {
            return false;
        };
        if let Some(entry) = self.continue_queue.remove(position) {
            self.continue_queue.push_front(entry);
        }
        true
    }

    /// Number of outstanding placeholders currently attributed to `parent`:
    /// batch entries in the attribution map plus a queued continue target.
    pub fn pending_count_for(&self, parent: &str) -> u32 {
        let batch = self
            .placeholder_parents
            .values()
            .filter(|owner| owner.as_str() == parent)
            .count() as u32;
        let continued = u32::from(self.continue_queue.iter().any(|id| id == parent));
        batch + continued
    }

    /// Independent copy representing the remaining work. The cursor handed
    /// out to callers is always a snapshot; in-flight mutation stays private
    /// to one fetch step.
    pub fn snapshot(&self) -> PaginationCursor {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor() -> PaginationCursor {
        PaginationCursor::new("t3_post", "/r/rust/comments/post/title/")
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn enqueue_dedups_regardless_of_repetition() {
        let mut cur = cursor();
        cur.enqueue_more(ids(&["a", "b", "a"]), &HashMap::new());
        cur.enqueue_more(ids(&["b", "t1_a", "c"]), &HashMap::new());
        assert_eq!(cur.take_more_batch(10), ids(&["a", "b", "c"]));
    }

    #[test]
    fn batch_respects_server_cap() {
        let mut cur = cursor();
        let many: Vec<String> = (1..=150).map(|n| format!("id{n}")).collect();
        cur.enqueue_more(many, &HashMap::new());

        let batch = cur.take_more_batch(200);
        assert_eq!(batch.len(), MORE_BATCH_LIMIT);
        assert_eq!(cur.remaining_more(), 50);

        let batch = cur.take_more_batch(10);
        assert_eq!(batch.len(), 10);
        assert_eq!(cur.remaining_more(), 40);
    }

    #[test]
    fn batch_conserves_work() {
        let mut cur = cursor();
        cur.enqueue_more(ids(&["a", "b", "c", "d"]), &HashMap::new());
        let before = cur.remaining_more();
        let batch = cur.take_more_batch(3);
        assert_eq!(batch.len() + cur.remaining_more(), before);
    }

    #[test]
    fn forced_continue_is_one_shot() {
        let mut cur = cursor();
        cur.enqueue_continue_thread("x");
        cur.mark_force_continue_parent("x");

        assert_eq!(cur.consume_forced_continue_parent().as_deref(), Some("x"));
        // x got re-queued through the normal path, but the forced flag is gone.
        cur.enqueue_continue_thread("x");
        assert_eq!(cur.consume_forced_continue_parent(), None);
    }

    #[test]
    fn forced_parent_missing_from_queue_clears_flag() {
        let mut cur = cursor();
        cur.mark_force_continue_parent("x");
        assert_eq!(cur.poll_continue_thread_parent().as_deref(), Some("x"));
        // The queue no longer holds x; the consume must not panic or loop.
        assert_eq!(cur.consume_forced_continue_parent(), None);
        assert_eq!(cur.consume_forced_continue_parent(), None);
    }

    #[test]
    fn promote_preserves_relative_order() {
        let mut cur = cursor();
        let parents = HashMap::from([
            ("b".to_string(), "p".to_string()),
            ("d".to_string(), "p".to_string()),
        ]);
        cur.enqueue_more(ids(&["a", "b", "c", "d", "e"]), &parents);

        assert!(cur.promote_placeholders_for_parent("p"));
        assert_eq!(cur.take_more_batch(10), ids(&["b", "d", "a", "c", "e"]));

        assert!(!cur.promote_placeholders_for_parent("p"));
    }

    #[test]
    fn promote_continue_moves_to_front() {
        let mut cur = cursor();
        cur.enqueue_continue_thread("a");
        cur.enqueue_continue_thread("b");
        cur.enqueue_continue_thread("c");

        assert!(cur.promote_continue_thread_parent("c"));
        assert!(!cur.promote_continue_thread_parent("zz"));
        assert_eq!(cur.poll_continue_thread_parent().as_deref(), Some("c"));
        assert_eq!(cur.poll_continue_thread_parent().as_deref(), Some("a"));
        assert_eq!(cur.poll_continue_thread_parent().as_deref(), Some("b"));
    }

    #[test]
    fn consume_tries_raw_then_normalized() {
        let mut cur = cursor();
        let parents = HashMap::from([
            ("a".to_string(), "p".to_string()),
            ("b".to_string(), "p".to_string()),
            ("c".to_string(), "q".to_string()),
        ]);
        cur.enqueue_more(ids(&["a", "b", "c"]), &parents);

        let consumed = cur.consume_placeholder_parents(&ids(&["a", "t1_b", "c", "unknown"]));
        assert_eq!(consumed.get("p"), Some(&2));
        assert_eq!(consumed.get("q"), Some(&1));
        assert_eq!(cur.pending_count_for("p"), 0);
    }

    #[test]
    fn pending_counts_include_continue_targets() {
        let mut cur = cursor();
        let parents = HashMap::from([("a".to_string(), "p".to_string())]);
        cur.enqueue_more(ids(&["a"]), &parents);
        cur.enqueue_continue_thread("p");
        assert_eq!(cur.pending_count_for("p"), 2);
    }

    #[test]
    fn snapshot_is_independent() {
        let mut cur = cursor();
        cur.enqueue_more(ids(&["a", "b"]), &HashMap::new());
        let snap = cur.snapshot();

        cur.take_more_batch(2);
        assert!(!cur.has_work());
        assert_eq!(snap.remaining_more(), 2);
        assert_eq!(snap.link_fullname(), "t3_post");
        assert_eq!(snap.permalink(), "/r/rust/comments/post/title/");
    }

    #[test]
    fn from_tables_requires_outstanding_work() {
        let tables = SideTables::default();
        assert!(PaginationCursor::from_tables("post", "/comments/post/", &tables).is_none());

        let tables = SideTables {
            more_ids: vec!["a".into()],
            ..SideTables::default()
        };
        let cur = PaginationCursor::from_tables("t3_post", "/comments/post/", &tables).unwrap();
        assert!(cur.has_work());
        assert_eq!(cur.link_id(), "post");
    }
}
