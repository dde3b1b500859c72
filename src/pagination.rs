use std::collections::HashMap;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::comment::Comment;
use crate::cursor::{PaginationCursor, MORE_BATCH_LIMIT};
use crate::data::CommentService;
use crate::parser::{self, SideTables};
use crate::reddit::{CommentOptions, CommentSortOption, ListingEnvelope, Post};

#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    #[error("unable to load post")]
    MissingPost,
    #[error("comment payload missing elements")]
    TruncatedResponse,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
    pub cursor: Option<PaginationCursor>,
}

/// One pagination step's output: hydrated comments, the cursor for the
/// remaining work (`None` once exhausted), and the new absolute pending
/// counts for every parent the step touched.
#[derive(Debug, Clone, Default)]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub cursor: Option<PaginationCursor>,
    pub pending: HashMap<String, u32>,
}

/// Interprets the raw two-element post-detail payload: the post itself, the
/// first page of comments (pending counts applied), and a cursor seeded from
/// the placeholders the page left behind.
pub fn parse_post_detail(payload: &[Value]) -> Result<PostDetail> {
    let post = payload
        .first()
        .and_then(parse_post_listing)
        .ok_or(ThreadError::MissingPost)?;

    let (mut comments, tables) = match payload.get(1) {
        Some(listing) => parser::parse_listing(listing, None),
        None => (Vec::new(), SideTables::default()),
    };
    parser::apply_pending_counts(&mut comments, &tables.pending_by_parent);

    let cursor = PaginationCursor::from_tables(&post.id, &post.permalink, &tables);
    debug!(
        comments = comments.len(),
        has_more = cursor.is_some(),
        "parsed post detail"
    );
    Ok(PostDetail {
        post,
        comments,
        cursor,
    })
}

/// Initial fetch + parse in one call.
pub fn load_thread(
    service: &dyn CommentService,
    subreddit: &str,
    article: &str,
    opts: CommentOptions,
) -> Result<PostDetail> {
    let payload = service.load_post_detail(subreddit, article, opts)?;
    parse_post_detail(&payload)
}

/// Executes exactly one pagination step against the service. The caller's
/// cursor is never touched: the step advances a private snapshot and hands
/// back the result, so a failed step can simply be retried with the same
/// cursor.
pub fn fetch_more_comments(
    service: &dyn CommentService,
    cursor: &PaginationCursor,
    limit: usize,
    sort: CommentSortOption,
) -> Result<CommentPage> {
    if !cursor.has_work() {
        return Ok(CommentPage::default());
    }
    let limit = if limit == 0 { MORE_BATCH_LIMIT } else { limit };
    let mut next = cursor.snapshot();

    // Forced navigation wins over batch hydration for this round.
    if let Some(target) = next.consume_forced_continue_parent() {
        return continue_step(service, next, target, limit, sort);
    }
    if next.remaining_more() > 0 {
        return more_step(service, next, limit, sort);
    }
    match next.poll_continue_thread_parent() {
        Some(target) => continue_step(service, next, target, limit, sort),
        None => Ok(CommentPage::default()),
    }
}

fn more_step(
    service: &dyn CommentService,
    mut cursor: PaginationCursor,
    limit: usize,
    sort: CommentSortOption,
) -> Result<CommentPage> {
    let batch = cursor.take_more_batch(limit);
    debug!(
        batch = batch.len(),
        remaining = cursor.remaining_more(),
        "hydrating comment batch"
    );
    let things = service.load_more_children(
        &cursor.link_fullname(),
        &batch.join(","),
        CommentOptions {
            limit: None,
            depth: None,
            sort,
        },
    )?;

    let (comments, tables) = parser::parse_things(&things, None);
    let mut comments = order_by_requested(comments, &batch);

    cursor.absorb(&tables);
    let consumed = cursor.consume_placeholder_parents(&batch);
    let pending = affected_pending(
        &cursor,
        consumed.keys().chain(tables.pending_by_parent.keys()),
    );
    parser::apply_pending_counts(&mut comments, &tables.pending_by_parent);

    Ok(page(comments, cursor, pending))
}

fn continue_step(
    service: &dyn CommentService,
    mut cursor: PaginationCursor,
    target: String,
    limit: usize,
    sort: CommentSortOption,
) -> Result<CommentPage> {
    let path = focused_path(cursor.permalink(), cursor.link_id(), &target);
    debug!(%target, path, "continuing truncated thread");
    let payload = service.load_focused_thread(
        &path,
        CommentOptions {
            limit: Some(limit as u32),
            depth: None,
            sort,
        },
    )?;
    let listing = payload.get(1).ok_or(ThreadError::TruncatedResponse)?;

    let (comments, tables) = parser::parse_listing(listing, None);
    let mut comments = order_target_first(comments, &target);

    cursor.absorb(&tables);
    let pending = affected_pending(
        &cursor,
        tables.pending_by_parent.keys().chain(std::iter::once(&target)),
    );
    parser::apply_pending_counts(&mut comments, &tables.pending_by_parent);

    Ok(page(comments, cursor, pending))
}

fn page(
    comments: Vec<Comment>,
    cursor: PaginationCursor,
    pending: HashMap<String, u32>,
) -> CommentPage {
    let cursor = cursor.has_work().then_some(cursor);
    CommentPage {
        comments,
        cursor,
        pending,
    }
}

fn parse_post_listing(value: &Value) -> Option<Post> {
    let envelope: ListingEnvelope<Post> = serde_json::from_value(value.clone()).ok()?;
    envelope
        .data
        .children
        .into_iter()
        .next()
        .map(|thing| thing.data)
}

/// Batch responses come back in server order; present them in the order the
/// ids were asked for, with unrequested extras at the end.
fn order_by_requested(mut comments: Vec<Comment>, requested: &[String]) -> Vec<Comment> {
    let mut ordered = Vec::with_capacity(comments.len());
    for id in requested {
        if let Some(pos) = comments.iter().position(|comment| comment.id == *id) {
            ordered.push(comments.remove(pos));
        }
    }
    ordered.extend(comments);
    ordered
}

fn order_target_first(mut comments: Vec<Comment>, target: &str) -> Vec<Comment> {
    if let Some(pos) = comments.iter().position(|comment| comment.id == target) {
        let comment = comments.remove(pos);
        comments.insert(0, comment);
    }
    comments
}

fn focused_path(permalink: &str, link_id: &str, target: &str) -> String {
    if permalink.is_empty() {
        format!("/comments/{}/_/{}", link_id, target)
    } else {
        format!("{}/{}", permalink.trim_end_matches('/'), target)
    }
}

fn affected_pending<'a, I>(cursor: &PaginationCursor, parents: I) -> HashMap<String, u32>
where
    I: Iterator<Item = &'a String>,
{
    parents
        .map(|parent| (parent.clone(), cursor.pending_count_for(parent)))
        .collect()
}
