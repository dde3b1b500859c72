use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::reddit::{self, CommentOptions, ListingOptions, SortOption};

pub trait FeedService: Send + Sync {
    fn load_front_page(&self, sort: SortOption, opts: ListingOptions)
        -> Result<reddit::Listing<reddit::Post>>;
    fn load_subreddit(
        &self,
        name: &str,
        sort: SortOption,
        opts: ListingOptions,
    ) -> Result<reddit::Listing<reddit::Post>>;
}

/// The HTTP collaborator the pagination engine drives. All three operations
/// return raw payloads; interpretation belongs to the parser.
pub trait CommentService: Send + Sync {
    /// Two-element post-detail payload: post listing + comment listing.
    fn load_post_detail(
        &self,
        subreddit: &str,
        article: &str,
        opts: CommentOptions,
    ) -> Result<Vec<Value>>;

    /// Raw `things` array from a batch children request.
    fn load_more_children(
        &self,
        link_fullname: &str,
        children_csv: &str,
        opts: CommentOptions,
    ) -> Result<Value>;

    /// Two-element focused-thread payload, same shape as post detail.
    fn load_focused_thread(&self, path: &str, opts: CommentOptions) -> Result<Vec<Value>>;
}

pub struct RedditFeedService {
    client: Arc<reddit::Client>,
}

impl RedditFeedService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for RedditFeedService {
    fn load_front_page(
        &self,
        sort: SortOption,
        opts: ListingOptions,
    ) -> Result<reddit::Listing<reddit::Post>> {
        self.client.front_page(sort, opts).context("fetch front page")
    }

    fn load_subreddit(
        &self,
        name: &str,
        sort: SortOption,
        opts: ListingOptions,
    ) -> Result<reddit::Listing<reddit::Post>> {
        self.client
            .subreddit_listing(name, sort, opts)
            .context("fetch subreddit feed")
    }
}

pub struct RedditCommentService {
    client: Arc<reddit::Client>,
}

impl RedditCommentService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for RedditCommentService {
    fn load_post_detail(
        &self,
        subreddit: &str,
        article: &str,
        opts: CommentOptions,
    ) -> Result<Vec<Value>> {
        self.client
            .post_detail(subreddit, article, opts)
            .context("fetch post detail")
    }

    fn load_more_children(
        &self,
        link_fullname: &str,
        children_csv: &str,
        opts: CommentOptions,
    ) -> Result<Value> {
        self.client
            .more_children(link_fullname, children_csv, opts)
            .context("fetch more children")
    }

    fn load_focused_thread(&self, path: &str, opts: CommentOptions) -> Result<Vec<Value>> {
        self.client
            .focused_thread(path, opts)
            .context("fetch focused thread")
    }
}

#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn load_front_page(
        &self,
        _sort: SortOption,
        _opts: ListingOptions,
    ) -> Result<reddit::Listing<reddit::Post>> {
        Ok(mock_listing("Welcome to redthread"))
    }

    fn load_subreddit(
        &self,
        name: &str,
        _sort: SortOption,
        _opts: ListingOptions,
    ) -> Result<reddit::Listing<reddit::Post>> {
        Ok(mock_listing(&format!("Sample posts for {}", name)))
    }
}

/// Serves a small canned thread with one unresolved placeholder, for offline
/// use and engine tests.
#[derive(Default)]
pub struct MockCommentService;

impl CommentService for MockCommentService {
    fn load_post_detail(
        &self,
        subreddit: &str,
        article: &str,
        _opts: CommentOptions,
    ) -> Result<Vec<Value>> {
        let subreddit = subreddit.trim_start_matches("r/");
        Ok(vec![
            json!({"kind": "Listing", "data": {"children": [{
                "kind": "t3",
                "data": {
                    "id": article,
                    "name": format!("t3_{article}"),
                    "title": format!("{subreddit} — {article}"),
                    "subreddit": subreddit,
                    "author": "redthread",
                    "selftext": "Canned thread for offline browsing.",
                    "permalink": format!("/r/{subreddit}/comments/{article}/sample/"),
                    "num_comments": 3,
                },
            }]}}),
            json!({"kind": "Listing", "data": {"children": [
                {"kind": "t1", "data": {
                    "id": "c1",
                    "author": "redthread",
                    "body": "Top-level comment.",
                    "replies": "",
                }},
                {"kind": "more", "data": {"id": "m1", "count": 2, "children": ["c2", "c3"]}},
            ]}}),
        ])
    }

    fn load_more_children(
        &self,
        _link_fullname: &str,
        children_csv: &str,
        _opts: CommentOptions,
    ) -> Result<Value> {
        let things: Vec<Value> = children_csv
            .split(',')
            .filter(|id| !id.is_empty())
            .map(|id| {
                json!({"kind": "t1", "data": {
                    "id": id,
                    "parent_id": "t1_c1",
                    "author": "redthread",
                    "body": format!("Hydrated reply {id}."),
                }})
            })
            .collect();
        Ok(Value::Array(things))
    }

    fn load_focused_thread(&self, path: &str, _opts: CommentOptions) -> Result<Vec<Value>> {
        let target = path
            .trim_end_matches(".json")
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("c1")
            .to_string();
        Ok(vec![
            json!({"kind": "Listing", "data": {"children": [{
                "kind": "t3",
                "data": {
                    "id": "sample",
                    "name": "t3_sample",
                    "title": "Canned focused thread",
                    "subreddit": "redthread",
                    "author": "redthread",
                },
            }]}}),
            json!({"kind": "Listing", "data": {"children": [
                {"kind": "t1", "data": {
                    "id": target,
                    "author": "redthread",
                    "body": "Continued thread root.",
                    "replies": "",
                }},
            ]}}),
        ])
    }
}

fn mock_listing(title: &str) -> reddit::Listing<reddit::Post> {
    let post = reddit::Post {
        id: "welcome".into(),
        name: "t3_welcome".into(),
        title: title.into(),
        subreddit: "redthread".into(),
        author: "team".into(),
        selftext: "Sample content provided for offline browsing.".into(),
        url: String::new(),
        permalink: "/r/redthread/comments/welcome/hello/".into(),
        score: 1234,
        num_comments: 42,
        created_utc: 0.0,
        thumbnail: String::new(),
        stickied: false,
        over_18: false,
        spoiler: false,
    };

    reddit::Listing {
        after: None,
        before: None,
        children: vec![reddit::Thing {
            kind: "t3".into(),
            data: post,
        }],
    }
}

pub fn sort_option_from_key(key: &str) -> SortOption {
    match key {
        "best" => SortOption::Best,
        "new" => SortOption::New,
        "top" => SortOption::Top,
        "rising" => SortOption::Rising,
        _ => SortOption::Hot,
    }
}
