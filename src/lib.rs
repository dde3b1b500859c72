#![allow(clippy::uninlined_format_args)]

pub mod comment;
pub mod config;
pub mod cursor;
pub mod data;
pub mod pagination;
pub mod parser;
pub mod placeholder;
pub mod reddit;
pub mod session;
pub mod storage;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use comment::Comment;
pub use cursor::PaginationCursor;
pub use pagination::{fetch_more_comments, load_thread, parse_post_detail, CommentPage, PostDetail};
