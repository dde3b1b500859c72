use std::sync::Arc;

use anyhow::{Context, Result};

use redthread::{config, data, pagination, reddit, session, storage};

fn main() {
    if handle_cli_flags() {
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("redthread {}", redthread::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "redthread — Fetch a Reddit thread and drain its comment pagination.\n\nUsage: redthread <subreddit> <article>\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n\nAuthentication: set REDTHREAD_ACCESS_TOKEN, or store a token for an account;\nthe first account with a stored token is used."
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args()
        .skip(1)
        .filter(|arg| !arg.starts_with('-'))
        .collect();
    let (subreddit, article) = match args.as_slice() {
        [subreddit, article] => (subreddit.clone(), article.clone()),
        _ => anyhow::bail!("usage: redthread <subreddit> <article>"),
    };

    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let provider: Arc<dyn reddit::TokenProvider> = match std::env::var("REDTHREAD_ACCESS_TOKEN") {
        Ok(token) if !token.trim().is_empty() => Arc::new(reddit::StaticTokenProvider::new(token)),
        _ => {
            let store = Arc::new(
                storage::Store::open(storage::Options::default()).context("open storage")?,
            );
            let manager = session::Manager::new(store);
            manager.load_existing().context("load sessions")?;
            manager
                .active_token_provider()
                .context("no usable account; set REDTHREAD_ACCESS_TOKEN")?
        }
    };

    let client = Arc::new(reddit::Client::new(
        provider,
        reddit::ClientConfig {
            user_agent: cfg.reddit.user_agent.clone(),
            timeout: Some(cfg.pagination.timeout()),
            ..reddit::ClientConfig::default()
        },
    )?);
    let service = data::RedditCommentService::new(client);

    let opts = reddit::CommentOptions {
        limit: Some(cfg.pagination.comment_limit),
        depth: Some(cfg.pagination.comment_depth),
        sort: reddit::CommentSortOption::default(),
    };
    let detail = pagination::load_thread(&service, &subreddit, &article, opts)?;

    println!(
        "{} — u/{} ({} comments)\n",
        detail.post.title, detail.post.author, detail.post.num_comments
    );
    print_tree(&detail.comments, 0);

    let mut cursor = detail.cursor;
    while let Some(current) = cursor {
        let page = pagination::fetch_more_comments(
            &service,
            &current,
            cfg.pagination.page_size,
            reddit::CommentSortOption::default(),
        )?;
        print_tree(&page.comments, 1);
        cursor = page.cursor;
    }

    Ok(())
}

fn print_tree(comments: &[redthread::Comment], depth: usize) {
    for comment in comments {
        let indent = "  ".repeat(depth);
        let pending = if comment.pending_remote_replies > 0 {
            format!(" (+{} pending)", comment.pending_remote_replies)
        } else {
            String::new()
        };
        println!("{indent}u/{} [{}]{}", comment.author, comment.score, pending);
        for line in comment.body.lines() {
            println!("{indent}  {line}");
        }
        print_tree(&comment.replies, depth + 1);
    }
}
