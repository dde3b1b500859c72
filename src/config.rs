use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "REDTHREAD";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedditConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("redthread/{} (+https://github.com/danielmerja/redthread)", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaginationConfig {
    /// Ids requested per batch-children round trip; the server caps at 100.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_comment_limit")]
    pub comment_limit: u32,
    #[serde(default = "default_comment_depth")]
    pub comment_depth: u32,
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            comment_limit: default_comment_limit(),
            comment_depth: default_comment_depth(),
            request_timeout: None,
        }
    }
}

impl PaginationConfig {
    pub fn timeout(&self) -> Duration {
        self.request_timeout.unwrap_or_else(default_request_timeout)
    }
}

fn default_page_size() -> usize {
    25
}

fn default_comment_limit() -> u32 {
    100
}

fn default_comment_depth() -> u32 {
    10
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix)?);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.reddit.client_id.is_empty() {
        base.reddit.client_id = other.reddit.client_id;
    }
    if !other.reddit.client_secret.is_empty() {
        base.reddit.client_secret = other.reddit.client_secret;
    }
    if !other.reddit.user_agent.is_empty() {
        base.reddit.user_agent = other.reddit.user_agent;
    }

    if other.pagination.page_size != 0 {
        base.pagination.page_size = other.pagination.page_size;
    }
    if other.pagination.comment_limit != 0 {
        base.pagination.comment_limit = other.pagination.comment_limit;
    }
    if other.pagination.comment_depth != 0 {
        base.pagination.comment_depth = other.pagination.comment_depth;
    }
    if other.pagination.request_timeout.is_some() {
        base.pagination.request_timeout = other.pagination.request_timeout;
    }

    base
}

fn load_env(prefix: &str) -> Result<Config> {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    // Start from a sparse config so untouched fields never clobber file
    // values during the merge.
    let mut cfg = Config {
        reddit: RedditConfig {
            client_id: String::new(),
            client_secret: String::new(),
            user_agent: String::new(),
        },
        pagination: PaginationConfig {
            page_size: 0,
            comment_limit: 0,
            comment_depth: 0,
            request_timeout: None,
        },
    };

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }

    Ok(cfg)
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "reddit.client_id" => cfg.reddit.client_id = value,
        "reddit.client_secret" => cfg.reddit.client_secret = value,
        "reddit.user_agent" => cfg.reddit.user_agent = value,
        "pagination.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.pagination.page_size = parsed;
            }
        }
        "pagination.comment_limit" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.pagination.comment_limit = parsed;
            }
        }
        "pagination.comment_depth" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.pagination.comment_depth = parsed;
            }
        }
        "pagination.request_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.pagination.request_timeout = Some(duration);
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("redthread").join("config.yaml"))
}
