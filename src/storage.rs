use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub reddit_id: String,
    pub username: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub account_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scope: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", &"WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "foreign_keys", &"ON")
            .context("storage: enable foreign keys")?;
        conn.pragma_update(None, "busy_timeout", &5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn upsert_account(&self, mut account: Account) -> Result<i64> {
        if account.reddit_id.is_empty() {
            bail!("storage: reddit id required");
        }
        let now = Utc::now();
        if account.created_at.timestamp() == 0 {
            account.created_at = now;
        }
        account.updated_at = now;

        let conn = self.conn.lock();
        let id: i64 = conn.query_row(
            r#"
INSERT INTO accounts (reddit_id, username, display_name, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(reddit_id) DO UPDATE SET
  username = excluded.username,
  display_name = excluded.display_name,
  updated_at = excluded.updated_at
RETURNING id
"#,
            params![
                account.reddit_id,
                account.username,
                account.display_name,
                account.created_at.timestamp(),
                account.updated_at.timestamp(),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_account_by_id(&self, id: i64) -> Result<Option<Account>> {
        let conn = self.conn.lock();
        conn.query_row(
            r#"
SELECT id, reddit_id, username, display_name, created_at, updated_at
FROM accounts
WHERE id = ?1
"#,
            params![id],
            account_from_row,
        )
        .optional()
        .context("storage: query account by id")
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
SELECT id, reddit_id, username, display_name, created_at, updated_at
FROM accounts
ORDER BY username COLLATE NOCASE
"#,
        )?;
        let rows = stmt.query_map([], account_from_row)?;
        let mut accounts = Vec::new();
        for account in rows {
            accounts.push(account?);
        }
        Ok(accounts)
    }

    pub fn save_token(&self, token: &Token) -> Result<()> {
        if token.account_id == 0 {
            bail!("storage: token requires an account id");
        }
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO tokens (account_id, access_token, refresh_token, token_type, scope, expires_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(account_id) DO UPDATE SET
  access_token = excluded.access_token,
  refresh_token = excluded.refresh_token,
  token_type = excluded.token_type,
  scope = excluded.scope,
  expires_at = excluded.expires_at,
  updated_at = excluded.updated_at
"#,
            params![
                token.account_id,
                token.access_token,
                token.refresh_token,
                token.token_type,
                token.scope.join(" "),
                token.expires_at.timestamp(),
                Utc::now().timestamp(),
            ],
        )
        .context("storage: save token")?;
        Ok(())
    }

    pub fn get_token(&self, account_id: i64) -> Result<Option<Token>> {
        let conn = self.conn.lock();
        conn.query_row(
            r#"
SELECT account_id, access_token, refresh_token, token_type, scope, expires_at
FROM tokens
WHERE account_id = ?1
"#,
            params![account_id],
            token_from_row,
        )
        .optional()
        .context("storage: query token")
    }

    pub fn delete_token(&self, account_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM tokens WHERE account_id = ?1", params![account_id])
            .context("storage: delete token")?;
        Ok(())
    }

    pub fn set_pref(&self, key: &str, value: &str) -> Result<()> {
        if key.trim().is_empty() {
            bail!("storage: pref key required");
        }
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO prefs (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
            params![key, value, Utc::now().timestamp()],
        )
        .context("storage: set pref")?;
        Ok(())
    }

    pub fn get_pref(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM prefs WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("storage: get pref")
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS accounts (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  reddit_id TEXT NOT NULL UNIQUE,
  username TEXT NOT NULL,
  display_name TEXT NOT NULL DEFAULT '',
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tokens (
  account_id INTEGER PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
  access_token TEXT NOT NULL,
  refresh_token TEXT NOT NULL DEFAULT '',
  token_type TEXT NOT NULL DEFAULT 'bearer',
  scope TEXT NOT NULL DEFAULT '',
  expires_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS prefs (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
    )
    .context("storage: run migrations")
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        reddit_id: row.get(1)?,
        username: row.get(2)?,
        display_name: row.get(3)?,
        created_at: timestamp_to_datetime(row.get(4)?),
        updated_at: timestamp_to_datetime(row.get(5)?),
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    let scope: String = row.get(4)?;
    Ok(Token {
        account_id: row.get(0)?,
        access_token: row.get(1)?,
        refresh_token: row.get(2)?,
        token_type: row.get(3)?,
        scope: scope
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        expires_at: timestamp_to_datetime(row.get(5)?),
    })
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}

fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("redthread").join("redthread.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> Store {
        Store::open(Options {
            path: Some(dir.path().join("test.db")),
        })
        .unwrap()
    }

    fn account(reddit_id: &str, username: &str) -> Account {
        Account {
            id: 0,
            reddit_id: reddit_id.into(),
            username: username.into(),
            display_name: String::new(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    #[test]
    fn upsert_account_is_idempotent_on_reddit_id() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let first = store.upsert_account(account("abc", "old_name")).unwrap();
        let second = store.upsert_account(account("abc", "new_name")).unwrap();
        assert_eq!(first, second);

        let loaded = store.get_account_by_id(first).unwrap().unwrap();
        assert_eq!(loaded.username, "new_name");
        assert_eq!(store.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn token_roundtrip() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        let id = store.upsert_account(account("abc", "user")).unwrap();

        let token = Token {
            account_id: id,
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            token_type: "bearer".into(),
            scope: vec!["read".into(), "identity".into()],
            expires_at: Utc::now() + Duration::hours(1),
        };
        store.save_token(&token).unwrap();

        let loaded = store.get_token(id).unwrap().unwrap();
        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.scope, vec!["read".to_string(), "identity".to_string()]);

        store.delete_token(id).unwrap();
        assert!(store.get_token(id).unwrap().is_none());
    }

    #[test]
    fn prefs_overwrite_in_place() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        assert!(store.get_pref("comment_sort").unwrap().is_none());
        store.set_pref("comment_sort", "top").unwrap();
        store.set_pref("comment_sort", "new").unwrap();
        assert_eq!(store.get_pref("comment_sort").unwrap().as_deref(), Some("new"));
    }
}
