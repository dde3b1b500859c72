use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use chrono::Utc;
use parking_lot::RwLock;

use crate::reddit::{OAuthToken, TokenProvider};
use crate::storage::{self, Account};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("account not found")]
    AccountNotFound,
    #[error("token not found")]
    TokenNotFound,
    #[error("token expired")]
    TokenExpired,
}

/// Account bookkeeping over the store. Token acquisition (the OAuth
/// handshake) happens outside this crate; the manager only hands out
/// providers for tokens that are already persisted.
pub struct Manager {
    store: Arc<storage::Store>,
    active_id: RwLock<Option<i64>>,
}

impl Manager {
    pub fn new(store: Arc<storage::Store>) -> Self {
        Self {
            store,
            active_id: RwLock::new(None),
        }
    }

    /// Picks the first account with a stored token as active, if any.
    pub fn load_existing(&self) -> Result<()> {
        for account in self.store.list_accounts()? {
            if self.store.get_token(account.id)?.is_some() {
                *self.active_id.write() = Some(account.id);
                break;
            }
        }
        Ok(())
    }

    pub fn active_account_id(&self) -> Option<i64> {
        *self.active_id.read()
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.store.list_accounts()
    }

    pub fn switch(&self, account_id: i64) -> Result<Account> {
        let account = self
            .store
            .get_account_by_id(account_id)?
            .ok_or(SessionError::AccountNotFound)?;
        self.store
            .get_token(account_id)?
            .ok_or(SessionError::TokenNotFound)?;
        *self.active_id.write() = Some(account_id);
        Ok(account)
    }

    pub fn active_token_provider(&self) -> Result<Arc<dyn TokenProvider>> {
        let active_id = self
            .active_account_id()
            .ok_or(SessionError::AccountNotFound)?;
        self.token_provider(active_id)
    }

    pub fn token_provider(&self, account_id: i64) -> Result<Arc<dyn TokenProvider>> {
        if account_id == 0 {
            return Err(SessionError::AccountNotFound.into());
        }
        Ok(Arc::new(StoredTokenProvider {
            store: self.store.clone(),
            account_id,
        }))
    }
}

/// Reads the persisted token on every call so an externally refreshed token
/// is picked up without rebuilding the client. Expired tokens surface as
/// [`SessionError::TokenExpired`] rather than being refreshed here.
struct StoredTokenProvider {
    store: Arc<storage::Store>,
    account_id: i64,
}

impl TokenProvider for StoredTokenProvider {
    fn token(&self) -> Result<OAuthToken> {
        let token = self
            .store
            .get_token(self.account_id)?
            .ok_or(SessionError::TokenNotFound)?;
        if token.expires_at <= Utc::now() {
            return Err(SessionError::TokenExpired.into());
        }
        let expires_in = (token.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        Ok(OAuthToken {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_at: SystemTime::now().checked_add(expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    fn store(dir: &tempfile::TempDir) -> Arc<storage::Store> {
        Arc::new(
            storage::Store::open(storage::Options {
                path: Some(dir.path().join("session.db")),
            })
            .unwrap(),
        )
    }

    fn seed_account(store: &storage::Store, reddit_id: &str, expires_in_hours: i64) -> i64 {
        let id = store
            .upsert_account(storage::Account {
                id: 0,
                reddit_id: reddit_id.into(),
                username: reddit_id.into(),
                display_name: String::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
        store
            .save_token(&storage::Token {
                account_id: id,
                access_token: format!("tok-{reddit_id}"),
                refresh_token: String::new(),
                token_type: "bearer".into(),
                scope: vec!["read".into()],
                expires_at: Utc::now() + ChronoDuration::hours(expires_in_hours),
            })
            .unwrap();
        id
    }

    #[test]
    fn load_existing_activates_first_tokened_account() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let id = seed_account(&store, "alpha", 1);

        let manager = Manager::new(store);
        assert!(manager.active_account_id().is_none());
        manager.load_existing().unwrap();
        assert_eq!(manager.active_account_id(), Some(id));

        let provider = manager.active_token_provider().unwrap();
        assert_eq!(provider.token().unwrap().access_token, "tok-alpha");
    }

    #[test]
    fn expired_token_is_an_error() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let id = seed_account(&store, "alpha", -1);

        let manager = Manager::new(store);
        let provider = manager.token_provider(id).unwrap();
        let err = provider.token().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::TokenExpired)
        ));
    }

    #[test]
    fn switch_requires_account_and_token() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        let manager = Manager::new(store.clone());

        assert!(manager.switch(42).is_err());

        let id = store
            .upsert_account(storage::Account {
                id: 0,
                reddit_id: "solo".into(),
                username: "solo".into(),
                display_name: String::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
        // An account without a stored token cannot become active.
        assert!(manager.switch(id).is_err());
    }
}
