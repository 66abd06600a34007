//! Session lookup and backend selection.

use crate::config::{Config, SessionConfig, ACCESS_TOKEN_ENV};
use crate::store::{DataStore, LocalStore, RestStore};
use crate::{Error, Result, UserSession};
use std::sync::Arc;

/// Source of the signed-in user, if there is one
pub trait SessionProvider: Send + Sync {
    fn current(&self) -> Option<UserSession>;
}

/// Provider with a fixed answer
#[derive(Clone, Debug, Default)]
pub struct StaticSession(Option<UserSession>);

impl StaticSession {
    pub fn signed_in(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self(Some(UserSession {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }))
    }

    pub fn signed_out() -> Self {
        Self(None)
    }

    /// Session from the `[session]` table, with the token overridable from the environment
    pub fn from_config(config: &SessionConfig) -> Self {
        let token = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| config.access_token.clone());
        Self::from_parts(config.user_id.clone(), token)
    }

    fn from_parts(user_id: Option<String>, access_token: Option<String>) -> Self {
        match (user_id, access_token) {
            (Some(user_id), Some(access_token)) => Self::signed_in(user_id, access_token),
            (Some(user_id), None) => {
                tracing::warn!("User {} has no access token; staying signed out", user_id);
                Self::signed_out()
            }
            _ => Self::signed_out(),
        }
    }
}

impl SessionProvider for StaticSession {
    fn current(&self) -> Option<UserSession> {
        self.0.clone()
    }
}

/// Pick the backend for this session: remote when signed in, local files otherwise
pub fn select_store(config: &Config, session: Option<UserSession>) -> Result<Arc<dyn DataStore>> {
    match session {
        Some(session) => {
            let url = config.backend.url.as_deref().ok_or_else(|| {
                Error::Config("signed in but backend.url is not configured".into())
            })?;
            tracing::info!("Using remote store at {} for user {}", url, session.user_id);
            let store = RestStore::new(
                url,
                config.backend.api_key.clone(),
                session,
                config.backend.timeout(),
            )?;
            Ok(Arc::new(store))
        }
        None => {
            let dir = &config.data.data_dir;
            std::fs::create_dir_all(dir)?;
            tracing::info!("Using local store in {:?}", dir);
            Ok(Arc::new(LocalStore::new(dir.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_needs_user_and_token() {
        assert!(StaticSession::from_parts(Some("u".into()), Some("t".into()))
            .current()
            .is_some());
        assert!(StaticSession::from_parts(Some("u".into()), None).current().is_none());
        assert!(StaticSession::from_parts(None, Some("t".into())).current().is_none());
    }

    #[test]
    fn test_signed_out_selects_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data.data_dir = dir.path().join("data");

        let store = select_store(&config, None).unwrap();
        assert_eq!(store.name(), "local");
        assert!(config.data.data_dir.is_dir());
    }

    #[test]
    fn test_signed_in_requires_backend_url() {
        let session = StaticSession::signed_in("u", "t").current();
        let mut config = Config::default();
        assert!(matches!(select_store(&config, session.clone()), Err(Error::Config(_))));

        config.backend.url = Some("http://127.0.0.1:9".into());
        let store = select_store(&config, session).unwrap();
        assert_eq!(store.name(), "remote");
    }
}
