//! Production session source.
//!
//! There is no interactive sign-in; the caller's identity comes from the
//! environment, using variable names chosen by configuration. The session is
//! resolved once at construction so later operations see a stable identity.

use crate::ports::SessionProvider;
use async_trait::async_trait;
use rivalscan_utils::types::Session;
use std::env;

/// Session provider reading credentials from environment variables.
pub struct EnvSessionProvider {
    session: Option<Session>,
}

impl EnvSessionProvider {
    /// Resolve the session from `user_id_var` and `access_token_var`.
    ///
    /// Both variables must be set and non-empty; anything less means no
    /// session, which the engine surfaces as an authentication failure on
    /// write paths and as empty results on read paths.
    #[must_use]
    pub fn from_env(user_id_var: &str, access_token_var: &str) -> Self {
        let session = match (env::var(user_id_var), env::var(access_token_var)) {
            (Ok(user_id), Ok(access_token))
                if !user_id.trim().is_empty() && !access_token.trim().is_empty() =>
            {
                Some(Session::new(user_id, access_token))
            }
            _ => None,
        };
        Self { session }
    }

    /// Wrap an already-resolved session (or the lack of one).
    #[must_use]
    pub fn with_session(session: Option<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl SessionProvider for EnvSessionProvider {
    async fn current_session(&self) -> Option<Session> {
        self.session.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    // Serializes tests that mutate process env vars.
    static SESSION_ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn session_env_guard() -> MutexGuard<'static, ()> {
        SESSION_ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap()
    }

    #[tokio::test]
    async fn resolves_session_when_both_vars_are_set() {
        let _guard = session_env_guard();

        // Safety: the env guard serializes tests that touch process env vars.
        unsafe {
            env::set_var("RIVALSCAN_TEST_USER", "user-1");
            env::set_var("RIVALSCAN_TEST_TOKEN", "token-1");
        }

        let provider = EnvSessionProvider::from_env("RIVALSCAN_TEST_USER", "RIVALSCAN_TEST_TOKEN");

        // Safety: still serialized by the guard held above.
        unsafe {
            env::remove_var("RIVALSCAN_TEST_USER");
            env::remove_var("RIVALSCAN_TEST_TOKEN");
        }

        let session = provider.current_session().await.unwrap();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.access_token, "token-1");
    }

    #[tokio::test]
    async fn missing_or_blank_vars_mean_no_session() {
        let _guard = session_env_guard();

        // Safety: the env guard serializes tests that touch process env vars.
        unsafe {
            env::remove_var("RIVALSCAN_TEST_USER");
            env::set_var("RIVALSCAN_TEST_TOKEN", "   ");
        }

        let provider = EnvSessionProvider::from_env("RIVALSCAN_TEST_USER", "RIVALSCAN_TEST_TOKEN");

        // Safety: still serialized by the guard held above.
        unsafe {
            env::remove_var("RIVALSCAN_TEST_TOKEN");
        }

        assert!(provider.current_session().await.is_none());
    }

    #[tokio::test]
    async fn preresolved_session_is_returned_as_is() {
        let provider = EnvSessionProvider::with_session(Some(Session::new("user-2", "token-2")));
        assert!(provider.current_session().await.is_some());

        let empty = EnvSessionProvider::with_session(None);
        assert!(empty.current_session().await.is_none());
    }
}
