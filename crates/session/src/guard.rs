//! Redirect to the login entry point once the session is gone

use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::storage::CredentialStore;

/// Where the user currently is, and how to send them elsewhere
pub trait Navigator: Send + Sync {
    fn current_location(&self) -> Result<String>;

    /// One-way navigation to `path`
    fn redirect(&self, path: &str) -> Result<()>;
}

/// Navigator that only records where it was sent
#[derive(Debug)]
pub struct MemoryNavigator {
    state: Mutex<MemoryNavigatorState>,
}

#[derive(Debug)]
struct MemoryNavigatorState {
    location: String,
    redirects: usize,
}

impl MemoryNavigator {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryNavigatorState {
                location: location.into(),
                redirects: 0,
            }),
        }
    }

    pub fn location(&self) -> String {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).location.clone()
    }

    /// Number of redirects performed so far
    pub fn redirects(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).redirects
    }
}

impl Navigator for MemoryNavigator {
    fn current_location(&self) -> Result<String> {
        Ok(self.location())
    }

    fn redirect(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.location = path.to_string();
        state.redirects += 1;
        Ok(())
    }
}

/// Sends unauthenticated users to the login entry point
pub struct SessionGuard {
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    login_path: String,
}

impl SessionGuard {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            navigator,
            login_path: login_path.into(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Redirects to the login entry point when no access token is stored and
    /// the user is not already there. Returns whether a redirect happened.
    pub fn enforce_authenticated(&self) -> bool {
        match self.try_enforce() {
            Ok(redirected) => redirected,
            Err(e) => {
                warn!("Session guard failed: {:#}", e);
                false
            }
        }
    }

    fn try_enforce(&self) -> Result<bool> {
        if self.store.access_token().is_some() {
            return Ok(false);
        }

        let location = self.navigator.current_location()?;
        if self.is_login_location(&location) {
            debug!("Already on the login page, not redirecting");
            return Ok(false);
        }

        info!("Session expired, redirecting to {}", self.login_path);
        self.navigator.redirect(&self.login_path)?;
        Ok(true)
    }

    fn is_login_location(&self, location: &str) -> bool {
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        path == self.login_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCredentialStore;
    use anyhow::anyhow;

    fn guard_at(
        location: &str,
        store: Arc<MemoryCredentialStore>,
    ) -> (SessionGuard, Arc<MemoryNavigator>) {
        let navigator = Arc::new(MemoryNavigator::new(location));
        let guard = SessionGuard::new(store, navigator.clone(), "/login");
        (guard, navigator)
    }

    #[test]
    fn test_redirects_when_unauthenticated() {
        let (guard, navigator) = guard_at("/exams/12", Arc::new(MemoryCredentialStore::new()));

        assert!(guard.enforce_authenticated());
        assert_eq!(navigator.location(), "/login");
        assert_eq!(navigator.redirects(), 1);
    }

    #[test]
    fn test_idempotent_on_login_page() {
        let (guard, navigator) = guard_at("/exams", Arc::new(MemoryCredentialStore::new()));

        assert!(guard.enforce_authenticated());
        assert!(!guard.enforce_authenticated());
        assert!(!guard.enforce_authenticated());
        assert_eq!(navigator.redirects(), 1);
    }

    #[test]
    fn test_login_page_with_query_counts() {
        let (guard, navigator) =
            guard_at("/login?next=%2Fexams#top", Arc::new(MemoryCredentialStore::new()));

        assert!(!guard.enforce_authenticated());
        assert_eq!(navigator.redirects(), 0);
    }

    #[test]
    fn test_no_redirect_when_authenticated() {
        let store = Arc::new(MemoryCredentialStore::with_tokens("access", "refresh"));
        let (guard, navigator) = guard_at("/users", store);

        assert!(!guard.enforce_authenticated());
        assert_eq!(navigator.location(), "/users");
    }

    struct BrokenNavigator;

    impl Navigator for BrokenNavigator {
        fn current_location(&self) -> Result<String> {
            Err(anyhow!("location unavailable"))
        }

        fn redirect(&self, _path: &str) -> Result<()> {
            Err(anyhow!("navigation blocked"))
        }
    }

    #[test]
    fn test_navigator_errors_are_swallowed() {
        let guard = SessionGuard::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(BrokenNavigator),
            "/login",
        );
        assert!(!guard.enforce_authenticated());
    }
}
